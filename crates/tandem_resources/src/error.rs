//! # Resource Error Types
//!
//! All errors that can occur in the resource table.

use thiserror::Error;

use crate::definition::ResourceKind;
use crate::ResourceId;

/// Errors that can occur in the resource table.
///
/// `Clone` because one load outcome is handed to every waiter.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ResourceError {
    /// A loader for this kind is already registered.
    #[error("loader already registered for kind {0}")]
    DuplicateLoader(ResourceKind),

    /// No loader registered for this kind.
    #[error("no loader registered for kind {0}")]
    NoLoader(ResourceKind),

    /// Id is not in the table (never loaded, or already evicted).
    #[error("unknown resource {0}")]
    UnknownResource(ResourceId),

    /// The loader failed. Recorded as the `Error` state of the id.
    #[error("resource {id} failed to load: {reason}")]
    LoaderFailure {
        /// The resource that failed.
        id: ResourceId,
        /// Why it failed.
        reason: String,
    },

    /// A different definition was already loaded under this id.
    #[error("resource {0} already exists with a different definition")]
    DefinitionMismatch(ResourceId),

    /// A loader produced a payload of the wrong type for a dependent.
    #[error("resource {id} is not a {expected}")]
    WrongPayload {
        /// The resource inspected.
        id: ResourceId,
        /// The payload type the dependent expected.
        expected: &'static str,
    },

    /// The definition could not be encoded into its identity key.
    #[error("definition encoding failed: {0}")]
    Encoding(String),

    /// Every resource id has been handed out.
    #[error("resource id space exhausted")]
    Exhausted,
}

/// Result type for resource operations.
pub type ResourceResult<T> = Result<T, ResourceError>;
