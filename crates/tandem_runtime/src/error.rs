//! # Context Error Types
//!
//! Only `InitializationFailure` is fatal, and only to the context that
//! raised it. Every other variant is logged against the offending id and
//! the loop carries on.

use tandem_core::{EntityId, SchemaError};
use tandem_resources::{ResourceError, ResourceId};
use thiserror::Error;

/// Errors raised by the simulation and presentation contexts.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ContextError {
    /// The context could not start. Reported to the host.
    #[error("initialization failed: {0}")]
    InitializationFailure(String),

    /// A message referred to a resource that is not in the table.
    #[error("entity {entity} references unknown resource {resource_id}")]
    UnknownResourceReference {
        /// Entity the message was about.
        entity: EntityId,
        /// Missing resource.
        resource_id: ResourceId,
    },

    /// A resource failed to load.
    #[error("resource {resource_id} failed to load: {reason}")]
    LoaderFailure {
        /// Failed resource.
        resource_id: ResourceId,
        /// Loader's reason.
        reason: String,
    },

    /// Malformed or out-of-order message.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Entity id past the channel capacity.
    #[error("entity {entity} exceeds max entities {max}")]
    EntityOutOfRange {
        /// Offending entity.
        entity: EntityId,
        /// Configured maximum.
        max: usize,
    },

    /// The render backend failed.
    #[error("render backend: {0}")]
    Backend(String),

    /// Resource table error.
    #[error(transparent)]
    Resource(#[from] ResourceError),
}

impl From<SchemaError> for ContextError {
    fn from(err: SchemaError) -> Self {
        match err {
            SchemaError::EntityOutOfRange { entity, max } => Self::EntityOutOfRange { entity, max },
            SchemaError::Cursor(e) => Self::ProtocolViolation(e.to_string()),
        }
    }
}

/// Result type for context operations.
pub type ContextResult<T> = Result<T, ContextError>;
