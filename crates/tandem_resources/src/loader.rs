//! # Loader Registry
//!
//! One asynchronous loader per [`ResourceKind`]. A loader turns a
//! definition into a payload. It may await other resources through
//! [`LoadContext::resolve`], which is how meshes wait on their geometry and
//! material.

use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::definition::{ResourceDefinition, ResourceKind};
use crate::error::{ResourceError, ResourceResult};
use crate::table::{ResourceState, ResourceTable};
use crate::ResourceId;

/// Opaque loaded value. Only the presentation side ever holds one.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Future a loader returns.
pub type LoadFuture = Pin<Box<dyn Future<Output = ResourceResult<Payload>> + Send + 'static>>;

/// Produces payloads for one resource kind.
pub trait ResourceLoader: Send + Sync + 'static {
    /// Starts loading `definition` as resource `ctx.id()`.
    ///
    /// Must not block; the returned future runs on the async runtime.
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture;
}

impl<F> ResourceLoader for F
where
    F: Fn(LoadContext, ResourceDefinition) -> LoadFuture + Send + Sync + 'static,
{
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        self(ctx, definition)
    }
}

/// Kind → loader map.
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    loaders: HashMap<ResourceKind, Arc<dyn ResourceLoader>>,
}

impl std::fmt::Debug for LoaderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.loaders.keys()).finish()
    }
}

impl LoaderRegistry {
    /// Empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `loader` for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateLoader`] if `kind` already has one.
    pub fn register(&mut self, kind: ResourceKind, loader: Arc<dyn ResourceLoader>) -> ResourceResult<()> {
        if self.loaders.contains_key(&kind) {
            return Err(ResourceError::DuplicateLoader(kind));
        }
        self.loaders.insert(kind, loader);
        Ok(())
    }

    /// Loader for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::NoLoader`] if none is registered.
    pub fn get(&self, kind: ResourceKind) -> ResourceResult<Arc<dyn ResourceLoader>> {
        self.loaders.get(&kind).cloned().ok_or(ResourceError::NoLoader(kind))
    }

    /// True if `kind` has a loader.
    #[must_use]
    pub fn contains(&self, kind: ResourceKind) -> bool {
        self.loaders.contains_key(&kind)
    }
}

/// Handed to a loader for the duration of one load.
#[derive(Debug, Clone)]
pub struct LoadContext {
    id: ResourceId,
    table: ResourceTable,
}

impl LoadContext {
    pub(crate) const fn new(id: ResourceId, table: ResourceTable) -> Self {
        Self { id, table }
    }

    /// Id being loaded.
    #[must_use]
    pub const fn id(&self) -> ResourceId {
        self.id
    }

    /// Builds the failure for this load.
    #[must_use]
    pub fn fail(&self, reason: impl Into<String>) -> ResourceError {
        ResourceError::LoaderFailure {
            id: self.id,
            reason: reason.into(),
        }
    }

    /// Waits for resource `id` and returns its payload.
    ///
    /// # Errors
    ///
    /// Fails if `id` is unknown or its load failed.
    pub async fn resolve(&self, id: ResourceId) -> ResourceResult<Payload> {
        let pending = match self.table.get(id) {
            None => return Err(ResourceError::UnknownResource(id)),
            Some(record) => match record.state {
                ResourceState::Loaded => {
                    return record.payload.ok_or(ResourceError::UnknownResource(id));
                }
                ResourceState::Error => {
                    return Err(record.error.unwrap_or_else(|| self.fail(format!("dependency {id} failed"))));
                }
                ResourceState::Loading => match record.pending {
                    Some(pending) => pending,
                    None => return Err(ResourceError::UnknownResource(id)),
                },
            },
        };
        pending.await
    }

    /// Waits for resource `id` and downcasts its payload to `T`.
    ///
    /// # Errors
    ///
    /// Fails like [`LoadContext::resolve`], or with
    /// [`ResourceError::WrongPayload`] if the payload is not a `T`.
    pub async fn resolve_as<T: Any + Send + Sync>(&self, id: ResourceId) -> ResourceResult<Arc<T>> {
        let payload = self.resolve(id).await?;
        payload.downcast::<T>().map_err(|_| ResourceError::WrongPayload {
            id,
            expected: std::any::type_name::<T>(),
        })
    }

    /// The table this load belongs to.
    #[must_use]
    pub const fn table(&self) -> &ResourceTable {
        &self.table
    }
}
