//! # Resource Table
//!
//! Id-indexed records shared between everything on the presentation side.
//!
//! ## Lifecycle
//!
//! ```text
//!            load            loader Ok
//!   (absent) ────▶ Loading ─────────────▶ Loaded ──┐
//!                     │                            │ refcount 1 → 0
//!                     │ loader Err                 ▼
//!                     └──────────────▶ Error ──▶ (evicted, id recycled)
//! ```
//!
//! ## Rules
//!
//! - At most one load per id. Requests for an existing id or definition
//!   return the existing id.
//! - The record transitions before the pending load resolves, so a
//!   continuation always observes the final state.
//! - A record reaching refcount 0 while still `Loading` is evicted when the
//!   load settles. Its id is recycled only then.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use tokio::runtime::Handle;
use tracing::{debug, trace, warn};

use crate::allocator::ResourceIdAllocator;
use crate::definition::{ResourceDefinition, ResourceKind};
use crate::error::{ResourceError, ResourceResult};
use crate::loader::{LoadContext, LoaderRegistry, Payload, ResourceLoader};
use crate::pending::{LoadOutcome, PendingLoad};
use crate::ResourceId;

/// Load state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceState {
    /// Loader running.
    Loading,
    /// Payload available.
    Loaded,
    /// Loader failed.
    Error,
}

/// Point-in-time copy of one record.
#[derive(Debug, Clone)]
pub struct ResourceRecord {
    /// Resource id.
    pub id: ResourceId,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Load state.
    pub state: ResourceState,
    /// Payload, once loaded.
    pub payload: Option<Payload>,
    /// Current holders.
    pub refcount: u32,
    /// In-flight load, while loading.
    pub pending: Option<PendingLoad>,
    /// Failure, if the load failed.
    pub error: Option<ResourceError>,
}

/// Lifetime counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TableStats {
    /// Loader invocations.
    pub loads_started: u64,
    /// Loads that produced a payload.
    pub loads_completed: u64,
    /// Loads that failed.
    pub loads_failed: u64,
    /// Requests answered by an existing record.
    pub dedup_hits: u64,
    /// Records removed.
    pub evictions: u64,
}

struct Entry {
    kind: ResourceKind,
    key: Option<String>,
    state: ResourceState,
    payload: Option<Payload>,
    refcount: u32,
    pending: Option<PendingLoad>,
    error: Option<ResourceError>,
    evict_on_resolve: bool,
}

impl Entry {
    fn snapshot(&self, id: ResourceId) -> ResourceRecord {
        ResourceRecord {
            id,
            kind: self.kind,
            state: self.state,
            payload: self.payload.clone(),
            refcount: self.refcount,
            pending: self.pending.clone(),
            error: self.error.clone(),
        }
    }
}

#[derive(Default)]
struct TableInner {
    entries: HashMap<ResourceId, Entry>,
    by_key: HashMap<String, ResourceId>,
    stats: TableStats,
}

/// Shared, reference-counted resource table.
///
/// Cloning yields another handle to the same table.
#[derive(Clone)]
pub struct ResourceTable {
    inner: Arc<Mutex<TableInner>>,
    loaders: Arc<RwLock<LoaderRegistry>>,
    allocator: ResourceIdAllocator,
    runtime: Handle,
}

impl std::fmt::Debug for ResourceTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = self.inner.lock();
        f.debug_struct("ResourceTable")
            .field("records", &inner.entries.len())
            .field("stats", &inner.stats)
            .finish_non_exhaustive()
    }
}

impl ResourceTable {
    /// Creates an empty table. Loads are spawned on `runtime`.
    #[must_use]
    pub fn new(allocator: ResourceIdAllocator, runtime: Handle) -> Self {
        Self {
            inner: Arc::new(Mutex::new(TableInner::default())),
            loaders: Arc::new(RwLock::new(LoaderRegistry::new())),
            allocator,
            runtime,
        }
    }

    /// The shared id allocator.
    #[must_use]
    pub const fn allocator(&self) -> &ResourceIdAllocator {
        &self.allocator
    }

    /// Registers `loader` for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateLoader`] if `kind` already has one.
    pub fn register_loader(&self, kind: ResourceKind, loader: impl ResourceLoader) -> ResourceResult<()> {
        self.register_shared_loader(kind, Arc::new(loader))
    }

    /// Registers an already shared loader for `kind`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DuplicateLoader`] if `kind` already has one.
    pub fn register_shared_loader(&self, kind: ResourceKind, loader: Arc<dyn ResourceLoader>) -> ResourceResult<()> {
        self.loaders.write().register(kind, loader)?;
        debug!(%kind, "Loader registered");
        Ok(())
    }

    /// True if `kind` has a loader.
    #[must_use]
    pub fn has_loader(&self, kind: ResourceKind) -> bool {
        self.loaders.read().contains(kind)
    }

    /// Returns the id for `definition`, starting a load if no equal
    /// definition is known.
    ///
    /// # Errors
    ///
    /// Fails if no loader handles the definition's kind, if the definition
    /// cannot be encoded, or if ids are exhausted.
    pub fn request_load(&self, definition: ResourceDefinition) -> ResourceResult<ResourceId> {
        let key = definition.canonical_key()?;
        let (id, loader) = {
            let mut inner = self.inner.lock();
            if let Some(&id) = inner.by_key.get(&key) {
                inner.stats.dedup_hits += 1;
                trace!(id, "Load request de-duplicated");
                return Ok(id);
            }
            let loader = self.loaders.read().get(definition.kind())?;
            let id = self.allocator.allocate()?;
            self.begin(&mut inner, id, &definition, key);
            (id, loader)
        };
        self.spawn(id, loader, definition);
        Ok(id)
    }

    /// Loads `definition` under an id minted elsewhere.
    ///
    /// Repeating an identical request is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::DefinitionMismatch`] if `id` holds a
    /// different definition, [`ResourceError::NoLoader`] if the kind has no
    /// loader, or [`ResourceError::Encoding`].
    pub fn load_resource(&self, id: ResourceId, definition: ResourceDefinition) -> ResourceResult<()> {
        let key = definition.canonical_key()?;
        let loader = {
            let mut inner = self.inner.lock();
            if let Some(entry) = inner.entries.get(&id) {
                if entry.key.as_deref() == Some(key.as_str()) {
                    inner.stats.dedup_hits += 1;
                    return Ok(());
                }
                return Err(ResourceError::DefinitionMismatch(id));
            }
            let loader = self.loaders.read().get(definition.kind())?;
            self.begin(&mut inner, id, &definition, key);
            loader
        };
        self.spawn(id, loader, definition);
        Ok(())
    }

    /// Inserts an already-built payload as a loaded record.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::Exhausted`] if no id is left.
    pub fn insert_loaded(&self, kind: ResourceKind, payload: Payload) -> ResourceResult<ResourceId> {
        let id = self.allocator.allocate()?;
        self.inner.lock().entries.insert(
            id,
            Entry {
                kind,
                key: None,
                state: ResourceState::Loaded,
                payload: Some(payload),
                refcount: 0,
                pending: None,
                error: None,
                evict_on_resolve: false,
            },
        );
        Ok(id)
    }

    fn begin(&self, inner: &mut TableInner, id: ResourceId, definition: &ResourceDefinition, key: String) {
        inner.by_key.insert(key.clone(), id);
        inner.entries.insert(
            id,
            Entry {
                kind: definition.kind(),
                key: Some(key),
                state: ResourceState::Loading,
                payload: None,
                refcount: 0,
                pending: Some(PendingLoad::new(id)),
                error: None,
                evict_on_resolve: false,
            },
        );
        inner.stats.loads_started += 1;
        debug!(id, kind = %definition.kind(), name = definition.name(), "Load started");
    }

    fn spawn(&self, id: ResourceId, loader: Arc<dyn ResourceLoader>, definition: ResourceDefinition) {
        let future = loader.load(LoadContext::new(id, self.clone()), definition);
        let table = self.clone();
        self.runtime.spawn(async move {
            let outcome = future.await;
            table.complete(id, outcome);
        });
    }

    fn complete(&self, id: ResourceId, outcome: LoadOutcome) {
        let pending = {
            let mut guard = self.inner.lock();
            let inner = &mut *guard;
            let Some(entry) = inner.entries.get_mut(&id) else {
                return;
            };
            match &outcome {
                Ok(payload) => {
                    entry.state = ResourceState::Loaded;
                    entry.payload = Some(Arc::clone(payload));
                    inner.stats.loads_completed += 1;
                    debug!(id, "Load completed");
                }
                Err(error) => {
                    entry.state = ResourceState::Error;
                    entry.error = Some(error.clone());
                    inner.stats.loads_failed += 1;
                    warn!(id, %error, "Load failed");
                }
            }
            let pending = entry.pending.take();
            if entry.evict_on_resolve {
                self.evict(inner, id);
            }
            pending
        };
        // Resolved outside the lock: continuations may read the table
        if let Some(pending) = pending {
            pending.resolve(outcome);
        }
    }

    fn evict(&self, inner: &mut TableInner, id: ResourceId) {
        if let Some(entry) = inner.entries.remove(&id) {
            if let Some(key) = entry.key {
                if inner.by_key.get(&key) == Some(&id) {
                    inner.by_key.remove(&key);
                }
            }
            inner.stats.evictions += 1;
            self.allocator.release(id);
            debug!(id, kind = %entry.kind, "Resource evicted");
        }
    }

    /// Increments the refcount of `id`.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] if `id` is absent.
    pub fn add_ref(&self, id: ResourceId) -> ResourceResult<u32> {
        let mut inner = self.inner.lock();
        let entry = inner.entries.get_mut(&id).ok_or(ResourceError::UnknownResource(id))?;
        entry.refcount += 1;
        Ok(entry.refcount)
    }

    /// Decrements the refcount of `id`, evicting on the 1 → 0 transition.
    /// Decrementing a zero refcount is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`ResourceError::UnknownResource`] if `id` is absent.
    pub fn remove_ref(&self, id: ResourceId) -> ResourceResult<u32> {
        let mut guard = self.inner.lock();
        let inner = &mut *guard;
        let entry = inner.entries.get_mut(&id).ok_or(ResourceError::UnknownResource(id))?;
        if entry.refcount == 0 {
            trace!(id, "remove_ref on zero refcount ignored");
            return Ok(0);
        }
        entry.refcount -= 1;
        if entry.refcount == 0 {
            if entry.state == ResourceState::Loading {
                entry.evict_on_resolve = true;
            } else {
                self.evict(inner, id);
            }
            return Ok(0);
        }
        Ok(entry.refcount)
    }

    /// Snapshot of `id`.
    #[must_use]
    pub fn get(&self, id: ResourceId) -> Option<ResourceRecord> {
        self.inner.lock().entries.get(&id).map(|e| e.snapshot(id))
    }

    /// State of `id`.
    #[must_use]
    pub fn state(&self, id: ResourceId) -> Option<ResourceState> {
        self.inner.lock().entries.get(&id).map(|e| e.state)
    }

    /// Payload of `id`, if loaded.
    #[must_use]
    pub fn payload(&self, id: ResourceId) -> Option<Payload> {
        self.inner.lock().entries.get(&id).and_then(|e| e.payload.clone())
    }

    /// In-flight load of `id`, if any.
    #[must_use]
    pub fn pending(&self, id: ResourceId) -> Option<PendingLoad> {
        self.inner.lock().entries.get(&id).and_then(|e| e.pending.clone())
    }

    /// Number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    /// True if the table holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Lifetime counters.
    #[must_use]
    pub fn stats(&self) -> TableStats {
        self.inner.lock().stats
    }
}
