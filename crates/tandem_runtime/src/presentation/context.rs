//! Presentation context: the per-frame consumer.
//!
//! ```text
//! Frame N:
//! ┌─────────────────────────────────────────────────────────────────────┐
//! │ 1. Re-deliver binds whose resource finished loading                 │
//! │ 2. Apply queued renderable messages in arrival order                │
//! │ 3. Apply a pending resize                                           │
//! │ 4. Swap for read; snap or blend every bound node                    │
//! │ 5. Render; write stats                                              │
//! └─────────────────────────────────────────────────────────────────────┘
//! ```

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crossbeam_channel::{unbounded, Receiver, Sender, TryRecvError};
use tandem_core::{CursorView, EntityId, RenderableSchema, SlotArena, Transform, TripleBufferConsumer};
use tandem_resources::loaders::{CameraData, SceneData};
use tandem_resources::{
    register_builtin_loaders, PendingLoad, ResourceDefinition, ResourceId, ResourceKind, ResourceLoader, ResourceState,
    ResourceTable,
};
use tokio::runtime::Handle;
use tracing::{debug, error, info, trace, warn};

use crate::config::EngineConfig;
use crate::error::{ContextError, ContextResult};
use crate::protocol::{ExportOptions, InitializeContext, Message, RenderableMessage};
use crate::stats::{ContextStats, FrameSample};

use super::backend::{FrameReport, RenderBackend};
use super::scene::{SceneGraph, SceneNode, SceneRoot};

/// Where the context is in its startup sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    /// Waiting for `InitializeContext`.
    Uninitialized,
    /// Channel attached, waiting for `StartContext`.
    Initialized,
    /// Rendering frames.
    Running,
}

/// Requested binding of one entity.
#[derive(Debug, Clone, Copy)]
struct Renderable {
    resource_id: ResourceId,
    /// Bumped on every bind request; continuations carry the value they saw.
    generation: u64,
}

/// A message re-delivered by a load continuation.
#[derive(Debug)]
struct Requeue {
    message: RenderableMessage,
    generation: u64,
}

/// Blend factor source.
#[derive(Debug, Clone, Copy)]
pub struct FrameClock {
    smoothing: f32,
    smoothed: Option<f32>,
}

impl FrameClock {
    /// `smoothing` is the weight of the previous delta, in `[0, 1)`.
    #[must_use]
    pub const fn new(smoothing: f32) -> Self {
        Self {
            smoothing,
            smoothed: None,
        }
    }

    /// `clamp(dt / tick, 0, 1)` with `dt` optionally smoothed.
    pub fn alpha(&mut self, dt: Duration, tick: Duration) -> f32 {
        let dt = dt.as_secs_f32();
        let smoothed = match self.smoothed {
            Some(previous) if self.smoothing > 0.0 => self.smoothing * previous + (1.0 - self.smoothing) * dt,
            _ => dt,
        };
        self.smoothed = Some(smoothed);

        let tick = tick.as_secs_f32();
        if tick <= 0.0 {
            return 1.0;
        }
        (smoothed / tick).clamp(0.0, 1.0)
    }
}

/// State that exists only after `InitializeContext`.
struct Bridge {
    schema: RenderableSchema,
    channel: TripleBufferConsumer<CursorView>,
    table: ResourceTable,
    stats: Arc<ContextStats>,
    simulation: Sender<Message>,
    tick_duration: Duration,
    renderables: SlotArena<Renderable>,
    scene: SceneGraph,
    next_generation: u64,
    scene_generation: u64,
    camera_generation: u64,
    /// Attached before any tick arrived; snapped on the first swap.
    unsynced: SlotArena<()>,
}

impl Bridge {
    fn apply(&mut self, message: RenderableMessage, requeue: &Sender<Requeue>) {
        match message {
            RenderableMessage::AddRenderable { entity, resource_id } => {
                let max = self.schema.max_entities();
                self.next_generation += 1;
                let renderable = Renderable {
                    resource_id,
                    generation: self.next_generation,
                };
                if self.renderables.insert(entity, renderable).is_err() {
                    let error = ContextError::EntityOutOfRange { entity, max };
                    warn!(entity, resource_id, operation = "AddRenderable", %error, "Renderable dropped");
                    return;
                }
                self.bind(entity, resource_id, renderable.generation, requeue);
            }
            RenderableMessage::RemoveRenderable { entity } => {
                self.renderables.remove(entity);
                if self.scene.detach(entity).is_some() {
                    debug!(entity, "Renderable removed");
                }
            }
            RenderableMessage::SetActiveCamera { entity } => {
                self.camera_generation += 1;
                self.set_camera(entity, self.camera_generation, requeue);
            }
            RenderableMessage::SetActiveScene { entity, resource_id } => {
                self.scene_generation += 1;
                self.set_scene(entity, resource_id, self.scene_generation, requeue);
            }
        }
    }

    /// Re-delivers a continuation's message unless a newer request for the
    /// same target arrived meanwhile.
    fn redeliver(&mut self, requeue: Requeue, sender: &Sender<Requeue>) {
        let Requeue { message, generation } = requeue;
        match message {
            RenderableMessage::AddRenderable { entity, resource_id } => {
                let current = self.renderables.get(entity).copied();
                match current {
                    Some(r) if r.resource_id == resource_id && r.generation == generation => {
                        self.bind(entity, resource_id, generation, sender);
                    }
                    _ => trace!(entity, resource_id, "Stale continuation dropped"),
                }
            }
            RenderableMessage::SetActiveCamera { entity } if generation == self.camera_generation => {
                self.set_camera(entity, generation, sender);
            }
            RenderableMessage::SetActiveScene { entity, resource_id } if generation == self.scene_generation => {
                self.set_scene(entity, resource_id, generation, sender);
            }
            message => trace!(?message, "Stale continuation dropped"),
        }
    }

    fn on_settled(pending: &PendingLoad, message: RenderableMessage, generation: u64, sender: &Sender<Requeue>) {
        let sender = sender.clone();
        pending.on_resolve(move |_| {
            // Receiver gone means the context shut down
            let _ = sender.send(Requeue { message, generation });
        });
    }

    fn bind(&mut self, entity: EntityId, resource_id: ResourceId, generation: u64, requeue: &Sender<Requeue>) {
        let Some(record) = self.table.get(resource_id) else {
            let error = ContextError::UnknownResourceReference { entity, resource_id };
            warn!(entity, resource_id, operation = "AddRenderable", %error, "Binding skipped");
            self.scene.detach(entity);
            return;
        };

        match record.state {
            ResourceState::Loaded => {
                let Some(payload) = record.payload else {
                    let error = ContextError::UnknownResourceReference { entity, resource_id };
                    warn!(entity, resource_id, operation = "AddRenderable", %error, "Loaded without payload");
                    return;
                };
                let (transform, visible) = self.initial_state(entity);
                let node = SceneNode {
                    entity,
                    resource_id,
                    kind: record.kind,
                    payload,
                    transform,
                    visible,
                };
                match self.scene.attach(node) {
                    Ok(Some(old)) if old.resource_id != resource_id => {
                        debug!(entity, old = old.resource_id, new = resource_id, "Binding replaced");
                    }
                    Ok(_) => debug!(entity, resource_id, "Renderable bound"),
                    Err(error) => warn!(entity, resource_id, %error, "Binding skipped"),
                }
            }
            ResourceState::Loading => {
                // The old resource's ref is released alongside the rebind
                if self.scene.node(entity).is_some_and(|node| node.resource_id != resource_id) {
                    self.scene.detach(entity);
                    debug!(entity, resource_id, "Previous binding detached while loading");
                }
                if let Some(pending) = record.pending {
                    trace!(entity, resource_id, "Bind deferred until load settles");
                    Self::on_settled(
                        &pending,
                        RenderableMessage::AddRenderable { entity, resource_id },
                        generation,
                        requeue,
                    );
                }
            }
            ResourceState::Error => {
                let error = ContextError::LoaderFailure {
                    resource_id,
                    reason: record.error.map_or_else(|| "unknown".to_owned(), |e| e.to_string()),
                };
                warn!(entity, resource_id, operation = "AddRenderable", %error, "Entity left unbound");
                self.scene.detach(entity);
            }
        }
    }

    fn set_camera(&mut self, entity: EntityId, generation: u64, requeue: &Sender<Requeue>) {
        if let Some(node) = self.scene.node(entity) {
            if node.payload.is::<CameraData>() {
                self.scene.set_camera(entity);
                info!(entity, "Active camera set");
            } else {
                let error = ContextError::ProtocolViolation(format!("entity {entity} is not bound to a camera"));
                warn!(entity, operation = "SetActiveCamera", %error, "Camera unchanged");
            }
            return;
        }

        // Bound resource still loading, or loaded with its bind not yet
        // redelivered: retry after it.
        let record = self
            .renderables
            .get(entity)
            .and_then(|r| self.table.get(r.resource_id));
        match record {
            Some(record) if record.state == ResourceState::Loading => {
                if let Some(pending) = record.pending {
                    Self::on_settled(&pending, RenderableMessage::SetActiveCamera { entity }, generation, requeue);
                }
            }
            Some(record) if record.state == ResourceState::Loaded => {
                let _ = requeue.send(Requeue {
                    message: RenderableMessage::SetActiveCamera { entity },
                    generation,
                });
            }
            record => {
                let error = ContextError::UnknownResourceReference {
                    entity,
                    resource_id: record.map_or(0, |r| r.id),
                };
                warn!(entity, operation = "SetActiveCamera", %error, "Camera unchanged");
            }
        }
    }

    fn set_scene(&mut self, entity: EntityId, resource_id: ResourceId, generation: u64, requeue: &Sender<Requeue>) {
        let Some(record) = self.table.get(resource_id) else {
            let error = ContextError::UnknownResourceReference { entity, resource_id };
            warn!(entity, resource_id, operation = "SetActiveScene", %error, "Scene unchanged");
            return;
        };
        match (record.state, record.payload, record.pending) {
            (ResourceState::Loaded, Some(payload), _) if payload.is::<SceneData>() => {
                let previous = self.scene.set_root(SceneRoot {
                    entity,
                    resource_id,
                    payload,
                });
                // Nodes live in the graph, so they carry over to the new root
                info!(
                    entity,
                    resource_id,
                    previous = previous.map(|root| root.resource_id),
                    children = self.scene.len(),
                    "Active scene set"
                );
            }
            (ResourceState::Loading, _, Some(pending)) => {
                Self::on_settled(
                    &pending,
                    RenderableMessage::SetActiveScene { entity, resource_id },
                    generation,
                    requeue,
                );
            }
            (state, _, _) => {
                let error = ContextError::ProtocolViolation(format!(
                    "resource {resource_id} is not a loaded scene ({state:?})"
                ));
                warn!(entity, resource_id, operation = "SetActiveScene", %error, "Scene unchanged");
            }
        }
    }

    /// Transform and visibility a fresh node starts from: the replaced
    /// node's, else whatever the reading region holds.
    fn initial_state(&mut self, entity: EntityId) -> (Transform, bool) {
        if let Some(node) = self.scene.node(entity) {
            return (node.transform, node.visible);
        }
        if self.channel.staleness().swaps == 0 {
            let _ = self.unsynced.insert(entity, ());
            return (Transform::IDENTITY, true);
        }
        self.schema
            .read_entity(self.channel.read_region(), entity)
            .map_or((Transform::IDENTITY, true), |state| {
                (state.world_matrix.decompose(), state.visible)
            })
    }

    fn sync_transforms(&mut self, alpha: f32) {
        // Nothing published yet
        if self.channel.staleness().swaps == 0 {
            return;
        }
        let region = self.channel.read_region();
        for node in self.scene.nodes_mut() {
            let state = match self.schema.read_entity(region, node.entity) {
                Ok(state) => state,
                Err(error) => {
                    warn!(entity = node.entity, %error, "Transform read failed");
                    continue;
                }
            };
            node.visible = state.visible;
            let snap = self.unsynced.contains(node.entity);
            if !state.world_matrix_needs_update && !snap {
                continue;
            }
            let target = state.world_matrix.decompose();
            node.transform = if state.interpolate && !snap {
                node.transform.blend(target, alpha)
            } else {
                target
            };
        }
        if !self.unsynced.is_empty() {
            self.unsynced.clear();
        }
    }
}

/// Per-frame consumer of the state channel and owner of the scene.
pub struct PresentationContext<B: RenderBackend> {
    config: EngineConfig,
    backend: B,
    runtime: Handle,
    host: Sender<Message>,
    custom_loaders: Vec<(ResourceKind, Arc<dyn ResourceLoader>)>,
    lifecycle: Lifecycle,
    bridge: Option<Bridge>,
    queue: Vec<RenderableMessage>,
    requeue_tx: Sender<Requeue>,
    requeue_rx: Receiver<Requeue>,
    pending_resize: Option<(u32, u32)>,
    clock: FrameClock,
    frames: u64,
}

impl<B: RenderBackend> PresentationContext<B> {
    /// Creates an uninitialized context. Loads run on `runtime`; replies go
    /// to `host`.
    #[must_use]
    pub fn new(config: EngineConfig, backend: B, runtime: Handle, host: Sender<Message>) -> Self {
        let (requeue_tx, requeue_rx) = unbounded();
        let clock = FrameClock::new(config.presentation.lerp_smoothing);
        Self {
            config,
            backend,
            runtime,
            host,
            custom_loaders: Vec::new(),
            lifecycle: Lifecycle::Uninitialized,
            bridge: None,
            queue: Vec::new(),
            requeue_tx,
            requeue_rx,
            pending_resize: None,
            clock,
            frames: 0,
        }
    }

    /// Uses `loader` for `kind` instead of the built-in one. Takes effect at
    /// initialization.
    #[must_use]
    pub fn with_loader(self, kind: ResourceKind, loader: impl ResourceLoader) -> Self {
        self.with_shared_loader(kind, Arc::new(loader))
    }

    /// [`with_loader`](Self::with_loader) for an already shared loader.
    #[must_use]
    pub fn with_shared_loader(mut self, kind: ResourceKind, loader: Arc<dyn ResourceLoader>) -> Self {
        self.custom_loaders.push((kind, loader));
        self
    }

    /// Startup state.
    #[must_use]
    pub const fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    /// Resource table, once initialized.
    #[must_use]
    pub fn resources(&self) -> Option<&ResourceTable> {
        self.bridge.as_ref().map(|b| &b.table)
    }

    /// Scene graph, once initialized.
    #[must_use]
    pub fn scene(&self) -> Option<&SceneGraph> {
        self.bridge.as_ref().map(|b| &b.scene)
    }

    /// Resource actually attached for `entity`.
    #[must_use]
    pub fn binding(&self, entity: EntityId) -> Option<ResourceId> {
        self.scene()?.node(entity).map(|node| node.resource_id)
    }

    /// Resource most recently requested for `entity`.
    #[must_use]
    pub fn requested(&self, entity: EntityId) -> Option<ResourceId> {
        self.bridge.as_ref()?.renderables.get(entity).map(|r| r.resource_id)
    }

    /// The backend.
    #[must_use]
    pub const fn backend(&self) -> &B {
        &self.backend
    }

    /// Frames rendered.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    fn reply(&self, message: Message) {
        let name = message.name();
        if self.host.send(message).is_err() {
            debug!(message = name, "Host gone, reply dropped");
        }
    }

    fn violation(reason: impl Into<String>) {
        let error = ContextError::ProtocolViolation(reason.into());
        warn!(%error, "Message dropped");
    }

    /// Handles one message. Breaks on `Shutdown`.
    pub fn handle_message(&mut self, message: Message) -> ControlFlow<()> {
        match message {
            Message::Shutdown => return ControlFlow::Break(()),
            Message::InitializeContext(init) => self.initialize(*init),
            other if self.bridge.is_none() => {
                Self::violation(format!("{} before InitializeContext", other.name()));
            }
            Message::StartContext => self.start(),
            Message::Resize { width, height } => {
                if width == 0 || height == 0 {
                    Self::violation(format!("resize to {width}x{height}"));
                } else {
                    self.pending_resize = Some((width, height));
                }
            }
            Message::Renderable(message) => self.queue.push(message),
            Message::LoadResource {
                resource_id,
                definition,
            } => self.load_resource(resource_id, definition),
            Message::AddResourceRef { resource_id } => self.adjust_ref(resource_id, true),
            Message::RemoveResourceRef { resource_id } => self.adjust_ref(resource_id, false),
            Message::ExportScene(options) => self.export(&options),
            other @ (Message::ContextInitialized
            | Message::ContextError(_)
            | Message::SceneExported { .. }
            | Message::ResourceLoaded { .. }
            | Message::ResourceFailed { .. }) => {
                Self::violation(format!("{} is not addressed to the presentation context", other.name()));
            }
        }
        ControlFlow::Continue(())
    }

    fn initialize(&mut self, init: InitializeContext) {
        if self.bridge.is_some() {
            Self::violation("InitializeContext received twice");
            return;
        }
        match self.build_bridge(init) {
            Ok(bridge) => {
                info!(
                    max_entities = bridge.schema.max_entities(),
                    width = bridge.scene.size().0,
                    height = bridge.scene.size().1,
                    "Presentation context initialized"
                );
                self.bridge = Some(bridge);
                self.lifecycle = Lifecycle::Initialized;
                self.reply(Message::ContextInitialized);
            }
            Err(error) => {
                error!(%error, "Presentation context failed to initialize");
                self.reply(Message::ContextError(error.to_string()));
            }
        }
    }

    fn build_bridge(&mut self, init: InitializeContext) -> ContextResult<Bridge> {
        let fail = |reason: String| ContextError::InitializationFailure(reason);

        if init.canvas_width == 0 || init.canvas_height == 0 {
            return Err(fail(format!("canvas {}x{}", init.canvas_width, init.canvas_height)));
        }
        if init.tick_duration.is_zero() {
            return Err(fail("tick duration is zero".into()));
        }
        let region_len = init.channel.read_region().len();
        if region_len != init.schema.region_size() {
            return Err(fail(format!(
                "region is {region_len} bytes, schema needs {}",
                init.schema.region_size()
            )));
        }

        let table = ResourceTable::new(init.allocator, self.runtime.clone());
        for (kind, loader) in &self.custom_loaders {
            table
                .register_shared_loader(*kind, Arc::clone(loader))
                .map_err(|e| fail(e.to_string()))?;
        }
        register_builtin_loaders(&table).map_err(|e| fail(e.to_string()))?;

        self.backend
            .resize(init.canvas_width, init.canvas_height)
            .map_err(|e| fail(e.to_string()))?;

        let max_entities = init.schema.max_entities();
        Ok(Bridge {
            schema: init.schema,
            channel: init.channel,
            table,
            stats: init.stats,
            simulation: init.simulation,
            tick_duration: init.tick_duration,
            renderables: SlotArena::new(max_entities),
            scene: SceneGraph::new(max_entities, init.canvas_width, init.canvas_height),
            next_generation: 0,
            scene_generation: 0,
            camera_generation: 0,
            unsynced: SlotArena::new(max_entities),
        })
    }

    fn start(&mut self) {
        match self.lifecycle {
            Lifecycle::Initialized => {
                self.lifecycle = Lifecycle::Running;
                info!("Presentation context running");
            }
            Lifecycle::Running => Self::violation("StartContext while running"),
            Lifecycle::Uninitialized => Self::violation("StartContext before InitializeContext"),
        }
    }

    fn load_resource(&mut self, resource_id: ResourceId, definition: ResourceDefinition) {
        let Some(bridge) = self.bridge.as_ref() else {
            return;
        };
        let notify = bridge.simulation.clone();
        if let Err(error) = bridge.table.load_resource(resource_id, definition) {
            warn!(resource_id, operation = "LoadResource", %error, "Load rejected");
            let _ = notify.send(Message::ResourceFailed {
                resource_id,
                error: error.to_string(),
            });
            return;
        }

        match bridge.table.pending(resource_id) {
            Some(pending) => pending.on_resolve(move |outcome| {
                let message = match outcome {
                    Ok(_) => Message::ResourceLoaded { resource_id },
                    Err(error) => Message::ResourceFailed {
                        resource_id,
                        error: error.to_string(),
                    },
                };
                let _ = notify.send(message);
            }),
            None => {
                let message = match bridge.table.get(resource_id).map(|r| (r.state, r.error)) {
                    Some((ResourceState::Error, error)) => Message::ResourceFailed {
                        resource_id,
                        error: error.map_or_else(|| "unknown".to_owned(), |e| e.to_string()),
                    },
                    _ => Message::ResourceLoaded { resource_id },
                };
                let _ = notify.send(message);
            }
        }
    }

    fn adjust_ref(&mut self, resource_id: ResourceId, add: bool) {
        let Some(bridge) = self.bridge.as_ref() else {
            return;
        };
        let (operation, result) = if add {
            ("AddResourceRef", bridge.table.add_ref(resource_id))
        } else {
            ("RemoveResourceRef", bridge.table.remove_ref(resource_id))
        };
        match result {
            Ok(refcount) => trace!(resource_id, operation, refcount, "Refcount changed"),
            Err(error) => warn!(resource_id, operation, %error, "Refcount unchanged"),
        }
    }

    fn export(&mut self, options: &ExportOptions) {
        let Some(bridge) = self.bridge.as_ref() else {
            return;
        };
        match self.backend.export(&bridge.scene, options) {
            Ok(bytes) => {
                debug!(len = bytes.len(), "Scene exported");
                self.reply(Message::SceneExported { bytes });
            }
            Err(error) => {
                warn!(operation = "ExportScene", %error, "Export failed");
                self.reply(Message::ContextError(error.to_string()));
            }
        }
    }

    /// Runs one frame with `dt` since the previous one.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::ProtocolViolation`] unless running, or the
    /// backend's error. Per-entity problems are logged, never returned.
    pub fn frame(&mut self, dt: Duration) -> ContextResult<FrameReport> {
        let started = Instant::now();
        if self.lifecycle != Lifecycle::Running {
            return Err(ContextError::ProtocolViolation(format!(
                "frame requested while {:?}",
                self.lifecycle
            )));
        }
        let Some(bridge) = self.bridge.as_mut() else {
            return Err(ContextError::ProtocolViolation("frame without channel".into()));
        };

        // Only what was queued before this frame; redelivery may requeue.
        for requeue in self.requeue_rx.try_iter().take(self.requeue_rx.len()) {
            bridge.redeliver(requeue, &self.requeue_tx);
        }
        for message in std::mem::take(&mut self.queue) {
            bridge.apply(message, &self.requeue_tx);
        }

        if let Some((width, height)) = self.pending_resize.take() {
            self.backend.resize(width, height)?;
            bridge.scene.set_size(width, height);
            debug!(width, height, aspect = bridge.scene.aspect(), "Canvas resized");
        }

        bridge.channel.swap_for_read();
        let alpha = self.clock.alpha(dt, bridge.tick_duration);
        bridge.sync_transforms(alpha);

        let report = self.backend.render(&bridge.scene)?;
        self.frames += 1;

        let staleness = bridge.channel.staleness();
        bridge.stats.record(&FrameSample {
            delta: dt,
            work: started.elapsed(),
            swaps: staleness.swaps,
            stale_frames: staleness.stale_frames,
            overwritten_ticks: bridge.channel.shared().overwritten(),
            draw_calls: report.draw_calls,
            renderables: bridge.scene.len() as u64,
        });
        Ok(report)
    }

    /// Processes messages and renders frames until `Shutdown` or until
    /// every sender of `inbox` is gone.
    pub fn run(mut self, inbox: &Receiver<Message>) {
        let budget = self.config.frame_duration();
        let mut last = Instant::now();

        'outer: loop {
            if self.lifecycle != Lifecycle::Running {
                match inbox.recv() {
                    Ok(message) => {
                        if self.handle_message(message).is_break() {
                            break;
                        }
                    }
                    Err(_) => break,
                }
                last = Instant::now();
                continue;
            }

            loop {
                match inbox.try_recv() {
                    Ok(message) => {
                        if self.handle_message(message).is_break() {
                            break 'outer;
                        }
                    }
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => break 'outer,
                }
            }

            let now = Instant::now();
            let dt = now - last;
            last = now;
            if let Err(error) = self.frame(dt) {
                warn!(frame = self.frames, %error, "Frame failed");
            }

            let spent = now.elapsed();
            if spent < budget {
                std::thread::sleep(budget - spent);
            }
        }
        info!(frames = self.frames, "Presentation context stopped");
    }
}
