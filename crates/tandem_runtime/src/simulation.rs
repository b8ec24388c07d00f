//! # Simulation Context
//!
//! The producer side. Owns per-entity renderable state, writes it into the
//! writing region once per tick and publishes. Binding changes travel as
//! messages; transforms travel only through the channel.
//!
//! ## Reference Counting
//!
//! Every reference the presentation's resource table holds was taken by this
//! context, so a local mirror of the counts tells it when an id has been
//! evicted and may no longer be reused for de-duplication.

use std::collections::HashMap;
use std::ops::ControlFlow;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tandem_core::{CursorView, EntityId, Mat4, RenderableSchema, RenderableState, SlotArena, Transform, TripleBufferProducer};
use tandem_resources::{ResourceDefinition, ResourceId, ResourceIdAllocator};
use tracing::{debug, info, trace, warn};

use crate::error::{ContextError, ContextResult};
use crate::protocol::{Message, RenderableMessage};

/// Ticks run back to back before the accumulator is dropped.
const MAX_CATCH_UP_TICKS: u32 = 8;

/// What the simulation knows about a resource it asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResourceStatus {
    /// `LoadResource` sent, no answer yet.
    Pending,
    /// Loaded.
    Loaded,
    /// Failed with the loader's reason.
    Failed(String),
}

/// Producer half of the context pair.
pub struct SimulationContext {
    schema: RenderableSchema,
    channel: TripleBufferProducer<CursorView>,
    entities: SlotArena<RenderableState>,
    presentation: Sender<Message>,
    inbox: Receiver<Message>,
    allocator: ResourceIdAllocator,
    known: HashMap<String, ResourceId>,
    keys: HashMap<ResourceId, String>,
    status: HashMap<ResourceId, ResourceStatus>,
    refs: HashMap<ResourceId, u32>,
    active_scene: Option<(EntityId, ResourceId)>,
    ticks: u64,
    tick_duration: Duration,
}

impl std::fmt::Debug for SimulationContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulationContext")
            .field("max_entities", &self.schema.max_entities())
            .field("entities", &self.entities.len())
            .field("ticks", &self.ticks)
            .field("tick_duration", &self.tick_duration)
            .finish_non_exhaustive()
    }
}

impl SimulationContext {
    /// Creates a context writing into `channel` and messaging `presentation`.
    #[must_use]
    pub fn new(
        schema: RenderableSchema,
        channel: TripleBufferProducer<CursorView>,
        allocator: ResourceIdAllocator,
        presentation: Sender<Message>,
        inbox: Receiver<Message>,
        tick_duration: Duration,
    ) -> Self {
        Self {
            schema,
            channel,
            entities: SlotArena::new(schema.max_entities()),
            presentation,
            inbox,
            allocator,
            known: HashMap::new(),
            keys: HashMap::new(),
            status: HashMap::new(),
            refs: HashMap::new(),
            active_scene: None,
            ticks: 0,
            tick_duration,
        }
    }

    fn send(&self, message: impl Into<Message>) {
        let message = message.into();
        let name = message.name();
        if self.presentation.send(message).is_err() {
            debug!(message = name, "Presentation gone, message dropped");
        }
    }

    fn slot(&mut self, entity: EntityId) -> ContextResult<&mut RenderableState> {
        let out_of_range = ContextError::EntityOutOfRange {
            entity,
            max: self.schema.max_entities(),
        };
        if !self.entities.contains(entity) {
            self.entities
                .insert(entity, RenderableState::default())
                .map_err(|_| out_of_range.clone())?;
        }
        self.entities.get_mut(entity).ok_or(out_of_range)
    }

    /// Sets the world matrix and flags it for the next tick.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EntityOutOfRange`] past the channel capacity.
    pub fn set_world_matrix(&mut self, entity: EntityId, matrix: Mat4) -> ContextResult<()> {
        let state = self.slot(entity)?;
        state.world_matrix = matrix;
        state.world_matrix_needs_update = true;
        Ok(())
    }

    /// Composes `transform` and sets it as the world matrix.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EntityOutOfRange`] past the channel capacity.
    pub fn set_transform(&mut self, entity: EntityId, transform: &Transform) -> ContextResult<()> {
        self.set_world_matrix(entity, Mat4::compose(transform))
    }

    /// Shows or hides the entity.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EntityOutOfRange`] past the channel capacity.
    pub fn set_visible(&mut self, entity: EntityId, visible: bool) -> ContextResult<()> {
        self.slot(entity)?.visible = visible;
        Ok(())
    }

    /// Blend toward new transforms instead of snapping.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EntityOutOfRange`] past the channel capacity.
    pub fn set_interpolate(&mut self, entity: EntityId, interpolate: bool) -> ContextResult<()> {
        self.slot(entity)?.interpolate = interpolate;
        Ok(())
    }

    /// Current state of `entity`.
    #[must_use]
    pub fn state(&self, entity: EntityId) -> Option<&RenderableState> {
        self.entities.get(entity)
    }

    /// Binds `entity` to `resource_id`, releasing the previous binding.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EntityOutOfRange`] past the channel capacity.
    pub fn add_renderable(&mut self, entity: EntityId, resource_id: ResourceId) -> ContextResult<()> {
        let state = self.slot(entity)?;
        let previous = std::mem::replace(&mut state.resource_id, resource_id);
        if previous == resource_id {
            self.send(RenderableMessage::AddRenderable { entity, resource_id });
            return Ok(());
        }

        // New reference first: a resource shared by both bindings must not
        // pass through zero.
        self.retain(resource_id);
        self.send(RenderableMessage::AddRenderable { entity, resource_id });
        self.release(previous);
        Ok(())
    }

    /// Unbinds `entity` and drops its reference.
    pub fn remove_renderable(&mut self, entity: EntityId) {
        let Some(state) = self.entities.remove(entity) else {
            trace!(entity, "remove_renderable on unknown entity");
            return;
        };
        self.send(RenderableMessage::RemoveRenderable { entity });
        self.release(state.resource_id);
    }

    /// Uses the camera bound to `entity`.
    pub fn set_active_camera(&mut self, entity: EntityId) {
        self.send(RenderableMessage::SetActiveCamera { entity });
    }

    /// Makes `resource_id` the active scene.
    pub fn set_active_scene(&mut self, entity: EntityId, resource_id: ResourceId) {
        self.retain(resource_id);
        self.send(RenderableMessage::SetActiveScene { entity, resource_id });
        if let Some((_, previous)) = self.active_scene.replace((entity, resource_id)) {
            self.release(previous);
        }
    }

    /// Requests `definition`, reusing the id of an equal definition that is
    /// still alive and has not failed.
    ///
    /// # Errors
    ///
    /// Fails if the definition cannot be encoded or ids are exhausted.
    pub fn load_resource(&mut self, definition: ResourceDefinition) -> ContextResult<ResourceId> {
        let key = definition.canonical_key()?;
        if let Some(&id) = self.known.get(&key) {
            if !matches!(self.status.get(&id), Some(ResourceStatus::Failed(_))) {
                trace!(resource_id = id, "Load de-duplicated");
                return Ok(id);
            }
            self.forget(id);
        }

        let resource_id = self.allocator.allocate()?;
        debug!(resource_id, kind = %definition.kind(), "Requesting load");
        self.known.insert(key.clone(), resource_id);
        self.keys.insert(resource_id, key);
        self.status.insert(resource_id, ResourceStatus::Pending);
        self.send(Message::LoadResource {
            resource_id,
            definition,
        });
        Ok(resource_id)
    }

    /// Last status reported for `resource_id`.
    #[must_use]
    pub fn resource_status(&self, resource_id: ResourceId) -> Option<&ResourceStatus> {
        self.status.get(&resource_id)
    }

    /// References this context holds on `resource_id`.
    #[must_use]
    pub fn ref_count(&self, resource_id: ResourceId) -> u32 {
        self.refs.get(&resource_id).copied().unwrap_or(0)
    }

    fn retain(&mut self, resource_id: ResourceId) {
        if resource_id == 0 {
            return;
        }
        *self.refs.entry(resource_id).or_insert(0) += 1;
        self.send(Message::AddResourceRef { resource_id });
    }

    fn release(&mut self, resource_id: ResourceId) {
        if resource_id == 0 {
            return;
        }
        let Some(count) = self.refs.get_mut(&resource_id) else {
            return;
        };
        *count -= 1;
        if *count == 0 {
            self.refs.remove(&resource_id);
            // Evicted on the other side; its id may be handed out again.
            self.forget(resource_id);
        }
        self.send(Message::RemoveResourceRef { resource_id });
    }

    fn forget(&mut self, resource_id: ResourceId) {
        if let Some(key) = self.keys.remove(&resource_id) {
            self.known.remove(&key);
        }
        self.status.remove(&resource_id);
    }

    /// Drains notifications from the presentation. Breaks on `Shutdown` or
    /// when the presentation is gone.
    pub fn poll_messages(&mut self) -> ControlFlow<()> {
        loop {
            let message = match self.inbox.try_recv() {
                Ok(message) => message,
                Err(TryRecvError::Empty) => return ControlFlow::Continue(()),
                Err(TryRecvError::Disconnected) => return ControlFlow::Break(()),
            };
            match message {
                Message::ResourceLoaded { resource_id } => {
                    if let Some(status) = self.status.get_mut(&resource_id) {
                        *status = ResourceStatus::Loaded;
                        debug!(resource_id, "Resource loaded");
                    }
                }
                Message::ResourceFailed { resource_id, error } => {
                    if let Some(status) = self.status.get_mut(&resource_id) {
                        warn!(resource_id, %error, "Resource failed to load");
                        *status = ResourceStatus::Failed(error);
                    }
                }
                Message::Shutdown => return ControlFlow::Break(()),
                other => {
                    let error = ContextError::ProtocolViolation(format!(
                        "{} is not addressed to the simulation context",
                        other.name()
                    ));
                    warn!(%error, "Message dropped");
                }
            }
        }
    }

    /// Writes every entity into the writing region, publishes it and clears
    /// the needs-update flags. Returns how many fields changed.
    ///
    /// # Errors
    ///
    /// Fails only if the region does not match the schema.
    pub fn tick(&mut self) -> ContextResult<usize> {
        let region = self.channel.write_region();
        let mut written = 0;
        for (entity, state) in self.entities.iter() {
            written += self.schema.write_entity(region, entity, state)?;
        }
        self.channel.publish();

        for (_, state) in self.entities.iter_mut() {
            state.world_matrix_needs_update = false;
        }
        self.ticks += 1;
        trace!(tick = self.ticks, written, "Tick published");
        Ok(written)
    }

    /// Ticks published.
    #[must_use]
    pub const fn ticks(&self) -> u64 {
        self.ticks
    }

    /// Fixed tick length.
    #[must_use]
    pub const fn tick_duration(&self) -> Duration {
        self.tick_duration
    }

    /// Runs `update` then [`tick`](Self::tick) at the fixed rate until
    /// `shutdown` is set or the presentation goes away.
    pub fn run<F>(&mut self, mut update: F, shutdown: &AtomicBool)
    where
        F: FnMut(&mut Self, Duration),
    {
        let tick = self.tick_duration;
        let mut accumulator = Duration::ZERO;
        let mut last = Instant::now();
        info!(tick_us = tick.as_micros() as u64, "Simulation running");

        while !shutdown.load(Ordering::Acquire) {
            if self.poll_messages().is_break() {
                break;
            }

            let now = Instant::now();
            accumulator += now - last;
            last = now;

            let mut steps = 0;
            while accumulator >= tick && steps < MAX_CATCH_UP_TICKS {
                update(self, tick);
                if let Err(error) = self.tick() {
                    warn!(tick = self.ticks, %error, "Tick failed");
                }
                accumulator -= tick;
                steps += 1;
            }
            if steps == MAX_CATCH_UP_TICKS {
                warn!(dropped_us = accumulator.as_micros() as u64, "Simulation behind, dropping time");
                accumulator = Duration::ZERO;
            }

            std::thread::sleep(tick.saturating_sub(accumulator));
        }
        info!(ticks = self.ticks, "Simulation stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tandem_core::{TripleBuffer, Vec3};
    use tandem_resources::{GeometryDefinition, GeometryShape};

    fn context(max: usize) -> (SimulationContext, Receiver<Message>, Sender<Message>, tandem_core::TripleBufferConsumer<CursorView>) {
        let schema = RenderableSchema::new(max);
        let (producer, consumer) = TripleBuffer::new(|| schema.create_region());
        let (to_presentation, presentation_rx) = crossbeam_channel::unbounded();
        let (to_simulation, inbox) = crossbeam_channel::unbounded();
        let sim = SimulationContext::new(
            schema,
            producer,
            ResourceIdAllocator::new(),
            to_presentation,
            inbox,
            Duration::from_millis(16),
        );
        (sim, presentation_rx, to_simulation, consumer)
    }

    fn drain(rx: &Receiver<Message>) -> Vec<&'static str> {
        rx.try_iter().map(|m| m.name()).collect()
    }

    fn box_geometry() -> ResourceDefinition {
        ResourceDefinition::Geometry(GeometryDefinition {
            name: None,
            shape: GeometryShape::unit_box(),
        })
    }

    #[test]
    fn test_tick_publishes_and_clears_needs_update() {
        let (mut sim, _rx, _tx, mut consumer) = context(8);
        let schema = RenderableSchema::new(8);
        sim.set_world_matrix(3, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0))).unwrap();
        assert!(sim.tick().unwrap() > 0);
        assert!(!sim.state(3).unwrap().world_matrix_needs_update);

        assert!(consumer.swap_for_read());
        let state = schema.read_entity(consumer.read_region(), 3).unwrap();
        assert!(state.world_matrix_needs_update);
        assert_eq!(state.world_matrix, Mat4::from_translation(Vec3::new(1.0, 2.0, 3.0)));

        sim.tick().unwrap();
        assert!(consumer.swap_for_read());
        assert!(!schema.read_needs_update(consumer.read_region(), 3).unwrap());
    }

    #[test]
    fn test_out_of_range_entity() {
        let (mut sim, _rx, _tx, _consumer) = context(4);
        assert_eq!(
            sim.set_visible(4, false),
            Err(ContextError::EntityOutOfRange { entity: 4, max: 4 })
        );
    }

    #[test]
    fn test_load_is_deduplicated_locally() {
        let (mut sim, rx, _tx, _consumer) = context(4);
        let a = sim.load_resource(box_geometry()).unwrap();
        let b = sim.load_resource(box_geometry()).unwrap();
        assert_eq!(a, b);
        assert_eq!(drain(&rx), vec!["LoadResource"]);
        assert_eq!(sim.resource_status(a), Some(&ResourceStatus::Pending));
    }

    #[test]
    fn test_failed_load_is_retried_under_new_id() {
        let (mut sim, rx, tx, _consumer) = context(4);
        let a = sim.load_resource(box_geometry()).unwrap();
        tx.send(Message::ResourceFailed {
            resource_id: a,
            error: "boom".into(),
        })
        .unwrap();
        assert!(sim.poll_messages().is_continue());
        assert_eq!(sim.resource_status(a), Some(&ResourceStatus::Failed("boom".into())));

        let b = sim.load_resource(box_geometry()).unwrap();
        assert_ne!(a, b);
        assert_eq!(drain(&rx), vec!["LoadResource", "LoadResource"]);
    }

    #[test]
    fn test_rebind_takes_new_ref_before_releasing_old() {
        let (mut sim, rx, _tx, _consumer) = context(8);
        sim.add_renderable(2, 10).unwrap();
        sim.add_renderable(2, 11).unwrap();
        assert_eq!(sim.ref_count(10), 0);
        assert_eq!(sim.ref_count(11), 1);
        assert_eq!(
            drain(&rx),
            vec![
                "AddResourceRef",
                "AddRenderable",
                "AddResourceRef",
                "AddRenderable",
                "RemoveResourceRef",
            ]
        );

        sim.remove_renderable(2);
        assert_eq!(sim.ref_count(11), 0);
        assert_eq!(drain(&rx), vec!["RemoveRenderable", "RemoveResourceRef"]);
    }

    #[test]
    fn test_release_forgets_evicted_definition() {
        let (mut sim, _rx, _tx, _consumer) = context(8);
        let id = sim.load_resource(box_geometry()).unwrap();
        sim.add_renderable(1, id).unwrap();
        sim.remove_renderable(1);
        assert_eq!(sim.resource_status(id), None);
    }

    #[test]
    fn test_shutdown_breaks_poll() {
        let (mut sim, _rx, tx, _consumer) = context(1);
        tx.send(Message::Shutdown).unwrap();
        assert!(sim.poll_messages().is_break());
    }
}
