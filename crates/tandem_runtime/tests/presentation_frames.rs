//! Frame-level behavior of the presentation context, driven directly.
//!
//! Geometry named `slow-*` is held behind a gate until the test opens it,
//! which makes "still loading" a deterministic state.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::Receiver;
use tandem_core::{CursorView, Mat4, RenderableSchema, RenderableState, TripleBuffer, TripleBufferProducer, Vec3};
use tandem_resources::loaders::GeometryLoader;
use tandem_resources::{
    CameraDefinition, GeometryDefinition, GeometryShape, LoadContext, LoadFuture, Projection, ResourceDefinition,
    ResourceId, ResourceIdAllocator, ResourceKind, ResourceLoader, SceneDefinition,
};
use tandem_runtime::{
    ContextError, ContextStats, EngineConfig, ExportOptions, HeadlessBackend, InitializeContext, Lifecycle, Message,
    PresentationContext, RenderableMessage,
};
use tokio::sync::Semaphore;

const WAIT: Duration = Duration::from_secs(5);
const TICK: Duration = Duration::from_millis(16);
const MAX_ENTITIES: usize = 16;

#[derive(Clone)]
struct GatedGeometry {
    gate: Arc<Semaphore>,
}

impl ResourceLoader for GatedGeometry {
    fn load(&self, ctx: LoadContext, definition: ResourceDefinition) -> LoadFuture {
        let gate = Arc::clone(&self.gate);
        let slow = definition.name().is_some_and(|name| name.starts_with("slow"));
        Box::pin(async move {
            if slow {
                match gate.acquire().await {
                    Ok(permit) => permit.forget(),
                    Err(e) => return Err(ctx.fail(e.to_string())),
                }
            }
            GeometryLoader.load(ctx, definition).await
        })
    }
}

struct Rig {
    _runtime: tokio::runtime::Runtime,
    context: PresentationContext<HeadlessBackend>,
    producer: TripleBufferProducer<CursorView>,
    schema: RenderableSchema,
    allocator: ResourceIdAllocator,
    gate: Arc<Semaphore>,
    host_rx: Receiver<Message>,
    sim_rx: Receiver<Message>,
}

impl Rig {
    fn uninitialized() -> (Self, InitializeContext) {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let schema = RenderableSchema::new(MAX_ENTITIES);
        let (producer, consumer) = TripleBuffer::new(|| schema.create_region());
        let (host_tx, host_rx) = crossbeam_channel::unbounded();
        let (sim_tx, sim_rx) = crossbeam_channel::unbounded();
        let allocator = ResourceIdAllocator::new();
        let gate = Arc::new(Semaphore::new(0));

        let context = PresentationContext::new(
            EngineConfig::default(),
            HeadlessBackend::new(),
            runtime.handle().clone(),
            host_tx,
        )
        .with_loader(ResourceKind::Geometry, GatedGeometry { gate: Arc::clone(&gate) });

        let init = InitializeContext {
            canvas_width: 800,
            canvas_height: 600,
            schema,
            channel: consumer,
            allocator: allocator.clone(),
            stats: Arc::new(ContextStats::new()),
            simulation: sim_tx,
            tick_duration: TICK,
        };
        let rig = Self {
            _runtime: runtime,
            context,
            producer,
            schema,
            allocator,
            gate,
            host_rx,
            sim_rx,
        };
        (rig, init)
    }

    fn running() -> Self {
        let (mut rig, init) = Self::uninitialized();
        rig.send(Message::InitializeContext(Box::new(init)));
        assert!(matches!(rig.host_rx.try_recv(), Ok(Message::ContextInitialized)));
        rig.send(Message::StartContext);
        assert_eq!(rig.context.lifecycle(), Lifecycle::Running);
        rig
    }

    fn send(&mut self, message: impl Into<Message>) {
        assert_eq!(self.context.handle_message(message.into()), ControlFlow::Continue(()));
    }

    fn load(&mut self, definition: ResourceDefinition) -> ResourceId {
        let resource_id = self.allocator.allocate().unwrap();
        self.send(Message::LoadResource {
            resource_id,
            definition,
        });
        resource_id
    }

    fn load_geometry(&mut self, name: &str) -> ResourceId {
        self.load(ResourceDefinition::Geometry(GeometryDefinition {
            name: Some(name.into()),
            shape: GeometryShape::unit_box(),
        }))
    }

    fn wait(&self, id: ResourceId) {
        if let Some(pending) = self.context.resources().unwrap().pending(id) {
            assert!(pending.wait_timeout(WAIT).is_some(), "load {id} timed out");
        }
    }

    fn frame(&mut self) {
        self.context.frame(Duration::from_millis(8)).unwrap();
    }

    fn publish(&mut self, entity: u32, state: &RenderableState) {
        self.schema
            .write_entity(self.producer.write_region(), entity, state)
            .unwrap();
        self.producer.publish();
    }

    fn position(&self, entity: u32) -> [f32; 3] {
        self.context
            .scene()
            .unwrap()
            .node(entity)
            .unwrap()
            .transform
            .position
            .to_array()
    }
}

fn moved_to(x: f32, needs_update: bool, interpolate: bool) -> RenderableState {
    RenderableState {
        world_matrix: Mat4::from_translation(Vec3::new(x, 0.0, 0.0)),
        world_matrix_needs_update: needs_update,
        resource_id: 1,
        interpolate,
        visible: true,
    }
}

fn assert_close(actual: [f32; 3], expected: [f32; 3]) {
    for (a, e) in actual.iter().zip(expected) {
        assert!((a - e).abs() < 1e-4, "{actual:?} != {expected:?}");
    }
}

#[test]
fn entity_stays_unbound_until_its_resource_resolves() {
    let mut rig = Rig::running();
    let slow = rig.load_geometry("slow-5");

    rig.send(RenderableMessage::AddRenderable {
        entity: 5,
        resource_id: slow,
    });
    rig.frame();
    assert_eq!(rig.context.binding(5), None);
    assert_eq!(rig.context.requested(5), Some(slow));

    rig.gate.add_permits(1);
    rig.wait(slow);
    rig.frame();
    assert_eq!(rig.context.binding(5), Some(slow));
}

#[test]
fn stale_continuation_does_not_overwrite_newer_binding() {
    let mut rig = Rig::running();
    let a = rig.load_geometry("slow-a");
    let b = rig.load_geometry("fast-b");
    rig.wait(b);

    rig.send(RenderableMessage::AddRenderable {
        entity: 7,
        resource_id: a,
    });
    rig.send(RenderableMessage::AddRenderable {
        entity: 7,
        resource_id: b,
    });
    rig.frame();
    assert_eq!(rig.context.binding(7), Some(b));

    rig.gate.add_permits(1);
    rig.wait(a);
    rig.frame();
    rig.frame();
    assert_eq!(rig.context.binding(7), Some(b));
    assert_eq!(rig.context.requested(7), Some(b));
}

#[test]
fn rebind_to_loading_resource_detaches_previous_node() {
    let mut rig = Rig::running();
    let x = rig.load_geometry("fast-x");
    rig.wait(x);
    rig.send(Message::AddResourceRef { resource_id: x });
    rig.send(RenderableMessage::AddRenderable {
        entity: 7,
        resource_id: x,
    });
    rig.frame();
    assert_eq!(rig.context.binding(7), Some(x));

    let y = rig.load_geometry("slow-y");
    rig.send(Message::AddResourceRef { resource_id: y });
    rig.send(RenderableMessage::AddRenderable {
        entity: 7,
        resource_id: y,
    });
    rig.send(Message::RemoveResourceRef { resource_id: x });
    rig.frame();
    assert!(rig.context.resources().unwrap().get(x).is_none());
    assert_eq!(rig.context.binding(7), None);
    assert_eq!(rig.context.requested(7), Some(y));
    assert!(rig.context.scene().unwrap().node(7).is_none());

    rig.gate.add_permits(1);
    rig.wait(y);
    rig.frame();
    assert_eq!(rig.context.binding(7), Some(y));
}

#[test]
fn removed_entity_is_not_bound_by_late_load() {
    let mut rig = Rig::running();
    let slow = rig.load_geometry("slow-r");
    rig.send(RenderableMessage::AddRenderable {
        entity: 2,
        resource_id: slow,
    });
    rig.send(RenderableMessage::RemoveRenderable { entity: 2 });
    rig.frame();

    rig.gate.add_permits(1);
    rig.wait(slow);
    rig.frame();
    assert_eq!(rig.context.binding(2), None);
    assert_eq!(rig.context.requested(2), None);
}

#[test]
fn transform_without_needs_update_is_left_alone() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-3");
    rig.wait(id);
    rig.send(RenderableMessage::AddRenderable { entity: 3, resource_id: id });

    rig.publish(3, &moved_to(1.0, true, false));
    rig.frame();
    assert_close(rig.position(3), [1.0, 0.0, 0.0]);

    rig.publish(3, &moved_to(9.0, false, false));
    rig.frame();
    assert_close(rig.position(3), [1.0, 0.0, 0.0]);
}

#[test]
fn interpolated_entity_blends_by_frame_over_tick() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-4");
    rig.wait(id);
    rig.send(RenderableMessage::AddRenderable { entity: 4, resource_id: id });
    rig.publish(4, &moved_to(0.0, true, true));
    rig.frame();
    assert_close(rig.position(4), [0.0, 0.0, 0.0]);

    // 8ms frame over a 16ms tick
    rig.publish(4, &moved_to(2.0, true, true));
    rig.frame();
    assert_close(rig.position(4), [1.0, 0.0, 0.0]);
}

#[test]
fn node_bound_before_first_tick_snaps_to_it() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-s");
    rig.wait(id);
    rig.send(RenderableMessage::AddRenderable { entity: 8, resource_id: id });
    rig.frame();
    assert_close(rig.position(8), [0.0, 0.0, 0.0]);

    // Flag already cleared by the producer; the matrix still applies once.
    rig.publish(8, &moved_to(5.0, false, true));
    rig.frame();
    assert_close(rig.position(8), [5.0, 0.0, 0.0]);

    rig.publish(8, &moved_to(7.0, false, true));
    rig.frame();
    assert_close(rig.position(8), [5.0, 0.0, 0.0]);
}

#[test]
fn every_node_bound_before_first_tick_snaps_once() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-many");
    rig.wait(id);
    for entity in [11, 12, 13] {
        rig.send(RenderableMessage::AddRenderable { entity, resource_id: id });
    }
    rig.frame();

    let region = rig.producer.write_region();
    for (entity, x) in [(11, 1.0), (12, 2.0), (13, 3.0)] {
        rig.schema.write_entity(region, entity, &moved_to(x, false, true)).unwrap();
    }
    rig.producer.publish();
    rig.frame();
    assert_close(rig.position(11), [1.0, 0.0, 0.0]);
    assert_close(rig.position(12), [2.0, 0.0, 0.0]);
    assert_close(rig.position(13), [3.0, 0.0, 0.0]);

    // Snapped once; later ticks blend as usual
    rig.publish(12, &moved_to(4.0, true, true));
    rig.frame();
    assert_close(rig.position(12), [3.0, 0.0, 0.0]);
}

#[test]
fn hidden_entity_is_not_drawn() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-h");
    rig.wait(id);
    rig.send(RenderableMessage::AddRenderable { entity: 1, resource_id: id });

    let mut state = moved_to(0.0, true, false);
    state.visible = false;
    rig.publish(1, &state);
    let report = rig.context.frame(Duration::from_millis(8)).unwrap();
    assert_eq!(report.visible, 0);
    assert!(!rig.context.scene().unwrap().node(1).unwrap().visible);
}

#[test]
fn failed_and_unknown_resources_leave_entity_unbound() {
    let mut rig = Rig::running();
    let broken = rig.load(ResourceDefinition::Geometry(GeometryDefinition {
        name: Some("flat".into()),
        shape: GeometryShape::Plane {
            width: 0.0,
            height: 1.0,
        },
    }));
    rig.wait(broken);
    assert!(matches!(
        rig.sim_rx.recv_timeout(WAIT),
        Ok(Message::ResourceFailed { resource_id, .. }) if resource_id == broken
    ));

    rig.send(RenderableMessage::AddRenderable {
        entity: 1,
        resource_id: broken,
    });
    rig.send(RenderableMessage::AddRenderable {
        entity: 2,
        resource_id: 999,
    });
    rig.frame();
    assert_eq!(rig.context.binding(1), None);
    assert_eq!(rig.context.binding(2), None);
}

#[test]
fn successful_load_notifies_simulation() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-n");
    assert!(matches!(
        rig.sim_rx.recv_timeout(WAIT),
        Ok(Message::ResourceLoaded { resource_id }) if resource_id == id
    ));
}

#[test]
fn messages_before_initialization_are_dropped() {
    let (mut rig, init) = Rig::uninitialized();
    rig.send(Message::StartContext);
    rig.send(RenderableMessage::AddRenderable {
        entity: 1,
        resource_id: 1,
    });
    assert_eq!(rig.context.lifecycle(), Lifecycle::Uninitialized);
    assert!(matches!(
        rig.context.frame(Duration::from_millis(8)),
        Err(ContextError::ProtocolViolation(_))
    ));

    rig.send(Message::InitializeContext(Box::new(init)));
    assert_eq!(rig.context.lifecycle(), Lifecycle::Initialized);
    assert!(rig.context.frame(Duration::from_millis(8)).is_err());
    rig.send(Message::StartContext);
    rig.frame();
    assert_eq!(rig.context.requested(1), None);
    assert!(rig.context.scene().unwrap().is_empty());
}

#[test]
fn initialization_failure_is_reported_to_host() {
    let (mut rig, mut init) = Rig::uninitialized();
    init.schema = RenderableSchema::new(MAX_ENTITIES * 2);
    rig.send(Message::InitializeContext(Box::new(init)));

    assert!(matches!(rig.host_rx.try_recv(), Ok(Message::ContextError(_))));
    assert_eq!(rig.context.lifecycle(), Lifecycle::Uninitialized);
    assert!(rig.context.resources().is_none());
}

#[test]
fn shutdown_breaks_the_loop() {
    let mut rig = Rig::running();
    assert_eq!(rig.context.handle_message(Message::Shutdown), ControlFlow::Break(()));
}

#[test]
fn camera_and_scene_are_applied_once_loaded() {
    let mut rig = Rig::running();
    let camera = rig.load(ResourceDefinition::Camera(CameraDefinition {
        name: None,
        projection: Projection::Perspective {
            yfov: 1.0,
            aspect_ratio: None,
            znear: 0.1,
            zfar: None,
        },
    }));
    let scene = rig.load(ResourceDefinition::Scene(SceneDefinition::default()));

    rig.send(RenderableMessage::AddRenderable {
        entity: 0,
        resource_id: camera,
    });
    rig.send(RenderableMessage::SetActiveCamera { entity: 0 });
    rig.send(RenderableMessage::SetActiveScene {
        entity: 9,
        resource_id: scene,
    });
    rig.wait(camera);
    rig.wait(scene);
    rig.frame();
    rig.frame();

    let graph = rig.context.scene().unwrap();
    assert_eq!(graph.camera_entity(), Some(0));
    assert_eq!(graph.root().map(|root| root.resource_id), Some(scene));
}

#[test]
fn camera_request_for_non_camera_is_ignored() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-c");
    rig.wait(id);
    rig.send(RenderableMessage::AddRenderable { entity: 1, resource_id: id });
    rig.send(RenderableMessage::SetActiveCamera { entity: 1 });
    rig.frame();
    assert_eq!(rig.context.scene().unwrap().camera_entity(), None);
}

#[test]
fn resize_applies_on_next_frame() {
    let mut rig = Rig::running();
    assert_eq!(rig.context.backend().size(), (800, 600));
    rig.send(Message::Resize {
        width: 1920,
        height: 1080,
    });
    assert_eq!(rig.context.backend().size(), (800, 600));
    rig.frame();
    assert_eq!(rig.context.backend().size(), (1920, 1080));
    assert_eq!(rig.context.scene().unwrap().size(), (1920, 1080));
}

#[test]
fn export_replies_with_scene_json() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-e");
    rig.wait(id);
    rig.send(RenderableMessage::AddRenderable { entity: 6, resource_id: id });
    rig.frame();

    rig.send(Message::ExportScene(ExportOptions::default()));
    let Ok(Message::SceneExported { bytes }) = rig.host_rx.try_recv() else {
        panic!("no export reply");
    };
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["nodes"][0]["entity"], 6);
    assert_eq!(json["nodes"][0]["kind"], "geometry");
}

#[test]
fn releasing_last_reference_evicts() {
    let mut rig = Rig::running();
    let id = rig.load_geometry("fast-ref");
    rig.wait(id);

    rig.send(Message::AddResourceRef { resource_id: id });
    rig.send(Message::AddResourceRef { resource_id: id });
    rig.send(Message::RemoveResourceRef { resource_id: id });
    assert!(rig.context.resources().unwrap().get(id).is_some());
    rig.send(Message::RemoveResourceRef { resource_id: id });
    assert!(rig.context.resources().unwrap().get(id).is_none());
}
