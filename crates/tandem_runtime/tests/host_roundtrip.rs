//! Full round trip through a launched host: handshake, loads, ticks,
//! frames, export, shutdown.

use std::time::{Duration, Instant};

use tandem_core::{Transform, Vec3};
use tandem_resources::{
    GeometryDefinition, GeometryShape, MaterialDefinition, MeshDefinition, ResourceDefinition,
};
use tandem_runtime::{
    ContextError, EngineConfig, ExportOptions, HeadlessBackend, Host, ResourceStatus, SimulationContext,
};

const WAIT: Duration = Duration::from_secs(5);

fn config() -> EngineConfig {
    EngineConfig::from_toml_str(
        r"
        [channel]
        max_entities = 64
        tick_rate = 100

        [presentation]
        target_frame_rate = 200
        ",
    )
    .unwrap()
}

/// Ticks until `done` holds or the wait runs out.
fn tick_until(sim: &mut SimulationContext, mut done: impl FnMut(&mut SimulationContext) -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        let _ = sim.poll_messages();
        sim.tick().unwrap();
        if done(sim) {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    false
}

#[test]
fn mesh_is_drawn_and_exported() {
    let mut host = Host::new(config()).launch(HeadlessBackend::new()).unwrap();
    let sim = host.simulation_mut().unwrap();

    let geometry = sim
        .load_resource(ResourceDefinition::Geometry(GeometryDefinition {
            name: None,
            shape: GeometryShape::unit_box(),
        }))
        .unwrap();
    let material = sim
        .load_resource(ResourceDefinition::Material(MaterialDefinition::default()))
        .unwrap();
    let mesh = sim
        .load_resource(ResourceDefinition::Mesh(MeshDefinition {
            name: Some("crate".into()),
            geometry,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }))
        .unwrap();
    sim.add_renderable(1, mesh).unwrap();
    sim.set_transform(
        1,
        &Transform {
            position: Vec3::new(0.0, 3.0, 0.0),
            ..Transform::IDENTITY
        },
    )
    .unwrap();

    assert!(tick_until(sim, |sim| sim.resource_status(mesh) == Some(&ResourceStatus::Loaded)));

    let drawn = {
        let deadline = Instant::now() + WAIT;
        loop {
            let sim = host.simulation_mut().unwrap();
            sim.tick().unwrap();
            if host.stats().last.draw_calls == 1 {
                break true;
            }
            if Instant::now() > deadline {
                break false;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
    };
    assert!(drawn, "mesh never drawn: {:?}", host.stats());

    let bytes = host.export_scene(ExportOptions::default(), WAIT).unwrap();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["nodes"][0]["entity"], 1);
    assert_eq!(json["nodes"][0]["resource_id"], mesh);
    let y = json["nodes"][0]["position"][1].as_f64().unwrap();
    assert!((y - 3.0).abs() < 1e-4);

    host.shutdown().unwrap();
}

#[test]
fn failed_load_is_reported_to_simulation() {
    let mut host = Host::new(config()).launch(HeadlessBackend::new()).unwrap();
    let mut sim = host.take_simulation().unwrap();
    assert!(host.simulation_mut().is_none());

    let broken = sim
        .load_resource(ResourceDefinition::Geometry(GeometryDefinition {
            name: None,
            shape: GeometryShape::Plane {
                width: -1.0,
                height: 1.0,
            },
        }))
        .unwrap();
    assert!(tick_until(&mut sim, |sim| matches!(
        sim.resource_status(broken),
        Some(ResourceStatus::Failed(_))
    )));

    host.shutdown().unwrap();
}

#[test]
fn invalid_config_is_rejected_before_launch() {
    let mut config = EngineConfig::default();
    config.presentation.lerp_smoothing = 1.5;
    assert!(matches!(
        Host::new(config).launch(HeadlessBackend::new()),
        Err(ContextError::Config(_))
    ));
}

#[test]
fn dropping_the_handle_stops_the_thread() {
    let host = Host::new(config()).launch(HeadlessBackend::new()).unwrap();
    host.resize(320, 240);
    drop(host);
}
