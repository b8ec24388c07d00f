//! # Tandem Demo
//!
//! Headless run of the full pipeline: a camera and a spinning box, ticked
//! at the configured rate for a few seconds, then exported as JSON.
//!
//! ```text
//! tandem-demo [config.toml] [seconds]
//! RUST_LOG=tandem_runtime=debug tandem-demo
//! ```

use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use tandem_core::{Quat, Transform, Vec3};
use tandem_resources::{
    CameraDefinition, GeometryDefinition, GeometryShape, MaterialDefinition, MeshDefinition, Projection,
    ResourceDefinition, SceneDefinition,
};
use tandem_runtime::{ContextResult, EngineConfig, ExportOptions, HeadlessBackend, Host, ResourceStatus};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const CAMERA: u32 = 0;
const CUBE: u32 = 1;
const SCENE: u32 = 2;

fn main() -> ContextResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args = std::env::args().skip(1);
    let config = match args.next() {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };
    let seconds: u64 = args.next().and_then(|s| s.parse().ok()).unwrap_or(3);

    let mut host = Host::new(config).launch(HeadlessBackend::new())?;
    let Some(mut sim) = host.take_simulation() else {
        return Ok(());
    };

    let geometry = sim.load_resource(ResourceDefinition::Geometry(GeometryDefinition {
        name: Some("cube".into()),
        shape: GeometryShape::unit_box(),
    }))?;
    let material = sim.load_resource(ResourceDefinition::Material(MaterialDefinition {
        base_color_factor: [0.9, 0.3, 0.2, 1.0],
        roughness_factor: 0.4,
        metallic_factor: 0.0,
        ..MaterialDefinition::default()
    }))?;
    let mesh = sim.load_resource(ResourceDefinition::Mesh(MeshDefinition {
        name: Some("cube".into()),
        geometry,
        material,
        cast_shadow: true,
        receive_shadow: true,
    }))?;
    let camera = sim.load_resource(ResourceDefinition::Camera(CameraDefinition {
        name: Some("main".into()),
        projection: Projection::Perspective {
            yfov: 0.8,
            aspect_ratio: None,
            znear: 0.1,
            zfar: Some(100.0),
        },
    }))?;
    let scene = sim.load_resource(ResourceDefinition::Scene(SceneDefinition {
        name: Some("demo".into()),
        background_color: Some([0.05, 0.05, 0.08]),
        environment_texture: None,
    }))?;

    sim.add_renderable(CAMERA, camera)?;
    sim.set_transform(
        CAMERA,
        &Transform {
            position: Vec3::new(0.0, 1.5, 5.0),
            ..Transform::IDENTITY
        },
    )?;
    sim.set_active_camera(CAMERA);
    sim.set_active_scene(SCENE, scene);
    sim.add_renderable(CUBE, mesh)?;
    sim.set_interpolate(CUBE, true)?;

    let shutdown = AtomicBool::new(false);
    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut angle = 0.0_f32;
    std::thread::scope(|scope| {
        scope.spawn(|| {
            while Instant::now() < deadline {
                std::thread::sleep(Duration::from_millis(50));
            }
            shutdown.store(true, std::sync::atomic::Ordering::Release);
        });
        sim.run(
            |sim, dt| {
                angle += dt.as_secs_f32();
                let (s, c) = (angle * 0.5).sin_cos();
                let spin = Transform {
                    rotation: Quat::new(0.0, s, 0.0, c),
                    ..Transform::IDENTITY
                };
                if let Err(error) = sim.set_transform(CUBE, &spin) {
                    warn!(%error, "Cube update failed");
                }
            },
            &shutdown,
        );
    });

    for id in [geometry, material, mesh, camera, scene] {
        match sim.resource_status(id) {
            Some(ResourceStatus::Loaded) => {}
            status => warn!(resource_id = id, ?status, "Resource not loaded"),
        }
    }

    let stats = host.stats();
    info!(
        frames = stats.frames,
        ticks = sim.ticks(),
        draw_calls = stats.last.draw_calls,
        stale_frames = stats.last.stale_frames,
        overwritten_ticks = stats.last.overwritten_ticks,
        "Run finished"
    );

    let bytes = host.export_scene(
        ExportOptions {
            include_hidden: false,
            pretty: true,
        },
        Duration::from_secs(1),
    )?;
    println!("{}", String::from_utf8_lossy(&bytes));

    host.shutdown()
}
