//! End-to-end loads through the built-in loaders.

use std::sync::Arc;
use std::time::Duration;

use tandem_resources::loaders::{GeometryData, MeshData, SceneData, TextureData};
use tandem_resources::{
    register_builtin_loaders, GeometryDefinition, GeometryShape, MaterialDefinition, MeshDefinition,
    ResourceDefinition, ResourceError, ResourceIdAllocator, ResourceState, ResourceTable, SceneDefinition,
    TextureDefinition, TextureType,
};

const WAIT: Duration = Duration::from_secs(5);

fn setup() -> (tokio::runtime::Runtime, ResourceTable) {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap();
    let table = ResourceTable::new(ResourceIdAllocator::new(), runtime.handle().clone());
    register_builtin_loaders(&table).unwrap();
    (runtime, table)
}

fn wait(table: &ResourceTable, id: u32) {
    if let Some(pending) = table.pending(id) {
        assert!(pending.wait_timeout(WAIT).is_some(), "load {id} timed out");
    }
}

#[test]
fn mesh_waits_for_geometry_and_material() {
    let (_rt, table) = setup();

    let geometry = table
        .request_load(ResourceDefinition::Geometry(GeometryDefinition {
            name: Some("crate".into()),
            shape: GeometryShape::unit_box(),
        }))
        .unwrap();
    let material = table
        .request_load(ResourceDefinition::Material(MaterialDefinition {
            roughness_factor: 3.0,
            ..MaterialDefinition::default()
        }))
        .unwrap();
    let mesh = table
        .request_load(ResourceDefinition::Mesh(MeshDefinition {
            name: None,
            geometry,
            material,
            cast_shadow: true,
            receive_shadow: true,
        }))
        .unwrap();

    wait(&table, mesh);
    assert_eq!(table.state(mesh), Some(ResourceState::Loaded));

    let payload = table.payload(mesh).unwrap();
    let data = payload.downcast_ref::<MeshData>().unwrap();
    assert_eq!(data.geometry.triangle_count(), 12);
    assert_eq!(data.geometry.name.as_deref(), Some("crate"));
    assert!((data.material.roughness - 1.0).abs() < f32::EPSILON);
    assert!(data.cast_shadow);

    // The mesh shares the geometry payload rather than copying it
    let geometry_payload = table.payload(geometry).unwrap().downcast::<GeometryData>().unwrap();
    assert!(Arc::ptr_eq(&geometry_payload, &data.geometry));
}

#[test]
fn mesh_fails_when_dependency_is_unknown() {
    let (_rt, table) = setup();
    let mesh = table
        .request_load(ResourceDefinition::Mesh(MeshDefinition {
            name: None,
            geometry: 900,
            material: 901,
            cast_shadow: false,
            receive_shadow: false,
        }))
        .unwrap();

    wait(&table, mesh);
    let record = table.get(mesh).unwrap();
    assert_eq!(record.state, ResourceState::Error);
    assert_eq!(record.error, Some(ResourceError::UnknownResource(900)));
}

#[test]
fn mesh_fails_when_dependency_has_wrong_kind() {
    let (_rt, table) = setup();
    let scene = table
        .request_load(ResourceDefinition::Scene(SceneDefinition::default()))
        .unwrap();
    let material = table
        .request_load(ResourceDefinition::Material(MaterialDefinition::default()))
        .unwrap();
    let mesh = table
        .request_load(ResourceDefinition::Mesh(MeshDefinition {
            name: None,
            geometry: scene,
            material,
            cast_shadow: false,
            receive_shadow: false,
        }))
        .unwrap();

    wait(&table, mesh);
    assert!(matches!(
        table.get(mesh).unwrap().error,
        Some(ResourceError::WrongPayload { id, .. }) if id == scene
    ));
}

#[test]
fn texture_reads_file_and_scene_uses_it() {
    let (_rt, table) = setup();
    let path = std::env::temp_dir().join(format!("tandem-sky-{}.hdr", std::process::id()));
    std::fs::write(&path, b"#?RADIANCE\nFORMAT=32-bit_rle_rgbe\n").unwrap();

    let texture = table
        .request_load(ResourceDefinition::Texture(TextureDefinition {
            name: Some("sky".into()),
            texture_type: TextureType::Rgbe,
            url: path.to_string_lossy().into_owned(),
        }))
        .unwrap();
    let scene = table
        .request_load(ResourceDefinition::Scene(SceneDefinition {
            name: Some("main".into()),
            background_color: Some([0.1, 0.1, 0.1]),
            environment_texture: Some(texture),
        }))
        .unwrap();

    wait(&table, scene);
    let payload = table.payload(scene).unwrap();
    let scene_data = payload.downcast_ref::<SceneData>().unwrap();
    let environment: &TextureData = scene_data.environment.as_deref().unwrap();
    assert!(environment.bytes.starts_with(b"#?RADIANCE"));

    let _ = std::fs::remove_file(path);
}

#[test]
fn missing_texture_file_is_an_error_state() {
    let (_rt, table) = setup();
    let texture = table
        .request_load(ResourceDefinition::Texture(TextureDefinition {
            name: None,
            texture_type: TextureType::Raw,
            url: "/nonexistent/tandem/texture.bin".into(),
        }))
        .unwrap();

    wait(&table, texture);
    assert_eq!(table.state(texture), Some(ResourceState::Error));
    assert_eq!(table.stats().loads_failed, 1);
}
