//! Scene graph: what the backend draws this frame.
//!
//! Nodes are keyed by entity id. Payloads are shared with the resource
//! table, so detaching a node never frees the resource itself.

use serde::Serialize;
use tandem_core::{EntityId, SlotArena, Transform};
use tandem_resources::{Payload, ResourceId, ResourceKind};

use crate::error::{ContextError, ContextResult};
use crate::protocol::ExportOptions;

/// One drawable object bound to an entity.
#[derive(Debug, Clone)]
pub struct SceneNode {
    /// Owning entity.
    pub entity: EntityId,
    /// Backing resource.
    pub resource_id: ResourceId,
    /// Kind of the backing resource.
    pub kind: ResourceKind,
    /// Loaded payload.
    pub payload: Payload,
    /// Rendered transform.
    pub transform: Transform,
    /// Drawn when true.
    pub visible: bool,
}

/// Active scene root.
#[derive(Debug, Clone)]
pub struct SceneRoot {
    /// Entity that owns the scene.
    pub entity: EntityId,
    /// Scene resource.
    pub resource_id: ResourceId,
    /// Scene payload.
    pub payload: Payload,
}

/// Attached nodes plus the active scene, camera and canvas size.
#[derive(Debug)]
pub struct SceneGraph {
    root: Option<SceneRoot>,
    nodes: SlotArena<SceneNode>,
    camera: Option<EntityId>,
    width: u32,
    height: u32,
}

#[derive(Serialize)]
struct ExportedNode {
    entity: EntityId,
    resource_id: ResourceId,
    kind: ResourceKind,
    position: [f32; 3],
    rotation: [f32; 4],
    scale: [f32; 3],
    visible: bool,
}

#[derive(Serialize)]
struct ExportedScene {
    scene: Option<ResourceId>,
    camera: Option<EntityId>,
    width: u32,
    height: u32,
    nodes: Vec<ExportedNode>,
}

impl SceneGraph {
    /// Empty graph with room for `capacity` entities.
    #[must_use]
    pub fn new(capacity: usize, width: u32, height: u32) -> Self {
        Self {
            root: None,
            nodes: SlotArena::new(capacity),
            camera: None,
            width,
            height,
        }
    }

    /// Attaches `node`, returning the node it replaced.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::EntityOutOfRange`] if the entity is past
    /// capacity.
    pub fn attach(&mut self, node: SceneNode) -> ContextResult<Option<SceneNode>> {
        let entity = node.entity;
        self.nodes.insert(entity, node).map_err(|_| ContextError::EntityOutOfRange {
            entity,
            max: self.nodes.capacity(),
        })
    }

    /// Detaches the node of `entity`. Clears the camera if it was this one.
    pub fn detach(&mut self, entity: EntityId) -> Option<SceneNode> {
        if self.camera == Some(entity) {
            self.camera = None;
        }
        self.nodes.remove(entity)
    }

    /// Node bound to `entity`.
    #[must_use]
    pub fn node(&self, entity: EntityId) -> Option<&SceneNode> {
        self.nodes.get(entity)
    }

    /// Attached nodes in entity order.
    pub fn nodes(&self) -> impl Iterator<Item = &SceneNode> + '_ {
        self.nodes.iter().map(|(_, node)| node)
    }

    /// Mutable nodes in entity order.
    pub fn nodes_mut(&mut self) -> impl Iterator<Item = &mut SceneNode> + '_ {
        self.nodes.iter_mut().map(|(_, node)| node)
    }

    /// Number of attached nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// True if nothing is attached.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Active scene root.
    #[must_use]
    pub const fn root(&self) -> Option<&SceneRoot> {
        self.root.as_ref()
    }

    /// Replaces the scene root. Attached nodes move under the new root.
    pub fn set_root(&mut self, root: SceneRoot) -> Option<SceneRoot> {
        self.root.replace(root)
    }

    /// Entity of the active camera.
    #[must_use]
    pub const fn camera_entity(&self) -> Option<EntityId> {
        self.camera
    }

    /// Active camera node.
    #[must_use]
    pub fn camera(&self) -> Option<&SceneNode> {
        self.camera.and_then(|entity| self.nodes.get(entity))
    }

    /// Selects the camera. The entity must be attached.
    pub fn set_camera(&mut self, entity: EntityId) -> bool {
        if self.nodes.contains(entity) {
            self.camera = Some(entity);
            true
        } else {
            false
        }
    }

    /// Canvas size in pixels.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Sets the canvas size.
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width;
        self.height = height;
    }

    /// Width / height of the canvas.
    #[must_use]
    pub fn aspect(&self) -> f32 {
        if self.height == 0 {
            1.0
        } else {
            self.width as f32 / self.height as f32
        }
    }

    /// Encodes the graph as JSON.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Backend`] if encoding fails.
    pub fn export(&self, options: &ExportOptions) -> ContextResult<Vec<u8>> {
        let nodes = self
            .nodes()
            .filter(|node| options.include_hidden || node.visible)
            .map(|node| ExportedNode {
                entity: node.entity,
                resource_id: node.resource_id,
                kind: node.kind,
                position: node.transform.position.to_array(),
                rotation: [
                    node.transform.rotation.x,
                    node.transform.rotation.y,
                    node.transform.rotation.z,
                    node.transform.rotation.w,
                ],
                scale: node.transform.scale.to_array(),
                visible: node.visible,
            })
            .collect();
        let scene = ExportedScene {
            scene: self.root.as_ref().map(|root| root.resource_id),
            camera: self.camera,
            width: self.width,
            height: self.height,
            nodes,
        };
        let encoded = if options.pretty {
            serde_json::to_vec_pretty(&scene)
        } else {
            serde_json::to_vec(&scene)
        };
        encoded.map_err(|e| ContextError::Backend(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn node(entity: EntityId, visible: bool) -> SceneNode {
        SceneNode {
            entity,
            resource_id: 10 + entity,
            kind: ResourceKind::Mesh,
            payload: Arc::new(()),
            transform: Transform::IDENTITY,
            visible,
        }
    }

    #[test]
    fn test_attach_replace_detach() {
        let mut graph = SceneGraph::new(8, 640, 480);
        assert!(graph.attach(node(3, true)).unwrap().is_none());
        assert!(graph.attach(node(3, false)).unwrap().is_some());
        assert_eq!(graph.len(), 1);

        assert!(graph.set_camera(3));
        assert_eq!(graph.camera_entity(), Some(3));
        assert!(graph.detach(3).is_some());
        assert_eq!(graph.camera_entity(), None);
        assert!(graph.is_empty());
    }

    #[test]
    fn test_out_of_range_and_missing_camera() {
        let mut graph = SceneGraph::new(4, 1, 1);
        assert!(matches!(
            graph.attach(node(4, true)),
            Err(ContextError::EntityOutOfRange { entity: 4, max: 4 })
        ));
        assert!(!graph.set_camera(1));
    }

    #[test]
    fn test_export_filters_hidden() {
        let mut graph = SceneGraph::new(8, 800, 400);
        graph.attach(node(1, true)).unwrap();
        graph.attach(node(2, false)).unwrap();
        assert!((graph.aspect() - 2.0).abs() < f32::EPSILON);

        let visible: serde_json::Value =
            serde_json::from_slice(&graph.export(&ExportOptions::default()).unwrap()).unwrap();
        assert_eq!(visible["nodes"].as_array().unwrap().len(), 1);

        let all: serde_json::Value = serde_json::from_slice(
            &graph
                .export(&ExportOptions {
                    include_hidden: true,
                    pretty: true,
                })
                .unwrap(),
        )
        .unwrap();
        assert_eq!(all["nodes"].as_array().unwrap().len(), 2);
        assert_eq!(all["nodes"][0]["kind"], "mesh");
    }
}
