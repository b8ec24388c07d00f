//! Render backend boundary.
//!
//! The presentation context owns the scene graph; a backend only draws it.
//! GPU backends live outside this crate. [`HeadlessBackend`] counts what it
//! would draw.

use tandem_core::EntityId;
use tandem_resources::loaders::MeshData;
use tracing::debug;

use crate::error::ContextResult;
use crate::protocol::ExportOptions;

use super::scene::SceneGraph;

/// What one frame drew.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Draw calls issued.
    pub draw_calls: u64,
    /// Visible nodes.
    pub visible: u64,
    /// Camera used.
    pub camera: Option<EntityId>,
}

/// Draws a [`SceneGraph`].
pub trait RenderBackend: Send + 'static {
    /// Canvas resized.
    ///
    /// # Errors
    ///
    /// Backend-specific.
    fn resize(&mut self, width: u32, height: u32) -> ContextResult<()>;

    /// Draws one frame.
    ///
    /// # Errors
    ///
    /// Backend-specific. The frame loop logs and continues.
    fn render(&mut self, scene: &SceneGraph) -> ContextResult<FrameReport>;

    /// Encodes the scene.
    ///
    /// # Errors
    ///
    /// Backend-specific.
    fn export(&mut self, scene: &SceneGraph, options: &ExportOptions) -> ContextResult<Vec<u8>> {
        scene.export(options)
    }
}

/// Backend that draws nothing and counts meshes.
#[derive(Debug, Default)]
pub struct HeadlessBackend {
    size: (u32, u32),
    frames: u64,
    last: FrameReport,
}

impl HeadlessBackend {
    /// New backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Frames rendered.
    #[must_use]
    pub const fn frames(&self) -> u64 {
        self.frames
    }

    /// Last report.
    #[must_use]
    pub const fn last_report(&self) -> FrameReport {
        self.last
    }

    /// Size from the last resize.
    #[must_use]
    pub const fn size(&self) -> (u32, u32) {
        self.size
    }
}

impl RenderBackend for HeadlessBackend {
    fn resize(&mut self, width: u32, height: u32) -> ContextResult<()> {
        debug!(width, height, "Headless resize");
        self.size = (width, height);
        Ok(())
    }

    fn render(&mut self, scene: &SceneGraph) -> ContextResult<FrameReport> {
        let mut report = FrameReport {
            camera: scene.camera_entity(),
            ..FrameReport::default()
        };
        for node in scene.nodes().filter(|node| node.visible) {
            report.visible += 1;
            if node.payload.is::<MeshData>() {
                report.draw_calls += 1;
            }
        }
        self.frames += 1;
        self.last = report;
        Ok(report)
    }
}
