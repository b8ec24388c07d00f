//! # Context Messages
//!
//! The closed envelope exchanged between the host, the simulation context
//! and the presentation context.
//!
//! ## Message Flow
//! ```text
//! host ──InitializeContext──▶ presentation ──ContextInitialized──▶ host
//! host ──StartContext───────▶ presentation
//! sim  ──LoadResource───────▶ presentation ──ResourceLoaded──────▶ sim
//! sim  ──AddResourceRef─────▶ presentation
//! sim  ──AddRenderable──────▶ presentation   (queued until next frame)
//! host ──ExportScene────────▶ presentation ──SceneExported───────▶ host
//! ```
//!
//! Only bytes and plain data cross; handles in `InitializeContext` are the
//! shared channel endpoints themselves.

use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError, SendError, Sender, TryRecvError};
use serde::{Deserialize, Serialize};
use tandem_core::{CursorView, EntityId, RenderableSchema, TripleBufferConsumer};
use tandem_resources::{ResourceDefinition, ResourceId, ResourceIdAllocator};

use crate::stats::ContextStats;

/// Scene export settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportOptions {
    /// Include hidden nodes.
    pub include_hidden: bool,
    /// Indented output.
    pub pretty: bool,
}

/// Everything the presentation context needs to start.
pub struct InitializeContext {
    /// Initial canvas width.
    pub canvas_width: u32,
    /// Initial canvas height.
    pub canvas_height: u32,
    /// Layout of each region.
    pub schema: RenderableSchema,
    /// Read side of the state channel.
    pub channel: TripleBufferConsumer<CursorView>,
    /// Id space shared with the simulation.
    pub allocator: ResourceIdAllocator,
    /// Stats written every frame.
    pub stats: Arc<ContextStats>,
    /// Where resource notifications go.
    pub simulation: Sender<Message>,
    /// Length of one simulation tick.
    pub tick_duration: Duration,
}

impl std::fmt::Debug for InitializeContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializeContext")
            .field("canvas_width", &self.canvas_width)
            .field("canvas_height", &self.canvas_height)
            .field("max_entities", &self.schema.max_entities())
            .field("tick_duration", &self.tick_duration)
            .finish_non_exhaustive()
    }
}

/// Messages bound for the presentation's renderable queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderableMessage {
    /// Bind `entity` to `resource_id`.
    AddRenderable {
        /// Entity.
        entity: EntityId,
        /// Resource to draw.
        resource_id: ResourceId,
    },
    /// Unbind `entity`.
    RemoveRenderable {
        /// Entity.
        entity: EntityId,
    },
    /// Use `entity`'s bound camera.
    SetActiveCamera {
        /// Entity.
        entity: EntityId,
    },
    /// Make `resource_id` the scene root, owned by `entity`.
    SetActiveScene {
        /// Entity.
        entity: EntityId,
        /// Scene resource.
        resource_id: ResourceId,
    },
}

/// Envelope exchanged between contexts.
#[derive(Debug)]
pub enum Message {
    /// host → presentation
    InitializeContext(Box<InitializeContext>),
    /// presentation → host
    ContextInitialized,
    /// presentation → host
    ContextError(String),
    /// host → presentation
    StartContext,
    /// host → presentation
    Resize {
        /// Pixels.
        width: u32,
        /// Pixels.
        height: u32,
    },
    /// Queued renderable operation.
    Renderable(RenderableMessage),
    /// Load `definition` under `resource_id`.
    LoadResource {
        /// Id minted by the sender.
        resource_id: ResourceId,
        /// What to load.
        definition: ResourceDefinition,
    },
    /// Take a reference.
    AddResourceRef {
        /// Resource.
        resource_id: ResourceId,
    },
    /// Release a reference.
    RemoveResourceRef {
        /// Resource.
        resource_id: ResourceId,
    },
    /// host → presentation
    ExportScene(ExportOptions),
    /// presentation → host
    SceneExported {
        /// Encoded scene.
        bytes: Vec<u8>,
    },
    /// presentation → simulation
    ResourceLoaded {
        /// Resource.
        resource_id: ResourceId,
    },
    /// presentation → simulation
    ResourceFailed {
        /// Resource.
        resource_id: ResourceId,
        /// Loader's reason.
        error: String,
    },
    /// Ends the receiving loop.
    Shutdown,
}

impl Message {
    /// Tag for logs.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::InitializeContext(_) => "InitializeContext",
            Self::ContextInitialized => "ContextInitialized",
            Self::ContextError(_) => "ContextError",
            Self::StartContext => "StartContext",
            Self::Resize { .. } => "Resize",
            Self::Renderable(RenderableMessage::AddRenderable { .. }) => "AddRenderable",
            Self::Renderable(RenderableMessage::RemoveRenderable { .. }) => "RemoveRenderable",
            Self::Renderable(RenderableMessage::SetActiveCamera { .. }) => "SetActiveCamera",
            Self::Renderable(RenderableMessage::SetActiveScene { .. }) => "SetActiveScene",
            Self::LoadResource { .. } => "LoadResource",
            Self::AddResourceRef { .. } => "AddResourceRef",
            Self::RemoveResourceRef { .. } => "RemoveResourceRef",
            Self::ExportScene(_) => "ExportScene",
            Self::SceneExported { .. } => "SceneExported",
            Self::ResourceLoaded { .. } => "ResourceLoaded",
            Self::ResourceFailed { .. } => "ResourceFailed",
            Self::Shutdown => "Shutdown",
        }
    }
}

impl From<RenderableMessage> for Message {
    fn from(message: RenderableMessage) -> Self {
        Self::Renderable(message)
    }
}

/// Unbounded message channel. Either end can be cloned to another thread.
pub struct MessageChannel {
    sender: Sender<Message>,
    receiver: Receiver<Message>,
}

impl MessageChannel {
    /// Creates an unbounded channel.
    #[must_use]
    pub fn new() -> Self {
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self { sender, receiver }
    }

    /// Sends without blocking.
    ///
    /// # Errors
    ///
    /// Fails only if every receiver is gone.
    pub fn send(&self, message: Message) -> Result<(), SendError<Message>> {
        self.sender.send(message)
    }

    /// Receives without blocking.
    ///
    /// # Errors
    ///
    /// `Empty` if nothing is queued, `Disconnected` if every sender is gone.
    pub fn try_recv(&self) -> Result<Message, TryRecvError> {
        self.receiver.try_recv()
    }

    /// Receives, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// `Timeout` or `Disconnected`.
    pub fn recv_timeout(&self, timeout: Duration) -> Result<Message, RecvTimeoutError> {
        self.receiver.recv_timeout(timeout)
    }

    /// Another sender for this channel.
    #[must_use]
    pub fn sender(&self) -> Sender<Message> {
        self.sender.clone()
    }

    /// Another receiver for this channel.
    #[must_use]
    pub fn receiver(&self) -> Receiver<Message> {
        self.receiver.clone()
    }
}

impl Default for MessageChannel {
    fn default() -> Self {
        Self::new()
    }
}
