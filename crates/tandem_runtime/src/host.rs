//! # Host
//!
//! Wires the two contexts together and owns everything they share:
//!
//! ```text
//! ┌──────────┐  InitializeContext   ┌────────────────────┐
//! │   Host   │ ───────────────────▶ │ presentation thread │
//! │          │ ◀─────────────────── │  (frame loop)       │
//! └──────────┘  ContextInitialized  └────────────────────┘
//!      │                                  ▲      │
//!      │ SimulationContext                │ msgs │ ResourceLoaded
//!      ▼                                  │      ▼
//! ┌──────────────────────────────────────────────────────┐
//! │ caller's thread: update + tick at the fixed rate      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Loaders run on a tokio runtime the handle keeps alive until shutdown.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use tandem_core::{RenderableSchema, TripleBuffer};
use tandem_resources::{ResourceIdAllocator, ResourceKind, ResourceLoader};
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::error::{ContextError, ContextResult};
use crate::presentation::{PresentationContext, RenderBackend};
use crate::protocol::{ExportOptions, InitializeContext, Message, MessageChannel};
use crate::simulation::SimulationContext;
use crate::stats::{ContextStats, StatsSnapshot};

/// How long the handshake may take.
pub const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(5);

/// How long loader tasks get to finish at shutdown.
const RUNTIME_SHUTDOWN_TIMEOUT: Duration = Duration::from_millis(500);

/// Builds and launches a context pair.
pub struct Host {
    config: EngineConfig,
    loaders: Vec<(ResourceKind, Arc<dyn ResourceLoader>)>,
}

impl std::fmt::Debug for Host {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Host")
            .field("config", &self.config)
            .field("loaders", &self.loaders.iter().map(|(kind, _)| *kind).collect::<Vec<_>>())
            .finish()
    }
}

impl Host {
    /// Host for `config`.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            loaders: Vec::new(),
        }
    }

    /// Replaces the built-in loader for `kind`.
    #[must_use]
    pub fn with_loader(mut self, kind: ResourceKind, loader: impl ResourceLoader) -> Self {
        let loader: Arc<dyn ResourceLoader> = Arc::new(loader);
        self.loaders.push((kind, loader));
        self
    }

    /// Starts the presentation thread and completes the handshake.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] for an invalid configuration and
    /// [`ContextError::InitializationFailure`] if the runtime or thread
    /// cannot start, or the presentation context rejects initialization.
    pub fn launch<B: RenderBackend>(self, backend: B) -> ContextResult<HostHandle> {
        let Self { config, loaders } = self;
        config.validate()?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(config.resources.loader_threads)
            .thread_name("tandem-loader")
            .enable_all()
            .build()
            .map_err(|e| ContextError::InitializationFailure(format!("loader runtime: {e}")))?;

        let schema = RenderableSchema::new(config.channel.max_entities);
        let (producer, consumer) = TripleBuffer::new(|| schema.create_region());
        let allocator = ResourceIdAllocator::new();
        let stats = Arc::new(ContextStats::new());

        let to_presentation = MessageChannel::new();
        let to_host = MessageChannel::new();
        let to_simulation = MessageChannel::new();

        let mut presentation =
            PresentationContext::new(config.clone(), backend, runtime.handle().clone(), to_host.sender());
        for (kind, loader) in loaders {
            presentation = presentation.with_shared_loader(kind, loader);
        }

        let inbox = to_presentation.receiver();
        let thread = std::thread::Builder::new()
            .name("tandem-presentation".into())
            .spawn(move || presentation.run(&inbox))
            .map_err(|e| ContextError::InitializationFailure(format!("presentation thread: {e}")))?;

        let mut handle = HostHandle {
            presentation: to_presentation.sender(),
            replies: to_host.receiver(),
            simulation: None,
            thread: Some(thread),
            runtime: Some(runtime),
            stats: Arc::clone(&stats),
        };

        handle.send(Message::InitializeContext(Box::new(InitializeContext {
            canvas_width: config.presentation.canvas_width,
            canvas_height: config.presentation.canvas_height,
            schema,
            channel: consumer,
            allocator: allocator.clone(),
            stats,
            simulation: to_simulation.sender(),
            tick_duration: config.tick_duration(),
        })));

        // Dropping the handle on failure shuts the thread down.
        handle.await_handshake()?;
        handle.send(Message::StartContext);

        handle.simulation = Some(SimulationContext::new(
            schema,
            producer,
            allocator,
            to_presentation.sender(),
            to_simulation.receiver(),
            config.tick_duration(),
        ));
        info!(
            max_entities = config.channel.max_entities,
            tick_rate = config.channel.tick_rate,
            "Host launched"
        );
        Ok(handle)
    }
}

/// Running context pair.
#[derive(Debug)]
pub struct HostHandle {
    presentation: Sender<Message>,
    replies: Receiver<Message>,
    simulation: Option<SimulationContext>,
    thread: Option<JoinHandle<()>>,
    runtime: Option<Runtime>,
    stats: Arc<ContextStats>,
}

impl HostHandle {
    fn send(&self, message: Message) {
        let name = message.name();
        if self.presentation.send(message).is_err() {
            warn!(message = name, "Presentation thread gone");
        }
    }

    fn await_handshake(&self) -> ContextResult<()> {
        let deadline = Instant::now() + HANDSHAKE_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok(Message::ContextInitialized) => return Ok(()),
                Ok(Message::ContextError(reason)) => return Err(ContextError::InitializationFailure(reason)),
                Ok(other) => debug!(message = other.name(), "Ignored during handshake"),
                Err(RecvTimeoutError::Timeout) => {
                    return Err(ContextError::InitializationFailure("handshake timed out".into()));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    return Err(ContextError::InitializationFailure("presentation thread exited".into()));
                }
            }
        }
    }

    /// The simulation context, unless taken.
    pub fn simulation_mut(&mut self) -> Option<&mut SimulationContext> {
        self.simulation.as_mut()
    }

    /// Moves the simulation context out, e.g. onto its own thread.
    pub fn take_simulation(&mut self) -> Option<SimulationContext> {
        self.simulation.take()
    }

    /// Resizes the canvas from the next frame on.
    pub fn resize(&self, width: u32, height: u32) {
        self.send(Message::Resize { width, height });
    }

    /// Exports the scene as of the frame that handles the request.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Backend`] if the export fails or no reply
    /// arrives within `timeout`.
    pub fn export_scene(&self, options: ExportOptions, timeout: Duration) -> ContextResult<Vec<u8>> {
        self.send(Message::ExportScene(options));
        let deadline = Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            match self.replies.recv_timeout(remaining) {
                Ok(Message::SceneExported { bytes }) => return Ok(bytes),
                Ok(Message::ContextError(reason)) => return Err(ContextError::Backend(reason)),
                Ok(other) => debug!(message = other.name(), "Ignored while exporting"),
                Err(_) => return Err(ContextError::Backend("no export reply".into())),
            }
        }
    }

    /// Latest frame stats.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Stops the presentation thread and the loader runtime.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Backend`] if the presentation thread panicked.
    pub fn shutdown(mut self) -> ContextResult<()> {
        self.stop()
    }

    fn stop(&mut self) -> ContextResult<()> {
        let Some(thread) = self.thread.take() else {
            return Ok(());
        };
        self.send(Message::Shutdown);
        let joined = thread.join();
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(RUNTIME_SHUTDOWN_TIMEOUT);
        }
        info!("Host stopped");
        joined.map_err(|_| ContextError::Backend("presentation thread panicked".into()))
    }
}

impl Drop for HostHandle {
    fn drop(&mut self) {
        if let Err(error) = self.stop() {
            warn!(%error, "Unclean host shutdown");
        }
    }
}
