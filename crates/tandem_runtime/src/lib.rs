//! # Tandem Runtime
//!
//! A fixed-rate simulation and a variable-rate presentation, joined by a
//! lock-free triple-buffered byte channel and a closed message protocol:
//! - `SimulationContext` writes renderable state and publishes once per tick
//! - `PresentationContext` swaps for read once per frame, blends, renders
//! - `Host` launches the presentation thread and performs the handshake
//!
//! ## Architecture Rules
//!
//! 1. **Bytes and messages only** - no object graph is shared between contexts
//! 2. **Neither side waits** - a slow frame reads the newest tick, a slow tick
//!    is re-rendered
//! 3. **Bad input is logged, not fatal** - only initialization can fail a context
//!
//! ## Example
//!
//! ```rust,ignore
//! use tandem_runtime::{EngineConfig, HeadlessBackend, Host};
//!
//! let mut host = Host::new(EngineConfig::default()).launch(HeadlessBackend::new())?;
//! let sim = host.simulation_mut().unwrap();
//! let mesh = sim.load_resource(definition)?;
//! sim.add_renderable(1, mesh)?;
//! sim.tick()?;
//! host.shutdown()?;
//! ```

#![deny(missing_docs)]
#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]
#![allow(clippy::cast_precision_loss)]

pub mod config;
pub mod error;
pub mod host;
pub mod presentation;
pub mod protocol;
pub mod simulation;
pub mod stats;

pub use config::{ChannelConfig, EngineConfig, PresentationConfig, ResourceConfig};
pub use error::{ContextError, ContextResult};
pub use host::{Host, HostHandle};
pub use presentation::{
    FrameClock, FrameReport, HeadlessBackend, Lifecycle, PresentationContext, RenderBackend, SceneGraph, SceneNode,
    SceneRoot,
};
pub use protocol::{ExportOptions, InitializeContext, Message, MessageChannel, RenderableMessage};
pub use simulation::{ResourceStatus, SimulationContext};
pub use stats::{ContextStats, FrameSample, StatsSnapshot};
