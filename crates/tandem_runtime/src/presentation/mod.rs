//! # Presentation Side
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        FRAME DATA FLOW                          │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │   simulation ── publish ──▶ ready region ── swap ──┐            │
//! │   simulation ── messages ─▶ renderable queue ──────┤            │
//! │   loaders    ── settle ───▶ requeue ───────────────┤            │
//! │                                                    ▼            │
//! │                         PresentationContext ──▶ SceneGraph      │
//! │                                                    │            │
//! │                                                    ▼            │
//! │                                             RenderBackend       │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Rules
//!
//! 1. Only the reading region is ever read
//! 2. Renderable messages apply at the start of the next frame, in order
//! 3. A bind waiting on a load is dropped if a newer bind superseded it

pub mod backend;
pub mod context;
pub mod scene;

pub use backend::{FrameReport, HeadlessBackend, RenderBackend};
pub use context::{FrameClock, Lifecycle, PresentationContext};
pub use scene::{SceneGraph, SceneNode, SceneRoot};
