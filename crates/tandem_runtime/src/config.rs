//! # Engine Configuration
//!
//! Loaded from TOML. Every field has a default, so an empty file is valid.
//!
//! ```toml
//! [channel]
//! max_entities = 10000
//! tick_rate = 60
//!
//! [presentation]
//! canvas_width = 1280
//! canvas_height = 720
//! target_frame_rate = 120
//! lerp_smoothing = 0.0
//!
//! [resources]
//! loader_threads = 2
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ContextError, ContextResult};

/// Triple-buffer channel settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    /// Entity slots per region. Entity ids must be below this.
    pub max_entities: usize,
    /// Simulation ticks per second.
    pub tick_rate: u32,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            max_entities: 10_000,
            tick_rate: 60,
        }
    }
}

/// Presentation context settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PresentationConfig {
    /// Initial canvas width in pixels.
    pub canvas_width: u32,
    /// Initial canvas height in pixels.
    pub canvas_height: u32,
    /// Frames per second the loop aims for.
    pub target_frame_rate: u32,
    /// Weight of the previous frame delta when smoothing (0 = no smoothing).
    pub lerp_smoothing: f32,
}

impl Default for PresentationConfig {
    fn default() -> Self {
        Self {
            canvas_width: 1280,
            canvas_height: 720,
            target_frame_rate: 120,
            lerp_smoothing: 0.0,
        }
    }
}

/// Resource loading settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceConfig {
    /// Worker threads of the loader runtime.
    pub loader_threads: usize,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self { loader_threads: 2 }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// `[channel]`
    pub channel: ChannelConfig,
    /// `[presentation]`
    pub presentation: PresentationConfig,
    /// `[resources]`
    pub resources: ResourceConfig,
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] on a parse or validation failure.
    pub fn from_toml_str(source: &str) -> ContextResult<Self> {
        let config: Self = toml::from_str(source).map_err(|e| ContextError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] if the file cannot be read or is
    /// invalid.
    pub fn from_file(path: impl AsRef<Path>) -> ContextResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path)
            .map_err(|e| ContextError::Config(format!("{}: {e}", path.display())))?;
        Self::from_toml_str(&source)
    }

    /// Serializes to TOML.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] if serialization fails.
    pub fn to_toml_string(&self) -> ContextResult<String> {
        toml::to_string(self).map_err(|e| ContextError::Config(e.to_string()))
    }

    /// Checks every field is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ContextError::Config`] naming the first bad field.
    pub fn validate(&self) -> ContextResult<()> {
        let bad = |field: &str, why: &str| Err(ContextError::Config(format!("{field} {why}")));

        if self.channel.max_entities == 0 {
            return bad("channel.max_entities", "must be non-zero");
        }
        if u32::try_from(self.channel.max_entities).is_err() {
            return bad("channel.max_entities", "must fit in an entity id");
        }
        if self.channel.tick_rate == 0 {
            return bad("channel.tick_rate", "must be non-zero");
        }
        if self.presentation.canvas_width == 0 || self.presentation.canvas_height == 0 {
            return bad("presentation.canvas_width/canvas_height", "must be non-zero");
        }
        if self.presentation.target_frame_rate == 0 {
            return bad("presentation.target_frame_rate", "must be non-zero");
        }
        if !(0.0..1.0).contains(&self.presentation.lerp_smoothing) {
            return bad("presentation.lerp_smoothing", "must be in [0, 1)");
        }
        if self.resources.loader_threads == 0 {
            return bad("resources.loader_threads", "must be non-zero");
        }
        Ok(())
    }

    /// Length of one simulation tick.
    #[must_use]
    pub fn tick_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.channel.tick_rate.max(1)))
    }

    /// Target length of one presentation frame.
    #[must_use]
    pub fn frame_duration(&self) -> Duration {
        Duration::from_secs_f64(1.0 / f64::from(self.presentation.target_frame_rate.max(1)))
    }
}
