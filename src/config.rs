//! Renderer configuration and its JSON persistence.
//!
//! [`RenderConfig`] bundles everything a control panel or preset system can
//! change. Every part fills missing fields from its defaults, so a preset
//! file only needs the values it cares about:
//!
//! ```
//! use flowlens::{RenderConfig, VisualMode};
//!
//! let config = RenderConfig::from_json_str(r#"{ "visual": { "mode": "Dye" } }"#).unwrap();
//! assert_eq!(config.visual.mode, VisualMode::Dye);
//! assert_eq!(config.particles.count, 20_000);
//! ```

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::brush::BrushConfig;
use crate::error::ConfigError;
use crate::particles::ParticleConfig;
use crate::visuals::VisualConfig;

/// Screen-space filter applied by the post-processing pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FilterKind {
    /// Copy the scene unchanged.
    #[default]
    Identity,
    /// 5x5 binomial blur.
    Blur,
    /// Laplacian edge magnitude over the scene.
    EdgeDetect,
    /// 3x3 unsharp mask.
    Sharpen,
}

impl FilterKind {
    pub const ALL: [FilterKind; 4] = [
        FilterKind::Identity,
        FilterKind::Blur,
        FilterKind::EdgeDetect,
        FilterKind::Sharpen,
    ];

    /// Value used by the post-process program.
    pub fn as_gpu(self) -> u32 {
        match self {
            FilterKind::Identity => 0,
            FilterKind::Blur => 1,
            FilterKind::EdgeDetect => 2,
            FilterKind::Sharpen => 3,
        }
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.as_gpu() as usize + 1) % Self::ALL.len()]
    }
}

/// Post-processing settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PostProcessConfig {
    /// When false the offscreen target is released and scenes draw to the surface.
    pub enabled: bool,
    pub filter: FilterKind,
    /// Tap spacing of the blur, in pixels.
    pub radius: f32,
    /// Mix of the filtered result over the scene for edge detect and sharpen.
    pub intensity: f32,
}

impl Default for PostProcessConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            filter: FilterKind::Identity,
            radius: 1.0,
            intensity: 0.5,
        }
    }
}

/// Everything the renderer can be told to change at runtime.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderConfig {
    pub visual: VisualConfig,
    pub particles: ParticleConfig,
    pub post: PostProcessConfig,
    pub brush: BrushConfig,
}

impl RenderConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json_string(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read a config file written by [`save`](Self::save) or by hand.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_json_string()?)?;
        Ok(())
    }

    /// Compare with `other` to find which GPU resources must change.
    pub fn diff(&self, other: &RenderConfig) -> ConfigDiff {
        ConfigDiff {
            reallocate_particles: self.particles.count != other.particles.count
                || self.particles.seed != other.particles.seed,
            post_target: match (self.post.enabled, other.post.enabled) {
                (false, true) => PostTargetChange::Create,
                (true, false) => PostTargetChange::Release,
                _ => PostTargetChange::Keep,
            },
            uniforms_changed: self.visual != other.visual
                || self.post != other.post
                || self.particles != other.particles,
        }
    }
}

/// What happens to the offscreen post-processing target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PostTargetChange {
    Keep,
    Create,
    Release,
}

/// Result of comparing two [`RenderConfig`]s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConfigDiff {
    /// Particle buffers must be reallocated and re-randomized.
    pub reallocate_particles: bool,
    pub post_target: PostTargetChange,
    /// Some uniform value changed; cheap to apply.
    pub uniforms_changed: bool,
}

impl ConfigDiff {
    /// Returns true if no changes are needed.
    pub fn is_empty(&self) -> bool {
        !self.reallocate_particles && self.post_target == PostTargetChange::Keep && !self.uniforms_changed
    }

    /// Returns true if any GPU resource has to be recreated.
    pub fn needs_rebuild(&self) -> bool {
        self.reallocate_particles || self.post_target != PostTargetChange::Keep
    }
}
