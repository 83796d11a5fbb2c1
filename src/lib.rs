//! # flowlens - flow field visualization for interactive fluid sandboxes
//!
//! GPU rendering of a 2-D flow solver's state: colored field views,
//! tracer particles carried by the velocity field, screen-space filters
//! and a brush cursor.
//!
//! flowlens does not simulate anything itself. A solver implements
//! [`FlowSolver`] and hands over flat field snapshots once per frame;
//! the renderer mirrors them into textures, advects particles through
//! them and draws the result.
//!
//! ## Quick Start
//!
//! ```ignore
//! use flowlens::prelude::*;
//!
//! let context = pollster::block_on(GpuContext::new(window.clone()))?;
//! let mut config = RenderConfig::new();
//! config.visual.mode(VisualMode::Vorticity).palette(Palette::Coolwarm);
//!
//! let mut renderer = FlowRenderer::for_context(&context, solver.grid(), config)?;
//!
//! // every frame
//! solver.step_simulation(2);
//! renderer.advance_particles(2.0, solver.boundary());
//! let frame = context.surface.get_current_texture()?;
//! let view = frame.texture.create_view(&Default::default());
//! renderer.render_frame(&mut solver, &view);
//! frame.present();
//! ```
//!
//! ## Core Concepts
//!
//! ### Fields
//!
//! A solver exposes six [`FieldKind`]s: two velocity components, dye,
//! temperature, a density proxy and a byte obstacle mask. Snapshots are
//! row-major with row 0 at the bottom. Float fields are re-uploaded only
//! when [`FlowSolver::data_version`] moves; the mask has its own dirty flag.
//!
//! ### Visual modes
//!
//! [`VisualMode`] picks which quantity is colored. Each mode belongs to a
//! [`ModeClass`] that decides how raw values are tone-mapped before the
//! [`Palette`] lookup: magnitudes fade in from zero, signed quantities are
//! centred at mid-palette.
//!
//! ### Particles
//!
//! Tracers live in canvas pixels and are stepped by a [`ParticleAdvector`].
//! [`GpuAdvector`] runs a compute shader; [`CpuAdvector`] is the host
//! fallback for adapters without compute support. Edge behaviour comes from
//! the solver's [`BoundaryConfig`].
//!
//! ### Brushes
//!
//! [`BrushConfig::stroke`] turns pointer input into solver injections, and
//! [`FlowRenderer::set_cursor`] draws the matching footprint.
//!
//! ## Configuration
//!
//! [`RenderConfig`] is plain serde data. [`FlowRenderer::configure`] applies
//! a new config and only rebuilds what changed.

pub mod boundary;
pub mod brush;
pub mod config;
pub mod error;
pub mod field;
pub mod gpu;
pub mod particles;
pub mod shader_utils;
pub mod shaders;
pub mod shading;
pub mod solver;
pub mod uniforms;
pub mod visuals;

pub use boundary::{BoundaryConfig, BoundaryPreset, EdgePolicy};
pub use brush::{Brush, BrushConfig, BrushGeometry, BrushMode, BrushShape, BrushStroke, Falloff};
pub use bytemuck;
pub use config::{ConfigDiff, FilterKind, PostProcessConfig, PostTargetChange, RenderConfig};
pub use error::{ConfigError, GpuError, RenderError};
pub use field::{FieldKind, FieldVersions, GridSize, UploadOutcome};
pub use glam::{Vec2, Vec3, Vec4};
pub use gpu::{FlowRenderer, GpuAdvector, GpuContext, ParticleBackend};
pub use particles::{CanvasMapping, CpuAdvector, Particle, ParticleAdvector, ParticleConfig, PositionsView};
pub use solver::{FlowSolver, Injection, ObstacleStamp};
pub use visuals::{ModeClass, Palette, ToneMap, VisualConfig, VisualMode};

/// Convenient re-exports for common usage.
///
/// ```ignore
/// use flowlens::prelude::*;
/// ```
pub mod prelude {
    pub use crate::boundary::{BoundaryConfig, BoundaryPreset, EdgePolicy};
    pub use crate::brush::{Brush, BrushConfig, BrushGeometry, BrushMode, BrushShape, Falloff};
    pub use crate::config::{FilterKind, PostProcessConfig, RenderConfig};
    pub use crate::field::{FieldKind, GridSize};
    pub use crate::gpu::{FlowRenderer, GpuContext, ParticleBackend};
    pub use crate::particles::{ParticleAdvector, ParticleConfig};
    pub use crate::solver::{FlowSolver, Injection, ObstacleStamp};
    pub use crate::visuals::{Palette, VisualConfig, VisualMode};
    pub use crate::{Vec2, Vec3, Vec4};
}
