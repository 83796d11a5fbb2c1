//! Host-side reference of the visualization math.
//!
//! These functions compute what the generated fragment programs compute,
//! one cell at a time. They back [`FlowRenderer::probe`](crate::FlowRenderer::probe)
//! and let the tone-mapping rules be tested without a device.

use glam::{Vec3, Vec4};

use crate::field::{FieldKind, GridSize};
use crate::particles::mix;
use crate::solver::FlowSolver;
use crate::visuals::{ModeClass, ToneMap, VisualConfig, VisualMode};

/// Rest value of the density proxy; pressure is shown as the deviation from it.
pub const REST_DENSITY: f32 = 1.0;

/// Gain applied to activity before it becomes the blend weight of scalar modes.
pub const SCALAR_WEIGHT_GAIN: f32 = 5.0;

/// Tone-mapped value and how strongly the cell stands out from the background.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Mapped {
    /// Palette coordinate before clamping.
    pub value: f32,
    pub activity: f32,
}

/// WGSL `sign`: zero maps to zero.
fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}

pub fn tone_map(raw: f32, tone: &ToneMap, class: ModeClass) -> Mapped {
    let biased = raw - tone.bias;
    match class {
        ModeClass::Bipolar => {
            let scaled = biased * tone.contrast;
            let value = sign(scaled) * scaled.abs().powf(tone.power) * 0.5 + 0.5;
            Mapped {
                value,
                activity: (value - 0.5).abs() * 2.0,
            }
        }
        ModeClass::Magnitude | ModeClass::Scalar => {
            let mapped = biased.max(0.0) * tone.contrast;
            let value = mapped.max(0.0).powf(tone.power);
            Mapped { value, activity: value }
        }
    }
}

/// Weight of the palette color over the background.
pub fn blend_weight(activity: f32, tone: &ToneMap, class: ModeClass) -> f32 {
    match class {
        ModeClass::Scalar => (activity * SCALAR_WEIGHT_GAIN).clamp(0.0, 1.0),
        ModeClass::Magnitude | ModeClass::Bipolar => tone.brightness.clamp(0.0, 1.0),
    }
}

/// Final color of a fluid cell with raw value `raw`.
pub fn shade(raw: f32, config: &VisualConfig) -> Vec4 {
    let class = config.class();
    let mapped = tone_map(raw, &config.tone, class);
    let color = config.palette.sample(mapped.value.clamp(0.0, 1.0)) * config.tone.brightness;
    let w = blend_weight(mapped.activity, &config.tone, class);
    let rgb = Vec3::new(
        mix(config.background.x, color.x, w),
        mix(config.background.y, color.y, w),
        mix(config.background.z, color.z, w),
    );
    rgb.extend(1.0)
}

/// Color of a solid cell.
pub fn obstacle_shade(config: &VisualConfig) -> Vec4 {
    config.obstacle_color.extend(1.0)
}

fn load(data: &[f32], grid: GridSize, x: i32, y: i32) -> f32 {
    let (x, y) = grid.clamp_cell(x, y);
    data[y as usize * grid.width as usize + x as usize]
}

/// Central-difference curl at a cell, one-sided at the borders.
pub fn curl_at(ux: &[f32], uy: &[f32], grid: GridSize, x: i32, y: i32) -> f32 {
    let duy_dx = (load(uy, grid, x + 1, y) - load(uy, grid, x - 1, y)) * 0.5;
    let dux_dy = (load(ux, grid, x, y + 1) - load(ux, grid, x, y - 1)) * 0.5;
    duy_dx - dux_dy
}

fn snapshot(solver: &dyn FlowSolver, kind: FieldKind) -> Option<&[f32]> {
    let data = solver.field_view(kind);
    (data.len() == solver.grid().cells()).then_some(data)
}

/// Raw value a mode reads at a cell, or `None` when a snapshot is malformed.
pub fn raw_value(mode: VisualMode, solver: &dyn FlowSolver, cell: (i32, i32)) -> Option<f32> {
    let grid = solver.grid();
    let field = |kind: FieldKind| snapshot(solver, kind);
    let (x, y) = cell;
    let value = match mode {
        VisualMode::Vorticity => curl_at(field(FieldKind::VelocityX)?, field(FieldKind::VelocityY)?, grid, x, y),
        VisualMode::Velocity => {
            let ux = load(field(FieldKind::VelocityX)?, grid, x, y);
            let uy = load(field(FieldKind::VelocityY)?, grid, x, y);
            (ux * ux + uy * uy).sqrt()
        }
        VisualMode::Dye => load(field(FieldKind::Dye)?, grid, x, y),
        VisualMode::Temperature => load(field(FieldKind::Temperature)?, grid, x, y),
        VisualMode::Pressure => load(field(FieldKind::DensityProxy)?, grid, x, y) - REST_DENSITY,
    };
    Some(value)
}

/// Color the visualization pass draws at the centre of `cell`.
pub fn probe(solver: &dyn FlowSolver, config: &VisualConfig, cell: (i32, i32)) -> Option<Vec4> {
    let grid = solver.grid();
    let index = grid.index(cell.0, cell.1)?;
    let mask = solver.obstacle_mask_view();
    if mask.len() == grid.cells() && mask[index] != 0 {
        return Some(obstacle_shade(config));
    }
    raw_value(config.mode, solver, cell).map(|raw| shade(raw, config))
}
