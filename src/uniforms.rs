//! Uniform blocks shared between the host and the WGSL programs.
//!
//! Each struct here is uploaded verbatim with `bytemuck`. Field order and
//! padding follow WGSL uniform layout rules; the matching WGSL declarations
//! live next to the programs in [`shaders`](crate::shaders) and the
//! `layout_` tests pin the sizes.

use bytemuck::{Pod, Zeroable};

use crate::boundary::BoundaryConfig;
use crate::config::PostProcessConfig;
use crate::particles::{ParticleConfig, StepParams};
use crate::visuals::VisualConfig;

/// Parameters of the visualization programs.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct VisualUniforms {
    pub grid: [f32; 2],
    pub canvas: [f32; 2],
    pub bias: f32,
    pub contrast: f32,
    pub power: f32,
    pub brightness: f32,
    pub palette: u32,
    pub bipolar: u32,
    pub _pad: [u32; 2],
    pub background: [f32; 4],
    pub obstacle: [f32; 4],
}

impl VisualUniforms {
    pub fn new(config: &VisualConfig, grid: [f32; 2], canvas: [f32; 2]) -> Self {
        Self {
            grid,
            canvas,
            bias: config.tone.bias,
            contrast: config.tone.contrast,
            power: config.tone.power,
            brightness: config.tone.brightness,
            palette: config.palette.index(),
            bipolar: config.temperature_bipolar as u32,
            _pad: [0; 2],
            background: config.background.extend(1.0).to_array(),
            obstacle: config.obstacle_color.extend(1.0).to_array(),
        }
    }
}

/// Parameters of one particle advection step.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct AdvectUniforms {
    pub grid: [f32; 2],
    pub canvas: [f32; 2],
    pub dt: f32,
    pub respawn_rate: f32,
    pub frame_seed: u32,
    pub count: u32,
    /// Edge policies: left, right, bottom, top.
    pub edges: [u32; 4],
}

impl AdvectUniforms {
    pub fn new(params: &StepParams, count: u32) -> Self {
        Self {
            grid: params.mapping.grid.to_array(),
            canvas: params.mapping.canvas.to_array(),
            dt: params.dt,
            respawn_rate: params.respawn_rate,
            frame_seed: params.frame_seed,
            count,
            edges: BoundaryConfig::to_gpu(params.boundary),
        }
    }
}

/// Parameters of the particle sprite program.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SpriteUniforms {
    pub canvas: [f32; 2],
    pub size: f32,
    pub _pad: f32,
    pub color: [f32; 4],
}

impl SpriteUniforms {
    pub fn new(config: &ParticleConfig, canvas: [f32; 2]) -> Self {
        Self {
            canvas,
            size: config.size,
            _pad: 0.0,
            color: config.color.extend(config.opacity).to_array(),
        }
    }
}

/// Parameters of the post-processing filter.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct PostUniforms {
    pub texel: [f32; 2],
    pub filter_kind: u32,
    pub radius: f32,
    pub intensity: f32,
    pub _pad: [f32; 3],
}

impl PostUniforms {
    pub fn new(config: &PostProcessConfig, size: (u32, u32)) -> Self {
        Self {
            texel: [1.0 / size.0.max(1) as f32, 1.0 / size.1.max(1) as f32],
            filter_kind: config.filter.as_gpu(),
            radius: config.radius,
            intensity: config.intensity,
            _pad: [0.0; 3],
        }
    }
}

/// Placement of the brush cursor overlay.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CursorUniforms {
    /// Brush centre in canvas pixels.
    pub center: [f32; 2],
    /// Half size of the overlay quad in pixels.
    pub half_extent: [f32; 2],
    pub canvas: [f32; 2],
    pub _pad: [f32; 2],
    pub color: [f32; 4],
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec2;
    use crate::boundary::EdgePolicy;
    use crate::field::GridSize;
    use crate::particles::CanvasMapping;
    use crate::visuals::Palette;

    #[test]
    fn test_layout_sizes() {
        assert_eq!(std::mem::size_of::<VisualUniforms>(), 80);
        assert_eq!(std::mem::size_of::<AdvectUniforms>(), 48);
        assert_eq!(std::mem::size_of::<SpriteUniforms>(), 32);
        assert_eq!(std::mem::size_of::<PostUniforms>(), 32);
        assert_eq!(std::mem::size_of::<CursorUniforms>(), 48);
    }

    #[test]
    fn test_visual_uniforms_from_config() {
        let mut config = VisualConfig::new();
        config.palette(Palette::Turbo).contrast(2.0).temperature_bipolar(false);
        let u = VisualUniforms::new(&config, [64.0, 32.0], [640.0, 320.0]);
        assert_eq!(u.palette, 4);
        assert_eq!(u.contrast, 2.0);
        assert_eq!(u.bipolar, 0);
        assert_eq!(u.background[3], 1.0);
    }

    #[test]
    fn test_advect_uniforms_pack_edges() {
        let params = StepParams {
            dt: 0.5,
            boundary: BoundaryConfig {
                left: EdgePolicy::Wall,
                ..Default::default()
            },
            respawn_rate: 0.01,
            frame_seed: 9,
            mapping: CanvasMapping::new((100, 50), GridSize::new(20, 10)),
        };
        let u = AdvectUniforms::new(&params, 77);
        assert_eq!(u.edges, [1, 0, 0, 0]);
        assert_eq!(u.count, 77);
        assert_eq!(Vec2::from_array(u.grid), Vec2::new(20.0, 10.0));
    }

    #[test]
    fn test_post_texel_size() {
        let u = PostUniforms::new(&PostProcessConfig::default(), (200, 100));
        assert!((u.texel[0] - 0.005).abs() < 1e-6);
        assert!((u.texel[1] - 0.01).abs() < 1e-6);
    }
}
