//! Domain edge behaviour for tracer particles.
//!
//! Each of the four domain edges carries its own [`EdgePolicy`]. Solvers
//! report the policies matching their own boundary conditions through
//! [`FlowSolver::boundary`](crate::FlowSolver::boundary); the presets in
//! [`BoundaryPreset`] cover the usual periodic, box and channel setups.

use glam::Vec2;
use serde::{Deserialize, Serialize};

/// What happens to a particle that crosses a domain edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum EdgePolicy {
    /// Reappear on the opposite edge (periodic domain).
    #[default]
    Wrap,
    /// Stick to the last cell inside the domain.
    Wall,
    /// Respawn at a random free cell.
    Respawn,
}

impl EdgePolicy {
    /// Value written into GPU uniforms.
    pub fn as_gpu(self) -> u32 {
        match self {
            EdgePolicy::Wrap => 0,
            EdgePolicy::Wall => 1,
            EdgePolicy::Respawn => 2,
        }
    }

    /// Resolve a coordinate that left `[0, extent)` through the low or high edge.
    ///
    /// Returns the corrected coordinate, or `None` when the particle must respawn.
    pub fn resolve(low: EdgePolicy, high: EdgePolicy, value: f32, extent: f32) -> Option<f32> {
        if value < 0.0 {
            match low {
                EdgePolicy::Wrap => Some(value + extent),
                EdgePolicy::Wall => Some(0.0),
                EdgePolicy::Respawn => None,
            }
        } else if value >= extent {
            match high {
                EdgePolicy::Wrap => Some(value - extent),
                EdgePolicy::Wall => Some(extent - 1.0),
                EdgePolicy::Respawn => None,
            }
        } else {
            Some(value)
        }
    }
}

/// Per-edge policies. Edges are named in grid space (y up).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BoundaryConfig {
    pub left: EdgePolicy,
    pub right: EdgePolicy,
    pub bottom: EdgePolicy,
    pub top: EdgePolicy,
}

impl BoundaryConfig {
    /// Same policy on every edge.
    pub fn uniform(policy: EdgePolicy) -> Self {
        Self {
            left: policy,
            right: policy,
            bottom: policy,
            top: policy,
        }
    }

    /// Resolve a grid-space position against all four edges.
    ///
    /// `None` means the particle left through a respawn edge.
    pub fn apply(&self, g: Vec2, extent: Vec2) -> Option<Vec2> {
        let x = EdgePolicy::resolve(self.left, self.right, g.x, extent.x)?;
        let y = EdgePolicy::resolve(self.bottom, self.top, g.y, extent.y)?;
        Some(Vec2::new(x, y))
    }

    /// Policies packed as `[left, right, bottom, top]` for the advection uniforms.
    pub fn to_gpu(self) -> [u32; 4] {
        [
            self.left.as_gpu(),
            self.right.as_gpu(),
            self.bottom.as_gpu(),
            self.top.as_gpu(),
        ]
    }
}

impl From<BoundaryPreset> for BoundaryConfig {
    fn from(preset: BoundaryPreset) -> Self {
        preset.config()
    }
}

/// Common solver boundary setups.
///
/// Slip and no-slip walls behave the same for tracers: they stop at the wall
/// and the solver's velocity field decides whether they slide along it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BoundaryPreset {
    /// Periodic in both directions.
    #[default]
    Periodic,
    /// Closed no-slip box.
    Box,
    /// Flow along x: periodic in x, walls top and bottom.
    ChannelX,
    /// Flow along y: periodic in y, walls left and right.
    ChannelY,
    /// Closed box with free-slip walls.
    SlipBox,
    /// Channel along x with free-slip walls.
    SlipChannelX,
}

impl BoundaryPreset {
    pub const ALL: [BoundaryPreset; 6] = [
        BoundaryPreset::Periodic,
        BoundaryPreset::Box,
        BoundaryPreset::ChannelX,
        BoundaryPreset::ChannelY,
        BoundaryPreset::SlipBox,
        BoundaryPreset::SlipChannelX,
    ];

    pub fn config(self) -> BoundaryConfig {
        use EdgePolicy::*;
        match self {
            BoundaryPreset::Periodic => BoundaryConfig::uniform(Wrap),
            BoundaryPreset::Box | BoundaryPreset::SlipBox => BoundaryConfig::uniform(Wall),
            BoundaryPreset::ChannelX | BoundaryPreset::SlipChannelX => BoundaryConfig {
                left: Wrap,
                right: Wrap,
                bottom: Wall,
                top: Wall,
            },
            BoundaryPreset::ChannelY => BoundaryConfig {
                left: Wall,
                right: Wall,
                bottom: Wrap,
                top: Wrap,
            },
        }
    }

    /// Whether walls let the flow slide along them.
    pub fn is_slip(self) -> bool {
        matches!(self, BoundaryPreset::SlipBox | BoundaryPreset::SlipChannelX)
    }

    /// Next preset, for cycling through them from the keyboard.
    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|p| *p == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrap_crosses_to_opposite_edge() {
        let w = 64.0;
        let x = EdgePolicy::resolve(EdgePolicy::Wrap, EdgePolicy::Wrap, w + 1.5, w);
        assert!((x.unwrap() - 1.5).abs() < 0.001);
        let x = EdgePolicy::resolve(EdgePolicy::Wrap, EdgePolicy::Wrap, -0.25, w);
        assert!((x.unwrap() - 63.75).abs() < 0.001);
    }

    #[test]
    fn test_wall_clamps_to_last_cell() {
        let x = EdgePolicy::resolve(EdgePolicy::Wall, EdgePolicy::Wall, 70.0, 64.0);
        assert_eq!(x, Some(63.0));
        let x = EdgePolicy::resolve(EdgePolicy::Wall, EdgePolicy::Wall, -3.0, 64.0);
        assert_eq!(x, Some(0.0));
    }

    #[test]
    fn test_respawn_marks_particle() {
        assert_eq!(EdgePolicy::resolve(EdgePolicy::Wrap, EdgePolicy::Respawn, 64.0, 64.0), None);
        assert_eq!(EdgePolicy::resolve(EdgePolicy::Respawn, EdgePolicy::Wrap, -0.1, 64.0), None);
        // Inside the domain the policy does not matter.
        assert_eq!(EdgePolicy::resolve(EdgePolicy::Respawn, EdgePolicy::Respawn, 10.0, 64.0), Some(10.0));
    }

    #[test]
    fn test_channel_presets() {
        let channel = BoundaryPreset::ChannelX.config();
        assert_eq!(channel.left, EdgePolicy::Wrap);
        assert_eq!(channel.top, EdgePolicy::Wall);
        assert_eq!(BoundaryPreset::SlipChannelX.config(), channel);

        let vertical = BoundaryConfig::from(BoundaryPreset::ChannelY);
        assert_eq!(vertical.left, EdgePolicy::Wall);
        assert_eq!(vertical.bottom, EdgePolicy::Wrap);
    }

    #[test]
    fn test_gpu_packing_order() {
        let config = BoundaryConfig {
            left: EdgePolicy::Wrap,
            right: EdgePolicy::Wall,
            bottom: EdgePolicy::Respawn,
            top: EdgePolicy::Wall,
        };
        assert_eq!(config.to_gpu(), [0, 1, 2, 1]);
    }

    #[test]
    fn test_preset_cycle_returns_to_start() {
        let mut preset = BoundaryPreset::Periodic;
        for _ in 0..BoundaryPreset::ALL.len() {
            preset = preset.next();
        }
        assert_eq!(preset, BoundaryPreset::Periodic);
        assert!(BoundaryPreset::SlipBox.is_slip());
        assert!(!BoundaryPreset::Box.is_slip());
    }
}
