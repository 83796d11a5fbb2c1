//! Brush kernel shared by solver injection and the cursor overlay.
//!
//! [`falloff_weight`] is the only definition of the brush footprint. The
//! injection path ([`BrushStroke::apply`]) evaluates it per grid cell and the
//! overlay ([`cursor_mask`]) rasterizes it into a texture, so what the user
//! sees under the cursor is exactly where quantities land.
//!
//! # Example
//!
//! ```
//! use flowlens::brush::{falloff_weight, BrushGeometry, BrushShape};
//! use glam::Vec2;
//!
//! let geometry = BrushGeometry { shape: BrushShape::Square, ..Default::default() };
//! assert_eq!(falloff_weight(Vec2::ZERO, &geometry), 1.0);
//! assert_eq!(falloff_weight(Vec2::new(100.0, 0.0), &geometry), 0.0);
//! ```

use glam::Vec2;
use serde::{Deserialize, Serialize};

use crate::field::GridSize;
use crate::solver::{FlowSolver, Injection, ObstacleStamp};

/// Distance metric of the brush footprint.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BrushShape {
    /// Euclidean distance.
    #[default]
    Circle,
    /// Chebyshev distance.
    Square,
    /// Taxicab distance divided by √2.
    Diamond,
}

impl BrushShape {
    pub const ALL: [BrushShape; 3] = [BrushShape::Circle, BrushShape::Square, BrushShape::Diamond];

    /// Distance of a local-space offset under this metric.
    pub fn distance(self, local: Vec2) -> f32 {
        match self {
            BrushShape::Circle => local.length(),
            BrushShape::Square => local.x.abs().max(local.y.abs()),
            BrushShape::Diamond => (local.x.abs() + local.y.abs()) / std::f32::consts::SQRT_2,
        }
    }
}

/// Radial weight profile.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Falloff {
    /// Full weight inside, smooth ramp over the outer `softness` fraction.
    Smooth { softness: f32 },
    /// Gaussian bump with standard deviation `spread` (in radius units), cut at the radius.
    Gaussian { spread: f32 },
}

impl Default for Falloff {
    fn default() -> Self {
        Falloff::Smooth { softness: 0.5 }
    }
}

impl Falloff {
    /// Weight at normalized distance `t` (1.0 is the brush radius).
    pub fn weight(self, t: f32) -> f32 {
        if t > 1.0 {
            return 0.0;
        }
        match self {
            Falloff::Smooth { softness } => {
                let softness = softness.clamp(0.0, 1.0);
                1.0 - smoothstep(1.0 - softness, 1.0, t)
            }
            Falloff::Gaussian { spread } => {
                let spread = spread.max(1e-3);
                (-(t * t) / (2.0 * spread * spread)).exp()
            }
        }
    }
}

/// Hermite step. Degenerates to a hard step when the edges coincide.
pub fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    if edge1 <= edge0 {
        return if x < edge0 { 0.0 } else { 1.0 };
    }
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

/// Size, shape and orientation of a brush, independent of where it is.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushGeometry {
    /// Radius in grid cells.
    pub radius: f32,
    pub shape: BrushShape,
    pub falloff: Falloff,
    /// Rotation in radians, counter-clockwise in grid space.
    pub rotation: f32,
    /// Stretch of the local y axis relative to x.
    pub aspect: f32,
}

impl Default for BrushGeometry {
    fn default() -> Self {
        Self {
            radius: 8.0,
            shape: BrushShape::Circle,
            falloff: Falloff::default(),
            rotation: 0.0,
            aspect: 1.0,
        }
    }
}

impl BrushGeometry {
    /// Offset in brush-local space: rotated by `-rotation`, y divided by aspect.
    pub fn to_local(&self, offset: Vec2) -> Vec2 {
        let (s, c) = self.rotation.sin_cos();
        let x = c * offset.x + s * offset.y;
        let y = -s * offset.x + c * offset.y;
        Vec2::new(x, y / self.aspect.max(0.01))
    }

    /// Half side of a square, centred on the brush, that contains its whole footprint.
    pub fn half_extent(&self) -> f32 {
        self.radius.max(0.0) * self.aspect.max(1.0) * std::f32::consts::SQRT_2
    }
}

/// Weight in `[0, 1]` of the brush at `offset` (grid cells) from its centre.
pub fn falloff_weight(offset: Vec2, geometry: &BrushGeometry) -> f32 {
    if geometry.radius <= 0.0 {
        return 0.0;
    }
    let local = geometry.to_local(offset);
    let t = geometry.shape.distance(local) / geometry.radius;
    geometry.falloff.weight(t).clamp(0.0, 1.0)
}

/// A brush placed on the grid.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Brush {
    /// Centre in grid coordinates (cells, y up).
    pub center: Vec2,
    pub geometry: BrushGeometry,
}

impl Brush {
    pub fn new(center: Vec2, geometry: BrushGeometry) -> Self {
        Self { center, geometry }
    }

    /// Cells under the brush with nonzero weight, as `(cell, offset, weight)`.
    ///
    /// Offsets are measured from the brush's centre cell. Cells past the grid
    /// edge are clamped onto it, so edge cells can appear more than once.
    pub fn footprint(&self, grid: GridSize) -> Vec<((i32, i32), Vec2, f32)> {
        if grid.is_empty() {
            return Vec::new();
        }
        let cx = self.center.x.floor() as i32;
        let cy = self.center.y.floor() as i32;
        let reach = self.geometry.half_extent().ceil() as i32;
        let mut cells = Vec::new();
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                let offset = Vec2::new(dx as f32, dy as f32);
                let weight = falloff_weight(offset, &self.geometry);
                if weight > 0.0 {
                    cells.push((grid.clamp_cell(cx + dx, cy + dy), offset, weight));
                }
            }
        }
        cells
    }
}

/// What a brush stroke puts into the solver.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BrushMode {
    /// Drag velocity plus density.
    #[default]
    Combined,
    /// Drag velocity only.
    Velocity,
    /// Density only.
    Density,
    /// Heat (or cold when erasing).
    Temperature,
    /// Counter-clockwise swirl around the brush centre.
    Vortex,
    /// Draw or erase solid cells.
    Obstacle,
}

impl BrushMode {
    pub const ALL: [BrushMode; 6] = [
        BrushMode::Combined,
        BrushMode::Velocity,
        BrushMode::Density,
        BrushMode::Temperature,
        BrushMode::Vortex,
        BrushMode::Obstacle,
    ];

    pub fn next(self) -> Self {
        let i = Self::ALL.iter().position(|m| *m == self).unwrap_or(0);
        Self::ALL[(i + 1) % Self::ALL.len()]
    }
}

/// Persistent brush settings.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrushConfig {
    pub mode: BrushMode,
    pub geometry: BrushGeometry,
    /// Multiplier applied to every injected quantity.
    pub strength: f32,
    /// Remove obstacles, or inject negative density and temperature.
    pub erase: bool,
}

impl Default for BrushConfig {
    fn default() -> Self {
        Self {
            mode: BrushMode::Combined,
            geometry: BrushGeometry::default(),
            strength: 1.0,
            erase: false,
        }
    }
}

impl BrushConfig {
    /// Stroke at `center` dragged by `drag` (both in grid cells).
    pub fn stroke(&self, center: Vec2, drag: Vec2) -> BrushStroke {
        BrushStroke {
            brush: Brush::new(center, self.geometry),
            mode: self.mode,
            strength: self.strength,
            drag,
            erase: self.erase,
        }
    }
}

/// One brush application.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BrushStroke {
    pub brush: Brush,
    pub mode: BrushMode,
    pub strength: f32,
    /// Pointer movement since the last stroke, in grid cells.
    pub drag: Vec2,
    pub erase: bool,
}

impl BrushStroke {
    /// Push this stroke into the solver. Returns the number of injection calls made.
    pub fn apply(&self, solver: &mut dyn FlowSolver) -> usize {
        let grid = solver.grid();
        if grid.is_empty() {
            return 0;
        }
        let geometry = self.brush.geometry;

        if self.mode == BrushMode::Obstacle {
            let cell = grid.clamp_cell(
                self.brush.center.x.floor() as i32,
                self.brush.center.y.floor() as i32,
            );
            let stamp = ObstacleStamp {
                radius: geometry.radius,
                erase: self.erase,
                angle: geometry.rotation,
                aspect: geometry.aspect,
                shape: geometry.shape,
            };
            solver.inject_obstacle(cell, &stamp);
            return 1;
        }

        let sign = if self.erase { -1.0 } else { 1.0 };
        let footprint = self.brush.footprint(grid);
        for &(cell, offset, weight) in &footprint {
            let (velocity, density, temperature) = match self.mode {
                BrushMode::Combined => (self.drag * 0.5 * self.strength, 0.5 * self.strength * sign, 0.0),
                BrushMode::Velocity => (self.drag * 0.5 * self.strength, 0.0, 0.0),
                BrushMode::Density => (Vec2::ZERO, 0.5 * self.strength * sign, 0.0),
                BrushMode::Temperature => (Vec2::ZERO, 0.0, 0.5 * self.strength * sign),
                BrushMode::Vortex => (Vec2::new(-offset.y, offset.x) * 0.1 * self.strength, 0.0, 0.0),
                BrushMode::Obstacle => continue,
            };
            let injection = Injection {
                velocity,
                density,
                temperature,
                weight,
                geometry,
            };
            solver.inject_quantity(cell, &injection);
        }
        footprint.len()
    }
}

/// Brush footprint rasterized for the cursor overlay.
#[derive(Clone, Debug, PartialEq)]
pub struct CursorMask {
    /// Side length in texels.
    pub size: u32,
    /// Half side of the covered square, in grid cells.
    pub half_extent: f32,
    /// Row-major alpha, row 0 at the bottom (grid y up).
    pub texels: Vec<u8>,
}

/// Alpha of the footprint interior in the overlay.
const FILL_ALPHA: f32 = 0.35;

/// Rasterize `geometry` into a `size`×`size` alpha mask.
///
/// Texels inside the footprint get a fill proportional to the brush weight.
/// Texels on the footprint border are fully opaque.
pub fn cursor_mask(geometry: &BrushGeometry, size: u32) -> CursorMask {
    let size = size.max(2);
    let half_extent = geometry.half_extent();
    let n = size as usize;
    let weights: Vec<f32> = (0..n * n)
        .map(|i| {
            let (x, y) = (i % n, i / n);
            let u = (x as f32 + 0.5) / size as f32 * 2.0 - 1.0;
            let v = (y as f32 + 0.5) / size as f32 * 2.0 - 1.0;
            falloff_weight(Vec2::new(u, v) * half_extent, geometry)
        })
        .collect();

    let outside = |x: isize, y: isize| -> bool {
        if x < 0 || y < 0 || x >= n as isize || y >= n as isize {
            return true;
        }
        weights[y as usize * n + x as usize] <= 0.0
    };

    let texels = weights
        .iter()
        .enumerate()
        .map(|(i, &w)| {
            if w <= 0.0 {
                return 0;
            }
            let (x, y) = ((i % n) as isize, (i / n) as isize);
            let border = outside(x - 1, y) || outside(x + 1, y) || outside(x, y - 1) || outside(x, y + 1);
            let alpha = if border { 1.0 } else { w * FILL_ALPHA };
            ((alpha * 255.0).round() as u8).max(1)
        })
        .collect();

    CursorMask {
        size,
        half_extent,
        texels,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryConfig;
    use crate::field::FieldKind;
    use rand::{Rng, SeedableRng};

    fn geometry(shape: BrushShape) -> BrushGeometry {
        BrushGeometry {
            radius: 10.0,
            shape,
            falloff: Falloff::Smooth { softness: 0.5 },
            rotation: 0.0,
            aspect: 1.0,
        }
    }

    #[test]
    fn test_weight_is_one_at_center() {
        for shape in BrushShape::ALL {
            assert_eq!(falloff_weight(Vec2::ZERO, &geometry(shape)), 1.0);
        }
        let gaussian = BrushGeometry {
            falloff: Falloff::Gaussian { spread: 0.4 },
            ..geometry(BrushShape::Circle)
        };
        assert!((falloff_weight(Vec2::ZERO, &gaussian) - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_weight_stays_in_unit_range() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(11);
        for _ in 0..2000 {
            let geometry = BrushGeometry {
                radius: rng.gen_range(0.5..30.0),
                shape: BrushShape::ALL[rng.gen_range(0..3)],
                falloff: if rng.gen_bool(0.5) {
                    Falloff::Smooth { softness: rng.gen_range(0.0..1.0) }
                } else {
                    Falloff::Gaussian { spread: rng.gen_range(0.05..2.0) }
                },
                rotation: rng.gen_range(-6.3..6.3),
                aspect: rng.gen_range(0.2..4.0),
            };
            let offset = Vec2::new(rng.gen_range(-80.0..80.0), rng.gen_range(-80.0..80.0));
            let w = falloff_weight(offset, &geometry);
            assert!((0.0..=1.0).contains(&w), "weight {w} out of range");
        }
    }

    #[test]
    fn test_circle_is_rotation_invariant() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(3);
        let base = geometry(BrushShape::Circle);
        for _ in 0..200 {
            let offset = Vec2::new(rng.gen_range(-12.0..12.0), rng.gen_range(-12.0..12.0));
            let rotated = BrushGeometry {
                rotation: rng.gen_range(0.0..6.3),
                ..base
            };
            let a = falloff_weight(offset, &base);
            let b = falloff_weight(offset, &rotated);
            assert!((a - b).abs() < 0.001);
        }
    }

    #[test]
    fn test_circle_is_radially_symmetric() {
        let base = geometry(BrushShape::Circle);
        let r = 6.0;
        let reference = falloff_weight(Vec2::new(r, 0.0), &base);
        for step in 0..16 {
            let angle = step as f32 * std::f32::consts::TAU / 16.0;
            let offset = Vec2::new(angle.cos(), angle.sin()) * r;
            assert!((falloff_weight(offset, &base) - reference).abs() < 0.001);
        }
    }

    #[test]
    fn test_square_constant_along_chebyshev_ring() {
        let square = geometry(BrushShape::Square);
        let reference = falloff_weight(Vec2::new(7.0, 0.0), &square);
        for y in [-7.0, -3.5, 0.0, 2.0, 7.0] {
            assert!((falloff_weight(Vec2::new(7.0, y), &square) - reference).abs() < 0.001);
            assert!((falloff_weight(Vec2::new(y, -7.0), &square) - reference).abs() < 0.001);
        }
    }

    #[test]
    fn test_diamond_uses_scaled_taxicab() {
        let diamond = geometry(BrushShape::Diamond);
        // (|x| + |y|) / sqrt(2) equals the radius on this point: edge of the support.
        let edge = Vec2::new(10.0, 10.0 * std::f32::consts::SQRT_2 - 10.0);
        assert!(falloff_weight(edge * 1.01, &diamond) == 0.0);
        assert!(falloff_weight(edge * 0.5, &diamond) > 0.0);
    }

    #[test]
    fn test_aspect_stretches_local_y() {
        let tall = BrushGeometry {
            aspect: 2.0,
            ..geometry(BrushShape::Circle)
        };
        assert!(falloff_weight(Vec2::new(0.0, 15.0), &tall) > 0.0);
        assert_eq!(falloff_weight(Vec2::new(15.0, 0.0), &tall), 0.0);
    }

    #[test]
    fn test_rotation_turns_the_stretch() {
        let tall = BrushGeometry {
            aspect: 2.0,
            rotation: std::f32::consts::FRAC_PI_2,
            ..geometry(BrushShape::Circle)
        };
        // A quarter turn moves the long axis onto x.
        assert!(falloff_weight(Vec2::new(15.0, 0.0), &tall) > 0.0);
        assert_eq!(falloff_weight(Vec2::new(0.0, 15.0), &tall), 0.0);
    }

    #[test]
    fn test_gaussian_cut_at_radius() {
        let wide = BrushGeometry {
            falloff: Falloff::Gaussian { spread: 5.0 },
            ..geometry(BrushShape::Circle)
        };
        assert!(falloff_weight(Vec2::new(9.9, 0.0), &wide) > 0.9);
        assert_eq!(falloff_weight(Vec2::new(10.1, 0.0), &wide), 0.0);
    }

    #[test]
    fn test_zero_softness_is_hard_edge() {
        let hard = BrushGeometry {
            falloff: Falloff::Smooth { softness: 0.0 },
            ..geometry(BrushShape::Circle)
        };
        assert_eq!(falloff_weight(Vec2::new(9.99, 0.0), &hard), 1.0);
        assert_eq!(falloff_weight(Vec2::new(10.01, 0.0), &hard), 0.0);
    }

    #[test]
    fn test_half_extent_covers_footprint() {
        let mut rng = rand::rngs::StdRng::seed_from_u64(5);
        for _ in 0..50 {
            let geometry = BrushGeometry {
                radius: rng.gen_range(1.0..10.0),
                shape: BrushShape::ALL[rng.gen_range(0..3)],
                falloff: Falloff::Smooth { softness: 0.2 },
                rotation: rng.gen_range(0.0..6.3),
                aspect: rng.gen_range(0.3..3.0),
            };
            let e = geometry.half_extent() * 1.001;
            for i in 0..64 {
                let t = i as f32 / 63.0 * 2.0 - 1.0;
                for edge in [Vec2::new(t * e, e), Vec2::new(t * e, -e), Vec2::new(e, t * e), Vec2::new(-e, t * e)] {
                    assert_eq!(falloff_weight(edge, &geometry), 0.0);
                }
            }
        }
    }

    #[derive(Default)]
    struct Recorder {
        quantities: Vec<((i32, i32), Injection)>,
        obstacles: Vec<((i32, i32), ObstacleStamp)>,
    }

    impl FlowSolver for Recorder {
        fn step_simulation(&mut self, _iterations: u32) {}
        fn grid(&self) -> GridSize {
            GridSize::new(32, 32)
        }
        fn field_view(&self, _kind: FieldKind) -> &[f32] {
            &[]
        }
        fn obstacle_mask_view(&self) -> &[u8] {
            &[]
        }
        fn is_obstacle_mask_dirty(&self) -> bool {
            false
        }
        fn clear_obstacle_mask_dirty(&mut self) {}
        fn data_version(&self) -> u64 {
            0
        }
        fn inject_quantity(&mut self, cell: (i32, i32), quantity: &Injection) {
            self.quantities.push((cell, *quantity));
        }
        fn inject_obstacle(&mut self, cell: (i32, i32), stamp: &ObstacleStamp) {
            self.obstacles.push((cell, *stamp));
        }
        fn boundary(&self) -> BoundaryConfig {
            BoundaryConfig::default()
        }
    }

    #[test]
    fn test_stroke_injects_weighted_cells() {
        let mut solver = Recorder::default();
        let config = BrushConfig {
            mode: BrushMode::Density,
            geometry: BrushGeometry { radius: 3.0, ..Default::default() },
            strength: 2.0,
            erase: false,
        };
        let calls = config.stroke(Vec2::new(16.5, 16.5), Vec2::ZERO).apply(&mut solver);

        assert_eq!(calls, solver.quantities.len());
        assert!(calls > 0);
        let center = solver
            .quantities
            .iter()
            .find(|(cell, _)| *cell == (16, 16))
            .map(|(_, q)| *q)
            .unwrap();
        assert_eq!(center.weight, 1.0);
        assert!((center.density - 1.0).abs() < 0.001);
        assert!(solver.quantities.iter().all(|(_, q)| q.weight > 0.0 && q.weight <= 1.0));
    }

    #[test]
    fn test_vortex_stroke_swirls_counter_clockwise() {
        let mut solver = Recorder::default();
        let config = BrushConfig {
            mode: BrushMode::Vortex,
            geometry: BrushGeometry { radius: 4.0, ..Default::default() },
            strength: 1.0,
            erase: false,
        };
        config.stroke(Vec2::new(10.0, 10.0), Vec2::ZERO).apply(&mut solver);
        let right = solver
            .quantities
            .iter()
            .find(|(cell, _)| *cell == (12, 10))
            .map(|(_, q)| q.velocity)
            .unwrap();
        // East of the centre the swirl points up.
        assert!(right.y > 0.0);
        assert!(right.x.abs() < 0.001);
    }

    #[test]
    fn test_obstacle_stroke_stamps_once() {
        let mut solver = Recorder::default();
        let config = BrushConfig {
            mode: BrushMode::Obstacle,
            erase: true,
            ..Default::default()
        };
        let calls = config.stroke(Vec2::new(40.0, -3.0), Vec2::ZERO).apply(&mut solver);
        assert_eq!(calls, 1);
        let (cell, stamp) = solver.obstacles[0];
        assert_eq!(cell, (31, 0));
        assert!(stamp.erase);
        assert!(solver.quantities.is_empty());
    }

    #[test]
    fn test_footprint_clamps_to_grid() {
        let brush = Brush::new(Vec2::new(0.5, 0.5), BrushGeometry { radius: 2.0, ..Default::default() });
        let grid = GridSize::new(8, 8);
        for (cell, _, _) in brush.footprint(grid) {
            assert!(grid.index(cell.0, cell.1).is_some());
        }
    }

    #[test]
    fn test_cursor_mask_matches_kernel_support() {
        let geometry = BrushGeometry {
            radius: 6.0,
            shape: BrushShape::Diamond,
            rotation: 0.4,
            aspect: 1.7,
            ..Default::default()
        };
        let mask = cursor_mask(&geometry, 48);
        let n = mask.size as usize;
        assert_eq!(mask.texels.len(), n * n);
        for (i, &alpha) in mask.texels.iter().enumerate() {
            let u = ((i % n) as f32 + 0.5) / n as f32 * 2.0 - 1.0;
            let v = ((i / n) as f32 + 0.5) / n as f32 * 2.0 - 1.0;
            let w = falloff_weight(Vec2::new(u, v) * mask.half_extent, &geometry);
            assert_eq!(alpha > 0, w > 0.0, "texel {i} disagrees with the kernel");
        }
        // The mask border never touches the footprint.
        assert!(mask.texels[..n].iter().all(|&a| a == 0));
    }

    #[test]
    fn test_cursor_mask_has_opaque_outline() {
        let mask = cursor_mask(&BrushGeometry::default(), 64);
        assert!(mask.texels.iter().any(|&a| a == 255));
        let center = mask.texels[32 * 64 + 32];
        assert!(center > 0 && center < 255);
    }

    #[test]
    fn test_mode_cycle() {
        assert_eq!(BrushMode::Obstacle.next(), BrushMode::Combined);
        assert_eq!(BrushMode::Combined.next(), BrushMode::Velocity);
    }
}
