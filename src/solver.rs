//! The contract between the renderer and a flow solver.
//!
//! flowlens never looks inside a solver. Once per frame it reads flat
//! snapshots through [`FlowSolver::field_view`], keyed by the solver's
//! [`data_version`](FlowSolver::data_version), and it pushes brush input
//! back through the two `inject_*` calls.

use glam::Vec2;

use crate::boundary::BoundaryConfig;
use crate::brush::{BrushGeometry, BrushShape};
use crate::field::{FieldKind, GridSize};

/// Quantities deposited into one cell by a brush stroke.
///
/// The solver adds `velocity * weight`, `density * weight` and
/// `temperature * weight` to the cell. `geometry` describes the brush the
/// weight came from, for solvers that want to shape the deposit themselves.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Injection {
    pub velocity: Vec2,
    pub density: f32,
    pub temperature: f32,
    pub weight: f32,
    pub geometry: BrushGeometry,
}

/// Solid region drawn (or erased) around a cell.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ObstacleStamp {
    /// Radius in grid cells.
    pub radius: f32,
    /// Clear solid cells instead of setting them.
    pub erase: bool,
    /// Rotation in radians.
    pub angle: f32,
    pub aspect: f32,
    pub shape: BrushShape,
}

impl ObstacleStamp {
    /// Whether a cell at `offset` from the stamp centre is covered.
    ///
    /// Uses the same metric as the brush kernel, so the obstacle matches the
    /// footprint drawn by the cursor overlay.
    pub fn covers(&self, offset: Vec2) -> bool {
        if self.radius <= 0.0 {
            return false;
        }
        let geometry = BrushGeometry {
            radius: self.radius,
            shape: self.shape,
            rotation: self.angle,
            aspect: self.aspect,
            ..Default::default()
        };
        let local = geometry.to_local(offset);
        self.shape.distance(local) < self.radius
    }
}

/// A 2-D flow solver as seen by the renderer.
///
/// Snapshots are row-major, `width * height` long, row 0 at the bottom.
pub trait FlowSolver {
    /// Advance the simulation by `iterations` solver steps.
    fn step_simulation(&mut self, iterations: u32);

    /// Current grid dimensions.
    fn grid(&self) -> GridSize;

    /// Snapshot of a float field. Never called with [`FieldKind::ObstacleMask`].
    fn field_view(&self, kind: FieldKind) -> &[f32];

    /// Snapshot of the obstacle mask, nonzero for solid cells.
    fn obstacle_mask_view(&self) -> &[u8];

    /// Whether the mask changed since the last [`clear_obstacle_mask_dirty`](Self::clear_obstacle_mask_dirty).
    fn is_obstacle_mask_dirty(&self) -> bool;

    fn clear_obstacle_mask_dirty(&mut self);

    /// Counter that moves whenever any float field changes.
    fn data_version(&self) -> u64;

    fn inject_quantity(&mut self, cell: (i32, i32), quantity: &Injection);

    fn inject_obstacle(&mut self, cell: (i32, i32), stamp: &ObstacleStamp);

    /// Edge behaviour matching the solver's boundary conditions.
    fn boundary(&self) -> BoundaryConfig;
}
