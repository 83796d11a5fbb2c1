//! A small analytic flow for the demo window.
//!
//! Not a fluid solver: the velocity is a uniform drift plus a few point
//! vortices that orbit the domain, with brush impulses layered on top and
//! decaying away. Dye and temperature are carried along semi-Lagrangian.

use flowlens::{BoundaryConfig, BoundaryPreset, FieldKind, FlowSolver, GridSize, Injection, ObstacleStamp, Vec2};

const IMPULSE_DECAY: f32 = 0.97;
const DYE_DECAY: f32 = 0.998;
const TEMPERATURE_DECAY: f32 = 0.995;
const DRIFT: f32 = 0.15;

struct Vortex {
    orbit_center: Vec2,
    orbit_radius: f32,
    phase: f32,
    angular_speed: f32,
    strength: f32,
    core: f32,
}

impl Vortex {
    fn position(&self, time: f32) -> Vec2 {
        let angle = self.phase + self.angular_speed * time;
        self.orbit_center + Vec2::new(angle.cos(), angle.sin()) * self.orbit_radius
    }

    fn velocity_at(&self, p: Vec2, time: f32) -> Vec2 {
        let d = p - self.position(time);
        self.strength * d.perp() / (d.length_squared() + self.core * self.core)
    }
}

pub struct DemoFlow {
    grid: GridSize,
    time: f32,
    version: u64,
    vortices: Vec<Vortex>,
    boundary: BoundaryConfig,
    ux: Vec<f32>,
    uy: Vec<f32>,
    impulse_x: Vec<f32>,
    impulse_y: Vec<f32>,
    dye: Vec<f32>,
    temperature: Vec<f32>,
    density: Vec<f32>,
    mask: Vec<u8>,
    mask_dirty: bool,
    scratch: Vec<f32>,
}

impl DemoFlow {
    pub fn new(grid: GridSize) -> Self {
        let cells = grid.cells();
        let w = grid.width as f32;
        let h = grid.height as f32;
        let scale = w.min(h);
        let vortices = vec![
            Vortex {
                orbit_center: Vec2::new(w * 0.35, h * 0.5),
                orbit_radius: scale * 0.15,
                phase: 0.0,
                angular_speed: 0.004,
                strength: scale * 0.12,
                core: scale * 0.06,
            },
            Vortex {
                orbit_center: Vec2::new(w * 0.65, h * 0.5),
                orbit_radius: scale * 0.2,
                phase: 2.0,
                angular_speed: -0.003,
                strength: -scale * 0.1,
                core: scale * 0.05,
            },
            Vortex {
                orbit_center: Vec2::new(w * 0.5, h * 0.3),
                orbit_radius: scale * 0.1,
                phase: 4.0,
                angular_speed: 0.006,
                strength: scale * 0.05,
                core: scale * 0.04,
            },
        ];
        let mut flow = Self {
            grid,
            time: 0.0,
            version: 0,
            vortices,
            boundary: BoundaryPreset::ChannelX.config(),
            ux: vec![0.0; cells],
            uy: vec![0.0; cells],
            impulse_x: vec![0.0; cells],
            impulse_y: vec![0.0; cells],
            dye: vec![0.0; cells],
            temperature: vec![0.0; cells],
            density: vec![1.0; cells],
            mask: vec![0; cells],
            mask_dirty: true,
            scratch: vec![0.0; cells],
        };
        flow.update_velocity();
        flow
    }

    fn update_velocity(&mut self) {
        let w = self.grid.width as usize;
        for i in 0..self.grid.cells() {
            if self.mask[i] != 0 {
                self.ux[i] = 0.0;
                self.uy[i] = 0.0;
                self.density[i] = 1.0;
                continue;
            }
            let p = Vec2::new((i % w) as f32 + 0.5, (i / w) as f32 + 0.5);
            let mut v = Vec2::new(DRIFT, 0.0);
            for vortex in &self.vortices {
                v += vortex.velocity_at(p, self.time);
            }
            v += Vec2::new(self.impulse_x[i], self.impulse_y[i]);
            self.ux[i] = v.x;
            self.uy[i] = v.y;
            self.density[i] = 1.0 - 0.5 * v.length_squared();
        }
    }

    /// Bilinear sample at a cell-centred position, wrapping in x and clamping in y.
    fn sample(&self, field: &[f32], p: Vec2) -> f32 {
        let w = self.grid.width as i32;
        let h = self.grid.height as i32;
        let x = p.x - 0.5;
        let y = (p.y - 0.5).clamp(0.0, (h - 1) as f32);
        let x0 = x.floor();
        let y0 = y.floor();
        let fx = x - x0;
        let fy = y - y0;
        let at = |cx: i32, cy: i32| {
            let cx = cx.rem_euclid(w);
            let cy = cy.clamp(0, h - 1);
            field[(cy * w + cx) as usize]
        };
        let (x0, y0) = (x0 as i32, y0 as i32);
        let bottom = at(x0, y0) * (1.0 - fx) + at(x0 + 1, y0) * fx;
        let top = at(x0, y0 + 1) * (1.0 - fx) + at(x0 + 1, y0 + 1) * fx;
        bottom * (1.0 - fy) + top * fy
    }

    fn advect(&mut self, kind: FieldKind, decay: f32) {
        let w = self.grid.width as usize;
        let field = match kind {
            FieldKind::Temperature => &self.temperature,
            _ => &self.dye,
        };
        let mut out = std::mem::take(&mut self.scratch);
        for (i, value) in out.iter_mut().enumerate() {
            if self.mask[i] != 0 {
                *value = 0.0;
                continue;
            }
            let p = Vec2::new((i % w) as f32 + 0.5, (i / w) as f32 + 0.5);
            let back = p - Vec2::new(self.ux[i], self.uy[i]);
            *value = self.sample(field, back) * decay;
        }
        match kind {
            FieldKind::Temperature => std::mem::swap(&mut self.temperature, &mut out),
            _ => std::mem::swap(&mut self.dye, &mut out),
        }
        self.scratch = out;
    }
}

impl FlowSolver for DemoFlow {
    fn step_simulation(&mut self, iterations: u32) {
        if self.grid.is_empty() {
            return;
        }
        for _ in 0..iterations {
            self.time += 1.0;
            for v in self.impulse_x.iter_mut().chain(self.impulse_y.iter_mut()) {
                *v *= IMPULSE_DECAY;
            }
            self.update_velocity();
            self.advect(FieldKind::Dye, DYE_DECAY);
            self.advect(FieldKind::Temperature, TEMPERATURE_DECAY);
        }
        self.version += 1;
    }

    fn grid(&self) -> GridSize {
        self.grid
    }

    fn field_view(&self, kind: FieldKind) -> &[f32] {
        match kind {
            FieldKind::VelocityX => &self.ux,
            FieldKind::VelocityY => &self.uy,
            FieldKind::Dye => &self.dye,
            FieldKind::Temperature => &self.temperature,
            FieldKind::DensityProxy => &self.density,
            FieldKind::ObstacleMask => &[],
        }
    }

    fn obstacle_mask_view(&self) -> &[u8] {
        &self.mask
    }

    fn is_obstacle_mask_dirty(&self) -> bool {
        self.mask_dirty
    }

    fn clear_obstacle_mask_dirty(&mut self) {
        self.mask_dirty = false;
    }

    fn data_version(&self) -> u64 {
        self.version
    }

    fn inject_quantity(&mut self, cell: (i32, i32), quantity: &Injection) {
        let Some(i) = self.grid.index(cell.0, cell.1) else {
            return;
        };
        if self.mask[i] != 0 {
            return;
        }
        let w = quantity.weight;
        self.impulse_x[i] += quantity.velocity.x * w;
        self.impulse_y[i] += quantity.velocity.y * w;
        self.dye[i] += quantity.density * w;
        self.temperature[i] += quantity.temperature * w;
        self.version += 1;
    }

    fn inject_obstacle(&mut self, cell: (i32, i32), stamp: &ObstacleStamp) {
        let reach = (stamp.radius * stamp.aspect.max(1.0 / stamp.aspect.max(0.01))).ceil() as i32;
        for dy in -reach..=reach {
            for dx in -reach..=reach {
                if !stamp.covers(Vec2::new(dx as f32, dy as f32)) {
                    continue;
                }
                if let Some(i) = self.grid.index(cell.0 + dx, cell.1 + dy) {
                    self.mask[i] = u8::from(!stamp.erase);
                }
            }
        }
        self.mask_dirty = true;
        self.update_velocity();
        self.version += 1;
    }

    fn boundary(&self) -> BoundaryConfig {
        self.boundary
    }
}
