//! Tracer particles: state, advection math and the host backend.
//!
//! Particles are massless tracers carried by the solver's velocity field.
//! Positions live in canvas pixels (y down); advection happens in grid
//! space (y up) through a [`CanvasMapping`].
//!
//! Each step integrates with the midpoint rule, resolves edge crossings per
//! [`BoundaryConfig`], and respawns a particle at a random free cell when it
//! hits an obstacle, leaves through a respawn edge, is still outside the
//! grid after its edge policy ran (or was never inside, or is not finite),
//! or loses the per-step respawn lottery. A particle that finds no free cell after
//! [`RESPAWN_ATTEMPTS`] tries parks at [`DEAD_POSITION`] and tries again on
//! the next step.
//!
//! The math in this module is the reference for the GPU compute program in
//! [`shaders::advect_shader`](crate::shaders::advect_shader); both draw their
//! randomness from the same integer [`hash`].

use bytemuck::{Pod, Zeroable};
use glam::{Vec2, Vec3};
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::boundary::BoundaryConfig;
use crate::field::{FieldKind, FieldVersions, GridSize};
use crate::solver::FlowSolver;

/// Sentinel coordinate of a particle that found nowhere to respawn.
pub const DEAD_POSITION: f32 = -1.0e5;

/// Candidate cells tried per respawn before giving up for this step.
pub const RESPAWN_ATTEMPTS: u32 = 15;

/// Salt separating the respawn lottery from the candidate draws.
pub(crate) const LOTTERY_SALT: u32 = 0x85eb_ca6b;

/// Step between candidate seeds.
pub(crate) const CANDIDATE_STRIDE: u32 = 0x9e37_79b9;

/// One tracer, laid out for direct use as a GPU vertex/storage element.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct Particle {
    /// Canvas pixels, y down.
    pub position: [f32; 2],
    /// `aux[0]`: per-particle random seed. `aux[1]`: reserved.
    pub aux: [f32; 2],
}

impl Particle {
    pub fn new(position: Vec2, seed: f32) -> Self {
        Self {
            position: position.to_array(),
            aux: [seed, 0.0],
        }
    }

    pub fn position(&self) -> Vec2 {
        Vec2::from_array(self.position)
    }

    pub fn is_dead(&self) -> bool {
        self.position[0] < DEAD_POSITION * 0.5
    }
}

/// Integer hash shared with the WGSL programs.
pub fn hash(mut x: u32) -> u32 {
    x ^= x >> 17;
    x = x.wrapping_mul(0xed5a_d4bb);
    x ^= x >> 11;
    x = x.wrapping_mul(0xac4c_1b51);
    x ^= x >> 15;
    x = x.wrapping_mul(0x3184_8bab);
    x ^= x >> 14;
    x
}

/// Uniform float in `[0, 1)` from the top 24 bits of `hash(n)`.
///
/// 24 bits convert to f32 exactly, so host and device agree bit for bit.
pub fn rand01(n: u32) -> f32 {
    (hash(n) >> 8) as f32 * (1.0 / 16_777_216.0)
}

/// Seed for one frame of advection.
pub fn frame_seed(seed: u64, frame: u32) -> u32 {
    hash(seed as u32 ^ hash(frame ^ (seed >> 32) as u32))
}

/// Per-particle, per-step random seed: frame seed, index, particle seed and position bits.
pub fn particle_seed(frame_seed: u32, index: u32, particle: &Particle) -> u32 {
    let position = hash(particle.position[0].to_bits() ^ hash(particle.position[1].to_bits()));
    hash(frame_seed ^ hash(index ^ hash(particle.aux[0].to_bits() ^ position)))
}

/// Conversion between canvas pixels (y down) and grid cells (y up).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CanvasMapping {
    pub canvas: Vec2,
    pub grid: Vec2,
}

impl CanvasMapping {
    pub fn new(canvas: (u32, u32), grid: GridSize) -> Self {
        Self {
            canvas: Vec2::new(canvas.0.max(1) as f32, canvas.1.max(1) as f32),
            grid: Vec2::new(grid.width.max(1) as f32, grid.height.max(1) as f32),
        }
    }

    pub fn to_grid(&self, p: Vec2) -> Vec2 {
        Vec2::new(
            p.x * (self.grid.x / self.canvas.x),
            (self.canvas.y - p.y) * (self.grid.y / self.canvas.y),
        )
    }

    pub fn to_canvas(&self, g: Vec2) -> Vec2 {
        Vec2::new(
            g.x * (self.canvas.x / self.grid.x),
            self.canvas.y - g.y * (self.canvas.y / self.grid.y),
        )
    }

    /// Pointer movement in pixels to movement in cells.
    pub fn delta_to_grid(&self, d: Vec2) -> Vec2 {
        Vec2::new(d.x * (self.grid.x / self.canvas.x), -d.y * (self.grid.y / self.canvas.y))
    }

    /// Whether `g` lies inside `[0, grid)` on both axes. False for NaN and infinities.
    pub fn in_grid(&self, g: Vec2) -> bool {
        g.x >= 0.0 && g.y >= 0.0 && g.x < self.grid.x && g.y < self.grid.y
    }

    /// Pixels per grid cell along each axis.
    pub fn cell_size(&self) -> Vec2 {
        self.canvas / self.grid
    }
}

/// Borrowed velocity and obstacle snapshots for one advection step.
#[derive(Clone, Copy, Debug)]
pub struct FlowSample<'a> {
    grid: GridSize,
    ux: &'a [f32],
    uy: &'a [f32],
    mask: &'a [u8],
}

impl<'a> FlowSample<'a> {
    /// `None` when the grid is empty or any snapshot has the wrong length.
    pub fn new(grid: GridSize, ux: &'a [f32], uy: &'a [f32], mask: &'a [u8]) -> Option<Self> {
        let cells = grid.cells();
        if grid.is_empty() || ux.len() != cells || uy.len() != cells || mask.len() != cells {
            return None;
        }
        Some(Self { grid, ux, uy, mask })
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    fn offset(&self, x: i32, y: i32) -> usize {
        let (x, y) = self.grid.clamp_cell(x, y);
        y as usize * self.grid.width as usize + x as usize
    }

    /// Bilinear velocity, cell values at integer coordinates, edges clamped.
    pub fn velocity(&self, g: Vec2) -> Vec2 {
        Vec2::new(self.bilinear(self.ux, g), self.bilinear(self.uy, g))
    }

    fn bilinear(&self, data: &[f32], g: Vec2) -> f32 {
        let base = g.floor();
        let f = g - base;
        let (ix, iy) = (base.x as i32, base.y as i32);
        let a = data[self.offset(ix, iy)];
        let b = data[self.offset(ix + 1, iy)];
        let c = data[self.offset(ix, iy + 1)];
        let d = data[self.offset(ix + 1, iy + 1)];
        mix(mix(a, b, f.x), mix(c, d, f.x), f.y)
    }

    /// Nearest-cell obstacle test, coordinates clamped onto the grid.
    pub fn is_obstacle(&self, g: Vec2) -> bool {
        let base = g.floor();
        self.mask[self.offset(base.x as i32, base.y as i32)] != 0
    }
}

/// Linear blend with the same operation order as WGSL `mix`.
pub(crate) fn mix(a: f32, b: f32, t: f32) -> f32 {
    a * (1.0 - t) + b * t
}

/// Everything one advection step needs besides the particles and the field.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct StepParams {
    pub dt: f32,
    pub boundary: BoundaryConfig,
    pub respawn_rate: f32,
    pub frame_seed: u32,
    pub mapping: CanvasMapping,
}

/// Advance one particle by one step.
pub fn advect_particle(particle: Particle, index: u32, field: &FlowSample, params: &StepParams) -> Particle {
    let seed = particle_seed(params.frame_seed, index, &particle);
    let mut out = particle;
    let mut respawn = particle.is_dead();

    if !respawn {
        let g0 = params.mapping.to_grid(particle.position());
        if !params.mapping.in_grid(g0) || field.is_obstacle(g0) {
            respawn = true;
        } else {
            let v1 = field.velocity(g0);
            let mid = g0 + v1 * params.dt * 0.5;
            let v2 = field.velocity(mid);
            match params.boundary.apply(g0 + v2 * params.dt, params.mapping.grid) {
                // A wrap shifts by one extent only; anything still outside is respawned.
                Some(g1) if params.mapping.in_grid(g1) && !field.is_obstacle(g1) => {
                    out.position = params.mapping.to_canvas(g1).to_array();
                }
                _ => respawn = true,
            }
        }
        if rand01(seed ^ LOTTERY_SALT) > 1.0 - params.respawn_rate {
            respawn = true;
        }
    }

    if respawn {
        out.position = respawn_position(seed, field, &params.mapping);
    }
    out
}

/// First free cell among [`RESPAWN_ATTEMPTS`] random candidates, else the dead sentinel.
pub fn respawn_position(seed: u32, field: &FlowSample, mapping: &CanvasMapping) -> [f32; 2] {
    for attempt in 0..RESPAWN_ATTEMPTS {
        let h = hash(seed ^ attempt.wrapping_mul(CANDIDATE_STRIDE));
        let g = Vec2::new(rand01(h) * mapping.grid.x, rand01(h.wrapping_add(1)) * mapping.grid.y);
        if !field.is_obstacle(g) {
            return mapping.to_canvas(g).to_array();
        }
    }
    [DEAD_POSITION, DEAD_POSITION]
}

/// `count` particles uniformly spread over the canvas.
pub fn seed_particles(count: u32, canvas: (u32, u32), seed: u64) -> Vec<Particle> {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed ^ (count as u64).rotate_left(32));
    let (w, h) = (canvas.0.max(1) as f32, canvas.1.max(1) as f32);
    (0..count)
        .map(|_| {
            let position = Vec2::new(rng.gen::<f32>() * w, rng.gen::<f32>() * h);
            Particle::new(position, rng.gen::<f32>())
        })
        .collect()
}

/// Particle appearance and respawn tuning.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParticleConfig {
    /// Number of tracers. 0 disables the particle system.
    pub count: u32,
    /// Sprite diameter in pixels.
    pub size: f32,
    pub opacity: f32,
    pub color: Vec3,
    /// Chance per step that a particle respawns anyway.
    pub respawn_rate: f32,
    /// Advection time per solver iteration.
    pub time_step: f32,
    /// Seed for initial positions and the per-frame hash.
    pub seed: u64,
}

impl Default for ParticleConfig {
    fn default() -> Self {
        Self {
            count: 20_000,
            size: 1.5,
            opacity: 0.6,
            color: Vec3::ONE,
            respawn_rate: 0.001,
            time_step: 1.0,
            seed: 0x5eed,
        }
    }
}

impl ParticleConfig {
    pub fn count(&mut self, count: u32) -> &mut Self {
        self.count = count;
        self
    }

    pub fn size(&mut self, size: f32) -> &mut Self {
        self.size = size.max(0.5);
        self
    }

    pub fn opacity(&mut self, opacity: f32) -> &mut Self {
        self.opacity = opacity.clamp(0.0, 1.0);
        self
    }

    pub fn color(&mut self, color: Vec3) -> &mut Self {
        self.color = color;
        self
    }

    pub fn respawn_rate(&mut self, rate: f32) -> &mut Self {
        self.respawn_rate = rate.clamp(0.0, 1.0);
        self
    }

    pub fn time_step(&mut self, time_step: f32) -> &mut Self {
        self.time_step = time_step.max(0.0);
        self
    }
}

/// Where the current particle positions live.
#[derive(Clone, Copy, Debug)]
pub enum PositionsView<'a> {
    /// Host memory; the renderer uploads it before drawing.
    Host(&'a [Particle]),
    /// A device buffer usable as an instance vertex buffer.
    Device { buffer: &'a wgpu::Buffer, count: u32 },
}

impl PositionsView<'_> {
    pub fn count(&self) -> u32 {
        match self {
            PositionsView::Host(particles) => particles.len() as u32,
            PositionsView::Device { count, .. } => *count,
        }
    }
}

/// A particle backend: double-buffered state plus the advection step.
///
/// `advance` reads one buffer, writes the other and swaps them; nothing else
/// swaps. Callers must fetch [`current_positions_view`](Self::current_positions_view)
/// again after every step.
pub trait ParticleAdvector {
    /// Reallocate both buffers for `count` particles at random positions.
    fn initialize(&mut self, count: u32);

    /// Replace the state with explicit particles.
    fn load_particles(&mut self, particles: &[Particle]);

    /// One advection step covering `dt` solver iterations, each worth
    /// [`ParticleConfig::time_step`] of advection time.
    fn advance(&mut self, dt: f32, boundary: &BoundaryConfig);

    fn current_positions_view(&self) -> PositionsView<'_>;

    fn count(&self) -> u32;
}

/// Host copies of the fields the advector reads.
#[derive(Debug, Default)]
struct HostFields {
    grid: GridSize,
    ux: Vec<f32>,
    uy: Vec<f32>,
    mask: Vec<u8>,
    versions: FieldVersions,
}

/// Host reference backend.
///
/// Used when the adapter cannot run compute shaders, and by tests that need
/// deterministic particle state.
#[derive(Debug)]
pub struct CpuAdvector {
    buffers: [Vec<Particle>; 2],
    current: usize,
    canvas: (u32, u32),
    config: ParticleConfig,
    frame: u32,
    fields: HostFields,
}

impl CpuAdvector {
    pub fn new(canvas: (u32, u32), grid: GridSize, config: &ParticleConfig) -> Self {
        let mut advector = Self {
            buffers: [Vec::new(), Vec::new()],
            current: 0,
            canvas,
            config: *config,
            frame: 0,
            fields: HostFields {
                grid,
                ..Default::default()
            },
        };
        advector.initialize(config.count);
        advector
    }

    /// Update tuning that does not need reallocation.
    pub fn set_config(&mut self, config: &ParticleConfig) {
        self.config = *config;
    }

    /// New canvas or grid: reallocate and re-randomize.
    pub fn resize(&mut self, canvas: (u32, u32), grid: GridSize) {
        self.canvas = canvas;
        if grid != self.fields.grid {
            self.fields = HostFields {
                grid,
                ..Default::default()
            };
        }
        let count = self.count();
        self.initialize(count);
    }

    /// Copy velocity and obstacles from the solver when they changed.
    pub fn load_fields(&mut self, solver: &dyn FlowSolver) {
        let grid = solver.grid();
        if grid != self.fields.grid {
            log::debug!("Particle grid changed to {}x{}", grid.width, grid.height);
            self.resize(self.canvas, grid);
        }
        let version = solver.data_version();
        let HostFields { ux, uy, mask, versions, .. } = &mut self.fields;
        versions.ensure_with(FieldKind::VelocityX, version, grid, || solver.field_view(FieldKind::VelocityX), |d| {
            ux.clear();
            ux.extend_from_slice(d);
        });
        versions.ensure_with(FieldKind::VelocityY, version, grid, || solver.field_view(FieldKind::VelocityY), |d| {
            uy.clear();
            uy.extend_from_slice(d);
        });
        versions.ensure_mask_with(solver.is_obstacle_mask_dirty(), grid, || solver.obstacle_mask_view(), |d| {
            mask.clear();
            mask.extend_from_slice(d);
        });
    }

    /// Install field data directly, bypassing a solver.
    pub fn set_fields(&mut self, grid: GridSize, ux: &[f32], uy: &[f32], mask: &[u8]) {
        if grid != self.fields.grid {
            self.resize(self.canvas, grid);
        }
        self.fields.ux = ux.to_vec();
        self.fields.uy = uy.to_vec();
        self.fields.mask = mask.to_vec();
        self.fields.versions.invalidate_all();
    }

    pub fn particles(&self) -> &[Particle] {
        &self.buffers[self.current]
    }

    pub fn mapping(&self) -> CanvasMapping {
        CanvasMapping::new(self.canvas, self.fields.grid)
    }

    /// Parameters of the next step; `dt` counts solver iterations.
    pub fn step_params(&self, dt: f32, boundary: &BoundaryConfig) -> StepParams {
        StepParams {
            dt: dt * self.config.time_step,
            boundary: *boundary,
            respawn_rate: self.config.respawn_rate,
            frame_seed: frame_seed(self.config.seed, self.frame),
            mapping: self.mapping(),
        }
    }
}

impl ParticleAdvector for CpuAdvector {
    fn initialize(&mut self, count: u32) {
        let particles = seed_particles(count, self.canvas, self.config.seed);
        self.buffers = [particles, vec![Particle::zeroed(); count as usize]];
        self.current = 0;
        self.config.count = count;
        log::debug!("Allocated {} host particles", count);
    }

    fn load_particles(&mut self, particles: &[Particle]) {
        self.buffers = [particles.to_vec(), vec![Particle::zeroed(); particles.len()]];
        self.current = 0;
        self.config.count = particles.len() as u32;
    }

    fn advance(&mut self, dt: f32, boundary: &BoundaryConfig) {
        if self.count() == 0 {
            return;
        }
        let params = self.step_params(dt, boundary);
        let fields = &self.fields;
        let Some(field) = FlowSample::new(fields.grid, &fields.ux, &fields.uy, &fields.mask) else {
            log::debug!("Skipping particle step: no field data for the current grid");
            return;
        };

        let (front, back) = self.buffers.split_at_mut(1);
        let (src, dst) = if self.current == 0 {
            (&front[0], &mut back[0])
        } else {
            (&back[0], &mut front[0])
        };
        for (index, (out, particle)) in dst.iter_mut().zip(src.iter()).enumerate() {
            *out = advect_particle(*particle, index as u32, &field, &params);
        }

        self.current = 1 - self.current;
        self.frame = self.frame.wrapping_add(1);
    }

    fn current_positions_view(&self) -> PositionsView<'_> {
        PositionsView::Host(self.particles())
    }

    fn count(&self) -> u32 {
        self.buffers[self.current].len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::{BoundaryPreset, EdgePolicy};

    const W: u32 = 64;
    const H: u32 = 64;

    fn uniform_field(ux: f32, uy: f32) -> (Vec<f32>, Vec<f32>, Vec<u8>) {
        let cells = (W * H) as usize;
        (vec![ux; cells], vec![uy; cells], vec![0; cells])
    }

    fn advector(particles: &[Particle], ux: f32, uy: f32) -> CpuAdvector {
        let config = ParticleConfig {
            count: 0,
            respawn_rate: 0.0,
            ..Default::default()
        };
        let grid = GridSize::new(W, H);
        let mut advector = CpuAdvector::new((W, H), grid, &config);
        let (vx, vy, mask) = uniform_field(ux, uy);
        advector.set_fields(grid, &vx, &vy, &mask);
        advector.load_particles(particles);
        advector
    }

    #[test]
    fn test_particle_is_16_bytes() {
        assert_eq!(std::mem::size_of::<Particle>(), 16);
    }

    #[test]
    fn test_hash_known_values() {
        assert_eq!(hash(0), 0);
        assert_ne!(hash(1), hash(2));
        for n in [0u32, 1, 7, u32::MAX] {
            let r = rand01(n);
            assert!((0.0..1.0).contains(&r));
        }
    }

    #[test]
    fn test_mapping_round_trip() {
        let mapping = CanvasMapping::new((800, 600), GridSize::new(200, 150));
        let p = Vec2::new(123.0, 456.0);
        let back = mapping.to_canvas(mapping.to_grid(p));
        assert!((back - p).length() < 0.001);
        // Canvas top is grid top.
        assert!((mapping.to_grid(Vec2::ZERO).y - 150.0).abs() < 0.001);
        let d = mapping.delta_to_grid(Vec2::new(4.0, 4.0));
        assert!((d.x - 1.0).abs() < 0.001 && (d.y + 1.0).abs() < 0.001);
    }

    #[test]
    fn test_zero_velocity_keeps_position_exactly() {
        let start = Particle::new(Vec2::new(10.0, 30.0), 0.25);
        let mut advector = advector(&[start], 0.0, 0.0);
        advector.advance(1.0, &BoundaryConfig::default());
        assert_eq!(advector.particles()[0].position, [10.0, 30.0]);
    }

    #[test]
    fn test_uniform_velocity_moves_by_dt() {
        let start = Particle::new(Vec2::new(10.0, 30.0), 0.5);
        let mut advector = advector(&[start], 1.0, 0.0);
        advector.advance(5.0, &BoundaryConfig::default());
        let p = advector.particles()[0].position;
        assert!((p[0] - 15.0).abs() < 0.001);
        assert!((p[1] - 30.0).abs() < 0.001);
    }

    #[test]
    fn test_upward_flow_moves_up_on_canvas() {
        let start = Particle::new(Vec2::new(20.0, 40.0), 0.5);
        let mut advector = advector(&[start], 0.0, 2.0);
        advector.advance(1.0, &BoundaryConfig::default());
        assert!((advector.particles()[0].position[1] - 38.0).abs() < 0.001);
    }

    #[test]
    fn test_wrap_reappears_on_opposite_edge() {
        let start = Particle::new(Vec2::new(63.0, 10.0), 0.5);
        let mut advector = advector(&[start], 2.0, 0.0);
        advector.advance(1.0, &BoundaryConfig::uniform(EdgePolicy::Wrap));
        assert!((advector.particles()[0].position[0] - 1.0).abs() < 0.001);
    }

    #[test]
    fn test_wall_clamps_to_last_cell() {
        let start = Particle::new(Vec2::new(63.0, 10.0), 0.5);
        let mut advector = advector(&[start], 2.0, 0.0);
        advector.advance(1.0, &BoundaryPreset::Box.config());
        assert!((advector.particles()[0].position[0] - 63.0).abs() < 0.001);
    }

    #[test]
    fn test_respawn_edge_relocates_inside() {
        let start = Particle::new(Vec2::new(63.0, 10.0), 0.5);
        let mut advector = advector(&[start], 2.0, 0.0);
        advector.advance(1.0, &BoundaryConfig::uniform(EdgePolicy::Respawn));
        let p = advector.particles()[0].position;
        assert!(p[0] >= 0.0 && p[0] <= W as f32);
        assert!(p[1] >= 0.0 && p[1] <= H as f32);
        assert!((p[0] - 65.0).abs() > 0.001);
    }

    #[test]
    fn test_respawn_edge_lands_on_free_cell() {
        let grid = GridSize::new(W, H);
        let (vx, vy, mut mask) = uniform_field(2.0, 0.0);
        // Left three quarters solid, so most candidates are rejected.
        for y in 0..H {
            for x in 0..W * 3 / 4 {
                mask[(y * W + x) as usize] = 1;
            }
        }
        let config = ParticleConfig {
            count: 0,
            respawn_rate: 0.0,
            ..Default::default()
        };
        let mut advector = CpuAdvector::new((W, H), grid, &config);
        advector.set_fields(grid, &vx, &vy, &mask);
        let particles: Vec<Particle> = (0..40).map(|i| Particle::new(Vec2::new(63.0, i as f32 + 10.0), i as f32)).collect();
        advector.load_particles(&particles);
        advector.advance(1.0, &BoundaryConfig::uniform(EdgePolicy::Respawn));

        let sample = FlowSample::new(grid, &vx, &vy, &mask).unwrap();
        let mapping = advector.mapping();
        for p in advector.particles().iter().filter(|p| !p.is_dead()) {
            let g = mapping.to_grid(p.position());
            assert!(mapping.in_grid(g));
            assert!(!sample.is_obstacle(g), "respawned into a solid cell at {g}");
        }
    }

    #[test]
    fn test_fast_particle_never_leaves_domain() {
        let start = Particle::new(Vec2::new(10.0, 30.0), 0.5);
        let mut advector = advector(&[start], 250.0, 0.0);
        for step in 0..5 {
            advector.advance(1.0, &BoundaryConfig::uniform(EdgePolicy::Wrap));
            let p = advector.particles()[0].position;
            assert!(p[0] >= 0.0 && p[0] <= W as f32, "step {step}: x = {}", p[0]);
            assert!(p[1] >= 0.0 && p[1] <= H as f32, "step {step}: y = {}", p[1]);
        }
    }

    #[test]
    fn test_outside_particle_is_brought_back() {
        let start = Particle::new(Vec2::new(500.0, -20.0), 0.5);
        let mut advector = advector(&[start], 0.0, 0.0);
        advector.advance(1.0, &BoundaryConfig::default());
        let p = advector.particles()[0].position();
        assert!(advector.mapping().in_grid(advector.mapping().to_grid(p)));
    }

    #[test]
    fn test_non_finite_particle_recovers() {
        let start = Particle::new(Vec2::new(20.0, 20.0), 0.5);
        let mut advector = advector(&[start], f32::NAN, 0.0);
        advector.advance(1.0, &BoundaryConfig::default());
        assert!(advector.particles()[0].position().is_finite());

        // A NaN already in the buffer is respawned as well.
        let (vx, vy, mask) = uniform_field(0.0, 0.0);
        advector.set_fields(GridSize::new(W, H), &vx, &vy, &mask);
        advector.load_particles(&[Particle::new(Vec2::splat(f32::NAN), 0.5)]);
        for _ in 0..3 {
            advector.advance(1.0, &BoundaryConfig::default());
        }
        let p = advector.particles()[0].position();
        assert!(p.is_finite());
        assert!(advector.mapping().in_grid(advector.mapping().to_grid(p)));
    }

    #[test]
    fn test_zero_dt_is_stationary_over_many_steps() {
        let start: Vec<Particle> = (0..32)
            .map(|i| Particle::new(Vec2::new(1.5 + i as f32 * 1.9, 60.0 - i as f32 * 1.7), i as f32))
            .collect();
        let mut advector = advector(&start, 0.0, 0.0);
        for _ in 0..50 {
            advector.advance(0.0, &BoundaryConfig::uniform(EdgePolicy::Wrap));
        }
        assert_eq!(advector.particles(), start.as_slice());
    }

    #[test]
    fn test_time_step_scales_iterations() {
        let start = Particle::new(Vec2::new(10.0, 30.0), 0.5);
        let mut advector = advector(&[start], 1.0, 0.0);
        let mut config = ParticleConfig {
            respawn_rate: 0.0,
            ..Default::default()
        };
        config.time_step(0.5);
        advector.set_config(&config);
        advector.advance(4.0, &BoundaryConfig::default());
        assert!((advector.particles()[0].position[0] - 12.0).abs() < 0.001);
    }

    /// Uniform flow on a fixed grid, reporting a fixed data version.
    struct FixedFlow {
        grid: GridSize,
        ux: Vec<f32>,
        uy: Vec<f32>,
        mask: Vec<u8>,
        version: u64,
    }

    impl FixedFlow {
        fn new(grid: GridSize, ux: f32, version: u64) -> Self {
            Self {
                grid,
                ux: vec![ux; grid.cells()],
                uy: vec![0.0; grid.cells()],
                mask: vec![0; grid.cells()],
                version,
            }
        }
    }

    impl FlowSolver for FixedFlow {
        fn step_simulation(&mut self, _iterations: u32) {}
        fn grid(&self) -> GridSize {
            self.grid
        }
        fn field_view(&self, kind: FieldKind) -> &[f32] {
            match kind {
                FieldKind::VelocityX => &self.ux,
                FieldKind::VelocityY => &self.uy,
                _ => &[],
            }
        }
        fn obstacle_mask_view(&self) -> &[u8] {
            &self.mask
        }
        fn is_obstacle_mask_dirty(&self) -> bool {
            false
        }
        fn clear_obstacle_mask_dirty(&mut self) {}
        fn data_version(&self) -> u64 {
            self.version
        }
        fn inject_quantity(&mut self, _cell: (i32, i32), _quantity: &crate::solver::Injection) {}
        fn inject_obstacle(&mut self, _cell: (i32, i32), _stamp: &crate::solver::ObstacleStamp) {}
        fn boundary(&self) -> BoundaryConfig {
            BoundaryConfig::default()
        }
    }

    #[test]
    fn test_grid_resize_reloads_same_version() {
        let config = ParticleConfig {
            count: 0,
            respawn_rate: 0.0,
            ..Default::default()
        };
        let mut advector = CpuAdvector::new((W, H), GridSize::new(W, H), &config);
        advector.load_fields(&FixedFlow::new(GridSize::new(W, H), 0.0, 7));

        // Same data version, new grid: the new velocity must still be read.
        let half = GridSize::new(W / 2, H / 2);
        advector.load_fields(&FixedFlow::new(half, 1.0, 7));
        advector.load_particles(&[Particle::new(Vec2::new(10.0, 30.0), 0.5)]);
        advector.advance(1.0, &BoundaryConfig::default());

        // One cell is two canvas pixels on the half-size grid.
        assert!((advector.particles()[0].position[0] - 12.0).abs() < 0.001);
    }

    #[test]
    fn test_obstacle_hit_respawns_on_free_cell() {
        let grid = GridSize::new(W, H);
        let (vx, vy, mut mask) = uniform_field(1.0, 0.0);
        // Solid band just right of the particles.
        for y in 0..H {
            for x in W / 2..W / 2 + 8 {
                mask[(y * W + x) as usize] = 1;
            }
        }
        let config = ParticleConfig {
            count: 0,
            respawn_rate: 0.0,
            ..Default::default()
        };
        let mut advector = CpuAdvector::new((W, H), grid, &config);
        advector.set_fields(grid, &vx, &vy, &mask);
        let particles: Vec<Particle> = (0..200).map(|i| Particle::new(Vec2::new(31.5, 0.25 * i as f32 + 5.0), i as f32)).collect();
        advector.load_particles(&particles);
        advector.advance(1.0, &BoundaryConfig::default());

        let sample = FlowSample::new(grid, &vx, &vy, &mask).unwrap();
        let mapping = advector.mapping();
        for p in advector.particles() {
            assert!(!p.is_dead());
            assert!(!sample.is_obstacle(mapping.to_grid(p.position())));
        }
    }

    #[test]
    fn test_fully_blocked_grid_parks_particles() {
        let grid = GridSize::new(W, H);
        let (vx, vy, _) = uniform_field(0.0, 0.0);
        let mask = vec![1u8; grid.cells()];
        let config = ParticleConfig {
            count: 32,
            respawn_rate: 0.0,
            ..Default::default()
        };
        let mut advector = CpuAdvector::new((W, H), grid, &config);
        advector.set_fields(grid, &vx, &vy, &mask);
        advector.advance(1.0, &BoundaryConfig::default());
        assert!(advector.particles().iter().all(Particle::is_dead));

        // Once the obstacle is cleared the parked particles come back.
        let open = vec![0u8; grid.cells()];
        advector.set_fields(grid, &vx, &vy, &open);
        advector.advance(1.0, &BoundaryConfig::default());
        assert!(advector.particles().iter().all(|p| !p.is_dead()));
    }

    #[test]
    fn test_respawn_rate_one_relocates_everything() {
        let start: Vec<Particle> = (0..16).map(|i| Particle::new(Vec2::new(5.0, 5.0), i as f32)).collect();
        let mut advector = advector(&start, 0.0, 0.0);
        advector.set_config(&ParticleConfig {
            respawn_rate: 1.0,
            ..Default::default()
        });
        advector.advance(1.0, &BoundaryConfig::default());
        let moved = advector.particles().iter().filter(|p| p.position != [5.0, 5.0]).count();
        assert_eq!(moved, 16);
    }

    #[test]
    fn test_zero_particles_is_noop() {
        let mut advector = advector(&[], 1.0, 1.0);
        advector.advance(1.0, &BoundaryConfig::default());
        assert_eq!(advector.count(), 0);
        assert_eq!(advector.current_positions_view().count(), 0);
    }

    #[test]
    fn test_initialize_reallocates_and_randomizes() {
        let grid = GridSize::new(W, H);
        let mut advector = CpuAdvector::new((W, H), grid, &ParticleConfig::default());
        advector.initialize(100);
        assert_eq!(advector.count(), 100);
        let distinct = advector
            .particles()
            .windows(2)
            .filter(|pair| pair[0].position != pair[1].position)
            .count();
        assert!(distinct > 90);
        assert!(advector.particles().iter().all(|p| {
            p.position[0] >= 0.0 && p.position[0] <= W as f32 && p.position[1] >= 0.0 && p.position[1] <= H as f32
        }));
    }

    #[test]
    fn test_step_without_fields_keeps_state() {
        let grid = GridSize::new(W, H);
        let mut advector = CpuAdvector::new((W, H), grid, &ParticleConfig::default());
        let before = advector.particles().to_vec();
        advector.advance(1.0, &BoundaryConfig::default());
        assert_eq!(advector.particles(), before.as_slice());
    }

    #[test]
    fn test_same_seed_same_trajectory() {
        let start: Vec<Particle> = (0..64).map(|i| Particle::new(Vec2::new(i as f32, 20.0), i as f32 * 0.1)).collect();
        let mut a = advector(&start, 0.7, -0.3);
        let mut b = advector(&start, 0.7, -0.3);
        let rate = ParticleConfig {
            respawn_rate: 0.2,
            ..Default::default()
        };
        a.set_config(&rate);
        b.set_config(&rate);
        for _ in 0..10 {
            a.advance(1.0, &BoundaryConfig::default());
            b.advance(1.0, &BoundaryConfig::default());
        }
        assert_eq!(a.particles(), b.particles());
    }
}
