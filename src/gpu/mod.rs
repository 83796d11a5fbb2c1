//! GPU side of flowlens: device bootstrap, the per-pass resources and the
//! [`FlowRenderer`] that records a whole frame.

mod cursor;
mod field_cache;
mod particles_gpu;
mod post_process;
mod visualize;
mod vorticity;

use std::sync::Arc;

use glam::Vec4;
use winit::window::Window;

pub use cursor::CursorOverlay;
pub use field_cache::FieldTextureCache;
pub use particles_gpu::{GpuAdvector, ParticleRenderer};
pub use post_process::PostProcessor;
pub use visualize::VisualizePass;
pub use vorticity::VorticityPass;

use crate::boundary::BoundaryConfig;
use crate::brush::Brush;
use crate::config::{PostTargetChange, RenderConfig};
use crate::error::{GpuError, RenderError};
use crate::field::{FieldKind, GridSize};
use crate::particles::{CanvasMapping, CpuAdvector, Particle, ParticleAdvector};
use crate::shading;
use crate::solver::FlowSolver;
use crate::uniforms::{PostUniforms, SpriteUniforms, VisualUniforms};

/// Device, queue and the window surface.
pub struct GpuContext {
    pub device: Arc<wgpu::Device>,
    pub queue: Arc<wgpu::Queue>,
    pub surface: wgpu::Surface<'static>,
    pub config: wgpu::SurfaceConfiguration,
    pub size: (u32, u32),
    /// The adapter can run compute shaders.
    pub compute_supported: bool,
}

impl GpuContext {
    pub async fn new(window: Arc<Window>) -> Result<Self, GpuError> {
        let size = window.inner_size();
        let width = size.width.max(1);
        let height = size.height.max(1);

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::PRIMARY,
            ..Default::default()
        });

        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(GpuError::NoAdapter)?;

        log::info!("Using GPU: {:?}", adapter.get_info());

        let compute_supported = adapter
            .get_downlevel_capabilities()
            .flags
            .contains(wgpu::DownlevelFlags::COMPUTE_SHADERS);
        if !compute_supported {
            log::warn!("Adapter lacks compute shaders, particles advance on the CPU");
        }

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("flowlens device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults().using_resolution(adapter.limits()),
                    memory_hints: wgpu::MemoryHints::Performance,
                },
                None,
            )
            .await?;

        device.on_uncaptured_error(Box::new(|error| {
            log::error!("GPU uncaptured error: {}", error);
        }));

        // Palette colors are computed in display space, so prefer a non-sRGB surface.
        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|f| !f.is_srgb())
            .or_else(|| surface_caps.formats.first())
            .copied()
            .ok_or(GpuError::NoSurfaceFormat)?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width,
            height,
            present_mode: wgpu::PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        Ok(Self {
            device: Arc::new(device),
            queue: Arc::new(queue),
            surface,
            config,
            size: (width, height),
            compute_supported,
        })
    }

    pub fn resize(&mut self, new_width: u32, new_height: u32) {
        if new_width > 0 && new_height > 0 {
            self.size = (new_width, new_height);
            self.config.width = new_width;
            self.config.height = new_height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Particle backend this adapter supports.
    pub fn particle_backend(&self) -> ParticleBackend {
        if self.compute_supported {
            ParticleBackend::Gpu
        } else {
            ParticleBackend::Cpu
        }
    }
}

/// Where particle advection runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleBackend {
    /// Compute program over a storage buffer pair.
    Gpu,
    /// Host reference advector; positions are uploaded before drawing.
    Cpu,
}

fn scoped<T>(device: &wgpu::Device, label: &str, build: impl FnOnce() -> T) -> Result<T, String> {
    device.push_error_scope(wgpu::ErrorFilter::Validation);
    let value = build();
    match pollster::block_on(device.pop_error_scope()) {
        None => Ok(value),
        Some(error) => {
            log::error!("{} failed validation: {}", label, error);
            Err(error.to_string())
        }
    }
}

/// Run `build`, a shader or pipeline creation, inside a validation error scope.
pub(crate) fn validated<T>(device: &wgpu::Device, label: &str, build: impl FnOnce() -> T) -> Result<T, RenderError> {
    scoped(device, label, build).map_err(|message| RenderError::ShaderCompilation {
        label: label.to_string(),
        message,
    })
}

/// Like [`validated`], for textures and buffers.
pub(crate) fn validated_resource<T>(
    device: &wgpu::Device,
    label: &str,
    build: impl FnOnce() -> T,
) -> Result<T, RenderError> {
    scoped(device, label, build).map_err(|message| RenderError::ResourceCreation {
        label: label.to_string(),
        message,
    })
}

pub(crate) fn shader_module(device: &wgpu::Device, label: &str, source: String) -> Result<wgpu::ShaderModule, RenderError> {
    validated(device, label, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(label),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    })
}

/// Fail early when `format` cannot be used as `usage` on this device.
pub(crate) fn require_format(
    device: &wgpu::Device,
    format: wgpu::TextureFormat,
    usage: wgpu::TextureUsages,
    purpose: &'static str,
) -> Result<(), RenderError> {
    let features = format.guaranteed_format_features(device.features());
    if features.allowed_usages.contains(usage) {
        Ok(())
    } else {
        Err(RenderError::UnsupportedFormat { purpose, format })
    }
}

/// Zeroed uniform buffer sized for `T`, written with `queue.write_buffer`.
pub(crate) fn uniform_buffer<T: bytemuck::Pod>(device: &wgpu::Device, label: &str) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size: std::mem::size_of::<T>() as wgpu::BufferAddress,
        usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub(crate) fn uniform_entry(binding: u32, visibility: wgpu::ShaderStages) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Uniform,
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

pub(crate) fn texture_entry(binding: u32, visibility: wgpu::ShaderStages, filterable: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

/// Fullscreen-triangle pipeline with `vs_main` and `fs_main` entry points.
pub(crate) fn fullscreen_pipeline(
    device: &wgpu::Device,
    label: &str,
    module: &wgpu::ShaderModule,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> Result<wgpu::RenderPipeline, RenderError> {
    validated(device, label, || {
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some(label),
            bind_group_layouts: &[layout],
            push_constant_ranges: &[],
        });
        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(label),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        })
    })
}

/// Color pass over `view`, loading or clearing it.
pub(crate) fn color_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    label: &str,
    view: &wgpu::TextureView,
    load: wgpu::LoadOp<wgpu::Color>,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load,
                store: wgpu::StoreOp::Store,
            },
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
    })
}

enum Advector {
    Gpu(GpuAdvector),
    Cpu(CpuAdvector),
}

impl Advector {
    fn as_dyn(&mut self) -> &mut dyn ParticleAdvector {
        match self {
            Advector::Gpu(gpu) => gpu,
            Advector::Cpu(cpu) => cpu,
        }
    }
}

/// Records the visualization, particle, post and cursor passes of a frame.
///
/// Per frame, call [`advance_particles`](Self::advance_particles) once per
/// solver tick and then [`render_frame`](Self::render_frame). Everything
/// the frame draws is recorded into one encoder and submitted once.
pub struct FlowRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    surface_size: (u32, u32),
    grid: GridSize,
    config: RenderConfig,
    cache: FieldTextureCache,
    vorticity: VorticityPass,
    visualize: VisualizePass,
    advector: Advector,
    sprites: ParticleRenderer,
    post: Option<PostProcessor>,
    cursor: CursorOverlay,
    cursor_brush: Option<Brush>,
    pending_step: Option<(f32, BoundaryConfig)>,
}

impl FlowRenderer {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
        surface_size: (u32, u32),
        grid: GridSize,
        backend: ParticleBackend,
        config: RenderConfig,
    ) -> Result<Self, RenderError> {
        require_format(
            &device,
            format,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            "surface and post-processing target",
        )?;

        let cache = FieldTextureCache::new(&device, grid)?;
        let mut vorticity = VorticityPass::new(&device, grid)?;
        vorticity.bind_fields(&device, &cache);
        let mut visualize = VisualizePass::new(&device, format)?;
        visualize.bind_fields(&device, &cache, vorticity.view());

        let advector = match backend {
            ParticleBackend::Gpu => {
                let mut gpu = GpuAdvector::new(device.clone(), queue.clone(), surface_size, grid, &config.particles)?;
                gpu.bind_fields(&cache);
                Advector::Gpu(gpu)
            }
            ParticleBackend::Cpu => Advector::Cpu(CpuAdvector::new(surface_size, grid, &config.particles)),
        };
        let sprites = ParticleRenderer::new(&device, format)?;
        let post = if config.post.enabled {
            Some(PostProcessor::new(&device, format, surface_size)?)
        } else {
            None
        };
        let cursor = CursorOverlay::new(&device, format)?;

        log::info!(
            "Flow renderer ready: grid {}x{}, surface {}x{}, {:?} particles",
            grid.width,
            grid.height,
            surface_size.0,
            surface_size.1,
            backend
        );

        let renderer = Self {
            device,
            queue,
            format,
            surface_size,
            grid,
            config,
            cache,
            vorticity,
            visualize,
            advector,
            sprites,
            post,
            cursor,
            cursor_brush: None,
            pending_step: None,
        };
        renderer.write_uniforms();
        Ok(renderer)
    }

    /// Build a renderer for the window surface of `context`.
    pub fn for_context(context: &GpuContext, grid: GridSize, config: RenderConfig) -> Result<Self, RenderError> {
        Self::new(
            context.device.clone(),
            context.queue.clone(),
            context.surface_format(),
            context.size,
            grid,
            context.particle_backend(),
            config,
        )
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn backend(&self) -> ParticleBackend {
        match self.advector {
            Advector::Gpu(_) => ParticleBackend::Gpu,
            Advector::Cpu(_) => ParticleBackend::Cpu,
        }
    }

    pub fn particle_count(&self) -> u32 {
        match &self.advector {
            Advector::Gpu(gpu) => gpu.count(),
            Advector::Cpu(cpu) => cpu.count(),
        }
    }

    /// Apply a new configuration, rebuilding only what changed.
    ///
    /// On error nothing is applied and [`config`](Self::config) still
    /// returns the previous configuration.
    pub fn configure(&mut self, config: RenderConfig) -> Result<(), RenderError> {
        let diff = self.config.diff(&config);
        if diff.is_empty() {
            self.config = config;
            return Ok(());
        }

        // Everything fallible happens before the new config is committed.
        let created = match diff.post_target {
            PostTargetChange::Create => Some(PostProcessor::new(&self.device, self.format, self.surface_size)?),
            _ => None,
        };
        self.config = config;

        match diff.post_target {
            PostTargetChange::Create => {
                self.post = created;
                log::debug!("Post-processing target created");
            }
            PostTargetChange::Release => {
                self.post = None;
                log::debug!("Post-processing target released");
            }
            PostTargetChange::Keep => {}
        }

        match &mut self.advector {
            Advector::Gpu(gpu) => gpu.set_config(&config.particles),
            Advector::Cpu(cpu) => cpu.set_config(&config.particles),
        }
        if diff.reallocate_particles {
            log::info!("Reallocating {} particles", config.particles.count);
            self.pending_step = None;
            self.advector.as_dyn().initialize(config.particles.count);
            if let Advector::Gpu(gpu) = &mut self.advector {
                gpu.bind_fields(&self.cache);
            }
        }

        self.write_uniforms();
        Ok(())
    }

    fn write_uniforms(&self) {
        let grid = [self.grid.width as f32, self.grid.height as f32];
        let canvas = [self.surface_size.0 as f32, self.surface_size.1 as f32];
        self.visualize
            .write_uniforms(&self.queue, &VisualUniforms::new(&self.config.visual, grid, canvas));
        self.sprites
            .write_uniforms(&self.queue, &SpriteUniforms::new(&self.config.particles, canvas));
        if let Some(post) = &self.post {
            post.write_uniforms(&self.queue, &PostUniforms::new(&self.config.post, self.surface_size));
        }
    }

    /// Queue one particle step for the next frame.
    ///
    /// `dt` counts solver iterations; the particle config's `time_step`
    /// scales it to advection time. A step that is still pending from an earlier call runs first, in its
    /// own submission.
    pub fn advance_particles(&mut self, dt: f32, boundary: BoundaryConfig) {
        if let Some((pending_dt, pending_boundary)) = self.pending_step.take() {
            self.advector.as_dyn().advance(pending_dt, &pending_boundary);
        }
        self.pending_step = Some((dt, boundary));
    }

    /// Show the brush cursor at `brush`, or hide it.
    pub fn set_cursor(&mut self, brush: Option<Brush>) {
        self.cursor_brush = brush;
    }

    /// Color the current configuration draws at the centre of `cell`.
    pub fn probe(&self, solver: &dyn FlowSolver, cell: (i32, i32)) -> Option<Vec4> {
        shading::probe(solver, &self.config.visual, cell)
    }

    /// Current particle state, read back from wherever it lives.
    pub fn read_positions(&self) -> Result<Vec<Particle>, GpuError> {
        match &self.advector {
            Advector::Gpu(gpu) => gpu.read_positions(),
            Advector::Cpu(cpu) => Ok(cpu.particles().to_vec()),
        }
    }

    /// Rebuild every grid-sized resource.
    pub fn resize_grid(&mut self, grid: GridSize) {
        if grid == self.grid {
            return;
        }
        log::info!("Grid resized to {}x{}", grid.width, grid.height);
        self.grid = grid;
        self.pending_step = None;
        self.cache.resize(&self.device, grid);
        self.vorticity.resize(&self.device, grid);
        self.vorticity.bind_fields(&self.device, &self.cache);
        self.visualize.bind_fields(&self.device, &self.cache, self.vorticity.view());
        match &mut self.advector {
            Advector::Gpu(gpu) => {
                gpu.resize(self.surface_size, grid);
                gpu.bind_fields(&self.cache);
            }
            Advector::Cpu(cpu) => cpu.resize(self.surface_size, grid),
        }
        self.write_uniforms();
    }

    /// Rebuild every surface-sized resource.
    pub fn resize_surface(&mut self, size: (u32, u32)) {
        if size.0 == 0 || size.1 == 0 || size == self.surface_size {
            return;
        }
        log::info!("Surface resized to {}x{}", size.0, size.1);
        self.surface_size = size;
        self.pending_step = None;
        if let Some(post) = &mut self.post {
            post.resize(&self.device, size);
        }
        match &mut self.advector {
            Advector::Gpu(gpu) => {
                gpu.resize(size, self.grid);
                gpu.bind_fields(&self.cache);
            }
            Advector::Cpu(cpu) => cpu.resize(size, self.grid),
        }
        self.write_uniforms();
    }

    /// Pull the snapshots this frame reads into the field textures.
    fn sync_fields(&mut self, solver: &mut dyn FlowSolver) {
        let particles = self.particle_count() > 0;
        let mut kinds: Vec<FieldKind> = self.config.visual.mode.required_fields().to_vec();
        if particles {
            for kind in [FieldKind::VelocityX, FieldKind::VelocityY] {
                if !kinds.contains(&kind) {
                    kinds.push(kind);
                }
            }
        }

        {
            let view: &dyn FlowSolver = &*solver;
            let version = view.data_version();
            for kind in kinds {
                self.cache.ensure(&self.queue, kind, || view.field_view(kind), version);
            }
            self.cache
                .ensure_obstacles(&self.queue, || view.obstacle_mask_view(), view.is_obstacle_mask_dirty());
            if let Advector::Cpu(cpu) = &mut self.advector {
                if particles {
                    cpu.load_fields(view);
                }
            }
        }
        solver.clear_obstacle_mask_dirty();
    }

    /// Draw one frame of `solver` into `target`.
    pub fn render_frame(&mut self, solver: &mut dyn FlowSolver, target: &wgpu::TextureView) {
        let grid = solver.grid();
        if grid != self.grid {
            self.resize_grid(grid);
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("flowlens frame"),
        });

        if grid.is_empty() {
            let bg = self.config.visual.background;
            color_pass(
                &mut encoder,
                "empty grid",
                target,
                wgpu::LoadOp::Clear(wgpu::Color {
                    r: bg.x as f64,
                    g: bg.y as f64,
                    b: bg.z as f64,
                    a: 1.0,
                }),
            );
            self.queue.submit(std::iter::once(encoder.finish()));
            return;
        }

        self.sync_fields(solver);

        let mode = self.config.visual.mode;
        if mode.needs_vorticity() {
            self.vorticity.record(&mut encoder);
        }

        let scene = match &self.post {
            Some(post) => post.view(),
            None => target,
        };
        self.visualize.record(&mut encoder, scene, mode);

        if let Some((dt, boundary)) = self.pending_step.take() {
            match &mut self.advector {
                Advector::Gpu(gpu) => gpu.record(&mut encoder, dt, &boundary),
                Advector::Cpu(cpu) => cpu.advance(dt, &boundary),
            }
        }

        let positions = match &self.advector {
            Advector::Gpu(gpu) => gpu.current_positions_view(),
            Advector::Cpu(cpu) => cpu.current_positions_view(),
        };
        self.sprites
            .record(&self.device, &self.queue, &mut encoder, scene, positions);

        if let Some(post) = &self.post {
            post.record(&mut encoder, target);
        }

        if let Some(brush) = self.cursor_brush {
            let mapping = CanvasMapping::new(self.surface_size, self.grid);
            self.cursor
                .update(&self.queue, &brush, &mapping, &self.config.brush);
            self.cursor.record(&mut encoder, target);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
    }
}
