//! GPU particle advection and sprite rendering.

use std::sync::Arc;

use bytemuck::Zeroable;
use wgpu::util::DeviceExt;

use crate::boundary::BoundaryConfig;
use crate::error::{GpuError, RenderError};
use crate::field::{FieldKind, GridSize};
use crate::particles::{
    frame_seed, seed_particles, CanvasMapping, Particle, ParticleAdvector, ParticleConfig, PositionsView, StepParams,
};
use crate::shaders::{advect_shader, sprite_shader, WORKGROUP_SIZE};
use crate::uniforms::{AdvectUniforms, SpriteUniforms};

use super::{color_pass, shader_module, texture_entry, uniform_buffer, uniform_entry, validated, FieldTextureCache};

const PARTICLE_STRIDE: wgpu::BufferAddress = std::mem::size_of::<Particle>() as wgpu::BufferAddress;

fn storage_entry(binding: u32, read_only: bool) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::COMPUTE,
        ty: wgpu::BindingType::Buffer {
            ty: wgpu::BufferBindingType::Storage { read_only },
            has_dynamic_offset: false,
            min_binding_size: None,
        },
        count: None,
    }
}

/// Compute-shader particle backend over a ping-pong storage buffer pair.
///
/// Each step reads `buffers[current]`, writes the other buffer and flips
/// `current`. The current buffer doubles as the instance vertex buffer of
/// the sprite pass.
pub struct GpuAdvector {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    pipeline: wgpu::ComputePipeline,
    layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    buffers: [wgpu::Buffer; 2],
    /// `bind_groups[i]` reads `buffers[i]`.
    bind_groups: Option<[wgpu::BindGroup; 2]>,
    current: usize,
    count: u32,
    canvas: (u32, u32),
    grid: GridSize,
    config: ParticleConfig,
    frame: u32,
}

impl GpuAdvector {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        canvas: (u32, u32),
        grid: GridSize,
        config: &ParticleConfig,
    ) -> Result<Self, RenderError> {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("advect inputs"),
            entries: &[
                storage_entry(0, true),
                storage_entry(1, false),
                uniform_entry(2, wgpu::ShaderStages::COMPUTE),
                texture_entry(3, wgpu::ShaderStages::COMPUTE, false),
                texture_entry(4, wgpu::ShaderStages::COMPUTE, false),
                texture_entry(5, wgpu::ShaderStages::COMPUTE, false),
            ],
        });

        let module = shader_module(&device, "advect shader", advect_shader())?;
        let pipeline = validated(&device, "advect pipeline", || {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("advect pipeline layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
                label: Some("advect pipeline"),
                layout: Some(&pipeline_layout),
                module: &module,
                entry_point: Some("main"),
                compilation_options: Default::default(),
                cache: None,
            })
        })?;

        let uniforms = uniform_buffer::<AdvectUniforms>(&device, "advect uniforms");
        let particles = seed_particles(config.count, canvas, config.seed);
        let buffers = create_buffers(&device, &particles);

        Ok(Self {
            device,
            queue,
            pipeline,
            layout,
            uniforms,
            buffers,
            bind_groups: None,
            current: 0,
            count: config.count,
            canvas,
            grid,
            config: *config,
            frame: 0,
        })
    }

    pub fn set_config(&mut self, config: &ParticleConfig) {
        self.config = *config;
        self.config.count = self.count;
    }

    /// New canvas or grid: reallocate and re-randomize. Fields must be bound again.
    pub fn resize(&mut self, canvas: (u32, u32), grid: GridSize) {
        self.canvas = canvas;
        self.grid = grid;
        self.initialize(self.count);
    }

    /// Build the ping-pong bind groups over the current buffers and mirrors.
    pub fn bind_fields(&mut self, cache: &FieldTextureCache) {
        let group = |src: usize| {
            self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some("advect inputs"),
                layout: &self.layout,
                entries: &[
                    wgpu::BindGroupEntry {
                        binding: 0,
                        resource: self.buffers[src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 1,
                        resource: self.buffers[1 - src].as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 2,
                        resource: self.uniforms.as_entire_binding(),
                    },
                    wgpu::BindGroupEntry {
                        binding: 3,
                        resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::VelocityX)),
                    },
                    wgpu::BindGroupEntry {
                        binding: 4,
                        resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::VelocityY)),
                    },
                    wgpu::BindGroupEntry {
                        binding: 5,
                        resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::ObstacleMask)),
                    },
                ],
            })
        };
        let groups = [group(0), group(1)];
        self.bind_groups = Some(groups);
    }

    pub fn step_params(&self, dt: f32, boundary: &BoundaryConfig) -> StepParams {
        StepParams {
            dt: dt * self.config.time_step,
            boundary: *boundary,
            respawn_rate: self.config.respawn_rate,
            frame_seed: frame_seed(self.config.seed, self.frame),
            mapping: CanvasMapping::new(self.canvas, self.grid),
        }
    }

    /// Record one step into `encoder` and swap the buffer roles.
    pub fn record(&mut self, encoder: &mut wgpu::CommandEncoder, dt: f32, boundary: &BoundaryConfig) {
        if self.count == 0 || self.grid.is_empty() {
            return;
        }
        let Some(groups) = &self.bind_groups else {
            log::debug!("Skipping particle step: no fields bound");
            return;
        };

        let params = self.step_params(dt, boundary);
        self.queue
            .write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&AdvectUniforms::new(&params, self.count)));
        {
            let mut pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("advect pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &groups[self.current], &[]);
            pass.dispatch_workgroups(self.count.div_ceil(WORKGROUP_SIZE), 1, 1);
        }

        self.current = 1 - self.current;
        self.frame = self.frame.wrapping_add(1);
    }

    /// Copy the current buffer back to the host. Blocks until the copy lands.
    pub fn read_positions(&self) -> Result<Vec<Particle>, GpuError> {
        let size = self.count as wgpu::BufferAddress * PARTICLE_STRIDE;
        if size == 0 {
            return Ok(Vec::new());
        }
        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("particle readback"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("particle readback"),
        });
        encoder.copy_buffer_to_buffer(&self.buffers[self.current], 0, &staging, 0, size);
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device.poll(wgpu::Maintain::Wait);
        match rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(GpuError::BufferMapping(e.to_string())),
            Err(e) => return Err(GpuError::BufferMapping(e.to_string())),
        }

        let particles = bytemuck::cast_slice::<u8, Particle>(&slice.get_mapped_range()).to_vec();
        staging.unmap();
        Ok(particles)
    }
}

fn create_buffers(device: &wgpu::Device, particles: &[Particle]) -> [wgpu::Buffer; 2] {
    let usage = wgpu::BufferUsages::STORAGE
        | wgpu::BufferUsages::VERTEX
        | wgpu::BufferUsages::COPY_SRC
        | wgpu::BufferUsages::COPY_DST;
    // Zero-sized bindings are invalid, so an empty system keeps one slot.
    let placeholder = [Particle::zeroed()];
    let contents = if particles.is_empty() { &placeholder[..] } else { particles };
    let front = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
        label: Some("particles a"),
        contents: bytemuck::cast_slice(contents),
        usage,
    });
    let back = device.create_buffer(&wgpu::BufferDescriptor {
        label: Some("particles b"),
        size: front.size(),
        usage,
        mapped_at_creation: false,
    });
    [front, back]
}

impl ParticleAdvector for GpuAdvector {
    fn initialize(&mut self, count: u32) {
        let particles = seed_particles(count, self.canvas, self.config.seed);
        self.load_particles(&particles);
        log::debug!("Allocated {} device particles", count);
    }

    fn load_particles(&mut self, particles: &[Particle]) {
        self.buffers = create_buffers(&self.device, particles);
        self.bind_groups = None;
        self.current = 0;
        self.count = particles.len() as u32;
        self.config.count = self.count;
    }

    fn advance(&mut self, dt: f32, boundary: &BoundaryConfig) {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("particle step"),
        });
        self.record(&mut encoder, dt, boundary);
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn current_positions_view(&self) -> PositionsView<'_> {
        PositionsView::Device {
            buffer: &self.buffers[self.current],
            count: self.count,
        }
    }

    fn count(&self) -> u32 {
        self.count
    }
}

/// Draws one additive sprite per particle.
pub struct ParticleRenderer {
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    /// Instance buffer for host-side particle state.
    host_buffer: Option<wgpu::Buffer>,
}

impl ParticleRenderer {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self, RenderError> {
        let stages = wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("sprite uniforms"),
            entries: &[uniform_entry(0, stages)],
        });
        let uniforms = uniform_buffer::<SpriteUniforms>(device, "sprite uniforms");
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("sprite uniforms"),
            layout: &layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniforms.as_entire_binding(),
            }],
        });

        let module = shader_module(device, "sprite shader", sprite_shader())?;
        let additive = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::SrcAlpha,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        };
        let pipeline = validated(device, "sprite pipeline", || {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("sprite pipeline layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("sprite pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[wgpu::VertexBufferLayout {
                        array_stride: PARTICLE_STRIDE,
                        step_mode: wgpu::VertexStepMode::Instance,
                        attributes: &[wgpu::VertexAttribute {
                            offset: 0,
                            shader_location: 0,
                            format: wgpu::VertexFormat::Float32x2,
                        }],
                    }],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState {
                            color: additive,
                            alpha: wgpu::BlendComponent::OVER,
                        }),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: None,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        })?;

        Ok(Self {
            pipeline,
            uniforms,
            bind_group,
            host_buffer: None,
        })
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &SpriteUniforms) {
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    /// Draw `positions` over `target`, keeping what is already there.
    pub fn record(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        positions: PositionsView<'_>,
    ) {
        let count = positions.count();
        if count == 0 {
            return;
        }
        let instances = match positions {
            PositionsView::Device { buffer, .. } => buffer,
            PositionsView::Host(particles) => {
                let bytes: &[u8] = bytemuck::cast_slice(particles);
                let too_small = self
                    .host_buffer
                    .as_ref()
                    .map_or(true, |b| b.size() < bytes.len() as wgpu::BufferAddress);
                if too_small {
                    self.host_buffer = Some(device.create_buffer(&wgpu::BufferDescriptor {
                        label: Some("host particles"),
                        size: bytes.len() as wgpu::BufferAddress,
                        usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                        mapped_at_creation: false,
                    }));
                }
                let Some(buffer) = &self.host_buffer else {
                    return;
                };
                queue.write_buffer(buffer, 0, bytes);
                buffer
            }
        };

        let mut pass = color_pass(encoder, "sprite pass", target, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.set_vertex_buffer(0, instances.slice(..count as wgpu::BufferAddress * PARTICLE_STRIDE));
        pass.draw(0..6, 0..count);
    }
}
