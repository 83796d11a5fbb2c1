//! Brush cursor overlay.

use glam::Vec3;

use crate::brush::{cursor_mask, Brush, BrushConfig, BrushGeometry, BrushMode};
use crate::error::RenderError;
use crate::particles::CanvasMapping;
use crate::shaders::cursor_shader;
use crate::uniforms::CursorUniforms;

use super::{color_pass, require_format, shader_module, texture_entry, uniform_buffer, uniform_entry, validated};

/// Side of the rasterized brush mask, in texels.
pub const MASK_SIZE: u32 = 64;

const MASK_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R8Unorm;

/// Draws the brush footprint, rasterized by [`cursor_mask`], under the pointer.
pub struct CursorOverlay {
    pipeline: wgpu::RenderPipeline,
    uniforms: wgpu::Buffer,
    mask: wgpu::Texture,
    bind_group: wgpu::BindGroup,
    /// Geometry the mask was last rasterized from.
    geometry: Option<BrushGeometry>,
    /// Half side of the mask quad, in grid cells.
    half_extent: f32,
}

impl CursorOverlay {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self, RenderError> {
        require_format(
            device,
            MASK_FORMAT,
            wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            "cursor mask",
        )?;

        let fragment = wgpu::ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("cursor inputs"),
            entries: &[
                uniform_entry(0, wgpu::ShaderStages::VERTEX | fragment),
                texture_entry(1, fragment, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 2,
                    visibility: fragment,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let mask = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("cursor mask"),
            size: wgpu::Extent3d {
                width: MASK_SIZE,
                height: MASK_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: MASK_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let mask_view = mask.create_view(&wgpu::TextureViewDescriptor::default());
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("cursor sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });
        let uniforms = uniform_buffer::<CursorUniforms>(device, "cursor uniforms");
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("cursor inputs"),
            layout: &layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniforms.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&mask_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
        });

        let module = shader_module(device, "cursor shader", cursor_shader())?;
        let pipeline = validated(device, "cursor pipeline", || {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("cursor pipeline layout"),
                bind_group_layouts: &[&layout],
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cursor pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    buffers: &[],
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    targets: &[Some(wgpu::ColorTargetState {
                        format,
                        blend: Some(wgpu::BlendState::ALPHA_BLENDING),
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
        })?;

        Ok(Self {
            pipeline,
            uniforms,
            mask,
            bind_group,
            geometry: None,
            half_extent: 0.0,
        })
    }

    /// Place the overlay over `brush`, re-rasterizing the mask only when the
    /// brush geometry changed.
    pub fn update(
        &mut self,
        queue: &wgpu::Queue,
        brush: &Brush,
        mapping: &CanvasMapping,
        config: &BrushConfig,
    ) {
        if self.geometry != Some(brush.geometry) {
            let mask = cursor_mask(&brush.geometry, MASK_SIZE);
            queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture: &self.mask,
                    mip_level: 0,
                    origin: wgpu::Origin3d::ZERO,
                    aspect: wgpu::TextureAspect::All,
                },
                &mask.texels,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(mask.size),
                    rows_per_image: Some(mask.size),
                },
                self.mask.size(),
            );
            self.geometry = Some(brush.geometry);
            self.half_extent = mask.half_extent;
        }

        let center = mapping.to_canvas(brush.center);
        let half = mapping.cell_size() * self.half_extent;
        let uniforms = CursorUniforms {
            center: center.to_array(),
            half_extent: half.to_array(),
            canvas: mapping.canvas.to_array(),
            _pad: [0.0; 2],
            color: cursor_color(config).extend(0.9).to_array(),
        };
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(&uniforms));
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        if self.geometry.is_none() {
            return;
        }
        let mut pass = color_pass(encoder, "cursor pass", target, wgpu::LoadOp::Load);
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..6, 0..1);
    }
}

/// Overlay tint: red while erasing, amber for obstacles, white otherwise.
pub fn cursor_color(config: &BrushConfig) -> Vec3 {
    if config.erase {
        Vec3::new(1.0, 0.3, 0.3)
    } else if config.mode == BrushMode::Obstacle {
        Vec3::new(1.0, 0.65, 0.2)
    } else {
        Vec3::ONE
    }
}
