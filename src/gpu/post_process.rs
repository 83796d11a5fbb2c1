//! Post-processing for screen-space filters.
//!
//! While enabled, the scene renders to an offscreen texture and a
//! fullscreen pass filters it onto the surface.

use crate::error::RenderError;
use crate::shaders::post_process_shader;
use crate::uniforms::PostUniforms;

use super::{
    color_pass, fullscreen_pipeline, shader_module, texture_entry, uniform_buffer, uniform_entry, validated_resource,
};

/// GPU resources for post-processing.
pub struct PostProcessor {
    /// Offscreen render target.
    texture: wgpu::Texture,
    /// View into the offscreen texture.
    view: wgpu::TextureView,
    pipeline: wgpu::RenderPipeline,
    bind_group: wgpu::BindGroup,
    /// Bind group layout (needed for recreation on resize).
    bind_group_layout: wgpu::BindGroupLayout,
    /// Sampler for the scene texture.
    sampler: wgpu::Sampler,
    uniforms: wgpu::Buffer,
}

fn create_target(device: &wgpu::Device, format: wgpu::TextureFormat, size: (u32, u32)) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Offscreen Texture"),
        size: wgpu::Extent3d {
            width: size.0.max(1),
            height: size.1.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

impl PostProcessor {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat, size: (u32, u32)) -> Result<Self, RenderError> {
        let (texture, view) = validated_resource(device, "post-processing target", || create_target(device, format, size))?;

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Scene Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Post-Process Bind Group Layout"),
            entries: &[
                texture_entry(0, wgpu::ShaderStages::FRAGMENT, true),
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                uniform_entry(2, wgpu::ShaderStages::FRAGMENT),
            ],
        });

        let uniforms = uniform_buffer::<PostUniforms>(device, "post uniforms");
        let bind_group = create_bind_group(device, &bind_group_layout, &view, &sampler, &uniforms);

        let shader = shader_module(device, "Post-Process Shader", post_process_shader())?;
        let pipeline = fullscreen_pipeline(device, "Post-Process Pipeline", &shader, &bind_group_layout, format)?;

        Ok(Self {
            texture,
            view,
            pipeline,
            bind_group,
            bind_group_layout,
            sampler,
            uniforms,
        })
    }

    /// Where the scene passes draw while post-processing is on.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &PostUniforms) {
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    /// Recreate the target and bind group after a surface resize.
    pub fn resize(&mut self, device: &wgpu::Device, size: (u32, u32)) {
        (self.texture, self.view) = create_target(device, self.texture.format(), size);
        self.bind_group = create_bind_group(device, &self.bind_group_layout, &self.view, &self.sampler, &self.uniforms);
    }

    /// Filter the offscreen scene onto `target`.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView) {
        let mut pass = color_pass(encoder, "post pass", target, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, &self.bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
    uniforms: &wgpu::Buffer,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Post-Process Bind Group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: uniforms.as_entire_binding(),
            },
        ],
    })
}
