//! Per-mode color visualization of the field mirrors.

use crate::error::RenderError;
use crate::field::FieldKind;
use crate::shaders::visualize_shader;
use crate::uniforms::VisualUniforms;
use crate::visuals::VisualMode;

use super::{
    color_pass, fullscreen_pipeline, shader_module, texture_entry, uniform_buffer, uniform_entry, FieldTextureCache,
};

/// One pipeline per [`VisualMode`], sharing a bind group layout.
pub struct VisualizePass {
    pipelines: Vec<wgpu::RenderPipeline>,
    layout: wgpu::BindGroupLayout,
    uniforms: wgpu::Buffer,
    bind_groups: Vec<wgpu::BindGroup>,
}

impl VisualizePass {
    pub fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Result<Self, RenderError> {
        let fragment = wgpu::ShaderStages::FRAGMENT;
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("visualize inputs"),
            entries: &[
                uniform_entry(0, fragment),
                texture_entry(1, fragment, false),
                texture_entry(2, fragment, false),
                texture_entry(3, fragment, false),
                texture_entry(4, fragment, false),
            ],
        });

        let pipelines = VisualMode::ALL
            .iter()
            .map(|&mode| {
                let label = format!("visualize {}", mode.label());
                let module = shader_module(device, &label, visualize_shader(mode))?;
                fullscreen_pipeline(device, &label, &module, &layout, format)
            })
            .collect::<Result<Vec<_>, _>>()?;

        let uniforms = uniform_buffer::<VisualUniforms>(device, "visual uniforms");

        Ok(Self {
            pipelines,
            layout,
            uniforms,
            bind_groups: Vec::new(),
        })
    }

    pub fn write_uniforms(&self, queue: &wgpu::Queue, uniforms: &VisualUniforms) {
        queue.write_buffer(&self.uniforms, 0, bytemuck::bytes_of(uniforms));
    }

    /// Rebuild the per-mode bind groups over the current mirrors.
    pub fn bind_fields(&mut self, device: &wgpu::Device, cache: &FieldTextureCache, vorticity: &wgpu::TextureView) {
        self.bind_groups = VisualMode::ALL
            .iter()
            .map(|&mode| {
                // Velocity reads no scalar; any float mirror fills the slot.
                let scalar = match mode.scalar_field() {
                    Some(kind) => cache.view(kind),
                    None if mode.needs_vorticity() => vorticity,
                    None => cache.view(FieldKind::Dye),
                };
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(mode.label()),
                    layout: &self.layout,
                    entries: &[
                        wgpu::BindGroupEntry {
                            binding: 0,
                            resource: self.uniforms.as_entire_binding(),
                        },
                        wgpu::BindGroupEntry {
                            binding: 1,
                            resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::VelocityX)),
                        },
                        wgpu::BindGroupEntry {
                            binding: 2,
                            resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::VelocityY)),
                        },
                        wgpu::BindGroupEntry {
                            binding: 3,
                            resource: wgpu::BindingResource::TextureView(scalar),
                        },
                        wgpu::BindGroupEntry {
                            binding: 4,
                            resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::ObstacleMask)),
                        },
                    ],
                })
            })
            .collect();
    }

    /// Draw `mode` over the whole of `target`.
    pub fn record(&self, encoder: &mut wgpu::CommandEncoder, target: &wgpu::TextureView, mode: VisualMode) {
        let Some(bind_group) = self.bind_groups.get(mode.index()) else {
            log::debug!("Visualization has no fields bound");
            return;
        };
        let mut pass = color_pass(encoder, "visualize pass", target, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        pass.set_pipeline(&self.pipelines[mode.index()]);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
