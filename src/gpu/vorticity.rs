//! Curl pre-pass for the vorticity view.

use crate::error::RenderError;
use crate::field::{FieldKind, GridSize};
use crate::shaders::vorticity_shader;

use super::{color_pass, fullscreen_pipeline, require_format, shader_module, texture_entry, FieldTextureCache};

const VORTICITY_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Renders the curl of the velocity mirrors into a grid-sized texture.
///
/// Recomputed every frame the vorticity view is active; never cached.
pub struct VorticityPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    #[allow(dead_code)]
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    bind_group: Option<wgpu::BindGroup>,
}

fn create_target(device: &wgpu::Device, grid: GridSize) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("vorticity"),
        size: grid.extent(),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: VORTICITY_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

impl VorticityPass {
    pub fn new(device: &wgpu::Device, grid: GridSize) -> Result<Self, RenderError> {
        require_format(
            device,
            VORTICITY_FORMAT,
            wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            "vorticity target",
        )?;

        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("vorticity inputs"),
            entries: &[
                texture_entry(0, wgpu::ShaderStages::FRAGMENT, false),
                texture_entry(1, wgpu::ShaderStages::FRAGMENT, false),
            ],
        });
        let module = shader_module(device, "vorticity shader", vorticity_shader())?;
        let pipeline = fullscreen_pipeline(device, "vorticity pipeline", &module, &layout, VORTICITY_FORMAT)?;
        let (texture, view) = create_target(device, grid);

        Ok(Self {
            pipeline,
            layout,
            texture,
            view,
            bind_group: None,
        })
    }

    /// The curl texture, read by the vorticity visualization.
    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn resize(&mut self, device: &wgpu::Device, grid: GridSize) {
        (self.texture, self.view) = create_target(device, grid);
        self.bind_group = None;
    }

    /// Point the pass at the current velocity mirrors.
    pub fn bind_fields(&mut self, device: &wgpu::Device, cache: &FieldTextureCache) {
        self.bind_group = Some(device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("vorticity inputs"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::VelocityX)),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(cache.view(FieldKind::VelocityY)),
                },
            ],
        }));
    }

    pub fn record(&self, encoder: &mut wgpu::CommandEncoder) {
        let Some(bind_group) = &self.bind_group else {
            log::debug!("Vorticity pass has no inputs bound");
            return;
        };
        let mut pass = color_pass(encoder, "vorticity pass", &self.view, wgpu::LoadOp::Clear(wgpu::Color::BLACK));
        pass.set_pipeline(&self.pipeline);
        pass.set_bind_group(0, bind_group, &[]);
        pass.draw(0..3, 0..1);
    }
}
