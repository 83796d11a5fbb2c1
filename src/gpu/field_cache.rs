//! Device mirrors of the solver fields.

use crate::error::RenderError;
use crate::field::{FieldKind, FieldVersions, GridSize, UploadOutcome};

use super::require_format;

struct FieldTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl FieldTexture {
    fn new(device: &wgpu::Device, kind: FieldKind, grid: GridSize) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(kind.label()),
            size: grid.extent(),
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: kind.texture_format(),
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self { texture, view }
    }

    fn write(&self, queue: &wgpu::Queue, kind: FieldKind, grid: GridSize, bytes: &[u8]) {
        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            bytes,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(grid.width * kind.bytes_per_cell()),
                rows_per_image: Some(grid.height),
            },
            grid.extent(),
        );
    }
}

/// One texture per [`FieldKind`], uploaded only when the solver's data
/// version moves past the version last uploaded.
///
/// Texture row 0 holds grid row 0 (the bottom of the domain).
pub struct FieldTextureCache {
    grid: GridSize,
    textures: Vec<FieldTexture>,
    versions: FieldVersions,
}

impl FieldTextureCache {
    pub fn new(device: &wgpu::Device, grid: GridSize) -> Result<Self, RenderError> {
        for kind in FieldKind::ALL {
            require_format(
                device,
                kind.texture_format(),
                wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                "field texture",
            )?;
        }
        Ok(Self {
            grid,
            textures: FieldKind::ALL.iter().map(|&k| FieldTexture::new(device, k, grid)).collect(),
            versions: FieldVersions::new(),
        })
    }

    pub fn view(&self, kind: FieldKind) -> &wgpu::TextureView {
        &self.textures[kind.index()].view
    }

    /// Upload `kind` when `version` is newer than the mirror.
    ///
    /// `snapshot` is not called when the mirror is current.
    pub fn ensure<'a>(
        &mut self,
        queue: &wgpu::Queue,
        kind: FieldKind,
        snapshot: impl FnOnce() -> &'a [f32],
        version: u64,
    ) -> UploadOutcome {
        let grid = self.grid;
        let texture = &self.textures[kind.index()];
        self.versions.ensure_with(kind, version, grid, snapshot, |data| {
            texture.write(queue, kind, grid, bytemuck::cast_slice(data));
        })
    }

    /// Upload the obstacle mask when `dirty` or after a resize.
    pub fn ensure_obstacles<'a>(
        &mut self,
        queue: &wgpu::Queue,
        snapshot: impl FnOnce() -> &'a [u8],
        dirty: bool,
    ) -> UploadOutcome {
        let grid = self.grid;
        let kind = FieldKind::ObstacleMask;
        let texture = &self.textures[kind.index()];
        self.versions.ensure_mask_with(dirty, grid, snapshot, |data| {
            texture.write(queue, kind, grid, data);
        })
    }

    /// Recreate every mirror at the new size; the next `ensure` always uploads.
    pub fn resize(&mut self, device: &wgpu::Device, grid: GridSize) {
        self.grid = grid;
        self.textures = FieldKind::ALL.iter().map(|&k| FieldTexture::new(device, k, grid)).collect();
        self.versions.invalidate_all();
    }
}
