//! Field kinds, grid dimensions and upload bookkeeping.
//!
//! The solver exposes its state as flat snapshots, one per [`FieldKind`].
//! The GPU cache mirrors each snapshot in a texture and only re-uploads
//! when the solver's data version moves. That decision lives here in
//! [`FieldVersions`] so it can be exercised without a device.
//!
//! # Layout
//!
//! Every snapshot holds `width * height` cells, row-major, with row 0 at
//! the bottom of the domain (grid y points up).

/// One of the quantities a flow solver exposes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Horizontal velocity, grid cells per solver step.
    VelocityX,
    /// Vertical velocity, grid cells per solver step (positive is up).
    VelocityY,
    /// Passive dye concentration.
    Dye,
    /// Temperature, roughly centred on zero.
    Temperature,
    /// Density-like scalar with rest value 1.0.
    DensityProxy,
    /// Solid cells. Stored as bytes, nonzero is solid.
    ObstacleMask,
}

impl FieldKind {
    /// Number of field kinds.
    pub const COUNT: usize = 6;

    /// All kinds, in texture-slot order.
    pub const ALL: [FieldKind; Self::COUNT] = [
        FieldKind::VelocityX,
        FieldKind::VelocityY,
        FieldKind::Dye,
        FieldKind::Temperature,
        FieldKind::DensityProxy,
        FieldKind::ObstacleMask,
    ];

    /// Slot of this kind in per-kind arrays.
    pub fn index(self) -> usize {
        match self {
            FieldKind::VelocityX => 0,
            FieldKind::VelocityY => 1,
            FieldKind::Dye => 2,
            FieldKind::Temperature => 3,
            FieldKind::DensityProxy => 4,
            FieldKind::ObstacleMask => 5,
        }
    }

    /// True for the byte-valued obstacle mask.
    pub fn is_mask(self) -> bool {
        matches!(self, FieldKind::ObstacleMask)
    }

    /// Texture format used for this kind's GPU mirror.
    pub fn texture_format(self) -> wgpu::TextureFormat {
        if self.is_mask() {
            wgpu::TextureFormat::R8Unorm
        } else {
            wgpu::TextureFormat::R32Float
        }
    }

    /// Bytes per cell in the snapshot and the texture.
    pub fn bytes_per_cell(self) -> u32 {
        if self.is_mask() {
            1
        } else {
            4
        }
    }

    /// Debug label.
    pub fn label(self) -> &'static str {
        match self {
            FieldKind::VelocityX => "velocity x",
            FieldKind::VelocityY => "velocity y",
            FieldKind::Dye => "dye",
            FieldKind::Temperature => "temperature",
            FieldKind::DensityProxy => "density proxy",
            FieldKind::ObstacleMask => "obstacle mask",
        }
    }
}

/// Simulation grid dimensions in cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
pub struct GridSize {
    pub width: u32,
    pub height: u32,
}

impl GridSize {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Cell count a snapshot of this grid must have.
    pub fn cells(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// A grid with no cells. Everything that depends on it becomes a no-op.
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// Row-major index of a cell, or `None` when outside the grid.
    pub fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return None;
        }
        Some(y as usize * self.width as usize + x as usize)
    }

    /// Clamp a cell coordinate onto the grid.
    pub fn clamp_cell(&self, x: i32, y: i32) -> (i32, i32) {
        (
            x.clamp(0, self.width.max(1) as i32 - 1),
            y.clamp(0, self.height.max(1) as i32 - 1),
        )
    }

    /// Texture extent, at least 1x1 so an empty grid still has valid resources.
    pub fn extent(&self) -> wgpu::Extent3d {
        wgpu::Extent3d {
            width: self.width.max(1),
            height: self.height.max(1),
            depth_or_array_layers: 1,
        }
    }
}

/// Result of asking the cache to bring one mirror up to date.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UploadOutcome {
    /// The mirror already holds this version; nothing was read.
    Skipped,
    /// The snapshot was copied into the mirror.
    Uploaded,
    /// The snapshot had the wrong length and was dropped.
    Rejected {
        expected: usize,
        actual: usize,
    },
}

/// Last uploaded data version per field kind.
///
/// `None` means the mirror has never been filled or was invalidated, so
/// the next request always uploads. The obstacle mask is not versioned by
/// the solver; it tracks a plain "synced" flag instead.
#[derive(Clone, Debug, Default)]
pub struct FieldVersions {
    uploaded: [Option<u64>; FieldKind::COUNT],
    mask_synced: bool,
}

impl FieldVersions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Version last uploaded for `kind`.
    pub fn version(&self, kind: FieldKind) -> Option<u64> {
        self.uploaded[kind.index()]
    }

    /// Whether the mirror for `kind` already holds `version`.
    pub fn is_current(&self, kind: FieldKind, version: u64) -> bool {
        self.uploaded[kind.index()] == Some(version)
    }

    /// Forget every upload, e.g. after the mirrors were recreated.
    pub fn invalidate_all(&mut self) {
        self.uploaded = [None; FieldKind::COUNT];
        self.mask_synced = false;
    }

    /// Bring the float mirror for `kind` up to `version`.
    ///
    /// `snapshot` is only called when an upload is needed. A snapshot whose
    /// length differs from `grid.cells()` is rejected and the stored version
    /// is left untouched, so the previous mirror contents stay in use and the
    /// next frame tries again.
    pub fn ensure_with<'a, S, U>(
        &mut self,
        kind: FieldKind,
        version: u64,
        grid: GridSize,
        snapshot: S,
        upload: U,
    ) -> UploadOutcome
    where
        S: FnOnce() -> &'a [f32],
        U: FnOnce(&[f32]),
    {
        if grid.is_empty() || self.is_current(kind, version) {
            return UploadOutcome::Skipped;
        }
        let data = snapshot();
        if data.len() != grid.cells() {
            log::warn!(
                "Rejected {} snapshot: {} cells, grid has {}",
                kind.label(),
                data.len(),
                grid.cells()
            );
            return UploadOutcome::Rejected {
                expected: grid.cells(),
                actual: data.len(),
            };
        }
        upload(data);
        self.uploaded[kind.index()] = Some(version);
        UploadOutcome::Uploaded
    }

    /// Bring the obstacle mirror up to date when the solver flags it dirty
    /// or the mirror was invalidated.
    pub fn ensure_mask_with<'a, S, U>(
        &mut self,
        dirty: bool,
        grid: GridSize,
        snapshot: S,
        upload: U,
    ) -> UploadOutcome
    where
        S: FnOnce() -> &'a [u8],
        U: FnOnce(&[u8]),
    {
        if grid.is_empty() || (self.mask_synced && !dirty) {
            return UploadOutcome::Skipped;
        }
        let data = snapshot();
        if data.len() != grid.cells() {
            log::warn!(
                "Rejected obstacle mask: {} cells, grid has {}",
                data.len(),
                grid.cells()
            );
            return UploadOutcome::Rejected {
                expected: grid.cells(),
                actual: data.len(),
            };
        }
        upload(data);
        self.mask_synced = true;
        UploadOutcome::Uploaded
    }
}
