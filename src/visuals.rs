//! Visualization modes, palettes and tone mapping settings.
//!
//! A [`VisualMode`] picks which solver quantity is shown. The raw value is
//! tone-mapped according to the mode's [`ModeClass`], looked up in a
//! [`Palette`], and blended over the background.
//!
//! # Usage
//!
//! ```
//! use flowlens::visuals::{Palette, VisualConfig, VisualMode};
//!
//! let mut visuals = VisualConfig::new();
//! visuals.mode(VisualMode::Vorticity).palette(Palette::Coolwarm).contrast(4.0);
//! ```

use glam::Vec3;
use serde::{Deserialize, Serialize};

use crate::field::FieldKind;

/// Which solver quantity is visualized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum VisualMode {
    /// Curl of the velocity field. Signed.
    #[default]
    Vorticity,
    /// Speed, `sqrt(ux² + uy²)`.
    Velocity,
    /// Dye concentration.
    Dye,
    /// Temperature, signed or unsigned depending on [`VisualConfig::temperature_bipolar`].
    Temperature,
    /// Deviation of the density proxy from its rest value 1.0.
    Pressure,
}

impl VisualMode {
    pub const ALL: [VisualMode; 5] = [
        VisualMode::Vorticity,
        VisualMode::Velocity,
        VisualMode::Dye,
        VisualMode::Temperature,
        VisualMode::Pressure,
    ];

    /// Slot of this mode in per-mode arrays.
    pub fn index(self) -> usize {
        match self {
            VisualMode::Vorticity => 0,
            VisualMode::Velocity => 1,
            VisualMode::Dye => 2,
            VisualMode::Temperature => 3,
            VisualMode::Pressure => 4,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            VisualMode::Vorticity => "vorticity",
            VisualMode::Velocity => "velocity",
            VisualMode::Dye => "dye",
            VisualMode::Temperature => "temperature",
            VisualMode::Pressure => "pressure",
        }
    }

    /// Tone-mapping class of this mode.
    pub fn class(self, temperature_bipolar: bool) -> ModeClass {
        match self {
            VisualMode::Vorticity | VisualMode::Pressure => ModeClass::Bipolar,
            VisualMode::Velocity | VisualMode::Dye => ModeClass::Magnitude,
            VisualMode::Temperature if temperature_bipolar => ModeClass::Bipolar,
            VisualMode::Temperature => ModeClass::Scalar,
        }
    }

    /// Float fields the mode's program reads, besides the obstacle mask.
    pub fn required_fields(self) -> &'static [FieldKind] {
        match self {
            VisualMode::Vorticity | VisualMode::Velocity => &[FieldKind::VelocityX, FieldKind::VelocityY],
            VisualMode::Dye => &[FieldKind::Dye],
            VisualMode::Temperature => &[FieldKind::Temperature],
            VisualMode::Pressure => &[FieldKind::DensityProxy],
        }
    }

    /// The field bound as the mode's scalar input, if it reads one directly.
    pub fn scalar_field(self) -> Option<FieldKind> {
        match self {
            VisualMode::Vorticity | VisualMode::Velocity => None,
            VisualMode::Dye => Some(FieldKind::Dye),
            VisualMode::Temperature => Some(FieldKind::Temperature),
            VisualMode::Pressure => Some(FieldKind::DensityProxy),
        }
    }

    /// Whether the vorticity pre-pass must run before this mode draws.
    pub fn needs_vorticity(self) -> bool {
        self == VisualMode::Vorticity
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() + 1) % Self::ALL.len()]
    }
}

/// How raw values become palette coordinates and blend weights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModeClass {
    /// Non-negative magnitude, drawn at full brightness weight.
    Magnitude,
    /// Signed value centred on 0.5 of the palette.
    Bipolar,
    /// Unsigned scalar whose weight follows its activity.
    Scalar,
}

impl ModeClass {
    /// Value used by the WGSL programs.
    pub fn as_gpu(self) -> u32 {
        match self {
            ModeClass::Magnitude => 0,
            ModeClass::Bipolar => 1,
            ModeClass::Scalar => 2,
        }
    }
}

/// Colormaps, each a polynomial in `t` evaluated in the shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Palette {
    /// Black through red and orange to pale yellow.
    #[default]
    Inferno,
    /// Black through purple and pink to cream.
    Magma,
    /// Deep blue through magenta to yellow.
    Plasma,
    /// Purple through teal to yellow. Colorblind-friendly.
    Viridis,
    /// High-contrast rainbow.
    Turbo,
    /// Black to white.
    Grayscale,
    /// Deep blue to pale cyan.
    Ice,
    /// Navy to yellow, designed for color vision deficiency.
    Cividis,
    /// Blue through light gray to red. Suits signed data.
    Coolwarm,
}

/// Highest power of `t` in any palette polynomial, plus one.
pub const PALETTE_TERMS: usize = 7;

impl Palette {
    pub const ALL: [Palette; 9] = [
        Palette::Inferno,
        Palette::Magma,
        Palette::Plasma,
        Palette::Viridis,
        Palette::Turbo,
        Palette::Grayscale,
        Palette::Ice,
        Palette::Cividis,
        Palette::Coolwarm,
    ];

    /// Slot used by the shader's palette switch.
    pub fn index(self) -> u32 {
        Self::ALL.iter().position(|p| *p == self).unwrap_or(0) as u32
    }

    pub fn next(self) -> Self {
        Self::ALL[(self.index() as usize + 1) % Self::ALL.len()]
    }

    /// Polynomial coefficients, lowest power first, one `[r, g, b]` per power.
    pub fn coefficients(self) -> [[f32; 3]; PALETTE_TERMS] {
        match self {
            Palette::Inferno => [
                [0.000_218_94, 0.001_651_00, -0.019_480_90],
                [0.106_513_42, 0.563_956_44, 3.932_712_4],
                [11.602_493, -3.972_854, -15.942_394],
                [-41.703_996, 17.436_399, 44.354_145],
                [77.162_94, -33.402_36, -81.807_31],
                [-71.319_43, 32.626_064, 73.209_52],
                [25.131_126, -12.242_669, -23.070_325],
            ],
            Palette::Magma => [
                [-0.002_136_49, -0.000_749_66, -0.005_386_13],
                [0.251_660_54, 0.677_523_24, 2.494_026_6],
                [8.353_717, -3.577_719_5, 0.314_467_9],
                [-27.668_733, 14.264_731, -13.649_213],
                [52.176_14, -27.943_606, 12.944_169],
                [-50.768_525, 29.046_583, 4.234_153],
                [18.655_705, -11.489_774, -5.601_961_5],
            ],
            Palette::Plasma => [
                [0.058_732_34, 0.023_336_71, 0.543_340_2],
                [2.176_514_6, 0.238_383_42, 0.753_960_46],
                [-2.689_460_5, -7.455_851, 3.110_8],
                [6.130_348, 42.346_188, -28.518_855],
                [-11.107_436, -82.666_31, 60.139_85],
                [10.023_066, 71.413_62, -54.072_187],
                [-3.658_713_8, -22.931_535, 18.191_908],
            ],
            Palette::Viridis => [
                [0.277_727_33, 0.005_407_34, 0.334_099_8],
                [0.105_093_04, 1.404_613_5, 1.384_590_2],
                [-0.330_861_83, 0.214_847_56, 0.095_095_16],
                [-4.634_230_4, -5.799_101, -19.332_441],
                [6.228_27, 14.179_933, 56.690_55],
                [4.776_385, -13.745_145, -65.353_03],
                [-5.435_456, 4.645_852_6, 26.312_435],
            ],
            Palette::Turbo => [
                [0.135_721_38, 0.091_402_61, 0.106_673_3],
                [4.615_392_6, 2.194_188_4, 12.641_946],
                [-42.660_32, 4.842_966_6, -60.582_05],
                [132.131_08, -14.185_033, 110.362_77],
                [-152.942_4, 4.277_298_7, -89.903_11],
                [59.286_38, 2.829_566, 27.348_25],
                [0.0, 0.0, 0.0],
            ],
            Palette::Grayscale => [
                [0.0, 0.0, 0.0],
                [1.0, 1.0, 1.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
            Palette::Ice => [
                [0.1, 0.3, 0.6],
                [0.8, 0.7, 0.4],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
            Palette::Cividis => [
                [0.0, 0.135, 0.305],
                [0.957, 0.626, 0.752],
                [0.038, 0.148, -0.84],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
            Palette::Coolwarm => [
                [0.23, 0.299, 0.754],
                [2.064, 2.547, 1.048],
                [-1.588, -2.83, -1.652],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
                [0.0, 0.0, 0.0],
            ],
        }
    }

    /// Color at `t` (clamped to `[0, 1]`), each channel clamped to `[0, 1]`.
    ///
    /// Evaluated with Horner's scheme, in the same order as the shader.
    pub fn sample(self, t: f32) -> Vec3 {
        let t = t.clamp(0.0, 1.0);
        let c = self.coefficients();
        let mut acc = Vec3::from_array(c[PALETTE_TERMS - 1]);
        for term in c[..PALETTE_TERMS - 1].iter().rev() {
            acc = acc * t + Vec3::from_array(*term);
        }
        acc.clamp(Vec3::ZERO, Vec3::ONE)
    }
}

/// Tone-mapping parameters shared by every mode.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToneMap {
    /// Subtracted from the raw value first.
    pub bias: f32,
    /// Gain applied after the bias.
    pub contrast: f32,
    /// Exponent shaping the response. Values below 1 lift faint detail.
    pub power: f32,
    /// Palette color multiplier; also the blend weight for magnitude and bipolar modes.
    pub brightness: f32,
}

impl Default for ToneMap {
    fn default() -> Self {
        Self {
            bias: 0.0,
            contrast: 1.0,
            power: 1.0,
            brightness: 1.0,
        }
    }
}

/// Smallest exponent accepted; `pow(0, 0)` is undefined on the GPU.
pub const MIN_POWER: f32 = 0.01;

/// Configuration of the field visualization.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisualConfig {
    pub mode: VisualMode,
    pub palette: Palette,
    pub tone: ToneMap,
    /// Show temperature as signed data around zero.
    pub temperature_bipolar: bool,
    /// Color where the field is inactive (RGB, 0.0-1.0).
    pub background: Vec3,
    /// Color of solid cells (RGB, 0.0-1.0).
    pub obstacle_color: Vec3,
}

impl Default for VisualConfig {
    fn default() -> Self {
        Self {
            mode: VisualMode::Vorticity,
            palette: Palette::Coolwarm,
            tone: ToneMap {
                contrast: 8.0,
                power: 0.6,
                ..Default::default()
            },
            temperature_bipolar: true,
            background: Vec3::new(0.02, 0.02, 0.05),
            obstacle_color: Vec3::new(0.35, 0.35, 0.38),
        }
    }
}

impl VisualConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&mut self, mode: VisualMode) -> &mut Self {
        self.mode = mode;
        self
    }

    pub fn palette(&mut self, palette: Palette) -> &mut Self {
        self.palette = palette;
        self
    }

    pub fn bias(&mut self, bias: f32) -> &mut Self {
        self.tone.bias = bias;
        self
    }

    pub fn contrast(&mut self, contrast: f32) -> &mut Self {
        self.tone.contrast = contrast.max(0.0);
        self
    }

    /// Set the response exponent, clamped to at least [`MIN_POWER`].
    pub fn power(&mut self, power: f32) -> &mut Self {
        self.tone.power = power.max(MIN_POWER);
        self
    }

    pub fn brightness(&mut self, brightness: f32) -> &mut Self {
        self.tone.brightness = brightness.max(0.0);
        self
    }

    pub fn temperature_bipolar(&mut self, bipolar: bool) -> &mut Self {
        self.temperature_bipolar = bipolar;
        self
    }

    pub fn background(&mut self, color: Vec3) -> &mut Self {
        self.background = color;
        self
    }

    pub fn obstacle_color(&mut self, color: Vec3) -> &mut Self {
        self.obstacle_color = color;
        self
    }

    /// Tone-mapping class of the active mode.
    pub fn class(&self) -> ModeClass {
        self.mode.class(self.temperature_bipolar)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_classes() {
        assert_eq!(VisualMode::Vorticity.class(false), ModeClass::Bipolar);
        assert_eq!(VisualMode::Pressure.class(false), ModeClass::Bipolar);
        assert_eq!(VisualMode::Velocity.class(true), ModeClass::Magnitude);
        assert_eq!(VisualMode::Dye.class(true), ModeClass::Magnitude);
        assert_eq!(VisualMode::Temperature.class(true), ModeClass::Bipolar);
        assert_eq!(VisualMode::Temperature.class(false), ModeClass::Scalar);
    }

    #[test]
    fn test_required_fields() {
        assert!(VisualMode::Vorticity.needs_vorticity());
        assert!(!VisualMode::Dye.needs_vorticity());
        assert_eq!(VisualMode::Dye.required_fields(), &[FieldKind::Dye]);
        assert_eq!(VisualMode::Pressure.scalar_field(), Some(FieldKind::DensityProxy));
        assert!(VisualMode::Velocity.required_fields().contains(&FieldKind::VelocityY));
    }

    #[test]
    fn test_palettes_stay_in_range() {
        for palette in Palette::ALL {
            for i in 0..=100 {
                let c = palette.sample(i as f32 / 100.0);
                assert!(c.min_element() >= 0.0 && c.max_element() <= 1.0, "{palette:?} at {i}");
            }
        }
    }

    #[test]
    fn test_grayscale_is_identity() {
        for t in [0.0, 0.25, 0.5, 1.0] {
            let c = Palette::Grayscale.sample(t);
            assert!((c - Vec3::splat(t)).length() < 0.0001);
        }
    }

    #[test]
    fn test_sequential_palettes_get_brighter() {
        for palette in [Palette::Inferno, Palette::Magma, Palette::Viridis, Palette::Cividis, Palette::Ice] {
            let dark = palette.sample(0.05).length();
            let light = palette.sample(0.95).length();
            assert!(light > dark, "{palette:?}");
        }
    }

    #[test]
    fn test_coolwarm_is_cool_then_warm() {
        let low = Palette::Coolwarm.sample(0.0);
        let high = Palette::Coolwarm.sample(1.0);
        assert!(low.z > low.x);
        assert!(high.x > high.z);
    }

    #[test]
    fn test_sample_clamps_t() {
        assert_eq!(Palette::Turbo.sample(-3.0), Palette::Turbo.sample(0.0));
        assert_eq!(Palette::Turbo.sample(7.0), Palette::Turbo.sample(1.0));
    }

    #[test]
    fn test_builder_clamps_power() {
        let mut config = VisualConfig::new();
        config.power(0.0).contrast(-2.0).mode(VisualMode::Temperature).temperature_bipolar(false);
        assert_eq!(config.tone.power, MIN_POWER);
        assert_eq!(config.tone.contrast, 0.0);
        assert_eq!(config.class(), ModeClass::Scalar);
    }

    #[test]
    fn test_cycles_visit_everything() {
        let mut mode = VisualMode::Vorticity;
        let mut palette = Palette::Inferno;
        for _ in 0..Palette::ALL.len() {
            palette = palette.next();
        }
        for _ in 0..VisualMode::ALL.len() {
            mode = mode.next();
        }
        assert_eq!(palette, Palette::Inferno);
        assert_eq!(mode, VisualMode::Vorticity);
        assert_eq!(Palette::Coolwarm.index(), 8);
    }
}
