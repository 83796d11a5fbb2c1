//! WGSL snippets shared by the generated programs.
//!
//! Each program in [`shaders`](crate::shaders) is assembled from these
//! pieces plus its own entry points.
//!
//! # Available Functions
//!
//! ## Random & Hash
//! - `hash(n: u32) -> u32`, identical to [`particles::hash`](crate::particles::hash)
//! - `rand01(n: u32) -> f32`, identical to [`particles::rand01`](crate::particles::rand01)
//!
//! ## Field sampling
//! - `load_clamped(tex, cell: vec2<i32>) -> f32`, red channel, edge clamped
//! - `sample_bilinear(tex, g: vec2<f32>) -> f32`, cell values at integer coordinates
//!
//! ## Color
//! - `palette(index: u32, t: f32) -> vec3<f32>`, see [`Palette`]

use crate::visuals::{Palette, PALETTE_TERMS};

/// WGSL code for random/hash functions.
pub const RANDOM_WGSL: &str = r#"
fn hash(n: u32) -> u32 {
    var x = n;
    x = x ^ (x >> 17u);
    x = x * 0xed5ad4bbu;
    x = x ^ (x >> 11u);
    x = x * 0xac4c1b51u;
    x = x ^ (x >> 15u);
    x = x * 0x31848babu;
    x = x ^ (x >> 14u);
    return x;
}

// Top 24 bits convert exactly, so this matches the host bit for bit.
fn rand01(n: u32) -> f32 {
    return f32(hash(n) >> 8u) * (1.0 / 16777216.0);
}
"#;

/// WGSL code for reading single-channel field textures.
pub const SAMPLING_WGSL: &str = r#"
fn load_clamped(tex: texture_2d<f32>, cell: vec2<i32>) -> f32 {
    let dims = vec2<i32>(textureDimensions(tex));
    let c = clamp(cell, vec2<i32>(0, 0), dims - vec2<i32>(1, 1));
    return textureLoad(tex, c, 0).r;
}

// R32Float is not filterable, so interpolate by hand.
fn sample_bilinear(tex: texture_2d<f32>, g: vec2<f32>) -> f32 {
    let base = floor(g);
    let f = g - base;
    let i = vec2<i32>(base);
    let a = load_clamped(tex, i);
    let b = load_clamped(tex, i + vec2<i32>(1, 0));
    let c = load_clamped(tex, i + vec2<i32>(0, 1));
    let d = load_clamped(tex, i + vec2<i32>(1, 1));
    return mix(mix(a, b, f.x), mix(c, d, f.x), f.y);
}
"#;

/// Fullscreen triangle; `uv` is (0, 0) at the top-left of the target.
pub const FULLSCREEN_WGSL: &str = r#"
struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> VertexOutput {
    var positions = array<vec2<f32>, 3>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(3.0, -1.0),
        vec2<f32>(-1.0, 3.0),
    );
    var uvs = array<vec2<f32>, 3>(
        vec2<f32>(0.0, 1.0),
        vec2<f32>(2.0, 1.0),
        vec2<f32>(0.0, -1.0),
    );

    var out: VertexOutput;
    out.clip_position = vec4<f32>(positions[vertex_index], 0.0, 1.0);
    out.uv = uvs[vertex_index];
    return out;
}
"#;

fn channel_horner(coefficients: &[[f32; 3]; PALETTE_TERMS]) -> String {
    let vec = |c: &[f32; 3]| format!("vec3<f32>({:.8}, {:.8}, {:.8})", c[0], c[1], c[2]);
    let mut expr = vec(&coefficients[PALETTE_TERMS - 1]);
    for term in coefficients[..PALETTE_TERMS - 1].iter().rev() {
        expr = format!("({expr}) * t + {}", vec(term));
    }
    expr
}

/// WGSL `palette(index, t)` built from [`Palette::coefficients`].
pub fn palette_wgsl() -> String {
    let mut cases = String::new();
    for palette in Palette::ALL {
        cases.push_str(&format!(
            "        case {}u: {{ c = {}; }}\n",
            palette.index(),
            channel_horner(&palette.coefficients())
        ));
    }
    format!(
        r#"
fn palette(index: u32, t_in: f32) -> vec3<f32> {{
    let t = clamp(t_in, 0.0, 1.0);
    var c = vec3<f32>(t);
    switch index {{
{cases}        default: {{}}
    }}
    return clamp(c, vec3<f32>(0.0), vec3<f32>(1.0));
}}
"#
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_has_a_case_per_palette() {
        let code = palette_wgsl();
        for palette in Palette::ALL {
            assert!(code.contains(&format!("case {}u:", palette.index())));
        }
        assert!(code.contains("default"));
    }

    #[test]
    fn test_horner_nests_every_term() {
        let expr = channel_horner(&Palette::Turbo.coefficients());
        assert_eq!(expr.matches("* t").count(), PALETTE_TERMS - 1);
        assert!(!expr.contains("e-") && !expr.contains("e+"), "exponent notation in {expr}");
    }
}
