//! WGSL program generation.
//!
//! Every GPU program flowlens runs is generated here as a string and
//! compiled by the device at startup. The uniform structs declared in the
//! programs mirror [`uniforms`](crate::uniforms).

use crate::particles::{CANDIDATE_STRIDE, DEAD_POSITION, LOTTERY_SALT, RESPAWN_ATTEMPTS};
use crate::shader_utils::{palette_wgsl, FULLSCREEN_WGSL, RANDOM_WGSL, SAMPLING_WGSL};
use crate::shading::{REST_DENSITY, SCALAR_WEIGHT_GAIN};
use crate::visuals::{ModeClass, VisualMode};

/// Threads per workgroup of the advection program.
pub const WORKGROUP_SIZE: u32 = 256;

const VISUAL_UNIFORMS_WGSL: &str = r#"
struct VisualUniforms {
    grid: vec2<f32>,
    canvas: vec2<f32>,
    bias: f32,
    contrast: f32,
    power: f32,
    brightness: f32,
    palette: u32,
    bipolar: u32,
    _pad0: u32,
    _pad1: u32,
    background: vec4<f32>,
    obstacle: vec4<f32>,
};
"#;

/// Raw value and tone-mapping class of one mode, as WGSL functions.
fn mode_functions(mode: VisualMode) -> String {
    let raw = match mode {
        VisualMode::Vorticity | VisualMode::Dye | VisualMode::Temperature => {
            "    return sample_bilinear(tex_scalar, g);".to_string()
        }
        VisualMode::Velocity => r#"    let ux = sample_bilinear(tex_ux, g);
    let uy = sample_bilinear(tex_uy, g);
    return sqrt(ux * ux + uy * uy);"#
            .to_string(),
        VisualMode::Pressure => format!("    return sample_bilinear(tex_scalar, g) - {REST_DENSITY:.1};"),
    };
    let kind = match mode {
        VisualMode::Temperature => format!(
            "    return select({}u, {}u, u.bipolar != 0u);",
            ModeClass::Scalar.as_gpu(),
            ModeClass::Bipolar.as_gpu()
        ),
        _ => format!("    return {}u;", mode.class(false).as_gpu()),
    };
    format!(
        r#"
fn raw_value(g: vec2<f32>) -> f32 {{
{raw}
}}

fn mode_kind() -> u32 {{
{kind}
}}
"#
    )
}

/// Fullscreen visualization program for `mode`.
///
/// Bindings: 0 uniforms, 1 velocity x, 2 velocity y, 3 the mode's scalar
/// field (the curl texture in vorticity mode), 4 obstacle mask.
pub fn visualize_shader(mode: VisualMode) -> String {
    let palette = palette_wgsl();
    let functions = mode_functions(mode);
    let magnitude = ModeClass::Magnitude.as_gpu();
    let bipolar = ModeClass::Bipolar.as_gpu();
    let scalar = ModeClass::Scalar.as_gpu();
    format!(
        r#"{VISUAL_UNIFORMS_WGSL}
@group(0) @binding(0)
var<uniform> u: VisualUniforms;
@group(0) @binding(1)
var tex_ux: texture_2d<f32>;
@group(0) @binding(2)
var tex_uy: texture_2d<f32>;
@group(0) @binding(3)
var tex_scalar: texture_2d<f32>;
@group(0) @binding(4)
var tex_obstacles: texture_2d<f32>;

const KIND_MAGNITUDE: u32 = {magnitude}u;
const KIND_BIPOLAR: u32 = {bipolar}u;
const KIND_SCALAR: u32 = {scalar}u;
{FULLSCREEN_WGSL}{SAMPLING_WGSL}{palette}{functions}
// x: palette coordinate, y: activity.
fn tone_map(raw: f32, kind: u32) -> vec2<f32> {{
    let biased = raw - u.bias;
    if kind == KIND_BIPOLAR {{
        let scaled = biased * u.contrast;
        let mapped = sign(scaled) * pow(abs(scaled), u.power) * 0.5 + 0.5;
        return vec2<f32>(mapped, abs(mapped - 0.5) * 2.0);
    }}
    let gained = max(0.0, biased) * u.contrast;
    let mapped = pow(max(0.0, gained), u.power);
    return vec2<f32>(mapped, mapped);
}}

fn blend_weight(activity: f32, kind: u32) -> f32 {{
    if kind == KIND_SCALAR {{
        return clamp(activity * {SCALAR_WEIGHT_GAIN:.1}, 0.0, 1.0);
    }}
    return clamp(u.brightness, 0.0, 1.0);
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    // Grid space: y up, cell centres at half-integers.
    let g = vec2<f32>(in.uv.x * u.grid.x, (1.0 - in.uv.y) * u.grid.y);
    if load_clamped(tex_obstacles, vec2<i32>(floor(g))) > 0.0 {{
        return vec4<f32>(u.obstacle.rgb, 1.0);
    }}
    let kind = mode_kind();
    let tm = tone_map(raw_value(g - vec2<f32>(0.5, 0.5)), kind);
    let color = palette(u.palette, clamp(tm.x, 0.0, 1.0)) * u.brightness;
    let w = blend_weight(tm.y, kind);
    return vec4<f32>(mix(u.background.rgb, color, w), 1.0);
}}
"#
    )
}

/// Curl pre-pass. Renders one texel per grid cell into an `R32Float` target.
pub fn vorticity_shader() -> String {
    format!(
        r#"
@group(0) @binding(0)
var tex_ux: texture_2d<f32>;
@group(0) @binding(1)
var tex_uy: texture_2d<f32>;
{FULLSCREEN_WGSL}{SAMPLING_WGSL}
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    // Target texel rows match field rows, so the fragment coordinate is the cell.
    let cell = vec2<i32>(floor(in.clip_position.xy));
    let duy_dx = (load_clamped(tex_uy, cell + vec2<i32>(1, 0)) - load_clamped(tex_uy, cell - vec2<i32>(1, 0))) * 0.5;
    let dux_dy = (load_clamped(tex_ux, cell + vec2<i32>(0, 1)) - load_clamped(tex_ux, cell - vec2<i32>(0, 1))) * 0.5;
    return vec4<f32>(duy_dx - dux_dy, 0.0, 0.0, 1.0);
}}
"#
    )
}

/// Particle advection compute program: reads `particles_in`, writes `particles_out`.
pub fn advect_shader() -> String {
    let dead = format!("{DEAD_POSITION:.1}");
    format!(
        r#"
struct Particle {{
    position: vec2<f32>,
    aux: vec2<f32>,
}};

struct AdvectUniforms {{
    grid: vec2<f32>,
    canvas: vec2<f32>,
    dt: f32,
    respawn_rate: f32,
    frame_seed: u32,
    count: u32,
    edges: vec4<u32>,
}};

@group(0) @binding(0)
var<storage, read> particles_in: array<Particle>;
@group(0) @binding(1)
var<storage, read_write> particles_out: array<Particle>;
@group(0) @binding(2)
var<uniform> params: AdvectUniforms;
@group(0) @binding(3)
var tex_ux: texture_2d<f32>;
@group(0) @binding(4)
var tex_uy: texture_2d<f32>;
@group(0) @binding(5)
var tex_obstacles: texture_2d<f32>;

const DEAD_POSITION: f32 = {dead};
const RESPAWN_ATTEMPTS: u32 = {RESPAWN_ATTEMPTS}u;
const CANDIDATE_STRIDE: u32 = {CANDIDATE_STRIDE}u;
const LOTTERY_SALT: u32 = {LOTTERY_SALT}u;
const EDGE_WRAP: u32 = 0u;
const EDGE_WALL: u32 = 1u;
{RANDOM_WGSL}{SAMPLING_WGSL}
fn to_grid(p: vec2<f32>) -> vec2<f32> {{
    return vec2<f32>(
        p.x * (params.grid.x / params.canvas.x),
        (params.canvas.y - p.y) * (params.grid.y / params.canvas.y),
    );
}}

fn to_canvas(g: vec2<f32>) -> vec2<f32> {{
    return vec2<f32>(
        g.x * (params.canvas.x / params.grid.x),
        params.canvas.y - g.y * (params.canvas.y / params.grid.y),
    );
}}

fn velocity_at(g: vec2<f32>) -> vec2<f32> {{
    return vec2<f32>(sample_bilinear(tex_ux, g), sample_bilinear(tex_uy, g));
}}

// False for NaN, which fails every comparison.
fn in_grid(g: vec2<f32>) -> bool {{
    return g.x >= 0.0 && g.y >= 0.0 && g.x < params.grid.x && g.y < params.grid.y;
}}

fn is_obstacle(g: vec2<f32>) -> bool {{
    return load_clamped(tex_obstacles, vec2<i32>(floor(g))) > 0.0;
}}

// x: resolved coordinate, y: 1.0 when the particle left through a respawn edge.
fn resolve_edge(v: f32, extent: f32, low: u32, high: u32) -> vec2<f32> {{
    if v < 0.0 {{
        if low == EDGE_WRAP {{
            return vec2<f32>(v + extent, 0.0);
        }}
        if low == EDGE_WALL {{
            return vec2<f32>(0.0, 0.0);
        }}
        return vec2<f32>(v, 1.0);
    }}
    if v >= extent {{
        if high == EDGE_WRAP {{
            return vec2<f32>(v - extent, 0.0);
        }}
        if high == EDGE_WALL {{
            return vec2<f32>(extent - 1.0, 0.0);
        }}
        return vec2<f32>(v, 1.0);
    }}
    return vec2<f32>(v, 0.0);
}}

fn particle_seed(index: u32, p: Particle) -> u32 {{
    let position = hash(bitcast<u32>(p.position.x) ^ hash(bitcast<u32>(p.position.y)));
    return hash(params.frame_seed ^ hash(index ^ hash(bitcast<u32>(p.aux.x) ^ position)));
}}

fn respawn_position(seed: u32) -> vec2<f32> {{
    for (var attempt = 0u; attempt < RESPAWN_ATTEMPTS; attempt = attempt + 1u) {{
        let h = hash(seed ^ (attempt * CANDIDATE_STRIDE));
        let g = vec2<f32>(rand01(h) * params.grid.x, rand01(h + 1u) * params.grid.y);
        if !is_obstacle(g) {{
            return to_canvas(g);
        }}
    }}
    return vec2<f32>(DEAD_POSITION, DEAD_POSITION);
}}

@compute @workgroup_size({WORKGROUP_SIZE})
fn main(@builtin(global_invocation_id) global_id: vec3<u32>) {{
    let index = global_id.x;
    if index >= params.count {{
        return;
    }}

    var p = particles_in[index];
    let seed = particle_seed(index, p);
    var respawn = p.position.x < DEAD_POSITION * 0.5;

    if !respawn {{
        let g0 = to_grid(p.position);
        if !in_grid(g0) || is_obstacle(g0) {{
            respawn = true;
        }} else {{
            let v1 = velocity_at(g0);
            let mid = g0 + v1 * params.dt * 0.5;
            let v2 = velocity_at(mid);
            let moved = g0 + v2 * params.dt;
            let rx = resolve_edge(moved.x, params.grid.x, params.edges.x, params.edges.y);
            let ry = resolve_edge(moved.y, params.grid.y, params.edges.z, params.edges.w);
            let g1 = vec2<f32>(rx.x, ry.x);
            if rx.y > 0.5 || ry.y > 0.5 || !in_grid(g1) || is_obstacle(g1) {{
                respawn = true;
            }} else {{
                p.position = to_canvas(g1);
            }}
        }}
        if rand01(seed ^ LOTTERY_SALT) > 1.0 - params.respawn_rate {{
            respawn = true;
        }}
    }}

    if respawn {{
        p.position = respawn_position(seed);
    }}
    particles_out[index] = p;
}}
"#
    )
}

/// Instanced particle sprites. One instance per particle, six vertices each.
pub fn sprite_shader() -> String {
    let dead = format!("{DEAD_POSITION:.1}");
    format!(
        r#"
struct SpriteUniforms {{
    canvas: vec2<f32>,
    size: f32,
    _pad: f32,
    color: vec4<f32>,
}};

struct SpriteOutput {{
    @builtin(position) clip_position: vec4<f32>,
    @location(0) local: vec2<f32>,
}};

@group(0) @binding(0)
var<uniform> sprite: SpriteUniforms;

const DEAD_POSITION: f32 = {dead};

@vertex
fn vs_main(
    @builtin(vertex_index) vertex_index: u32,
    @location(0) position: vec2<f32>,
) -> SpriteOutput {{
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];

    var out: SpriteOutput;
    out.local = corner;
    if position.x < DEAD_POSITION * 0.5 {{
        // Outside the clip volume.
        out.clip_position = vec4<f32>(2.0, 2.0, 2.0, 1.0);
        return out;
    }}
    let ndc = vec2<f32>(
        position.x / sprite.canvas.x * 2.0 - 1.0,
        1.0 - position.y / sprite.canvas.y * 2.0,
    );
    let offset = corner * (sprite.size / sprite.canvas);
    out.clip_position = vec4<f32>(ndc + offset, 0.0, 1.0);
    return out;
}}

@fragment
fn fs_main(in: SpriteOutput) -> @location(0) vec4<f32> {{
    let dist = length(in.local);
    if dist > 1.0 {{
        discard;
    }}
    let alpha = (1.0 - smoothstep(0.5, 1.0, dist)) * sprite.color.a;
    return vec4<f32>(sprite.color.rgb, alpha);
}}
"#
    )
}

/// Post-processing filter over the offscreen scene.
pub fn post_process_shader() -> String {
    format!(
        r#"
struct PostUniforms {{
    texel: vec2<f32>,
    filter_kind: u32,
    radius: f32,
    intensity: f32,
    _pad0: f32,
    _pad1: f32,
    _pad2: f32,
}};

@group(0) @binding(0)
var scene: texture_2d<f32>;
@group(0) @binding(1)
var scene_sampler: sampler;
@group(0) @binding(2)
var<uniform> post: PostUniforms;
{FULLSCREEN_WGSL}
fn tap(uv: vec2<f32>, offset: vec2<f32>) -> vec3<f32> {{
    return textureSampleLevel(scene, scene_sampler, uv + offset * post.texel, 0.0).rgb;
}}

// 5x5 binomial kernel, taps spread by the radius.
fn blur(uv: vec2<f32>) -> vec3<f32> {{
    var weights = array<f32, 5>(1.0, 4.0, 6.0, 4.0, 1.0);
    var sum = vec3<f32>(0.0);
    for (var j = 0; j < 5; j = j + 1) {{
        for (var i = 0; i < 5; i = i + 1) {{
            let offset = vec2<f32>(f32(i - 2), f32(j - 2)) * post.radius;
            sum = sum + tap(uv, offset) * (weights[i] * weights[j]);
        }}
    }}
    return sum / 256.0;
}}

fn laplacian(uv: vec2<f32>, center: vec3<f32>) -> vec3<f32> {{
    return center * 4.0
        - tap(uv, vec2<f32>(1.0, 0.0))
        - tap(uv, vec2<f32>(-1.0, 0.0))
        - tap(uv, vec2<f32>(0.0, 1.0))
        - tap(uv, vec2<f32>(0.0, -1.0));
}}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {{
    let center = tap(in.uv, vec2<f32>(0.0, 0.0));
    var color = center;
    switch post.filter_kind {{
        case 1u: {{
            color = blur(in.uv);
        }}
        case 2u: {{
            let edge = length(laplacian(in.uv, center));
            color = mix(center, vec3<f32>(edge), post.intensity);
        }}
        case 3u: {{
            let sharpened = center + laplacian(in.uv, center);
            color = mix(center, sharpened, post.intensity);
        }}
        default: {{}}
    }}
    return vec4<f32>(clamp(color, vec3<f32>(0.0), vec3<f32>(1.0)), 1.0);
}}
"#
    )
}

/// Brush cursor overlay: a quad textured with the rasterized brush mask.
pub fn cursor_shader() -> String {
    r#"
struct CursorUniforms {
    center: vec2<f32>,
    half_extent: vec2<f32>,
    canvas: vec2<f32>,
    _pad: vec2<f32>,
    color: vec4<f32>,
};

struct CursorOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@group(0) @binding(0)
var<uniform> cursor: CursorUniforms;
@group(0) @binding(1)
var mask: texture_2d<f32>;
@group(0) @binding(2)
var mask_sampler: sampler;

@vertex
fn vs_main(@builtin(vertex_index) vertex_index: u32) -> CursorOutput {
    var corners = array<vec2<f32>, 6>(
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, -1.0),
        vec2<f32>(1.0, 1.0),
        vec2<f32>(-1.0, 1.0),
    );
    let corner = corners[vertex_index];
    // Mask rows run up in grid space, pixels run down.
    let pixel = cursor.center + vec2<f32>(corner.x * cursor.half_extent.x, -corner.y * cursor.half_extent.y);

    var out: CursorOutput;
    out.clip_position = vec4<f32>(
        pixel.x / cursor.canvas.x * 2.0 - 1.0,
        1.0 - pixel.y / cursor.canvas.y * 2.0,
        0.0,
        1.0,
    );
    out.uv = corner * 0.5 + 0.5;
    return out;
}

@fragment
fn fs_main(in: CursorOutput) -> @location(0) vec4<f32> {
    let alpha = textureSampleLevel(mask, mask_sampler, in.uv, 0.0).r * cursor.color.a;
    return vec4<f32>(cursor.color.rgb, alpha);
}
"#
    .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_each_mode_reads_its_own_value() {
        assert!(visualize_shader(VisualMode::Velocity).contains("sqrt(ux * ux + uy * uy)"));
        assert!(visualize_shader(VisualMode::Pressure).contains("- 1.0;"));
        assert!(visualize_shader(VisualMode::Temperature).contains("u.bipolar != 0u"));
        assert!(!visualize_shader(VisualMode::Dye).contains("u.bipolar != 0u"));
    }

    #[test]
    fn test_advect_embeds_host_constants() {
        let code = advect_shader();
        assert!(code.contains("const DEAD_POSITION: f32 = -100000.0;"));
        assert!(code.contains(&format!("const RESPAWN_ATTEMPTS: u32 = {}u;", RESPAWN_ATTEMPTS)));
        assert!(code.contains(&format!("@workgroup_size({})", WORKGROUP_SIZE)));
    }

    #[test]
    fn test_advect_respawns_outside_domain() {
        let code = advect_shader();
        assert!(code.contains("if !in_grid(g0) || is_obstacle(g0)"));
        assert!(code.contains("!in_grid(g1) || is_obstacle(g1)"));
    }

    #[test]
    fn test_mode_kind_matches_class() {
        let code = mode_functions(VisualMode::Vorticity);
        assert!(code.contains(&format!("return {}u;", ModeClass::Bipolar.as_gpu())));
        let code = mode_functions(VisualMode::Dye);
        assert!(code.contains(&format!("return {}u;", ModeClass::Magnitude.as_gpu())));
    }
}
