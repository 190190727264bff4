//! WGSL templates and the program factories that pair each template with
//! its declared uniform layout.
//!
//! The templates lean on the composer: `lib/env` carries the shared
//! environment-mapping helpers, `lib/globals` the uniform block declaration,
//! and the light counts arrive through integer defines so a variant's
//! unrolling matches its layout.

use super::shader::{ShaderComposer, ShaderProgram};
use super::uniforms::UniformLayoutBuilder;

/// Composer preloaded with the snippet library used by every template.
pub fn composer() -> ShaderComposer {
    let mut composer = ShaderComposer::new();
    composer.register_include("lib/env", ENV_LIB);
    composer.register_include("lib/globals", GLOBALS_LIB);
    composer
}

/// Main shading program for the sphere grid.
///
/// `point_lights` and `directional_lights` become compile-time defines; the
/// uniform layout is emitted for exactly those counts, so set entries beyond
/// them are never observable.
pub fn pbr_program(point_lights: u32, directional_lights: u32) -> ShaderProgram {
    let mut builder = UniformLayoutBuilder::new();
    builder
        .mat4("uModel.localToWorld")
        .mat4("uCamera.worldToClip")
        .vec3("uCameraPos")
        .float("uMaterial.roughness")
        .vec3("uMaterial.albedo")
        .float("uMaterial.metalness")
        .flag("uDirect.diffuse")
        .flag("uDirect.specular")
        .flag("uIndirect.diffuse")
        .flag("uIndirect.specular");
    for i in 0..point_lights {
        builder.element(|b| {
            b.vec3(format!("uPointLights[{i}].pos"))
                .float(format!("uPointLights[{i}].intensity"))
                .vec3(format!("uPointLights[{i}].color"));
        });
    }
    for i in 0..directional_lights {
        builder.element(|b| {
            b.vec3(format!("uDirectLights[{i}].dir"))
                .float(format!("uDirectLights[{i}].intensity"))
                .vec3(format!("uDirectLights[{i}].color"));
        });
    }
    builder
        .texture("uTextureDiffuse")
        .texture("uTextureSpecular")
        .texture("uTextureBRDF");

    let mut program = ShaderProgram::new("pbr", PBR_VERTEX, PBR_FRAGMENT, builder.build());
    program.set_define("POINT_LIGHT_COUNT", point_lights);
    program.set_define("DIRECTIONAL_LIGHT_COUNT", directional_lights);
    program
}

/// Diffuse irradiance convolution pass.
pub fn diffuse_convolution_program() -> ShaderProgram {
    let mut builder = UniformLayoutBuilder::new();
    builder.texture("uTextureEnv");
    ShaderProgram::new(
        "diffuse-convolve",
        BAKE_VERTEX,
        CONVOLVE_FRAGMENT,
        builder.build(),
    )
}

/// Specular prefilter pass; one draw per atlas level with `uRoughness` set
/// to the level's representative roughness.
pub fn specular_prefilter_program() -> ShaderProgram {
    let mut builder = UniformLayoutBuilder::new();
    builder.float("uRoughness").texture("uTextureEnv");
    ShaderProgram::new(
        "specular-prefilter",
        BAKE_VERTEX,
        PREFILTER_FRAGMENT,
        builder.build(),
    )
}

const ENV_LIB: &str = r#"
const PI: f32 = 3.14159265358979;
const EPSILON: f32 = 0.000001;

fn rgbm_decode(packed: vec4<f32>) -> vec3<f32> {
    return 6.0 * packed.rgb * packed.a;
}

fn rgbm_encode(color: vec3<f32>) -> vec4<f32> {
    let c = max(color / 6.0, vec3<f32>(0.0));
    var a = clamp(max(max(c.r, c.g), max(c.b, 0.000001)), 0.0, 1.0);
    a = ceil(a * 255.0) / 255.0;
    return vec4<f32>(c / a, a);
}

fn direction_to_uv(d: vec3<f32>) -> vec2<f32> {
    let phi = atan2(d.z, d.x);
    let theta = asin(clamp(d.y, -1.0, 1.0));
    return vec2<f32>((phi + PI) / (2.0 * PI), (theta + 0.5 * PI) / PI);
}

fn uv_to_direction(uv: vec2<f32>) -> vec3<f32> {
    let phi = uv.x * 2.0 * PI - PI;
    let theta = uv.y * PI - 0.5 * PI;
    let ring = cos(theta);
    return vec3<f32>(ring * cos(phi), sin(theta), ring * sin(phi));
}

fn hemisphere_basis(n: vec3<f32>) -> mat3x3<f32> {
    let up = select(vec3<f32>(0.0, 1.0, 0.0), vec3<f32>(1.0, 0.0, 0.0), abs(n.y) > 0.99);
    let tangent = normalize(cross(up, n));
    let bitangent = cross(n, tangent);
    return mat3x3<f32>(tangent, bitangent, n);
}
"#;

const GLOBALS_LIB: &str = r#"
struct PointLight {
    pos: vec3<f32>,
    intensity: f32,
    color: vec3<f32>,
}

struct DirectionalLight {
    dir: vec3<f32>,
    intensity: f32,
    color: vec3<f32>,
}

struct Globals {
    local_to_world: mat4x4<f32>,
    world_to_clip: mat4x4<f32>,
    camera_pos: vec3<f32>,
    roughness: f32,
    albedo: vec3<f32>,
    metalness: f32,
    direct_diffuse: u32,
    direct_specular: u32,
    indirect_diffuse: u32,
    indirect_specular: u32,
    point_lights: array<PointLight, POINT_LIGHT_COUNT>,
    directional_lights: array<DirectionalLight, DIRECTIONAL_LIGHT_COUNT>,
}

@group(0) @binding(0) var<uniform> globals: Globals;
"#;

const PBR_VERTEX: &str = r#"
#include "lib/globals"

struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal_ws: vec3<f32>,
    @location(2) view_dir_ws: vec3<f32>,
#ifdef USE_UV
    @location(3) uv: vec2<f32>,
#endif
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    let world_pos = globals.local_to_world * vec4<f32>(input.position, 1.0);
    output.clip_position = globals.world_to_clip * world_pos;
    output.world_pos = world_pos.xyz;
    output.normal_ws = normalize((globals.local_to_world * vec4<f32>(input.normal, 0.0)).xyz);
    output.view_dir_ws = normalize(globals.camera_pos - world_pos.xyz);
#ifdef USE_UV
    output.uv = input.uv;
#endif
    return output;
}
"#;

const PBR_FRAGMENT: &str = r#"
#include "lib/env"
#include "lib/globals"

@group(0) @binding(1) var env_sampler: sampler;
@group(0) @binding(2) var irradiance_map: texture_2d<f32>;
@group(0) @binding(3) var specular_atlas: texture_2d<f32>;
@group(0) @binding(4) var brdf_lut: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) world_pos: vec3<f32>,
    @location(1) normal_ws: vec3<f32>,
    @location(2) view_dir_ws: vec3<f32>,
#ifdef USE_UV
    @location(3) uv: vec2<f32>,
#endif
}

fn srgb_to_linear(c: vec3<f32>) -> vec3<f32> {
    let low = c / 12.92;
    let high = pow((c + vec3<f32>(0.055)) / 1.055, vec3<f32>(2.4));
    return select(high, low, c <= vec3<f32>(0.04045));
}

fn fresnel_schlick(f0: vec3<f32>, w_i: vec3<f32>, w_o: vec3<f32>) -> vec3<f32> {
    let h = normalize(w_i + w_o);
    let v_dot_h = max(dot(w_o, h), 0.0);
    return f0 + (vec3<f32>(1.0) - f0) * pow(1.0 - v_dot_h, 5.0);
}

fn distribution_ggx(n: vec3<f32>, h: vec3<f32>, roughness: f32) -> f32 {
    let alpha2 = roughness * roughness;
    let n_dot_h = max(dot(n, h), 0.0);
    let denom = PI * pow(n_dot_h * n_dot_h * (alpha2 - 1.0) + 1.0, 2.0);
    return alpha2 / (denom + EPSILON);
}

fn geometry_schlick_ggx(n_dot: f32, k: f32) -> f32 {
    return n_dot / (n_dot * (1.0 - k) + k + EPSILON);
}

fn geometry_smith(n: vec3<f32>, w_i: vec3<f32>, w_o: vec3<f32>, roughness: f32) -> f32 {
    let k = pow(roughness + 1.0, 2.0) / 8.0;
    let g_view = geometry_schlick_ggx(max(dot(n, w_o), 0.0), k);
    let g_light = geometry_schlick_ggx(max(dot(n, w_i), 0.0), k);
    return g_view * g_light;
}

fn specular_cook_torrance(n: vec3<f32>, w_i: vec3<f32>, w_o: vec3<f32>, roughness: f32) -> f32 {
    let h = normalize(w_i + w_o);
    let num = geometry_smith(n, w_i, w_o, roughness) * distribution_ggx(n, h, roughness);
    let denom = 4.0 * max(dot(n, w_o), 0.0) * max(dot(n, w_i), 0.0) + EPSILON;
    return num / denom;
}

fn sample_equirect(map: texture_2d<f32>, dir: vec3<f32>) -> vec3<f32> {
    let uv = direction_to_uv(normalize(dir));
    return rgbm_decode(textureSampleLevel(map, env_sampler, uv, 0.0));
}

fn roughness_level(roughness: f32) -> u32 {
    let r = clamp(roughness, 0.0, 1.0);
    return min(6u, u32(floor(r * 6.0)) + 1u);
}

fn atlas_region(level: u32) -> vec4<f32> {
    var regions = array<vec4<f32>, 6>(
        vec4<f32>(0.0, 0.0, 1.0, 0.5),
        vec4<f32>(0.0, 0.5, 0.5, 0.25),
        vec4<f32>(0.0, 0.75, 0.25, 0.125),
        vec4<f32>(0.0, 0.875, 0.125, 0.0625),
        vec4<f32>(0.0, 0.9375, 0.0625, 0.03125),
        vec4<f32>(0.0, 0.96875, 0.03125, 0.015625),
    );
    return regions[clamp(level, 1u, 6u) - 1u];
}

fn sample_atlas_level(uv: vec2<f32>, level: u32) -> vec3<f32> {
    let region = atlas_region(level);
    let mapped = region.xy + uv * region.zw;
    return rgbm_decode(textureSampleLevel(specular_atlas, env_sampler, mapped, 0.0));
}

fn prefiltered_specular(roughness: f32, reflected: vec3<f32>) -> vec3<f32> {
    let uv = direction_to_uv(normalize(reflected));
    let r = clamp(roughness, 0.0, 1.0);
    let level = roughness_level(r);
    let base = sample_atlas_level(uv, level);
    let next = sample_atlas_level(uv, min(level + 1u, 6u));
    return mix(base, next, fract(r * 6.0));
}

fn shade_point_light(index: u32, albedo: vec3<f32>, p: vec3<f32>, n: vec3<f32>, w_o: vec3<f32>) -> vec3<f32> {
    if (globals.direct_diffuse == 0u && globals.direct_specular == 0u) {
        return vec3<f32>(0.0);
    }
    let light = globals.point_lights[index];
    let to_light = light.pos - p;
    let d = length(to_light);
    let w_i = to_light / max(d, EPSILON);

    let f0 = vec3<f32>(globals.metalness);
    let ks = fresnel_schlick(f0, w_i, w_o);
    let kd = (vec3<f32>(1.0) - ks) * (1.0 - globals.metalness);

    var brdf = vec3<f32>(0.0);
    if (globals.direct_diffuse != 0u) {
        brdf += kd * albedo / PI;
    }
    if (globals.direct_specular != 0u) {
        brdf += ks * specular_cook_torrance(n, w_i, w_o, globals.roughness);
    }

    let irradiance = light.color * light.intensity / (4.0 * PI * d * d + EPSILON);
    return brdf * irradiance * max(dot(n, w_i), 0.0);
}

fn shade_directional_light(index: u32, albedo: vec3<f32>, n: vec3<f32>, w_o: vec3<f32>) -> vec3<f32> {
    if (globals.direct_diffuse == 0u && globals.direct_specular == 0u) {
        return vec3<f32>(0.0);
    }
    let light = globals.directional_lights[index];
    let w_i = normalize(light.dir);

    let f0 = vec3<f32>(globals.metalness);
    let ks = fresnel_schlick(f0, w_i, w_o);
    let kd = (vec3<f32>(1.0) - ks) * (1.0 - globals.metalness);

    var brdf = vec3<f32>(0.0);
    if (globals.direct_diffuse != 0u) {
        brdf += kd * albedo / PI;
    }
    if (globals.direct_specular != 0u) {
        brdf += ks * specular_cook_torrance(n, w_i, w_o, globals.roughness);
    }

    let irradiance = light.color * light.intensity;
    return brdf * irradiance * max(dot(n, w_i), 0.0);
}

fn indirect_lighting(albedo: vec3<f32>, n: vec3<f32>, w_o: vec3<f32>) -> vec3<f32> {
    if (globals.indirect_diffuse == 0u && globals.indirect_specular == 0u) {
        return vec3<f32>(0.0);
    }
    let f0 = vec3<f32>(globals.metalness);
    let ks = fresnel_schlick(f0, n, w_o);
    let kd = (vec3<f32>(1.0) - ks) * (1.0 - globals.metalness);

    var radiance = vec3<f32>(0.0);
    if (globals.indirect_diffuse != 0u) {
        radiance += albedo * kd * sample_equirect(irradiance_map, n);
    }
    if (globals.indirect_specular != 0u) {
        let reflected = reflect(-w_o, n);
        let prefiltered = prefiltered_specular(globals.roughness, reflected);
        let n_dot_v = max(dot(w_o, n), 0.0);
        let lut_uv = vec2<f32>(n_dot_v, globals.roughness);
        let scale_bias = textureSampleLevel(brdf_lut, env_sampler, lut_uv, 0.0).rg;
        radiance += prefiltered * (ks * scale_bias.x + vec3<f32>(scale_bias.y));
    }
    return radiance;
}

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let albedo = srgb_to_linear(globals.albedo);
    let n = normalize(input.normal_ws);
    let w_o = normalize(input.view_dir_ws);

    var radiance = vec3<f32>(0.0);
    for (var i = 0u; i < u32(POINT_LIGHT_COUNT); i = i + 1u) {
        radiance += shade_point_light(i, albedo, input.world_pos, n, w_o);
    }
    for (var i = 0u; i < u32(DIRECTIONAL_LIGHT_COUNT); i = i + 1u) {
        radiance += shade_directional_light(i, albedo, n, w_o);
    }
    radiance += indirect_lighting(albedo, n, w_o);

    let mapped = radiance / (radiance + vec3<f32>(1.0));
    return vec4<f32>(mapped, 1.0);
}
"#;

const BAKE_VERTEX: &str = r#"
struct VertexInput {
    @location(0) position: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) uv: vec2<f32>,
}

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(input: VertexInput) -> VertexOutput {
    var output: VertexOutput;
    output.clip_position = vec4<f32>(input.position, 1.0);
    output.uv = vec2<f32>(0.5 * (input.position.x + 1.0), 0.5 * (1.0 - input.position.y));
    return output;
}
"#;

const CONVOLVE_FRAGMENT: &str = r#"
#include "lib/env"

@group(0) @binding(1) var env_sampler: sampler;
@group(0) @binding(2) var environment: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

const SAMPLE_STEP: f32 = 0.05;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let n = uv_to_direction(input.uv);
    let basis = hemisphere_basis(n);

    var acc = vec3<f32>(0.0);
    var weight_sum = 0.0;
    for (var phi = 0.0; phi < 2.0 * PI; phi += SAMPLE_STEP) {
        for (var theta = 0.0; theta < 0.5 * PI; theta += SAMPLE_STEP) {
            let local = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let dir = basis * local;
            let weight = cos(theta) * sin(theta);
            let sampled = rgbm_decode(textureSampleLevel(environment, env_sampler, direction_to_uv(dir), 0.0));
            acc += sampled * weight;
            weight_sum += weight;
        }
    }
    return rgbm_encode(acc / max(weight_sum, EPSILON));
}
"#;

const PREFILTER_FRAGMENT: &str = r#"
#include "lib/env"

struct PrefilterParams {
    roughness: f32,
}

@group(0) @binding(0) var<uniform> params: PrefilterParams;
@group(0) @binding(1) var env_sampler: sampler;
@group(0) @binding(2) var environment: texture_2d<f32>;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

const SAMPLE_STEP: f32 = 0.05;

@fragment
fn fs_main(input: VertexOutput) -> @location(0) vec4<f32> {
    let reflected = uv_to_direction(input.uv);
    let basis = hemisphere_basis(reflected);
    let alpha = max(params.roughness * params.roughness, 0.001);
    let exponent = 2.0 / (alpha * alpha) - 2.0;

    var acc = vec3<f32>(0.0);
    var weight_sum = 0.0;
    for (var phi = 0.0; phi < 2.0 * PI; phi += SAMPLE_STEP) {
        for (var theta = 0.0; theta < 0.5 * PI; theta += SAMPLE_STEP) {
            let local = vec3<f32>(sin(theta) * cos(phi), sin(theta) * sin(phi), cos(theta));
            let dir = basis * local;
            let weight = pow(max(cos(theta), 0.0), exponent) * sin(theta);
            let sampled = rgbm_decode(textureSampleLevel(environment, env_sampler, direction_to_uv(dir), 0.0));
            acc += sampled * weight;
            weight_sum += weight;
        }
    }
    return rgbm_encode(acc / max(weight_sum, EPSILON));
}
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::shader::validate_wgsl;

    fn validate(program: &ShaderProgram) {
        let composer = composer();
        let vs = composer
            .compose(program.label(), program.vertex_source(), program.defines())
            .unwrap();
        validate_wgsl(program.label(), &vs).unwrap();
        let fs = composer
            .compose(program.label(), program.fragment_source(), program.defines())
            .unwrap();
        validate_wgsl(program.label(), &fs).unwrap();
    }

    #[test]
    fn pbr_variants_compose_and_validate() {
        validate(&pbr_program(4, 2));
        validate(&pbr_program(1, 1));
        let mut with_uv = pbr_program(4, 2);
        with_uv.set_define("USE_UV", true);
        validate(&with_uv);
    }

    #[test]
    fn bake_programs_compose_and_validate() {
        validate(&diffuse_convolution_program());
        validate(&specular_prefilter_program());
    }

    #[test]
    fn pbr_layout_matches_light_counts() {
        let program = pbr_program(4, 2);
        // Block: 176 bytes of header, then 4 + 2 light elements of 32 bytes.
        assert_eq!(program.layout().block_size(), 176 + 6 * 32);
        assert_eq!(program.layout().texture_count(), 3);
    }
}
