//! CPU-side evaluation of the shading model.
//!
//! Mirrors the WGSL shading functions so the lookup-table bake and the
//! rendering tests have a reference that runs without a GPU.

use std::f32::consts::{PI, TAU};

use glam::{Vec2, Vec3};

/// Floor for BRDF denominators.
pub const EPSILON: f32 = 1e-6;

const BRDF_SAMPLE_COUNT: u32 = 512;

/// Fresnel-Schlick reflectance for the half vector between `w_i` and `w_o`.
pub fn fresnel_schlick(f0: Vec3, w_i: Vec3, w_o: Vec3) -> Vec3 {
    let h = (w_i + w_o).normalize_or_zero();
    let v_dot_h = w_o.dot(h).max(0.0);
    f0 + (Vec3::ONE - f0) * (1.0 - v_dot_h).powi(5)
}

/// GGX normal distribution term.
pub fn distribution_ggx(n: Vec3, h: Vec3, roughness: f32) -> f32 {
    let alpha2 = roughness * roughness;
    let n_dot_h = n.dot(h).max(0.0);
    let denom = PI * (n_dot_h * n_dot_h * (alpha2 - 1.0) + 1.0).powi(2);
    alpha2 / (denom + EPSILON)
}

/// Schlick-GGX masking for one direction.
pub fn geometry_schlick_ggx(n_dot: f32, k: f32) -> f32 {
    n_dot / (n_dot * (1.0 - k) + k + EPSILON)
}

/// Smith shadowing-masking with the direct-lighting remap of `k`.
pub fn geometry_smith(n: Vec3, w_i: Vec3, w_o: Vec3, roughness: f32) -> f32 {
    let k = (roughness + 1.0).powi(2) / 8.0;
    geometry_schlick_ggx(n.dot(w_o).max(0.0), k) * geometry_schlick_ggx(n.dot(w_i).max(0.0), k)
}

/// Cook-Torrance specular term without the Fresnel factor.
pub fn specular_cook_torrance(n: Vec3, w_i: Vec3, w_o: Vec3, roughness: f32) -> f32 {
    let h = (w_i + w_o).normalize_or_zero();
    let num = geometry_smith(n, w_i, w_o, roughness) * distribution_ggx(n, h, roughness);
    let denom = 4.0 * n.dot(w_o).max(0.0) * n.dot(w_i).max(0.0) + EPSILON;
    num / denom
}

/// Lambertian diffuse term.
pub fn lambert_diffuse(albedo: Vec3) -> Vec3 {
    albedo / PI
}

/// Irradiance arriving from a point light at distance `d`.
pub fn point_light_irradiance(color: Vec3, intensity: f32, d: f32) -> Vec3 {
    color * intensity / (4.0 * PI * d * d + EPSILON)
}

pub fn srgb_to_linear(c: Vec3) -> Vec3 {
    c.to_array()
        .map(|v| {
            if v <= 0.04045 {
                v / 12.92
            } else {
                ((v + 0.055) / 1.055).powf(2.4)
            }
        })
        .into()
}

pub fn linear_to_srgb(c: Vec3) -> Vec3 {
    c.to_array()
        .map(|v| {
            if v <= 0.0031308 {
                v * 12.92
            } else {
                1.055 * v.powf(1.0 / 2.4) - 0.055
            }
        })
        .into()
}

/// Reinhard tone mapping.
pub fn tone_map(c: Vec3) -> Vec3 {
    c / (c + Vec3::ONE)
}

/// Material inputs of one shaded point.
#[derive(Debug, Clone, Copy)]
pub struct Material {
    /// Linear albedo.
    pub albedo: Vec3,
    pub roughness: f32,
    pub metalness: f32,
}

/// Outgoing radiance at a surface point lit by one point light.
///
/// `diffuse` and `specular` mirror the direct-lighting toggles; with both
/// false the contribution is exactly zero.
pub fn shade_point_light(
    material: Material,
    point: Vec3,
    normal: Vec3,
    view: Vec3,
    light_position: Vec3,
    light_color: Vec3,
    light_intensity: f32,
    diffuse: bool,
    specular: bool,
) -> Vec3 {
    if !diffuse && !specular {
        return Vec3::ZERO;
    }
    let to_light = light_position - point;
    let d = to_light.length();
    let w_i = to_light / d.max(EPSILON);
    let w_o = view;

    let f0 = Vec3::splat(material.metalness);
    let ks = fresnel_schlick(f0, w_i, w_o);
    let kd = (Vec3::ONE - ks) * (1.0 - material.metalness);

    let mut brdf = Vec3::ZERO;
    if diffuse {
        brdf += kd * lambert_diffuse(material.albedo);
    }
    if specular {
        brdf += ks * specular_cook_torrance(normal, w_i, w_o, material.roughness);
    }

    let irradiance = point_light_irradiance(light_color, light_intensity, d);
    brdf * irradiance * normal.dot(w_i).max(0.0)
}

/// Split-sum scale/bias pair for the integrated-BRDF lookup.
pub fn integrate_brdf(n_dot_v: f32, roughness: f32) -> (f32, f32) {
    let n = Vec3::Z;
    let n_dot_v = n_dot_v.clamp(1e-4, 1.0);
    let v = Vec3::new((1.0 - n_dot_v * n_dot_v).sqrt(), 0.0, n_dot_v);
    let mut a = 0.0f32;
    let mut b = 0.0f32;
    for i in 0..BRDF_SAMPLE_COUNT {
        let xi = hammersley(i, BRDF_SAMPLE_COUNT);
        let h = importance_sample_ggx(n, xi, roughness);
        let l = reflect(-v, h);
        let n_dot_l = l.z.max(0.0);
        if n_dot_l > 0.0 {
            let n_dot_h = h.z.max(0.0);
            let v_dot_h = v.dot(h).max(0.0);
            let g = geometry_smith(n, l, v, roughness);
            let g_vis = (g * v_dot_h) / (n_dot_h * n_dot_v).max(1e-4);
            let fc = (1.0 - v_dot_h).powi(5);
            a += (1.0 - fc) * g_vis;
            b += fc * g_vis;
        }
    }
    let scale = 1.0 / BRDF_SAMPLE_COUNT as f32;
    (a * scale, b * scale)
}

fn hammersley(i: u32, n: u32) -> Vec2 {
    Vec2::new(i as f32 / n as f32, radical_inverse_vdc(i))
}

fn radical_inverse_vdc(bits: u32) -> f32 {
    let mut b = bits;
    b = (b << 16) | (b >> 16);
    b = ((b & 0x5555_5555) << 1) | ((b & 0xAAAA_AAAA) >> 1);
    b = ((b & 0x3333_3333) << 2) | ((b & 0xCCCC_CCCC) >> 2);
    b = ((b & 0x0F0F_0F0F) << 4) | ((b & 0xF0F0_F0F0) >> 4);
    b = ((b & 0x00FF_00FF) << 8) | ((b & 0xFF00_FF00) >> 8);
    b as f32 * 2.328_306_4e-10
}

fn importance_sample_ggx(normal: Vec3, xi: Vec2, roughness: f32) -> Vec3 {
    let a = (roughness * roughness).max(0.001);
    let phi = TAU * xi.x;
    let cos_theta = ((1.0 - xi.y) / (1.0 + (a * a - 1.0) * xi.y)).sqrt();
    let sin_theta = (1.0 - cos_theta * cos_theta).max(0.0).sqrt();
    let h = Vec3::new(phi.cos() * sin_theta, phi.sin() * sin_theta, cos_theta);
    tangent_to_world(normal, h)
}

fn tangent_to_world(normal: Vec3, v: Vec3) -> Vec3 {
    let up = if normal.z.abs() < 0.999 { Vec3::Z } else { Vec3::X };
    let tangent = normal.cross(up).normalize();
    let bitangent = normal.cross(tangent);
    tangent * v.x + bitangent * v.y + normal * v.z
}

fn reflect(v: Vec3, n: Vec3) -> Vec3 {
    v - 2.0 * v.dot(n) * n
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_directions() -> Vec<Vec3> {
        let mut dirs = Vec::new();
        for i in 0..8 {
            for j in 1..4 {
                let phi = i as f32 / 8.0 * TAU;
                let theta = j as f32 / 4.0 * PI / 2.0;
                dirs.push(Vec3::new(
                    theta.sin() * phi.cos(),
                    theta.sin() * phi.sin(),
                    theta.cos(),
                ));
            }
        }
        dirs
    }

    #[test]
    fn fresnel_stays_between_f0_and_one() {
        let f0 = Vec3::new(0.04, 0.2, 0.9);
        for w_i in sample_directions() {
            for w_o in sample_directions() {
                let f = fresnel_schlick(f0, w_i, w_o);
                for (value, low) in f.to_array().iter().zip(f0.to_array()) {
                    assert!(*value >= low - 1e-5 && *value <= 1.0 + 1e-5, "f = {f:?}");
                }
            }
        }
    }

    #[test]
    fn ndf_is_non_negative() {
        let n = Vec3::Z;
        for h in sample_directions() {
            for roughness in [0.0, 0.1, 0.5, 1.0] {
                assert!(distribution_ggx(n, h, roughness) >= 0.0);
            }
        }
    }

    #[test]
    fn geometry_term_is_bounded() {
        let n = Vec3::Z;
        for w_i in sample_directions() {
            for w_o in sample_directions() {
                for roughness in [0.05, 0.5, 1.0] {
                    let g = geometry_smith(n, w_i, w_o, roughness);
                    assert!((0.0..=1.0 + 1e-4).contains(&g), "g = {g}");
                }
            }
        }
    }

    #[test]
    fn all_toggles_off_is_black() {
        let material = Material {
            albedo: Vec3::ONE,
            roughness: 0.3,
            metalness: 0.5,
        };
        let radiance = shade_point_light(
            material,
            Vec3::ZERO,
            Vec3::Z,
            Vec3::Z,
            Vec3::new(0.0, 0.0, 4.0),
            Vec3::ONE,
            500.0,
            false,
            false,
        );
        assert_eq!(radiance, Vec3::ZERO);
    }

    #[test]
    fn point_light_follows_inverse_square_falloff() {
        let material = Material {
            albedo: Vec3::ONE,
            roughness: 1.0,
            metalness: 0.0,
        };
        let shade_at = |d: f32| {
            shade_point_light(
                material,
                Vec3::ZERO,
                Vec3::Z,
                Vec3::Z,
                Vec3::new(0.0, 0.0, d),
                Vec3::ONE,
                800.0,
                true,
                true,
            )
        };
        let near = shade_at(2.0);
        let far = shade_at(4.0);
        let ratio = near.x / far.x;
        assert!((ratio - 4.0).abs() < 0.05, "ratio = {ratio}");
    }

    #[test]
    fn integrated_brdf_is_bounded() {
        for roughness in [0.1, 0.4, 0.8] {
            for n_dot_v in [0.1, 0.5, 0.9] {
                let (a, b) = integrate_brdf(n_dot_v, roughness);
                assert!((0.0..=1.5).contains(&a), "scale = {a}");
                assert!((0.0..=1.0).contains(&b), "bias = {b}");
            }
        }
    }

    #[test]
    fn srgb_round_trips() {
        let c = Vec3::new(0.02, 0.5, 0.97);
        let back = srgb_to_linear(linear_to_srgb(c));
        assert!((c - back).length() < 1e-4);
    }
}
