//! One-shot image-based-lighting precompute.
//!
//! Runs before the first frame: a full-screen convolution pass bakes the
//! diffuse irradiance map, six prefilter passes bake the roughness atlas,
//! and each result is read back to the host and re-uploaded as a sampleable
//! texture. The render-to-texture round trip is the only place the CPU
//! waits on the GPU.

use std::f32::consts::PI;

use glam::{Vec2, Vec3};
use log::info;

use crate::geometry::GeometryBuffer;
use crate::render::{GraphicsContext, RenderError, TextureHandle, UniformSet};
use crate::render::shaders::{diffuse_convolution_program, specular_prefilter_program};
use crate::texture::{PixelFormat, Texture};

/// Number of roughness buckets in the specular atlas.
pub const ATLAS_LEVEL_COUNT: u32 = 6;

/// Normalized sub-rectangle of one atlas level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AtlasRegion {
    pub origin: Vec2,
    pub extent: Vec2,
}

/// Level regions, indexed by `level - 1`.
///
/// Level 1 fills the bottom half; each further level occupies half the
/// remaining strip at half the previous width. The shader carries the same
/// table as a constant array.
pub const ATLAS_LEVELS: [AtlasRegion; ATLAS_LEVEL_COUNT as usize] = [
    AtlasRegion {
        origin: Vec2::new(0.0, 0.0),
        extent: Vec2::new(1.0, 0.5),
    },
    AtlasRegion {
        origin: Vec2::new(0.0, 0.5),
        extent: Vec2::new(0.5, 0.25),
    },
    AtlasRegion {
        origin: Vec2::new(0.0, 0.75),
        extent: Vec2::new(0.25, 0.125),
    },
    AtlasRegion {
        origin: Vec2::new(0.0, 0.875),
        extent: Vec2::new(0.125, 0.0625),
    },
    AtlasRegion {
        origin: Vec2::new(0.0, 0.9375),
        extent: Vec2::new(0.0625, 0.03125),
    },
    AtlasRegion {
        origin: Vec2::new(0.0, 0.96875),
        extent: Vec2::new(0.03125, 0.015625),
    },
];

/// Maps a continuous roughness onto an atlas level in `1..=6`.
pub fn roughness_level(roughness: f32) -> u32 {
    let r = roughness.clamp(0.0, 1.0);
    ((r * ATLAS_LEVEL_COUNT as f32).floor() as u32 + 1).min(ATLAS_LEVEL_COUNT)
}

/// Equirectangular mapping from a direction to texture coordinates.
pub fn direction_to_uv(d: Vec3) -> Vec2 {
    let phi = d.z.atan2(d.x);
    let theta = d.y.clamp(-1.0, 1.0).asin();
    Vec2::new((phi + PI) / (2.0 * PI), (theta + 0.5 * PI) / PI)
}

/// Inverse of [`direction_to_uv`]; the pair must stay a bijection or the
/// baked maps come out spatially shifted.
pub fn uv_to_direction(uv: Vec2) -> Vec3 {
    let phi = uv.x * 2.0 * PI - PI;
    let theta = uv.y * PI - 0.5 * PI;
    let ring = theta.cos();
    Vec3::new(ring * phi.cos(), theta.sin(), ring * phi.sin())
}

/// Host copies and device handles of the baked lighting maps.
pub struct BakedIbl {
    pub irradiance: Texture,
    pub specular_atlas: Texture,
    pub irradiance_handle: TextureHandle,
    pub specular_atlas_handle: TextureHandle,
}

/// Runs the precompute passes against an uploaded environment texture.
///
/// Transient resources (the screen plane, both bake programs, and the
/// offscreen targets) are destroyed before returning so nothing from this
/// pass leaks into the steady-state frame loop.
pub fn bake(
    context: &mut GraphicsContext,
    environment: TextureHandle,
    width: u32,
    height: u32,
) -> Result<BakedIbl, RenderError> {
    let plane = context.upload_geometry(&GeometryBuffer::screen_plane());
    let convolve = context.compile_program(&diffuse_convolution_program())?;
    let prefilter = context.compile_program(&specular_prefilter_program())?;

    info!("baking {}x{} irradiance map", width, height);
    let irradiance_target = context.create_render_target(width, height);
    let irradiance_pixels = context.with_render_target(irradiance_target, |ctx| {
        ctx.set_viewport(0, 0, width, height);
        ctx.clear()?;
        let mut uniforms = UniformSet::new();
        uniforms.set("uTextureEnv", environment);
        ctx.draw(plane, convolve, &uniforms)?;
        if !ctx.is_target_complete(irradiance_target) {
            return Err(RenderError::IncompleteTarget(
                "irradiance target incomplete after convolution".to_string(),
            ));
        }
        ctx.read_pixels(irradiance_target)
    })?;
    let irradiance = Texture::new(width, height, PixelFormat::Rgbm8, irradiance_pixels)
        .map_err(|err| RenderError::Readback(err.to_string()))?;

    info!("baking {}x{} specular atlas", width, height);
    let atlas_target = context.create_render_target(width, height);
    let atlas_pixels = context.with_render_target(atlas_target, |ctx| {
        ctx.set_viewport(0, 0, width, height);
        ctx.clear()?;
        for level in 1..=ATLAS_LEVEL_COUNT {
            let region = ATLAS_LEVELS[(level - 1) as usize];
            let x = (region.origin.x * width as f32) as u32;
            let y = (region.origin.y * height as f32) as u32;
            let w = ((region.extent.x * width as f32) as u32).max(1);
            let h = ((region.extent.y * height as f32) as u32).max(1);
            ctx.set_viewport(x, y, w, h);

            let mut uniforms = UniformSet::new();
            uniforms.set("uTextureEnv", environment);
            uniforms.set("uRoughness", level as f32 / ATLAS_LEVEL_COUNT as f32);
            ctx.draw(plane, prefilter, &uniforms)?;
        }
        if !ctx.is_target_complete(atlas_target) {
            return Err(RenderError::IncompleteTarget(
                "atlas target incomplete after prefilter".to_string(),
            ));
        }
        ctx.read_pixels(atlas_target)
    })?;
    let specular_atlas = Texture::new(width, height, PixelFormat::Rgbm8, atlas_pixels)
        .map_err(|err| RenderError::Readback(err.to_string()))?;

    // The baked bytes become new sampleable textures for the main pass.
    let irradiance_handle = context.upload_texture(&irradiance);
    let specular_atlas_handle = context.upload_texture(&specular_atlas);

    context.destroy_texture(irradiance_target);
    context.destroy_texture(atlas_target);
    context.destroy_program(convolve);
    context.destroy_program(prefilter);
    context.destroy_geometry(plane);

    Ok(BakedIbl {
        irradiance,
        specular_atlas,
        irradiance_handle,
        specular_atlas_handle,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_mapping_covers_the_range_monotonically() {
        assert_eq!(roughness_level(0.0), 1);
        assert_eq!(roughness_level(1.0), 6);
        let mut previous = 0;
        for i in 0..=100 {
            let level = roughness_level(i as f32 / 100.0);
            assert!(level >= previous);
            assert!((1..=6).contains(&level));
            previous = level;
        }
    }

    #[test]
    fn atlas_table_matches_the_recursive_halving() {
        // Derive the packing the way the sampler used to: start with the
        // bottom half at full width, then keep halving into the remainder.
        let mut height = 0.5f32;
        let mut begin_y = 0.0f32;
        let mut width = 1.0f32;
        let mut step = 0.5f32;
        for (index, region) in ATLAS_LEVELS.iter().enumerate() {
            if index > 0 {
                width = step;
                step /= 2.0;
                begin_y = height;
                height += step;
            }
            assert!((region.origin.x - 0.0).abs() < 1e-6);
            assert!(
                (region.origin.y - begin_y).abs() < 1e-6,
                "level {} origin",
                index + 1
            );
            assert!((region.extent.x - width).abs() < 1e-6, "level {} width", index + 1);
            assert!(
                (region.extent.y - (height - begin_y)).abs() < 1e-6,
                "level {} height",
                index + 1
            );
        }
    }

    #[test]
    fn atlas_regions_stay_inside_the_texture() {
        for region in ATLAS_LEVELS {
            assert!(region.origin.x >= 0.0 && region.origin.y >= 0.0);
            assert!(region.origin.x + region.extent.x <= 1.0 + 1e-6);
            assert!(region.origin.y + region.extent.y <= 1.0 + 1e-6);
        }
    }

    #[test]
    fn direction_uv_mapping_is_a_bijection() {
        for i in 0..12 {
            for j in 1..12 {
                let phi = i as f32 / 12.0 * 2.0 * PI - PI;
                let theta = j as f32 / 12.0 * PI - 0.5 * PI;
                let dir = Vec3::new(
                    theta.cos() * phi.cos(),
                    theta.sin(),
                    theta.cos() * phi.sin(),
                );
                let back = uv_to_direction(direction_to_uv(dir));
                assert!(
                    (dir - back).length() < 1e-4,
                    "dir {dir:?} round-tripped to {back:?}"
                );
            }
        }
    }

    #[test]
    fn uv_mapping_round_trips_from_uv_side() {
        for u in [0.1f32, 0.33, 0.5, 0.77, 0.9] {
            for v in [0.1f32, 0.4, 0.6, 0.95] {
                let uv = Vec2::new(u, v);
                let back = direction_to_uv(uv_to_direction(uv));
                assert!((uv - back).length() < 1e-4, "uv {uv:?} became {back:?}");
            }
        }
    }
}
