use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use glam::Vec3;
use log::info;

use crate::app::RenderSettings;
use crate::pbr;
use crate::texture::{PixelFormat, Texture};

/// Side length of the procedural integrated-BRDF lookup.
pub const BUILTIN_BRDF_LUT_SIZE: u32 = 64;

/// Decodes an RGBM-encoded equirectangular environment image.
pub fn load_environment(path: &Path) -> Result<Texture> {
    let image = image::open(path)
        .with_context(|| format!("failed to load environment image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    info!("loaded environment {}x{} from {}", width, height, path.display());
    Texture::new(width, height, PixelFormat::Rgbm8, image.into_raw())
}

/// Decodes a pre-integrated BRDF lookup image (sRGB encoded, as produced by
/// the usual bake tools).
pub fn load_brdf_lut(path: &Path) -> Result<Texture> {
    let image = image::open(path)
        .with_context(|| format!("failed to load BRDF lookup image {}", path.display()))?
        .to_rgba8();
    let (width, height) = image.dimensions();
    info!("loaded BRDF lookup {}x{} from {}", width, height, path.display());
    Texture::new(width, height, PixelFormat::Rgba8Srgb, image.into_raw())
}

/// Integrates the split-sum BRDF lookup on the CPU.
///
/// Row `v` carries roughness, column `u` carries `N.V`; the scale/bias pair
/// lands in the red/green channels, sRGB encoded to match the asset path.
pub fn builtin_brdf_lut(size: u32) -> Texture {
    let size = size.max(1);
    let mut pixels = Vec::with_capacity(size as usize * size as usize * 4);
    for y in 0..size {
        let roughness = (y as f32 + 0.5) / size as f32;
        for x in 0..size {
            let n_dot_v = (x as f32 + 0.5) / size as f32;
            let (scale, bias) = pbr::integrate_brdf(n_dot_v, roughness);
            let encoded = pbr::linear_to_srgb(Vec3::new(
                scale.clamp(0.0, 1.0),
                bias.clamp(0.0, 1.0),
                0.0,
            ));
            pixels.push((encoded.x * 255.0).round() as u8);
            pixels.push((encoded.y * 255.0).round() as u8);
            pixels.push(0);
            pixels.push(255);
        }
    }
    // Length matches by construction.
    Texture::new(size, size, PixelFormat::Rgba8Srgb, pixels)
        .expect("builtin lut dimensions are consistent")
}

/// Reads render settings from a JSON file.
pub fn load_settings(path: &Path) -> Result<RenderSettings> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read settings {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("failed to parse settings {}", path.display()))
}

/// Writes RGBA bytes out as a PNG, used by the bake command.
pub fn write_png(path: &Path, width: u32, height: u32, pixels: &[u8]) -> Result<()> {
    image::save_buffer(path, pixels, width, height, image::ColorType::Rgba8)
        .with_context(|| format!("failed to write {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbr;

    #[test]
    fn builtin_lut_matches_the_integrator() {
        let lut = builtin_brdf_lut(8);
        assert_eq!(lut.width(), 8);
        // Spot-check one texel against a direct integration.
        let x = 5u32;
        let y = 2u32;
        let idx = ((y * 8 + x) * 4) as usize;
        let stored = Vec3::new(
            lut.pixels()[idx] as f32 / 255.0,
            lut.pixels()[idx + 1] as f32 / 255.0,
            0.0,
        );
        let decoded = pbr::srgb_to_linear(stored);
        let (scale, bias) = pbr::integrate_brdf((x as f32 + 0.5) / 8.0, (y as f32 + 0.5) / 8.0);
        assert!((decoded.x - scale.clamp(0.0, 1.0)).abs() < 0.02);
        assert!((decoded.y - bias.clamp(0.0, 1.0)).abs() < 0.02);
    }

    #[test]
    fn settings_parse_from_json() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("settings.json");
        fs::write(
            &path,
            r#"{ "albedo": [1.0, 0.5, 0.25], "direct_diffuse": true }"#,
        )
        .unwrap();
        let settings = load_settings(&path).unwrap();
        assert!(settings.direct_diffuse);
        assert!((settings.albedo.y - 0.5).abs() < 1e-6);
        // Unspecified fields keep their defaults.
        assert!(settings.indirect_diffuse);
    }

    #[test]
    fn environment_round_trips_through_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.png");
        let pixels: Vec<u8> = (0..4 * 2 * 4).map(|i| (i * 7 % 251) as u8).collect();
        write_png(&path, 4, 2, &pixels).unwrap();
        let texture = load_environment(&path).unwrap();
        assert_eq!(texture.width(), 4);
        assert_eq!(texture.height(), 2);
        assert_eq!(texture.pixels(), &pixels[..]);
    }
}
