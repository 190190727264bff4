use anyhow::{anyhow, Result};
use glam::Vec3;

/// Multiplier shared by the RGBM encode/decode pair.
///
/// `decode(rgbm) = RGBM_RANGE * rgbm.rgb * rgbm.a`, so colors up to
/// `RGBM_RANGE` per channel survive the 8-bit round trip.
pub const RGBM_RANGE: f32 = 6.0;

/// Channel layout and encoding of a texture's pixel data.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Four 8-bit channels, linear.
    Rgba8,
    /// Four 8-bit channels, sRGB encoded (decoded by the sampler).
    Rgba8Srgb,
    /// RGBM-packed HDR in four 8-bit channels; decoded in the shader.
    Rgbm8,
    /// Four 32-bit float channels.
    RgbaF32,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8 | PixelFormat::Rgba8Srgb | PixelFormat::Rgbm8 => 4,
            PixelFormat::RgbaF32 => 16,
        }
    }
}

/// Host-resident pixel data waiting to be uploaded.
///
/// After upload the device copy is tracked by the graphics context under a
/// texture handle; the host buffer here may be dropped or overwritten (for
/// example by readback results) without affecting the device object.
#[derive(Debug, Clone)]
pub struct Texture {
    width: u32,
    height: u32,
    format: PixelFormat,
    pixels: Vec<u8>,
}

impl Texture {
    pub fn new(width: u32, height: u32, format: PixelFormat, pixels: Vec<u8>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(anyhow!("texture must have a non-zero area"));
        }
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if pixels.len() != expected {
            return Err(anyhow!(
                "texture data is {} bytes, expected {} for {}x{} {:?}",
                pixels.len(),
                expected,
                width,
                height,
                format
            ));
        }
        Ok(Self {
            width,
            height,
            format,
            pixels,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// Reads one RGBM texel back as a linear color.
    pub fn rgbm_texel(&self, x: u32, y: u32) -> Vec3 {
        let idx = (y as usize * self.width as usize + x as usize) * 4;
        let px = &self.pixels[idx..idx + 4];
        rgbm_decode([px[0], px[1], px[2], px[3]])
    }
}

/// Packs a linear HDR color into RGBM bytes.
///
/// The alpha channel carries a shared multiplier so the RGB channels stay in
/// 8-bit range; the multiplier is quantized upward so the stored RGB never
/// exceeds 1.0.
pub fn rgbm_encode(color: Vec3) -> [u8; 4] {
    let c = (color / RGBM_RANGE).max(Vec3::ZERO);
    let mut a = c.x.max(c.y).max(c.z.max(1e-6)).clamp(0.0, 1.0);
    a = (a * 255.0).ceil() / 255.0;
    let rgb = c / a;
    [
        (rgb.x.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.y.clamp(0.0, 1.0) * 255.0).round() as u8,
        (rgb.z.clamp(0.0, 1.0) * 255.0).round() as u8,
        (a * 255.0).round() as u8,
    ]
}

/// Unpacks RGBM bytes back into a linear HDR color.
pub fn rgbm_decode(rgbm: [u8; 4]) -> Vec3 {
    let rgb = Vec3::new(
        rgbm[0] as f32 / 255.0,
        rgbm[1] as f32 / 255.0,
        rgbm[2] as f32 / 255.0,
    );
    let a = rgbm[3] as f32 / 255.0;
    RGBM_RANGE * rgb * a
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_mismatched_pixel_length() {
        assert!(Texture::new(2, 2, PixelFormat::Rgba8, vec![0; 15]).is_err());
        assert!(Texture::new(2, 2, PixelFormat::Rgba8, vec![0; 16]).is_ok());
        assert!(Texture::new(0, 2, PixelFormat::Rgba8, vec![]).is_err());
    }

    #[test]
    fn rgbm_round_trips_within_one_step() {
        let colors = [
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 1.0, 1.0),
            Vec3::new(0.25, 0.5, 0.75),
            Vec3::new(5.9, 0.1, 2.3),
            Vec3::new(0.01, 0.02, 0.005),
            Vec3::new(6.0, 6.0, 6.0),
        ];
        // One 8-bit step of the decoded range.
        let step = RGBM_RANGE / 255.0;
        for color in colors {
            let back = rgbm_decode(rgbm_encode(color));
            for (a, b) in color.to_array().iter().zip(back.to_array()) {
                assert!(
                    (a - b).abs() <= step + 1e-4,
                    "{color:?} decoded to {back:?}"
                );
            }
        }
    }

    #[test]
    fn rgbm_alpha_never_zero() {
        let encoded = rgbm_encode(Vec3::ZERO);
        assert!(encoded[3] >= 1);
    }
}
