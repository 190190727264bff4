use anyhow::{Context, Result};
use glam::{Mat4, Vec3};
use log::info;
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::geometry::{GeometryBuffer, SPHERE_RADIUS};
use crate::ibl;
use crate::lights::{LightRig, MAX_DIRECTIONAL_LIGHTS, MAX_POINT_LIGHTS};
use crate::render::shaders::pbr_program;
use crate::render::{GeometryHandle, GraphicsContext, ProgramHandle, TextureHandle, UniformSet};
use crate::texture::Texture;

const GRID_ROWS: u32 = 5;
const GRID_COLUMNS: u32 = 5;
const GRID_SPACING: f32 = SPHERE_RADIUS * 2.5;

/// Live parameters normally driven by a tweak panel.
///
/// Read once per frame and folded into the uniform set; with no panel
/// attached the values simply keep their last state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderSettings {
    /// Base color in normalized sRGB.
    pub albedo: Vec3,
    pub light_color: Vec3,
    pub light_intensity: f32,
    pub light_position: Vec3,
    pub direct_diffuse: bool,
    pub direct_specular: bool,
    pub indirect_diffuse: bool,
    pub indirect_specular: bool,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            albedo: Vec3::ONE,
            light_color: Vec3::ONE,
            light_intensity: 500.0,
            light_position: Vec3::new(-5.0, -5.0, 5.0),
            direct_diffuse: false,
            direct_specular: false,
            indirect_diffuse: true,
            indirect_specular: false,
        }
    }
}

/// Decoded image inputs the application needs at startup.
pub struct SceneAssets {
    pub environment: Texture,
    pub brdf_lut: Texture,
}

/// Owns the renderer-facing state and drives one frame at a time.
pub struct Application {
    context: GraphicsContext,
    camera: Camera,
    settings: RenderSettings,
    lights: LightRig,
    sphere: GeometryHandle,
    program: ProgramHandle,
    irradiance: TextureHandle,
    specular_atlas: TextureHandle,
    brdf_lut: TextureHandle,
    uniforms: UniformSet,
}

impl Application {
    /// Uploads geometry, compiles the shading program, and runs the one-time
    /// lighting precompute.
    pub fn new(
        mut context: GraphicsContext,
        assets: SceneAssets,
        settings: RenderSettings,
    ) -> Result<Self> {
        let sphere = context.upload_geometry(&GeometryBuffer::sphere(48, 32, SPHERE_RADIUS));
        let program = context
            .compile_program(&pbr_program(
                MAX_POINT_LIGHTS as u32,
                MAX_DIRECTIONAL_LIGHTS as u32,
            ))
            .context("failed to compile the shading program")?;

        let environment = context.upload_texture(&assets.environment);
        let baked = ibl::bake(
            &mut context,
            environment,
            assets.environment.width(),
            assets.environment.height(),
        )
        .context("lighting precompute failed")?;
        // The raw environment is only an input to the bake.
        context.destroy_texture(environment);

        let brdf_lut = context.upload_texture(&assets.brdf_lut);

        info!("application ready");
        Ok(Self {
            context,
            camera: Camera::default(),
            settings,
            lights: LightRig::studio(),
            sphere,
            program,
            irradiance: baked.irradiance_handle,
            specular_atlas: baked.specular_atlas_handle,
            brdf_lut,
            uniforms: UniformSet::new(),
        })
    }

    pub fn camera_mut(&mut self) -> &mut Camera {
        &mut self.camera
    }

    pub fn settings_mut(&mut self) -> &mut RenderSettings {
        &mut self.settings
    }

    /// Handles a window resize; the projection picks up the new aspect on
    /// the next frame.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.context.resize(width, height);
        self.context.reset_viewport();
    }

    fn fold_uniforms(&mut self) {
        let settings = self.settings;
        // The first point light doubles as the interactively tweaked one.
        self.lights.point[0].position = settings.light_position;
        self.lights.point[0].color = settings.light_color;
        self.lights.point[0].intensity = settings.light_intensity.max(0.0);

        self.uniforms.set("uMaterial.albedo", settings.albedo);
        self.uniforms.set("uDirect.diffuse", settings.direct_diffuse);
        self.uniforms.set("uDirect.specular", settings.direct_specular);
        self.uniforms.set("uIndirect.diffuse", settings.indirect_diffuse);
        self.uniforms.set("uIndirect.specular", settings.indirect_specular);

        for (i, light) in self.lights.point.iter().enumerate() {
            self.uniforms.set(format!("uPointLights[{i}].pos"), light.position);
            self.uniforms.set(format!("uPointLights[{i}].color"), light.color);
            self.uniforms
                .set(format!("uPointLights[{i}].intensity"), light.intensity);
        }
        for (i, light) in self.lights.directional.iter().enumerate() {
            self.uniforms.set(format!("uDirectLights[{i}].dir"), light.direction);
            self.uniforms.set(format!("uDirectLights[{i}].color"), light.color);
            self.uniforms
                .set(format!("uDirectLights[{i}].intensity"), light.intensity);
        }

        let aspect = self.context.surface_aspect();
        let world_to_clip = self.camera.projection(aspect) * self.camera.view();
        self.uniforms.set("uCamera.worldToClip", world_to_clip);
        self.uniforms.set("uCameraPos", self.camera.position());

        self.uniforms.set("uTextureDiffuse", self.irradiance);
        self.uniforms.set("uTextureSpecular", self.specular_atlas);
        self.uniforms.set("uTextureBRDF", self.brdf_lut);
    }

    /// Renders the sphere grid into the current swapchain frame.
    pub fn render(&mut self) -> Result<()> {
        match self.context.begin_frame() {
            Ok(()) => {}
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                if let Some(window) = self.context.window() {
                    let size = window.inner_size();
                    self.context.resize(size.width, size.height);
                }
                return Ok(());
            }
            Err(wgpu::SurfaceError::OutOfMemory) => {
                return Err(anyhow::anyhow!("GPU is out of memory"));
            }
            Err(err) => {
                info!("skipping frame: {err}");
                return Ok(());
            }
        }

        self.context.clear().context("failed to clear the frame")?;
        self.fold_uniforms();

        for row in 0..GRID_ROWS {
            for column in 0..GRID_COLUMNS {
                let translation = Vec3::new(
                    (column as f32 - GRID_COLUMNS as f32 * 0.5) * GRID_SPACING
                        + GRID_SPACING * 0.5,
                    (row as f32 - GRID_ROWS as f32 * 0.5) * GRID_SPACING + GRID_SPACING * 0.5,
                    0.0,
                );
                self.uniforms
                    .set("uModel.localToWorld", Mat4::from_translation(translation));
                self.uniforms
                    .set("uMaterial.roughness", column as f32 * 0.18 + 0.01);
                self.uniforms
                    .set("uMaterial.metalness", row as f32 * 0.23 + 0.04);

                self.context
                    .draw(self.sphere, self.program, &self.uniforms)
                    .context("sphere draw failed")?;
            }
        }

        self.context.end_frame();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_defaults_match_the_panel() {
        let settings = RenderSettings::default();
        assert_eq!(settings.albedo, Vec3::ONE);
        assert_eq!(settings.light_intensity, 500.0);
        assert!(settings.indirect_diffuse);
        assert!(!settings.direct_diffuse);
    }

    #[test]
    fn grid_spacing_tracks_the_sphere_radius() {
        assert!((GRID_SPACING - SPHERE_RADIUS * 2.5).abs() < f32::EPSILON);
    }
}
