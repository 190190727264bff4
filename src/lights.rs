use glam::Vec3;
use serde::{Deserialize, Serialize};

/// Maximum point lights the shading program unrolls.
pub const MAX_POINT_LIGHTS: usize = 4;
/// Maximum directional lights the shading program unrolls.
pub const MAX_DIRECTIONAL_LIGHTS: usize = 2;

/// Omnidirectional emitter with inverse-square falloff.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointLight {
    pub position: Vec3,
    /// Normalized 0..1 color.
    pub color: Vec3,
    /// Non-negative radiant intensity.
    pub intensity: f32,
}

impl Default for PointLight {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            color: Vec3::ONE,
            intensity: 0.0,
        }
    }
}

/// Parallel emitter; the direction need not be unit length at rest and is
/// normalized in the shader before use.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DirectionalLight {
    pub direction: Vec3,
    pub color: Vec3,
    pub intensity: f32,
}

impl Default for DirectionalLight {
    fn default() -> Self {
        Self {
            direction: Vec3::Y,
            color: Vec3::ONE,
            intensity: 0.0,
        }
    }
}

/// Light rig matching the shading program's fixed capacities.
#[derive(Debug, Clone, Default)]
pub struct LightRig {
    pub point: [PointLight; MAX_POINT_LIGHTS],
    pub directional: [DirectionalLight; MAX_DIRECTIONAL_LIGHTS],
}

impl LightRig {
    /// The four corner lights plus one overhead sun of the default scene.
    pub fn studio() -> Self {
        let mut rig = Self::default();
        let corners = [
            Vec3::new(-5.0, -5.0, 5.0),
            Vec3::new(-5.0, 5.0, 5.0),
            Vec3::new(5.0, -5.0, 5.0),
            Vec3::new(5.0, 5.0, 5.0),
        ];
        for (light, corner) in rig.point.iter_mut().zip(corners) {
            light.position = corner;
            light.intensity = 500.0;
        }
        rig.directional[0].direction = Vec3::Y;
        rig.directional[0].intensity = 0.5;
        rig
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn studio_rig_fills_every_point_slot() {
        let rig = LightRig::studio();
        assert!(rig.point.iter().all(|l| l.intensity > 0.0));
        assert_eq!(rig.directional[1].intensity, 0.0);
    }

    #[test]
    fn settings_round_trip_through_json() {
        let light = PointLight {
            position: Vec3::new(1.0, 2.0, 3.0),
            color: Vec3::new(0.5, 0.25, 1.0),
            intensity: 42.0,
        };
        let json = serde_json::to_string(&light).unwrap();
        let back: PointLight = serde_json::from_str(&json).unwrap();
        assert_eq!(light, back);
    }
}
