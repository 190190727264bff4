use std::f32::consts::PI;

use anyhow::{anyhow, Result};
use glam::{Vec2, Vec3};

/// Radius shared by the sphere primitive and the grid spacing derived from it.
pub const SPHERE_RADIUS: f32 = 1.0;

/// Immutable host-side vertex and index arrays for a primitive.
///
/// Owns no GPU state; the graphics context uploads the interleaved form and
/// tracks the device buffers under a handle.
#[derive(Debug, Clone)]
pub struct GeometryBuffer {
    positions: Vec<Vec3>,
    normals: Vec<Vec3>,
    uvs: Option<Vec<Vec2>>,
    indices: Vec<u32>,
}

impl GeometryBuffer {
    pub fn new(
        positions: Vec<Vec3>,
        normals: Vec<Vec3>,
        uvs: Option<Vec<Vec2>>,
        indices: Vec<u32>,
    ) -> Result<Self> {
        if normals.len() != positions.len() {
            return Err(anyhow!(
                "geometry has {} normals for {} positions",
                normals.len(),
                positions.len()
            ));
        }
        if let Some(uvs) = &uvs {
            if uvs.len() != positions.len() {
                return Err(anyhow!(
                    "geometry has {} uvs for {} positions",
                    uvs.len(),
                    positions.len()
                ));
            }
        }
        let count = positions.len() as u32;
        if let Some(bad) = indices.iter().find(|&&i| i >= count) {
            return Err(anyhow!("index {bad} out of range for {count} vertices"));
        }
        Ok(Self {
            positions,
            normals,
            uvs,
            indices,
        })
    }

    /// Parametric UV sphere centered at the origin.
    pub fn sphere(sectors: u32, stacks: u32, radius: f32) -> Self {
        let sectors = sectors.max(3);
        let stacks = stacks.max(2);

        let mut positions = Vec::new();
        let mut normals = Vec::new();
        let mut uvs = Vec::new();
        let mut indices = Vec::new();

        for i in 0..=stacks {
            // Latitude sweeps from the north pole down.
            let stack_angle = PI / 2.0 - i as f32 * PI / stacks as f32;
            let ring = stack_angle.cos();
            let y = stack_angle.sin();
            for j in 0..=sectors {
                let sector_angle = j as f32 * 2.0 * PI / sectors as f32;
                let normal = Vec3::new(
                    ring * sector_angle.cos(),
                    y,
                    ring * sector_angle.sin(),
                );
                positions.push(normal * radius);
                normals.push(normal);
                uvs.push(Vec2::new(
                    j as f32 / sectors as f32,
                    i as f32 / stacks as f32,
                ));
            }
        }

        // Counter-clockwise from outside; the sector sweep runs x toward z.
        let stride = sectors + 1;
        for i in 0..stacks {
            for j in 0..sectors {
                let k0 = i * stride + j;
                let k1 = k0 + stride;
                if i != 0 {
                    indices.extend_from_slice(&[k0, k0 + 1, k1]);
                }
                if i != stacks - 1 {
                    indices.extend_from_slice(&[k0 + 1, k1 + 1, k1]);
                }
            }
        }

        Self {
            positions,
            normals,
            uvs: Some(uvs),
            indices,
        }
    }

    /// Screen-aligned plane covering clip space, used by the bake passes.
    pub fn screen_plane() -> Self {
        let positions = vec![
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
        ];
        let normals = vec![Vec3::Z; 4];
        let uvs = vec![
            Vec2::new(0.0, 1.0),
            Vec2::new(1.0, 1.0),
            Vec2::new(1.0, 0.0),
            Vec2::new(0.0, 0.0),
        ];
        Self {
            positions,
            normals,
            uvs: Some(uvs),
            indices: vec![0, 1, 2, 0, 2, 3],
        }
    }

    pub fn vertex_count(&self) -> u32 {
        self.positions.len() as u32
    }

    pub fn indices(&self) -> &[u32] {
        &self.indices
    }

    /// Interleaves `position.xyz normal.xyz uv.xy` for upload.
    ///
    /// Missing UVs interleave as zeros so the vertex layout stays fixed.
    pub fn interleaved(&self) -> Vec<f32> {
        let mut out = Vec::with_capacity(self.positions.len() * 8);
        for (i, position) in self.positions.iter().enumerate() {
            let normal = self.normals[i];
            let uv = self
                .uvs
                .as_ref()
                .map(|uvs| uvs[i])
                .unwrap_or(Vec2::ZERO);
            out.extend_from_slice(&[
                position.x, position.y, position.z, normal.x, normal.y, normal.z, uv.x, uv.y,
            ]);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_indices() {
        let positions = vec![Vec3::ZERO, Vec3::X, Vec3::Y];
        let normals = vec![Vec3::Z; 3];
        assert!(GeometryBuffer::new(positions.clone(), normals.clone(), None, vec![0, 1, 3]).is_err());
        assert!(GeometryBuffer::new(positions, normals, None, vec![0, 1, 2]).is_ok());
    }

    #[test]
    fn sphere_indices_stay_in_range() {
        let sphere = GeometryBuffer::sphere(16, 12, SPHERE_RADIUS);
        let count = sphere.vertex_count();
        assert!(sphere.indices().iter().all(|&i| i < count));
        assert_eq!(sphere.indices().len() % 3, 0);
    }

    #[test]
    fn sphere_triangles_face_outward() {
        let sphere = GeometryBuffer::sphere(16, 12, 1.0);
        // Signed volume of the triangle fan from the origin is positive for
        // counter-clockwise outward-facing triangles.
        let mut volume = 0.0f32;
        for triangle in sphere.indices().chunks(3) {
            let a = sphere.positions[triangle[0] as usize];
            let b = sphere.positions[triangle[1] as usize];
            let c = sphere.positions[triangle[2] as usize];
            volume += a.dot(b.cross(c)) / 6.0;
        }
        let expected = 4.0 / 3.0 * PI;
        assert!(
            volume > 0.9 * expected && volume < expected,
            "signed volume {volume}, sphere volume {expected}"
        );
    }

    #[test]
    fn sphere_normals_are_unit_and_radial() {
        let sphere = GeometryBuffer::sphere(12, 8, 2.0);
        for (position, normal) in sphere.positions.iter().zip(&sphere.normals) {
            assert!((normal.length() - 1.0).abs() < 1e-5);
            assert!((*position - *normal * 2.0).length() < 1e-4);
        }
    }

    #[test]
    fn interleaved_layout_is_eight_floats() {
        let plane = GeometryBuffer::screen_plane();
        let data = plane.interleaved();
        assert_eq!(data.len(), plane.vertex_count() as usize * 8);
        // First vertex: position then normal then uv.
        assert_eq!(&data[0..3], &[-1.0, -1.0, 0.0]);
        assert_eq!(&data[3..6], &[0.0, 0.0, 1.0]);
        assert_eq!(&data[6..8], &[0.0, 1.0]);
    }
}
