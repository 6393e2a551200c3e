//! Plane bisection of triangle meshes.
//!
//! Triangles crossing the plane are split along it so every resulting face
//! lies on one side; either side can then be dropped. One new vertex is
//! created per cut edge and shared by both triangles using that edge, so the
//! cut stays watertight.

use std::collections::HashMap;

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology, VertexAttributeValues};
use bevy::prelude::*;

use crate::constants::PLANE_EPSILON;
use crate::error::SliceError;

/// Which side of a cut plane to discard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClearSide {
    /// Split only
    #[default]
    Keep,
    /// Discard geometry behind the plane (against the normal)
    Inner,
    /// Discard geometry in front of the plane (along the normal)
    Outer,
}

/// Mesh editing needed by the slicer.
pub trait BisectMesh {
    fn bisect_plane(&mut self, origin: Vec3, normal: Vec3, clear: ClearSide) -> Result<(), SliceError>;

    /// Min and max corner of the geometry in local space, `None` when empty.
    fn local_bounds(&self) -> Option<(Vec3, Vec3)>;
}

impl BisectMesh for Mesh {
    fn bisect_plane(&mut self, origin: Vec3, normal: Vec3, clear: ClearSide) -> Result<(), SliceError> {
        let mut soup = TriangleSoup::from_mesh(self)?;
        soup.bisect(origin, normal, clear);
        *self = soup.into_mesh();
        Ok(())
    }

    fn local_bounds(&self) -> Option<(Vec3, Vec3)> {
        let positions = mesh_positions(self)?;
        let referenced: Vec<Vec3> = match self.indices() {
            Some(indices) => indices
                .iter()
                .filter_map(|i| positions.get(i).copied())
                .map(Vec3::from)
                .collect(),
            None => positions.iter().copied().map(Vec3::from).collect(),
        };
        let first = *referenced.first()?;
        Some(referenced.iter().fold((first, first), |(min, max), p| (min.min(*p), max.max(*p))))
    }
}

/// Vertex positions of a mesh, if stored as `Float32x3`.
pub fn mesh_positions(mesh: &Mesh) -> Option<&[[f32; 3]]> {
    match mesh.attribute(Mesh::ATTRIBUTE_POSITION) {
        Some(VertexAttributeValues::Float32x3(positions)) => Some(positions),
        _ => None,
    }
}

/// Number of triangles in a triangle-list mesh.
pub fn triangle_count(mesh: &Mesh) -> usize {
    match mesh.indices() {
        Some(indices) => indices.len() / 3,
        None => mesh_positions(mesh).map_or(0, |p| p.len() / 3),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Side {
    Above,
    Below,
    On,
}

fn side_of(distance: f32) -> Side {
    if distance > PLANE_EPSILON {
        Side::Above
    } else if distance < -PLANE_EPSILON {
        Side::Below
    } else {
        Side::On
    }
}

/// Editable copy of the attributes the bisection carries across a cut.
struct TriangleSoup {
    positions: Vec<[f32; 3]>,
    normals: Option<Vec<[f32; 3]>>,
    uvs: Option<Vec<[f32; 2]>>,
    indices: Vec<u32>,
}

impl TriangleSoup {
    fn from_mesh(mesh: &Mesh) -> Result<Self, SliceError> {
        if mesh.primitive_topology() != PrimitiveTopology::TriangleList {
            return Err(SliceError::UnsupportedMesh("only triangle lists can be bisected"));
        }
        let positions = mesh_positions(mesh)
            .ok_or(SliceError::UnsupportedMesh("vertex positions must be Float32x3"))?
            .to_vec();

        let normals = match mesh.attribute(Mesh::ATTRIBUTE_NORMAL) {
            Some(VertexAttributeValues::Float32x3(n)) if n.len() == positions.len() => Some(n.clone()),
            _ => None,
        };
        let uvs = match mesh.attribute(Mesh::ATTRIBUTE_UV_0) {
            Some(VertexAttributeValues::Float32x2(uv)) if uv.len() == positions.len() => Some(uv.clone()),
            _ => None,
        };

        let mut indices: Vec<u32> = match mesh.indices() {
            Some(indices) => indices.iter().map(|i| i as u32).collect(),
            None => (0..positions.len() as u32).collect(),
        };
        indices.truncate(indices.len() - indices.len() % 3);
        if indices.iter().any(|&i| i as usize >= positions.len()) {
            return Err(SliceError::UnsupportedMesh("index out of range"));
        }

        Ok(Self { positions, normals, uvs, indices })
    }

    fn into_mesh(self) -> Mesh {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, self.positions);
        if let Some(normals) = self.normals {
            mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
        }
        if let Some(uvs) = self.uvs {
            mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
        }
        mesh.insert_indices(Indices::U32(self.indices));
        mesh
    }

    /// Append a vertex on the edge `a`-`b` at parameter `t` from `a`.
    fn push_interpolated(&mut self, a: u32, b: u32, t: f32) -> u32 {
        let (a, b) = (a as usize, b as usize);
        let index = self.positions.len() as u32;
        let p = Vec3::from(self.positions[a]).lerp(Vec3::from(self.positions[b]), t);
        self.positions.push(p.to_array());
        if let Some(normals) = self.normals.as_mut() {
            let n = Vec3::from(normals[a]).lerp(Vec3::from(normals[b]), t).normalize_or_zero();
            normals.push(n.to_array());
        }
        if let Some(uvs) = self.uvs.as_mut() {
            let uv = Vec2::from(uvs[a]).lerp(Vec2::from(uvs[b]), t);
            uvs.push(uv.to_array());
        }
        index
    }

    fn bisect(&mut self, origin: Vec3, normal: Vec3, clear: ClearSide) {
        let normal = normal.normalize_or_zero();
        let distances: Vec<f32> = self
            .positions
            .iter()
            .map(|p| normal.dot(Vec3::from(*p) - origin))
            .collect();

        let triangles = std::mem::take(&mut self.indices);
        let mut kept = Vec::with_capacity(triangles.len());
        let mut cut_vertices: HashMap<(u32, u32), u32> = HashMap::new();

        for tri in triangles.chunks_exact(3) {
            let sides = [0, 1, 2].map(|k| side_of(distances[tri[k] as usize]));
            let above = sides.contains(&Side::Above);
            let below = sides.contains(&Side::Below);

            if !(above && below) {
                let cleared = match clear {
                    ClearSide::Keep => false,
                    ClearSide::Inner => below,
                    ClearSide::Outer => above,
                };
                if !cleared {
                    kept.extend_from_slice(tri);
                }
                continue;
            }

            // Walk the triangle's edges, distributing corners and cut points
            // to the polygon on each side. Winding is preserved.
            let mut upper: Vec<u32> = Vec::with_capacity(4);
            let mut lower: Vec<u32> = Vec::with_capacity(4);
            for k in 0..3 {
                let (a, b) = (tri[k], tri[(k + 1) % 3]);
                match sides[k] {
                    Side::Above => upper.push(a),
                    Side::Below => lower.push(a),
                    Side::On => {
                        upper.push(a);
                        lower.push(a);
                    }
                }
                let crosses = matches!(
                    (sides[k], sides[(k + 1) % 3]),
                    (Side::Above, Side::Below) | (Side::Below, Side::Above)
                );
                if crosses {
                    let key = (a.min(b), a.max(b));
                    let cut = match cut_vertices.get(&key) {
                        Some(&v) => v,
                        None => {
                            let (d0, d1) = (distances[key.0 as usize], distances[key.1 as usize]);
                            let v = self.push_interpolated(key.0, key.1, d0 / (d0 - d1));
                            cut_vertices.insert(key, v);
                            v
                        }
                    };
                    upper.push(cut);
                    lower.push(cut);
                }
            }

            if clear != ClearSide::Outer {
                fan_triangulate(&upper, &mut kept);
            }
            if clear != ClearSide::Inner {
                fan_triangulate(&lower, &mut kept);
            }
        }

        self.indices = kept;
        self.compact();
    }

    /// Drop vertices no triangle references any more.
    fn compact(&mut self) {
        let mut remap = vec![u32::MAX; self.positions.len()];
        let mut order = Vec::with_capacity(self.positions.len());
        for index in self.indices.iter_mut() {
            let slot = &mut remap[*index as usize];
            if *slot == u32::MAX {
                *slot = order.len() as u32;
                order.push(*index as usize);
            }
            *index = *slot;
        }
        if order.len() == self.positions.len() && order.iter().enumerate().all(|(i, &o)| i == o) {
            return;
        }
        self.positions = order.iter().map(|&i| self.positions[i]).collect();
        if let Some(normals) = self.normals.as_mut() {
            *normals = order.iter().map(|&i| normals[i]).collect();
        }
        if let Some(uvs) = self.uvs.as_mut() {
            *uvs = order.iter().map(|&i| uvs[i]).collect();
        }
    }
}

fn fan_triangulate(polygon: &[u32], out: &mut Vec<u32>) {
    for i in 1..polygon.len().saturating_sub(1) {
        out.extend_from_slice(&[polygon[0], polygon[i], polygon[i + 1]]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Square in the z=0 plane from (-1,-1) to (1,1) split along its diagonal.
    fn unit_square() -> Mesh {
        let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_POSITION,
            vec![[-1.0, -1.0, 0.0], [1.0, -1.0, 0.0], [1.0, 1.0, 0.0], [-1.0, 1.0, 0.0]],
        );
        mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, vec![[0.0, 0.0, 1.0]; 4]);
        mesh.insert_attribute(
            Mesh::ATTRIBUTE_UV_0,
            vec![[0.0, 0.0], [1.0, 0.0], [1.0, 1.0], [0.0, 1.0]],
        );
        mesh.insert_indices(Indices::U32(vec![0, 1, 2, 0, 2, 3]));
        mesh
    }

    fn triangles(mesh: &Mesh) -> Vec<[Vec3; 3]> {
        let positions = mesh_positions(mesh).unwrap();
        let indices: Vec<usize> = mesh.indices().unwrap().iter().collect();
        indices
            .chunks_exact(3)
            .map(|t| [0, 1, 2].map(|k| Vec3::from(positions[t[k]])))
            .collect()
    }

    #[test]
    fn split_keeps_both_sides_and_shares_cut_vertices() {
        let mut mesh = unit_square();
        mesh.bisect_plane(Vec3::ZERO, Vec3::X, ClearSide::Keep).unwrap();

        // 4 corners plus one vertex on each of the three crossed edges
        assert_eq!(mesh_positions(&mesh).unwrap().len(), 7);
        for tri in triangles(&mesh) {
            let all_left = tri.iter().all(|p| p.x <= 1e-5);
            let all_right = tri.iter().all(|p| p.x >= -1e-5);
            assert!(all_left || all_right, "triangle straddles the cut: {:?}", tri);
        }
        let (min, max) = mesh.local_bounds().unwrap();
        assert_eq!(min.truncate(), Vec2::new(-1.0, -1.0));
        assert_eq!(max.truncate(), Vec2::new(1.0, 1.0));
    }

    #[test]
    fn clear_inner_drops_geometry_behind_the_plane() {
        let mut mesh = unit_square();
        mesh.bisect_plane(Vec3::new(0.25, 0.0, 0.0), Vec3::X, ClearSide::Inner).unwrap();
        let (min, max) = mesh.local_bounds().unwrap();
        assert!((min.x - 0.25).abs() < 1e-6);
        assert_eq!(max.x, 1.0);
        assert!(triangles(&mesh).iter().flatten().all(|p| p.x >= 0.25 - 1e-5));
    }

    #[test]
    fn clear_outer_drops_geometry_in_front_of_the_plane() {
        let mut mesh = unit_square();
        mesh.bisect_plane(Vec3::new(0.0, -0.5, 0.0), Vec3::Y, ClearSide::Outer).unwrap();
        let (min, max) = mesh.local_bounds().unwrap();
        assert_eq!(min.y, -1.0);
        assert!((max.y + 0.5).abs() < 1e-6);
        // Every remaining vertex is referenced
        let referenced: std::collections::HashSet<usize> = mesh.indices().unwrap().iter().collect();
        assert_eq!(referenced.len(), mesh_positions(&mesh).unwrap().len());
    }

    #[test]
    fn attributes_are_interpolated_at_the_cut() {
        let mut mesh = unit_square();
        mesh.bisect_plane(Vec3::ZERO, Vec3::X, ClearSide::Inner).unwrap();
        let positions = mesh_positions(&mesh).unwrap();
        let Some(VertexAttributeValues::Float32x2(uvs)) = mesh.attribute(Mesh::ATTRIBUTE_UV_0) else {
            panic!("uvs were dropped");
        };
        let Some(VertexAttributeValues::Float32x3(normals)) = mesh.attribute(Mesh::ATTRIBUTE_NORMAL) else {
            panic!("normals were dropped");
        };
        for ((p, uv), n) in positions.iter().zip(uvs).zip(normals) {
            assert!((uv[0] - (p[0] + 1.0) / 2.0).abs() < 1e-6);
            assert!((uv[1] - (p[1] + 1.0) / 2.0).abs() < 1e-6);
            assert_eq!(*n, [0.0, 0.0, 1.0]);
        }
    }

    #[test]
    fn plane_outside_mesh_changes_nothing() {
        let mut mesh = unit_square();
        mesh.bisect_plane(Vec3::new(5.0, 0.0, 0.0), Vec3::X, ClearSide::Outer).unwrap();
        assert_eq!(triangle_count(&mesh), 2);
        assert_eq!(mesh_positions(&mesh).unwrap().len(), 4);
    }

    #[test]
    fn clearing_everything_leaves_an_empty_mesh() {
        let mut mesh = unit_square();
        mesh.bisect_plane(Vec3::new(5.0, 0.0, 0.0), Vec3::X, ClearSide::Inner).unwrap();
        assert_eq!(triangle_count(&mesh), 0);
        assert!(mesh.local_bounds().is_none());
        // Bisecting an empty mesh is a no-op rather than an error
        mesh.bisect_plane(Vec3::ZERO, Vec3::Y, ClearSide::Keep).unwrap();
        assert_eq!(triangle_count(&mesh), 0);
    }

    #[test]
    fn cut_through_a_vertex_does_not_duplicate_it() {
        let mut mesh = unit_square();
        // Plane along the diagonal passes through corners 0 and 2
        mesh.bisect_plane(Vec3::ZERO, Vec3::new(1.0, -1.0, 0.0), ClearSide::Keep).unwrap();
        assert_eq!(triangle_count(&mesh), 2);
        assert_eq!(mesh_positions(&mesh).unwrap().len(), 4);
    }

    #[test]
    fn non_triangle_meshes_are_rejected() {
        let mut mesh = Mesh::new(PrimitiveTopology::LineList, RenderAssetUsages::default());
        mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, vec![[0.0, 0.0, 0.0], [1.0, 0.0, 0.0]]);
        assert!(matches!(
            mesh.bisect_plane(Vec3::ZERO, Vec3::X, ClearSide::Keep),
            Err(SliceError::UnsupportedMesh(_))
        ));
    }
}
