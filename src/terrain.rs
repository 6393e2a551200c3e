//! Terrain height field and its bounding envelope.
//!
//! Terrain geometry is Z-up: x east, y north, z height, meters from the scene
//! origin.

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;

use crate::bisect::mesh_positions;
use crate::bounds::BoundingBox;
use crate::geo::{LocalPoint, WorldPoint};

/// Margin added above and below the terrain when building the envelope
const ENVELOPE_MARGIN: f32 = 1.0;

/// Closed box around the terrain that layer meshes are differenced against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TerrainEnvelope {
    pub min: Vec3,
    pub max: Vec3,
}

impl TerrainEnvelope {
    pub fn mesh(&self) -> Mesh {
        box_mesh(self.min, self.max)
    }
}

/// What the layer code needs to know about the terrain.
#[derive(Debug, Clone)]
pub struct Terrain {
    /// Planar world extent
    pub bounds: BoundingBox,
    pub min_z: f32,
    pub max_z: f32,
    /// Height above `max_z` at which flat layers are placed before draping
    pub layer_offset: f32,
    /// Built on first use
    pub envelope: Option<TerrainEnvelope>,
}

impl Terrain {
    pub fn new(bounds: BoundingBox, min_z: f32, max_z: f32, layer_offset: f32) -> Self {
        Self {
            bounds,
            min_z,
            max_z,
            layer_offset,
            envelope: None,
        }
    }

    /// Measures the world-space extent of a terrain mesh placed by `transform`.
    pub fn from_mesh(mesh: &Mesh, transform: &Transform, layer_offset: f32) -> Option<Self> {
        let world: Vec<WorldPoint> = mesh_positions(mesh)?
            .iter()
            .map(|p| LocalPoint(Vec3::from(*p)).to_world(transform))
            .collect();
        let bounds = BoundingBox::from_points(world.iter().map(|p| p.0))?;
        let min_z = world.iter().map(|p| p.0.z).fold(f32::INFINITY, f32::min);
        let max_z = world.iter().map(|p| p.0.z).fold(f32::NEG_INFINITY, f32::max);
        Some(Self::new(bounds, min_z, max_z, layer_offset))
    }

    pub fn has_envelope(&self) -> bool {
        self.envelope.is_some()
    }

    /// The envelope, creating it if needed.
    pub fn envelope(&mut self) -> TerrainEnvelope {
        if let Some(envelope) = self.envelope {
            return envelope;
        }
        let envelope = self.build_envelope();
        self.envelope = Some(envelope);
        envelope
    }

    /// Spans the terrain footprint from below the lowest point to above the
    /// layer height.
    fn build_envelope(&self) -> TerrainEnvelope {
        let b = &self.bounds;
        let min = Vec3::new(b.min_x as f32, b.min_y as f32, self.min_z - ENVELOPE_MARGIN);
        let max = Vec3::new(
            b.max_x as f32,
            b.max_y as f32,
            self.max_z + self.layer_offset + ENVELOPE_MARGIN,
        );
        info!("Creating terrain envelope {:?} .. {:?}", min, max);
        TerrainEnvelope { min, max }
    }
}

/// Axis-aligned closed box, outward-facing triangles.
fn box_mesh(min: Vec3, max: Vec3) -> Mesh {
    let corners: Vec<[f32; 3]> = (0..8)
        .map(|i| {
            [
                if i & 1 == 0 { min.x } else { max.x },
                if i & 2 == 0 { min.y } else { max.y },
                if i & 4 == 0 { min.z } else { max.z },
            ]
        })
        .collect();
    #[rustfmt::skip]
    let indices = vec![
        0, 2, 1, 1, 2, 3, // bottom
        4, 5, 6, 5, 7, 6, // top
        0, 1, 4, 1, 5, 4, // south
        2, 6, 3, 3, 6, 7, // north
        0, 4, 2, 2, 4, 6, // west
        1, 3, 5, 3, 7, 5, // east
    ];
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, corners);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}

/// Generate a regular grid terrain over `bounds` with `resolution` cells per
/// side, sampling `height(x, y)` at each vertex.
pub fn height_field_mesh(
    bounds: &BoundingBox,
    resolution: u32,
    height: impl Fn(f64, f64) -> f32,
) -> Mesh {
    let res = resolution.max(1) as usize;
    let stride = res + 1;
    let mut positions = Vec::with_capacity(stride * stride);
    for row in 0..=res {
        for col in 0..=res {
            let x = bounds.min_x + bounds.width(crate::Axis::X) * col as f64 / res as f64;
            let y = bounds.min_y + bounds.width(crate::Axis::Y) * row as f64 / res as f64;
            positions.push([x as f32, y as f32, height(x, y)]);
        }
    }

    // Normals from central differences over neighbouring vertices
    let mut normals = vec![[0.0, 0.0, 1.0]; positions.len()];
    for row in 0..=res {
        for col in 0..=res {
            let idx = row * stride + col;
            let pos = Vec3::from(positions[idx]);
            let left = if col > 0 { Vec3::from(positions[idx - 1]) } else { pos };
            let right = if col < res { Vec3::from(positions[idx + 1]) } else { pos };
            let down = if row > 0 { Vec3::from(positions[idx - stride]) } else { pos };
            let up = if row < res { Vec3::from(positions[idx + stride]) } else { pos };
            let n = (right - left).cross(up - down).normalize_or_zero();
            if n != Vec3::ZERO {
                normals[idx] = n.to_array();
            }
        }
    }

    let mut indices = Vec::with_capacity(res * res * 6);
    for row in 0..res {
        for col in 0..res {
            let i = (row * stride + col) as u32;
            let s = stride as u32;
            // Two counter-clockwise triangles per cell, seen from above
            indices.extend_from_slice(&[i, i + 1, i + s + 1, i, i + s + 1, i + s]);
        }
    }

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}
