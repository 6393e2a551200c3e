//! Flat layer meshes (building footprints, areas) and how they are draped
//! onto the terrain.

use std::collections::HashMap;

use bevy::asset::RenderAssetUsages;
use bevy::mesh::{Indices, PrimitiveTopology};
use bevy::prelude::*;

use crate::bisect::BisectMesh;
use crate::bounds::BoundingBox;
use crate::error::SliceError;
use crate::slicer::{self, CutPlane};
use crate::terrain::{Terrain, TerrainEnvelope};

/// Layer-level settings shared by all layers of an import.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSettings {
    /// Slice flat layers so they follow the terrain
    pub slice_flat_layers: bool,
    pub max_slice_width: f64,
    /// Shrinkwrap offset used when a layer has no offset of its own
    pub sw_offset: f32,
    /// Per-layer vertical offsets, keyed by layer id
    pub layer_offsets: HashMap<String, f32>,
}

impl Default for LayerSettings {
    fn default() -> Self {
        Self {
            slice_flat_layers: true,
            max_slice_width: crate::constants::DEFAULT_SLICE_WIDTH,
            sw_offset: 0.05,
            layer_offsets: HashMap::new(),
        }
    }
}

/// Where a layer's geometry goes and which post-processing it gets.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerPlacement {
    pub layer_id: String,
    /// Translation of the layer object
    pub location: Vec3,
    /// Slice before draping
    pub slice_mesh: bool,
    /// Emit boolean and shrinkwrap steps
    pub apply_modifiers: bool,
    pub sw_offset: f32,
}

impl LayerPlacement {
    pub fn new(layer_id: &str, terrain: Option<&Terrain>, settings: &LayerSettings) -> Self {
        let z = settings.layer_offsets.get(layer_id).copied().unwrap_or(0.0);
        match terrain {
            Some(terrain) => Self {
                layer_id: layer_id.to_string(),
                location: Vec3::new(0.0, 0.0, terrain.max_z + terrain.layer_offset),
                slice_mesh: settings.slice_flat_layers,
                apply_modifiers: true,
                sw_offset: if z != 0.0 { z } else { settings.sw_offset },
            },
            None => Self {
                layer_id: layer_id.to_string(),
                location: Vec3::new(0.0, 0.0, z),
                slice_mesh: false,
                apply_modifiers: false,
                sw_offset: 0.0,
            },
        }
    }
}

/// Post-slicing operation for the host's modifier stack.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DrapeStep {
    /// Boolean difference with the terrain envelope as operand
    Boolean { envelope: TerrainEnvelope },
    /// Project vertices down (-Z) onto the terrain surface, then lift them
    /// by `offset`
    Shrinkwrap { offset: f32 },
}

/// Result of finishing one layer mesh.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayerOutcome {
    pub cuts: Vec<CutPlane>,
    pub steps: Vec<DrapeStep>,
}

/// Slices the layer mesh (when enabled) and lists the drape steps to apply.
///
/// Steps are skipped for a mesh that slicing left empty.
pub fn finalize_layer(
    mesh: &mut Mesh,
    placement: &LayerPlacement,
    terrain: Option<&mut Terrain>,
    settings: &LayerSettings,
) -> Result<LayerOutcome, SliceError> {
    let mut outcome = LayerOutcome::default();
    let Some(terrain) = terrain else {
        return Ok(outcome);
    };

    if placement.slice_mesh {
        outcome.cuts = slicer::slice(mesh, placement.location, &terrain.bounds, settings.max_slice_width)?;
    }

    if placement.apply_modifiers {
        if mesh.local_bounds().is_none() {
            info!("Layer {} is empty after slicing, skipping modifiers", placement.layer_id);
            return Ok(outcome);
        }
        outcome.steps.push(DrapeStep::Boolean { envelope: terrain.envelope() });
        outcome.steps.push(DrapeStep::Shrinkwrap { offset: placement.sw_offset });
    }
    Ok(outcome)
}

// =============================================================================
// Footprint meshes
// =============================================================================

/// Flat rectangle at height `z`, facing up.
pub fn flat_footprint(bounds: &BoundingBox, z: f32) -> Mesh {
    let (x0, x1) = (bounds.min_x as f32, bounds.max_x as f32);
    let (y0, y1) = (bounds.min_y as f32, bounds.max_y as f32);
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(
        Mesh::ATTRIBUTE_POSITION,
        vec![[x0, y0, z], [x1, y0, z], [x1, y1, z], [x0, y1, z]],
    );
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, vec![[0.0, 0.0, 1.0]; 4]);
    mesh.insert_indices(Indices::U32(vec![0, 1, 2, 0, 2, 3]));
    mesh
}

/// Rectangular block from `z = 0` up to `height`, without a floor.
pub fn extruded_footprint(bounds: &BoundingBox, height: f32) -> Mesh {
    let (x0, x1) = (bounds.min_x as f32, bounds.max_x as f32);
    let (y0, y1) = (bounds.min_y as f32, bounds.max_y as f32);
    let ring = [[x0, y0], [x1, y0], [x1, y1], [x0, y1]];

    let mut positions = Vec::with_capacity(20);
    let mut normals = Vec::with_capacity(20);
    let mut indices = Vec::with_capacity(30);

    for i in 0..4 {
        let a = ring[i];
        let b = ring[(i + 1) % 4];
        let n = Vec3::new(b[1] - a[1], a[0] - b[0], 0.0).normalize_or_zero().to_array();
        let base = positions.len() as u32;
        positions.extend_from_slice(&[[a[0], a[1], 0.0], [b[0], b[1], 0.0], [b[0], b[1], height], [a[0], a[1], height]]);
        normals.extend_from_slice(&[n; 4]);
        indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
    }

    let base = positions.len() as u32;
    positions.extend(ring.iter().map(|p| [p[0], p[1], height]));
    normals.extend_from_slice(&[[0.0, 0.0, 1.0]; 4]);
    indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);

    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default());
    mesh.insert_attribute(Mesh::ATTRIBUTE_POSITION, positions);
    mesh.insert_attribute(Mesh::ATTRIBUTE_NORMAL, normals);
    mesh.insert_indices(Indices::U32(indices));
    mesh
}
