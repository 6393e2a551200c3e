//! Clips flat layer meshes to the terrain and cuts them into narrow slices.
//!
//! Boolean and shrinkwrap operations against a height field go wrong on big
//! flat faces: a face spanning a valley gets projected as one plane. Cutting
//! the mesh into slices no wider than `max_slice_width` on both horizontal
//! axes keeps each face small enough to follow the terrain.
//!
//! Axes are processed X first, then Y, each one on the result of the
//! previous. Per axis the mesh is first clipped to the terrain extent, then
//! subdivided by evenly spaced cuts.

use bevy::prelude::*;

use crate::bisect::{BisectMesh, ClearSide};
use crate::bounds::{Axis, BoundingBox};
use crate::error::SliceError;

/// Slicing parameters for one axis of one mesh, in the mesh's local space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SliceRequest {
    pub axis: Axis,
    pub terrain_min: f64,
    pub terrain_max: f64,
    pub max_slice_width: f64,
}

impl SliceRequest {
    /// Converts the terrain's world extent on `axis` into the local space of
    /// a mesh whose origin sits at `mesh_origin`.
    pub fn new(axis: Axis, terrain: &BoundingBox, mesh_origin: Vec3, max_slice_width: f64) -> Self {
        let offset = axis.component(mesh_origin) as f64;
        Self {
            axis,
            terrain_min: terrain.min(axis) - offset,
            terrain_max: terrain.max(axis) - offset,
            max_slice_width,
        }
    }
}

/// A single bisection applied to the mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CutPlane {
    pub axis: Axis,
    /// Position of the plane along `axis`, in mesh local space
    pub coord: f64,
    pub clear: ClearSide,
}

impl CutPlane {
    pub fn origin(&self) -> Vec3 {
        self.axis.point_at(self.coord)
    }

    pub fn normal(&self) -> Vec3 {
        self.axis.normal()
    }

    pub fn is_clip(&self) -> bool {
        self.clear != ClearSide::Keep
    }
}

/// Plans the cuts for one axis given the mesh's current extent on it.
///
/// Clip cuts come first (terrain minimum, then maximum), followed by the
/// interior subdivision cuts in increasing order.
pub fn plan_axis(request: &SliceRequest, mesh_min: f64, mesh_max: f64) -> Vec<CutPlane> {
    let axis = request.axis;
    let mut cuts = Vec::new();
    let mut min = mesh_min;
    let mut max = mesh_max;

    if min < request.terrain_min {
        min = request.terrain_min;
        cuts.push(CutPlane { axis, coord: min, clear: ClearSide::Inner });
    }
    if max > request.terrain_max {
        max = request.terrain_max;
        cuts.push(CutPlane { axis, coord: max, clear: ClearSide::Outer });
    }

    let width = max - min;
    if width > request.max_slice_width {
        let num_slices = (width / request.max_slice_width).ceil() as usize;
        let slice_width = width / num_slices as f64;
        cuts.extend((1..num_slices).map(|k| CutPlane {
            axis,
            coord: min + k as f64 * slice_width,
            clear: ClearSide::Keep,
        }));
    }
    cuts
}

/// Clips `mesh` to `terrain` and slices it on both horizontal axes.
///
/// `mesh_origin` is the world position of the mesh's local origin. Returns
/// every cut in the order it was applied. A mesh lying completely outside the
/// terrain ends up empty; that is not an error.
pub fn slice<M: BisectMesh>(
    mesh: &mut M,
    mesh_origin: Vec3,
    terrain: &BoundingBox,
    max_slice_width: f64,
) -> Result<Vec<CutPlane>, SliceError> {
    if !max_slice_width.is_finite() || max_slice_width <= 0.0 {
        return Err(SliceError::InvalidSliceWidth(max_slice_width));
    }

    let mut applied = Vec::new();
    for axis in Axis::HORIZONTAL {
        let Some((min, max)) = mesh.local_bounds() else {
            debug!("Mesh is empty before slicing along {:?}, nothing to cut", axis);
            break;
        };
        let request = SliceRequest::new(axis, terrain, mesh_origin, max_slice_width);
        let cuts = plan_axis(&request, axis.component(min) as f64, axis.component(max) as f64);
        for cut in &cuts {
            mesh.bisect_plane(cut.origin(), cut.normal(), cut.clear)?;
        }
        applied.extend(cuts);
    }

    if mesh.local_bounds().is_none() {
        info!("Mesh lies outside the terrain and was clipped away");
    }
    Ok(applied)
}
