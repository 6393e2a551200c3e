//! Axis-aligned extents in the scene plane and on the globe.

use bevy::prelude::*;

use crate::error::ConfigError;
use crate::geo::GeoPoint;

/// One of the two horizontal scene axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Axis {
    X,
    Y,
}

impl Axis {
    pub const HORIZONTAL: [Axis; 2] = [Axis::X, Axis::Y];

    pub fn index(self) -> usize {
        match self {
            Axis::X => 0,
            Axis::Y => 1,
        }
    }

    /// Unit normal of a cut plane perpendicular to this axis.
    pub fn normal(self) -> Vec3 {
        match self {
            Axis::X => Vec3::X,
            Axis::Y => Vec3::Y,
        }
    }

    /// Point on the axis at `coord`, zero elsewhere.
    pub fn point_at(self, coord: f64) -> Vec3 {
        self.normal() * coord as f32
    }

    pub fn component(self, v: Vec3) -> f32 {
        v[self.index()]
    }
}

/// 2D axis-aligned box in local planar meters. `min <= max` on both axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Builds a box from two opposite corners in any order.
    pub fn new(x0: f64, y0: f64, x1: f64, y1: f64) -> Self {
        Self {
            min_x: x0.min(x1),
            max_x: x0.max(x1),
            min_y: y0.min(y1),
            max_y: y0.max(y1),
        }
    }

    /// Smallest box containing all `points`, or `None` for an empty iterator.
    pub fn from_points(points: impl IntoIterator<Item = Vec3>) -> Option<Self> {
        let mut points = points.into_iter();
        let first = points.next()?;
        let mut b = Self::new(first.x as f64, first.y as f64, first.x as f64, first.y as f64);
        for p in points {
            b.min_x = b.min_x.min(p.x as f64);
            b.max_x = b.max_x.max(p.x as f64);
            b.min_y = b.min_y.min(p.y as f64);
            b.max_y = b.max_y.max(p.y as f64);
        }
        Some(b)
    }

    pub fn min(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.min_x,
            Axis::Y => self.min_y,
        }
    }

    pub fn max(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.max_x,
            Axis::Y => self.max_y,
        }
    }

    pub fn width(&self, axis: Axis) -> f64 {
        self.max(axis) - self.min(axis)
    }

    pub fn center(&self) -> Vec2 {
        Vec2::new(
            ((self.min_x + self.max_x) / 2.0) as f32,
            ((self.min_y + self.max_y) / 2.0) as f32,
        )
    }
}

/// Geographic rectangle in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBounds {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBounds {
    /// Rejects rectangles with zero or negative extent on either axis.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Result<Self, ConfigError> {
        let finite = [south, west, north, east].iter().all(|v| v.is_finite());
        if !finite || north <= south || east <= west {
            return Err(ConfigError::EmptyArea { south, west, north, east });
        }
        Ok(Self { south, west, north, east })
    }

    /// Square area of `half_span` degrees around `center`.
    pub fn around(center: GeoPoint, half_span: f64) -> Result<Self, ConfigError> {
        Self::new(
            center.lat - half_span,
            center.lon - half_span,
            center.lat + half_span,
            center.lon + half_span,
        )
    }

    pub fn south_west(&self) -> GeoPoint {
        GeoPoint::new(self.south, self.west)
    }

    pub fn north_east(&self) -> GeoPoint {
        GeoPoint::new(self.north, self.east)
    }

    pub fn center(&self) -> GeoPoint {
        GeoPoint::new((self.south + self.north) / 2.0, (self.west + self.east) / 2.0)
    }
}
