//! Coordinate systems and the conversions between them.
//!
//! Four frames are in play and each has its own type so they can't be mixed
//! up by accident:
//! - [`GeoPoint`]: WGS84 latitude/longitude in degrees
//! - [`MercatorPoint`]: spherical Mercator meters, origin at (0°, 0°)
//! - [`TileCoord`]: fractional tile-pyramid coordinates at a zoom level,
//!   origin at the top-left corner of the world
//! - [`WorldPoint`] / [`LocalPoint`]: Z-up scene meters, either absolute or
//!   relative to an object's origin
//!
//! The scene itself is placed on the globe by a [`Projection`].

use bevy::prelude::*;

use crate::clamp_latitude;
use crate::constants::{EARTH_RADIUS, EQUATOR, HALF_EQUATOR};

// =============================================================================
// Geographic and Mercator
// =============================================================================

/// WGS84 position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Project onto spherical Mercator. Latitude is clamped to the range the
    /// projection can represent.
    pub fn to_mercator(self) -> MercatorPoint {
        let lat = clamp_latitude(self.lat);
        MercatorPoint {
            x: EARTH_RADIUS * self.lon.to_radians(),
            y: EARTH_RADIUS * (std::f64::consts::FRAC_PI_4 + lat.to_radians() / 2.0).tan().ln(),
        }
    }
}

/// Spherical Mercator position in meters. `x` grows east, `y` grows north.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MercatorPoint {
    pub x: f64,
    pub y: f64,
}

impl MercatorPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Inverse of [`GeoPoint::to_mercator`].
    pub fn to_geo(self) -> GeoPoint {
        let lat = 2.0 * (self.y / EARTH_RADIUS).exp().atan() - std::f64::consts::FRAC_PI_2;
        GeoPoint {
            lat: lat.to_degrees(),
            lon: (self.x / EARTH_RADIUS).to_degrees(),
        }
    }

    /// Convert to fractional tile coordinates. The tile origin is the
    /// top-left corner of the world, so `y` is flipped.
    pub fn to_tile_coord(self, zoom: u8) -> TileCoord {
        let scale = tiles_per_side(zoom) / EQUATOR;
        TileCoord {
            zoom,
            x: (self.x + HALF_EQUATOR) * scale,
            y: (HALF_EQUATOR - self.y) * scale,
        }
    }
}

// =============================================================================
// Tile Pyramid
// =============================================================================

/// Number of tiles along one side of the world at `zoom`.
pub fn tiles_per_side(zoom: u8) -> f64 {
    2f64.powi(zoom as i32)
}

/// Fractional position in the tile pyramid at a fixed zoom level.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TileCoord {
    pub zoom: u8,
    pub x: f64,
    pub y: f64,
}

impl TileCoord {
    pub fn new(zoom: u8, x: f64, y: f64) -> Self {
        Self { zoom, x, y }
    }

    /// Inverse of [`MercatorPoint::to_tile_coord`].
    pub fn to_mercator(self) -> MercatorPoint {
        let span = EQUATOR / tiles_per_side(self.zoom);
        MercatorPoint {
            x: self.x * span - HALF_EQUATOR,
            y: HALF_EQUATOR - self.y * span,
        }
    }

    /// Integer column of the tile containing this coordinate, clamped to the
    /// world.
    pub fn tile_x(self) -> u32 {
        clamp_tile_index(self.x, self.zoom)
    }

    /// Integer row of the tile containing this coordinate, clamped to the
    /// world.
    pub fn tile_y(self) -> u32 {
        clamp_tile_index(self.y, self.zoom)
    }
}

fn clamp_tile_index(coord: f64, zoom: u8) -> u32 {
    let max = tiles_per_side(zoom) - 1.0;
    coord.floor().clamp(0.0, max) as u32
}

// =============================================================================
// Scene Frames
// =============================================================================

/// Absolute Z-up scene position (x east, y north, z up), in meters.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct WorldPoint(pub Vec3);

/// Scene position relative to an object's origin.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct LocalPoint(pub Vec3);

impl WorldPoint {
    /// Express this point relative to `origin`, ignoring rotation and scale.
    pub fn relative_to(self, origin: Vec3) -> LocalPoint {
        LocalPoint(self.0 - origin)
    }
}

impl LocalPoint {
    pub fn to_world(self, transform: &Transform) -> WorldPoint {
        WorldPoint(transform.transform_point(self.0))
    }
}

// =============================================================================
// Scene Projection
// =============================================================================

/// Places the flat scene on the globe.
pub trait Projection {
    fn to_geographic(&self, point: WorldPoint) -> GeoPoint;

    /// Scene position of a geographic point, at height zero.
    fn from_geographic(&self, point: GeoPoint) -> WorldPoint;
}

/// Spherical transverse Mercator centred on the scene origin.
///
/// Distortion stays small within a few hundred kilometers of the origin,
/// which is all an imported scene ever covers.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransverseMercator {
    pub origin: GeoPoint,
    /// Scale factor on the central meridian
    pub k: f64,
}

impl TransverseMercator {
    pub fn new(origin: GeoPoint) -> Self {
        Self { origin, k: 1.0 }
    }

    fn radius(&self) -> f64 {
        self.k * EARTH_RADIUS
    }
}

impl Projection for TransverseMercator {
    fn to_geographic(&self, point: WorldPoint) -> GeoPoint {
        let x = point.0.x as f64 / self.radius();
        let y = point.0.y as f64 / self.radius();
        let d = y + self.origin.lat.to_radians();
        let lon = x.sinh().atan2(d.cos());
        let lat = (d.sin() / x.cosh()).asin();
        GeoPoint {
            lat: lat.to_degrees(),
            lon: self.origin.lon + lon.to_degrees(),
        }
    }

    fn from_geographic(&self, point: GeoPoint) -> WorldPoint {
        let lat = point.lat.to_radians();
        let lon = (point.lon - self.origin.lon).to_radians();
        let b = lon.sin() * lat.cos();
        let x = 0.5 * self.radius() * ((1.0 + b) / (1.0 - b)).ln();
        let y = self.radius() * (lat.sin().atan2(lat.cos() * lon.cos()) - self.origin.lat.to_radians());
        WorldPoint(Vec3::new(x as f32, y as f32, 0.0))
    }
}
