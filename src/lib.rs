//! Drapes web-map tile imagery and flat layer geometry over a terrain height field.
//!
//! Two independent pieces do the real work:
//! - [`slicer`] clips flat meshes to the terrain extent and cuts them into
//!   bounded slices so they project cleanly onto the terrain surface.
//! - [`overlay`] picks a zoom level for a geographic area, fetches tiles
//!   cache-first and stitches them into one texture with matching UVs.
//!
//! [`importer`] wires both together; [`plugin`] hosts the result in a Bevy app.

pub mod bisect;
pub mod bounds;
pub mod config;
pub mod error;
pub mod geo;
pub mod importer;
pub mod layer;
pub mod overlay;
pub mod plugin;
pub mod slicer;
pub mod terrain;
pub mod tile_cache;

pub use bounds::{Axis, BoundingBox, GeoBounds};
pub use config::DrapeConfig;
pub use error::ImportError;
pub use geo::{GeoPoint, MercatorPoint, Projection, TileCoord, TransverseMercator};
pub use importer::{import_overlay, OverlayImport};
pub use overlay::{MosaicImage, TileAddress, TileGridExtent};
pub use plugin::DrapePlugin;
pub use slicer::{slice, CutPlane};

// =============================================================================
// Constants
// =============================================================================

pub mod constants {
    /// Equatorial radius used by web-map spherical Mercator (meters)
    pub const EARTH_RADIUS: f64 = 6_378_137.0;

    pub const HALF_EQUATOR: f64 = std::f64::consts::PI * EARTH_RADIUS;

    pub const EQUATOR: f64 = 2.0 * HALF_EQUATOR;

    // Mercator projection limits
    pub const MERCATOR_LAT_LIMIT: f64 = 85.0511;

    // Tile defaults (pixels)
    pub const DEFAULT_TILE_WIDTH: u32 = 256;
    pub const DEFAULT_TILE_HEIGHT: u32 = 256;

    /// Tile budget for one mosaic, i.e. 4096x4096 pixels with 256px tiles
    pub const DEFAULT_MAX_TILES: u32 = 256;

    pub const DEFAULT_MAX_ZOOM: u8 = 19;

    /// Upper bound on `max_tiles * tile_width * tile_height`, 16384x16384 pixels
    pub const MAX_MOSAIC_PIXELS: u64 = 1 << 28;

    /// Default maximum slice width for flat layers (meters)
    pub const DEFAULT_SLICE_WIDTH: f64 = 2.0;

    /// Vertices closer than this to a cut plane count as lying on it
    pub const PLANE_EPSILON: f32 = 1e-5;

    // Default scene origin and area (Wichita, KS)
    pub const DEFAULT_LATITUDE: f64 = 37.6872;
    pub const DEFAULT_LONGITUDE: f64 = -97.3301;
    pub const DEFAULT_AREA_HALF_SPAN_DEG: f64 = 0.005;

    pub const HTTP_TIMEOUT_SECS: u64 = 30;
    pub const USER_AGENT: &str = concat!("terrain_drape/", env!("CARGO_PKG_VERSION"));
}

/// Clamp latitude to valid Mercator projection range
pub fn clamp_latitude(lat: f64) -> f64 {
    lat.clamp(-constants::MERCATOR_LAT_LIMIT, constants::MERCATOR_LAT_LIMIT)
}

/// Clamp longitude to valid range
pub fn clamp_longitude(lon: f64) -> f64 {
    lon.clamp(-180.0, 180.0)
}
