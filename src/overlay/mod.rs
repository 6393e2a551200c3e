//! Tile overlay: zoom selection, tile fetching and mosaic stitching.
//!
//! An import picks the deepest zoom whose tile grid over the requested area
//! stays within the tile budget ([`zoom`]), fetches every tile of that grid
//! cache-first ([`fetch`]), copies them into one image and computes terrain
//! UVs against the mosaic's extent ([`mosaic`]).

pub mod fetch;
pub mod mosaic;
pub mod url;
pub mod zoom;

pub use fetch::{HttpTransport, OverlayFetcher, TileFetch, TilePixels, TileProvider, TileTransport};
pub use mosaic::{apply_terrain_uvs, assemble, project_uv, MosaicImage, TileSize};
pub use url::TileUrlTemplate;
pub use zoom::resolve_zoom;

use crate::geo::{MercatorPoint, TileCoord};

/// Address of one tile in the pyramid. Also the cache key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TileAddress {
    pub zoom: u8,
    pub x: u32,
    pub y: u32,
}

impl TileAddress {
    pub fn new(zoom: u8, x: u32, y: u32) -> Self {
        Self { zoom, x, y }
    }
}

impl std::fmt::Display for TileAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Inclusive tile range covering an area at one zoom level. Rows count
/// down from the north, so `top <= bottom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileGridExtent {
    pub zoom: u8,
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl TileGridExtent {
    /// Tiles covering the Mercator rectangle spanned by its south-west and
    /// north-east corners.
    pub fn covering(south_west: MercatorPoint, north_east: MercatorPoint, zoom: u8) -> Self {
        let sw = south_west.to_tile_coord(zoom);
        let ne = north_east.to_tile_coord(zoom);
        Self {
            zoom,
            left: sw.tile_x(),
            top: ne.tile_y(),
            right: ne.tile_x(),
            bottom: sw.tile_y(),
        }
    }

    pub fn num_tiles_x(&self) -> u32 {
        self.right - self.left + 1
    }

    pub fn num_tiles_y(&self) -> u32 {
        self.bottom - self.top + 1
    }

    pub fn tile_count(&self) -> u64 {
        self.num_tiles_x() as u64 * self.num_tiles_y() as u64
    }

    /// Every tile of the grid, row by row from the north.
    pub fn addresses(&self) -> impl Iterator<Item = TileAddress> + '_ {
        (self.top..=self.bottom)
            .flat_map(move |y| (self.left..=self.right).map(move |x| TileAddress::new(self.zoom, x, y)))
    }

    /// Mercator corners (south-west, north-east) of the area the grid's
    /// tiles actually cover.
    pub fn mercator_extent(&self) -> (MercatorPoint, MercatorPoint) {
        let sw = TileCoord::new(self.zoom, self.left as f64, (self.bottom + 1) as f64).to_mercator();
        let ne = TileCoord::new(self.zoom, (self.right + 1) as f64, self.top as f64).to_mercator();
        (sw, ne)
    }
}
