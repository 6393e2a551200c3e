//! Zoom level selection under a tile budget.

use bevy::prelude::*;

use crate::bounds::GeoBounds;
use crate::constants::EQUATOR;
use crate::error::ZoomError;
use crate::overlay::TileGridExtent;

/// Picks the deepest zoom (up to `max_zoom`) whose tile grid over `bounds`
/// has at most `max_tiles` tiles, and returns that grid.
///
/// A closed-form estimate from the projected area gives the starting point;
/// integer tile counts then decide the final level, stepping up while the
/// next level still fits and down while the current one doesn't.
pub fn resolve_zoom(bounds: &GeoBounds, max_zoom: u8, max_tiles: u32) -> Result<TileGridExtent, ZoomError> {
    if max_tiles == 0 {
        return Err(ZoomError::ZeroTileBudget);
    }

    let sw = bounds.south_west().to_mercator();
    let ne = bounds.north_east().to_mercator();
    let area = (ne.x - sw.x) * (ne.y - sw.y);
    if !(area > 0.0) {
        return Err(ZoomError::ZeroArea);
    }

    let estimate = (0.5 * (max_tiles as f64 * EQUATOR * EQUATOR / area).log2()).floor();
    let grid_at = |zoom: u8| TileGridExtent::covering(sw, ne, zoom);

    let mut zoom = if estimate >= max_zoom as f64 {
        max_zoom
    } else {
        let mut zoom = estimate.max(0.0) as u8;
        while zoom < max_zoom && grid_at(zoom + 1).tile_count() <= max_tiles as u64 {
            zoom += 1;
        }
        zoom
    };

    // The estimate ignores partial tiles at the edges and can overshoot
    let mut grid = grid_at(zoom);
    while zoom > 0 && grid.tile_count() > max_tiles as u64 {
        zoom -= 1;
        grid = grid_at(zoom);
    }

    info!(
        "Selected zoom {} for the overlay: {}x{} tiles (budget {})",
        zoom,
        grid.num_tiles_x(),
        grid.num_tiles_y(),
        max_tiles
    );
    Ok(grid)
}
