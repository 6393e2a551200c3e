//! One import run: overlay texture and UVs for the terrain, slicing and drape
//! steps for every flat layer.

use bevy::prelude::*;

use crate::bounds::{BoundingBox, GeoBounds};
use crate::config::DrapeConfig;
use crate::error::{ImportError, SliceError};
use crate::geo::{GeoPoint, Projection};
use crate::layer::{finalize_layer, LayerOutcome, LayerPlacement, LayerSettings};
use crate::overlay::{
    apply_terrain_uvs, assemble, resolve_zoom, HttpTransport, MosaicImage, OverlayFetcher, TileGridExtent,
    TileProvider,
};
use crate::terrain::Terrain;
use crate::tile_cache::TileCache;

/// Overlay produced for a terrain mesh.
#[derive(Debug, Clone)]
pub struct OverlayImport {
    pub grid: TileGridExtent,
    pub image: MosaicImage,
}

/// Scene-space rectangle covering a geographic area.
pub fn scene_bounds(bounds: &GeoBounds, projection: &impl Projection) -> BoundingBox {
    let corners = [
        bounds.south_west(),
        bounds.north_east(),
        GeoPoint::new(bounds.south, bounds.east),
        GeoPoint::new(bounds.north, bounds.west),
    ];
    let points = corners.map(|c| projection.from_geographic(c).0);
    BoundingBox::from_points(points).unwrap_or(BoundingBox::new(0.0, 0.0, 0.0, 0.0))
}

/// Cache-first HTTP tile fetcher for the configured provider.
pub fn http_fetcher(config: &DrapeConfig) -> Result<OverlayFetcher<HttpTransport>, ImportError> {
    let template = config.tile_template()?;
    let cache = TileCache::for_template(&template);
    info!("Tile cache for {:?} at {:?}", config.overlay.provider, cache.root());
    Ok(OverlayFetcher::new(template, cache, HttpTransport::new()?, config.tile_size()))
}

/// Builds the overlay mosaic for the configured area and writes matching
/// UVs on `terrain_mesh`.
///
/// Configuration problems abort before any tile is requested. Individual
/// tile failures only leave blank patches in the image.
pub fn import_overlay(
    config: &DrapeConfig,
    terrain_mesh: &mut Mesh,
    terrain_transform: &Transform,
    projection: &impl Projection,
    provider: &mut impl TileProvider,
) -> Result<OverlayImport, ImportError> {
    config.validate()?;
    let bounds = config.geo_bounds()?;
    let grid = resolve_zoom(&bounds, config.max_zoom(), config.overlay.max_tiles)?;
    let image = assemble(&grid, config.tile_size(), provider);
    apply_terrain_uvs(terrain_mesh, terrain_transform, projection, &grid)?;
    Ok(OverlayImport { grid, image })
}

/// Terrain description for layer placement, measured from its mesh.
pub fn measure_terrain(
    terrain_mesh: &Mesh,
    terrain_transform: &Transform,
    config: &DrapeConfig,
) -> Result<Terrain, ImportError> {
    Terrain::from_mesh(terrain_mesh, terrain_transform, config.terrain.layer_offset)
        .ok_or(ImportError::TerrainWithoutPositions)
}

/// Result of importing one flat layer mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerImport {
    pub placement: LayerPlacement,
    pub outcome: LayerOutcome,
}

/// Places a flat layer mesh above the terrain and prepares it for draping.
pub fn import_layer(
    layer_id: &str,
    mesh: &mut Mesh,
    terrain: Option<&mut Terrain>,
    settings: &LayerSettings,
) -> Result<LayerImport, SliceError> {
    let placement = LayerPlacement::new(layer_id, terrain.as_deref(), settings);
    let outcome = finalize_layer(mesh, &placement, terrain, settings)?;
    debug!(
        "Layer {}: {} cuts, {} drape steps",
        layer_id,
        outcome.cuts.len(),
        outcome.steps.len()
    );
    Ok(LayerImport { placement, outcome })
}
