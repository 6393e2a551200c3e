//! Stitching tiles into one texture and mapping terrain vertices onto it.

use bevy::prelude::*;
use bevy::render::render_resource::{Extent3d, TextureDimension, TextureFormat};

use crate::bisect::mesh_positions;
use crate::constants::{DEFAULT_TILE_HEIGHT, DEFAULT_TILE_WIDTH};
use crate::error::ImportError;
use crate::geo::{LocalPoint, Projection};
use crate::overlay::{TileFetch, TileGridExtent, TilePixels, TileProvider};

/// Pixel size of a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileSize {
    pub width: u32,
    pub height: u32,
}

impl Default for TileSize {
    fn default() -> Self {
        Self {
            width: DEFAULT_TILE_WIDTH,
            height: DEFAULT_TILE_HEIGHT,
        }
    }
}

/// Stitched overlay, RGBA8 with rows ordered bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MosaicImage {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl MosaicImage {
    /// Fully transparent image.
    pub fn blank(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            data: vec![0; width as usize * height as usize * 4],
        }
    }

    /// Pixel at column `x`, row `y` counted from the bottom.
    pub fn pixel(&self, x: u32, y: u32) -> [u8; 4] {
        let i = (y as usize * self.width as usize + x as usize) * 4;
        [self.data[i], self.data[i + 1], self.data[i + 2], self.data[i + 3]]
    }

    /// Pixel data with rows reordered top-down.
    pub fn top_down_rows(&self) -> Vec<u8> {
        let stride = self.width as usize * 4;
        if stride == 0 {
            return Vec::new();
        }
        self.data.chunks_exact(stride).rev().flatten().copied().collect()
    }

    /// Bevy texture of the mosaic (top-left origin).
    pub fn to_image(&self) -> Image {
        Image::new(
            Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
            TextureDimension::D2,
            self.top_down_rows(),
            TextureFormat::Rgba8UnormSrgb,
            default(),
        )
    }

    /// Copies a tile in at tile column `col` and tile row `row`, both
    /// counted in the bottom-up image.
    fn blit(&mut self, tile: &TilePixels, col: u32, row: u32) {
        let stride = self.width as usize * 4;
        let tile_stride = tile.width as usize * 4;
        let x0 = col as usize * tile_stride;
        for r in 0..tile.height {
            let dst_row = row as usize * tile.height as usize + r as usize;
            let start = dst_row * stride + x0;
            self.data[start..start + tile_stride].copy_from_slice(tile.row(r));
        }
    }
}

/// Fetches every tile of `grid` and copies it into a single image.
///
/// Tiles that fail or whose pixels don't match `tile_size` are left
/// transparent;
/// the mosaic is always produced.
pub fn assemble(grid: &TileGridExtent, tile_size: TileSize, provider: &mut impl TileProvider) -> MosaicImage {
    let num_x = grid.num_tiles_x();
    let num_y = grid.num_tiles_y();
    let mut mosaic = MosaicImage::blank(num_x * tile_size.width, num_y * tile_size.height);
    let total = grid.tile_count();
    let mut failed = 0;

    for (seq, address) in grid.addresses().enumerate() {
        let seq = seq as u64;
        info!("Fetching the tile {} ({} of {})", provider.source(address, seq), seq + 1, total);
        match provider.fetch(address, seq) {
            TileFetch::Ready(pixels) if !pixels.is_complete() => {
                warn!(
                    "Tile {} has {} bytes of pixel data, expected {}; leaving it blank",
                    address,
                    pixels.data.len(),
                    pixels.width as usize * pixels.height as usize * 4
                );
                failed += 1;
            }
            TileFetch::Ready(pixels) if pixels.width == tile_size.width && pixels.height == tile_size.height => {
                // Tile rows count down from the north, image rows count up
                let row = num_y - 1 - (address.y - grid.top);
                mosaic.blit(&pixels, address.x - grid.left, row);
            }
            TileFetch::Ready(pixels) => {
                warn!(
                    "Tile {} is {}x{}, expected {}x{}; leaving it blank",
                    address, pixels.width, pixels.height, tile_size.width, tile_size.height
                );
                failed += 1;
            }
            TileFetch::NetworkError(e) | TileFetch::DecodeError(e) => {
                warn!("Tile {} left blank: {}", address, e);
                failed += 1;
            }
        }
    }

    if failed > 0 {
        warn!("{} of {} tiles missing from the overlay", failed, total);
    } else {
        info!("Assembled {}x{} overlay from {} tiles", mosaic.width, mosaic.height, total);
    }
    mosaic
}

/// Texture coordinates of `positions` (local to `transform`) within the
/// mosaic covering `grid`. `v` runs from the bottom edge.
pub fn project_uv(
    positions: &[[f32; 3]],
    transform: &Transform,
    projection: &impl Projection,
    grid: &TileGridExtent,
) -> Vec<[f32; 2]> {
    let (sw, ne) = grid.mercator_extent();
    let width = ne.x - sw.x;
    let height = ne.y - sw.y;
    positions
        .iter()
        .map(|p| {
            let world = LocalPoint(Vec3::from(*p)).to_world(transform);
            let m = projection.to_geographic(world).to_mercator();
            [((m.x - sw.x) / width) as f32, ((m.y - sw.y) / height) as f32]
        })
        .collect()
}

/// Writes `UV_0` on the terrain mesh so the texture from
/// [`MosaicImage::to_image`] lines up.
pub fn apply_terrain_uvs(
    mesh: &mut Mesh,
    transform: &Transform,
    projection: &impl Projection,
    grid: &TileGridExtent,
) -> Result<(), ImportError> {
    let positions = mesh_positions(mesh).ok_or(ImportError::TerrainWithoutPositions)?;
    let uvs: Vec<[f32; 2]> = project_uv(positions, transform, projection, grid)
        .into_iter()
        .map(|[u, v]| [u, 1.0 - v])
        .collect();
    mesh.insert_attribute(Mesh::ATTRIBUTE_UV_0, uvs);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bounds::GeoBounds;
    use crate::constants::HALF_EQUATOR;
    use crate::geo::{GeoPoint, MercatorPoint, TransverseMercator, WorldPoint};
    use crate::overlay::{resolve_zoom, TileAddress};

    const SIZE: TileSize = TileSize { width: 2, height: 2 };

    /// Solid tiles colored by address, bottom row marked with blue = 1.
    struct ColoredTiles {
        failing: Option<TileAddress>,
        seqs: Vec<u64>,
    }

    fn color(address: TileAddress) -> [u8; 4] {
        [address.x as u8 + 1, address.y as u8 + 1, 7, 255]
    }

    impl TileProvider for ColoredTiles {
        fn fetch(&mut self, address: TileAddress, request_seq: u64) -> TileFetch {
            self.seqs.push(request_seq);
            if self.failing == Some(address) {
                return TileFetch::NetworkError("timed out".into());
            }
            let mut data = Vec::new();
            for r in 0..SIZE.height {
                for _ in 0..SIZE.width {
                    let mut c = color(address);
                    if r == 0 {
                        c[2] = 1;
                    }
                    data.extend_from_slice(&c);
                }
            }
            TileFetch::Ready(TilePixels { width: SIZE.width, height: SIZE.height, data })
        }
    }

    fn grid() -> TileGridExtent {
        TileGridExtent { zoom: 6, left: 20, top: 10, right: 21, bottom: 11 }
    }

    fn zero_pixels(mosaic: &MosaicImage) -> usize {
        mosaic.data.chunks_exact(4).filter(|p| *p == [0, 0, 0, 0]).count()
    }

    #[test]
    fn complete_grid_leaves_no_gaps() {
        let mut provider = ColoredTiles { failing: None, seqs: Vec::new() };
        let mosaic = assemble(&grid(), SIZE, &mut provider);
        assert_eq!((mosaic.width, mosaic.height), (4, 4));
        assert_eq!(zero_pixels(&mosaic), 0);
        assert_eq!(provider.seqs, vec![0, 1, 2, 3]);
    }

    #[test]
    fn failed_tile_leaves_one_blank_region() {
        let failing = TileAddress::new(6, 21, 10);
        let mut provider = ColoredTiles { failing: Some(failing), seqs: Vec::new() };
        let mosaic = assemble(&grid(), SIZE, &mut provider);
        assert_eq!(zero_pixels(&mosaic), (SIZE.width * SIZE.height) as usize);
        // North-east tile sits top-right, i.e. the highest rows
        assert_eq!(mosaic.pixel(3, 3), [0, 0, 0, 0]);
        assert_eq!(mosaic.pixel(3, 1), color(TileAddress::new(6, 21, 11)));
    }

    /// Reports full-size tiles but only sends half of the pixel bytes.
    struct TruncatedTiles;

    impl TileProvider for TruncatedTiles {
        fn fetch(&mut self, _address: TileAddress, _request_seq: u64) -> TileFetch {
            TileFetch::Ready(TilePixels { width: SIZE.width, height: SIZE.height, data: vec![255; 8] })
        }
    }

    #[test]
    fn truncated_tile_data_is_left_blank() {
        let mosaic = assemble(&grid(), SIZE, &mut TruncatedTiles);
        assert_eq!((mosaic.width, mosaic.height), (4, 4));
        assert_eq!(zero_pixels(&mosaic), 16);
    }

    #[test]
    fn northern_tiles_land_in_upper_rows() {
        let mut provider = ColoredTiles { failing: None, seqs: Vec::new() };
        let mosaic = assemble(&grid(), SIZE, &mut provider);
        let north_west = color(TileAddress::new(6, 20, 10));
        let south_west = color(TileAddress::new(6, 20, 11));

        assert_eq!(mosaic.pixel(0, 3), north_west);
        // Bottom row of each tile stays at the bottom of its region
        assert_eq!(mosaic.pixel(0, 2)[2], 1);
        assert_eq!(mosaic.pixel(0, 1), south_west);
        assert_eq!(mosaic.pixel(0, 0)[2], 1);

        let top_down = mosaic.top_down_rows();
        assert_eq!(&top_down[..4], &north_west);
        let image = mosaic.to_image();
        assert_eq!((image.width(), image.height()), (4, 4));
    }

    /// Scene coordinates are Mercator meters.
    struct MercatorScene;

    impl Projection for MercatorScene {
        fn to_geographic(&self, point: WorldPoint) -> GeoPoint {
            MercatorPoint::new(point.0.x as f64, point.0.y as f64).to_geo()
        }

        fn from_geographic(&self, point: GeoPoint) -> WorldPoint {
            let m = point.to_mercator();
            WorldPoint(Vec3::new(m.x as f32, m.y as f32, 0.0))
        }
    }

    #[test]
    fn uvs_span_the_world_tile() {
        let grid = TileGridExtent { zoom: 0, left: 0, top: 0, right: 0, bottom: 0 };
        let h = HALF_EQUATOR as f32 * 0.999;
        let positions = [[-h, -h, 5.0], [0.0, 0.0, 0.0], [h, h, 12.0], [h / 2.0, -h / 2.0, 0.0]];
        let uvs = project_uv(&positions, &Transform::IDENTITY, &MercatorScene, &grid);
        let expected = [[0.0005, 0.0005], [0.5, 0.5], [0.9995, 0.9995], [0.74975, 0.25025]];
        for (uv, want) in uvs.iter().zip(expected) {
            assert!((uv[0] - want[0]).abs() < 1e-5 && (uv[1] - want[1]).abs() < 1e-5, "{:?} != {:?}", uv, want);
        }
    }

    #[test]
    fn grid_corners_map_to_texture_corners() {
        let origin = GeoPoint::new(37.6872, -97.3301);
        let bounds = GeoBounds::around(origin, 0.01).unwrap();
        let grid = resolve_zoom(&bounds, 19, 16).unwrap();
        let projection = TransverseMercator::new(origin);
        let (sw, ne) = grid.mercator_extent();

        let corners = [sw, ne].map(|m| projection.from_geographic(m.to_geo()).0.to_array());
        let uvs = project_uv(&corners, &Transform::IDENTITY, &projection, &grid);
        for (got, want) in uvs.iter().zip([[0.0, 0.0], [1.0, 1.0]]) {
            assert!((got[0] - want[0]).abs() < 1e-3 && (got[1] - want[1]).abs() < 1e-3, "{:?}", got);
        }
    }

    #[test]
    fn terrain_uvs_use_top_left_origin() {
        let grid = TileGridExtent { zoom: 0, left: 0, top: 0, right: 0, bottom: 0 };
        let bounds = crate::bounds::BoundingBox::new(-1000.0, -1000.0, 1000.0, 1000.0);
        let mut mesh = crate::terrain::height_field_mesh(&bounds, 1, |_, _| 0.0);
        apply_terrain_uvs(&mut mesh, &Transform::IDENTITY, &MercatorScene, &grid).unwrap();
        let Some(bevy::mesh::VertexAttributeValues::Float32x2(uvs)) = mesh.attribute(Mesh::ATTRIBUTE_UV_0) else {
            panic!("missing uvs");
        };
        // First vertex is the south-west corner: left edge, just below the middle
        assert!(uvs[0][0] < 0.5 && uvs[0][1] > 0.5);
        assert_eq!(uvs.len(), 4);
    }
}
