//! Cache-first tile fetching.
//!
//! Failures never propagate: a tile that can't be downloaded or decoded comes
//! back as a [`TileFetch`] error variant and its mosaic region stays blank.

use std::time::Duration;

use bevy::prelude::*;
use image::imageops::{self, FilterType};

use crate::constants::{HTTP_TIMEOUT_SECS, USER_AGENT};
use crate::overlay::{TileAddress, TileSize, TileUrlTemplate};
use crate::tile_cache::TileCache;

/// Blocking byte transport for tile requests.
pub trait TileTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, String>;
}

/// HTTP transport with a fixed user agent and request timeout.
pub struct HttpTransport {
    client: reqwest::blocking::Client,
}

impl HttpTransport {
    pub fn new() -> Result<Self, reqwest::Error> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECS))
            .build()?;
        Ok(Self { client })
    }
}

impl TileTransport for HttpTransport {
    fn get(&self, url: &str) -> Result<Vec<u8>, String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| format!("Download failed: {}", e))?;

        if !response.status().is_success() {
            return Err(format!("HTTP error: {}", response.status()));
        }

        let bytes = response
            .bytes()
            .map_err(|e| format!("Failed to read response: {}", e))?;
        Ok(bytes.to_vec())
    }
}

/// Decoded tile, RGBA8 with rows ordered bottom-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TilePixels {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl TilePixels {
    /// Whether `data` holds exactly `width * height` RGBA8 pixels.
    pub fn is_complete(&self) -> bool {
        self.data.len() == self.width as usize * self.height as usize * 4
    }

    /// Bytes of row `row`, counted from the bottom.
    pub fn row(&self, row: u32) -> &[u8] {
        let stride = self.width as usize * 4;
        let start = row as usize * stride;
        &self.data[start..start + stride]
    }
}

/// Outcome of fetching one tile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TileFetch {
    Ready(TilePixels),
    NetworkError(String),
    DecodeError(String),
}

/// Anything that can produce tile pixels for an address.
pub trait TileProvider {
    /// `request_seq` numbers the requests of one mosaic from 0 and selects
    /// the provider subdomain.
    fn fetch(&mut self, address: TileAddress, request_seq: u64) -> TileFetch;

    /// Where the tile for `address` comes from, for progress messages.
    fn source(&self, address: TileAddress, _request_seq: u64) -> String {
        address.to_string()
    }
}

/// Fetches tiles from the cache, falling back to the network.
pub struct OverlayFetcher<T: TileTransport> {
    template: TileUrlTemplate,
    cache: TileCache,
    transport: T,
    tile_size: TileSize,
}

impl<T: TileTransport> OverlayFetcher<T> {
    pub fn new(template: TileUrlTemplate, cache: TileCache, transport: T, tile_size: TileSize) -> Self {
        Self {
            template,
            cache,
            transport,
            tile_size,
        }
    }

    fn download(&self, address: TileAddress, request_seq: u64) -> TileFetch {
        let url = self.template.url(address, request_seq);

        let bytes = match self.transport.get(&url) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to download the tile {}: {}", url, e);
                return TileFetch::NetworkError(e);
            }
        };

        let pixels = match decode_tile(&bytes, self.tile_size) {
            Ok(pixels) => pixels,
            Err(e) => {
                warn!("Failed to decode the tile {}: {}", url, e);
                return TileFetch::DecodeError(e);
            }
        };

        if let Err(e) = self.cache.write(address, &bytes) {
            warn!("Failed to cache the tile {}: {}", address, e);
        }
        TileFetch::Ready(pixels)
    }
}

impl<T: TileTransport> TileProvider for OverlayFetcher<T> {
    fn source(&self, address: TileAddress, request_seq: u64) -> String {
        if self.cache.contains(address) {
            format!("{} (cached)", self.cache.tile_path(address).display())
        } else {
            self.template.url(address, request_seq)
        }
    }

    fn fetch(&mut self, address: TileAddress, request_seq: u64) -> TileFetch {
        let Some(bytes) = self.cache.read(address) else {
            return self.download(address, request_seq);
        };
        match decode_tile(&bytes, self.tile_size) {
            Ok(pixels) => TileFetch::Ready(pixels),
            Err(e) => {
                warn!("Failed to decode the cached tile {:?}: {}", self.cache.tile_path(address), e);
                TileFetch::DecodeError(e)
            }
        }
    }
}

/// Decode PNG/JPEG bytes to bottom-up RGBA8, resized to `size` if the
/// provider served a different resolution.
pub fn decode_tile(bytes: &[u8], size: TileSize) -> Result<TilePixels, String> {
    let mut rgba = image::load_from_memory(bytes)
        .map_err(|e| format!("Failed to decode image: {}", e))?
        .to_rgba8();

    if rgba.dimensions() != (size.width, size.height) {
        debug!(
            "Resizing tile from {}x{} to {}x{}",
            rgba.width(),
            rgba.height(),
            size.width,
            size.height
        );
        rgba = imageops::resize(&rgba, size.width, size.height, FilterType::Triangle);
    }
    imageops::flip_vertical_in_place(&mut rgba);

    Ok(TilePixels {
        width: size.width,
        height: size.height,
        data: rgba.into_raw(),
    })
}

/// PNG bytes of a `width`x`height` image filled with `color`, top row
/// painted `top` when given.
#[cfg(test)]
pub(crate) fn png_fixture(width: u32, height: u32, color: [u8; 4], top: Option<[u8; 4]>) -> Vec<u8> {
    let img = image::RgbaImage::from_fn(width, height, |_, y| match top {
        Some(top) if y == 0 => image::Rgba(top),
        _ => image::Rgba(color),
    });
    let mut bytes = Vec::new();
    img.write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    /// Serves the same bytes for every URL and records requests.
    struct FakeTransport {
        response: Result<Vec<u8>, String>,
        urls: RefCell<Vec<String>>,
    }

    impl FakeTransport {
        fn new(response: Result<Vec<u8>, String>) -> Self {
            Self { response, urls: RefCell::new(Vec::new()) }
        }
    }

    impl TileTransport for FakeTransport {
        fn get(&self, url: &str) -> Result<Vec<u8>, String> {
            self.urls.borrow_mut().push(url.to_string());
            self.response.clone()
        }
    }

    const SIZE: TileSize = TileSize { width: 4, height: 4 };

    fn fetcher(dir: &std::path::Path, response: Result<Vec<u8>, String>) -> OverlayFetcher<FakeTransport> {
        let template = TileUrlTemplate::parse("http://{a,b}.tiles.test/{z}/{x}/{y}.png").unwrap();
        OverlayFetcher::new(template, TileCache::new(dir, "png"), FakeTransport::new(response), SIZE)
    }

    #[test]
    fn miss_downloads_and_persists() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(dir.path(), Ok(png_fixture(4, 4, [10, 20, 30, 255], None)));

        let first = TileAddress::new(5, 3, 7);
        let second = TileAddress::new(5, 4, 7);
        assert!(matches!(fetcher.fetch(first, 0), TileFetch::Ready(_)));
        assert!(matches!(fetcher.fetch(second, 1), TileFetch::Ready(_)));

        assert_eq!(
            *fetcher.transport.urls.borrow(),
            vec!["http://a.tiles.test/5/3/7.png", "http://b.tiles.test/5/4/7.png"]
        );
        assert!(fetcher.cache.contains(first));
        assert!(fetcher.cache.contains(second));
    }

    #[test]
    fn cache_hit_skips_the_network() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(dir.path(), Err("offline".into()));
        let address = TileAddress::new(2, 1, 1);
        fetcher.cache.write(address, &png_fixture(4, 4, [1, 2, 3, 255], None)).unwrap();

        match fetcher.fetch(address, 0) {
            TileFetch::Ready(pixels) => assert_eq!(&pixels.data[..4], &[1, 2, 3, 255]),
            other => panic!("expected pixels, got {:?}", other),
        }
        assert!(fetcher.transport.urls.borrow().is_empty());
    }

    #[test]
    fn source_names_the_url_until_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(dir.path(), Ok(png_fixture(4, 4, [10, 20, 30, 255], None)));
        let address = TileAddress::new(5, 3, 7);

        assert_eq!(fetcher.source(address, 1), "http://b.tiles.test/5/3/7.png");
        fetcher.fetch(address, 1);
        assert!(fetcher.source(address, 1).ends_with("(cached)"));
    }

    #[test]
    fn short_pixel_buffer_is_incomplete() {
        let full = TilePixels { width: 2, height: 2, data: vec![0; 16] };
        assert!(full.is_complete());
        let short = TilePixels { data: vec![0; 8], ..full };
        assert!(!short.is_complete());
    }

    #[test]
    fn network_failure_is_reported_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(dir.path(), Err("HTTP error: 404 Not Found".into()));
        let address = TileAddress::new(2, 0, 0);
        assert_eq!(
            fetcher.fetch(address, 0),
            TileFetch::NetworkError("HTTP error: 404 Not Found".into())
        );
        assert!(!fetcher.cache.contains(address));
    }

    #[test]
    fn undecodable_download_is_not_cached() {
        let dir = tempfile::tempdir().unwrap();
        let mut fetcher = fetcher(dir.path(), Ok(b"<html>rate limited</html>".to_vec()));
        let address = TileAddress::new(2, 0, 0);
        assert!(matches!(fetcher.fetch(address, 0), TileFetch::DecodeError(_)));
        assert!(!fetcher.cache.contains(address));
    }

    #[test]
    fn decoded_rows_run_bottom_up() {
        let red = [255, 0, 0, 255];
        let blue = [0, 0, 255, 255];
        let pixels = decode_tile(&png_fixture(2, 3, blue, Some(red)), TileSize { width: 2, height: 3 }).unwrap();
        assert_eq!(pixels.row(0), &[blue, blue].concat()[..]);
        assert_eq!(pixels.row(2), &[red, red].concat()[..]);
    }

    #[test]
    fn mismatched_tiles_are_resized() {
        let pixels = decode_tile(&png_fixture(2, 2, [9, 9, 9, 255], None), SIZE).unwrap();
        assert_eq!((pixels.width, pixels.height), (4, 4));
        assert_eq!(pixels.data.len(), 4 * 4 * 4);
        assert!(pixels.data.chunks_exact(4).all(|p| p == [9, 9, 9, 255]));
    }
}
