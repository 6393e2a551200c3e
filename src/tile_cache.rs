/// On-disk tile cache.
///
/// Tiles live in the platform cache directory, one subdirectory per provider
/// (`~/.cache/terrain_drape/tiles/<provider>/<z>/<x>/<y>.png` on Linux).
/// Entries are written once and never invalidated.

use bevy::prelude::*;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::overlay::{TileAddress, TileUrlTemplate};

/// Returns the platform-appropriate tile cache directory.
///
/// - macOS:   `~/Library/Caches/terrain_drape/tiles`
/// - Linux:   `~/.cache/terrain_drape/tiles`
/// - Windows: `%LOCALAPPDATA%\terrain_drape\tiles`
pub fn tile_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from(".cache"))
        .join("terrain_drape")
        .join("tiles")
}

/// Raw tile bytes keyed by tile address.
#[derive(Debug, Clone)]
pub struct TileCache {
    root: PathBuf,
    extension: String,
}

impl TileCache {
    pub fn new(root: impl Into<PathBuf>, extension: &str) -> Self {
        Self {
            root: root.into(),
            extension: extension.to_string(),
        }
    }

    /// Cache for one provider under the shared tile cache directory.
    pub fn for_template(template: &TileUrlTemplate) -> Self {
        Self::new(tile_cache_dir().join(template.cache_subdir()), template.image_extension())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn tile_path(&self, address: TileAddress) -> PathBuf {
        self.root
            .join(address.zoom.to_string())
            .join(address.x.to_string())
            .join(format!("{}.{}", address.y, self.extension))
    }

    pub fn contains(&self, address: TileAddress) -> bool {
        self.tile_path(address).is_file()
    }

    /// Cached bytes, or `None` on a miss or an unreadable file.
    pub fn read(&self, address: TileAddress) -> Option<Vec<u8>> {
        let path = self.tile_path(address);
        if !path.is_file() {
            return None;
        }
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!("Failed to read cached tile {:?}: {}", path, e);
                None
            }
        }
    }

    pub fn write(&self, address: TileAddress, bytes: &[u8]) -> io::Result<PathBuf> {
        let path = self.tile_path(address);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, bytes)?;
        Ok(path)
    }
}
