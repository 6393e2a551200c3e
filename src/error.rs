//! Error types for configuration-level failures.
//!
//! Per-tile failures never show up here: they are reported as
//! [`crate::overlay::TileFetch`] variants and leave a blank mosaic region.

use thiserror::Error;

/// A tile URL template that cannot address tiles.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("tile URL template is empty")]
    Empty,
    #[error("tile URL template {0:?} has neither a {{z}}/{{x}}/{{y}} placeholder nor a {{subdomain,...}} group")]
    NoPlaceholder(String),
    #[error("tile URL template {0:?} has an empty subdomain group")]
    EmptySubdomains(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error(transparent)]
    Template(#[from] TemplateError),
    #[error("geographic area has zero or negative extent (south {south}, west {west}, north {north}, east {east})")]
    EmptyArea {
        south: f64,
        west: f64,
        north: f64,
        east: f64,
    },
    #[error("max slice width must be a positive number, got {0}")]
    InvalidSliceWidth(f64),
    #[error("tile budget must be at least one tile")]
    ZeroTileBudget,
    #[error("tile dimensions must be non-zero, got {width}x{height}")]
    ZeroTileSize { width: u32, height: u32 },
    #[error("{max_tiles} tiles of {width}x{height} pixels exceed the mosaic size limit of {limit} pixels")]
    MosaicTooLarge {
        max_tiles: u32,
        width: u32,
        height: u32,
        limit: u64,
    },
    #[error("provider {0:?} needs an access token")]
    MissingAccessToken(String),
    #[error("unknown overlay provider {0:?}")]
    UnknownProvider(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum SliceError {
    #[error("max slice width must be a positive number, got {0}")]
    InvalidSliceWidth(f64),
    #[error("mesh cannot be bisected: {0}")]
    UnsupportedMesh(&'static str),
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ZoomError {
    #[error("tile budget must be at least one tile")]
    ZeroTileBudget,
    #[error("bounding box has zero projected area")]
    ZeroArea,
}

/// Anything that aborts a whole import.
#[derive(Debug, Error)]
pub enum ImportError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("slicing failed: {0}")]
    Slice(#[from] SliceError),
    #[error("zoom selection failed: {0}")]
    Zoom(#[from] ZoomError),
    #[error("terrain mesh has no usable vertex positions")]
    TerrainWithoutPositions,
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),
}
