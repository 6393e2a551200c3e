use bevy::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::bounds::GeoBounds;
use crate::constants::*;
use crate::error::ConfigError;
use crate::geo::GeoPoint;
use crate::layer::LayerSettings;
use crate::overlay::{TileSize, TileUrlTemplate};

const CONFIG_FILE: &str = "config.toml";

const OSM_MAPNIK_URL: &str = "http://{a,b,c}.tile.openstreetmap.org";
const MAPBOX_URL: &str = "https://api.mapbox.com/v4";

/// Deepest zoom served by the built-in providers
const PRESET_MAX_ZOOM: u8 = 19;

#[derive(Resource, Serialize, Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(default)]
pub struct DrapeConfig {
    pub scene: SceneConfig,
    pub area: AreaConfig,
    pub overlay: OverlayConfig,
    pub slicing: SlicingConfig,
    pub layers: LayersConfig,
    pub terrain: TerrainConfig,
}

/// Geographic anchor of the scene origin.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SceneConfig {
    pub origin_lat: f64,
    pub origin_lon: f64,
}

/// Area to import, in degrees.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct AreaConfig {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct OverlayConfig {
    /// `osm-mapnik`, `mapbox-satellite`, `mapbox-streets` or `custom`
    pub provider: String,
    /// Tile URL template for the `custom` provider
    pub url: String,
    pub access_token: String,
    pub max_zoom: u8,
    pub max_tiles: u32,
    pub tile_width: u32,
    pub tile_height: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct SlicingConfig {
    pub enabled: bool,
    pub max_slice_width: f64,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct LayersConfig {
    pub sw_offset: f32,
    /// Vertical offset per layer id
    pub offsets: BTreeMap<String, f32>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct TerrainConfig {
    /// Height above the terrain's highest point for flat layers
    pub layer_offset: f32,
    /// Grid cells per side of the generated height field
    pub resolution: u32,
    /// Height amplitude of the generated height field (meters)
    pub relief: f32,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            origin_lat: DEFAULT_LATITUDE,
            origin_lon: DEFAULT_LONGITUDE,
        }
    }
}

impl Default for AreaConfig {
    fn default() -> Self {
        Self {
            south: DEFAULT_LATITUDE - DEFAULT_AREA_HALF_SPAN_DEG,
            west: DEFAULT_LONGITUDE - DEFAULT_AREA_HALF_SPAN_DEG,
            north: DEFAULT_LATITUDE + DEFAULT_AREA_HALF_SPAN_DEG,
            east: DEFAULT_LONGITUDE + DEFAULT_AREA_HALF_SPAN_DEG,
        }
    }
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            provider: "osm-mapnik".to_string(),
            url: String::new(),
            access_token: String::new(),
            max_zoom: DEFAULT_MAX_ZOOM,
            max_tiles: DEFAULT_MAX_TILES,
            tile_width: DEFAULT_TILE_WIDTH,
            tile_height: DEFAULT_TILE_HEIGHT,
        }
    }
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_slice_width: DEFAULT_SLICE_WIDTH,
        }
    }
}

impl Default for LayersConfig {
    fn default() -> Self {
        let settings = LayerSettings::default();
        Self {
            sw_offset: settings.sw_offset,
            offsets: BTreeMap::new(),
        }
    }
}

impl Default for TerrainConfig {
    fn default() -> Self {
        Self {
            layer_offset: 10.0,
            resolution: 64,
            relief: 30.0,
        }
    }
}

impl DrapeConfig {
    pub fn origin(&self) -> GeoPoint {
        GeoPoint::new(
            crate::clamp_latitude(self.scene.origin_lat),
            crate::clamp_longitude(self.scene.origin_lon),
        )
    }

    pub fn geo_bounds(&self) -> Result<GeoBounds, ConfigError> {
        let a = &self.area;
        GeoBounds::new(a.south, a.west, a.north, a.east)
    }

    /// Tile URL template of the configured provider.
    pub fn tile_template(&self) -> Result<TileUrlTemplate, ConfigError> {
        let overlay = &self.overlay;
        let url = match overlay.provider.as_str() {
            "osm-mapnik" => OSM_MAPNIK_URL.to_string(),
            "mapbox-satellite" | "mapbox-streets" => {
                if overlay.access_token.trim().is_empty() {
                    return Err(ConfigError::MissingAccessToken(overlay.provider.clone()));
                }
                let map_id = overlay.provider.replacen('-', ".", 1);
                format!(
                    "{}/{}/{{z}}/{{x}}/{{y}}.png?access_token={}",
                    MAPBOX_URL,
                    map_id,
                    overlay.access_token.trim()
                )
            }
            "custom" => overlay.url.clone(),
            other => return Err(ConfigError::UnknownProvider(other.to_string())),
        };
        Ok(TileUrlTemplate::parse(&url)?)
    }

    /// Deepest zoom to request. Built-in providers cap it at what they serve.
    pub fn max_zoom(&self) -> u8 {
        match self.overlay.provider.as_str() {
            "custom" => self.overlay.max_zoom,
            _ => self.overlay.max_zoom.min(PRESET_MAX_ZOOM),
        }
    }

    pub fn tile_size(&self) -> TileSize {
        TileSize {
            width: self.overlay.tile_width,
            height: self.overlay.tile_height,
        }
    }

    pub fn layer_settings(&self) -> LayerSettings {
        LayerSettings {
            slice_flat_layers: self.slicing.enabled,
            max_slice_width: self.slicing.max_slice_width,
            sw_offset: self.layers.sw_offset,
            layer_offsets: self.layers.offsets.clone().into_iter().collect(),
        }
    }

    /// Checks everything that would abort an import before any work starts.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.geo_bounds()?;
        self.tile_template()?;

        let width = self.slicing.max_slice_width;
        if !width.is_finite() || width <= 0.0 {
            return Err(ConfigError::InvalidSliceWidth(width));
        }
        if self.overlay.max_tiles == 0 {
            return Err(ConfigError::ZeroTileBudget);
        }
        if self.overlay.tile_width == 0 || self.overlay.tile_height == 0 {
            return Err(ConfigError::ZeroTileSize {
                width: self.overlay.tile_width,
                height: self.overlay.tile_height,
            });
        }
        let pixels = u64::from(self.overlay.max_tiles)
            * u64::from(self.overlay.tile_width)
            * u64::from(self.overlay.tile_height);
        if pixels > MAX_MOSAIC_PIXELS {
            return Err(ConfigError::MosaicTooLarge {
                max_tiles: self.overlay.max_tiles,
                width: self.overlay.tile_width,
                height: self.overlay.tile_height,
                limit: MAX_MOSAIC_PIXELS,
            });
        }
        Ok(())
    }
}

fn config_path() -> PathBuf {
    std::env::current_dir()
        .unwrap_or_default()
        .join(CONFIG_FILE)
}

pub fn load_config() -> DrapeConfig {
    load_config_from(&config_path())
}

/// Reads the config at `path`. Falls back to defaults when the file is
/// unreadable or invalid, and writes them out when it is missing.
pub fn load_config_from(path: &Path) -> DrapeConfig {
    if path.exists() {
        match fs::read_to_string(path) {
            Ok(contents) => match toml::from_str(&contents) {
                Ok(config) => {
                    info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    warn!("Failed to parse config: {}, using defaults", e);
                    return DrapeConfig::default();
                }
            },
            Err(e) => {
                warn!("Failed to read config: {}, using defaults", e);
                return DrapeConfig::default();
            }
        }
    }

    let config = DrapeConfig::default();
    save_config_to(path, &config);
    config
}

pub fn save_config_to(path: &Path, config: &DrapeConfig) {
    match toml::to_string_pretty(config) {
        Ok(contents) => {
            if let Err(e) = fs::write(path, contents) {
                error!("Failed to write config: {}", e);
            } else {
                info!("Saved config to {:?}", path);
            }
        }
        Err(e) => {
            error!("Failed to serialize config: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::TemplateError;

    #[test]
    fn defaults_are_valid() {
        let config = DrapeConfig::default();
        assert_eq!(config.validate(), Ok(()));
        assert_eq!(config.tile_size(), TileSize::default());
        assert_eq!(config.max_zoom(), 19);
    }

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        let config = load_config_from(&path);
        assert_eq!(config, DrapeConfig::default());
        assert!(path.exists());
        assert_eq!(load_config_from(&path), config);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            r#"
[overlay]
provider = "custom"
url = "https://tiles.example.com/{z}/{x}/{y}@2x.png"
max_zoom = 21

[layers.offsets]
water = 0.2
"#,
        )
        .unwrap();

        let config = load_config_from(&path);
        assert_eq!(config.overlay.max_tiles, DEFAULT_MAX_TILES);
        assert_eq!(config.max_zoom(), 21);
        assert_eq!(config.scene, SceneConfig::default());
        assert_eq!(config.layer_settings().layer_offsets.get("water"), Some(&0.2));
        assert!(config.tile_template().is_ok());
    }

    #[test]
    fn unparseable_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[overlay\nprovider = ").unwrap();
        assert_eq!(load_config_from(&path), DrapeConfig::default());
    }

    #[test]
    fn provider_presets_resolve_to_templates() {
        let mut config = DrapeConfig::default();
        let osm = config.tile_template().unwrap();
        assert_eq!(osm.subdomains(), ["a", "b", "c"]);

        config.overlay.provider = "mapbox-satellite".into();
        assert_eq!(
            config.tile_template(),
            Err(ConfigError::MissingAccessToken("mapbox-satellite".into()))
        );
        config.overlay.access_token = "pk.test".into();
        let template = config.tile_template().unwrap();
        assert_eq!(
            template.url(crate::overlay::TileAddress::new(3, 2, 1), 0),
            "https://api.mapbox.com/v4/mapbox.satellite/3/2/1.png?access_token=pk.test"
        );

        config.overlay.provider = "bing".into();
        assert_eq!(config.tile_template(), Err(ConfigError::UnknownProvider("bing".into())));
    }

    #[test]
    fn validation_rejects_bad_values() {
        let mut config = DrapeConfig::default();
        config.overlay.provider = "custom".into();
        config.overlay.url = "https://tiles.example.com/".into();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Template(TemplateError::NoPlaceholder(_)))
        ));

        let mut config = DrapeConfig::default();
        config.area.north = config.area.south;
        assert!(matches!(config.validate(), Err(ConfigError::EmptyArea { .. })));

        let mut config = DrapeConfig::default();
        config.slicing.max_slice_width = 0.0;
        assert_eq!(config.validate(), Err(ConfigError::InvalidSliceWidth(0.0)));

        let mut config = DrapeConfig::default();
        config.overlay.max_tiles = 0;
        assert_eq!(config.validate(), Err(ConfigError::ZeroTileBudget));

        let mut config = DrapeConfig::default();
        config.overlay.tile_height = 0;
        assert_eq!(
            config.validate(),
            Err(ConfigError::ZeroTileSize { width: 256, height: 0 })
        );
    }

    #[test]
    fn validate_bounds_mosaic_size() {
        let mut config = DrapeConfig::default();
        config.overlay.tile_width = 1 << 20;
        config.overlay.tile_height = 1 << 20;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MosaicTooLarge { width: 1048576, .. })
        ));

        let mut config = DrapeConfig::default();
        config.overlay.max_tiles = u32::MAX;
        assert!(matches!(config.validate(), Err(ConfigError::MosaicTooLarge { .. })));

        // 4096 tiles of 256x256 is exactly the limit
        let mut config = DrapeConfig::default();
        config.overlay.max_tiles = 4096;
        assert_eq!(config.validate(), Ok(()));
    }
}
