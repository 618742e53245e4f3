//! Atlas configuration loaded from JSON.
//!
//! Every field has a default, so a config file only lists what it changes.
//! Noise parameter sets left unset derive their seed from the world seed.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::cache::{CacheLimits, DEFAULT_CACHE_BUDGET_BYTES, DEFAULT_CACHE_CAPACITY};
use crate::error::{ConfigError, LayerError, Result};
use crate::layers::water::validate_level;
use crate::layers::{biome, land_type, BlendConfig};
use crate::noise_field::NoiseParams;
use crate::palette::Palette;
use crate::world::{seed_purpose, World};

/// Default pixel budget of the projection raster arena.
pub const DEFAULT_RASTER_BUDGET: u64 = 64 * 1024 * 1024;

/// Configuration for an [`Atlas`](crate::atlas::Atlas) session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AtlasConfig {
    /// Master world seed
    pub seed: u64,
    /// Native full-globe width in pixels
    pub width: usize,
    /// Native full-globe height in pixels
    pub height: usize,
    /// Buffers cached per layer before LRU eviction
    pub cache_capacity: usize,
    /// Bytes cached per layer before LRU eviction
    pub cache_budget_bytes: usize,
    /// Pixel budget shared by all live projection rasters
    pub raster_budget_pixels: u64,
    pub elevation: Option<NoiseParams>,
    pub precipitation: Option<NoiseParams>,
    pub biome_temperature: Option<NoiseParams>,
    pub biome_moisture: Option<NoiseParams>,
    pub land_type: Option<NoiseParams>,
    /// Biome palette in `count:<N>,colors:[...]` form
    pub biome_palette: Option<String>,
    /// Land type palette in `count:<N>,colors:[...]` form
    pub land_type_palette: Option<String>,
    /// Normalized water level (0-1)
    pub water_level: f64,
    pub blend: BlendConfig,
}

impl Default for AtlasConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            width: 512,
            height: 256,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            cache_budget_bytes: DEFAULT_CACHE_BUDGET_BYTES,
            raster_budget_pixels: DEFAULT_RASTER_BUDGET,
            elevation: None,
            precipitation: None,
            biome_temperature: None,
            biome_moisture: None,
            land_type: None,
            biome_palette: None,
            land_type_palette: None,
            water_level: 0.5,
            blend: BlendConfig::default(),
        }
    }
}

impl AtlasConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check every value with the same rules the runtime setters use.
    pub fn validate(&self) -> Result<()> {
        self.world()?;
        if self.cache_capacity == 0 {
            return Err(LayerError::invalid("cache_capacity", "must be at least 1"));
        }
        if self.cache_budget_bytes == 0 {
            return Err(LayerError::invalid("cache_budget_bytes", "must be at least 1"));
        }
        if self.raster_budget_pixels == 0 {
            return Err(LayerError::invalid("raster_budget_pixels", "must be at least 1"));
        }
        for params in [
            &self.elevation,
            &self.precipitation,
            &self.biome_temperature,
            &self.biome_moisture,
            &self.land_type,
        ]
        .into_iter()
        .flatten()
        {
            params.validate()?;
        }
        self.biome_palette()?;
        self.land_type_palette()?;
        validate_level(self.water_level)?;
        self.blend.validate()?;
        Ok(())
    }

    pub fn world(&self) -> Result<World> {
        World::new(self.seed, self.width, self.height)
    }

    pub fn cache_limits(&self) -> CacheLimits {
        CacheLimits {
            max_entries: self.cache_capacity,
            max_bytes: self.cache_budget_bytes,
        }
    }

    pub fn elevation_params(&self, world: &World) -> NoiseParams {
        self.elevation.unwrap_or(NoiseParams {
            frequency: 1.5,
            lacunarity: 2.0,
            octaves: 6,
            persistence: 0.5,
            seed: world.derive_seed(seed_purpose::ELEVATION),
        })
    }

    pub fn precipitation_params(&self, world: &World) -> NoiseParams {
        self.precipitation.unwrap_or(NoiseParams {
            frequency: 2.0,
            lacunarity: 2.0,
            octaves: 4,
            persistence: 0.5,
            seed: world.derive_seed(seed_purpose::PRECIPITATION),
        })
    }

    pub fn biome_temperature_params(&self, world: &World) -> NoiseParams {
        self.biome_temperature.unwrap_or(NoiseParams {
            frequency: 1.0,
            lacunarity: 2.0,
            octaves: 3,
            persistence: 0.5,
            seed: world.derive_seed(seed_purpose::BIOME_TEMPERATURE),
        })
    }

    pub fn biome_moisture_params(&self, world: &World) -> NoiseParams {
        self.biome_moisture.unwrap_or(NoiseParams {
            frequency: 2.5,
            lacunarity: 2.0,
            octaves: 4,
            persistence: 0.5,
            seed: world.derive_seed(seed_purpose::BIOME_MOISTURE),
        })
    }

    pub fn land_type_params(&self, world: &World) -> NoiseParams {
        self.land_type.unwrap_or(NoiseParams {
            frequency: 3.0,
            lacunarity: 2.0,
            octaves: 4,
            persistence: 0.5,
            seed: world.derive_seed(seed_purpose::LAND_TYPE),
        })
    }

    pub fn biome_palette(&self) -> Result<Palette> {
        match &self.biome_palette {
            Some(text) => Ok(Palette::parse(text)?),
            None => Ok(biome::default_palette()),
        }
    }

    pub fn land_type_palette(&self) -> Result<Palette> {
        match &self.land_type_palette {
            Some(text) => Ok(Palette::parse(text)?),
            None => Ok(land_type::default_palette()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        assert!(AtlasConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = AtlasConfig::from_json_str(r#"{ "seed": 7, "water_level": 0.3 }"#).unwrap();
        assert_eq!(config.seed, 7);
        assert_eq!(config.water_level, 0.3);
        assert_eq!(config.width, 512);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let bad_level = AtlasConfig::from_json_str(r#"{ "water_level": 1.5 }"#);
        assert!(matches!(bad_level, Err(ConfigError::Invalid(_))));

        let bad_noise = AtlasConfig::from_json_str(
            r#"{ "elevation": { "frequency": 0.0, "lacunarity": 2.0, "octaves": 4, "persistence": 0.5, "seed": 1 } }"#,
        );
        assert!(matches!(bad_noise, Err(ConfigError::Invalid(_))));

        let bad_palette = AtlasConfig::from_json_str(r#"{ "biome_palette": "count:2,colors:[{1,2,3,4}]" }"#);
        assert!(matches!(bad_palette, Err(ConfigError::Invalid(LayerError::Parse(_)))));

        assert!(matches!(AtlasConfig::from_json_str("{ nope"), Err(ConfigError::Json(_))));

        let no_budget = AtlasConfig::from_json_str(r#"{ "cache_budget_bytes": 0 }"#);
        assert!(matches!(no_budget, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_cache_limits_from_config() {
        let config = AtlasConfig::from_json_str(r#"{ "cache_capacity": 8, "cache_budget_bytes": 4096 }"#).unwrap();
        let limits = config.cache_limits();
        assert_eq!((limits.max_entries, limits.max_bytes), (8, 4096));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "seed": 99, "width": 128, "height": 64 }}"#).unwrap();
        let config = AtlasConfig::load(file.path()).unwrap();
        assert_eq!((config.seed, config.width, config.height), (99, 128, 64));
    }

    #[test]
    fn test_default_seeds_follow_world_seed() {
        let config = AtlasConfig::default();
        let a = World::new(1, 8, 4).unwrap();
        let b = World::new(2, 8, 4).unwrap();
        assert_ne!(config.elevation_params(&a).seed, config.elevation_params(&b).seed);
    }
}
