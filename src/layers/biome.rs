//! Biome classification from a warmth field and a moisture field.
//!
//! Warmth is dominated by latitude with noise on top; moisture is pure noise.
//! A combined score in `[0, 1]` is split into as many equal bands as the palette
//! has colors, so recoloring never moves a boundary and only a count change does.

use std::sync::Arc;

use image::RgbaImage;

use super::{
    category_of, reconfigure_palette, render_grid, LayerContext, LayerKind, MapLayer, NoiseState,
    RegionRequest, SampleData,
};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::delta::{LayerDelta, PatchedField};
use crate::error::Result;
use crate::noise_field::NoiseParams;
use crate::palette::Palette;
use crate::tilemap::{colorize, Tilemap};

const LATITUDE_WARMTH: f64 = 0.7;
const WARMTH_WEIGHT: f64 = 0.6;

/// Ice, tundra, boreal, grassland, temperate forest, tropical.
pub fn default_palette() -> Palette {
    Palette::from_table([
        [236, 242, 250, 255],
        [150, 160, 140, 255],
        [46, 92, 64, 255],
        [170, 190, 96, 255],
        [60, 130, 60, 255],
        [24, 110, 40, 255],
    ])
}

/// Temperature and moisture fields sampled together.
struct Climate {
    temperature: PatchedField,
    moisture: PatchedField,
}

impl Climate {
    fn warmth(&self, lon: f64, lat: f64) -> f64 {
        LATITUDE_WARMTH * lat.cos() + (1.0 - LATITUDE_WARMTH) * self.temperature.at(lon, lat)
    }

    /// `(category, warmth, moisture)` at a position.
    fn classify(&self, lon: f64, lat: f64, count: usize) -> (usize, f64, f64) {
        let warmth = self.warmth(lon, lat);
        let moisture = self.moisture.at(lon, lat);
        let score = WARMTH_WEIGHT * warmth + (1.0 - WARMTH_WEIGHT) * moisture;
        (category_of(score, count), warmth, moisture)
    }
}

pub struct BiomeLayer {
    temperature: NoiseState,
    moisture: NoiseState,
    palette: Palette,
    cache: SharedCache,
}

impl BiomeLayer {
    pub fn new(
        temperature: NoiseParams,
        moisture: NoiseParams,
        palette: Palette,
        limits: CacheLimits,
    ) -> Result<Self> {
        Ok(Self {
            temperature: NoiseState::new(temperature)?,
            moisture: NoiseState::new(moisture)?,
            palette,
            cache: SharedCache::with_limits(limits),
        })
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn temperature_params(&self) -> &NoiseParams {
        self.temperature.params()
    }

    pub fn moisture_params(&self) -> &NoiseParams {
        self.moisture.params()
    }

    fn climate(&self, delta: Option<&LayerDelta>) -> Result<Climate> {
        Ok(Climate {
            temperature: self.temperature.resolve(delta)?,
            moisture: self.moisture.resolve(delta)?,
        })
    }
}

/// Split `temperatureFrequency` style names into field and noise parameter.
fn split_name(name: &str) -> Option<(bool, String)> {
    let (is_temperature, rest) = if let Some(rest) = name.strip_prefix("temperature") {
        (true, rest)
    } else if let Some(rest) = name.strip_prefix("moisture") {
        (false, rest)
    } else {
        return None;
    };
    let mut chars = rest.chars();
    let first = chars.next()?;
    Some((is_temperature, first.to_ascii_lowercase().to_string() + chars.as_str()))
}

impl MapLayer for BiomeLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Biome
    }

    fn cache(&self) -> &SharedCache {
        &self.cache
    }

    fn sample(&self, ctx: &LayerContext<'_>) -> Result<Arc<Tilemap<f32>>> {
        self.sample_region(ctx, &RegionRequest::full_globe(ctx.world))
    }

    fn get_color(&self, ctx: &LayerContext<'_>) -> Result<Arc<RgbaImage>> {
        self.get_color_region(ctx, &RegionRequest::full_globe(ctx.world))
    }

    fn sample_point(&self, _ctx: &LayerContext<'_>, lon: f64, lat: f64) -> Result<SampleData> {
        let (category, warmth, moisture) =
            self.climate(None)?.classify(lon, lat, self.palette.len());
        Ok(SampleData::new(&[category as f32, warmth as f32, moisture as f32]))
    }

    fn supports_region(&self) -> bool {
        true
    }

    fn sample_region(
        &self,
        _ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<Tilemap<f32>>> {
        self.cache.scalar(request.key(BufferChannel::Scalar), || {
            let climate = self.climate(request.delta)?;
            let count = self.palette.len();
            Ok(render_grid(&request.grid, |lon, lat| {
                climate.classify(lon, lat, count).0 as f32
            }))
        })
    }

    fn get_color_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        self.cache.color(request.key(BufferChannel::Color), || {
            let categories = self.sample_region(ctx, request)?;
            colorize(&categories, |c| self.palette.color(c as usize))
        })
    }

    fn parse_parameters(&mut self, params: &str) -> Result<()> {
        reconfigure_palette(LayerKind::Biome, &mut self.palette, params)?;
        self.cache.invalidate();
        Ok(())
    }

    /// Accepts `temperature<Param>` and `moisture<Param>`, e.g. `moistureFrequency`.
    fn set_parameter(&mut self, name: &str, value: f64) -> Result<bool> {
        let Some((is_temperature, param)) = split_name(name) else {
            return Ok(false);
        };
        let state = if is_temperature {
            &mut self.temperature
        } else {
            &mut self.moisture
        };
        let applied = state.set_named(&param, value)?;
        if applied {
            self.cache.invalidate();
        }
        Ok(applied)
    }

    /// Applies to both fields.
    fn commit_delta(&mut self, delta: LayerDelta) -> Result<()> {
        let mut temperature = self.temperature.clone();
        temperature.commit(delta.clone())?;
        self.moisture.commit(delta)?;
        self.temperature = temperature;
        self.cache.invalidate();
        Ok(())
    }

    fn clear_edits(&mut self) -> bool {
        let cleared = self.temperature.clear_edits() | self.moisture.clear_edits();
        if cleared {
            self.cache.invalidate();
        }
        cleared
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::test_support::small_set;

    #[test]
    fn test_split_name() {
        assert_eq!(split_name("moistureFrequency"), Some((false, "frequency".to_string())));
        assert_eq!(split_name("temperatureSeed"), Some((true, "seed".to_string())));
        assert_eq!(split_name("temperature"), None);
        assert_eq!(split_name("frequency"), None);
    }

    #[test]
    fn test_categories_within_palette() {
        let (world, layers) = small_set(31);
        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.biome().sample(&ctx).unwrap();
        let count = layers.biome().palette().len() as f32;
        assert!(grid.as_slice().iter().all(|&c| c >= 0.0 && c < count && c.fract() == 0.0));
    }

    #[test]
    fn test_recolor_keeps_boundaries() {
        let (world, mut layers) = small_set(32);
        let before = {
            let ctx = LayerContext { world: &world, layers: &layers };
            layers.biome().sample(&ctx).unwrap()
        };
        layers
            .parse_parameters(
                LayerKind::Biome,
                "count:6,colors:[{1,1,1,255},{2,2,2,255},{3,3,3,255},{4,4,4,255},{5,5,5,255},{6,6,6,255}]",
            )
            .unwrap();
        let ctx = LayerContext { world: &world, layers: &layers };
        let after = layers.biome().sample(&ctx).unwrap();
        assert_eq!(*before, *after);

        let colors = layers.biome().get_color(&ctx).unwrap();
        let category = *after.get(3, 3) as u8 + 1;
        assert_eq!(colors.get_pixel(3, 3).0, [category, category, category, 255]);
    }

    #[test]
    fn test_bad_palette_keeps_previous() {
        let (_, mut layers) = small_set(33);
        let before = layers.biome().palette().clone();
        assert!(layers.parse_parameters(LayerKind::Biome, "count:2,colors:[{0,0,0}]").is_err());
        assert_eq!(*layers.biome().palette(), before);
    }

    #[test]
    fn test_point_channels() {
        let (world, layers) = small_set(34);
        let ctx = LayerContext { world: &world, layers: &layers };
        let point = layers.biome().sample_point(&ctx, 0.3, 0.2).unwrap();
        assert_eq!(point.len(), 3);
        assert!(point.primary() < layers.biome().palette().len() as f32);
    }

    #[test]
    fn test_prefixed_parameters() {
        let (_, mut layers) = small_set(35);
        assert!(layers.set_parameter(LayerKind::Biome, "moistureOctaves", 2.0).unwrap());
        assert_eq!(layers.biome().moisture_params().octaves, 2);
        assert!(layers.set_parameter(LayerKind::Biome, "temperatureOctaves", 0.0).is_err());
        assert!(!layers.set_parameter(LayerKind::Biome, "octaves", 2.0).unwrap());
    }
}
