//! Precipitation: noise modulated by latitude circulation bands.
//!
//! The band term is wet at the equator, dry around 30°, wet again near 60° and dry
//! at the poles, the classic three-cell pattern; noise breaks it up regionally.

use std::sync::Arc;

use image::RgbaImage;

use super::{render_grid, LayerContext, LayerKind, MapLayer, NoiseState, RegionRequest, SampleData};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::delta::{LayerDelta, PatchedField};
use crate::error::Result;
use crate::noise_field::NoiseParams;
use crate::tilemap::{colorize, lerp_color, Tilemap};

const NOISE_WEIGHT: f64 = 0.55;

const DRY_COLOR: [u8; 4] = [196, 164, 110, 255];
const MODERATE_COLOR: [u8; 4] = [112, 170, 82, 255];
const WET_COLOR: [u8; 4] = [42, 92, 196, 255];

pub struct PrecipitationLayer {
    noise: NoiseState,
    cache: SharedCache,
}

/// Circulation band term in `[0, 1]`.
pub fn latitude_band(lat: f64) -> f64 {
    ((6.0 * lat).cos() + 1.0) * 0.5
}

fn precipitation_at(field: &PatchedField, lon: f64, lat: f64) -> f32 {
    let value = NOISE_WEIGHT * field.at(lon, lat) + (1.0 - NOISE_WEIGHT) * latitude_band(lat);
    value.clamp(0.0, 1.0) as f32
}

/// Dry-to-wet color ramp.
pub fn wetness_color(value: f32) -> [u8; 4] {
    if value < 0.5 {
        lerp_color(DRY_COLOR, MODERATE_COLOR, value / 0.5)
    } else {
        lerp_color(MODERATE_COLOR, WET_COLOR, (value - 0.5) / 0.5)
    }
}

impl PrecipitationLayer {
    pub fn new(params: NoiseParams, limits: CacheLimits) -> Result<Self> {
        Ok(Self {
            noise: NoiseState::new(params)?,
            cache: SharedCache::with_limits(limits),
        })
    }

    pub fn params(&self) -> &NoiseParams {
        self.noise.params()
    }
}

impl MapLayer for PrecipitationLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Precipitation
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
        let field = self.noise.resolve(None)?;
        Ok(SampleData::new(&[precipitation_at(&field, lon, lat)]))
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
            let field = self.noise.resolve(request.delta)?;
            Ok(render_grid(&request.grid, |lon, lat| precipitation_at(&field, lon, lat)))
        })
    }

    fn get_color_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        self.cache.color(request.key(BufferChannel::Color), || {
            let grid = self.sample_region(ctx, request)?;
            colorize(&grid, wetness_color)
        })
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<bool> {
        let applied = self.noise.set_named(name, value)?;
        if applied {
            self.cache.invalidate();
        }
        Ok(applied)
    }

    fn commit_delta(&mut self, delta: LayerDelta) -> Result<()> {
        self.noise.commit(delta)?;
        self.cache.invalidate();
        Ok(())
    }

    fn clear_edits(&mut self) -> bool {
        let cleared = self.noise.clear_edits();
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
    fn test_band_shape() {
        assert!((latitude_band(0.0) - 1.0).abs() < 1e-12);
        assert!(latitude_band(30f64.to_radians()) < 1e-12);
        assert!((latitude_band(60f64.to_radians()) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_values_in_unit_range() {
        let (world, layers) = small_set(21);
        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.precipitation().sample(&ctx).unwrap();
        let (min, max) = grid.value_range();
        assert!(min >= 0.0 && max <= 1.0);
    }

    #[test]
    fn test_point_matches_buffer() {
        let (world, layers) = small_set(22);
        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.precipitation().sample(&ctx).unwrap();
        let native = world.native_grid();
        let point = layers
            .precipitation()
            .sample_point(&ctx, native.lon_at(10), native.lat_at(7))
            .unwrap();
        assert_eq!(point.primary(), *grid.get(10, 7));
    }
}
