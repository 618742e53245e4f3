//! Water: one scalar, the normalized sea level.
//!
//! Every cell of its buffer holds the level. The compositor masks ocean wherever
//! elevation falls below it.

use std::sync::Arc;

use image::RgbaImage;

use super::{LayerContext, LayerKind, MapLayer, RegionRequest, SampleData};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::error::{LayerError, Result};
use crate::tilemap::{color_from_fn_par, lerp_color, Tilemap};

const SHALLOW_COLOR: [u8; 4] = [200, 230, 255, 255];
const DEEP_COLOR: [u8; 4] = [0, 30, 120, 255];

/// Water level must be a finite value in `[0, 1]`.
pub fn validate_level(level: f64) -> Result<()> {
    if level.is_finite() && (0.0..=1.0).contains(&level) {
        Ok(())
    } else {
        Err(LayerError::invalid("waterLevel", format!("{} is outside [0, 1]", level)))
    }
}

/// Blue ramp: higher levels render deeper.
pub fn level_color(level: f32) -> [u8; 4] {
    lerp_color(SHALLOW_COLOR, DEEP_COLOR, level)
}

pub struct WaterLayer {
    level: f64,
    cache: SharedCache,
}

impl WaterLayer {
    pub fn new(level: f64, limits: CacheLimits) -> Result<Self> {
        validate_level(level)?;
        Ok(Self {
            level,
            cache: SharedCache::with_limits(limits),
        })
    }

    pub fn level(&self) -> f64 {
        self.level
    }
}

impl MapLayer for WaterLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Water
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

    fn sample_point(&self, _ctx: &LayerContext<'_>, _lon: f64, _lat: f64) -> Result<SampleData> {
        Ok(SampleData::new(&[self.level as f32]))
    }

    fn supports_region(&self) -> bool {
        true
    }

    fn sample_region(
        &self,
        _ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<Tilemap<f32>>> {
        let request = request.without_delta();
        let res = request.grid.resolution;
        self.cache.scalar(request.key(BufferChannel::Scalar), || {
            Ok(Tilemap::new_with(res.x, res.y, self.level as f32))
        })
    }

    fn get_color_region(
        &self,
        _ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        let request = request.without_delta();
        let res = request.grid.resolution;
        let color = level_color(self.level as f32);
        self.cache.color(request.key(BufferChannel::Color), || {
            color_from_fn_par(res.x, res.y, |_, _| color)
        })
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<bool> {
        match name {
            "waterLevel" | "level" => {
                validate_level(value)?;
                self.level = value;
                self.cache.invalidate();
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::layers::test_support::small_set;

    #[test]
    fn test_set_level_is_observed() {
        let (world, mut layers) = small_set(51);
        {
            let ctx = LayerContext { world: &world, layers: &layers };
            layers.water().sample(&ctx).unwrap();
        }
        assert!(layers.set_parameter(LayerKind::Water, "waterLevel", 0.8).unwrap());

        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.water().sample(&ctx).unwrap();
        assert!(grid.as_slice().iter().all(|&v| v == 0.8f32));
        let point = layers.water().sample_point(&ctx, 1.0, -0.4).unwrap();
        assert_eq!(point.channels(), &[0.8f32]);
    }

    #[test]
    fn test_invalid_level_keeps_previous() {
        let (_, mut layers) = small_set(52);
        let before = layers.water().level();
        assert!(layers.set_parameter(LayerKind::Water, "waterLevel", 1.2).is_err());
        assert!(layers.set_parameter(LayerKind::Water, "level", f64::NAN).is_err());
        assert_eq!(layers.water().level(), before);
    }

    #[test]
    fn test_unknown_name_is_noop() {
        let (_, mut layers) = small_set(53);
        let before = layers.water().level();
        assert!(!layers.set_parameter(LayerKind::Water, "seaLevel", 0.1).unwrap());
        assert_eq!(layers.water().level(), before);
    }

    #[test]
    fn test_ramp_endpoints() {
        assert_eq!(level_color(0.0), SHALLOW_COLOR);
        assert_eq!(level_color(1.0), DEEP_COLOR);
    }
}
