//! Latitude: a pure function of position. No tunable state, so its cache is keyed
//! only by region and resolution and is never invalidated by mutation.

use std::f64::consts::FRAC_PI_2;
use std::sync::Arc;

use image::RgbaImage;

use super::{render_grid, LayerContext, LayerKind, MapLayer, RegionRequest, SampleData};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::error::Result;
use crate::tilemap::{colorize, lerp_color, Tilemap};

const EQUATOR_COLOR: [u8; 4] = [214, 96, 52, 255];
const TEMPERATE_COLOR: [u8; 4] = [236, 214, 120, 255];
const POLAR_COLOR: [u8; 4] = [232, 242, 255, 255];

pub struct LatitudeLayer {
    cache: SharedCache,
}

impl LatitudeLayer {
    pub fn new(limits: CacheLimits) -> Self {
        Self {
            cache: SharedCache::with_limits(limits),
        }
    }
}

/// Signed latitude normalized to `[-1, 1]` (south pole to north pole).
pub fn normalized_latitude(lat: f64) -> f32 {
    (lat / FRAC_PI_2).clamp(-1.0, 1.0) as f32
}

/// Climate-zone color for a normalized latitude.
pub fn zone_color(value: f32) -> [u8; 4] {
    let t = value.abs();
    if t < 0.5 {
        lerp_color(EQUATOR_COLOR, TEMPERATE_COLOR, t / 0.5)
    } else {
        lerp_color(TEMPERATE_COLOR, POLAR_COLOR, (t - 0.5) / 0.5)
    }
}

impl MapLayer for LatitudeLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Latitude
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

    fn sample_point(&self, _ctx: &LayerContext<'_>, _lon: f64, lat: f64) -> Result<SampleData> {
        let v = normalized_latitude(lat);
        Ok(SampleData::new(&[v, v.abs()]))
    }

    fn supports_region(&self) -> bool {
        true
    }

    fn sample_region(
        &self,
        _ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<Tilemap<f32>>> {
        // Nothing procedural to override.
        let request = request.without_delta();
        self.cache.scalar(request.key(BufferChannel::Scalar), || {
            Ok(render_grid(&request.grid, |_, lat| normalized_latitude(lat)))
        })
    }

    fn get_color_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        let request = request.without_delta();
        self.cache.color(request.key(BufferChannel::Color), || {
            let grid = self.sample_region(ctx, &request)?;
            colorize(&grid, zone_color)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delta::LayerDelta;
    use crate::geo::GeoRegion;
    use crate::layers::test_support::small_set;

    #[test]
    fn test_poles_and_equator() {
        assert_eq!(normalized_latitude(FRAC_PI_2), 1.0);
        assert_eq!(normalized_latitude(-FRAC_PI_2), -1.0);
        assert_eq!(normalized_latitude(0.0), 0.0);
        assert_eq!(zone_color(1.0), POLAR_COLOR);
        assert_eq!(zone_color(0.0), EQUATOR_COLOR);
    }

    #[test]
    fn test_rows_follow_latitude() {
        let (world, layers) = small_set(2);
        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.latitude().sample(&ctx).unwrap();
        assert_eq!(*grid.get(0, 0), 1.0);
        assert_eq!(*grid.get(5, grid.height - 1), -1.0);
        assert_eq!(grid.get(0, 3), grid.get(40, 3));
    }

    #[test]
    fn test_delta_shares_cache_entry() {
        let (world, layers) = small_set(2);
        let ctx = LayerContext { world: &world, layers: &layers };
        let delta = LayerDelta::new().frequency(9.0);
        let region = GeoRegion::new(0.0, 0.4, 0.0, 0.4).unwrap();
        let a = layers
            .latitude()
            .sample_region(&ctx, &RegionRequest::new(region, 8, 8, None).unwrap())
            .unwrap();
        let b = layers
            .latitude()
            .sample_region(&ctx, &RegionRequest::new(region, 8, 8, Some(&delta)).unwrap())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }
}
