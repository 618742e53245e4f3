//! Elevation: a fractal noise field over the sphere, normalized to 0-1.

use std::sync::Arc;

use image::RgbaImage;

use super::{render_grid, LayerContext, LayerKind, MapLayer, NoiseState, RegionRequest, SampleData};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::delta::LayerDelta;
use crate::error::Result;
use crate::noise_field::NoiseParams;
use crate::tilemap::{colorize, Tilemap};

pub struct ElevationLayer {
    noise: NoiseState,
    cache: SharedCache,
}

impl ElevationLayer {
    pub fn new(params: NoiseParams, limits: CacheLimits) -> Result<Self> {
        Ok(Self {
            noise: NoiseState::new(params)?,
            cache: SharedCache::with_limits(limits),
        })
    }

    pub fn params(&self) -> &NoiseParams {
        self.noise.params()
    }

    pub fn edits(&self) -> &[LayerDelta] {
        self.noise.edits()
    }
}

impl MapLayer for ElevationLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Elevation
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
        Ok(SampleData::new(&[field.at(lon, lat) as f32]))
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
            Ok(render_grid(&request.grid, |lon, lat| field.at(lon, lat) as f32))
        })
    }

    fn get_color_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        self.cache.color(request.key(BufferChannel::Color), || {
            let grid = self.sample_region(ctx, request)?;
            colorize(&grid, spectral_colormap)
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

/// Spectral colormap (matplotlib style): dark blue -> cyan -> green -> yellow -> orange -> red
pub fn spectral_colormap(t: f32) -> [u8; 4] {
    let colors: [[f32; 3]; 11] = [
        [0.37, 0.31, 0.64],  // Dark blue/purple (low)
        [0.20, 0.53, 0.74],  // Blue
        [0.40, 0.76, 0.65],  // Teal
        [0.67, 0.87, 0.64],  // Light green
        [0.90, 0.96, 0.60],  // Yellow-green
        [1.00, 1.00, 0.75],  // Light yellow / white
        [1.00, 0.88, 0.55],  // Yellow
        [0.99, 0.68, 0.38],  // Light orange
        [0.96, 0.43, 0.26],  // Orange
        [0.84, 0.24, 0.31],  // Red
        [0.62, 0.00, 0.26],  // Dark red (high)
    ];

    let t_scaled = t.clamp(0.0, 1.0) * 10.0;
    let idx = (t_scaled as usize).min(9);
    let frac = t_scaled - idx as f32;

    let c1 = colors[idx];
    let c2 = colors[idx + 1];

    [
        ((c1[0] + (c2[0] - c1[0]) * frac) * 255.0) as u8,
        ((c1[1] + (c2[1] - c1[1]) * frac) * 255.0) as u8,
        ((c1[2] + (c2[2] - c1[2]) * frac) * 255.0) as u8,
        255,
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::GeoRegion;
    use crate::layers::test_support::small_set;

    #[test]
    fn test_region_query_is_cached() {
        let (world, layers) = small_set(11);
        let ctx = LayerContext { world: &world, layers: &layers };
        let layer = layers.elevation();
        let region = GeoRegion::new(-0.5, 0.5, -0.3, 0.3).unwrap();
        let request = RegionRequest::new(region, 40, 24, None).unwrap();

        let a = layer.sample_region(&ctx, &request).unwrap();
        let misses = layer.cache_stats().misses;
        let b = layer.sample_region(&ctx, &request).unwrap();

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(layer.cache_stats().misses, misses);
        assert!(layer.cache_stats().hits >= 1);
    }

    #[test]
    fn test_adjoining_regions_share_edge() {
        let (world, layers) = small_set(12);
        let ctx = LayerContext { world: &world, layers: &layers };
        let layer = layers.elevation();
        let west = RegionRequest::new(GeoRegion::new(0.0, 0.5, -0.2, 0.2).unwrap(), 33, 17, None).unwrap();
        let east = RegionRequest::new(GeoRegion::new(0.5, 1.0, -0.2, 0.2).unwrap(), 33, 17, None).unwrap();

        let a = layer.sample_region(&ctx, &west).unwrap();
        let b = layer.sample_region(&ctx, &east).unwrap();
        for y in 0..17 {
            assert!((a.get(32, y) - b.get(0, y)).abs() < 1e-6);
        }
    }

    #[test]
    fn test_delta_does_not_mutate_state() {
        let (world, layers) = small_set(13);
        let ctx = LayerContext { world: &world, layers: &layers };
        let layer = layers.elevation();
        let before = *layer.params();
        let delta = LayerDelta::new().frequency(6.0).seed(4242);
        let plain = RegionRequest::new(GeoRegion::full_globe(), 32, 16, None).unwrap();
        let edited = RegionRequest::new(GeoRegion::full_globe(), 32, 16, Some(&delta)).unwrap();

        let base = layer.sample_region(&ctx, &plain).unwrap();
        let changed = layer.sample_region(&ctx, &edited).unwrap();
        assert_ne!(*base, *changed);
        assert_eq!(*layer.params(), before);

        let again = layer.sample_region(&ctx, &plain).unwrap();
        assert!(Arc::ptr_eq(&base, &again));
    }

    #[test]
    fn test_set_parameter_invalidates_and_validates() {
        let (world, mut layers) = small_set(14);
        {
            let ctx = LayerContext { world: &world, layers: &layers };
            layers.elevation().sample(&ctx).unwrap();
        }
        assert!(layers.set_parameter(LayerKind::Elevation, "frequency", 3.0).unwrap());
        assert!(layers.elevation().cache().is_empty());
        assert_eq!(layers.elevation().params().frequency, 3.0);

        assert!(layers.set_parameter(LayerKind::Elevation, "persistence", f64::NAN).is_err());
        assert_eq!(layers.elevation().params().frequency, 3.0);
        assert!(layers.elevation().params().persistence.is_finite());

        assert!(!layers.set_parameter(LayerKind::Elevation, "waterLevel", 0.2).unwrap());
    }

    #[test]
    fn test_committed_edit_changes_only_its_window() {
        let (world, mut layers) = small_set(15);
        let request = RegionRequest::new(GeoRegion::full_globe(), 64, 32, None).unwrap();
        let before = {
            let ctx = LayerContext { world: &world, layers: &layers };
            layers.elevation().sample_region(&ctx, &request).unwrap()
        };

        let window = GeoRegion::new(0.0, 1.0, 0.0, 0.8).unwrap();
        layers
            .commit_delta(LayerKind::Elevation, LayerDelta::new().within(window).seed(7))
            .unwrap();

        let ctx = LayerContext { world: &world, layers: &layers };
        let after = layers.elevation().sample_region(&ctx, &request).unwrap();
        let grid = request.grid;
        let mut changed_inside = false;
        for y in 0..32 {
            for x in 0..64 {
                let (lon, lat) = (grid.lon_at(x), grid.lat_at(y));
                if window.contains(lon, lat) {
                    changed_inside |= before.get(x, y) != after.get(x, y);
                } else {
                    assert_eq!(before.get(x, y), after.get(x, y));
                }
            }
        }
        assert!(changed_inside);
    }
}
