//! Land type classification (plains, hills, plateau, mountains by default).
//!
//! Computed only as a native full-globe buffer. Region queries go through the
//! lossy fallback with nearest-cell reads so category ids are never blended.

use std::sync::Arc;

use image::RgbaImage;

use super::{
    category_of, reconfigure_palette, render_grid, LayerContext, LayerKind, MapLayer, NoiseState,
    RegionRequest, SampleData,
};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::delta::LayerDelta;
use crate::error::Result;
use crate::geo::globe_pixel;
use crate::noise_field::NoiseParams;
use crate::palette::Palette;
use crate::tilemap::{colorize, Interpolation, Tilemap};

pub fn default_palette() -> Palette {
    Palette::from_table([
        [120, 168, 88, 255],
        [150, 140, 92, 255],
        [176, 128, 84, 255],
        [128, 116, 110, 255],
    ])
}

pub struct LandTypeLayer {
    noise: NoiseState,
    palette: Palette,
    cache: SharedCache,
}

impl LandTypeLayer {
    pub fn new(params: NoiseParams, palette: Palette, limits: CacheLimits) -> Result<Self> {
        Ok(Self {
            noise: NoiseState::new(params)?,
            palette,
            cache: SharedCache::with_limits(limits),
        })
    }

    pub fn palette(&self) -> &Palette {
        &self.palette
    }

    pub fn params(&self) -> &NoiseParams {
        self.noise.params()
    }
}

impl MapLayer for LandTypeLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::LandType
    }

    fn cache(&self) -> &SharedCache {
        &self.cache
    }

    fn sample(&self, ctx: &LayerContext<'_>) -> Result<Arc<Tilemap<f32>>> {
        let request = RegionRequest::full_globe(ctx.world);
        self.cache.scalar(request.key(BufferChannel::Scalar), || {
            let field = self.noise.resolve(None)?;
            let count = self.palette.len();
            tracing::debug!(categories = count, "computing native land type buffer");
            Ok(render_grid(&request.grid, |lon, lat| {
                category_of(field.at(lon, lat), count) as f32
            }))
        })
    }

    fn get_color(&self, ctx: &LayerContext<'_>) -> Result<Arc<RgbaImage>> {
        let request = RegionRequest::full_globe(ctx.world);
        self.cache.color(request.key(BufferChannel::Color), || {
            let categories = self.sample(ctx)?;
            colorize(&categories, |c| self.palette.color(c as usize))
        })
    }

    /// Nearest cell of the native buffer, so a point always agrees with it.
    fn sample_point(&self, ctx: &LayerContext<'_>, lon: f64, lat: f64) -> Result<SampleData> {
        let full = self.sample(ctx)?;
        let (fx, fy) = globe_pixel(lon, lat, full.width, full.height);
        Ok(SampleData::new(&[full.sample_nearest(fx, fy)]))
    }

    fn interpolation(&self) -> Interpolation {
        Interpolation::Nearest
    }

    fn parse_parameters(&mut self, params: &str) -> Result<()> {
        reconfigure_palette(LayerKind::LandType, &mut self.palette, params)?;
        self.cache.invalidate();
        Ok(())
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
    use crate::error::{LayerError, ParseError};
    use crate::geo::GeoRegion;
    use crate::layers::test_support::small_set;

    #[test]
    fn test_parse_two_categories() {
        let (world, mut layers) = small_set(41);
        layers
            .parse_parameters(LayerKind::LandType, "count:2,colors:[{0,0,255,255},{0,255,0,255}]")
            .unwrap();
        let palette = layers.land_type().palette();
        assert_eq!(palette.len(), 2);
        assert_eq!(palette.colors(), &[[0, 0, 255, 255], [0, 255, 0, 255]]);

        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.land_type().sample(&ctx).unwrap();
        assert!(grid.as_slice().iter().all(|&c| c == 0.0 || c == 1.0));
        let colors = layers.land_type().get_color(&ctx).unwrap();
        assert!(colors
            .pixels()
            .all(|p| p.0 == [0, 0, 255, 255] || p.0 == [0, 255, 0, 255]));
    }

    #[test]
    fn test_count_mismatch_keeps_previous() {
        let (_, mut layers) = small_set(42);
        let before = layers.land_type().palette().clone();
        let err = layers
            .parse_parameters(LayerKind::LandType, "count:3,colors:[{0,0,0,0}]")
            .unwrap_err();
        assert!(matches!(
            err,
            LayerError::Parse(ParseError::CountMismatch { count: 3, colors: 1 })
        ));
        assert_eq!(*layers.land_type().palette(), before);
    }

    #[test]
    fn test_color_region_falls_back_to_crop() {
        let (world, layers) = small_set(43);
        let ctx = LayerContext { world: &world, layers: &layers };
        let layer = layers.land_type();
        assert!(!layer.supports_region());

        let region = GeoRegion::from_degrees(170.0, -170.0, -10.0, 10.0).unwrap();
        let request = RegionRequest::new(region, 20, 10, None).unwrap();
        let img = layer.get_color_region(&ctx, &request).unwrap();
        assert_eq!((img.width(), img.height()), (20, 10));

        let palette = layer.palette().colors();
        assert!(img.pixels().all(|p| palette.contains(&p.0)));
    }

    #[test]
    fn test_fallback_ignores_delta() {
        let (world, layers) = small_set(44);
        let ctx = LayerContext { world: &world, layers: &layers };
        let delta = LayerDelta::new().seed(99);
        let region = GeoRegion::new(-1.0, 1.0, -0.5, 0.5).unwrap();
        let plain = layers
            .land_type()
            .sample_region(&ctx, &RegionRequest::new(region, 16, 8, None).unwrap())
            .unwrap();
        let edited = layers
            .land_type()
            .sample_region(&ctx, &RegionRequest::new(region, 16, 8, Some(&delta)).unwrap())
            .unwrap();
        assert!(Arc::ptr_eq(&plain, &edited));
    }

    #[test]
    fn test_native_grid_region_is_full_globe_buffer() {
        let (world, layers) = small_set(46);
        let ctx = LayerContext { world: &world, layers: &layers };
        let layer = layers.land_type();
        let request = RegionRequest { grid: world.native_grid(), delta: None };

        let region = layer.sample_region(&ctx, &request).unwrap();
        let full = layer.sample(&ctx).unwrap();
        assert!(Arc::ptr_eq(&region, &full));
        let colors = layer.get_color_region(&ctx, &request).unwrap();
        assert!(Arc::ptr_eq(&colors, &layer.get_color(&ctx).unwrap()));
        // One scalar and one color computation.
        assert_eq!(layer.cache_stats().misses, 2);
    }

    #[test]
    fn test_point_agrees_with_buffer() {
        let (world, layers) = small_set(45);
        let ctx = LayerContext { world: &world, layers: &layers };
        let grid = layers.land_type().sample(&ctx).unwrap();
        let native = world.native_grid();
        let point = layers
            .land_type()
            .sample_point(&ctx, native.lon_at(17), native.lat_at(9))
            .unwrap();
        assert_eq!(point.primary(), *grid.get(17, 9));
    }
}
