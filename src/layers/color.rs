//! The composite view: every other layer blended into one RGBA raster.
//!
//! Blend order, per pixel:
//!
//! 1. Elevation through the terrain ramp (heights measured above the water level)
//! 2. Latitude: polar frost toward the poles, scaled by `latitude_tint`
//! 3. Biome overlay at `biome_opacity`, then land type overlay at `land_type_opacity`
//! 4. Precipitation: pull toward the dry/wet ramp by `precipitation_tint`
//! 5. Water: pixels below the water level are replaced by depth-shaded ocean
//!
//! Constituents are always read at the requested grid. Region-incapable ones
//! answer through the lossy full-globe resample, so composites of deep zooms
//! show their native cell size instead of failing.

use std::sync::Arc;

use image::RgbaImage;
use serde::{Deserialize, Serialize};

use super::precipitation::wetness_color;
use super::{LayerContext, LayerKind, MapLayer, RegionRequest, SampleData};
use crate::cache::{BufferChannel, CacheLimits, SharedCache};
use crate::error::{LayerError, Result};
use crate::tilemap::{color_from_fn_par, lerp_color, Tilemap};

const FROST_COLOR: [u8; 4] = [236, 240, 246, 255];
/// Normalized latitude where frost starts.
const FROST_START: f32 = 0.7;

/// Compositor weights, each in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BlendConfig {
    pub latitude_tint: f64,
    pub biome_opacity: f64,
    pub land_type_opacity: f64,
    pub precipitation_tint: f64,
}

impl Default for BlendConfig {
    fn default() -> Self {
        Self {
            latitude_tint: 0.6,
            biome_opacity: 0.35,
            land_type_opacity: 0.2,
            precipitation_tint: 0.15,
        }
    }
}

impl BlendConfig {
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("latitudeTint", self.latitude_tint),
            ("biomeOpacity", self.biome_opacity),
            ("landTypeOpacity", self.land_type_opacity),
            ("precipitationTint", self.precipitation_tint),
        ] {
            if !(value.is_finite() && (0.0..=1.0).contains(&value)) {
                return Err(LayerError::invalid(name, format!("{} is outside [0, 1]", value)));
            }
        }
        Ok(())
    }

    fn field_mut(&mut self, name: &str) -> Option<&mut f64> {
        match name {
            "latitudeTint" => Some(&mut self.latitude_tint),
            "biomeOpacity" => Some(&mut self.biome_opacity),
            "landTypeOpacity" => Some(&mut self.land_type_opacity),
            "precipitationTint" => Some(&mut self.precipitation_tint),
            _ => None,
        }
    }
}

/// Constituent values at one pixel.
#[derive(Clone, Copy, Debug)]
struct Inputs {
    elevation: f32,
    latitude: f32,
    biome: [u8; 4],
    land_type: [u8; 4],
    precipitation: f32,
    water_level: f32,
}

/// Land colors by height above water, 0 at the shoreline and 1 at the highest peak.
fn land_color(height: f32) -> [u8; 4] {
    const STOPS: [(f32, [u8; 4]); 6] = [
        (0.0, [210, 190, 140, 255]),  // Beach
        (0.08, [80, 150, 60, 255]),   // Coastal lowland
        (0.35, [100, 120, 55, 255]),  // Plains
        (0.55, [140, 120, 70, 255]),  // Foothills
        (0.8, [130, 118, 100, 255]),  // Mountains
        (0.92, [230, 235, 240, 255]), // Snow peaks
    ];
    let h = height.clamp(0.0, 1.0);
    for pair in STOPS.windows(2) {
        let ((t0, c0), (t1, c1)) = (pair[0], pair[1]);
        if h < t1 {
            return lerp_color(c0, c1, (h - t0) / (t1 - t0));
        }
    }
    STOPS[STOPS.len() - 1].1
}

/// Ocean colors by depth below the water level, 0 at the surface and 1 at the floor.
fn ocean_color(depth: f32) -> [u8; 4] {
    let d = depth.clamp(0.0, 1.0);
    if d < 0.15 {
        lerp_color([100, 180, 200, 255], [60, 150, 190, 255], d / 0.15)
    } else if d < 0.5 {
        lerp_color([60, 150, 190, 255], [30, 110, 170, 255], (d - 0.15) / 0.35)
    } else {
        lerp_color([30, 110, 170, 255], [5, 40, 100, 255], (d - 0.5) / 0.5)
    }
}

fn blend_pixel(blend: &BlendConfig, px: &Inputs) -> [u8; 4] {
    if px.elevation < px.water_level {
        let depth = (px.water_level - px.elevation) / px.water_level;
        return ocean_color(depth);
    }

    let above = if px.water_level < 1.0 {
        (px.elevation - px.water_level) / (1.0 - px.water_level)
    } else {
        0.0
    };
    let mut color = land_color(above);

    let polar = ((px.latitude.abs() - FROST_START) / (1.0 - FROST_START)).clamp(0.0, 1.0);
    color = lerp_color(color, FROST_COLOR, polar * blend.latitude_tint as f32);

    color = lerp_color(color, px.biome, blend.biome_opacity as f32);
    color = lerp_color(color, px.land_type, blend.land_type_opacity as f32);

    lerp_color(color, wetness_color(px.precipitation), blend.precipitation_tint as f32)
}

fn luminance(p: [u8; 4]) -> f32 {
    (0.2126 * p[0] as f32 + 0.7152 * p[1] as f32 + 0.0722 * p[2] as f32) / 255.0
}

pub struct ColorLayer {
    blend: BlendConfig,
    cache: SharedCache,
}

impl ColorLayer {
    pub fn new(blend: BlendConfig, limits: CacheLimits) -> Result<Self> {
        blend.validate()?;
        Ok(Self {
            blend,
            cache: SharedCache::with_limits(limits),
        })
    }

    pub fn blend(&self) -> &BlendConfig {
        &self.blend
    }

    fn composite(&self, ctx: &LayerContext<'_>, request: &RegionRequest<'_>) -> Result<RgbaImage> {
        let layers = ctx.layers;
        let plain = request.without_delta();
        for &kind in LayerKind::all() {
            if kind != LayerKind::Color && !layers.get(kind).supports_region() {
                tracing::debug!(layer = %kind, "constituent answers through full-globe resample");
            }
        }

        // The per-call delta only reaches elevation.
        let elevation = layers.elevation().sample_region(ctx, request)?;
        let latitude = layers.latitude().sample_region(ctx, &plain)?;
        let biome = layers.biome().sample_region(ctx, &plain)?;
        let land_type = layers.land_type().sample_region(ctx, &plain)?;
        let precipitation = layers.precipitation().sample_region(ctx, &plain)?;
        let water_level = layers.water().level() as f32;
        let (biome_palette, land_palette) = (layers.biome().palette(), layers.land_type().palette());

        let res = request.grid.resolution;
        color_from_fn_par(res.x, res.y, |x, y| {
            let inputs = Inputs {
                elevation: *elevation.get(x, y),
                latitude: *latitude.get(x, y),
                biome: biome_palette.color(*biome.get(x, y) as usize),
                land_type: land_palette.color(*land_type.get(x, y) as usize),
                precipitation: *precipitation.get(x, y),
                water_level,
            };
            blend_pixel(&self.blend, &inputs)
        })
    }
}

impl MapLayer for ColorLayer {
    fn kind(&self) -> LayerKind {
        LayerKind::Color
    }

    fn cache(&self) -> &SharedCache {
        &self.cache
    }

    /// Luminance of the composite in `[0, 1]`.
    fn sample(&self, ctx: &LayerContext<'_>) -> Result<Arc<Tilemap<f32>>> {
        self.sample_region(ctx, &RegionRequest::full_globe(ctx.world))
    }

    fn get_color(&self, ctx: &LayerContext<'_>) -> Result<Arc<RgbaImage>> {
        self.get_color_region(ctx, &RegionRequest::full_globe(ctx.world))
    }

    /// `[r, g, b, a]` normalized to `[0, 1]`.
    fn sample_point(&self, ctx: &LayerContext<'_>, lon: f64, lat: f64) -> Result<SampleData> {
        let layers = ctx.layers;
        let biome = layers.biome().sample_point(ctx, lon, lat)?.primary() as usize;
        let land_type = layers.land_type().sample_point(ctx, lon, lat)?.primary() as usize;
        let inputs = Inputs {
            elevation: layers.elevation().sample_point(ctx, lon, lat)?.primary(),
            latitude: layers.latitude().sample_point(ctx, lon, lat)?.primary(),
            biome: layers.biome().palette().color(biome),
            land_type: layers.land_type().palette().color(land_type),
            precipitation: layers.precipitation().sample_point(ctx, lon, lat)?.primary(),
            water_level: layers.water().level() as f32,
        };
        let rgba = blend_pixel(&self.blend, &inputs);
        Ok(SampleData::new(&rgba.map(|c| c as f32 / 255.0)))
    }

    fn supports_region(&self) -> bool {
        true
    }

    fn sample_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<Tilemap<f32>>> {
        self.cache.scalar(request.key(BufferChannel::Scalar), || {
            let colors = self.get_color_region(ctx, request)?;
            let (w, h) = (colors.width() as usize, colors.height() as usize);
            Ok(Tilemap::from_fn_par(w, h, |x, y| {
                luminance(colors.get_pixel(x as u32, y as u32).0)
            }))
        })
    }

    fn get_color_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        self.cache
            .color(request.key(BufferChannel::Color), || self.composite(ctx, request))
    }

    fn set_parameter(&mut self, name: &str, value: f64) -> Result<bool> {
        let mut candidate = self.blend;
        let Some(field) = candidate.field_mut(name) else {
            return Ok(false);
        };
        *field = value;
        candidate.validate()?;
        self.blend = candidate;
        self.cache.invalidate();
        Ok(true)
    }
}
