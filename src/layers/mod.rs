//! Map layers: named, colorable, sampleable views of the world.
//!
//! Every layer kind implements [`MapLayer`]. Region-capable layers compute any
//! lon/lat window at any resolution directly; the rest only produce their native
//! full-globe buffer and answer region queries through the lossy fallback in
//! [`fallback_sample_region`] / [`fallback_color_region`].

pub mod biome;
pub mod color;
pub mod elevation;
pub mod land_type;
pub mod latitude;
pub mod precipitation;
pub mod water;

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use image::RgbaImage;

use crate::cache::{BufferChannel, CacheKey, CacheStats, SharedCache};
use crate::config::AtlasConfig;
use crate::delta::{LayerDelta, PatchedField};
use crate::error::{LayerError, Result};
use crate::geo::{GeoRegion, Resolution, SampleGrid};
use crate::noise_field::{NoiseField, NoiseParams};
use crate::palette::Palette;
use crate::tilemap::{resample_color, Interpolation, Tilemap};
use crate::world::World;

pub use biome::BiomeLayer;
pub use color::{BlendConfig, ColorLayer};
pub use elevation::ElevationLayer;
pub use land_type::LandTypeLayer;
pub use latitude::LatitudeLayer;
pub use precipitation::PrecipitationLayer;
pub use water::WaterLayer;

/// The closed set of layer kinds.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LayerKind {
    Elevation,
    Latitude,
    Biome,
    LandType,
    Precipitation,
    Water,
    Color,
}

impl LayerKind {
    pub const COUNT: usize = 7;

    pub fn all() -> &'static [Self] {
        &[
            Self::Elevation,
            Self::Latitude,
            Self::Biome,
            Self::LandType,
            Self::Precipitation,
            Self::Water,
            Self::Color,
        ]
    }

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Elevation => "elevation",
            Self::Latitude => "latitude",
            Self::Biome => "biome",
            Self::LandType => "land_type",
            Self::Precipitation => "precipitation",
            Self::Water => "water",
            Self::Color => "color",
        }
    }
}

impl fmt::Display for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for LayerKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "elevation" => Ok(Self::Elevation),
            "latitude" => Ok(Self::Latitude),
            "biome" => Ok(Self::Biome),
            "land_type" | "landtype" => Ok(Self::LandType),
            "precipitation" => Ok(Self::Precipitation),
            "water" => Ok(Self::Water),
            "color" | "composite" => Ok(Self::Color),
            other => Err(format!("unknown layer `{}`", other)),
        }
    }
}

/// Scalar channels returned by a point sample.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleData {
    channels: [f32; SampleData::MAX_CHANNELS],
    len: usize,
}

impl SampleData {
    pub const MAX_CHANNELS: usize = 4;

    /// Build from up to four values; extra values are dropped.
    pub fn new(values: &[f32]) -> Self {
        let len = values.len().min(Self::MAX_CHANNELS);
        let mut channels = [0.0; Self::MAX_CHANNELS];
        channels[..len].copy_from_slice(&values[..len]);
        Self { channels, len }
    }

    pub fn channels(&self) -> &[f32] {
        &self.channels[..self.len]
    }

    pub fn get(&self, channel: usize) -> Option<f32> {
        self.channels().get(channel).copied()
    }

    /// First channel.
    pub fn primary(&self) -> f32 {
        self.channels[0]
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// What a layer may consult while sampling: the world and its sibling layers.
#[derive(Clone, Copy)]
pub struct LayerContext<'a> {
    pub world: &'a World,
    pub layers: &'a LayerSet,
}

/// A validated region query.
#[derive(Clone, Copy, Debug)]
pub struct RegionRequest<'a> {
    pub grid: SampleGrid,
    pub delta: Option<&'a LayerDelta>,
}

impl<'a> RegionRequest<'a> {
    /// Fails with `InvalidParameter` when either resolution axis is zero.
    pub fn new(
        region: GeoRegion,
        res_x: usize,
        res_y: usize,
        delta: Option<&'a LayerDelta>,
    ) -> Result<Self> {
        Ok(Self {
            grid: SampleGrid::new(region, Resolution::new(res_x, res_y)?),
            delta,
        })
    }

    /// The whole globe at the world's native resolution, no delta.
    pub fn full_globe(world: &World) -> Self {
        Self {
            grid: world.native_grid(),
            delta: None,
        }
    }

    pub fn without_delta(&self) -> RegionRequest<'a> {
        RegionRequest {
            grid: self.grid,
            delta: None,
        }
    }

    /// Cache fingerprint of the per-call delta (0 for none).
    pub fn delta_key(&self) -> u64 {
        self.delta.map_or(0, LayerDelta::fingerprint)
    }

    pub fn key(&self, channel: BufferChannel) -> CacheKey {
        CacheKey::new(channel, &self.grid, self.delta_key())
    }
}

/// Capability interface shared by every layer kind.
///
/// Sampling takes `&self`; mutation takes `&mut self` and is serialized by the
/// atlas's reader-writer lock. Unsupported operations fall back to defaults:
/// region queries crop the full-globe buffer, parameter strings are rejected,
/// and named parameters are reported as unrecognized.
pub trait MapLayer: Send + Sync {
    fn kind(&self) -> LayerKind;

    fn cache(&self) -> &SharedCache;

    /// Full-globe scalar buffer at the world's native resolution.
    fn sample(&self, ctx: &LayerContext<'_>) -> Result<Arc<Tilemap<f32>>>;

    /// The layer's own visualization at native resolution.
    fn get_color(&self, ctx: &LayerContext<'_>) -> Result<Arc<RgbaImage>>;

    /// Channels at a single geographic position.
    fn sample_point(&self, ctx: &LayerContext<'_>, lon: f64, lat: f64) -> Result<SampleData>;

    /// Whether arbitrary windows and resolutions are computed natively.
    fn supports_region(&self) -> bool {
        false
    }

    /// How the region fallback reads the full-globe buffer.
    fn interpolation(&self) -> Interpolation {
        Interpolation::Bilinear
    }

    fn sample_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<Tilemap<f32>>> {
        fallback_sample_region(self, ctx, request)
    }

    fn get_color_region(
        &self,
        ctx: &LayerContext<'_>,
        request: &RegionRequest<'_>,
    ) -> Result<Arc<RgbaImage>> {
        fallback_color_region(self, ctx, request)
    }

    /// Reconfigure a classification scheme from `count:<N>,colors:[...]`.
    fn parse_parameters(&mut self, _params: &str) -> Result<()> {
        Err(LayerError::Unsupported {
            layer: self.kind(),
            operation: "parse_parameters",
        })
    }

    /// Set one named scalar. `Ok(false)` means the name is not recognized.
    fn set_parameter(&mut self, _name: &str, _value: f64) -> Result<bool> {
        Ok(false)
    }

    /// Store a localized edit of the layer's noise parameters.
    fn commit_delta(&mut self, _delta: LayerDelta) -> Result<()> {
        Err(LayerError::Unsupported {
            layer: self.kind(),
            operation: "commit_delta",
        })
    }

    /// Drop every stored edit. Returns whether anything was removed.
    fn clear_edits(&mut self) -> bool {
        false
    }

    fn cache_stats(&self) -> CacheStats {
        self.cache().stats()
    }

    fn invalidate(&self) {
        self.cache().invalidate();
    }
}

/// Region query for layers without native region support: resample the
/// full-globe buffer onto the requested grid. Lossy when the window is finer
/// than the native resolution; per-call deltas are ignored. A request for the
/// native grid itself is the full-globe buffer.
pub fn fallback_sample_region<L: MapLayer + ?Sized>(
    layer: &L,
    ctx: &LayerContext<'_>,
    request: &RegionRequest<'_>,
) -> Result<Arc<Tilemap<f32>>> {
    if request.delta.is_some() {
        tracing::debug!(layer = %layer.kind(), "ignoring delta on fallback region query");
    }
    let request = request.without_delta();
    if request.grid == ctx.world.native_grid() {
        return layer.sample(ctx);
    }
    layer.cache().scalar(request.key(BufferChannel::Scalar), || {
        let full = layer.sample(ctx)?;
        tracing::debug!(layer = %layer.kind(), "resampling full-globe buffer for region query");
        Ok(full.resample_to(&request.grid, layer.interpolation()))
    })
}

/// Color counterpart of [`fallback_sample_region`]. Reads the full-globe colors
/// with the layer's [`MapLayer::interpolation`], so category layers keep exact
/// palette colors.
pub fn fallback_color_region<L: MapLayer + ?Sized>(
    layer: &L,
    ctx: &LayerContext<'_>,
    request: &RegionRequest<'_>,
) -> Result<Arc<RgbaImage>> {
    let request = request.without_delta();
    if request.grid == ctx.world.native_grid() {
        return layer.get_color(ctx);
    }
    layer.cache().color(request.key(BufferChannel::Color), || {
        let full = layer.get_color(ctx)?;
        tracing::debug!(layer = %layer.kind(), "resampling full-globe colors for region query");
        resample_color(&full, &request.grid, layer.interpolation())
    })
}

/// Evaluate `f(lon, lat)` over every cell of a grid.
pub(crate) fn render_grid<F>(grid: &SampleGrid, f: F) -> Tilemap<f32>
where
    F: Fn(f64, f64) -> f32 + Sync,
{
    Tilemap::from_fn_par(grid.resolution.x, grid.resolution.y, |x, y| {
        f(grid.lon_at(x), grid.lat_at(y))
    })
}

/// Noise parameters plus stored localized edits, shared by noise-driven layers.
#[derive(Clone, Debug)]
pub(crate) struct NoiseState {
    field: NoiseField,
    edits: Vec<LayerDelta>,
}

impl NoiseState {
    pub(crate) fn new(params: NoiseParams) -> Result<Self> {
        Ok(Self {
            field: NoiseField::new(params)?,
            edits: Vec::new(),
        })
    }

    pub(crate) fn params(&self) -> &NoiseParams {
        self.field.params()
    }

    /// Apply a named noise parameter; the previous field stays on error.
    pub(crate) fn set_named(&mut self, name: &str, value: f64) -> Result<bool> {
        let mut params = *self.field.params();
        if !params.set_named(name, value)? {
            return Ok(false);
        }
        self.field = NoiseField::new(params)?;
        Ok(true)
    }

    pub(crate) fn commit(&mut self, delta: LayerDelta) -> Result<()> {
        // Reject edits that would leave the layer unsampleable.
        NoiseField::new(delta.apply(self.field.params()))?;
        self.edits.push(delta);
        Ok(())
    }

    pub(crate) fn clear_edits(&mut self) -> bool {
        let had = !self.edits.is_empty();
        self.edits.clear();
        had
    }

    pub(crate) fn edits(&self) -> &[LayerDelta] {
        &self.edits
    }

    pub(crate) fn resolve(&self, call_delta: Option<&LayerDelta>) -> Result<PatchedField> {
        PatchedField::build(&self.field, &self.edits, call_delta)
    }
}

/// Replace a palette from a parameter string, keeping the old one on error.
/// Returns whether the category count changed.
pub(crate) fn reconfigure_palette(
    kind: LayerKind,
    palette: &mut Palette,
    params: &str,
) -> Result<bool> {
    match Palette::parse(params) {
        Ok(parsed) => {
            let count_changed = parsed.len() != palette.len();
            tracing::info!(layer = %kind, categories = parsed.len(), "palette reconfigured");
            *palette = parsed;
            Ok(count_changed)
        }
        Err(e) => {
            tracing::warn!(layer = %kind, error = %e, "rejected parameter string");
            Err(e.into())
        }
    }
}

/// Category index of a score in `[0, 1]` split into `count` equal bands.
pub(crate) fn category_of(score: f64, count: usize) -> usize {
    ((score.clamp(0.0, 1.0) * count as f64) as usize).min(count.saturating_sub(1))
}

/// One layer of each kind. Owned by the atlas behind its reader-writer lock.
pub struct LayerSet {
    elevation: ElevationLayer,
    latitude: LatitudeLayer,
    biome: BiomeLayer,
    land_type: LandTypeLayer,
    precipitation: PrecipitationLayer,
    water: WaterLayer,
    color: ColorLayer,
}

impl LayerSet {
    pub fn new(world: &World, config: &AtlasConfig) -> Result<Self> {
        let limits = config.cache_limits();
        Ok(Self {
            elevation: ElevationLayer::new(config.elevation_params(world), limits)?,
            latitude: LatitudeLayer::new(limits),
            biome: BiomeLayer::new(
                config.biome_temperature_params(world),
                config.biome_moisture_params(world),
                config.biome_palette()?,
                limits,
            )?,
            land_type: LandTypeLayer::new(
                config.land_type_params(world),
                config.land_type_palette()?,
                limits,
            )?,
            precipitation: PrecipitationLayer::new(config.precipitation_params(world), limits)?,
            water: WaterLayer::new(config.water_level, limits)?,
            color: ColorLayer::new(config.blend, limits)?,
        })
    }

    pub fn get(&self, kind: LayerKind) -> &dyn MapLayer {
        match kind {
            LayerKind::Elevation => &self.elevation,
            LayerKind::Latitude => &self.latitude,
            LayerKind::Biome => &self.biome,
            LayerKind::LandType => &self.land_type,
            LayerKind::Precipitation => &self.precipitation,
            LayerKind::Water => &self.water,
            LayerKind::Color => &self.color,
        }
    }

    fn get_mut(&mut self, kind: LayerKind) -> &mut dyn MapLayer {
        match kind {
            LayerKind::Elevation => &mut self.elevation,
            LayerKind::Latitude => &mut self.latitude,
            LayerKind::Biome => &mut self.biome,
            LayerKind::LandType => &mut self.land_type,
            LayerKind::Precipitation => &mut self.precipitation,
            LayerKind::Water => &mut self.water,
            LayerKind::Color => &mut self.color,
        }
    }

    pub fn elevation(&self) -> &ElevationLayer {
        &self.elevation
    }

    pub fn latitude(&self) -> &LatitudeLayer {
        &self.latitude
    }

    pub fn biome(&self) -> &BiomeLayer {
        &self.biome
    }

    pub fn land_type(&self) -> &LandTypeLayer {
        &self.land_type
    }

    pub fn precipitation(&self) -> &PrecipitationLayer {
        &self.precipitation
    }

    pub fn water(&self) -> &WaterLayer {
        &self.water
    }

    pub fn color(&self) -> &ColorLayer {
        &self.color
    }

    /// The composite depends on every other layer.
    fn after_mutation(&self, kind: LayerKind) {
        if kind != LayerKind::Color {
            self.color.invalidate();
        }
    }

    pub fn set_parameter(&mut self, kind: LayerKind, name: &str, value: f64) -> Result<bool> {
        match self.get_mut(kind).set_parameter(name, value) {
            Ok(true) => {
                tracing::info!(layer = %kind, name, value, "parameter updated");
                self.after_mutation(kind);
                Ok(true)
            }
            Ok(false) => {
                tracing::debug!(layer = %kind, name, "unrecognized parameter ignored");
                Ok(false)
            }
            Err(e) => {
                tracing::warn!(layer = %kind, name, value, error = %e, "parameter rejected");
                Err(e)
            }
        }
    }

    pub fn parse_parameters(&mut self, kind: LayerKind, params: &str) -> Result<()> {
        self.get_mut(kind).parse_parameters(params)?;
        self.after_mutation(kind);
        Ok(())
    }

    pub fn commit_delta(&mut self, kind: LayerKind, delta: LayerDelta) -> Result<()> {
        self.get_mut(kind).commit_delta(delta)?;
        tracing::info!(layer = %kind, "localized edit committed");
        self.after_mutation(kind);
        Ok(())
    }

    pub fn clear_edits(&mut self, kind: LayerKind) -> bool {
        let cleared = self.get_mut(kind).clear_edits();
        if cleared {
            self.after_mutation(kind);
        }
        cleared
    }

    /// Drop every cached buffer of every layer.
    pub fn invalidate_all(&self) {
        for &kind in LayerKind::all() {
            self.get(kind).invalidate();
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// A small world and layer set for unit tests.
    pub fn small_set(seed: u64) -> (World, LayerSet) {
        let config = AtlasConfig {
            seed,
            width: 64,
            height: 32,
            ..AtlasConfig::default()
        };
        let world = config.world().unwrap();
        let layers = LayerSet::new(&world, &config).unwrap();
        (world, layers)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::small_set;
    use super::*;

    #[test]
    fn test_kind_round_trip() {
        for &kind in LayerKind::all() {
            assert_eq!(kind.name().parse::<LayerKind>().unwrap(), kind);
        }
        assert_eq!("land-type".parse::<LayerKind>().unwrap(), LayerKind::LandType);
        assert!("percipitation".parse::<LayerKind>().is_err());
    }

    #[test]
    fn test_sample_data_channels() {
        let data = SampleData::new(&[0.8]);
        assert_eq!(data.channels(), &[0.8]);
        assert_eq!(data.get(1), None);
        let wide = SampleData::new(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(wide.len(), SampleData::MAX_CHANNELS);
    }

    #[test]
    fn test_zero_resolution_request_rejected() {
        let err = RegionRequest::new(GeoRegion::full_globe(), 0, 10, None).unwrap_err();
        assert!(matches!(err, LayerError::InvalidParameter { .. }));
    }

    #[test]
    fn test_category_of_bounds() {
        assert_eq!(category_of(0.0, 4), 0);
        assert_eq!(category_of(0.999, 4), 3);
        assert_eq!(category_of(1.0, 4), 3);
        assert_eq!(category_of(-3.0, 4), 0);
    }

    #[test]
    fn test_only_land_type_lacks_region_support() {
        let (_, layers) = small_set(1);
        for &kind in LayerKind::all() {
            assert_eq!(layers.get(kind).supports_region(), kind != LayerKind::LandType);
        }
    }

    #[test]
    fn test_unsupported_parse_is_reported() {
        let (_, mut layers) = small_set(1);
        let err = layers
            .parse_parameters(LayerKind::Elevation, "count:1,colors:[{0,0,0,0}]")
            .unwrap_err();
        assert!(matches!(err, LayerError::Unsupported { .. }));
    }

    #[test]
    fn test_constituent_mutation_invalidates_composite() {
        let (world, mut layers) = small_set(3);
        {
            let ctx = LayerContext { world: &world, layers: &layers };
            layers.color().get_color(&ctx).unwrap();
        }
        assert!(!layers.color().cache().is_empty());
        assert!(layers.set_parameter(LayerKind::Water, "waterLevel", 0.3).unwrap());
        assert!(layers.color().cache().is_empty());
    }
}
