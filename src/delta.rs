//! Sparse overrides of a layer's procedural parameters.
//!
//! A [`LayerDelta`] replaces some noise parameters inside an optional geographic
//! window. Passed to a region query it affects that call only; committed through
//! the atlas it becomes a stored localized edit.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::error::Result;
use crate::geo::GeoRegion;
use crate::noise_field::{NoiseField, NoiseParams};

/// Per-region override of noise parameters. `None` fields keep the layer's value.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct LayerDelta {
    /// Window the override applies to; `None` means everywhere.
    pub bounds: Option<GeoRegion>,
    pub frequency: Option<f64>,
    pub lacunarity: Option<f64>,
    pub octaves: Option<u32>,
    pub persistence: Option<f64>,
    pub seed: Option<u32>,
}

impl LayerDelta {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn within(mut self, bounds: GeoRegion) -> Self {
        self.bounds = Some(bounds);
        self
    }

    pub fn frequency(mut self, frequency: f64) -> Self {
        self.frequency = Some(frequency);
        self
    }

    pub fn lacunarity(mut self, lacunarity: f64) -> Self {
        self.lacunarity = Some(lacunarity);
        self
    }

    pub fn octaves(mut self, octaves: u32) -> Self {
        self.octaves = Some(octaves);
        self
    }

    pub fn persistence(mut self, persistence: f64) -> Self {
        self.persistence = Some(persistence);
        self
    }

    pub fn seed(mut self, seed: u32) -> Self {
        self.seed = Some(seed);
        self
    }

    /// True when the delta overrides nothing.
    pub fn is_empty(&self) -> bool {
        self.frequency.is_none()
            && self.lacunarity.is_none()
            && self.octaves.is_none()
            && self.persistence.is_none()
            && self.seed.is_none()
    }

    /// The base parameters with this delta's overrides applied.
    pub fn apply(&self, base: &NoiseParams) -> NoiseParams {
        NoiseParams {
            frequency: self.frequency.unwrap_or(base.frequency),
            lacunarity: self.lacunarity.unwrap_or(base.lacunarity),
            octaves: self.octaves.unwrap_or(base.octaves),
            persistence: self.persistence.unwrap_or(base.persistence),
            seed: self.seed.unwrap_or(base.seed),
        }
    }

    pub fn covers(&self, lon: f64, lat: f64) -> bool {
        self.bounds.map_or(true, |b| b.contains(lon, lat))
    }

    /// Stable fingerprint used in cache keys. Never zero, so zero can mean "no delta".
    pub fn fingerprint(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.hash_into(&mut hasher);
        hasher.finish().max(1)
    }

    fn hash_into<H: Hasher>(&self, state: &mut H) {
        self.bounds.map(|b| b.key()).hash(state);
        self.frequency.map(f64::to_bits).hash(state);
        self.lacunarity.map(f64::to_bits).hash(state);
        self.octaves.hash(state);
        self.persistence.map(f64::to_bits).hash(state);
        self.seed.hash(state);
    }
}

/// A base noise field with windowed overrides stacked on top.
/// Later patches win where windows overlap.
#[derive(Clone, Debug)]
pub struct PatchedField {
    base: NoiseField,
    patches: Vec<(Option<GeoRegion>, NoiseField)>,
}

impl PatchedField {
    /// Resolve stored edits and an optional per-call delta against `base`.
    /// Fails if any override produces an invalid parameter set.
    pub fn build(
        base: &NoiseField,
        edits: &[LayerDelta],
        call_delta: Option<&LayerDelta>,
    ) -> Result<Self> {
        let mut patches = Vec::with_capacity(edits.len() + 1);
        for delta in edits.iter().chain(call_delta) {
            if delta.is_empty() {
                continue;
            }
            let params = delta.apply(base.params());
            patches.push((delta.bounds, NoiseField::new(params)?));
        }
        Ok(Self {
            base: base.clone(),
            patches,
        })
    }

    /// Noise in `[0, 1]` at a geographic position.
    pub fn at(&self, lon: f64, lat: f64) -> f64 {
        for (bounds, field) in self.patches.iter().rev() {
            if bounds.map_or(true, |b| b.contains(lon, lat)) {
                return field.at(lon, lat);
            }
        }
        self.base.at(lon, lat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_overrides_only_set_fields() {
        let base = NoiseParams::with_seed(3);
        let delta = LayerDelta::new().frequency(4.0).octaves(2);
        let out = delta.apply(&base);
        assert_eq!(out.frequency, 4.0);
        assert_eq!(out.octaves, 2);
        assert_eq!(out.seed, 3);
        assert_eq!(out.persistence, base.persistence);
    }

    #[test]
    fn test_fingerprint_distinguishes_deltas() {
        let a = LayerDelta::new().frequency(2.0);
        let b = LayerDelta::new().frequency(2.5);
        assert_eq!(a.fingerprint(), a.clone().fingerprint());
        assert_ne!(a.fingerprint(), b.fingerprint());
        assert_ne!(LayerDelta::new().fingerprint(), 0);
    }

    #[test]
    fn test_patch_applies_only_inside_bounds() {
        let base = NoiseField::new(NoiseParams::with_seed(5)).unwrap();
        let window = GeoRegion::new(0.0, 0.5, 0.0, 0.5).unwrap();
        let delta = LayerDelta::new().within(window).seed(99);
        let patched = PatchedField::build(&base, &[], Some(&delta)).unwrap();
        let other = NoiseField::new(NoiseParams::with_seed(99)).unwrap();

        assert_eq!(patched.at(0.25, 0.25), other.at(0.25, 0.25));
        assert_eq!(patched.at(-1.0, -0.5), base.at(-1.0, -0.5));
    }

    #[test]
    fn test_invalid_override_fails() {
        let base = NoiseField::new(NoiseParams::default()).unwrap();
        let delta = LayerDelta::new().persistence(0.0);
        assert!(PatchedField::build(&base, &[], Some(&delta)).is_err());
    }
}
