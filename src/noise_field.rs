//! Deterministic fractal noise over the unit sphere.
//!
//! Layers evaluate noise at the 3D sphere point of a longitude/latitude pair, so a
//! value depends only on the geographic position and the parameter set. That makes
//! adjoining regions agree at their shared edge and removes the seam at the
//! antimeridian that a 2D equirectangular domain would have.

use noise::{NoiseFn, Perlin};
use serde::{Deserialize, Serialize};

use crate::error::{LayerError, Result};
use crate::geo::to_sphere;

/// Upper bound on octaves.
pub const MAX_OCTAVES: u32 = 16;

/// Procedural parameters of one fractal noise field.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NoiseParams {
    /// Base frequency on the unit sphere (lower = larger features)
    pub frequency: f64,
    /// Frequency multiplier per octave
    pub lacunarity: f64,
    /// Number of noise octaves
    pub octaves: u32,
    /// Amplitude decay per octave
    pub persistence: f64,
    pub seed: u32,
}

impl Default for NoiseParams {
    fn default() -> Self {
        Self {
            frequency: 1.5,
            lacunarity: 2.0,
            octaves: 6,
            persistence: 0.5,
            seed: 0,
        }
    }
}

impl NoiseParams {
    pub fn with_seed(seed: u32) -> Self {
        Self { seed, ..Self::default() }
    }

    /// Reject non-positive or non-finite frequency, lacunarity and persistence,
    /// and octave counts outside `1..=MAX_OCTAVES`.
    pub fn validate(&self) -> Result<()> {
        positive_finite("frequency", self.frequency)?;
        positive_finite("lacunarity", self.lacunarity)?;
        positive_finite("persistence", self.persistence)?;
        if self.octaves == 0 || self.octaves > MAX_OCTAVES {
            return Err(LayerError::invalid(
                "octaves",
                format!("{} is outside 1..={}", self.octaves, MAX_OCTAVES),
            ));
        }
        Ok(())
    }

    /// Apply a named scalar. Returns `Ok(false)` for names this set does not own.
    /// On error `self` is left untouched.
    pub fn set_named(&mut self, name: &str, value: f64) -> Result<bool> {
        let mut candidate = *self;
        match name {
            "frequency" => candidate.frequency = value,
            "lacunarity" => candidate.lacunarity = value,
            "persistence" => candidate.persistence = value,
            "octaves" => candidate.octaves = integral(name, value)? as u32,
            "seed" => candidate.seed = integral(name, value)? as u32,
            _ => return Ok(false),
        }
        candidate.validate()?;
        *self = candidate;
        Ok(true)
    }
}

fn positive_finite(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(LayerError::invalid(name, format!("{} is not a positive finite value", value)))
    }
}

fn integral(name: &str, value: f64) -> Result<u64> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 && value <= u32::MAX as f64 {
        Ok(value as u64)
    } else {
        Err(LayerError::invalid(name, format!("{} is not a non-negative integer", value)))
    }
}

/// A validated noise field ready for sampling.
#[derive(Clone, Debug)]
pub struct NoiseField {
    params: NoiseParams,
    perlin: Perlin,
}

impl NoiseField {
    pub fn new(params: NoiseParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            perlin: Perlin::new(params.seed),
        })
    }

    pub fn params(&self) -> &NoiseParams {
        &self.params
    }

    /// Fractional Brownian motion at a 3D point, normalized to `[-1, 1]`.
    pub fn value(&self, x: f64, y: f64, z: f64) -> f64 {
        let mut total = 0.0;
        let mut amplitude = 1.0;
        let mut frequency = self.params.frequency;
        let mut max_value = 0.0;

        for _ in 0..self.params.octaves {
            total += amplitude * self.perlin.get([x * frequency, y * frequency, z * frequency]);
            max_value += amplitude;
            amplitude *= self.params.persistence;
            frequency *= self.params.lacunarity;
        }

        (total / max_value).clamp(-1.0, 1.0)
    }

    /// Noise at a geographic position, mapped to `[0, 1]`.
    pub fn at(&self, lon: f64, lat: f64) -> f64 {
        let [x, y, z] = to_sphere(lon, lat);
        (self.value(x, y, z) + 1.0) * 0.5
    }
}

/// One-shot evaluation with explicit parameters.
pub fn value(x: f64, y: f64, z: f64, params: &NoiseParams) -> Result<f64> {
    Ok(NoiseField::new(*params)?.value(x, y, z))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_is_deterministic() {
        let params = NoiseParams { seed: 77, ..NoiseParams::default() };
        for i in 0..50 {
            let p = i as f64 * 0.173;
            let a = value(p, -p * 0.5, 0.3, &params).unwrap();
            let b = value(p, -p * 0.5, 0.3, &params).unwrap();
            assert_eq!(a.to_bits(), b.to_bits());
            assert!((-1.0..=1.0).contains(&a));
        }
    }

    #[test]
    fn test_seed_changes_field() {
        let a = NoiseField::new(NoiseParams::with_seed(1)).unwrap();
        let b = NoiseField::new(NoiseParams::with_seed(2)).unwrap();
        let differs = (0..20).any(|i| {
            let lon = i as f64 * 0.3 - 3.0;
            a.at(lon, 0.2) != b.at(lon, 0.2)
        });
        assert!(differs);
    }

    #[test]
    fn test_antimeridian_is_continuous() {
        let field = NoiseField::new(NoiseParams::with_seed(9)).unwrap();
        let east = field.at(std::f64::consts::PI, 0.4);
        let west = field.at(-std::f64::consts::PI, 0.4);
        assert!((east - west).abs() < 1e-9);
    }

    #[test]
    fn test_validation_rejects_bad_params() {
        let base = NoiseParams::default();
        assert!(NoiseField::new(NoiseParams { frequency: 0.0, ..base }).is_err());
        assert!(NoiseField::new(NoiseParams { frequency: f64::INFINITY, ..base }).is_err());
        assert!(NoiseField::new(NoiseParams { persistence: -0.5, ..base }).is_err());
        assert!(NoiseField::new(NoiseParams { octaves: 0, ..base }).is_err());
        assert!(NoiseField::new(NoiseParams { octaves: MAX_OCTAVES + 1, ..base }).is_err());
        assert!(NoiseField::new(base).is_ok());
    }

    #[test]
    fn test_set_named_keeps_previous_on_error() {
        let mut params = NoiseParams::default();
        assert!(params.set_named("frequency", -1.0).is_err());
        assert_eq!(params, NoiseParams::default());

        assert!(params.set_named("octaves", 2.5).is_err());
        assert_eq!(params.octaves, NoiseParams::default().octaves);

        assert!(params.set_named("octaves", 4.0).unwrap());
        assert_eq!(params.octaves, 4);

        assert!(!params.set_named("waterLevel", 0.3).unwrap());
    }
}
