//! World: the global parameters every layer samples against.

use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::error::Result;
use crate::geo::{GeoRegion, Resolution, SampleGrid};

/// Purposes used to derive independent per-layer seeds from the master seed.
pub mod seed_purpose {
    pub const ELEVATION: u64 = 1;
    pub const PRECIPITATION: u64 = 2;
    pub const BIOME_TEMPERATURE: u64 = 3;
    pub const BIOME_MOISTURE: u64 = 4;
    pub const LAND_TYPE: u64 = 5;
}

/// Global world parameters. Layers never own it; they receive it at sample time.
#[derive(Clone, Debug, PartialEq)]
pub struct World {
    seed: u64,
    /// Native full-globe resolution used by `sample()` / `get_color()`
    native: Resolution,
    extents: GeoRegion,
}

impl World {
    pub fn new(seed: u64, width: usize, height: usize) -> Result<Self> {
        Ok(Self {
            seed,
            native: Resolution::new(width, height)?,
            extents: GeoRegion::full_globe(),
        })
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn native_resolution(&self) -> Resolution {
        self.native
    }

    pub fn extents(&self) -> GeoRegion {
        self.extents
    }

    /// The grid behind full-globe queries.
    pub fn native_grid(&self) -> SampleGrid {
        SampleGrid::new(self.extents, self.native)
    }

    /// Derive an independent 32-bit noise seed for a purpose.
    pub fn derive_seed(&self, purpose: u64) -> u32 {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ purpose.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        rng.next_u32()
    }
}
