//! World map layer compositing library
//!
//! Procedural geographic layers (elevation, latitude, biome, land type,
//! precipitation, water) sampled at any resolution over any lon/lat window,
//! composited into a color view and projected for display.

pub mod atlas;
pub mod cache;
pub mod config;
pub mod delta;
pub mod error;
pub mod export;
pub mod geo;
pub mod gpu;
pub mod layers;
pub mod noise_field;
pub mod palette;
pub mod projection;
pub mod tilemap;
pub mod world;

pub use atlas::Atlas;
pub use config::AtlasConfig;
pub use error::{LayerError, ParseError, Result};
pub use geo::GeoRegion;
pub use layers::{LayerKind, MapLayer};
