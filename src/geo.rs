//! Geographic windows and the sampling grids laid over them.
//!
//! All angles are radians. Longitude windows may cross the antimeridian
//! (`lon_min > lon_max`), in which case the window wraps eastward through ±π.
//! Grids are edge-inclusive: the first column sits exactly on `lon_min` and the
//! last on `lon_max`, so two windows sharing an edge sample identical points there.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use crate::error::{LayerError, Result};

/// Largest buffer a single layer computation may allocate.
pub const MAX_BUFFER_PIXELS: u64 = 64 * 1024 * 1024;

/// Wrap a longitude into `[-π, π)`.
pub fn wrap_lon(lon: f64) -> f64 {
    if (-PI..PI).contains(&lon) {
        lon
    } else {
        (lon + PI).rem_euclid(TAU) - PI
    }
}

/// Convert longitude/latitude to a point on the unit sphere.
pub fn to_sphere(lon: f64, lat: f64) -> [f64; 3] {
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();
    [cos_lat * cos_lon, cos_lat * sin_lon, sin_lat]
}

/// A longitude/latitude window.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoRegion {
    pub lon_min: f64,
    pub lon_max: f64,
    pub lat_min: f64,
    pub lat_max: f64,
}

impl GeoRegion {
    /// Create a validated region. Longitudes are wrapped into `[-π, π]`;
    /// latitudes must lie in `[-π/2, π/2]` with `lat_min <= lat_max`.
    pub fn new(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Result<Self> {
        for (name, v) in [
            ("lonMin", lon_min),
            ("lonMax", lon_max),
            ("latMin", lat_min),
            ("latMax", lat_max),
        ] {
            if !v.is_finite() {
                return Err(LayerError::invalid(name, format!("{} is not finite", v)));
            }
        }
        let lat_limit = FRAC_PI_2 + 1e-9;
        if lat_min.abs() > lat_limit || lat_max.abs() > lat_limit {
            return Err(LayerError::invalid(
                "latitude",
                format!("[{}, {}] is outside [-pi/2, pi/2]", lat_min, lat_max),
            ));
        }
        if lat_min > lat_max {
            return Err(LayerError::invalid(
                "latitude",
                format!("latMin {} is greater than latMax {}", lat_min, lat_max),
            ));
        }

        if lon_max - lon_min > TAU + 1e-12 {
            return Err(LayerError::invalid(
                "longitude",
                format!("[{}, {}] spans more than the whole globe", lon_min, lon_max),
            ));
        }

        // A span of exactly 2π is the whole globe; keep it rather than collapsing it to zero.
        let (lon_min, lon_max) = if (lon_max - lon_min - TAU).abs() < 1e-12 {
            (wrap_lon(lon_min), wrap_lon(lon_min) + TAU)
        } else {
            (wrap_lon(lon_min), clamp_upper_lon(lon_max))
        };

        Ok(Self {
            lon_min,
            lon_max,
            lat_min: lat_min.clamp(-FRAC_PI_2, FRAC_PI_2),
            lat_max: lat_max.clamp(-FRAC_PI_2, FRAC_PI_2),
        })
    }

    /// Same as [`GeoRegion::new`] but taking degrees.
    pub fn from_degrees(lon_min: f64, lon_max: f64, lat_min: f64, lat_max: f64) -> Result<Self> {
        Self::new(
            lon_min.to_radians(),
            lon_max.to_radians(),
            lat_min.to_radians(),
            lat_max.to_radians(),
        )
    }

    /// The whole globe, west to east from -π to π and pole to pole.
    pub fn full_globe() -> Self {
        Self {
            lon_min: -PI,
            lon_max: PI,
            lat_min: -FRAC_PI_2,
            lat_max: FRAC_PI_2,
        }
    }

    /// Whether the window wraps through the antimeridian.
    pub fn crosses_antimeridian(&self) -> bool {
        self.lon_min > self.lon_max
    }

    /// Eastward longitude extent, accounting for wraparound.
    pub fn lon_span(&self) -> f64 {
        if self.crosses_antimeridian() {
            self.lon_max + TAU - self.lon_min
        } else {
            self.lon_max - self.lon_min
        }
    }

    pub fn lat_span(&self) -> f64 {
        self.lat_max - self.lat_min
    }

    /// Whether a point falls inside the window (inclusive edges).
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        if lat < self.lat_min || lat > self.lat_max {
            return false;
        }
        if self.lon_span() >= TAU {
            return true;
        }
        let offset = (lon - self.lon_min).rem_euclid(TAU);
        offset <= self.lon_span() + 1e-12
    }

    /// Bit-exact cache key for this window.
    pub fn key(&self) -> RegionKey {
        RegionKey([
            self.lon_min.to_bits(),
            self.lon_max.to_bits(),
            self.lat_min.to_bits(),
            self.lat_max.to_bits(),
        ])
    }
}

/// `wrap_lon` maps π onto -π; as an upper bound we want π to stay π.
fn clamp_upper_lon(lon: f64) -> f64 {
    let wrapped = wrap_lon(lon);
    if wrapped == -PI && lon > 0.0 {
        PI
    } else {
        wrapped
    }
}

/// Hashable identity of a [`GeoRegion`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RegionKey([u64; 4]);

/// Output raster dimensions. Both axes are at least one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Resolution {
    pub x: usize,
    pub y: usize,
}

impl Resolution {
    pub fn new(x: usize, y: usize) -> Result<Self> {
        if x == 0 || y == 0 {
            return Err(LayerError::invalid(
                "resolution",
                format!("{}x{} has a zero axis", x, y),
            ));
        }
        let pixels = x as u64 * y as u64;
        if pixels > MAX_BUFFER_PIXELS {
            return Err(LayerError::ResourceExhausted {
                requested: pixels,
                budget: MAX_BUFFER_PIXELS,
            });
        }
        Ok(Self { x, y })
    }

    pub fn pixels(&self) -> usize {
        self.x * self.y
    }
}

/// A region paired with a resolution: maps pixel indices to coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SampleGrid {
    pub region: GeoRegion,
    pub resolution: Resolution,
}

impl SampleGrid {
    pub fn new(region: GeoRegion, resolution: Resolution) -> Self {
        Self { region, resolution }
    }

    /// Longitude of column `x`, wrapped into `[-π, π)`.
    pub fn lon_at(&self, x: usize) -> f64 {
        let t = axis_fraction(x, self.resolution.x);
        wrap_lon(self.region.lon_min + self.region.lon_span() * t)
    }

    /// Latitude of row `y`; row 0 is the northern edge.
    pub fn lat_at(&self, y: usize) -> f64 {
        let t = axis_fraction(y, self.resolution.y);
        self.region.lat_max - self.region.lat_span() * t
    }
}

fn axis_fraction(i: usize, n: usize) -> f64 {
    if n <= 1 {
        0.5
    } else {
        i as f64 / (n - 1) as f64
    }
}

/// Fractional column/row of a point inside a full-globe raster of the given size.
pub fn globe_pixel(lon: f64, lat: f64, width: usize, height: usize) -> (f64, f64) {
    let fx = (wrap_lon(lon) + PI) / TAU * width.saturating_sub(1) as f64;
    let fy = (FRAC_PI_2 - lat) / PI * height.saturating_sub(1) as f64;
    (fx, fy)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_antimeridian_span() {
        let region = GeoRegion::from_degrees(170.0, -170.0, -10.0, 10.0).unwrap();
        assert!(region.crosses_antimeridian());
        assert!((region.lon_span() - 20f64.to_radians()).abs() < 1e-12);
        assert!(region.contains(PI - 0.01, 0.0));
        assert!(region.contains(-PI + 0.01, 0.0));
        assert!(!region.contains(0.0, 0.0));
    }

    #[test]
    fn test_full_globe_span() {
        let region = GeoRegion::full_globe();
        assert!(!region.crosses_antimeridian());
        assert!((region.lon_span() - TAU).abs() < 1e-12);

        let rebuilt = GeoRegion::new(-PI, PI, -FRAC_PI_2, FRAC_PI_2).unwrap();
        assert!((rebuilt.lon_span() - TAU).abs() < 1e-12);
    }

    #[test]
    fn test_rejects_bad_bounds() {
        assert!(GeoRegion::new(0.0, 1.0, 0.5, 0.1).is_err());
        assert!(GeoRegion::new(0.0, 1.0, -2.0, 0.1).is_err());
        assert!(GeoRegion::new(f64::NAN, 1.0, 0.0, 0.1).is_err());
    }

    #[test]
    fn test_rejects_span_wider_than_globe() {
        let err = GeoRegion::new(-4.0, 4.0, 0.0, 0.1).unwrap_err();
        assert!(matches!(err, LayerError::InvalidParameter { .. }));
        assert!(GeoRegion::from_degrees(0.0, 360.0, 0.0, 1.0).is_ok());
    }

    #[test]
    fn test_zero_resolution_rejected() {
        assert!(Resolution::new(0, 10).is_err());
        assert!(Resolution::new(10, 0).is_err());
        assert!(Resolution::new(1, 1).is_ok());
    }

    #[test]
    fn test_grid_edges_are_inclusive() {
        let region = GeoRegion::new(0.0, 0.5, 0.0, 0.25).unwrap();
        let grid = SampleGrid::new(region, Resolution::new(9, 5).unwrap());
        assert_eq!(grid.lon_at(0), 0.0);
        assert_eq!(grid.lon_at(8), 0.5);
        assert_eq!(grid.lat_at(0), 0.25);
        assert_eq!(grid.lat_at(4), 0.0);
    }

    #[test]
    fn test_grid_wraps_across_antimeridian() {
        let region = GeoRegion::from_degrees(170.0, -170.0, 0.0, 1.0).unwrap();
        let grid = SampleGrid::new(region, Resolution::new(3, 2).unwrap());
        assert!((grid.lon_at(0) - 170f64.to_radians()).abs() < 1e-12);
        assert!((grid.lon_at(1).abs() - PI).abs() < 1e-12);
        assert!((grid.lon_at(2) + 170f64.to_radians()).abs() < 1e-12);
    }
}
