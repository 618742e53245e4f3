//! Row-major raster grid used for every scalar layer buffer.
//!
//! Columns wrap horizontally (equirectangular longitude), rows clamp at the poles.

use image::{Rgba, RgbaImage};
use rayon::prelude::*;

use crate::error::{LayerError, Result};
use crate::geo::{globe_pixel, SampleGrid};

/// A 2D grid with horizontal wrapping.
#[derive(Clone, Debug, PartialEq)]
pub struct Tilemap<T> {
    pub width: usize,
    pub height: usize,
    data: Vec<T>,
}

impl<T: Clone> Tilemap<T> {
    pub fn new_with(width: usize, height: usize, value: T) -> Self {
        Self {
            width,
            height,
            data: vec![value; width * height],
        }
    }

    /// Get the index into the data array, handling horizontal wrapping.
    fn index(&self, x: usize, y: usize) -> usize {
        let x = x % self.width;
        y * self.width + x
    }

    pub fn get(&self, x: usize, y: usize) -> &T {
        &self.data[self.index(x, y)]
    }

    pub fn set(&mut self, x: usize, y: usize, value: T) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.data
    }

    /// Iterate over all cells with their coordinates.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &T)> {
        self.data.iter().enumerate().map(move |(idx, val)| {
            let x = idx % self.width;
            let y = idx / self.width;
            (x, y, val)
        })
    }

    /// Approximate heap footprint in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<T>()
    }
}

impl<T: Send> Tilemap<T> {
    /// Build a grid by evaluating `f(x, y)` for every cell, rows in parallel.
    pub fn from_fn_par<F>(width: usize, height: usize, f: F) -> Self
    where
        F: Fn(usize, usize) -> T + Sync,
    {
        let data: Vec<T> = (0..width * height)
            .into_par_iter()
            .map(|idx| f(idx % width, idx / width))
            .collect();
        Self { width, height, data }
    }
}

/// How a fallback resample reads between source cells.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Interpolation {
    /// Blend the four surrounding cells. Suits continuous fields.
    Bilinear,
    /// Take the closest cell. Required for category ids.
    Nearest,
}

impl Tilemap<f32> {
    /// Sample using bilinear interpolation (columns wrap, rows clamp).
    pub fn sample_bilinear(&self, x: f64, y: f64) -> f32 {
        let x0 = x.floor() as i64;
        let y0 = y.floor() as i64;
        let fx = (x - x.floor()) as f32;
        let fy = (y - y.floor()) as f32;

        let sx0 = x0.rem_euclid(self.width as i64) as usize;
        let sx1 = (x0 + 1).rem_euclid(self.width as i64) as usize;
        let sy0 = y0.clamp(0, self.height as i64 - 1) as usize;
        let sy1 = (y0 + 1).clamp(0, self.height as i64 - 1) as usize;

        let v00 = *self.get(sx0, sy0);
        let v10 = *self.get(sx1, sy0);
        let v01 = *self.get(sx0, sy1);
        let v11 = *self.get(sx1, sy1);

        let v0 = v00 * (1.0 - fx) + v10 * fx;
        let v1 = v01 * (1.0 - fx) + v11 * fx;
        v0 * (1.0 - fy) + v1 * fy
    }

    pub fn sample_nearest(&self, x: f64, y: f64) -> f32 {
        let sx = (x.round() as i64).rem_euclid(self.width as i64) as usize;
        let sy = (y.round() as i64).clamp(0, self.height as i64 - 1) as usize;
        *self.get(sx, sy)
    }

    /// Resample a full-globe raster onto an arbitrary region grid.
    ///
    /// Lossy: detail finer than the source raster's cell size is not recovered.
    pub fn resample_to(&self, grid: &SampleGrid, interpolation: Interpolation) -> Self {
        Tilemap::from_fn_par(grid.resolution.x, grid.resolution.y, |x, y| {
            let (fx, fy) = globe_pixel(grid.lon_at(x), grid.lat_at(y), self.width, self.height);
            match interpolation {
                Interpolation::Bilinear => self.sample_bilinear(fx, fy),
                Interpolation::Nearest => self.sample_nearest(fx, fy),
            }
        })
    }

    /// Minimum and maximum cell values.
    pub fn value_range(&self) -> (f32, f32) {
        let mut min_val = f32::MAX;
        let mut max_val = f32::MIN;
        for &v in &self.data {
            if v < min_val { min_val = v; }
            if v > max_val { max_val = v; }
        }
        (min_val, max_val)
    }
}

/// Build an RGBA raster by evaluating `f(x, y)` per pixel, rows in parallel.
pub fn color_from_fn_par<F>(width: usize, height: usize, f: F) -> Result<RgbaImage>
where
    F: Fn(usize, usize) -> [u8; 4] + Sync,
{
    let mut raw = vec![0u8; width * height * 4];
    raw.par_chunks_mut(width * 4).enumerate().for_each(|(y, row)| {
        for (x, px) in row.chunks_exact_mut(4).enumerate() {
            px.copy_from_slice(&f(x, y));
        }
    });
    RgbaImage::from_raw(width as u32, height as u32, raw).ok_or(LayerError::ResourceExhausted {
        requested: width as u64 * height as u64,
        budget: u32::MAX as u64,
    })
}

/// Map every cell of a scalar grid through a color function.
pub fn colorize<F>(grid: &Tilemap<f32>, f: F) -> Result<RgbaImage>
where
    F: Fn(f32) -> [u8; 4] + Sync,
{
    color_from_fn_par(grid.width, grid.height, |x, y| f(*grid.get(x, y)))
}

/// Bilinear sample of an RGBA full-globe raster (columns wrap, rows clamp).
pub fn sample_color_bilinear(image: &RgbaImage, x: f64, y: f64) -> [u8; 4] {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let x0 = x.floor() as i64;
    let y0 = y.floor() as i64;
    let fx = x - x.floor();
    let fy = y - y.floor();

    let px = |cx: i64, cy: i64| -> Rgba<u8> {
        *image.get_pixel(cx.rem_euclid(w) as u32, cy.clamp(0, h - 1) as u32)
    };
    let (p00, p10) = (px(x0, y0), px(x0 + 1, y0));
    let (p01, p11) = (px(x0, y0 + 1), px(x0 + 1, y0 + 1));

    let mut out = [0u8; 4];
    for c in 0..4 {
        let top = p00[c] as f64 * (1.0 - fx) + p10[c] as f64 * fx;
        let bottom = p01[c] as f64 * (1.0 - fx) + p11[c] as f64 * fx;
        out[c] = (top * (1.0 - fy) + bottom * fy).round().clamp(0.0, 255.0) as u8;
    }
    out
}

/// Closest pixel of an RGBA full-globe raster (columns wrap, rows clamp).
pub fn sample_color_nearest(image: &RgbaImage, x: f64, y: f64) -> [u8; 4] {
    let (w, h) = (image.width() as i64, image.height() as i64);
    let sx = (x.round() as i64).rem_euclid(w) as u32;
    let sy = (y.round() as i64).clamp(0, h - 1) as u32;
    image.get_pixel(sx, sy).0
}

pub fn sample_color(image: &RgbaImage, x: f64, y: f64, interpolation: Interpolation) -> [u8; 4] {
    match interpolation {
        Interpolation::Bilinear => sample_color_bilinear(image, x, y),
        Interpolation::Nearest => sample_color_nearest(image, x, y),
    }
}

/// Crop/resize a full-globe RGBA raster onto a region grid. Lossy, like
/// [`Tilemap::resample_to`].
pub fn resample_color(
    image: &RgbaImage,
    grid: &SampleGrid,
    interpolation: Interpolation,
) -> Result<RgbaImage> {
    let (w, h) = (image.width() as usize, image.height() as usize);
    color_from_fn_par(grid.resolution.x, grid.resolution.y, |x, y| {
        let (fx, fy) = globe_pixel(grid.lon_at(x), grid.lat_at(y), w, h);
        sample_color(image, fx, fy, interpolation)
    })
}

pub fn lerp_color(a: [u8; 4], b: [u8; 4], t: f32) -> [u8; 4] {
    let t = t.clamp(0.0, 1.0);
    let mut out = [0u8; 4];
    for c in 0..4 {
        out[c] = (a[c] as f32 + (b[c] as f32 - a[c] as f32) * t).round() as u8;
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::{GeoRegion, Resolution};

    #[test]
    fn test_wraps_horizontally() {
        let mut map = Tilemap::new_with(4, 2, 0.0f32);
        map.set(5, 1, 3.0);
        assert_eq!(*map.get(1, 1), 3.0);
    }

    #[test]
    fn test_from_fn_par_matches_serial_order() {
        let map = Tilemap::from_fn_par(7, 3, |x, y| (y * 7 + x) as f32);
        for (x, y, &v) in map.iter() {
            assert_eq!(v, (y * 7 + x) as f32);
        }
    }

    #[test]
    fn test_bilinear_wraps_columns() {
        let mut map = Tilemap::new_with(4, 1, 0.0f32);
        map.set(3, 0, 4.0);
        // Halfway between the last column and the first.
        assert!((map.sample_bilinear(3.5, 0.0) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_resample_full_globe_is_identity() {
        let map = Tilemap::from_fn_par(9, 5, |x, y| (x + 10 * y) as f32);
        let grid = SampleGrid::new(GeoRegion::full_globe(), Resolution::new(9, 5).unwrap());
        let out = map.resample_to(&grid, Interpolation::Nearest);
        for y in 0..5 {
            for x in 0..8 {
                assert_eq!(out.get(x, y), map.get(x, y));
            }
        }
    }

    #[test]
    fn test_nearest_color_keeps_source_pixels() {
        let a = [255, 0, 0, 255];
        let b = [0, 0, 255, 255];
        let img = RgbaImage::from_fn(8, 4, |x, _| image::Rgba(if x % 2 == 0 { a } else { b }));
        let grid = SampleGrid::new(
            GeoRegion::from_degrees(170.0, -170.0, -40.0, 40.0).unwrap(),
            Resolution::new(13, 7).unwrap(),
        );
        let out = resample_color(&img, &grid, Interpolation::Nearest).unwrap();
        assert!(out.pixels().all(|p| p.0 == a || p.0 == b));

        // Halfway between two columns the bilinear read mixes them.
        assert_eq!(sample_color(&img, 0.5, 0.0, Interpolation::Bilinear), [128, 0, 128, 255]);
        assert_eq!(sample_color_nearest(&img, 7.6, 0.0), a);
    }

    #[test]
    fn test_colorize_dimensions() {
        let map = Tilemap::new_with(6, 3, 0.5f32);
        let img = colorize(&map, |v| [(v * 255.0) as u8, 0, 0, 255]).unwrap();
        assert_eq!(img.dimensions(), (6, 3));
        assert_eq!(img.get_pixel(5, 2).0, [127, 0, 0, 255]);
    }
}
