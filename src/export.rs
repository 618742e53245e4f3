//! PNG export of layer buffers.

use std::path::Path;

use image::RgbaImage;

use crate::layers::elevation::spectral_colormap;
use crate::tilemap::Tilemap;

/// Save a color buffer as PNG.
pub fn export_color<P: AsRef<Path>>(image: &RgbaImage, path: P) -> Result<(), image::ImageError> {
    image.save(path)
}

/// Stretch a scalar buffer over its own value range and color it spectrally.
pub fn render_scalar(grid: &Tilemap<f32>) -> RgbaImage {
    let (min, max) = grid.value_range();
    let range = (max - min).max(f32::EPSILON);
    let mut img = RgbaImage::new(grid.width as u32, grid.height as u32);
    for (x, y, &v) in grid.iter() {
        img.put_pixel(x as u32, y as u32, image::Rgba(spectral_colormap((v - min) / range)));
    }
    img
}

/// Export a scalar buffer using the spectral colormap.
pub fn export_scalar<P: AsRef<Path>>(grid: &Tilemap<f32>, path: P) -> Result<(), image::ImageError> {
    render_scalar(grid).save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_scalar_stretches_range() {
        let grid = Tilemap::from_fn_par(4, 2, |x, _| x as f32 * 10.0);
        let img = render_scalar(&grid);
        assert_eq!(img.get_pixel(0, 0).0, spectral_colormap(0.0));
        assert_eq!(img.get_pixel(3, 1).0, spectral_colormap(1.0));
    }

    #[test]
    fn test_export_writes_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scalar.png");
        let grid = Tilemap::new_with(8, 4, 0.5f32);
        export_scalar(&grid, &path).unwrap();

        // A flat buffer maps to the low end of the colormap.
        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!((loaded.width(), loaded.height()), (8, 4));
        assert_eq!(loaded.get_pixel(2, 2).0, spectral_colormap(0.0));
    }
}
