//! Projection of a layer onto a 2D raster of caller-chosen size.
//!
//! Rasters are owned by a [`RasterArena`] and referred to by generation-checked
//! [`RasterHandle`]s. Rendering again releases the previous raster before the
//! new one is stored, so repeated resizes never accumulate allocations.

use std::f64::consts::FRAC_PI_2;

use image::RgbaImage;

use crate::atlas::Atlas;
use crate::error::{LayerError, Result};
use crate::geo::{globe_pixel, wrap_lon, GeoRegion, Resolution};
use crate::layers::LayerKind;
use crate::tilemap::{color_from_fn_par, sample_color, Interpolation};

const SPACE_COLOR: [u8; 4] = [5, 5, 15, 255];

/// Opaque reference to a raster in a [`RasterArena`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RasterHandle {
    index: u32,
    generation: u32,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    image: Option<RgbaImage>,
}

/// Handle table of live rasters with a total pixel budget.
#[derive(Debug)]
pub struct RasterArena {
    slots: Vec<Slot>,
    free: Vec<u32>,
    live_pixels: u64,
    budget: u64,
}

impl RasterArena {
    pub fn new(budget_pixels: u64) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            live_pixels: 0,
            budget: budget_pixels,
        }
    }

    /// Store a raster. Fails with `ResourceExhausted` if it would exceed the budget.
    pub fn insert(&mut self, image: RgbaImage) -> Result<RasterHandle> {
        let pixels = image.width() as u64 * image.height() as u64;
        let requested = self.live_pixels + pixels;
        if requested > self.budget {
            return Err(LayerError::ResourceExhausted {
                requested,
                budget: self.budget,
            });
        }
        self.live_pixels = requested;

        let index = match self.free.pop() {
            Some(index) => index,
            None => {
                self.slots.push(Slot::default());
                (self.slots.len() - 1) as u32
            }
        };
        let slot = &mut self.slots[index as usize];
        slot.image = Some(image);
        Ok(RasterHandle {
            index,
            generation: slot.generation,
        })
    }

    pub fn get(&self, handle: RasterHandle) -> Option<&RgbaImage> {
        self.slots
            .get(handle.index as usize)
            .filter(|slot| slot.generation == handle.generation)
            .and_then(|slot| slot.image.as_ref())
    }

    /// Free a raster. Stale or already released handles return `false`.
    pub fn release(&mut self, handle: RasterHandle) -> bool {
        let Some(slot) = self.slots.get_mut(handle.index as usize) else {
            return false;
        };
        if slot.generation != handle.generation {
            return false;
        }
        let Some(image) = slot.image.take() else {
            return false;
        };
        self.live_pixels -= image.width() as u64 * image.height() as u64;
        slot.generation = slot.generation.wrapping_add(1);
        self.free.push(handle.index);
        true
    }

    /// Pixels held by live rasters.
    pub fn live_pixels(&self) -> u64 {
        self.live_pixels
    }

    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|slot| slot.image.is_some()).count()
    }
}

/// How the globe is laid onto the raster.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ProjectionKind {
    /// Plate carrée, whole globe, north up.
    Equirectangular,
    /// Hemisphere view as seen from far away above `(center_lon, center_lat)`.
    Orthographic { center_lon: f64, center_lat: f64 },
}

impl ProjectionKind {
    /// Parse `equirectangular` / `orthographic` (centered on 0,0).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "equirectangular" | "plate-carree" => Some(Self::Equirectangular),
            "orthographic" | "globe" => Some(Self::Orthographic {
                center_lon: 0.0,
                center_lat: 0.0,
            }),
            _ => None,
        }
    }

    /// Orthographic view centered on a point given in degrees.
    pub fn orthographic_degrees(center_lon: f64, center_lat: f64) -> Self {
        Self::Orthographic {
            center_lon: wrap_lon(center_lon.to_radians()),
            center_lat: center_lat.to_radians().clamp(-FRAC_PI_2, FRAC_PI_2),
        }
    }
}

/// Inverse orthographic projection of a point on the unit disk.
/// Returns `None` outside the visible hemisphere.
pub fn orthographic_inverse(x: f64, y: f64, center_lon: f64, center_lat: f64) -> Option<(f64, f64)> {
    let rho2 = x * x + y * y;
    if rho2 > 1.0 {
        return None;
    }
    let rho = rho2.sqrt();
    if rho == 0.0 {
        return Some((wrap_lon(center_lon), center_lat));
    }
    let c = rho.asin();
    let (sin_c, cos_c) = c.sin_cos();
    let (sin_lat0, cos_lat0) = center_lat.sin_cos();
    let lat = (cos_c * sin_lat0 + y * sin_c * cos_lat0 / rho).clamp(-1.0, 1.0).asin();
    let lon = center_lon + (x * sin_c).atan2(rho * cos_lat0 * cos_c - y * sin_lat0 * sin_c);
    Some((wrap_lon(lon), lat.clamp(-FRAC_PI_2, FRAC_PI_2)))
}

/// Renders layers for display and keeps exactly one current raster.
#[derive(Debug)]
pub struct Projection {
    kind: ProjectionKind,
    arena: RasterArena,
    current: Option<RasterHandle>,
}

impl Projection {
    pub fn new(kind: ProjectionKind, budget_pixels: u64) -> Self {
        Self {
            kind,
            arena: RasterArena::new(budget_pixels),
            current: None,
        }
    }

    pub fn kind(&self) -> ProjectionKind {
        self.kind
    }

    pub fn set_kind(&mut self, kind: ProjectionKind) {
        self.kind = kind;
    }

    pub fn current(&self) -> Option<RasterHandle> {
        self.current
    }

    pub fn raster(&self, handle: RasterHandle) -> Option<&RgbaImage> {
        self.arena.get(handle)
    }

    pub fn arena(&self) -> &RasterArena {
        &self.arena
    }

    /// Render `layer` (the composite when `None`) at `width` x `height`.
    /// The previous raster is released first, even if rendering then fails.
    pub fn render(
        &mut self,
        atlas: &Atlas,
        layer: Option<LayerKind>,
        width: usize,
        height: usize,
    ) -> Result<RasterHandle> {
        self.release();
        let kind = layer.unwrap_or(LayerKind::Color);
        let image = match self.kind {
            ProjectionKind::Equirectangular => {
                let img = atlas.get_color_region(kind, GeoRegion::full_globe(), width, height, None)?;
                RgbaImage::clone(&img)
            }
            ProjectionKind::Orthographic { center_lon, center_lat } => {
                Resolution::new(width, height)?;
                let globe = atlas.get_color(kind)?;
                let interpolation = atlas.interpolation(kind);
                render_orthographic(&globe, interpolation, width, height, center_lon, center_lat)?
            }
        };
        let handle = self.arena.insert(image)?;
        tracing::debug!(layer = %kind, width, height, "projection rendered");
        self.current = Some(handle);
        Ok(handle)
    }

    /// Free the current raster, if any.
    pub fn release(&mut self) {
        if let Some(handle) = self.current.take() {
            self.arena.release(handle);
        }
    }
}

/// Sphere-shaded disk view in the style of a globe render: ambient plus diffuse
/// light from the upper left. Category layers are read with nearest pixels.
fn render_orthographic(
    globe: &RgbaImage,
    interpolation: Interpolation,
    width: usize,
    height: usize,
    center_lon: f64,
    center_lat: f64,
) -> Result<RgbaImage> {
    let (gw, gh) = (globe.width() as usize, globe.height() as usize);
    let radius = width.min(height) as f64 / 2.0;
    let (cx, cy) = (width as f64 / 2.0, height as f64 / 2.0);
    let light = {
        let (x, y, z) = (1.0f64, 1.0, 0.8);
        let len = (x * x + y * y + z * z).sqrt();
        (x / len, y / len, z / len)
    };

    color_from_fn_par(width, height, |px, py| {
        let x = (px as f64 + 0.5 - cx) / radius;
        let y = (cy - py as f64 - 0.5) / radius;
        let Some((lon, lat)) = orthographic_inverse(x, y, center_lon, center_lat) else {
            return SPACE_COLOR;
        };
        let (fx, fy) = globe_pixel(lon, lat, gw, gh);
        let base = sample_color(globe, fx, fy, interpolation);

        let z = (1.0 - x * x - y * y).max(0.0).sqrt();
        let diffuse = (x * light.0 + y * light.1 + z * light.2).max(0.0);
        let intensity = 0.35 + 0.65 * diffuse;
        let shade = |c: u8| (c as f64 * intensity).clamp(0.0, 255.0) as u8;
        [shade(base[0]), shade(base[1]), shade(base[2]), base[3]]
    })
}
