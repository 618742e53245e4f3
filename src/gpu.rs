//! GPU presentation of projected rasters using wgpu.
//!
//! Uploads color rasters as `Rgba8UnormSrgb` textures and scalar buffers as
//! `R32Float` textures for the display side to sample. Textures mirror the
//! projection's raster handles and are destroyed explicitly when the raster
//! they mirror is replaced.

use std::collections::HashMap;

use image::RgbaImage;

use crate::error::{LayerError, Result};
use crate::projection::{Projection, RasterHandle};
use crate::tilemap::Tilemap;

/// A texture plus the view the renderer binds.
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub width: u32,
    pub height: u32,
    pub format: wgpu::TextureFormat,
}

/// Device, queue and the textures currently on the GPU.
pub struct GpuPresenter {
    device: wgpu::Device,
    queue: wgpu::Queue,
    adapter_name: String,
    textures: HashMap<RasterHandle, GpuTexture>,
}

impl GpuPresenter {
    /// Create a presenter. Returns `None` if no GPU adapter is available.
    pub fn new() -> Option<Self> {
        pollster::block_on(Self::new_async())
    }

    async fn new_async() -> Option<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await?;

        let adapter_name = adapter.get_info().name;
        tracing::info!(adapter = %adapter_name, "GPU adapter selected");

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Map presenter"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::MemoryUsage,
                },
                None,
            )
            .await
            .ok()?;

        Some(Self {
            device,
            queue,
            adapter_name,
            textures: HashMap::new(),
        })
    }

    pub fn adapter_name(&self) -> &str {
        &self.adapter_name
    }

    fn check_size(&self, width: u32, height: u32) -> Result<()> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 {
            return Err(LayerError::Gpu(format!("empty {}x{} texture", width, height)));
        }
        if width > max || height > max {
            return Err(LayerError::ResourceExhausted {
                requested: width.max(height) as u64,
                budget: max as u64,
            });
        }
        Ok(())
    }

    fn upload(
        &self,
        label: &str,
        width: u32,
        height: u32,
        format: wgpu::TextureFormat,
        bytes_per_pixel: u32,
        data: &[u8],
    ) -> Result<GpuTexture> {
        self.check_size(width, height)?;
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(width * bytes_per_pixel),
                rows_per_image: Some(height),
            },
            size,
        );
        self.queue.submit(std::iter::empty());
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Ok(GpuTexture {
            texture,
            view,
            width,
            height,
            format,
        })
    }

    /// Upload an RGBA raster.
    pub fn upload_color(&self, image: &RgbaImage) -> Result<GpuTexture> {
        self.upload(
            "Layer colors",
            image.width(),
            image.height(),
            wgpu::TextureFormat::Rgba8UnormSrgb,
            4,
            image.as_raw(),
        )
    }

    /// Upload a scalar buffer as single-channel floats.
    pub fn upload_scalar(&self, grid: &Tilemap<f32>) -> Result<GpuTexture> {
        self.upload(
            "Layer scalars",
            grid.width as u32,
            grid.height as u32,
            wgpu::TextureFormat::R32Float,
            4,
            bytemuck::cast_slice(grid.as_slice()),
        )
    }

    /// Mirror the projection's current raster on the GPU. Textures of every
    /// other handle are destroyed.
    pub fn sync(&mut self, projection: &Projection) -> Result<Option<&GpuTexture>> {
        let current = projection.current();
        let stale: Vec<RasterHandle> = self
            .textures
            .keys()
            .filter(|&&handle| Some(handle) != current)
            .copied()
            .collect();
        for handle in stale {
            if let Some(old) = self.textures.remove(&handle) {
                old.texture.destroy();
            }
        }

        let Some(handle) = current else {
            return Ok(None);
        };
        if !self.textures.contains_key(&handle) {
            let image = projection
                .raster(handle)
                .ok_or_else(|| LayerError::Gpu("projection raster was released".to_string()))?;
            let texture = self.upload_color(image)?;
            tracing::debug!(width = texture.width, height = texture.height, "raster uploaded");
            self.textures.insert(handle, texture);
        }
        Ok(self.textures.get(&handle))
    }

    /// Number of textures held.
    pub fn texture_count(&self) -> usize {
        self.textures.len()
    }

    /// Destroy every texture.
    pub fn clear(&mut self) {
        for (_, texture) in self.textures.drain() {
            texture.texture.destroy();
        }
    }
}

impl Drop for GpuPresenter {
    fn drop(&mut self) {
        self.clear();
    }
}
