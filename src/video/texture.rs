//! Frame textures
//!
//! The player refreshes its texture with the full RGBA frame after every
//! successful conversion. [`VideoTexture`] uploads to a wgpu texture;
//! [`MemoryTexture`] keeps the pixels in system memory for headless hosts.

use std::sync::Arc;

use super::error::VideoError;

/// Destination for converted RGBA8888 frames
pub trait FrameTexture {
    fn width(&self) -> u32;

    fn height(&self) -> u32;

    /// Replace the texture contents with a top-down, tightly packed RGBA frame.
    fn upload(&mut self, rgba: &[u8]);
}

/// A GPU texture receiving video frames
///
/// Rgba8UnormSrgb, sampled by the host's own pipelines.
pub struct VideoTexture {
    /// The GPU texture
    texture: wgpu::Texture,
    /// Texture view for binding
    view: wgpu::TextureView,
    queue: Arc<wgpu::Queue>,
    width: u32,
    height: u32,
}

impl VideoTexture {
    /// Create a texture of the given size, failing if the device cannot hold it.
    pub fn new(
        device: &wgpu::Device,
        queue: Arc<wgpu::Queue>,
        width: u32,
        height: u32,
    ) -> Result<Self, VideoError> {
        let max_dimension = device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max_dimension || height > max_dimension {
            return Err(VideoError::BufferAllocation(format!(
                "texture {}x{} outside device limit {}",
                width, height, max_dimension
            )));
        }

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        let (texture, view) = Self::create_texture(device, width, height);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(VideoError::BufferAllocation(err.to_string()));
        }

        tracing::debug!(width, height, "Created video texture");
        Ok(Self {
            texture,
            view,
            queue,
            width,
            height,
        })
    }

    fn create_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> (wgpu::Texture, wgpu::TextureView) {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Canvas Video Frame"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8UnormSrgb,
            // COPY_DST for frame uploads, COPY_SRC so hosts can read frames back
            usage: wgpu::TextureUsages::COPY_DST
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        (texture, view)
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self.texture
    }

    pub fn view(&self) -> &wgpu::TextureView {
        &self.view
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        wgpu::TextureFormat::Rgba8UnormSrgb
    }
}

impl FrameTexture for VideoTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn upload(&mut self, rgba: &[u8]) {
        let expected = self.width as usize * self.height as usize * 4;
        if rgba.len() != expected {
            tracing::warn!(
                len = rgba.len(),
                expected,
                "Skipping video texture upload with mismatched size"
            );
            return;
        }

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            rgba,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.width * 4),
                rows_per_image: Some(self.height),
            },
            wgpu::Extent3d {
                width: self.width,
                height: self.height,
                depth_or_array_layers: 1,
            },
        );
    }
}

/// RGBA frame held in system memory
#[derive(Debug, Clone)]
pub struct MemoryTexture {
    pixels: Vec<u8>,
    width: u32,
    height: u32,
    uploads: u64,
}

impl MemoryTexture {
    pub fn new(width: u32, height: u32) -> Result<Self, VideoError> {
        let len = width as usize * height as usize * 4;
        let mut pixels = Vec::new();
        pixels
            .try_reserve_exact(len)
            .map_err(|e| VideoError::BufferAllocation(e.to_string()))?;
        pixels.resize(len, 0);
        Ok(Self {
            pixels,
            width,
            height,
            uploads: 0,
        })
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA of the pixel at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.pixels.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }

    /// Number of frames uploaded so far
    pub fn uploads(&self) -> u64 {
        self.uploads
    }
}

impl FrameTexture for MemoryTexture {
    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn upload(&mut self, rgba: &[u8]) {
        if rgba.len() == self.pixels.len() {
            self.pixels.copy_from_slice(rgba);
            self.uploads += 1;
        }
    }
}
