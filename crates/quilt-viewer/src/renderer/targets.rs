//! Offscreen render targets: the quilt, the per-view tile target and the
//! depth buffer that goes with the window surface.

use lenticular::backend::TextureDesc;

/// Color format of every offscreen target. Copies between tile target and
/// quilt require both to share it.
pub const OFFSCREEN_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;
pub const DEPTH_FMT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Pooled textures kept around for reuse.
const POOL_CAPACITY: usize = 4;

/// A color texture with an optional depth buffer of the same size.
pub struct GpuTexture {
    _color_tex: wgpu::Texture,
    _depth_tex: Option<wgpu::Texture>,

    pub color: wgpu::TextureView,
    pub depth: Option<wgpu::TextureView>,
    pub width: u32,
    pub height: u32,
}

impl GpuTexture {
    pub fn new(device: &wgpu::Device, desc: &TextureDesc) -> Self {
        let width = desc.width.max(1);
        let height = desc.height.max(1);
        let size = wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        };

        let color_tex = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: OFFSCREEN_FMT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let depth_tex = desc.depth.then(|| create_depth(device, desc.label, width, height));

        Self {
            color: color_tex.create_view(&wgpu::TextureViewDescriptor::default()),
            depth: depth_tex
                .as_ref()
                .map(|tex| tex.create_view(&wgpu::TextureViewDescriptor::default())),
            _color_tex: color_tex,
            _depth_tex: depth_tex,
            width,
            height,
        }
    }

    pub fn texture(&self) -> &wgpu::Texture {
        &self._color_tex
    }
}

fn create_depth(device: &wgpu::Device, label: &str, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: DEPTH_FMT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
        view_formats: &[],
    })
}

/// Depth buffer for draws straight into the window surface.
pub struct SurfaceDepth {
    _tex: wgpu::Texture,
    pub view: wgpu::TextureView,
}

impl SurfaceDepth {
    pub fn new(device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>) -> Self {
        let tex = create_depth(device, "Surface Depth", size.width.max(1), size.height.max(1));
        Self {
            view: tex.create_view(&wgpu::TextureViewDescriptor::default()),
            _tex: tex,
        }
    }

    pub fn resize(&mut self, device: &wgpu::Device, size: winit::dpi::PhysicalSize<u32>) {
        *self = Self::new(device, size);
    }
}

/// Anything the pool can hand back out for a matching descriptor.
pub trait Pooled {
    fn matches(&self, desc: &TextureDesc) -> bool;
}

impl Pooled for GpuTexture {
    fn matches(&self, desc: &TextureDesc) -> bool {
        self.width == desc.width.max(1)
            && self.height == desc.height.max(1)
            && self.depth.is_some() == desc.depth
    }
}

/// Released textures waiting to be handed out again. The tile target is
/// requested and released every frame; this keeps that from reallocating.
///
/// A request evicts every pooled texture of a different shape, so a quilt
/// released on a method switch or resize is freed by the next allocation.
pub struct TexturePool<T = GpuTexture> {
    free: Vec<T>,
}

impl<T> Default for TexturePool<T> {
    fn default() -> Self {
        Self { free: Vec::new() }
    }
}

impl<T: Pooled> TexturePool<T> {
    pub fn take(&mut self, desc: &TextureDesc) -> Option<T> {
        let before = self.free.len();
        self.free.retain(|tex| tex.matches(desc));
        if self.free.len() < before {
            log::debug!(
                "Evicted {} pooled textures that do not match {}",
                before - self.free.len(),
                desc.label
            );
        }
        self.free.pop()
    }

    pub fn put(&mut self, texture: T) {
        if self.free.len() == POOL_CAPACITY {
            self.free.remove(0);
        }
        self.free.push(texture);
    }

    pub fn len(&self) -> usize {
        self.free.len()
    }
}
