//! wgpu implementation of the quilt passes' [`RenderBackend`].
//!
//! Calls are recorded into a list of ops. Uniforms and instance data are
//! staged on the CPU and uploaded once per submit; every draw picks its
//! slice with a dynamic offset. `submit` encodes the ops in order into one
//! command buffer, so the passes' ordering guarantees carry over unchanged.

pub mod context;
pub mod pipelines;
pub mod targets;

use self::{
    context::GfxContext,
    pipelines::{
        blit::BlitPass,
        fs_tri_buffer,
        lenticular::LenticularPass,
        scene::{SceneLayouts, ScenePass, ScenePipelines},
    },
    targets::{GpuTexture, SurfaceDepth, TexturePool, OFFSCREEN_FMT},
};
use crate::data::{InstanceRaw, MeshKind, ObjectUniform, SkyUniform, ViewInstancingUniform, MAX_VIEWS};
use crate::scene::SceneObject;
use glam::Mat4;
use lenticular::backend::{
    BackendError, ClearFlags, DrawFilter, InstancedDraw, MaterialHandle, PixelRect, RenderBackend,
    RenderQueueRange, RenderTarget, RendererEntry, ShaderVariant, SortOrder, TextureCopy, TextureDesc,
    TextureHandle,
};
use lenticular::compositor::LenticularUniforms;
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use wgpu::util::DeviceExt;
use winit::window::Window;

const SKY_ZENITH: [f32; 4] = [0.16, 0.30, 0.62, 1.0];
const SKY_HORIZON: [f32; 4] = [0.70, 0.78, 0.88, 1.0];

const INITIAL_UNIFORM_BYTES: u64 = 64 * 1024;
const INITIAL_INSTANCES: u64 = 1024;

struct GpuMesh {
    vbo: wgpu::Buffer,
    ibo: wgpu::Buffer,
    index_count: u32,
}

impl GpuMesh {
    fn new(device: &wgpu::Device, kind: MeshKind) -> Self {
        let data = kind.build();
        Self {
            vbo: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{kind:?} VB")),
                contents: bytemuck::cast_slice(&data.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            }),
            ibo: device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("{kind:?} IB")),
                contents: bytemuck::cast_slice(&data.indices),
                usage: wgpu::BufferUsages::INDEX,
            }),
            index_count: data.indices.len() as u32,
        }
    }
}

/// Uniform bytes recorded since the last submit.
struct UniformArena {
    bytes: Vec<u8>,
    align: usize,
}

impl UniformArena {
    fn new(align: u32) -> Self {
        Self {
            bytes: Vec::new(),
            align: align.max(1) as usize,
        }
    }

    /// Appends `value` at the next aligned offset and returns that offset.
    fn push<T: bytemuck::Pod>(&mut self, value: &T) -> u32 {
        let offset = self.bytes.len().next_multiple_of(self.align);
        self.bytes.resize(offset, 0);
        self.bytes.extend_from_slice(bytemuck::bytes_of(value));
        offset as u32
    }

    fn clear(&mut self) {
        self.bytes.clear();
    }
}

/// Bind groups over the uniform arena buffer, one per uniform struct.
struct UniformBinds {
    object: wgpu::BindGroup,
    views: wgpu::BindGroup,
    sky: wgpu::BindGroup,
}

impl UniformBinds {
    fn new(device: &wgpu::Device, layouts: &SceneLayouts, buffer: &wgpu::Buffer) -> Self {
        let bind = |label: &str, layout: &wgpu::BindGroupLayout, size: usize| {
            device.create_bind_group(&wgpu::BindGroupDescriptor {
                label: Some(label),
                layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer,
                        offset: 0,
                        size: wgpu::BufferSize::new(size as u64),
                    }),
                }],
            })
        };
        Self {
            object: bind("Object Bind", &layouts.object, std::mem::size_of::<ObjectUniform>()),
            views: bind("Views Bind", &layouts.views, std::mem::size_of::<ViewInstancingUniform>()),
            sky: bind("Sky Bind", &layouts.sky, std::mem::size_of::<SkyUniform>()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum DrawItem {
    Object {
        pass: ScenePass,
        mesh: MeshKind,
        uniform: u32,
    },
    Instanced {
        transparent: bool,
        mesh: MeshKind,
        object: u32,
        views: u32,
        instances: Range<u32>,
    },
    Sky {
        uniform: u32,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Op {
    Clear {
        target: RenderTarget,
        flags: ClearFlags,
        color: [f32; 4],
    },
    /// Consecutive draws into the same target and viewport share one pass.
    Draw {
        target: RenderTarget,
        viewport: Option<PixelRect>,
        items: Vec<DrawItem>,
    },
    Copy(TextureCopy),
    Blit(TextureHandle),
    Composite {
        material: MaterialHandle,
        source: TextureHandle,
        viewport: Option<PixelRect>,
        uniform: u32,
    },
}

/// Intersects `rect` with a `size` target; `None` when nothing is left.
fn clamp_rect(rect: PixelRect, size: (u32, u32)) -> Option<PixelRect> {
    let x = rect.x.min(size.0);
    let y = rect.y.min(size.1);
    let width = rect.right().min(size.0) - x;
    let height = rect.bottom().min(size.1) - y;
    (width > 0 && height > 0).then(|| PixelRect::new(x, y, width, height))
}

fn create_buffer(device: &wgpu::Device, label: &str, size: u64, usage: wgpu::BufferUsages) -> wgpu::Buffer {
    device.create_buffer(&wgpu::BufferDescriptor {
        label: Some(label),
        size,
        usage: usage | wgpu::BufferUsages::COPY_DST,
        mapped_at_creation: false,
    })
}

pub struct WgpuBackend {
    pub gfx: GfxContext,
    surface_depth: SurfaceDepth,

    layouts: SceneLayouts,
    offscreen: ScenePipelines,
    onscreen: ScenePipelines,
    blit: BlitPass,
    fs_vbo: wgpu::Buffer,
    meshes: HashMap<MeshKind, GpuMesh>,

    textures: HashMap<TextureHandle, GpuTexture>,
    pool: TexturePool,
    materials: HashMap<MaterialHandle, LenticularPass>,
    next_handle: u32,

    arena: UniformArena,
    uniform_buffer: wgpu::Buffer,
    binds: UniformBinds,
    instances: Vec<InstanceRaw>,
    instance_buffer: wgpu::Buffer,

    ops: Vec<Op>,
    /// Releases requested while ops still reference the texture.
    deferred: Vec<TextureHandle>,

    scene: Vec<SceneObject>,
    target: RenderTarget,
    viewport: Option<PixelRect>,
    view: Mat4,
    proj: Mat4,
    frame: Option<wgpu::TextureView>,
}

impl WgpuBackend {
    pub async fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let gfx = GfxContext::new(window).await?;
        let device = &gfx.device;

        let surface_depth = SurfaceDepth::new(device, gfx.size);
        let layouts = SceneLayouts::new(device);
        let offscreen = ScenePipelines::new(device, &layouts, OFFSCREEN_FMT);
        let onscreen = ScenePipelines::new(device, &layouts, gfx.config.format);
        let blit = BlitPass::new(device, gfx.config.format);
        let fs_vbo = fs_tri_buffer(device, "Sky FS VBO");
        let meshes = MeshKind::ALL
            .into_iter()
            .map(|kind| (kind, GpuMesh::new(device, kind)))
            .collect();

        let uniform_buffer = create_buffer(
            device,
            "Uniform Arena",
            INITIAL_UNIFORM_BYTES,
            wgpu::BufferUsages::UNIFORM,
        );
        let binds = UniformBinds::new(device, &layouts, &uniform_buffer);
        let instance_buffer = create_buffer(
            device,
            "Instance Buffer",
            INITIAL_INSTANCES * std::mem::size_of::<InstanceRaw>() as u64,
            wgpu::BufferUsages::VERTEX,
        );
        let arena = UniformArena::new(device.limits().min_uniform_buffer_offset_alignment);

        Ok(Self {
            surface_depth,
            layouts,
            offscreen,
            onscreen,
            blit,
            fs_vbo,
            meshes,
            textures: HashMap::new(),
            pool: TexturePool::default(),
            materials: HashMap::new(),
            next_handle: 0,
            arena,
            uniform_buffer,
            binds,
            instances: Vec::new(),
            instance_buffer,
            ops: Vec::new(),
            deferred: Vec::new(),
            scene: Vec::new(),
            target: RenderTarget::Camera,
            viewport: None,
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            frame: None,
            gfx,
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.gfx.resize(new_size);
            self.surface_depth.resize(&self.gfx.device, new_size);
        }
    }

    /// Replaces the objects `draw_renderers` and `renderers` see.
    pub fn set_scene(&mut self, objects: &[SceneObject]) {
        self.scene.clear();
        self.scene.extend_from_slice(objects);
    }

    /// Makes `view` the camera target until [`Self::end_frame`].
    pub fn begin_frame(&mut self, view: wgpu::TextureView) {
        self.frame = Some(view);
    }

    pub fn end_frame(&mut self) {
        if !self.ops.is_empty() {
            log::warn!("{} recorded ops dropped at end of frame", self.ops.len());
            self.ops.clear();
            self.arena.clear();
            self.instances.clear();
            for handle in std::mem::take(&mut self.deferred) {
                self.free_texture(handle);
            }
        }
        self.frame = None;
    }

    pub fn live_textures(&self) -> usize {
        self.textures.len()
    }

    pub fn pooled_textures(&self) -> usize {
        self.pool.len()
    }

    fn next_id(&mut self) -> u32 {
        self.next_handle += 1;
        self.next_handle
    }

    fn free_texture(&mut self, handle: TextureHandle) {
        match self.textures.remove(&handle) {
            Some(texture) => self.pool.put(texture),
            None => log::debug!("Release of unknown texture {handle:?} ignored"),
        }
    }

    fn target_size(&self, target: RenderTarget) -> (u32, u32) {
        match target {
            RenderTarget::Camera => (self.gfx.config.width, self.gfx.config.height),
            RenderTarget::Texture(handle) => self
                .textures
                .get(&handle)
                .map_or((1, 1), |texture| (texture.width, texture.height)),
        }
    }

    fn attachments(
        &self,
        target: RenderTarget,
    ) -> Option<(&wgpu::TextureView, Option<&wgpu::TextureView>, (u32, u32))> {
        match target {
            RenderTarget::Camera => self.frame.as_ref().map(|view| {
                (
                    view,
                    Some(&self.surface_depth.view),
                    (self.gfx.config.width, self.gfx.config.height),
                )
            }),
            RenderTarget::Texture(handle) => self
                .textures
                .get(&handle)
                .map(|texture| (&texture.color, texture.depth.as_ref(), (texture.width, texture.height))),
        }
    }

    /// Scene geometry needs a depth buffer on the current target.
    fn scene_draws_allowed(&self) -> bool {
        let has_depth = match self.target {
            RenderTarget::Camera => true,
            RenderTarget::Texture(handle) => self
                .textures
                .get(&handle)
                .is_some_and(|texture| texture.depth.is_some()),
        };
        if !has_depth {
            log::warn!("Target {:?} has no depth buffer; scene draw skipped", self.target);
        }
        has_depth
    }

    fn object_uniform(&self, model: Mat4, color: [f32; 4]) -> ObjectUniform {
        ObjectUniform {
            view: self.view.to_cols_array_2d(),
            proj: self.proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            color,
        }
    }

    fn record(&mut self, item: DrawItem) {
        let (target, viewport) = (self.target, self.viewport);
        if let Some(Op::Draw {
            target: last_target,
            viewport: last_viewport,
            items,
        }) = self.ops.last_mut()
        {
            if *last_target == target && *last_viewport == viewport {
                items.push(item);
                return;
            }
        }
        self.ops.push(Op::Draw {
            target,
            viewport,
            items: vec![item],
        });
    }

    fn record_objects(&mut self, objects: Vec<SceneObject>, pass: impl Fn(&SceneObject) -> ScenePass) {
        for object in objects {
            let uniform = self.object_uniform(object.world, object.color);
            let uniform = self.arena.push(&uniform);
            self.record(DrawItem::Object {
                pass: pass(&object),
                mesh: object.mesh,
                uniform,
            });
        }
    }

    fn upload(&mut self) {
        let device = &self.gfx.device;

        let uniform_bytes = self.arena.bytes.len() as u64;
        if uniform_bytes > self.uniform_buffer.size() {
            self.uniform_buffer = create_buffer(
                device,
                "Uniform Arena",
                uniform_bytes.next_power_of_two(),
                wgpu::BufferUsages::UNIFORM,
            );
            self.binds = UniformBinds::new(device, &self.layouts, &self.uniform_buffer);
        }
        if uniform_bytes > 0 {
            self.gfx.queue.write_buffer(&self.uniform_buffer, 0, &self.arena.bytes);
        }

        let instance_bytes: &[u8] = bytemuck::cast_slice(&self.instances);
        if instance_bytes.len() as u64 > self.instance_buffer.size() {
            self.instance_buffer = create_buffer(
                device,
                "Instance Buffer",
                (instance_bytes.len() as u64).next_power_of_two(),
                wgpu::BufferUsages::VERTEX,
            );
        }
        if !instance_bytes.is_empty() {
            self.gfx.queue.write_buffer(&self.instance_buffer, 0, instance_bytes);
        }
    }

    fn execute(&mut self, ops: &[Op]) -> Result<(), BackendError> {
        self.upload();

        self.gfx.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let mut encoder = self
            .gfx
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Quilt Encoder"),
            });
        for op in ops {
            self.encode(&mut encoder, op);
        }
        self.gfx.queue.submit(std::iter::once(encoder.finish()));

        match pollster::block_on(self.gfx.device.pop_error_scope()) {
            Some(error) => Err(BackendError::Submission(error.to_string())),
            None => Ok(()),
        }
    }

    fn encode(&self, encoder: &mut wgpu::CommandEncoder, op: &Op) {
        match op {
            Op::Clear { target, flags, color } => self.encode_clear(encoder, *target, *flags, *color),
            Op::Draw {
                target,
                viewport,
                items,
            } => self.encode_draws(encoder, *target, *viewport, items),
            Op::Copy(copy) => self.encode_copy(encoder, copy),
            Op::Blit(source) => match (self.frame.as_ref(), self.textures.get(source)) {
                (Some(dst), Some(src)) => self.blit.draw(&self.gfx.device, encoder, dst, &src.color),
                _ => log::warn!("Blit of {source:?} skipped: no camera frame or unknown source"),
            },
            Op::Composite {
                material,
                source,
                viewport,
                uniform,
            } => self.encode_composite(encoder, *material, *source, *viewport, *uniform),
        }
    }

    fn encode_clear(&self, encoder: &mut wgpu::CommandEncoder, target: RenderTarget, flags: ClearFlags, color: [f32; 4]) {
        let Some((color_view, depth_view, _)) = self.attachments(target) else {
            log::warn!("Clear of missing target {target:?} skipped");
            return;
        };
        let load = if flags.color {
            wgpu::LoadOp::Clear(wgpu::Color {
                r: color[0] as f64,
                g: color[1] as f64,
                b: color[2] as f64,
                a: color[3] as f64,
            })
        } else {
            wgpu::LoadOp::Load
        };

        encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Clear Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: depth_view.map(|view| wgpu::RenderPassDepthStencilAttachment {
                view,
                depth_ops: Some(wgpu::Operations {
                    load: if flags.depth {
                        wgpu::LoadOp::Clear(1.0)
                    } else {
                        wgpu::LoadOp::Load
                    },
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
    }

    fn encode_draws(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: RenderTarget,
        viewport: Option<PixelRect>,
        items: &[DrawItem],
    ) {
        let Some((color_view, Some(depth_view), size)) = self.attachments(target) else {
            log::warn!("Draws into {target:?} skipped: target missing or without depth");
            return;
        };
        let full = PixelRect::new(0, 0, size.0, size.1);
        let Some(rect) = clamp_rect(viewport.unwrap_or(full), size) else {
            return;
        };
        let pipelines = match target {
            RenderTarget::Camera => &self.onscreen,
            RenderTarget::Texture(_) => &self.offscreen,
        };

        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Scene Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: color_view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: depth_view,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_viewport(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
            0.0,
            1.0,
        );
        rpass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);

        for item in items {
            match item {
                DrawItem::Object { pass, mesh, uniform } => {
                    let Some(gpu) = self.meshes.get(mesh) else { continue };
                    rpass.set_pipeline(pipelines.object(*pass));
                    rpass.set_bind_group(0, &self.binds.object, &[*uniform]);
                    rpass.set_vertex_buffer(0, gpu.vbo.slice(..));
                    rpass.set_index_buffer(gpu.ibo.slice(..), wgpu::IndexFormat::Uint16);
                    rpass.draw_indexed(0..gpu.index_count, 0, 0..1);
                }
                DrawItem::Instanced {
                    transparent,
                    mesh,
                    object,
                    views,
                    instances,
                } => {
                    let Some(gpu) = self.meshes.get(mesh) else { continue };
                    rpass.set_pipeline(pipelines.instanced(*transparent));
                    rpass.set_bind_group(0, &self.binds.object, &[*object]);
                    rpass.set_bind_group(1, &self.binds.views, &[*views]);
                    rpass.set_vertex_buffer(0, gpu.vbo.slice(..));
                    rpass.set_vertex_buffer(1, self.instance_buffer.slice(..));
                    rpass.set_index_buffer(gpu.ibo.slice(..), wgpu::IndexFormat::Uint16);
                    rpass.draw_indexed(0..gpu.index_count, 0, instances.clone());
                }
                DrawItem::Sky { uniform } => {
                    rpass.set_pipeline(pipelines.sky());
                    rpass.set_bind_group(0, &self.binds.sky, &[*uniform]);
                    rpass.set_vertex_buffer(0, self.fs_vbo.slice(..));
                    rpass.draw(0..3, 0..1);
                }
            }
        }
    }

    fn encode_copy(&self, encoder: &mut wgpu::CommandEncoder, copy: &TextureCopy) {
        let (Some(src), Some(dst)) = (self.textures.get(&copy.src), self.textures.get(&copy.dst)) else {
            log::warn!("Copy {:?} -> {:?} skipped: unknown texture", copy.src, copy.dst);
            return;
        };
        let width = copy
            .src_rect
            .width
            .min(src.width.saturating_sub(copy.src_rect.x))
            .min(dst.width.saturating_sub(copy.dst_x));
        let height = copy
            .src_rect
            .height
            .min(src.height.saturating_sub(copy.src_rect.y))
            .min(dst.height.saturating_sub(copy.dst_y));
        if width == 0 || height == 0 {
            return;
        }

        encoder.copy_texture_to_texture(
            wgpu::ImageCopyTexture {
                texture: src.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: copy.src_rect.x,
                    y: copy.src_rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyTexture {
                texture: dst.texture(),
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: copy.dst_x,
                    y: copy.dst_y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
    }

    fn encode_composite(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        material: MaterialHandle,
        source: TextureHandle,
        viewport: Option<PixelRect>,
        uniform: u32,
    ) {
        let (Some(pass), Some(quilt), Some(dst)) = (
            self.materials.get(&material),
            self.textures.get(&source),
            self.frame.as_ref(),
        ) else {
            log::warn!("Composite of {source:?} with {material:?} skipped");
            return;
        };
        let size = (self.gfx.config.width, self.gfx.config.height);
        let Some(rect) = clamp_rect(viewport.unwrap_or(PixelRect::new(0, 0, size.0, size.1)), size) else {
            return;
        };

        let bind = pass.bind(&self.gfx.device, &quilt.color, &self.uniform_buffer);
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Lenticular Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: dst,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rpass.set_viewport(
            rect.x as f32,
            rect.y as f32,
            rect.width as f32,
            rect.height as f32,
            0.0,
            1.0,
        );
        rpass.set_scissor_rect(rect.x, rect.y, rect.width, rect.height);
        pass.draw(&mut rpass, &bind, uniform);
    }
}

impl RenderBackend for WgpuBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        let max = self.gfx.device.limits().max_texture_dimension_2d;
        if desc.width > max || desc.height > max {
            return Err(BackendError::TextureCreation(format!(
                "{} is {}x{}, the device allows at most {max}",
                desc.label, desc.width, desc.height
            )));
        }

        let texture = match self.pool.take(desc) {
            Some(texture) => texture,
            None => {
                self.gfx.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
                let texture = GpuTexture::new(&self.gfx.device, desc);
                if pollster::block_on(self.gfx.device.pop_error_scope()).is_some() {
                    return Err(BackendError::OutOfMemory(desc.label));
                }
                texture
            }
        };

        let handle = TextureHandle(self.next_id());
        self.textures.insert(handle, texture);
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        if self.ops.is_empty() {
            self.free_texture(handle);
        } else {
            self.deferred.push(handle);
        }
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        self.target = target;
        self.viewport = None;
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        self.viewport = Some(rect);
    }

    fn set_view_projection(&mut self, view: Mat4, proj: Mat4) {
        self.view = view;
        self.proj = proj;
    }

    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]) {
        if flags.any() {
            self.ops.push(Op::Clear {
                target: self.target,
                flags,
                color,
            });
        }
    }

    fn draw_renderers(&mut self, filter: &DrawFilter) {
        if !self.scene_draws_allowed() {
            return;
        }
        let eye = self.view.inverse().w_axis.truncate();
        let mut visible: Vec<SceneObject> = self
            .scene
            .iter()
            .filter(|object| object.shader && filter.range.contains(object.queue))
            .copied()
            .collect();
        let distance = |object: &SceneObject| object.world.w_axis.truncate().distance_squared(eye);
        match filter.sort {
            SortOrder::FrontToBack => visible.sort_by(|a, b| distance(a).total_cmp(&distance(b))),
            SortOrder::BackToFront => visible.sort_by(|a, b| distance(b).total_cmp(&distance(a))),
        }
        self.record_objects(visible, |object| {
            if object.is_transparent() {
                ScenePass::Transparent
            } else {
                ScenePass::Opaque
            }
        });
    }

    fn draw_error_fallback(&mut self, range: RenderQueueRange) {
        if !self.scene_draws_allowed() {
            return;
        }
        let broken: Vec<SceneObject> = self
            .scene
            .iter()
            .filter(|object| !object.shader && range.contains(object.queue))
            .copied()
            .collect();
        self.record_objects(broken, |_| ScenePass::Error);
    }

    fn draw_skybox(&mut self) {
        if !self.scene_draws_allowed() {
            return;
        }
        let uniform = SkyUniform {
            inv_view_proj: (self.proj * self.view).inverse().to_cols_array_2d(),
            zenith: SKY_ZENITH,
            horizon: SKY_HORIZON,
        };
        let uniform = self.arena.push(&uniform);
        self.record(DrawItem::Sky { uniform });
    }

    fn renderers(&self) -> Vec<RendererEntry> {
        self.scene.iter().map(SceneObject::entry).collect()
    }

    fn draw_mesh_instanced(&mut self, draw: &InstancedDraw<'_>) {
        if draw.state.variant != ShaderVariant::QuiltInstancing {
            log::warn!("Instanced draw of {:?} without the quilt variant skipped", draw.mesh);
            return;
        }
        let views = draw.transforms.len();
        if views > MAX_VIEWS || draw.view_offsets.len() < views || draw.screen_rects.len() < views {
            log::error!(
                "Instanced draw of {:?} skipped: {views} instances, {} offsets, {} rects, limit {MAX_VIEWS}",
                draw.mesh,
                draw.view_offsets.len(),
                draw.screen_rects.len()
            );
            return;
        }
        let Some(mesh) = MeshKind::from_id(draw.mesh.0) else {
            log::warn!("Instanced draw of unknown mesh {:?} skipped", draw.mesh);
            return;
        };
        let Some(object) = self
            .scene
            .iter()
            .find(|object| object.material.id == draw.material)
            .copied()
        else {
            log::warn!("Instanced draw with unknown material {:?} skipped", draw.material);
            return;
        };
        if !self.scene_draws_allowed() {
            return;
        }

        let object_uniform = self.object_uniform(Mat4::IDENTITY, object.color);
        let object_offset = self.arena.push(&object_uniform);
        let views_uniform = ViewInstancingUniform::new(
            draw.view_offsets,
            draw.screen_rects,
            self.target_size(self.target),
        );
        let views_offset = self.arena.push(&views_uniform);

        let start = self.instances.len() as u32;
        self.instances.extend(draw.transforms.iter().map(|model| InstanceRaw {
            model: model.to_cols_array_2d(),
        }));
        let end = self.instances.len() as u32;

        self.record(DrawItem::Instanced {
            transparent: object.is_transparent(),
            mesh,
            object: object_offset,
            views: views_offset,
            instances: start..end,
        });
    }

    fn max_instanced_views(&self) -> u32 {
        MAX_VIEWS as u32
    }

    fn copy_texture_region(&mut self, copy: &TextureCopy) {
        self.ops.push(Op::Copy(*copy));
    }

    fn blit_to_camera(&mut self, source: TextureHandle) {
        self.ops.push(Op::Blit(source));
    }

    fn create_compositing_material(&mut self) -> Result<MaterialHandle, BackendError> {
        let pass = LenticularPass::new(&self.gfx.device, self.gfx.config.format);
        let handle = MaterialHandle(self.next_id());
        self.materials.insert(handle, pass);
        Ok(handle)
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        self.materials.remove(&handle);
    }

    fn draw_fullscreen(&mut self, material: MaterialHandle, source: TextureHandle, uniforms: &LenticularUniforms) {
        if self.target != RenderTarget::Camera {
            log::warn!("Composite into {:?} skipped: only the camera target is supported", self.target);
            return;
        }
        let uniform = self.arena.push(uniforms);
        self.ops.push(Op::Composite {
            material,
            source,
            viewport: self.viewport,
            uniform,
        });
    }

    fn camera_pixel_rect(&self) -> PixelRect {
        PixelRect::new(0, 0, self.gfx.config.width, self.gfx.config.height)
    }

    fn submit(&mut self) -> Result<(), BackendError> {
        let ops = std::mem::take(&mut self.ops);
        let result = if ops.is_empty() {
            Ok(())
        } else {
            self.execute(&ops)
        };

        self.arena.clear();
        self.instances.clear();
        for handle in std::mem::take(&mut self.deferred) {
            self.free_texture(handle);
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn arena_offsets_respect_alignment() {
        let mut arena = UniformArena::new(256);
        let first = arena.push(&[1.0f32; 4]);
        let second = arena.push(&[2.0f32; 64]);
        let third = arena.push(&0u32);

        assert_eq!((first, second, third), (0, 256, 512));
        assert_eq!(arena.bytes.len(), 516);
        assert_eq!(&arena.bytes[256..260], bytemuck::bytes_of(&2.0f32));

        arena.clear();
        assert_eq!(arena.push(&0u32), 0);
    }

    #[test]
    fn rects_are_clamped_to_the_target() {
        let size = (4096, 4096);
        assert_eq!(
            clamp_rect(PixelRect::new(3072, 3640, 1024, 455), size),
            Some(PixelRect::new(3072, 3640, 1024, 455))
        );
        assert_eq!(
            clamp_rect(PixelRect::new(4000, 0, 200, 100), size),
            Some(PixelRect::new(4000, 0, 96, 100))
        );
        assert_eq!(clamp_rect(PixelRect::new(5000, 0, 10, 10), size), None);
        assert_eq!(clamp_rect(PixelRect::new(0, 0, 0, 10), size), None);
    }
}
