//! The contract between the quilt passes and the host renderer.
//!
//! The passes in this crate only decide *what* gets drawn where and in which
//! order. Device ownership, culling, materials and command encoding belong to
//! whatever implements [`RenderBackend`].

use crate::compositor::LenticularUniforms;
use glam::{Mat4, Vec4};

/// Opaque handle to a texture owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u32);

/// Opaque handle to a compositing material owned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialHandle(pub u32);

/// Host-side identifier of a mesh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshId(pub u32);

/// Host-side identifier of a scene material.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialId(pub u32);

/// Where draws land.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderTarget {
    /// The final color target of the camera being rendered.
    Camera,
    Texture(TextureHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureDesc {
    pub label: &'static str,
    pub width: u32,
    pub height: u32,
    /// Whether the texture carries its own depth buffer.
    pub depth: bool,
}

/// Rectangle in texels, origin top-left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl PixelRect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> u32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.height
    }

    pub fn overlaps(&self, other: &PixelRect) -> bool {
        self.x < other.right() && other.x < self.right() && self.y < other.bottom() && other.y < self.bottom()
    }
}

/// Inclusive range of render-queue values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderQueueRange {
    pub lower: u32,
    pub upper: u32,
}

impl RenderQueueRange {
    pub const OPAQUE: Self = Self { lower: 0, upper: 2500 };
    pub const TRANSPARENT: Self = Self { lower: 2501, upper: 5000 };
    pub const ALL: Self = Self { lower: 0, upper: 5000 };

    pub fn contains(&self, queue: u32) -> bool {
        (self.lower..=self.upper).contains(&queue)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    /// Opaque ordering, nearest first to maximise early depth rejection.
    FrontToBack,
    /// Transparent ordering, farthest first for correct blending.
    BackToFront,
}

/// Selects which renderers a draw call covers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawFilter {
    pub range: RenderQueueRange,
    pub sort: SortOrder,
}

impl DrawFilter {
    pub const OPAQUE: Self = Self {
        range: RenderQueueRange::OPAQUE,
        sort: SortOrder::FrontToBack,
    };
    pub const TRANSPARENT: Self = Self {
        range: RenderQueueRange::TRANSPARENT,
        sort: SortOrder::BackToFront,
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClearFlags {
    pub color: bool,
    pub depth: bool,
}

impl ClearFlags {
    pub const ALL: Self = Self { color: true, depth: true };
    pub const COLOR: Self = Self { color: true, depth: false };
    pub const NONE: Self = Self { color: false, depth: false };

    pub fn any(&self) -> bool {
        self.color || self.depth
    }
}

/// Shader variant requested for a draw. Passed per call rather than toggled
/// globally.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShaderVariant {
    #[default]
    Standard,
    /// The vertex stage picks `viewOffset[instance]` and
    /// `screenRect[instance]` and places the instance in its quilt tile.
    QuiltInstancing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PipelineState {
    pub variant: ShaderVariant,
}

impl PipelineState {
    pub const QUILT_INSTANCING: Self = Self {
        variant: ShaderVariant::QuiltInstancing,
    };
}

/// Material information the passes need to filter on.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaterialInfo {
    pub id: MaterialId,
    /// The material was explicitly opted into GPU instancing.
    pub enable_instancing: bool,
}

/// One renderable object as enumerated by the host scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RendererEntry {
    pub mesh: Option<MeshId>,
    pub material: Option<MaterialInfo>,
    pub world: Mat4,
    /// Render-queue value; see [`RenderQueueRange`].
    pub queue: u32,
}

/// One mesh drawn once per view, all views in a single call.
#[derive(Debug, Clone, Copy)]
pub struct InstancedDraw<'a> {
    pub mesh: MeshId,
    pub material: MaterialId,
    /// One world matrix per instance.
    pub transforms: &'a [Mat4],
    /// `viewOffset[]`, indexed by instance.
    pub view_offsets: &'a [Vec4],
    /// `screenRect[]`, indexed by instance: NDC center x/y, width, height.
    pub screen_rects: &'a [Vec4],
    pub state: PipelineState,
}

/// Region copy between two backend textures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    pub src: TextureHandle,
    pub src_rect: PixelRect,
    pub dst: TextureHandle,
    pub dst_x: u32,
    pub dst_y: u32,
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("out of GPU memory while allocating {0}")]
    OutOfMemory(&'static str),
    #[error("texture creation failed: {0}")]
    TextureCreation(String),
    #[error("unknown texture handle {0:?}")]
    UnknownTexture(TextureHandle),
    #[error("command submission failed: {0}")]
    Submission(String),
}

/// What the quilt passes require from the host renderer.
///
/// Recording calls are infallible; problems surface when a resource is
/// created or when the batch is submitted.
pub trait RenderBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError>;
    fn release_texture(&mut self, handle: TextureHandle);

    fn set_render_target(&mut self, target: RenderTarget);
    /// Restricts rasterisation to `rect` of the current target until the
    /// target changes.
    fn set_viewport(&mut self, rect: PixelRect);
    fn set_view_projection(&mut self, view: Mat4, proj: Mat4);
    fn clear(&mut self, flags: ClearFlags, color: [f32; 4]);

    /// Draws every visible renderer whose queue falls in `filter.range`.
    fn draw_renderers(&mut self, filter: &DrawFilter);
    /// Draws renderers in `range` that match no supported shader pass with
    /// an error shader.
    fn draw_error_fallback(&mut self, range: RenderQueueRange);
    fn draw_skybox(&mut self);

    fn renderers(&self) -> Vec<RendererEntry>;
    fn draw_mesh_instanced(&mut self, draw: &InstancedDraw<'_>);
    /// Largest instance count `draw_mesh_instanced` accepts with
    /// [`ShaderVariant::QuiltInstancing`].
    fn max_instanced_views(&self) -> u32;

    fn copy_texture_region(&mut self, copy: &TextureCopy);
    /// Copies `source` over the whole camera target.
    fn blit_to_camera(&mut self, source: TextureHandle);

    fn create_compositing_material(&mut self) -> Result<MaterialHandle, BackendError>;
    fn release_material(&mut self, handle: MaterialHandle);
    /// Full-screen quad over the current viewport, sampling `source`.
    fn draw_fullscreen(
        &mut self,
        material: MaterialHandle,
        source: TextureHandle,
        uniforms: &LenticularUniforms,
    );

    /// Pixel rectangle of the camera target.
    fn camera_pixel_rect(&self) -> PixelRect;

    /// Executes everything recorded since the previous submit, in order.
    fn submit(&mut self) -> Result<(), BackendError>;
}
