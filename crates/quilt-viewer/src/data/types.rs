//! GPU-side data layouts shared by the scene, sky and interleave shaders.

/// Upper bound on views per instanced draw; sized by the `viewOffset` and
/// `screenRect` uniform arrays.
pub const MAX_VIEWS: usize = 64;

/// Mesh vertex. Must match locations 0 and 1 in the scene shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

/// Per-instance model matrix, read as four vec4 attributes (locations 2..=5).
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct InstanceRaw {
    pub model: [[f32; 4]; 4],
}

/// Per-draw uniform for scene objects. Must match `Object` in the scene shader.
#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ObjectUniform {
    pub view: [[f32; 4]; 4],
    pub proj: [[f32; 4]; 4],
    pub model: [[f32; 4]; 4],
    pub color: [f32; 4],
}

/// Per-view arrays of an instanced quilt draw. Must match `Views` in the
/// scene shader.
#[repr(C)]
#[derive(Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ViewInstancingUniform {
    /// (offset_x, offset_y, proj_offset_x, proj_offset_y) per view.
    pub view_offset: [[f32; 4]; MAX_VIEWS],
    /// NDC (center_x, center_y, width, height) of each view's tile.
    pub screen_rect: [[f32; 4]; MAX_VIEWS],
    /// Render target width and height in pixels; zw unused.
    pub target_size: [f32; 4],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct SkyUniform {
    pub inv_view_proj: [[f32; 4]; 4],
    pub zenith: [f32; 4],
    pub horizon: [f32; 4],
}

// Buffer sizes must match the WGSL-reflected sizes.
const _: [(); 208] = [(); core::mem::size_of::<ObjectUniform>()];
const _: [(); 2064] = [(); core::mem::size_of::<ViewInstancingUniform>()];
const _: [(); 96] = [(); core::mem::size_of::<SkyUniform>()];
const _: [(); 80] = [(); core::mem::size_of::<lenticular::compositor::LenticularUniforms>()];

impl ViewInstancingUniform {
    /// Packs the per-view arrays. Views beyond [`MAX_VIEWS`] are dropped; the
    /// renderer refuses such draws before they get here.
    pub fn new(view_offsets: &[glam::Vec4], screen_rects: &[glam::Vec4], target: (u32, u32)) -> Self {
        let mut uniform = Self {
            view_offset: [[0.0; 4]; MAX_VIEWS],
            screen_rect: [[0.0; 4]; MAX_VIEWS],
            target_size: [target.0 as f32, target.1 as f32, 0.0, 0.0],
        };
        for (slot, offset) in uniform.view_offset.iter_mut().zip(view_offsets) {
            *slot = offset.to_array();
        }
        for (slot, rect) in uniform.screen_rect.iter_mut().zip(screen_rects) {
            *slot = rect.to_array();
        }
        uniform
    }
}
