//! A backend that records every call instead of drawing.

use crate::backend::*;
use crate::compositor::LenticularUniforms;
use glam::{Mat4, Vec4};
use std::collections::HashSet;

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    CreateTexture(TextureHandle, TextureDesc),
    ReleaseTexture(TextureHandle),
    SetTarget(RenderTarget),
    SetViewport(PixelRect),
    SetViewProjection(Mat4, Mat4),
    Clear(ClearFlags),
    DrawRenderers(DrawFilter),
    DrawErrorFallback(RenderQueueRange),
    DrawSkybox,
    DrawInstanced { mesh: MeshId, instances: usize, state: PipelineState },
    Copy(TextureCopy),
    Blit(TextureHandle),
    CreateMaterial(MaterialHandle),
    ReleaseMaterial(MaterialHandle),
    DrawFullscreen(MaterialHandle, TextureHandle),
    Submit,
}

/// Owned copy of an [`InstancedDraw`].
#[derive(Debug, Clone)]
pub struct RecordedInstancedDraw {
    pub mesh: MeshId,
    pub material: MaterialId,
    pub transforms: Vec<Mat4>,
    pub view_offsets: Vec<Vec4>,
    pub screen_rects: Vec<Vec4>,
}

pub struct RecordingBackend {
    pub calls: Vec<Call>,
    pub instanced: Vec<RecordedInstancedDraw>,
    pub uniforms: Vec<LenticularUniforms>,
    pub scene: Vec<RendererEntry>,
    pub max_views: u32,
    pub camera_rect: PixelRect,
    pub fail_texture_creation: bool,
    /// Fails the submit with this zero-based index.
    pub fail_submit_at: Option<usize>,
    pub live_textures: HashSet<TextureHandle>,
    submits: usize,
    next_handle: u32,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self {
            calls: Vec::new(),
            instanced: Vec::new(),
            uniforms: Vec::new(),
            scene: Vec::new(),
            max_views: 64,
            camera_rect: PixelRect::new(0, 0, 2560, 1600),
            fail_texture_creation: false,
            fail_submit_at: None,
            live_textures: HashSet::new(),
            submits: 0,
            next_handle: 1,
        }
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }

    pub fn created_textures(&self) -> Vec<(TextureHandle, TextureDesc)> {
        self.calls
            .iter()
            .filter_map(|c| match c {
                Call::CreateTexture(h, d) => Some((*h, *d)),
                _ => None,
            })
            .collect()
    }

    fn handle(&mut self) -> u32 {
        let h = self.next_handle;
        self.next_handle += 1;
        h
    }
}

impl RenderBackend for RecordingBackend {
    fn create_texture(&mut self, desc: &TextureDesc) -> Result<TextureHandle, BackendError> {
        if self.fail_texture_creation {
            return Err(BackendError::OutOfMemory(desc.label));
        }
        let handle = TextureHandle(self.handle());
        self.live_textures.insert(handle);
        self.calls.push(Call::CreateTexture(handle, *desc));
        Ok(handle)
    }

    fn release_texture(&mut self, handle: TextureHandle) {
        self.live_textures.remove(&handle);
        self.calls.push(Call::ReleaseTexture(handle));
    }

    fn set_render_target(&mut self, target: RenderTarget) {
        self.calls.push(Call::SetTarget(target));
    }

    fn set_viewport(&mut self, rect: PixelRect) {
        self.calls.push(Call::SetViewport(rect));
    }

    fn set_view_projection(&mut self, view: Mat4, proj: Mat4) {
        self.calls.push(Call::SetViewProjection(view, proj));
    }

    fn clear(&mut self, flags: ClearFlags, _color: [f32; 4]) {
        self.calls.push(Call::Clear(flags));
    }

    fn draw_renderers(&mut self, filter: &DrawFilter) {
        self.calls.push(Call::DrawRenderers(*filter));
    }

    fn draw_error_fallback(&mut self, range: RenderQueueRange) {
        self.calls.push(Call::DrawErrorFallback(range));
    }

    fn draw_skybox(&mut self) {
        self.calls.push(Call::DrawSkybox);
    }

    fn renderers(&self) -> Vec<RendererEntry> {
        self.scene.clone()
    }

    fn draw_mesh_instanced(&mut self, draw: &InstancedDraw<'_>) {
        self.calls.push(Call::DrawInstanced {
            mesh: draw.mesh,
            instances: draw.transforms.len(),
            state: draw.state,
        });
        self.instanced.push(RecordedInstancedDraw {
            mesh: draw.mesh,
            material: draw.material,
            transforms: draw.transforms.to_vec(),
            view_offsets: draw.view_offsets.to_vec(),
            screen_rects: draw.screen_rects.to_vec(),
        });
    }

    fn max_instanced_views(&self) -> u32 {
        self.max_views
    }

    fn copy_texture_region(&mut self, copy: &TextureCopy) {
        self.calls.push(Call::Copy(*copy));
    }

    fn blit_to_camera(&mut self, source: TextureHandle) {
        self.calls.push(Call::Blit(source));
    }

    fn create_compositing_material(&mut self) -> Result<MaterialHandle, BackendError> {
        let handle = MaterialHandle(self.handle());
        self.calls.push(Call::CreateMaterial(handle));
        Ok(handle)
    }

    fn release_material(&mut self, handle: MaterialHandle) {
        self.calls.push(Call::ReleaseMaterial(handle));
    }

    fn draw_fullscreen(
        &mut self,
        material: MaterialHandle,
        source: TextureHandle,
        uniforms: &LenticularUniforms,
    ) {
        self.uniforms.push(*uniforms);
        self.calls.push(Call::DrawFullscreen(material, source));
    }

    fn camera_pixel_rect(&self) -> PixelRect {
        self.camera_rect
    }

    fn submit(&mut self) -> Result<(), BackendError> {
        let index = self.submits;
        self.submits += 1;
        if self.fail_submit_at == Some(index) {
            return Err(BackendError::Submission(format!("injected failure at submit {index}")));
        }
        self.calls.push(Call::Submit);
        Ok(())
    }
}
