//! Conventional single-view rendering for outputs that are not the panel,
//! such as an editor or debug window.

use crate::backend::{ClearFlags, DrawFilter, RenderBackend, RenderTarget, TextureHandle};
use crate::projection::Camera;
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ForwardSettings {
    pub clear: ClearFlags,
    pub clear_color: [f32; 4],
    /// Draw the skybox between the opaque and transparent queues.
    pub skybox: bool,
    /// Render here first and blit to the camera at the end.
    pub intermediate: Option<TextureHandle>,
}

impl Default for ForwardSettings {
    fn default() -> Self {
        Self {
            clear: ClearFlags::ALL,
            clear_color: [0.05, 0.05, 0.08, 1.0],
            skybox: true,
            intermediate: None,
        }
    }
}

pub fn render_forward<B: RenderBackend + ?Sized>(
    backend: &mut B,
    camera: &Camera,
    settings: &ForwardSettings,
) -> Result<()> {
    match settings.intermediate {
        Some(texture) => backend.set_render_target(RenderTarget::Texture(texture)),
        None => {
            backend.set_render_target(RenderTarget::Camera);
            let viewport = backend.camera_pixel_rect();
            backend.set_viewport(viewport);
        }
    }
    backend.set_view_projection(camera.view_matrix(), camera.projection_matrix());
    if settings.clear.any() {
        backend.clear(settings.clear, settings.clear_color);
    }

    backend.draw_renderers(&DrawFilter::OPAQUE);
    if settings.skybox {
        backend.draw_skybox();
    }
    backend.draw_renderers(&DrawFilter::TRANSPARENT);

    if let Some(texture) = settings.intermediate {
        backend.blit_to_camera(texture);
    }
    backend.submit()?;
    Ok(())
}
