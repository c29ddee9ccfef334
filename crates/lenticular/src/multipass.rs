//! Fills the quilt one view at a time.
//!
//! Every view is a full scene pass into a tile-sized temporary target which is
//! then copied into its tile. Simple and works with any material, at the cost
//! of one scene traversal per view.

use crate::backend::{
    ClearFlags, DrawFilter, PixelRect, RenderBackend, RenderQueueRange, RenderTarget,
    TextureCopy, TextureHandle,
};
use crate::config::CameraFramingConfig;
use crate::layout::TileLayout;
use crate::projection::{view_projection_offsets_with_cone, Camera};
use crate::Result;

#[derive(Debug, Clone)]
pub struct MultiPassRenderer {
    pub clear_color: [f32; 4],
}

impl Default for MultiPassRenderer {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl MultiPassRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Renders every view of `layout` into `quilt`.
    ///
    /// `camera` must already be framed; its matrices are the center view the
    /// per-view offsets are applied to. The temporary tile target is released
    /// before returning, also on failure.
    pub fn render<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &Camera,
        layout: &TileLayout,
        framing: &CameraFramingConfig,
        view_cone: f32,
        quilt: TextureHandle,
    ) -> Result<()> {
        let tile_target = backend.create_texture(&layout.tile_texture_desc())?;
        let result = self.render_tiles(backend, camera, layout, framing, view_cone, quilt, tile_target);
        backend.release_texture(tile_target);
        result
    }

    #[allow(clippy::too_many_arguments)]
    fn render_tiles<B: RenderBackend + ?Sized>(
        &self,
        backend: &mut B,
        camera: &Camera,
        layout: &TileLayout,
        framing: &CameraFramingConfig,
        view_cone: f32,
        quilt: TextureHandle,
        tile_target: TextureHandle,
    ) -> Result<()> {
        // Padding right of and below the grid is never drawn; clear it once.
        backend.set_render_target(RenderTarget::Texture(quilt));
        backend.clear(ClearFlags::COLOR, self.clear_color);

        let view = camera.view_matrix();
        let proj = camera.projection_matrix();
        let views = layout.tile_count();
        let (tile_w, tile_h) = layout.tile_size();
        let src_rect = PixelRect::new(0, 0, tile_w, tile_h);

        for index in 0..views {
            let offset = view_projection_offsets_with_cone(
                camera.aspect,
                framing.fov,
                framing.size,
                index,
                views,
                view_cone,
            );
            let (view_i, proj_i) = offset.apply(view, proj);

            backend.set_view_projection(view_i, proj_i);
            backend.set_render_target(RenderTarget::Texture(tile_target));
            backend.clear(ClearFlags::ALL, self.clear_color);

            backend.draw_renderers(&DrawFilter::OPAQUE);
            backend.draw_error_fallback(RenderQueueRange::OPAQUE);
            backend.draw_renderers(&DrawFilter::TRANSPARENT);

            let dst = layout.tile_pixel_rect(index);
            backend.copy_texture_region(&TextureCopy {
                src: tile_target,
                src_rect,
                dst: quilt,
                dst_x: dst.x,
                dst_y: dst.y,
            });
            backend.submit()?;
        }
        Ok(())
    }
}
