//! Fills every tile of the quilt in one pass using GPU instancing.
//!
//! Each eligible mesh is drawn once with one instance per view. The vertex
//! stage of the quilt-instancing shader variant reads `viewOffset[instance]`
//! to shift the view and projection, and `screenRect[instance]` to squeeze the
//! clip-space result into the instance's tile.
//!
//! Opaque-queue meshes go first, nearest first. Transparent-queue meshes follow,
//! farthest first, so blending sees everything behind it already in the tile.

use crate::backend::{
    ClearFlags, InstancedDraw, MaterialId, MeshId, PipelineState, PixelRect, RenderBackend,
    RenderQueueRange, RenderTarget, RendererEntry, TextureHandle,
};
use crate::config::CameraFramingConfig;
use crate::layout::TileLayout;
use crate::projection::{view_projection_offsets_with_cone, Camera};
use crate::{Error, Result};
use glam::{Mat4, Vec3, Vec4};

/// What one instanced pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InstancedStats {
    pub draws: u32,
    /// Renderers left out because they lack a mesh, a material, or an
    /// instancing-enabled material, or sit outside both queue ranges.
    pub skipped: u32,
}

#[derive(Debug, Clone, Copy)]
struct Eligible {
    mesh: MeshId,
    material: MaterialId,
    world: Mat4,
    /// Squared distance from the eye.
    depth: f32,
}

/// Splits the scene into opaque and transparent draws, each in drawing order.
fn draw_order(
    entries: Vec<RendererEntry>,
    eye: Vec3,
    stats: &mut InstancedStats,
) -> (Vec<Eligible>, Vec<Eligible>) {
    let mut opaque = Vec::new();
    let mut transparent = Vec::new();
    for entry in entries {
        let (Some(mesh), Some(material)) = (entry.mesh, entry.material) else {
            log::trace!("Skipping renderer without mesh or material");
            stats.skipped += 1;
            continue;
        };
        if !material.enable_instancing {
            log::trace!("Skipping mesh {mesh:?}: material {:?} has instancing disabled", material.id);
            stats.skipped += 1;
            continue;
        }
        let eligible = Eligible {
            mesh,
            material: material.id,
            world: entry.world,
            depth: entry.world.w_axis.truncate().distance_squared(eye),
        };
        if RenderQueueRange::OPAQUE.contains(entry.queue) {
            opaque.push(eligible);
        } else if RenderQueueRange::TRANSPARENT.contains(entry.queue) {
            transparent.push(eligible);
        } else {
            log::trace!("Skipping mesh {mesh:?}: queue {} is outside every range", entry.queue);
            stats.skipped += 1;
        }
    }
    opaque.sort_by(|a, b| a.depth.total_cmp(&b.depth));
    transparent.sort_by(|a, b| b.depth.total_cmp(&a.depth));
    (opaque, transparent)
}

/// Per-view arrays are kept between frames to avoid reallocating them.
#[derive(Debug, Clone)]
pub struct InstancedRenderer {
    pub clear_color: [f32; 4],
    view_offsets: Vec<Vec4>,
    screen_rects: Vec<Vec4>,
    transforms: Vec<Mat4>,
}

impl Default for InstancedRenderer {
    fn default() -> Self {
        Self {
            clear_color: [0.0, 0.0, 0.0, 1.0],
            view_offsets: Vec::new(),
            screen_rects: Vec::new(),
            transforms: Vec::new(),
        }
    }
}

impl InstancedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `viewOffset[]` as uploaded by the last pass.
    pub fn view_offsets(&self) -> &[Vec4] {
        &self.view_offsets
    }

    /// `screenRect[]` as uploaded by the last pass.
    pub fn screen_rects(&self) -> &[Vec4] {
        &self.screen_rects
    }

    /// Fills the per-view arrays. Instance `i` renders view `i` into tile `i`.
    pub fn prepare(
        &mut self,
        camera: &Camera,
        layout: &TileLayout,
        framing: &CameraFramingConfig,
        view_cone: f32,
    ) {
        let views = layout.tile_count();
        self.view_offsets.clear();
        self.screen_rects.clear();
        for index in 0..views {
            let offset = view_projection_offsets_with_cone(
                camera.aspect,
                framing.fov,
                framing.size,
                index,
                views,
                view_cone,
            );
            self.view_offsets.push(offset.to_vec4());
            self.screen_rects.push(layout.tile_screen_rect(index).to_ndc());
        }
    }

    pub fn render<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &Camera,
        layout: &TileLayout,
        framing: &CameraFramingConfig,
        view_cone: f32,
        quilt: TextureHandle,
    ) -> Result<InstancedStats> {
        let views = layout.tile_count();
        let limit = backend.max_instanced_views();
        if views > limit {
            return Err(Error::TooManyViews { views, limit });
        }
        self.prepare(camera, layout, framing, view_cone);

        backend.set_render_target(RenderTarget::Texture(quilt));
        backend.set_viewport(PixelRect::new(
            0,
            0,
            layout.render_target_width,
            layout.render_target_height,
        ));
        backend.clear(ClearFlags::ALL, self.clear_color);
        backend.set_view_projection(camera.view_matrix(), camera.projection_matrix());

        let mut stats = InstancedStats::default();
        let (opaque, transparent) = draw_order(backend.renderers(), camera.position, &mut stats);
        for eligible in opaque.iter().chain(&transparent) {
            self.transforms.clear();
            self.transforms.resize(views as usize, eligible.world);
            backend.draw_mesh_instanced(&InstancedDraw {
                mesh: eligible.mesh,
                material: eligible.material,
                transforms: &self.transforms,
                view_offsets: &self.view_offsets,
                screen_rects: &self.screen_rects,
                state: PipelineState::QUILT_INSTANCING,
            });
            stats.draws += 1;
        }

        backend.submit()?;
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MaterialInfo;
    use crate::config::RenderingMethod;
    use crate::projection::{setup_camera_framing, view_projection_offsets};
    use crate::testing::{Call, RecordingBackend};

    fn layout(tx: u32, ty: u32) -> TileLayout {
        TileLayout {
            render_target_width: 4096,
            render_target_height: 4096,
            tile_count_x: tx,
            tile_count_y: ty,
            rendering_method: RenderingMethod::SinglePassInstancing,
        }
    }

    fn framed(framing: &CameraFramingConfig) -> Camera {
        let mut camera = Camera { aspect: 1.6, ..Default::default() };
        setup_camera_framing(&mut camera, framing);
        camera
    }

    fn entry(mesh: Option<u32>, material: Option<(u32, bool)>) -> RendererEntry {
        queued(mesh, material, 2000)
    }

    fn queued(mesh: Option<u32>, material: Option<(u32, bool)>, queue: u32) -> RendererEntry {
        RendererEntry {
            mesh: mesh.map(MeshId),
            material: material.map(|(id, enable_instancing)| MaterialInfo {
                id: MaterialId(id),
                enable_instancing,
            }),
            world: Mat4::from_translation(Vec3::new(mesh.unwrap_or(0) as f32, 0.0, 0.0)),
            queue,
        }
    }

    #[test]
    fn only_instanceable_meshes_are_drawn() {
        let framing = CameraFramingConfig::default();
        let camera = framed(&framing);
        let mut backend = RecordingBackend::new();
        backend.scene = vec![
            entry(Some(1), Some((10, true))),
            entry(None, Some((11, true))),
            entry(Some(2), None),
            entry(Some(3), Some((12, false))),
            entry(Some(4), Some((13, true))),
        ];

        let stats = InstancedRenderer::new()
            .render(&mut backend, &camera, &layout(4, 9), &framing, 40.0, TextureHandle(5))
            .unwrap();

        assert_eq!(stats, InstancedStats { draws: 2, skipped: 3 });
        let meshes: Vec<_> = backend.instanced.iter().map(|d| d.mesh).collect();
        assert_eq!(meshes, vec![MeshId(1), MeshId(4)]);
        for draw in &backend.instanced {
            assert_eq!(draw.transforms.len(), 36);
            assert!(draw.transforms.iter().all(|t| t.w_axis.x == draw.mesh.0 as f32));
        }
        assert_eq!(backend.instanced[1].material, MaterialId(13));
        assert_eq!(
            backend.count(|c| matches!(
                c,
                Call::DrawInstanced { state: PipelineState::QUILT_INSTANCING, instances: 36, .. }
            )),
            2
        );
    }

    #[test]
    fn transparent_meshes_follow_opaque_ones_back_to_front() {
        let framing = CameraFramingConfig::default();
        let camera = framed(&framing);
        let mut backend = RecordingBackend::new();
        // Enumerated transparent first; x doubles as distance from the eye axis.
        backend.scene = vec![
            queued(Some(2), Some((20, true)), 3000),
            queued(Some(9), Some((21, true)), 3000),
            queued(Some(5), Some((22, true)), 2000),
            queued(Some(1), Some((23, true)), 2450),
            queued(Some(7), Some((24, true)), 6000),
        ];

        let stats = InstancedRenderer::new()
            .render(&mut backend, &camera, &layout(2, 2), &framing, 40.0, TextureHandle(5))
            .unwrap();

        let meshes: Vec<_> = backend.instanced.iter().map(|d| d.mesh.0).collect();
        assert_eq!(meshes, vec![1, 5, 9, 2]);
        assert_eq!(stats, InstancedStats { draws: 4, skipped: 1 });
    }

    #[test]
    fn pass_targets_the_quilt_then_submits_once() {
        let framing = CameraFramingConfig::default();
        let camera = framed(&framing);
        let mut backend = RecordingBackend::new();
        backend.scene = vec![entry(Some(1), Some((10, true)))];
        let quilt = TextureHandle(5);

        InstancedRenderer::new()
            .render(&mut backend, &camera, &layout(2, 2), &framing, 40.0, quilt)
            .unwrap();

        assert_eq!(
            &backend.calls[..4],
            &[
                Call::SetTarget(RenderTarget::Texture(quilt)),
                Call::SetViewport(PixelRect::new(0, 0, 4096, 4096)),
                Call::Clear(ClearFlags::ALL),
                Call::SetViewProjection(camera.view_matrix(), camera.projection_matrix()),
            ]
        );
        assert_eq!(backend.calls.last(), Some(&Call::Submit));
        assert_eq!(backend.count(|c| *c == Call::Submit), 1);
    }

    #[test]
    fn instance_arrays_map_view_to_tile() {
        let framing = CameraFramingConfig { fov: 13.5, size: 2.0, ..Default::default() };
        let camera = framed(&framing);
        let layout = layout(4, 9);
        let mut renderer = InstancedRenderer::new();
        renderer.prepare(&camera, &layout, &framing, 40.0);

        assert_eq!(renderer.view_offsets().len(), 36);
        assert_eq!(renderer.screen_rects().len(), 36);
        for index in [0u32, 17, 35] {
            let expected = view_projection_offsets(1.6, 13.5, 2.0, index, 36).to_vec4();
            assert_eq!(renderer.view_offsets()[index as usize], expected);
            assert_eq!(
                renderer.screen_rects()[index as usize],
                layout.tile_screen_rect(index).to_ndc()
            );
        }
        // View 0 is the leftmost camera and lands in the top-left tile.
        assert!(renderer.view_offsets()[0].x < 0.0);
        let first = renderer.screen_rects()[0];
        assert!(first.x < 0.0 && first.y > 0.0);
    }

    #[test]
    fn too_many_views_fail_before_drawing() {
        let framing = CameraFramingConfig::default();
        let camera = framed(&framing);
        let mut backend = RecordingBackend::new();
        backend.max_views = 16;

        let err = InstancedRenderer::new()
            .render(&mut backend, &camera, &layout(4, 9), &framing, 40.0, TextureHandle(5))
            .unwrap_err();
        assert!(matches!(err, Error::TooManyViews { views: 36, limit: 16 }));
        assert!(backend.calls.is_empty());
    }
}
