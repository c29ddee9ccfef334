//! Per-frame orchestration.
//!
//! [`QuiltPipeline`] owns the quilt texture and the compositor material, picks
//! the tile strategy from the settings, and runs the passes in order for each
//! camera it is asked to render.

use crate::backend::{RenderBackend, TextureHandle};
use crate::compositor::LenticularCompositor;
use crate::config::{CameraRig, DeviceCalibration, QuiltSettings, RenderingMethod};
use crate::forward::{render_forward, ForwardSettings};
use crate::instanced::InstancedRenderer;
use crate::layout::TileLayout;
use crate::multipass::MultiPassRenderer;
use crate::projection::{setup_camera_framing, Camera, DEFAULT_VIEW_CONE_DEG};
use crate::Result;

/// Which kind of output a camera feeds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OutputContext {
    /// The lenticular panel: tile, then composite.
    Primary,
    /// Anything else: a plain forward render.
    Auxiliary(ForwardSettings),
}

pub struct FrameRequest<'a> {
    /// Framed in place for primary output.
    pub camera: &'a mut Camera,
    /// Calibration and framing attached to this camera, if any.
    pub rig: Option<&'a CameraRig>,
    pub output: OutputContext,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameReport {
    pub output: OutputContext,
    /// `None` for auxiliary output.
    pub rendering_method: Option<RenderingMethod>,
    pub views: u32,
    /// The quilt texture was (re)created this frame.
    pub reallocated: bool,
}

/// The quilt texture and the layout it was allocated for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuiltTexture {
    pub handle: TextureHandle,
    pub layout: TileLayout,
}

impl QuiltTexture {
    pub fn allocate<B: RenderBackend + ?Sized>(backend: &mut B, layout: &TileLayout) -> Result<Self> {
        let handle = backend.create_texture(&layout.quilt_texture_desc())?;
        let (tile_w, tile_h) = layout.tile_size();
        log::info!(
            "Allocated {}x{} quilt for {} ({}x{} tiles of {}x{} px)",
            layout.render_target_width,
            layout.render_target_height,
            layout.rendering_method,
            layout.tile_count_x,
            layout.tile_count_y,
            tile_w,
            tile_h
        );
        Ok(Self {
            handle,
            layout: *layout,
        })
    }

    pub fn release<B: RenderBackend + ?Sized>(self, backend: &mut B) {
        backend.release_texture(self.handle);
    }
}

enum TileStrategy {
    MultiPass(MultiPassRenderer),
    Instanced(InstancedRenderer),
}

impl TileStrategy {
    fn for_method(method: RenderingMethod) -> Self {
        match method {
            RenderingMethod::MultiPass => Self::MultiPass(MultiPassRenderer::new()),
            RenderingMethod::SinglePassInstancing => Self::Instanced(InstancedRenderer::new()),
        }
    }

    fn method(&self) -> RenderingMethod {
        match self {
            Self::MultiPass(_) => RenderingMethod::MultiPass,
            Self::Instanced(_) => RenderingMethod::SinglePassInstancing,
        }
    }
}

pub struct QuiltPipeline {
    settings: QuiltSettings,
    previous_layout: Option<TileLayout>,
    quilt: Option<QuiltTexture>,
    compositor: LenticularCompositor,
    strategy: TileStrategy,
}

impl QuiltPipeline {
    pub fn new(settings: QuiltSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            strategy: TileStrategy::for_method(settings.rendering_method),
            settings,
            previous_layout: None,
            quilt: None,
            compositor: LenticularCompositor::new(),
        })
    }

    pub fn settings(&self) -> &QuiltSettings {
        &self.settings
    }

    /// Changes take effect on the next frame, which reallocates if needed.
    pub fn settings_mut(&mut self) -> &mut QuiltSettings {
        &mut self.settings
    }

    pub fn set_rendering_method(&mut self, method: RenderingMethod) {
        if self.settings.rendering_method != method {
            log::info!(
                "Switching rendering method: {} -> {}",
                self.settings.rendering_method,
                method
            );
            self.settings.rendering_method = method;
        }
    }

    pub fn quilt(&self) -> Option<&QuiltTexture> {
        self.quilt.as_ref()
    }

    pub fn set_overscan(&mut self, overscan: bool) {
        self.compositor.overscan = overscan;
    }

    pub fn render_frame<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        request: FrameRequest<'_>,
    ) -> Result<FrameReport> {
        let FrameRequest { camera, rig, output } = request;
        match output {
            OutputContext::Primary => self.render_primary(backend, camera, rig),
            OutputContext::Auxiliary(forward) => {
                render_forward(backend, camera, &forward)?;
                Ok(FrameReport {
                    output,
                    rendering_method: None,
                    views: 1,
                    reallocated: false,
                })
            }
        }
    }

    fn render_primary<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        camera: &mut Camera,
        rig: Option<&CameraRig>,
    ) -> Result<FrameReport> {
        let rig = match rig {
            Some(rig) => {
                rig.calibration.validate()?;
                rig.framing.validate()?;
                *rig
            }
            None => CameraRig {
                calibration: DeviceCalibration::default(),
                framing: self.settings.framing,
            },
        };

        camera.aspect = rig.calibration.aspect();
        setup_camera_framing(camera, &rig.framing);

        let layout = TileLayout::from_settings(&self.settings)?;
        let (quilt, reallocated) = self.ensure_quilt(backend, &layout)?;
        self.previous_layout = Some(layout);

        if self.strategy.method() != layout.rendering_method {
            self.strategy = TileStrategy::for_method(layout.rendering_method);
        }
        let view_cone = if self.settings.use_calibration_view_cone {
            rig.calibration.view_cone
        } else {
            DEFAULT_VIEW_CONE_DEG
        };
        match &mut self.strategy {
            TileStrategy::MultiPass(renderer) => {
                renderer.render(backend, camera, &layout, &rig.framing, view_cone, quilt)?;
            }
            TileStrategy::Instanced(renderer) => {
                let stats = renderer.render(backend, camera, &layout, &rig.framing, view_cone, quilt)?;
                log::trace!("Instanced pass: {} draws, {} skipped", stats.draws, stats.skipped);
            }
        }

        self.compositor
            .composite(backend, &rig.calibration, &layout, quilt)?;

        log::debug!(
            "Rendered {} views with {}{}",
            layout.tile_count(),
            layout.rendering_method,
            if reallocated { " (reallocated)" } else { "" }
        );
        Ok(FrameReport {
            output: OutputContext::Primary,
            rendering_method: Some(layout.rendering_method),
            views: layout.tile_count(),
            reallocated,
        })
    }

    /// Makes sure a quilt matching `layout` exists. Returns its handle and
    /// whether it had to be created.
    fn ensure_quilt<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        layout: &TileLayout,
    ) -> Result<(TextureHandle, bool)> {
        if let Some(quilt) = self.quilt.as_mut() {
            if !TileLayout::needs_reallocation(self.previous_layout.as_ref(), layout) {
                quilt.layout = *layout;
                return Ok((quilt.handle, false));
            }
        }
        if let Some(stale) = self.quilt.take() {
            stale.release(backend);
        }
        self.previous_layout = None;
        let quilt = QuiltTexture::allocate(backend, layout)?;
        self.quilt = Some(quilt);
        Ok((quilt.handle, true))
    }

    /// Destroys the quilt texture and the compositing material.
    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(quilt) = self.quilt.take() {
            quilt.release(backend);
        }
        self.compositor.release(backend);
        self.previous_layout = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MaterialId, MaterialInfo, MeshId, RendererEntry};
    use crate::projection::{adjusted_distance, view_projection_offsets, view_projection_offsets_with_cone};
    use crate::testing::{Call, RecordingBackend};
    use crate::Error;
    use glam::Mat4;

    fn primary(camera: &mut Camera) -> FrameRequest<'_> {
        FrameRequest {
            camera,
            rig: None,
            output: OutputContext::Primary,
        }
    }

    fn small_settings(method: RenderingMethod) -> QuiltSettings {
        QuiltSettings {
            render_target_width: 400,
            render_target_height: 400,
            tile_count_x: 2,
            tile_count_y: 2,
            rendering_method: method,
            ..Default::default()
        }
    }

    #[test]
    fn quilt_is_allocated_once_and_reused() {
        let mut backend = RecordingBackend::new();
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();

        let first = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();
        let second = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();

        assert!(first.reallocated);
        assert!(!second.reallocated);
        assert_eq!(first.views, 4);
        assert_eq!(first.rendering_method, Some(RenderingMethod::MultiPass));

        let quilts: Vec<_> = backend
            .created_textures()
            .into_iter()
            .filter(|(_, desc)| desc.label == "Quilt Texture")
            .collect();
        assert_eq!(quilts.len(), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::CreateMaterial(_))), 1);
        assert_eq!(backend.count(|c| matches!(c, Call::DrawFullscreen(..))), 2);
        // Only the quilt survives between frames; tile targets are released.
        assert_eq!(backend.live_textures.len(), 1);
    }

    #[test]
    fn switching_method_reallocates_with_depth() {
        let mut backend = RecordingBackend::new();
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();
        pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();
        let old = pipeline.quilt().unwrap().handle;

        pipeline.set_rendering_method(RenderingMethod::SinglePassInstancing);
        let report = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();

        assert!(report.reallocated);
        assert_eq!(report.rendering_method, Some(RenderingMethod::SinglePassInstancing));
        assert!(!backend.live_textures.contains(&old));
        let quilt = pipeline.quilt().unwrap();
        assert!(quilt.layout.quilt_texture_desc().depth);
        let (_, desc) = *backend.created_textures().last().unwrap();
        assert!(desc.depth);
    }

    #[test]
    fn instanced_frame_draws_into_the_quilt_and_composites() {
        let mut backend = RecordingBackend::new();
        backend.scene = vec![RendererEntry {
            mesh: Some(MeshId(1)),
            material: Some(MaterialInfo { id: MaterialId(1), enable_instancing: true }),
            world: Mat4::IDENTITY,
            queue: 2000,
        }];
        let mut pipeline =
            QuiltPipeline::new(small_settings(RenderingMethod::SinglePassInstancing)).unwrap();
        let mut camera = Camera::default();
        pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();

        let quilt = pipeline.quilt().unwrap().handle;
        assert_eq!(backend.instanced.len(), 1);
        assert_eq!(backend.instanced[0].view_offsets.len(), 4);
        assert_eq!(backend.count(|c| matches!(c, Call::Copy(_))), 0);
        let draw = backend.calls.iter().position(|c| matches!(c, Call::DrawInstanced { .. }));
        let composite = backend
            .calls
            .iter()
            .position(|c| *c == Call::DrawFullscreen(pipeline.compositor.material().unwrap(), quilt));
        assert!(draw.unwrap() < composite.unwrap());
    }

    #[test]
    fn camera_is_framed_from_settings_without_a_rig() {
        let mut backend = RecordingBackend::new();
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();
        pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();

        assert!((camera.aspect - 1.6).abs() < 1e-6);
        assert_eq!(camera.fov_deg, 13.5);
        assert!((camera.position.z - adjusted_distance(13.5, 2.0)).abs() < 1e-4);
        let uniforms = backend.uniforms[0];
        assert_eq!(uniforms.tile, [2.0, 2.0, 1.0, 1.0]);
    }

    #[test]
    fn rig_overrides_calibration_and_framing() {
        let mut backend = RecordingBackend::new();
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();
        let rig = CameraRig {
            calibration: DeviceCalibration {
                screen_w: 1536.0,
                screen_h: 2048.0,
                ..Default::default()
            },
            ..Default::default()
        };
        pipeline
            .render_frame(
                &mut backend,
                FrameRequest { camera: &mut camera, rig: Some(&rig), output: OutputContext::Primary },
            )
            .unwrap();

        assert!((camera.aspect - 0.75).abs() < 1e-6);
        assert!((camera.position.z - adjusted_distance(13.5, 1.0)).abs() < 1e-4);
    }

    fn wide_cone_rig() -> CameraRig {
        CameraRig {
            calibration: DeviceCalibration { view_cone: 60.0, ..Default::default() },
            ..Default::default()
        }
    }

    fn first_view_offset(settings: QuiltSettings, rig: &CameraRig) -> glam::Vec4 {
        let mut backend = RecordingBackend::new();
        backend.scene = vec![RendererEntry {
            mesh: Some(MeshId(1)),
            material: Some(MaterialInfo { id: MaterialId(1), enable_instancing: true }),
            world: Mat4::IDENTITY,
            queue: 2000,
        }];
        let mut pipeline = QuiltPipeline::new(settings).unwrap();
        let mut camera = Camera::default();
        pipeline
            .render_frame(
                &mut backend,
                FrameRequest { camera: &mut camera, rig: Some(rig), output: OutputContext::Primary },
            )
            .unwrap();
        backend.instanced[0].view_offsets[0]
    }

    #[test]
    fn views_span_the_standard_cone_by_default() {
        let rig = wide_cone_rig();
        let offset = first_view_offset(small_settings(RenderingMethod::SinglePassInstancing), &rig);
        let aspect = rig.calibration.aspect();
        assert_eq!(offset, view_projection_offsets(aspect, 13.5, 1.0, 0, 4).to_vec4());
    }

    #[test]
    fn calibration_cone_is_used_when_enabled() {
        let rig = wide_cone_rig();
        let settings = QuiltSettings {
            use_calibration_view_cone: true,
            ..small_settings(RenderingMethod::SinglePassInstancing)
        };
        let offset = first_view_offset(settings, &rig);
        let aspect = rig.calibration.aspect();
        let wide = view_projection_offsets_with_cone(aspect, 13.5, 1.0, 0, 4, 60.0).to_vec4();
        assert_eq!(offset, wide);
        assert!(wide.x < view_projection_offsets(aspect, 13.5, 1.0, 0, 4).to_vec4().x);
    }

    #[test]
    fn reused_quilt_tracks_the_new_tile_grid() {
        let mut backend = RecordingBackend::new();
        let settings = QuiltSettings {
            render_target_width: 10,
            render_target_height: 10,
            tile_count_x: 4,
            tile_count_y: 2,
            ..Default::default()
        };
        let mut pipeline = QuiltPipeline::new(settings).unwrap();
        let mut camera = Camera::default();
        pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();
        let handle = pipeline.quilt().unwrap().handle;

        // 10 / 5 still gives 2 px tiles, so the texture is kept.
        pipeline.settings_mut().tile_count_x = 5;
        let report = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();

        assert!(!report.reallocated);
        assert_eq!(report.views, 10);
        let quilt = pipeline.quilt().unwrap();
        assert_eq!(quilt.handle, handle);
        assert_eq!(quilt.layout.tile_count_x, 5);
    }

    #[test]
    fn failed_allocation_fails_the_frame_without_compositing() {
        let mut backend = RecordingBackend::new();
        backend.fail_texture_creation = true;
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();

        let err = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap_err();
        assert!(matches!(err, Error::Backend(_)));
        assert!(pipeline.quilt().is_none());
        assert_eq!(backend.count(|c| matches!(c, Call::DrawFullscreen(..))), 0);

        backend.fail_texture_creation = false;
        let report = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();
        assert!(report.reallocated);
    }

    #[test]
    fn too_many_views_for_instancing_is_an_error() {
        let mut backend = RecordingBackend::new();
        backend.max_views = 3;
        let mut pipeline =
            QuiltPipeline::new(small_settings(RenderingMethod::SinglePassInstancing)).unwrap();
        let mut camera = Camera::default();
        let err = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap_err();
        assert!(matches!(err, Error::TooManyViews { views: 4, limit: 3 }));
    }

    #[test]
    fn auxiliary_output_skips_tiling() {
        let mut backend = RecordingBackend::new();
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();
        let before = camera;

        let report = pipeline
            .render_frame(
                &mut backend,
                FrameRequest {
                    camera: &mut camera,
                    rig: None,
                    output: OutputContext::Auxiliary(ForwardSettings::default()),
                },
            )
            .unwrap();

        assert_eq!(report.rendering_method, None);
        assert_eq!(camera, before);
        assert!(backend.created_textures().is_empty());
        assert_eq!(backend.count(|c| matches!(c, Call::DrawFullscreen(..))), 0);
        assert_eq!(backend.count(|c| *c == Call::DrawSkybox), 1);
    }

    #[test]
    fn release_frees_quilt_and_material() {
        let mut backend = RecordingBackend::new();
        let mut pipeline = QuiltPipeline::new(small_settings(RenderingMethod::MultiPass)).unwrap();
        let mut camera = Camera::default();
        pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();

        pipeline.release(&mut backend);
        assert!(backend.live_textures.is_empty());
        assert_eq!(backend.count(|c| matches!(c, Call::ReleaseMaterial(_))), 1);
        assert!(pipeline.quilt().is_none());

        let report = pipeline.render_frame(&mut backend, primary(&mut camera)).unwrap();
        assert!(report.reallocated);
    }

    #[test]
    fn invalid_settings_are_rejected_up_front() {
        let settings = QuiltSettings { tile_count_y: 0, ..Default::default() };
        assert!(matches!(QuiltPipeline::new(settings), Err(Error::InvalidSettings(_))));
    }
}
