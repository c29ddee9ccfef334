use crate::{config::Config, renderer::WgpuBackend, scene::DemoScene};
use anyhow::Result;
use glam::{Quat, Vec3};
use lenticular::{
    forward::ForwardSettings, Camera, CameraRig, DeviceCalibration, Error, FrameReport, FrameRequest,
    OutputContext, QuiltPipeline, QuiltSettings, RenderingMethod,
};
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    event::{ElementState, WindowEvent},
    keyboard::{KeyCode, PhysicalKey},
    window::Window,
};

const TITLE: &str = "Quilt Viewer";
const TITLE_REFRESH: Duration = Duration::from_millis(500);

/// Camera for the flat debug view: a little above the scene, looking at the
/// focal plane.
fn debug_camera(aspect: f32) -> Camera {
    let position = Vec3::new(0.0, 1.5, 7.0);
    Camera {
        position,
        rotation: Quat::from_rotation_x(-(position.y / position.z).atan()),
        fov_deg: 40.0,
        aspect,
        near: 0.1,
        far: 50.0,
    }
}

/// Frames per second over the last title refresh interval.
struct FpsCounter {
    frames: u32,
    since: Instant,
    fps: f32,
}

impl FpsCounter {
    fn new() -> Self {
        Self {
            frames: 0,
            since: Instant::now(),
            fps: 0.0,
        }
    }

    /// Counts a frame; true when a new reading is available.
    fn tick(&mut self, now: Instant) -> bool {
        self.frames += 1;
        let elapsed = now.duration_since(self.since);
        if elapsed < TITLE_REFRESH {
            return false;
        }
        self.fps = self.frames as f32 / elapsed.as_secs_f32();
        self.frames = 0;
        self.since = now;
        true
    }
}

pub struct App {
    pub backend: WgpuBackend,
    pub pipeline: QuiltPipeline,
    pub scene: DemoScene,
    /// The camera driving the panel; reframed by the pipeline every frame.
    pub camera: Camera,
    pub rig: CameraRig,
    /// Show the plain forward render instead of the interleaved output.
    pub debug_view: bool,
    debug_camera: Camera,
    last_frame: Instant,
    fps: FpsCounter,
}

impl App {
    pub async fn new(
        window: Arc<Window>,
        config: &Config,
        settings: QuiltSettings,
        calibration: DeviceCalibration,
    ) -> Result<Self> {
        let backend = WgpuBackend::new(window).await?;
        let size = backend.gfx.size;
        let rig = CameraRig {
            calibration,
            framing: settings.framing,
        };
        let pipeline = QuiltPipeline::new(settings)?;

        log::info!(
            "Rendering {} views as {}x{} tiles ({})",
            pipeline.settings().view_count(),
            pipeline.settings().tile_count_x,
            pipeline.settings().tile_count_y,
            pipeline.settings().rendering_method
        );

        Ok(Self {
            backend,
            pipeline,
            scene: DemoScene::new(config.rotation_speed),
            camera: Camera::default(),
            rig,
            debug_view: config.debug_view,
            debug_camera: debug_camera(size.width as f32 / size.height.max(1) as f32),
            last_frame: Instant::now(),
            fps: FpsCounter::new(),
        })
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.backend.resize(new_size);
            self.debug_camera.aspect = new_size.width as f32 / new_size.height as f32;
        }
    }

    /// Returns true when the event was consumed.
    pub fn handle_event(&mut self, _window: &Window, event: &WindowEvent) -> bool {
        match event {
            WindowEvent::Resized(physical_size) => {
                self.resize(*physical_size);
                false
            }
            WindowEvent::KeyboardInput { event, .. } if event.state == ElementState::Pressed && !event.repeat => {
                match event.physical_key {
                    PhysicalKey::Code(KeyCode::Digit1) => {
                        self.pipeline.set_rendering_method(RenderingMethod::MultiPass);
                        true
                    }
                    PhysicalKey::Code(KeyCode::Digit2) => {
                        self.pipeline.set_rendering_method(RenderingMethod::SinglePassInstancing);
                        true
                    }
                    PhysicalKey::Code(KeyCode::Tab) => {
                        self.debug_view = !self.debug_view;
                        log::info!("Debug view {}", if self.debug_view { "on" } else { "off" });
                        true
                    }
                    _ => false,
                }
            }
            _ => false,
        }
    }

    pub fn render(&mut self, window: &Window) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;
        self.scene.update(dt);
        self.backend.set_scene(self.scene.objects());

        let frame = self.backend.gfx.surface.get_current_texture()?;
        let swap_view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        self.backend.begin_frame(swap_view);
        let request = if self.debug_view {
            FrameRequest {
                camera: &mut self.debug_camera,
                rig: None,
                output: OutputContext::Auxiliary(ForwardSettings::default()),
            }
        } else {
            FrameRequest {
                camera: &mut self.camera,
                rig: Some(&self.rig),
                output: OutputContext::Primary,
            }
        };
        let result = self.pipeline.render_frame(&mut self.backend, request);
        self.backend.end_frame();

        match result {
            Ok(report) => {
                if self.fps.tick(now) {
                    window.set_title(&self.title(&report));
                }
            }
            Err(Error::TooManyViews { views, limit }) => {
                log::warn!("{views} views exceed the instancing limit of {limit}; switching to multi-pass");
                self.pipeline.set_rendering_method(RenderingMethod::MultiPass);
            }
            Err(e) => log::error!("Frame failed: {e}"),
        }

        frame.present();
        Ok(())
    }

    fn title(&self, report: &FrameReport) -> String {
        match report.rendering_method {
            Some(method) => format!(
                "{TITLE} | {method} | {} views | {:.0} fps",
                report.views, self.fps.fps
            ),
            None => format!("{TITLE} | debug view | {:.0} fps", self.fps.fps),
        }
    }

    /// Frees the quilt and the compositing material before the device goes.
    pub fn shutdown(&mut self) {
        self.pipeline.release(&mut self.backend);
        log::debug!(
            "Shut down with {} live and {} pooled textures",
            self.backend.live_textures(),
            self.backend.pooled_textures()
        );
    }
}
