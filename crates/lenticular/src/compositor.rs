//! Interleaves the quilt onto the panel.
//!
//! Each output subpixel sits under a slanted lens and is seen from exactly
//! one direction. The shader computes that direction from the subpixel's
//! screen position, picks the quilt tile of the matching view and samples it.
//! This module turns the calibration into the shader's parameters and issues
//! the single full-screen draw.

use crate::backend::{MaterialHandle, RenderBackend, RenderTarget, TextureHandle};
use crate::config::DeviceCalibration;
use crate::layout::TileLayout;
use crate::Result;
use glam::Mat4;

/// Uniform block of the interleave shader. Field order and padding match
/// `Lenticular` in `lenticular.wgsl`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct LenticularUniforms {
    /// Lens pitch in lenses per screen width, corrected for the slant.
    pub pitch: f32,
    pub tilt: f32,
    pub center: f32,
    pub inv_view: f32,
    pub flip_x: f32,
    pub flip_y: f32,
    /// Horizontal distance between neighbouring subpixels in UV units.
    pub subp: f32,
    pub _pad0: f32,
    /// Which sampled view feeds the red and blue channels.
    pub ri: i32,
    pub bi: i32,
    pub _pad1: [i32; 2],
    /// Tiles in x and y, then the populated fraction of the quilt in x and y.
    pub tile: [f32; 4],
    /// Panel aspect (twice), then the overscan flag.
    pub aspect: [f32; 4],
}

impl LenticularUniforms {
    pub fn new(calibration: &DeviceCalibration, layout: &TileLayout, overscan: bool) -> Self {
        let flip_x = calibration.flip_x();
        let flip_sign = if flip_x { -1.0 } else { 1.0 };

        let pitch = calibration.pitch
            * calibration.screen_inches()
            * (1.0 / calibration.slope).atan().cos();
        let tilt = calibration.screen_h / (calibration.screen_w * calibration.slope) * flip_sign;
        let center = calibration.center + if flip_x { 0.5 } else { 0.0 };
        let subp = 1.0 / (calibration.screen_w * 3.0) * flip_sign;

        let (ri, bi) = if calibration.flip_subpixel() { (2, 0) } else { (0, 2) };

        let (portion_x, portion_y) = layout.coverage_portion();
        let aspect = calibration.aspect();

        Self {
            pitch,
            tilt,
            center,
            inv_view: calibration.inv_view,
            flip_x: calibration.flip_image_x,
            flip_y: calibration.flip_image_y,
            subp,
            _pad0: 0.0,
            ri,
            bi,
            _pad1: [0; 2],
            tile: [
                layout.tile_count_x as f32,
                layout.tile_count_y as f32,
                portion_x,
                portion_y,
            ],
            aspect: [aspect, aspect, if overscan { 1.0 } else { 0.0 }, 0.0],
        }
    }
}

/// Owns the compositing material and draws the final pass.
#[derive(Debug, Default)]
pub struct LenticularCompositor {
    material: Option<MaterialHandle>,
    pub overscan: bool,
}

impl LenticularCompositor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates the compositing material. Later calls are no-ops.
    pub fn create<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) -> Result<MaterialHandle> {
        if let Some(material) = self.material {
            return Ok(material);
        }
        let material = backend.create_compositing_material()?;
        log::debug!("Created lenticular compositing material {material:?}");
        self.material = Some(material);
        Ok(material)
    }

    pub fn release<B: RenderBackend + ?Sized>(&mut self, backend: &mut B) {
        if let Some(material) = self.material.take() {
            backend.release_material(material);
        }
    }

    pub fn material(&self) -> Option<MaterialHandle> {
        self.material
    }

    /// Writes the interleaved image over the camera target.
    pub fn composite<B: RenderBackend + ?Sized>(
        &mut self,
        backend: &mut B,
        calibration: &DeviceCalibration,
        layout: &TileLayout,
        quilt: TextureHandle,
    ) -> Result<()> {
        let material = self.create(backend)?;
        let uniforms = LenticularUniforms::new(calibration, layout, self.overscan);

        backend.set_render_target(RenderTarget::Camera);
        backend.set_view_projection(Mat4::IDENTITY, Mat4::IDENTITY);
        let viewport = backend.camera_pixel_rect();
        backend.set_viewport(viewport);
        backend.draw_fullscreen(material, quilt, &uniforms);
        backend.submit()?;
        Ok(())
    }
}
