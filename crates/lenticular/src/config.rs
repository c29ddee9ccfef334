//! Configuration records consumed by the pipeline.
//!
//! These are plain data. They are filled in by the calibration loader, a
//! settings file, or the command line, and validated once at that boundary so
//! the math further down can divide by them without checking.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Calibration of one lenticular panel.
///
/// Flags are stored as floats (non-zero means set) because that is how the
/// vendor calibration file and the interleave shader carry them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DeviceCalibration {
    pub pitch: f32,
    pub slope: f32,
    pub center: f32,
    pub view_cone: f32,
    pub inv_view: f32,
    pub vertical_angle: f32,
    pub dpi: f32,
    pub screen_w: f32,
    pub screen_h: f32,
    pub flip_image_x: f32,
    pub flip_image_y: f32,
    pub flip_subpixel: f32,
}

impl Default for DeviceCalibration {
    fn default() -> Self {
        Self {
            pitch: 47.60786,
            slope: -5.446739,
            center: 0.1345109,
            view_cone: 40.0,
            inv_view: 1.0,
            vertical_angle: 0.0,
            dpi: 338.0,
            screen_w: 2560.0,
            screen_h: 1600.0,
            flip_image_x: 0.0,
            flip_image_y: 0.0,
            flip_subpixel: 0.0,
        }
    }
}

impl DeviceCalibration {
    /// Interprets a bool-as-float calibration flag.
    #[inline]
    pub fn as_bool(value: f32) -> bool {
        value != 0.0
    }

    pub fn flip_x(&self) -> bool {
        Self::as_bool(self.flip_image_x)
    }

    pub fn flip_y(&self) -> bool {
        Self::as_bool(self.flip_image_y)
    }

    pub fn flip_subpixel(&self) -> bool {
        Self::as_bool(self.flip_subpixel)
    }

    /// Physical panel width in inches.
    pub fn screen_inches(&self) -> f32 {
        self.screen_w / self.dpi
    }

    /// Width over height of the panel in pixels.
    pub fn aspect(&self) -> f32 {
        self.screen_w / self.screen_h
    }

    pub fn validate(&self) -> Result<()> {
        let positive = [
            ("dpi", self.dpi),
            ("screen_w", self.screen_w),
            ("screen_h", self.screen_h),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidCalibration(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        // cos(atan(1/slope)) and the tilt term both divide by the slope.
        if !self.slope.is_finite() || self.slope == 0.0 {
            return Err(Error::InvalidCalibration(format!(
                "slope must be finite and non-zero, got {}",
                self.slope
            )));
        }
        if !self.pitch.is_finite() || !self.center.is_finite() {
            return Err(Error::InvalidCalibration(
                "pitch and center must be finite".into(),
            ));
        }
        Ok(())
    }
}

/// How far back a camera sits and where its clip planes go.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraFramingConfig {
    /// Vertical field of view in degrees.
    pub fov: f32,
    /// Half-height of the framed volume at the focal plane, in world units.
    pub size: f32,
    pub near_clip_factor: f32,
    pub far_clip_factor: f32,
}

impl Default for CameraFramingConfig {
    fn default() -> Self {
        Self {
            fov: 13.5,
            size: 1.0,
            near_clip_factor: 1.0,
            far_clip_factor: 1.0,
        }
    }
}

impl CameraFramingConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.fov > 0.0 && self.fov < 180.0) {
            return Err(Error::InvalidSettings(format!(
                "field of view must lie strictly between 0 and 180 degrees, got {}",
                self.fov
            )));
        }
        if !(self.size.is_finite() && self.size > 0.0) {
            return Err(Error::InvalidSettings(format!(
                "framing size must be positive, got {}",
                self.size
            )));
        }
        if !self.near_clip_factor.is_finite() || !self.far_clip_factor.is_finite() {
            return Err(Error::InvalidSettings("clip factors must be finite".into()));
        }
        Ok(())
    }
}

/// How the tiles of the quilt get filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RenderingMethod {
    /// One full scene pass per tile, copied into place.
    #[default]
    MultiPass,
    /// One instanced draw per mesh covering every tile.
    SinglePassInstancing,
}

impl std::fmt::Display for RenderingMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MultiPass => f.write_str("multi-pass"),
            Self::SinglePassInstancing => f.write_str("single-pass instancing"),
        }
    }
}

/// Upper bound on `tile_count_x * tile_count_y`.
pub const MAX_QUILT_VIEWS: u32 = 1024;

/// The flat pipeline configuration record.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuiltSettings {
    pub render_target_width: u32,
    pub render_target_height: u32,
    pub tile_count_x: u32,
    pub tile_count_y: u32,
    pub rendering_method: RenderingMethod,
    /// Framing used by cameras that carry no rig of their own.
    pub framing: CameraFramingConfig,
    /// Spread the views over the calibration's `view_cone` instead of the
    /// standard 40 degrees.
    pub use_calibration_view_cone: bool,
}

impl Default for QuiltSettings {
    fn default() -> Self {
        Self {
            render_target_width: 4096,
            render_target_height: 4096,
            tile_count_x: 4,
            tile_count_y: 9,
            rendering_method: RenderingMethod::MultiPass,
            framing: CameraFramingConfig {
                fov: 13.5,
                size: 2.0,
                near_clip_factor: 1.0,
                far_clip_factor: 1.5,
            },
            use_calibration_view_cone: false,
        }
    }
}

impl QuiltSettings {
    pub fn from_json(text: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(text)
            .map_err(|e| Error::InvalidSettings(format!("malformed settings: {e}")))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Saturates instead of overflowing; `validate` rejects such grids.
    pub fn view_count(&self) -> u32 {
        self.tile_count_x.saturating_mul(self.tile_count_y)
    }

    pub fn validate(&self) -> Result<()> {
        if self.tile_count_x == 0 || self.tile_count_y == 0 {
            return Err(Error::InvalidSettings(format!(
                "tile counts must be at least 1, got {}x{}",
                self.tile_count_x, self.tile_count_y
            )));
        }
        match self.tile_count_x.checked_mul(self.tile_count_y) {
            Some(views) if views <= MAX_QUILT_VIEWS => {}
            _ => {
                return Err(Error::InvalidSettings(format!(
                    "{}x{} tiles exceed the limit of {MAX_QUILT_VIEWS} views",
                    self.tile_count_x, self.tile_count_y
                )))
            }
        }
        if self.render_target_width < self.tile_count_x
            || self.render_target_height < self.tile_count_y
        {
            return Err(Error::InvalidSettings(format!(
                "render target {}x{} is too small for {}x{} tiles",
                self.render_target_width,
                self.render_target_height,
                self.tile_count_x,
                self.tile_count_y
            )));
        }
        self.framing.validate()
    }
}

/// Per-camera attachment: the panel this camera drives and how it frames
/// the scene.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct CameraRig {
    pub calibration: DeviceCalibration,
    pub framing: CameraFramingConfig,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        DeviceCalibration::default().validate().unwrap();
        CameraFramingConfig::default().validate().unwrap();
        QuiltSettings::default().validate().unwrap();
        assert_eq!(QuiltSettings::default().view_count(), 36);
    }

    #[test]
    fn degenerate_fov_is_rejected() {
        for fov in [0.0, 180.0, 360.0, -5.0, f32::NAN] {
            let framing = CameraFramingConfig { fov, ..Default::default() };
            assert!(framing.validate().is_err(), "fov {fov} accepted");
        }
    }

    #[test]
    fn zero_dpi_is_rejected() {
        let calibration = DeviceCalibration { dpi: 0.0, ..Default::default() };
        assert!(matches!(
            calibration.validate(),
            Err(Error::InvalidCalibration(_))
        ));
    }

    #[test]
    fn settings_json_fills_missing_fields() {
        let settings = QuiltSettings::from_json(
            r#"{ "tile_count_x": 5, "rendering_method": "single-pass-instancing" }"#,
        )
        .unwrap();
        assert_eq!(settings.tile_count_x, 5);
        assert_eq!(settings.tile_count_y, 9);
        assert_eq!(settings.rendering_method, RenderingMethod::SinglePassInstancing);
        assert_eq!(settings.framing.far_clip_factor, 1.5);
    }

    #[test]
    fn settings_smaller_than_grid_are_rejected() {
        let settings = QuiltSettings {
            render_target_width: 3,
            tile_count_x: 4,
            ..Default::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn oversized_grids_are_rejected() {
        let overflowing = QuiltSettings {
            render_target_width: 70_000,
            render_target_height: 70_000,
            tile_count_x: 70_000,
            tile_count_y: 70_000,
            ..Default::default()
        };
        assert!(matches!(overflowing.validate(), Err(Error::InvalidSettings(_))));
        assert_eq!(overflowing.view_count(), u32::MAX);

        let just_over = QuiltSettings { tile_count_x: 1025, tile_count_y: 1, ..Default::default() };
        assert!(just_over.validate().is_err());
        let at_limit = QuiltSettings { tile_count_x: 32, tile_count_y: 32, ..Default::default() };
        at_limit.validate().unwrap();
    }

    #[test]
    fn flags_read_as_bools() {
        let calibration = DeviceCalibration {
            flip_image_x: 1.0,
            flip_subpixel: 0.5,
            ..Default::default()
        };
        assert!(calibration.flip_x());
        assert!(!calibration.flip_y());
        assert!(calibration.flip_subpixel());
    }
}
