//! Loading of the panel calibration file.
//!
//! The vendor writes one JSON document per device, usually at
//! `LKG_calibration/visual.json` on the display's own storage. Every value is
//! wrapped as `{ "value": <number> }`; bare numbers are accepted as well.
//! Keys that are absent keep their default.

use crate::config::DeviceCalibration;
use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Relative location of the calibration file on a device volume.
pub const CALIBRATION_DIR: &str = "LKG_calibration";
pub const CALIBRATION_FILE: &str = "visual.json";

/// How deep [`find_calibration_file`] descends below its root.
const SEARCH_DEPTH: usize = 3;

#[derive(Deserialize)]
#[serde(untagged)]
enum Value {
    Wrapped { value: f32 },
    Plain(f32),
}

impl Value {
    fn get(&self) -> f32 {
        match *self {
            Value::Wrapped { value } | Value::Plain(value) => value,
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct VisualFile {
    pitch: Option<Value>,
    slope: Option<Value>,
    center: Option<Value>,
    view_cone: Option<Value>,
    inv_view: Option<Value>,
    vertical_angle: Option<Value>,
    #[serde(rename = "DPI")]
    dpi: Option<Value>,
    screen_w: Option<Value>,
    screen_h: Option<Value>,
    flip_image_x: Option<Value>,
    flip_image_y: Option<Value>,
    flip_subp: Option<Value>,
}

impl VisualFile {
    fn into_calibration(self) -> DeviceCalibration {
        let base = DeviceCalibration::default();
        let pick = |v: Option<Value>, fallback: f32| v.map_or(fallback, |v| v.get());
        DeviceCalibration {
            pitch: pick(self.pitch, base.pitch),
            slope: pick(self.slope, base.slope),
            center: pick(self.center, base.center),
            view_cone: pick(self.view_cone, base.view_cone),
            inv_view: pick(self.inv_view, base.inv_view),
            vertical_angle: pick(self.vertical_angle, base.vertical_angle),
            dpi: pick(self.dpi, base.dpi),
            screen_w: pick(self.screen_w, base.screen_w),
            screen_h: pick(self.screen_h, base.screen_h),
            flip_image_x: pick(self.flip_image_x, base.flip_image_x),
            flip_image_y: pick(self.flip_image_y, base.flip_image_y),
            flip_subpixel: pick(self.flip_subp, base.flip_subpixel),
        }
    }
}

/// Parses a calibration document. Values are not validated here.
pub fn parse_calibration(text: &str) -> std::result::Result<DeviceCalibration, serde_json::Error> {
    let file: VisualFile = serde_json::from_str(text)?;
    Ok(file.into_calibration())
}

/// Reads and validates the calibration at `path`.
pub fn load_calibration(path: &Path) -> Result<DeviceCalibration> {
    let text = std::fs::read_to_string(path).map_err(|source| Error::CalibrationIo {
        path: path.to_path_buf(),
        source,
    })?;
    let calibration = parse_calibration(&text).map_err(|source| Error::CalibrationParse {
        path: path.to_path_buf(),
        source,
    })?;
    calibration.validate()?;
    Ok(calibration)
}

/// Looks for `LKG_calibration/visual.json` at most a few levels below `root`.
pub fn find_calibration_file(root: &Path) -> Option<PathBuf> {
    WalkDir::new(root)
        .max_depth(SEARCH_DEPTH)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file() && entry.file_name() == CALIBRATION_FILE)
        .find(|entry| {
            entry
                .path()
                .parent()
                .and_then(Path::file_name)
                .is_some_and(|dir| dir == CALIBRATION_DIR)
        })
        .map(|entry| entry.into_path())
}

/// Loads the calibration at `path`, or the compiled-in defaults.
///
/// A missing file is the normal case for a machine without a display
/// attached. An unreadable or invalid file is logged and also falls back.
pub fn load_or_default(path: Option<&Path>) -> DeviceCalibration {
    let Some(path) = path else {
        log::info!("No calibration file; using default device calibration.");
        return DeviceCalibration::default();
    };
    if !path.exists() {
        log::info!(
            "Calibration file {} not found; using default device calibration.",
            path.display()
        );
        return DeviceCalibration::default();
    }
    match load_calibration(path) {
        Ok(calibration) => {
            log::info!(
                "Loaded calibration from {}: {}x{} px, pitch {:.4}, slope {:.4}",
                path.display(),
                calibration.screen_w,
                calibration.screen_h,
                calibration.pitch,
                calibration.slope
            );
            calibration
        }
        Err(err) => {
            log::warn!("{err}; using default device calibration.");
            DeviceCalibration::default()
        }
    }
}
