use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use lenticular::calibration::{find_calibration_file, load_or_default};
use lenticular::{DeviceCalibration, QuiltSettings, RenderingMethod};
use std::path::PathBuf;
use std::str::FromStr;

/// `quilt-viewer` - renders a demo scene to a lenticular light-field display.
///
/// The scene is rendered from many horizontally offset viewpoints into a
/// quilt texture, which is then interleaved onto the panel's subpixels using
/// the display's calibration.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Config {
    /// JSON file with quilt settings.
    ///
    /// Fields left out keep their defaults (4096x4096, 4x9 tiles,
    /// multi-pass).
    #[arg(long, env = "QUILT_SETTINGS")]
    pub settings: Option<PathBuf>,

    /// The display's calibration file (`visual.json`).
    #[arg(long, env = "QUILT_CALIBRATION")]
    pub calibration: Option<PathBuf>,

    /// Directory searched for `LKG_calibration/visual.json` when no
    /// calibration file is given, typically the display's mounted volume.
    #[arg(long, env = "QUILT_CALIBRATION_ROOT")]
    pub calibration_root: Option<PathBuf>,

    /// How the quilt tiles are filled. Overrides the settings file.
    #[arg(long, value_enum)]
    pub method: Option<Method>,

    /// Tile grid as `<columns>x<rows>`. Overrides the settings file.
    #[arg(long)]
    pub tiles: Option<Dims>,

    /// Quilt texture size as `<width>x<height>`. Overrides the settings file.
    #[arg(long)]
    pub quilt_size: Option<Dims>,

    /// Spread the views over the calibration's view cone instead of the
    /// standard 40 degrees.
    #[arg(long, env = "QUILT_CALIBRATION_VIEW_CONE")]
    pub calibration_view_cone: bool,

    /// Start in the flat debug view instead of the interleaved output.
    #[arg(long)]
    pub debug_view: bool,

    /// Spin rate of the demo objects in degrees per second.
    #[arg(long, default_value_t = 360.0)]
    pub rotation_speed: f32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Method {
    MultiPass,
    Instanced,
}

impl From<Method> for RenderingMethod {
    fn from(method: Method) -> Self {
        match method {
            Method::MultiPass => RenderingMethod::MultiPass,
            Method::Instanced => RenderingMethod::SinglePassInstancing,
        }
    }
}

/// A `<x>x<y>` pair of positive integers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Dims {
    pub x: u32,
    pub y: u32,
}

impl FromStr for Dims {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (x, y) = s
            .split_once(|c: char| c == 'x' || c == 'X')
            .ok_or_else(|| format!("expected <x>x<y>, got '{s}'"))?;
        let parse = |part: &str| {
            part.trim()
                .parse::<u32>()
                .map_err(|e| format!("invalid number '{part}' in '{s}': {e}"))
        };
        Ok(Self {
            x: parse(x)?,
            y: parse(y)?,
        })
    }
}

impl Config {
    /// Settings file (or defaults) with the command-line overrides applied.
    pub fn resolve_settings(&self) -> Result<QuiltSettings> {
        let mut settings = match &self.settings {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading settings file {}", path.display()))?;
                QuiltSettings::from_json(&text)
                    .with_context(|| format!("loading settings file {}", path.display()))?
            }
            None => QuiltSettings::default(),
        };

        if let Some(method) = self.method {
            settings.rendering_method = method.into();
        }
        if let Some(tiles) = self.tiles {
            settings.tile_count_x = tiles.x;
            settings.tile_count_y = tiles.y;
        }
        if let Some(size) = self.quilt_size {
            settings.render_target_width = size.x;
            settings.render_target_height = size.y;
        }
        if self.calibration_view_cone {
            settings.use_calibration_view_cone = true;
        }
        settings.validate()?;
        Ok(settings)
    }

    /// The calibration to drive the panel with. Never fails: anything
    /// missing or broken falls back to the defaults.
    pub fn resolve_calibration(&self) -> DeviceCalibration {
        if let Some(path) = &self.calibration {
            return load_or_default(Some(path.as_path()));
        }
        let found = self.calibration_root.as_deref().and_then(|root| {
            let found = find_calibration_file(root);
            if found.is_none() {
                log::info!("No calibration file found under {}", root.display());
            }
            found
        });
        load_or_default(found.as_deref())
    }
}
