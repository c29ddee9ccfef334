//! Lenticular: multi-view quilt rendering for light-field displays.
//!
//! A base camera is fanned out into N horizontally offset, off-axis views.
//! The views are rendered into the tiles of one large "quilt" texture, either
//! one tile at a time ([`multipass`]) or all at once with GPU instancing
//! ([`instanced`]). The quilt is then interleaved onto the panel's subpixels
//! by a single full-screen pass driven by the device calibration
//! ([`compositor`]).
//!
//! Everything that touches the GPU goes through the [`backend::RenderBackend`]
//! trait; this crate never owns a device or a context.
//!
//! Coordinate conventions: right-handed, camera looks down -Z, clip depth in
//! [0, 1] (glam's `perspective_rh`). Quilt texture space has its origin in the
//! top-left corner; view 0 is the top-left tile and views advance row-major.

pub mod backend;
pub mod calibration;
pub mod compositor;
pub mod config;
pub mod error;
pub mod forward;
pub mod instanced;
pub mod layout;
pub mod multipass;
pub mod pipeline;
pub mod projection;

#[cfg(test)]
pub(crate) mod testing;

pub use backend::{BackendError, RenderBackend};
pub use config::{CameraFramingConfig, CameraRig, DeviceCalibration, QuiltSettings, RenderingMethod};
pub use error::{Error, Result};
pub use layout::TileLayout;
pub use pipeline::{FrameReport, FrameRequest, OutputContext, QuiltPipeline};
pub use projection::Camera;
