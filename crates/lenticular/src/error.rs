use crate::backend::BackendError;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid quilt settings: {0}")]
    InvalidSettings(String),

    #[error("invalid device calibration: {0}")]
    InvalidCalibration(String),

    #[error("{views} views exceed the backend's instancing limit of {limit}")]
    TooManyViews { views: u32, limit: u32 },

    #[error("failed to read calibration file {path}")]
    CalibrationIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse calibration file {path}")]
    CalibrationParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error(transparent)]
    Backend(#[from] BackendError),
}
