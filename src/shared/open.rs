// This is free and unencumbered software released into the public domain.

use super::{CameraError, DriverManager};
use std::sync::Arc;

/// Returns the driver manager for the current build, if any backend is compiled in.
pub fn default_driver_manager() -> Result<Arc<dyn DriverManager>, CameraError> {
    if cfg!(feature = "ffmpeg") {
        #[cfg(feature = "ffmpeg")]
        return Ok(Arc::new(super::drivers::ffmpeg::FfmpegDriverManager::default()));
    }
    Err(CameraError::NoDriver)
}
