// This is free and unencumbered software released into the public domain.

use std::{path::PathBuf, time::Duration};

pub const DEFAULT_MAX_EDGE_PIXELS: u32 = 1920;
pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Clone, Debug)]
pub struct SessionConfig {
    /// Longest edge above which captured stills are subsampled.
    pub max_edge_pixels: u32,
    pub jpeg_quality: u8,
    /// Where raw captures are staged before post-processing.
    pub temp_dir: PathBuf,
    /// Upper bound on waiting for a still; `None` waits indefinitely.
    pub capture_timeout: Option<Duration>,
    pub poll_interval: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_edge_pixels: DEFAULT_MAX_EDGE_PIXELS,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            temp_dir: std::env::temp_dir(),
            capture_timeout: Some(Duration::from_secs(30)),
            poll_interval: Duration::from_millis(200),
        }
    }
}

impl SessionConfig {
    pub fn with_max_edge_pixels(mut self, max_edge: u32) -> Self {
        self.max_edge_pixels = max_edge.max(1);
        self
    }

    pub fn with_jpeg_quality(mut self, quality: u8) -> Self {
        self.jpeg_quality = quality.clamp(1, 100);
        self
    }

    pub fn with_temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = dir.into();
        self
    }

    pub fn with_capture_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.capture_timeout = timeout;
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval.max(Duration::from_millis(1));
        self
    }
}
