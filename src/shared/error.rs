// This is free and unencumbered software released into the public domain.

use derive_more::Display;
use std::{error::Error as StdError, io, path::PathBuf};
use thiserror::Error;

pub type CameraResult<T = ()> = core::result::Result<T, CameraError>;

#[derive(Debug, Error)]
pub enum CameraError {
    #[error("no suitable camera backend available")]
    NoDriver,

    #[error("camera permission not granted")]
    PermissionDenied,

    #[error("camera access failed while {context}")]
    DeviceAccess {
        context: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("image processing failed while {context}")]
    Processing {
        context: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("I/O failure while {context} `{}`", path.display())]
    Io {
        context: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid session state: {0}")]
    InvalidState(String),

    #[error("session closed")]
    Closed,

    #[error("timed out waiting for the camera")]
    Timeout,
}

/// Stable classification of [`CameraError`], reported across the request bridge.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum ErrorKind {
    #[display("cameraPermission")]
    PermissionDenied,
    #[display("CameraAccess")]
    DeviceAccess,
    #[display("IllegalArgumentException")]
    InvalidArgument,
    #[display("ProcessingError")]
    Processing,
    #[display("IOFailure")]
    Io,
    #[display("InvalidState")]
    InvalidState,
    #[display("Timeout")]
    Timeout,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::PermissionDenied => "cameraPermission",
            ErrorKind::DeviceAccess => "CameraAccess",
            ErrorKind::InvalidArgument => "IllegalArgumentException",
            ErrorKind::Processing => "ProcessingError",
            ErrorKind::Io => "IOFailure",
            ErrorKind::InvalidState => "InvalidState",
            ErrorKind::Timeout => "Timeout",
        }
    }
}

impl CameraError {
    #[inline]
    pub fn driver(context: &'static str, source: impl StdError + Send + Sync + 'static) -> Self {
        Self::DeviceAccess {
            context,
            source: Box::new(source),
        }
    }

    #[inline]
    pub fn processing(
        context: &'static str,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::Processing {
            context,
            source: Box::new(source),
        }
    }

    #[inline]
    pub fn io(context: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            context,
            path: path.into(),
            source,
        }
    }

    #[inline]
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    #[inline]
    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            CameraError::PermissionDenied => ErrorKind::PermissionDenied,
            CameraError::NoDriver | CameraError::DeviceAccess { .. } => ErrorKind::DeviceAccess,
            CameraError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            CameraError::Processing { .. } => ErrorKind::Processing,
            CameraError::Io { .. } => ErrorKind::Io,
            CameraError::InvalidState(_) | CameraError::Closed => ErrorKind::InvalidState,
            CameraError::Timeout => ErrorKind::Timeout,
        }
    }

    #[inline]
    pub fn code(&self) -> &'static str {
        self.kind().code()
    }

    /// The message reported to callers, including the underlying cause if any.
    pub fn message(&self) -> String {
        match self.source() {
            Some(cause) => format!("{self}: {cause}"),
            None => self.to_string(),
        }
    }
}

/// An error status reported by a camera driver.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{_0}")]
pub struct DriverStatus(pub String);

impl core::error::Error for DriverStatus {}

impl DriverStatus {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}
