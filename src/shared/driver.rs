// This is free and unencumbered software released into the public domain.

use crate::shared::{CameraError, CameraResult, DeviceDescriptor, Resolution, Surface};
use bytes::Bytes;
use derive_more::Display;
use std::{borrow::Cow, path::PathBuf, sync::mpsc::Sender};

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("session#{_0}")]
pub struct SessionId(pub u64);

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[display("capture#{_0}")]
pub struct CaptureId(pub u64);

/// How a driver hands over an encoded still.
#[derive(Clone, Debug)]
pub enum StillPayload {
    Bytes(Bytes),
    /// A file the driver wrote; ownership passes to the session, which removes it.
    File(PathBuf),
}

#[derive(Clone, Debug)]
pub struct StillImage {
    pub payload: StillPayload,
    /// Clockwise rotation in degrees the driver believes the image needs.
    pub orientation_hint: u32,
}

impl StillImage {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Self {
        Self {
            payload: StillPayload::Bytes(bytes.into()),
            orientation_hint: 0,
        }
    }

    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        Self {
            payload: StillPayload::File(path.into()),
            orientation_hint: 0,
        }
    }

    pub fn with_orientation_hint(mut self, degrees: u32) -> Self {
        self.orientation_hint = degrees % 360;
        self
    }
}

#[derive(Debug)]
pub enum DriverEvent {
    StillCaptured {
        capture: CaptureId,
        image: StillImage,
    },
    CaptureFailed {
        capture: CaptureId,
        error: CameraError,
    },
    Error {
        error: CameraError,
    },
}

#[derive(Debug)]
pub(crate) struct EventEnvelope {
    pub(crate) session: SessionId,
    pub(crate) event: DriverEvent,
}

/// The only path by which a driver reports back to its session.
///
/// Sends after the session has gone away are dropped.
#[derive(Clone, Debug)]
pub struct DriverEvents {
    session: SessionId,
    tx: Sender<EventEnvelope>,
}

impl DriverEvents {
    pub(crate) fn new(session: SessionId, tx: Sender<EventEnvelope>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Returns `false` when nobody is listening any more.
    pub fn send(&self, event: DriverEvent) -> bool {
        self.tx
            .send(EventEnvelope {
                session: self.session,
                event,
            })
            .is_ok()
    }

    pub fn still_captured(&self, capture: CaptureId, image: StillImage) -> bool {
        self.send(DriverEvent::StillCaptured { capture, image })
    }

    pub fn capture_failed(&self, capture: CaptureId, error: CameraError) -> bool {
        self.send(DriverEvent::CaptureFailed { capture, error })
    }

    pub fn error(&self, error: CameraError) -> bool {
        self.send(DriverEvent::Error { error })
    }
}

/// Entry point into a camera stack: enumerates and opens devices.
pub trait DriverManager: Send + Sync {
    fn name(&self) -> Cow<'_, str>;

    fn devices(&self) -> CameraResult<Vec<DeviceDescriptor>>;

    fn open(
        &self,
        device: &DeviceDescriptor,
        resolution: Resolution,
        events: DriverEvents,
    ) -> CameraResult<Box<dyn CameraDevice>>;
}

/// One opened camera device.
pub trait CameraDevice: Send {
    fn start_preview(&mut self, surface: &Surface) -> CameraResult;

    fn stop_preview(&mut self) -> CameraResult {
        Ok(())
    }

    /// Asks for one still frame. The result arrives later through [`DriverEvents`].
    fn request_still(&mut self, capture: CaptureId) -> CameraResult;

    fn close(&mut self) -> CameraResult {
        Ok(())
    }
}
