// This is free and unencumbered software released into the public domain.

use crate::shared::{DeviceDescriptor, Resolution, SessionId, SurfaceHandle};
use derive_more::Display;

#[derive(Clone, Copy, Debug, Default, Display, PartialEq, Eq)]
pub enum SessionState {
    #[default]
    #[display("closed")]
    Closed,
    #[display("opening")]
    Opening,
    #[display("open")]
    Open,
    #[display("capturing")]
    Capturing,
    #[display("suspended")]
    Suspended,
}

impl SessionState {
    /// Whether the session currently holds a driver handle.
    pub fn is_live(self) -> bool {
        matches!(self, SessionState::Open | SessionState::Capturing)
    }
}

/// What `initialize` hands back: everything or nothing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionInfo {
    pub session: SessionId,
    pub surface: SurfaceHandle,
    pub preview: Resolution,
    pub device: DeviceDescriptor,
}
