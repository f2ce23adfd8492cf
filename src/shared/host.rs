// This is free and unencumbered software released into the public domain.

//! Host-side collaborators: rendering surfaces, permissions, and app lifecycle.

use crate::shared::{CameraResult, FrameSink};
use derive_more::Display;
use std::sync::atomic::{AtomicI64, Ordering};

/// Opaque identifier of a drawable the host UI renders into.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
#[display("{_0}")]
pub struct SurfaceHandle(pub i64);

#[derive(Clone)]
pub struct Surface {
    pub handle: SurfaceHandle,
    pub sink: Option<FrameSink>,
}

impl core::fmt::Debug for Surface {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Surface")
            .field("handle", &self.handle)
            .field("sink", &self.sink.as_ref().map(|_| "<sink>"))
            .finish()
    }
}

impl Surface {
    pub fn new(handle: SurfaceHandle) -> Self {
        Self { handle, sink: None }
    }

    pub fn with_sink(mut self, sink: FrameSink) -> Self {
        self.sink = Some(sink);
        self
    }
}

pub trait SurfaceProvider: Send + Sync {
    fn create_surface(&self) -> CameraResult<Surface>;

    fn release_surface(&self, handle: SurfaceHandle);
}

/// Hands out sequential surface ids, optionally wiring every surface to one sink.
#[derive(Default)]
pub struct CountingSurfaces {
    next: AtomicI64,
    sink: Option<FrameSink>,
}

impl CountingSurfaces {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sink(mut self, sink: FrameSink) -> Self {
        self.sink = Some(sink);
        self
    }
}

impl SurfaceProvider for CountingSurfaces {
    fn create_surface(&self) -> CameraResult<Surface> {
        let handle = SurfaceHandle(self.next.fetch_add(1, Ordering::Relaxed));
        let surface = Surface::new(handle);
        Ok(match &self.sink {
            Some(sink) => surface.with_sink(sink.clone()),
            None => surface,
        })
    }

    fn release_surface(&self, _handle: SurfaceHandle) {}
}

pub trait PermissionCheck: Send + Sync {
    fn has_camera_permission(&self) -> bool;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct AlwaysGranted;

impl PermissionCheck for AlwaysGranted {
    fn has_camera_permission(&self) -> bool {
        true
    }
}

/// Foreground/background signals from the host application.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq)]
pub enum LifecycleEvent {
    #[display("foreground")]
    Foreground,
    #[display("background")]
    Background,
    #[display("destroyed")]
    Destroyed,
}
