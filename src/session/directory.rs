// This is free and unencumbered software released into the public domain.

use super::{CaptureSession, SessionInfo, SessionState};
use crate::shared::{
    CameraError, CameraResult, DeviceDescriptor, DriverManager, LifecycleEvent, PermissionCheck,
    ResolutionPreset, SessionConfig, SessionId, SurfaceProvider,
};
use std::{
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicU64, Ordering},
    },
};
use tracing::{debug, info};

/// Keeps at most one [`CaptureSession`] active at a time.
pub struct SessionDirectory {
    manager: Arc<dyn DriverManager>,
    surfaces: Arc<dyn SurfaceProvider>,
    permissions: Arc<dyn PermissionCheck>,
    config: SessionConfig,
    next_session: AtomicU64,
    active: Mutex<Option<Arc<CaptureSession>>>,
}

impl SessionDirectory {
    pub fn new(
        manager: Arc<dyn DriverManager>,
        surfaces: Arc<dyn SurfaceProvider>,
        permissions: Arc<dyn PermissionCheck>,
        config: SessionConfig,
    ) -> Self {
        Self {
            manager,
            surfaces,
            permissions,
            config,
            next_session: AtomicU64::new(1),
            active: Mutex::new(None),
        }
    }

    pub fn manager(&self) -> &Arc<dyn DriverManager> {
        &self.manager
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn available_cameras(&self) -> CameraResult<Vec<DeviceDescriptor>> {
        self.manager.devices()
    }

    /// Opens `device_id`, closing whichever session was active before.
    pub fn initialize(
        &self,
        device_id: &str,
        preset: ResolutionPreset,
    ) -> CameraResult<SessionInfo> {
        let mut active = self.lock();
        if let Some(previous) = active.take() {
            debug!(session = %previous.id(), "closing previous session");
            previous.close();
        }

        let device = self
            .manager
            .devices()?
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| CameraError::invalid_argument(format!("unknown camera `{device_id}`")))?;

        let id = SessionId(self.next_session.fetch_add(1, Ordering::Relaxed));
        let session = CaptureSession::new(
            id,
            device,
            preset,
            Arc::clone(&self.manager),
            Arc::clone(&self.surfaces),
            self.config.clone(),
        )?;
        let info = session.open(self.permissions.as_ref())?;
        info!(
            session = %id,
            camera = device_id,
            %preset,
            preview = %info.preview,
            driver = %self.manager.name(),
            "camera session opened"
        );

        *active = Some(Arc::new(session));
        Ok(info)
    }

    /// Captures into `destination` on the active session.
    pub fn take_picture(&self, destination: impl AsRef<Path>) -> CameraResult<PathBuf> {
        let session = self
            .active()
            .ok_or_else(|| CameraError::invalid_state("no active camera session"))?;
        session.take_picture(destination)
    }

    /// Closes the active session, if any. Always succeeds.
    pub fn dispose(&self) {
        let previous = self.lock().take();
        if let Some(session) = previous {
            info!(session = %session.id(), "camera session disposed");
            session.close();
        }
    }

    pub fn on_lifecycle(&self, event: LifecycleEvent) -> CameraResult {
        debug!(%event, "lifecycle event");
        let Some(session) = self.active() else {
            return Ok(());
        };
        match event {
            LifecycleEvent::Background => {
                session.on_background();
                Ok(())
            },
            LifecycleEvent::Foreground => {
                let result = session.on_foreground();
                if result.is_err() {
                    self.forget(&session);
                }
                result
            },
            LifecycleEvent::Destroyed => {
                self.dispose();
                Ok(())
            },
        }
    }

    /// Delivers queued driver events to the active session.
    pub fn pump_events(&self) -> usize {
        let Some(session) = self.active() else {
            return 0;
        };
        let handled = session.pump_events();
        if session.state() == SessionState::Closed {
            self.forget(&session);
        }
        handled
    }

    pub fn active(&self) -> Option<Arc<CaptureSession>> {
        self.lock().clone()
    }

    pub fn state(&self) -> SessionState {
        self.active()
            .map(|session| session.state())
            .unwrap_or_default()
    }

    fn forget(&self, session: &Arc<CaptureSession>) {
        let mut active = self.lock();
        if active.as_ref().is_some_and(|a| Arc::ptr_eq(a, session)) {
            *active = None;
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Arc<CaptureSession>>> {
        self.active.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for SessionDirectory {
    fn drop(&mut self) {
        self.dispose();
    }
}
