// This is free and unencumbered software released into the public domain.

use super::{SessionInfo, SessionState};
use crate::{
    processing::{ImagePostProcessor, Rotation, transfer},
    shared::{
        CameraDevice, CameraError, CameraResult, CaptureId, DeviceDescriptor, DriverEvent,
        DriverEvents, DriverManager, EventEnvelope, PermissionCheck, Resolution,
        ResolutionPreset, SessionConfig, SessionId, StillImage, StillPayload, Surface,
        SurfaceProvider,
    },
};
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{
        Arc, Mutex, MutexGuard,
        mpsc::{Receiver, RecvTimeoutError, Sender, TryRecvError, channel},
    },
    time::Instant,
};
use tempfile::TempPath;
use tracing::{debug, warn};

/// One opened camera device bound to one preview surface.
///
/// Every state transition, whether requested by the caller or caused by a
/// driver event, runs under the same lock. Driver events only ever reach the
/// session through its channel.
pub struct CaptureSession {
    id: SessionId,
    device: DeviceDescriptor,
    preview: Resolution,
    manager: Arc<dyn DriverManager>,
    surfaces: Arc<dyn SurfaceProvider>,
    config: SessionConfig,
    processor: ImagePostProcessor,
    events_tx: Sender<EventEnvelope>,
    events_rx: Mutex<Receiver<EventEnvelope>>,
    inner: Mutex<SessionInner>,
}

#[derive(Default)]
struct SessionInner {
    state: SessionState,
    camera: Option<Box<dyn CameraDevice>>,
    surface: Option<Surface>,
    next_capture: u64,
    in_flight: Option<CaptureId>,
    outcome: Option<(CaptureId, CameraResult<StillImage>)>,
}

impl core::fmt::Debug for CaptureSession {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CaptureSession")
            .field("id", &self.id)
            .field("device", &self.device.id)
            .field("preview", &self.preview)
            .field("state", &self.state())
            .finish()
    }
}

impl CaptureSession {
    /// Creates a closed session for `device`, negotiating the preview size.
    pub fn new(
        id: SessionId,
        device: DeviceDescriptor,
        preset: ResolutionPreset,
        manager: Arc<dyn DriverManager>,
        surfaces: Arc<dyn SurfaceProvider>,
        config: SessionConfig,
    ) -> CameraResult<Self> {
        let preview = device.negotiate(preset)?;
        let (events_tx, events_rx) = channel();
        Ok(Self {
            id,
            device,
            preview,
            manager,
            surfaces,
            processor: ImagePostProcessor::from_config(&config),
            config,
            events_tx,
            events_rx: Mutex::new(events_rx),
            inner: Mutex::new(SessionInner::default()),
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }

    pub fn preview_size(&self) -> Resolution {
        self.preview
    }

    pub fn state(&self) -> SessionState {
        self.lock().state
    }

    /// CLOSED → OPENING → OPEN. On failure everything acquired so far is
    /// released again and the session stays CLOSED.
    pub fn open(&self, permissions: &dyn PermissionCheck) -> CameraResult<SessionInfo> {
        let mut inner = self.lock();
        if inner.state != SessionState::Closed {
            return Err(CameraError::invalid_state(format!(
                "cannot open a session that is {}",
                inner.state
            )));
        }
        if !permissions.has_camera_permission() {
            warn!(session = %self.id, "camera permission not granted");
            return Err(CameraError::PermissionDenied);
        }

        self.transition(&mut inner, SessionState::Opening);
        let surface = match self.surfaces.create_surface() {
            Ok(surface) => surface,
            Err(err) => {
                self.transition(&mut inner, SessionState::Closed);
                return Err(err);
            },
        };
        let handle = surface.handle;
        inner.surface = Some(surface);

        if let Err(err) = self.acquire_device(&mut inner) {
            self.release_all(&mut inner);
            self.transition(&mut inner, SessionState::Closed);
            return Err(err);
        }

        self.transition(&mut inner, SessionState::Open);
        Ok(SessionInfo {
            session: self.id,
            surface: handle,
            preview: self.preview,
            device: self.device.clone(),
        })
    }

    /// Captures one still and writes the processed image to `destination`.
    ///
    /// At most one capture is outstanding per session; a second request while
    /// one is in flight fails with [`CameraError::InvalidState`].
    pub fn take_picture(&self, destination: impl AsRef<Path>) -> CameraResult<PathBuf> {
        let destination = destination.as_ref();
        if destination.as_os_str().is_empty() {
            return Err(CameraError::invalid_argument("empty destination path"));
        }

        let capture = self.begin_capture()?;
        let started = Instant::now();

        let result = self
            .await_still(capture)
            .and_then(|image| self.process_still(capture, image, destination));
        self.finish_capture(capture);

        match &result {
            Ok(path) => debug!(
                session = %self.id,
                %capture,
                path = %path.display(),
                elapsed_ms = started.elapsed().as_millis() as u64,
                "capture complete"
            ),
            Err(err) => warn!(session = %self.id, %capture, %err, "capture failed"),
        }
        result
    }

    /// OPEN → SUSPENDED: the preview stops and the driver handle is released.
    pub fn on_background(&self) {
        let mut inner = self.lock();
        if !inner.state.is_live() {
            return;
        }
        self.release_device(&mut inner);
        inner.in_flight = None;
        inner.outcome = None;
        self.transition(&mut inner, SessionState::Suspended);
    }

    /// SUSPENDED → OPEN by re-acquiring the driver; on failure the session
    /// closes and the error is returned without retrying.
    pub fn on_foreground(&self) -> CameraResult {
        let mut inner = self.lock();
        if inner.state != SessionState::Suspended {
            return Ok(());
        }
        match self.acquire_device(&mut inner) {
            Ok(()) => {
                self.transition(&mut inner, SessionState::Open);
                Ok(())
            },
            Err(err) => {
                warn!(session = %self.id, %err, "failed to resume camera");
                self.release_all(&mut inner);
                self.transition(&mut inner, SessionState::Closed);
                Err(err)
            },
        }
    }

    /// Releases preview, driver handle, and surface. Closing twice is a no-op.
    pub fn close(&self) {
        let mut inner = self.lock();
        if inner.state == SessionState::Closed {
            return;
        }
        self.release_all(&mut inner);
        inner.in_flight = None;
        inner.outcome = None;
        self.transition(&mut inner, SessionState::Closed);
    }

    /// Handles every driver event already queued, without blocking.
    pub fn pump_events(&self) -> usize {
        let mut handled = 0;
        loop {
            let received = {
                let rx = self.events_rx.lock().unwrap_or_else(|p| p.into_inner());
                rx.try_recv()
            };
            match received {
                Ok(envelope) => {
                    let mut inner = self.lock();
                    self.handle_event(&mut inner, envelope);
                    handled += 1;
                },
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => return handled,
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, SessionInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn transition(&self, inner: &mut SessionInner, to: SessionState) {
        if inner.state != to {
            debug!(session = %self.id, from = %inner.state, %to, "session transition");
            inner.state = to;
        }
    }

    fn events(&self) -> DriverEvents {
        DriverEvents::new(self.id, self.events_tx.clone())
    }

    fn acquire_device(&self, inner: &mut SessionInner) -> CameraResult {
        let surface = inner
            .surface
            .clone()
            .ok_or_else(|| CameraError::invalid_state("no preview surface"))?;
        let camera = self.manager.open(&self.device, self.preview, self.events())?;
        let camera = inner.camera.insert(camera);
        camera.start_preview(&surface)
    }

    fn release_device(&self, inner: &mut SessionInner) {
        if let Some(mut camera) = inner.camera.take() {
            if let Err(err) = camera.stop_preview() {
                warn!(session = %self.id, %err, "failed to stop preview");
            }
            if let Err(err) = camera.close() {
                warn!(session = %self.id, %err, "failed to close camera device");
            }
        }
    }

    fn release_all(&self, inner: &mut SessionInner) {
        self.release_device(inner);
        if let Some(surface) = inner.surface.take() {
            self.surfaces.release_surface(surface.handle);
        }
    }

    fn begin_capture(&self) -> CameraResult<CaptureId> {
        let mut inner = self.lock();
        match inner.state {
            SessionState::Open => {},
            SessionState::Capturing => {
                return Err(CameraError::invalid_state("a capture is already in progress"));
            },
            other => {
                return Err(CameraError::invalid_state(format!(
                    "cannot capture while the session is {other}"
                )));
            },
        }

        inner.next_capture += 1;
        let capture = CaptureId(inner.next_capture);
        let camera = inner
            .camera
            .as_mut()
            .ok_or_else(|| CameraError::invalid_state("no camera device"))?;
        camera.request_still(capture)?;

        inner.in_flight = Some(capture);
        inner.outcome = None;
        self.transition(&mut inner, SessionState::Capturing);
        Ok(capture)
    }

    fn await_still(&self, capture: CaptureId) -> CameraResult<StillImage> {
        let deadline = self.config.capture_timeout.map(|t| Instant::now() + t);
        loop {
            {
                let mut inner = self.lock();
                if matches!(&inner.outcome, Some((id, _)) if *id == capture) {
                    if let Some((_, outcome)) = inner.outcome.take() {
                        return outcome;
                    }
                }
                if inner.in_flight != Some(capture) {
                    return Err(CameraError::Closed);
                }
            }

            let wait = match deadline {
                None => self.config.poll_interval,
                Some(deadline) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        return Err(CameraError::Timeout);
                    }
                    left.min(self.config.poll_interval)
                },
            };

            let received = {
                let rx = self.events_rx.lock().unwrap_or_else(|p| p.into_inner());
                rx.recv_timeout(wait)
            };
            match received {
                Ok(envelope) => {
                    let mut inner = self.lock();
                    self.handle_event(&mut inner, envelope);
                },
                Err(RecvTimeoutError::Timeout) => continue,
                // We hold a sender ourselves, so this cannot happen while alive.
                Err(RecvTimeoutError::Disconnected) => return Err(CameraError::Closed),
            }
        }
    }

    fn finish_capture(&self, capture: CaptureId) {
        let mut inner = self.lock();
        if inner.in_flight == Some(capture) {
            inner.in_flight = None;
            if inner.state == SessionState::Capturing {
                self.transition(&mut inner, SessionState::Open);
            }
        }
    }

    fn handle_event(&self, inner: &mut SessionInner, envelope: EventEnvelope) {
        if envelope.session != self.id {
            debug!(session = %self.id, from = %envelope.session, "ignoring event for another session");
            return;
        }
        let current = inner.in_flight.filter(|_| inner.state == SessionState::Capturing);
        match envelope.event {
            DriverEvent::StillCaptured { capture, image } => {
                if current == Some(capture) {
                    inner.outcome = Some((capture, Ok(image)));
                } else {
                    debug!(session = %self.id, %capture, "ignoring late still");
                    discard_still(image);
                }
            },
            DriverEvent::CaptureFailed { capture, error } => {
                if current == Some(capture) {
                    inner.outcome = Some((capture, Err(error)));
                } else {
                    debug!(session = %self.id, %capture, %error, "ignoring late capture failure");
                }
            },
            DriverEvent::Error { error } => {
                if inner.state == SessionState::Closed {
                    debug!(session = %self.id, %error, "ignoring driver error on closed session");
                    return;
                }
                warn!(session = %self.id, %error, "camera driver error, closing session");
                self.release_all(inner);
                inner.in_flight = None;
                inner.outcome = current.map(|capture| (capture, Err(error)));
                self.transition(inner, SessionState::Closed);
            },
        }
    }

    fn process_still(
        &self,
        capture: CaptureId,
        image: StillImage,
        destination: &Path,
    ) -> CameraResult<PathBuf> {
        let staged = self.stage_still(capture, &image.payload)?;
        let output = self.processor.process_with_hint(
            &staged,
            destination,
            Rotation::from_degrees(image.orientation_hint),
        )?;
        if output != destination {
            return Err(CameraError::processing(
                "post-processing capture",
                io::Error::new(io::ErrorKind::NotFound, "staged capture disappeared"),
            ));
        }
        Ok(output)
    }

    /// Puts the raw still into a temporary file removed when the path drops.
    fn stage_still(&self, capture: CaptureId, payload: &StillPayload) -> CameraResult<TempPath> {
        let mut file = tempfile::Builder::new()
            .prefix(&format!("capture-{}-{}-", self.id.0, capture.0))
            .suffix(".jpg")
            .tempfile_in(&self.config.temp_dir)
            .map_err(|e| CameraError::io("creating staging file in", &self.config.temp_dir, e))?;

        match payload {
            StillPayload::Bytes(bytes) => {
                let path = file.path().to_path_buf();
                file.write_all(bytes)
                    .and_then(|()| file.flush())
                    .map_err(|e| CameraError::io("staging capture to", path, e))?;
                Ok(file.into_temp_path())
            },
            StillPayload::File(source) => {
                let staged = file.into_temp_path();
                transfer(source, &staged, true)?;
                Ok(staged)
            },
        }
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}

fn discard_still(image: StillImage) {
    if let StillPayload::File(path) = image.payload {
        if let Err(err) = std::fs::remove_file(&path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %path.display(), %err, "failed to remove discarded still");
            }
        }
    }
}
