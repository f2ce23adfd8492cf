// This is free and unencumbered software released into the public domain.

#![allow(dead_code)]

use capture_bridge::{
    session::SessionDirectory,
    shared::{
        CameraDevice, CameraError, CameraResult, CaptureId, DeviceDescriptor, DriverEvents,
        DriverManager, DriverStatus, Facing, PermissionCheck, Resolution, SessionConfig,
        StillImage, Surface, SurfaceHandle, SurfaceProvider,
    },
};
use image::{DynamicImage, Rgb, RgbImage, codecs::jpeg::JpegEncoder};
use std::{
    borrow::Cow,
    path::PathBuf,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering},
    },
    time::Duration,
};

static NEXT_FILE: AtomicU64 = AtomicU64::new(0);

/// A fresh path in the system temp dir for a driver-written still.
pub fn driver_file() -> PathBuf {
    std::env::temp_dir().join(format!(
        "fake-still-{}-{}.jpg",
        std::process::id(),
        NEXT_FILE.fetch_add(1, Ordering::Relaxed)
    ))
}

/// What the fake device does when asked for a still.
#[derive(Clone, Debug)]
pub enum StillMode {
    /// Delivers these bytes right away from inside `request_still`.
    Immediate(Vec<u8>),
    /// Writes these bytes to a file and hands the file over.
    File(Vec<u8>),
    /// Parks the request; the test delivers it with [`FakeManager::deliver`].
    Manual,
    /// Reports a capture failure right away.
    Fail,
    /// Refuses the request synchronously.
    Reject,
}

pub struct FakeManager {
    devices: Vec<DeviceDescriptor>,
    mode: Mutex<StillMode>,
    fail_open: AtomicBool,
    pending: Arc<Mutex<Vec<(DriverEvents, CaptureId)>>>,
    last_events: Mutex<Option<DriverEvents>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeManager {
    pub fn new(mode: StillMode) -> Arc<Self> {
        Arc::new(Self {
            devices: vec![
                DeviceDescriptor::new("0", Facing::Back)
                    .with_sensor_orientation(90)
                    .with_resolutions([
                        Resolution::new(640, 480),
                        Resolution::new(1280, 720),
                        Resolution::new(1920, 1080),
                    ]),
                DeviceDescriptor::new("1", Facing::Front)
                    .with_sensor_orientation(270)
                    .with_resolutions([Resolution::new(640, 480), Resolution::new(1280, 720)]),
            ],
            mode: Mutex::new(mode),
            fail_open: AtomicBool::new(false),
            pending: Arc::new(Mutex::new(Vec::new())),
            last_events: Mutex::new(None),
            log: Arc::new(Mutex::new(Vec::new())),
        })
    }

    pub fn set_mode(&self, mode: StillMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    pub fn log(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap().clear();
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().unwrap().len()
    }

    /// Delivers `bytes` for the oldest parked still request.
    pub fn deliver(&self, bytes: Vec<u8>) -> bool {
        let (events, capture) = self.pending.lock().unwrap().remove(0);
        events.still_captured(capture, StillImage::from_bytes(bytes))
    }

    /// Reports an asynchronous driver error on the most recently opened device.
    pub fn raise_error(&self, message: &str) -> bool {
        let events = self.last_events.lock().unwrap().clone();
        events.is_some_and(|events| {
            events.error(CameraError::driver("streaming", DriverStatus::new(message)))
        })
    }

    /// Blocks until at least one still request is parked.
    pub fn wait_for_request(&self) {
        for _ in 0..500 {
            if self.pending() > 0 {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("no still request arrived");
    }
}

impl DriverManager for FakeManager {
    fn name(&self) -> Cow<'_, str> {
        "fake".into()
    }

    fn devices(&self) -> CameraResult<Vec<DeviceDescriptor>> {
        Ok(self.devices.clone())
    }

    fn open(
        &self,
        device: &DeviceDescriptor,
        resolution: Resolution,
        events: DriverEvents,
    ) -> CameraResult<Box<dyn CameraDevice>> {
        self.log
            .lock()
            .unwrap()
            .push(format!("open {} {resolution}", device.id));
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(CameraError::driver(
                "opening camera",
                DriverStatus::new("camera in use by another process"),
            ));
        }
        *self.last_events.lock().unwrap() = Some(events.clone());
        Ok(Box::new(FakeDevice {
            mode: self.mode.lock().unwrap().clone(),
            events,
            pending: Arc::clone(&self.pending),
            log: Arc::clone(&self.log),
        }))
    }
}

struct FakeDevice {
    mode: StillMode,
    events: DriverEvents,
    pending: Arc<Mutex<Vec<(DriverEvents, CaptureId)>>>,
    log: Arc<Mutex<Vec<String>>>,
}

impl FakeDevice {
    fn record(&self, entry: impl Into<String>) {
        self.log.lock().unwrap().push(entry.into());
    }
}

impl CameraDevice for FakeDevice {
    fn start_preview(&mut self, surface: &Surface) -> CameraResult {
        self.record(format!("start_preview {}", surface.handle));
        Ok(())
    }

    fn stop_preview(&mut self) -> CameraResult {
        self.record("stop_preview");
        Ok(())
    }

    fn request_still(&mut self, capture: CaptureId) -> CameraResult {
        self.record(format!("request_still {}", capture.0));
        match &self.mode {
            StillMode::Immediate(bytes) => {
                self.events
                    .still_captured(capture, StillImage::from_bytes(bytes.clone()));
            },
            StillMode::File(bytes) => {
                let path = driver_file();
                std::fs::write(&path, bytes).map_err(|e| CameraError::io("writing", &path, e))?;
                self.record(format!("wrote {}", path.display()));
                self.events.still_captured(capture, StillImage::from_file(path));
            },
            StillMode::Manual => self
                .pending
                .lock()
                .unwrap()
                .push((self.events.clone(), capture)),
            StillMode::Fail => {
                self.events.capture_failed(
                    capture,
                    CameraError::driver("capturing", DriverStatus::new("sensor timeout")),
                );
            },
            StillMode::Reject => {
                return Err(CameraError::driver(
                    "requesting still",
                    DriverStatus::new("device disconnected"),
                ));
            },
        }
        Ok(())
    }

    fn close(&mut self) -> CameraResult {
        self.record("close");
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeSurfaces {
    next: AtomicI64,
    released: Mutex<Vec<SurfaceHandle>>,
}

impl FakeSurfaces {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            next: AtomicI64::new(100),
            released: Mutex::new(Vec::new()),
        })
    }

    pub fn released(&self) -> Vec<SurfaceHandle> {
        self.released.lock().unwrap().clone()
    }
}

impl SurfaceProvider for FakeSurfaces {
    fn create_surface(&self) -> CameraResult<Surface> {
        Ok(Surface::new(SurfaceHandle(
            self.next.fetch_add(1, Ordering::SeqCst),
        )))
    }

    fn release_surface(&self, handle: SurfaceHandle) {
        self.released.lock().unwrap().push(handle);
    }
}

pub struct Permission(pub bool);

impl PermissionCheck for Permission {
    fn has_camera_permission(&self) -> bool {
        self.0
    }
}

pub struct Harness {
    pub manager: Arc<FakeManager>,
    pub surfaces: Arc<FakeSurfaces>,
    pub directory: Arc<SessionDirectory>,
    pub temp: tempfile::TempDir,
}

pub fn harness(mode: StillMode) -> Harness {
    harness_with(mode, true, |config| config)
}

pub fn harness_with(
    mode: StillMode,
    permission: bool,
    configure: impl FnOnce(SessionConfig) -> SessionConfig,
) -> Harness {
    let temp = tempfile::tempdir().unwrap();
    let manager = FakeManager::new(mode);
    let surfaces = FakeSurfaces::new();
    let config = configure(
        SessionConfig::default()
            .with_temp_dir(temp.path())
            .with_poll_interval(Duration::from_millis(10))
            .with_capture_timeout(Some(Duration::from_secs(5))),
    );
    let directory = Arc::new(SessionDirectory::new(
        manager.clone(),
        surfaces.clone(),
        Arc::new(Permission(permission)),
        config,
    ));
    Harness {
        manager,
        surfaces,
        directory,
        temp,
    }
}

/// A JPEG whose left half is red and right half is blue.
pub fn jpeg(width: u32, height: u32) -> Vec<u8> {
    let image = RgbImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgb([255, 0, 0])
        } else {
            Rgb([0, 0, 255])
        }
    });
    let mut out = Vec::new();
    DynamicImage::ImageRgb8(image)
        .write_with_encoder(JpegEncoder::new_with_quality(&mut out, 95))
        .unwrap();
    out
}

/// Splices an EXIF APP1 segment carrying `orientation` in after the SOI marker.
pub fn with_orientation(jpeg: &[u8], orientation: u16) -> Vec<u8> {
    assert_eq!(&jpeg[..2], &[0xFF, 0xD8], "not a JPEG");

    let mut tiff = Vec::new();
    tiff.extend_from_slice(b"MM\0\x2A");
    tiff.extend_from_slice(&8u32.to_be_bytes());
    tiff.extend_from_slice(&1u16.to_be_bytes());
    tiff.extend_from_slice(&0x0112u16.to_be_bytes());
    tiff.extend_from_slice(&3u16.to_be_bytes());
    tiff.extend_from_slice(&1u32.to_be_bytes());
    tiff.extend_from_slice(&orientation.to_be_bytes());
    tiff.extend_from_slice(&[0, 0]);
    tiff.extend_from_slice(&0u32.to_be_bytes());

    let mut out = Vec::with_capacity(jpeg.len() + tiff.len() + 10);
    out.extend_from_slice(&jpeg[..2]);
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((2 + 6 + tiff.len()) as u16).to_be_bytes());
    out.extend_from_slice(b"Exif\0\0");
    out.extend_from_slice(&tiff);
    out.extend_from_slice(&jpeg[2..]);
    out
}

/// Whether the pixel at (x, y) is clearly red rather than blue.
pub fn is_red(image: &DynamicImage, x: u32, y: u32) -> bool {
    let px = image.to_rgb8().get_pixel(x, y).0;
    px[0] > 150 && px[2] < 100
}
