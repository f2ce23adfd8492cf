// This is free and unencumbered software released into the public domain.

use crate::shared::{
    CameraDevice, CameraError, CameraResult, CaptureId, DeviceDescriptor, DriverEvents,
    DriverManager, DriverStatus, Facing, Frame, FrameSink, PixelFormat, Resolution, StillImage,
    Surface,
};
use bytes::Bytes;
use std::{
    borrow::Cow,
    env,
    io::Read,
    path::PathBuf,
    process::{Child, Command, Stdio},
    sync::{
        Arc, Mutex, MutexGuard,
        atomic::{AtomicBool, Ordering},
    },
    thread::JoinHandle,
    time::{Duration, Instant, SystemTime, UNIX_EPOCH},
};
use tracing::{debug, warn};

const COMMON_RESOLUTIONS: [Resolution; 3] = [
    Resolution::new(640, 480),
    Resolution::new(1280, 720),
    Resolution::new(1920, 1080),
];

#[derive(Clone, Debug)]
pub struct FfmpegConfig {
    pub program: PathBuf,
    pub preview_fps: u32,
    /// Sizes advertised for every device, since ffmpeg cannot be asked cheaply.
    pub resolutions: Vec<Resolution>,
    /// Where one-shot captures are written before being handed to the session.
    pub still_dir: PathBuf,
    /// How long a one-shot capture may run before ffmpeg is killed.
    pub still_timeout: Duration,
    pub diagnostics: bool,
}

impl Default for FfmpegConfig {
    fn default() -> Self {
        Self {
            program: PathBuf::from("ffmpeg"),
            preview_fps: 30,
            resolutions: COMMON_RESOLUTIONS.to_vec(),
            still_dir: env::temp_dir(),
            still_timeout: Duration::from_secs(20),
            diagnostics: false,
        }
    }
}

impl FfmpegConfig {
    pub fn with_program(mut self, program: impl Into<PathBuf>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_resolutions(mut self, resolutions: impl IntoIterator<Item = Resolution>) -> Self {
        self.resolutions = resolutions.into_iter().collect();
        self
    }

    pub fn with_still_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.still_dir = dir.into();
        self
    }

    pub fn with_still_timeout(mut self, timeout: Duration) -> Self {
        self.still_timeout = timeout;
        self
    }

    pub fn with_diagnostics(mut self, enabled: bool) -> Self {
        self.diagnostics = enabled;
        self
    }

    fn stderr(&self) -> Stdio {
        if self.diagnostics || env::var_os("CAPTURE_BRIDGE_FFMPEG_STDERR").is_some() {
            Stdio::inherit()
        } else {
            Stdio::null()
        }
    }
}

/// Drives local cameras by spawning `ffmpeg`.
#[derive(Clone, Debug, Default)]
pub struct FfmpegDriverManager {
    config: FfmpegConfig,
}

impl FfmpegDriverManager {
    pub fn new(config: FfmpegConfig) -> Self {
        Self { config }
    }
}

impl DriverManager for FfmpegDriverManager {
    fn name(&self) -> Cow<'_, str> {
        "ffmpeg".into()
    }

    fn devices(&self) -> CameraResult<Vec<DeviceDescriptor>> {
        Ok(list_video_devices(&self.config)?
            .into_iter()
            .map(|id| {
                DeviceDescriptor::new(id, Facing::External)
                    .with_resolutions(self.config.resolutions.iter().copied())
            })
            .collect())
    }

    fn open(
        &self,
        device: &DeviceDescriptor,
        resolution: Resolution,
        events: DriverEvents,
    ) -> CameraResult<Box<dyn CameraDevice>> {
        debug!(device = %device.id, %resolution, "opening ffmpeg camera");
        Ok(Box::new(FfmpegCameraDevice {
            config: self.config.clone(),
            input: get_input_device(&device.id),
            resolution,
            events,
            shared: Arc::new(Mutex::new(DeviceShared::default())),
            still_worker: None,
        }))
    }
}

#[derive(Default)]
struct DeviceShared {
    preview: Option<PreviewStream>,
    surface: Option<Surface>,
}

pub struct FfmpegCameraDevice {
    config: FfmpegConfig,
    input: String,
    resolution: Resolution,
    events: DriverEvents,
    shared: Arc<Mutex<DeviceShared>>,
    still_worker: Option<JoinHandle<()>>,
}

impl core::fmt::Debug for FfmpegCameraDevice {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("FfmpegCameraDevice")
            .field("input", &self.input)
            .field("resolution", &self.resolution)
            .finish()
    }
}

impl FfmpegCameraDevice {
    fn shared(&self) -> MutexGuard<'_, DeviceShared> {
        lock_shared(&self.shared)
    }

    /// Reaps a finished still worker. A worker that is still running is left
    /// in place and reported back as `false`.
    fn reap_worker(&mut self) -> bool {
        match self.still_worker.take() {
            Some(worker) if !worker.is_finished() => {
                self.still_worker = Some(worker);
                false
            },
            Some(worker) => {
                let _ = worker.join();
                true
            },
            None => true,
        }
    }
}

fn lock_shared(shared: &Mutex<DeviceShared>) -> MutexGuard<'_, DeviceShared> {
    shared.lock().unwrap_or_else(|p| p.into_inner())
}

impl CameraDevice for FfmpegCameraDevice {
    fn start_preview(&mut self, surface: &Surface) -> CameraResult {
        let mut shared = self.shared();
        if shared.preview.is_some() {
            return Ok(());
        }
        shared.preview = Some(PreviewStream::spawn(
            &self.config,
            &self.input,
            self.resolution,
            surface.sink.clone(),
            self.events.clone(),
        )?);
        shared.surface = Some(surface.clone());
        Ok(())
    }

    fn stop_preview(&mut self) -> CameraResult {
        let mut shared = self.shared();
        shared.surface = None;
        if let Some(preview) = shared.preview.take() {
            preview.stop();
        }
        Ok(())
    }

    fn request_still(&mut self, capture: CaptureId) -> CameraResult {
        if !self.reap_worker() {
            return Err(CameraError::driver(
                "requesting still",
                DriverStatus::new("previous still capture is still running"),
            ));
        }

        let config = self.config.clone();
        let input = self.input.clone();
        let resolution = self.resolution;
        let events = self.events.clone();
        let shared = Arc::clone(&self.shared);

        let worker = std::thread::Builder::new()
            .name(format!("ffmpeg-{capture}"))
            .spawn(move || {
                // The device lock is only held for bookkeeping, never across ffmpeg.
                let preview = lock_shared(&shared).preview.take();
                if let Some(preview) = preview {
                    preview.stop();
                }

                let result = capture_still(&config, &input, resolution, capture);

                let surface = lock_shared(&shared).surface.clone();
                if let Some(surface) = surface {
                    match PreviewStream::spawn(&config, &input, resolution, surface.sink, events.clone()) {
                        Ok(preview) => {
                            let mut guard = lock_shared(&shared);
                            if guard.surface.is_some() && guard.preview.is_none() {
                                guard.preview = Some(preview);
                            } else {
                                drop(guard);
                                preview.stop();
                            }
                        },
                        Err(err) => warn!(%err, "failed to restart preview after capture"),
                    }
                }

                match result {
                    Ok(path) => {
                        if !events.still_captured(capture, StillImage::from_file(&path)) {
                            let _ = std::fs::remove_file(&path);
                        }
                    },
                    Err(err) => {
                        events.capture_failed(capture, err);
                    },
                }
            })
            .map_err(|e| CameraError::driver("spawning capture worker", e))?;

        self.still_worker = Some(worker);
        Ok(())
    }

    /// Stops the preview without waiting for a running still worker; with
    /// the surface gone it will not restart the preview.
    fn close(&mut self) -> CameraResult {
        if !self.reap_worker() {
            debug!(input = %self.input, "detaching running still worker");
            self.still_worker = None;
        }
        self.stop_preview()
    }
}

impl Drop for FfmpegCameraDevice {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

struct PreviewStream {
    child: Child,
    stop: Arc<AtomicBool>,
    reader: Option<JoinHandle<()>>,
}

impl PreviewStream {
    fn spawn(
        config: &FfmpegConfig,
        input: &str,
        resolution: Resolution,
        sink: Option<FrameSink>,
        events: DriverEvents,
    ) -> CameraResult<Self> {
        let mut child = Command::new(&config.program)
            .args(input_args(input, resolution, Some(config.preview_fps)))
            .args(["-pix_fmt", "rgb24", "-f", "rawvideo", "pipe:1"])
            .stdout(Stdio::piped())
            .stderr(config.stderr())
            .spawn()
            .map_err(|e| CameraError::driver("spawning ffmpeg", e))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| CameraError::driver("starting preview", DriverStatus::new("ffmpeg stdout not piped")))?;

        let stride = resolution.width * PixelFormat::Rgb8.bytes_per_pixel() as u32;
        let frame_size = stride as usize * resolution.height as usize;
        let stop = Arc::new(AtomicBool::new(false));
        let stop2 = Arc::clone(&stop);

        let reader = std::thread::spawn(move || {
            let mut reader = std::io::BufReader::new(stdout);
            while !stop2.load(Ordering::Relaxed) {
                let mut buf = vec![0u8; frame_size];
                match reader.read_exact(&mut buf) {
                    Ok(()) => {
                        if let Some(sink) = &sink {
                            let frame = Frame::new_rgb8(
                                Bytes::from(buf),
                                resolution.width,
                                resolution.height,
                                stride,
                            )
                            .with_timestamp_ns(now_ns_best_effort());
                            (sink)(frame);
                        }
                    },
                    Err(_) if stop2.load(Ordering::Relaxed) => break,
                    Err(e) => {
                        events.error(CameraError::driver("reading preview", e));
                        break;
                    },
                }
            }
        });

        Ok(Self {
            child,
            stop,
            reader: Some(reader),
        })
    }

    fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        terminate(&mut self.child);
        if let Some(reader) = self.reader.take() {
            let _ = reader.join();
        }
    }
}

fn capture_still(
    config: &FfmpegConfig,
    input: &str,
    resolution: Resolution,
    capture: CaptureId,
) -> CameraResult<PathBuf> {
    let path = config.still_dir.join(format!(
        "ffmpeg-still-{}-{}.jpg",
        std::process::id(),
        capture.0
    ));
    let mut child = Command::new(&config.program)
        .args(input_args(input, resolution, None))
        .args(["-frames:v", "1", "-q:v", "2", "-y"])
        .arg(&path)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| CameraError::driver("spawning ffmpeg", e))?;

    let deadline = Instant::now() + config.still_timeout;
    let status = loop {
        match child.try_wait() {
            Ok(Some(status)) => break status,
            Ok(None) if Instant::now() >= deadline => {
                terminate(&mut child);
                let _ = std::fs::remove_file(&path);
                return Err(CameraError::driver(
                    "capturing still",
                    DriverStatus::new(format!(
                        "ffmpeg did not finish within {} ms",
                        config.still_timeout.as_millis()
                    )),
                ));
            },
            Ok(None) => std::thread::sleep(Duration::from_millis(20)),
            Err(e) => {
                terminate(&mut child);
                return Err(CameraError::driver("waiting for ffmpeg", e));
            },
        }
    };

    if !status.success() {
        let mut stderr = String::new();
        if let Some(mut pipe) = child.stderr.take() {
            let _ = pipe.read_to_string(&mut stderr);
        }
        return Err(CameraError::driver(
            "capturing still",
            DriverStatus::new(format!("ffmpeg exited with {status}: {}", stderr.trim())),
        ));
    }
    Ok(path)
}

fn input_args(input: &str, resolution: Resolution, fps: Option<u32>) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-nostats".into(),
        "-loglevel".into(),
        "error".into(),
        "-f".into(),
        ffmpeg_format().into(),
        "-video_size".into(),
        resolution.to_string(),
    ];
    if let Some(fps) = fps {
        args.push("-framerate".into());
        args.push(fps.to_string());
    }
    args.push("-i".into());
    args.push(input.into());
    args
}

fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        unsafe {
            let _ = libc::kill(child.id() as i32, libc::SIGTERM);
        }
        let start = Instant::now();
        while start.elapsed() < Duration::from_millis(900) {
            if let Ok(Some(_)) = child.try_wait() {
                break;
            }
            std::thread::sleep(Duration::from_millis(20));
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

#[inline]
fn now_ns_best_effort() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "macos")] {
        fn ffmpeg_format() -> &'static str {
            "avfoundation"
        }

        fn get_input_device(device: &str) -> String {
            device.strip_prefix("avf:").unwrap_or(device).to_string()
        }

        fn list_video_devices(config: &FfmpegConfig) -> CameraResult<Vec<String>> {
            let stderr = list_devices_output(config, "avfoundation", "")?;
            Ok(parse_avfoundation_devices(&stderr))
        }
    } else if #[cfg(target_os = "windows")] {
        fn ffmpeg_format() -> &'static str {
            "dshow"
        }

        fn get_input_device(device: &str) -> String {
            device.strip_prefix("dshow:").unwrap_or(device).to_string()
        }

        fn list_video_devices(config: &FfmpegConfig) -> CameraResult<Vec<String>> {
            let stderr = list_devices_output(config, "dshow", "dummy")?;
            Ok(parse_dshow_devices(&stderr))
        }
    } else {
        fn ffmpeg_format() -> &'static str {
            "v4l2"
        }

        fn get_input_device(device: &str) -> String {
            let d = device.strip_prefix("file:").unwrap_or(device);
            if !d.is_empty() && d.chars().all(|c| c.is_ascii_digit()) {
                format!("/dev/video{d}")
            } else {
                d.to_string()
            }
        }

        fn list_video_devices(_config: &FfmpegConfig) -> CameraResult<Vec<String>> {
            Ok(video4linux_devices())
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn list_devices_output(config: &FfmpegConfig, format: &str, input: &str) -> CameraResult<String> {
    let out = Command::new(&config.program)
        .args(["-hide_banner", "-f", format, "-list_devices", "true", "-i", input])
        .output()
        .map_err(|e| CameraError::driver("running ffmpeg -list_devices", e))?;
    Ok(String::from_utf8_lossy(&out.stderr).into_owned())
}

#[cfg_attr(not(target_os = "macos"), allow(dead_code))]
fn parse_avfoundation_devices(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_video = false;
    for line in s.lines() {
        if line.contains("AVFoundation video devices:") {
            in_video = true;
            continue;
        }
        if line.contains("AVFoundation audio devices:") {
            break;
        }
        if !in_video {
            continue;
        }
        // e.g. `[AVFoundation indev @ 0x...] [0] FaceTime HD Camera`
        let Some(pos) = line.find("] [") else { continue };
        let tail = &line[pos + 2..];
        let Some(end) = tail.find(']') else { continue };
        if let Ok(index) = tail[1..end].trim().parse::<u32>() {
            out.push(format!("avf:{index}"));
        }
    }
    out
}

#[cfg_attr(not(target_os = "windows"), allow(dead_code))]
fn parse_dshow_devices(s: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut in_video = false;
    for line in s.lines() {
        if line.contains("DirectShow video devices") {
            in_video = true;
            continue;
        }
        if in_video && line.contains("DirectShow audio devices") {
            break;
        }
        if !in_video {
            continue;
        }
        let Some(start) = line.find('"') else { continue };
        let rest = &line[start + 1..];
        let Some(end) = rest.find('"') else { continue };
        if end > 0 && !line.contains("Alternative name") {
            out.push(format!("dshow:video={}", &rest[..end]));
        }
    }
    out
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn video4linux_devices() -> Vec<String> {
    use std::{fs, path::Path};

    let Ok(entries) = fs::read_dir("/sys/class/video4linux") else {
        return Vec::new();
    };
    let mut indices: Vec<u32> = entries
        .flatten()
        .filter_map(|e| {
            let name = e.file_name();
            name.to_str()?.strip_prefix("video")?.parse().ok()
        })
        .collect();
    indices.sort_unstable();

    indices
        .into_iter()
        .map(|idx| format!("/dev/video{idx}"))
        .filter(|node| Path::new(node).exists())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_avfoundation_listing() {
        let listing = "\
[AVFoundation indev @ 0x7f] AVFoundation video devices:
[AVFoundation indev @ 0x7f] [0] FaceTime HD Camera
[AVFoundation indev @ 0x7f] [1] Capture screen 0
[AVFoundation indev @ 0x7f] AVFoundation audio devices:
[AVFoundation indev @ 0x7f] [0] MacBook Pro Microphone";
        assert_eq!(parse_avfoundation_devices(listing), vec!["avf:0", "avf:1"]);
    }

    #[test]
    fn parses_dshow_listing() {
        let listing = "\
[dshow @ 000001] DirectShow video devices (some may be both video and audio devices)
[dshow @ 000001]  \"USB Camera\"
[dshow @ 000001]     Alternative name \"@device_pnp_\\\\?\\usb\"
[dshow @ 000001] DirectShow audio devices
[dshow @ 000001]  \"Microphone\"";
        assert_eq!(parse_dshow_devices(listing), vec!["dshow:video=USB Camera"]);
    }

    #[test]
    fn builds_input_arguments() {
        let args = input_args("/dev/video0", Resolution::new(640, 480), Some(30));
        let joined = args.join(" ");
        assert!(joined.contains("-video_size 640x480"));
        assert!(joined.contains("-framerate 30"));
        assert!(joined.ends_with("-i /dev/video0"));
    }

    #[cfg(unix)]
    #[test]
    fn stalled_still_capture_is_bounded_and_does_not_block_the_device() {
        use crate::shared::{DriverEvent, SessionId};
        use std::{fs, os::unix::fs::PermissionsExt, sync::mpsc::channel};

        let dir = tempfile::tempdir().unwrap();
        let program = dir.path().join("stalled-ffmpeg");
        fs::write(&program, "#!/bin/sh\nexec sleep 30\n").unwrap();
        fs::set_permissions(&program, fs::Permissions::from_mode(0o755)).unwrap();

        let manager = FfmpegDriverManager::new(
            FfmpegConfig::default()
                .with_program(&program)
                .with_still_dir(dir.path())
                .with_still_timeout(Duration::from_millis(1500)),
        );
        let device = DeviceDescriptor::new("0", Facing::External).with_resolutions(COMMON_RESOLUTIONS);
        let (tx, rx) = channel();
        let mut camera = manager
            .open(&device, Resolution::new(640, 480), DriverEvents::new(SessionId(1), tx))
            .unwrap();

        camera.request_still(CaptureId(1)).unwrap();
        std::thread::sleep(Duration::from_millis(100));

        // A second request while ffmpeg is still running is refused, not queued.
        assert!(camera.request_still(CaptureId(2)).is_err());

        let started = Instant::now();
        camera.stop_preview().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));

        let envelope = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        match envelope.event {
            DriverEvent::CaptureFailed { capture, error } => {
                assert_eq!(capture, CaptureId(1));
                assert!(error.message().contains("did not finish"), "{error}");
            },
            other => panic!("unexpected event {other:?}"),
        }
        assert!(started.elapsed() < Duration::from_secs(5));

        let started = Instant::now();
        camera.close().unwrap();
        assert!(started.elapsed() < Duration::from_millis(500));
    }

    #[test]
    fn advertises_configured_resolutions() {
        let config = FfmpegConfig::default().with_resolutions([Resolution::new(320, 240)]);
        assert_eq!(config.resolutions, vec![Resolution::new(320, 240)]);
        assert_eq!(FfmpegConfig::default().resolutions.len(), COMMON_RESOLUTIONS.len());
    }
}
