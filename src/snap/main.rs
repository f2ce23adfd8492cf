// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("capture-bridge-snap requires the 'std' feature");

use asimov_module::SysexitsError::{self, *};
use capture_bridge::{
    cli,
    session::SessionDirectory,
    shared::{
        AlwaysGranted, CameraError, CountingSurfaces, FrameSink, ResolutionPreset,
        SessionConfig, default_driver_manager,
    },
};
use clap::Parser;
use clientele::StandardOptions;
use std::{
    error::Error as StdError,
    path::PathBuf,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, Ordering},
    },
    time::{Duration, Instant},
};

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    /// Where to write the processed JPEG.
    #[arg(value_name = "PATH")]
    path: PathBuf,

    /// Camera id as listed by the cataloger (default: the first one).
    #[arg(long)]
    device: Option<String>,

    #[arg(short, long, value_parser = parse_preset, default_value = "high")]
    preset: ResolutionPreset,

    /// Seconds of preview before the shot.
    #[arg(short, long, default_value = "1")]
    warmup: f64,

    #[arg(long, default_value = "1920")]
    max_edge: u32,

    #[arg(long, default_value = "85")]
    quality: u8,

    /// Seconds to wait for the still before giving up.
    #[arg(short, long, default_value = "30")]
    timeout: u64,
}

pub fn main() -> Result<SysexitsError, Box<dyn StdError>> {
    asimov_module::dotenv().ok();
    let args = asimov_module::args_os()?;
    let options = Options::parse_from(args);

    if options.flags.version {
        println!("{} {}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));
        return Ok(EX_OK);
    }

    if options.flags.license {
        print!("{}", include_str!("../../UNLICENSE"));
        return Ok(EX_OK);
    }

    #[cfg(feature = "tracing")]
    asimov_module::init_tracing_subscriber(&options.flags).expect("failed to initialize logging");

    let exit_code = match run_snap(&options) {
        Ok(path) => {
            println!("{}", path.display());
            EX_OK
        },
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_snap(opts: &Options) -> Result<PathBuf, CameraError> {
    let quit = Arc::new(AtomicBool::new(false));
    {
        let quit2 = Arc::clone(&quit);
        ctrlc::set_handler(move || {
            quit2.store(true, Ordering::SeqCst);
        })
        .map_err(|e| CameraError::invalid_state(format!("{e}")))?;
    }

    let frames = Arc::new(AtomicU64::new(0));
    let frames_cb = Arc::clone(&frames);
    let sink: FrameSink = Arc::new(move |_frame| {
        frames_cb.fetch_add(1, Ordering::Relaxed);
    });

    let config = SessionConfig::default()
        .with_max_edge_pixels(opts.max_edge)
        .with_jpeg_quality(opts.quality)
        .with_capture_timeout(Some(Duration::from_secs(opts.timeout.max(1))));
    let directory = SessionDirectory::new(
        default_driver_manager()?,
        Arc::new(CountingSurfaces::new().with_sink(sink)),
        Arc::new(AlwaysGranted),
        config,
    );

    let device = match &opts.device {
        Some(device) => device.trim().to_string(),
        None => directory
            .available_cameras()?
            .into_iter()
            .next()
            .map(|d| d.id)
            .ok_or_else(|| CameraError::invalid_argument("no camera devices found"))?,
    };

    let info = directory.initialize(&device, opts.preset)?;
    cli::info_user(
        &opts.flags,
        &format!("opened {device} at {} (surface {})", info.preview, info.surface),
    );

    let warmup = Duration::from_secs_f64(opts.warmup.max(0.0));
    let started = Instant::now();
    while started.elapsed() < warmup {
        if quit.load(Ordering::SeqCst) {
            directory.dispose();
            return Err(CameraError::Closed);
        }
        directory.pump_events();
        std::thread::sleep(Duration::from_millis(50));
    }
    cli::info_user(
        &opts.flags,
        &format!("{} preview frames received", frames.load(Ordering::Relaxed)),
    );

    let result = directory.take_picture(&opts.path);
    directory.dispose();
    result
}

fn parse_preset(s: &str) -> Result<ResolutionPreset, String> {
    s.parse().map_err(|e: CameraError| e.to_string())
}
