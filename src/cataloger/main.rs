// This is free and unencumbered software released into the public domain.

#[cfg(not(feature = "std"))]
compile_error!("capture-bridge-cataloger requires the 'std' feature");

use asimov_module::SysexitsError::{self, *};
use capture_bridge::{
    bridge::describe_camera,
    cli,
    session::SessionDirectory,
    shared::{AlwaysGranted, CameraError, CountingSurfaces, SessionConfig, default_driver_manager},
};
use clap::Parser;
use clientele::StandardOptions;
use std::{error::Error as StdError, sync::Arc};

#[derive(Debug, Parser)]
struct Options {
    #[clap(flatten)]
    flags: StandardOptions,

    #[arg(
        value_name = "FORMAT",
        short = 'o',
        long = "output",
        value_enum,
        default_value = "text"
    )]
    output: OutputFormat,
}

#[derive(Debug, Clone, clap::ValueEnum)]
enum OutputFormat {
    Text,
    Jsonl,
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

    let exit_code = match run_cataloger(&options) {
        Ok(()) => EX_OK,
        Err(err) => cli::handle_error(&err, &options.flags),
    };

    Ok(exit_code)
}

fn run_cataloger(options: &Options) -> Result<(), CameraError> {
    cli::info_user(&options.flags, "enumerating camera devices");

    let directory = SessionDirectory::new(
        default_driver_manager()?,
        Arc::new(CountingSurfaces::new()),
        Arc::new(AlwaysGranted),
        SessionConfig::default(),
    );
    let mut cameras = directory.available_cameras()?;
    if cameras.is_empty() {
        cli::warn_user(&options.flags, "no camera devices found");
        return Ok(());
    }

    cameras.sort_by(|a, b| a.id.cmp(&b.id));

    for camera in cameras {
        match options.output {
            OutputFormat::Text => {
                let sizes: Vec<String> = camera
                    .supported_resolutions
                    .iter()
                    .map(ToString::to_string)
                    .collect();
                println!("{}: {} [{}]", camera.id, camera.facing, sizes.join(", "));
            },
            OutputFormat::Jsonl => println!("{}", describe_camera(&camera)),
        }
    }

    Ok(())
}
