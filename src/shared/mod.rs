// This is free and unencumbered software released into the public domain.

mod config;
pub use config::*;

mod device;
pub use device::*;

mod driver;
pub use driver::*;

pub mod drivers {
    #[cfg(feature = "ffmpeg")]
    pub mod ffmpeg;
}

mod error;
pub use error::*;

mod frame;
pub use frame::*;

mod host;
pub use host::*;

mod open;
pub use open::*;
