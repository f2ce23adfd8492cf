// This is free and unencumbered software released into the public domain.

//! Still-capture camera sessions behind a method-call bridge.
//!
//! - [`shared`]: error taxonomy, device model, driver and host seams, drivers
//! - [`processing`]: EXIF-aware downscaling and atomic file transfer
//! - [`session`]: the capture session state machine and the single-session directory
//! - [`bridge`]: `availableCameras` / `initialize` / `takePicture` / `dispose` dispatch

pub mod bridge;
pub mod cli;
pub mod processing;
pub mod session;
pub mod shared;
