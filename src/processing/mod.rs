// This is free and unencumbered software released into the public domain.

//! Still-image post-processing and file transfer.

mod postprocess;
pub use postprocess::*;

mod transfer;
pub use transfer::*;

use std::path::Path;

/// The directory in which to stage a file that will be renamed onto `path`.
pub(crate) fn staging_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    }
}
