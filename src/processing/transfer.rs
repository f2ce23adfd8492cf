// This is free and unencumbered software released into the public domain.

use super::staging_dir;
use crate::shared::{CameraError, CameraResult};
use scopeguard::defer;
use std::{fs::File, io, path::Path};
use tracing::{debug, warn};

/// Copies `src` to `dst`, returning the number of bytes copied.
///
/// The copy is staged next to `dst` and renamed into place, so `dst` either
/// keeps its previous state or holds the complete source content.
///
/// With `delete_source_after`, `src` is removed once the attempt is over,
/// whether or not the copy succeeded.
pub fn transfer(src: &Path, dst: &Path, delete_source_after: bool) -> CameraResult<u64> {
    defer! {
        if delete_source_after {
            remove_source(src);
        }
    }

    let mut input = File::open(src).map_err(|e| CameraError::io("opening", src, e))?;
    let mut staged = tempfile::Builder::new()
        .prefix(".transfer-")
        .suffix(".tmp")
        .tempfile_in(staging_dir(dst))
        .map_err(|e| CameraError::io("creating", dst, e))?;

    let copied = io::copy(&mut input, &mut staged).map_err(|e| CameraError::io("copying to", dst, e))?;
    staged
        .as_file()
        .sync_all()
        .map_err(|e| CameraError::io("syncing", dst, e))?;
    staged
        .persist(dst)
        .map_err(|e| CameraError::io("finalizing", dst, e.error))?;

    debug!(src = %src.display(), dst = %dst.display(), bytes = copied, "transferred file");
    Ok(copied)
}

fn remove_source(src: &Path) {
    match std::fs::remove_file(src) {
        Ok(()) => {},
        Err(e) if e.kind() == io::ErrorKind::NotFound => {},
        Err(e) => warn!(src = %src.display(), error = %e, "failed to remove transfer source"),
    }
}
