//! Media encoding
//!
//! - Video: FFmpeg encoder + muxer, one frame at a time
//! - Still images: `image` crate encoders
//!
//! Media is first written under a hidden `.partial-` name next to its target
//! and renamed into place only once the encoder has finished, so a finished
//! path never refers to a half-written file.

pub mod still;
pub mod video;

use std::path::{Path, PathBuf};

use crate::error::Result;

pub use still::save_image;
pub use video::{ensure_encoder_available, save_video};

/// Temporary sibling path that keeps the target's extension
pub fn partial_path(target: &Path) -> PathBuf {
    let name = target
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    target.with_file_name(format!(".partial-{}", name))
}

/// Run `write` against a temporary path, then move the result to `target`.
pub fn write_atomically<F>(target: &Path, write: F) -> Result<()>
where
    F: FnOnce(&Path) -> Result<()>,
{
    let partial = partial_path(target);

    if let Err(e) = write(&partial) {
        if partial.exists() {
            if let Err(cleanup) = std::fs::remove_file(&partial) {
                tracing::warn!("Failed to remove {:?}: {}", partial, cleanup);
            }
        }
        return Err(e);
    }

    std::fs::rename(&partial, target)?;
    Ok(())
}
