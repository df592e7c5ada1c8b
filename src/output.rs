//! Output path resolution
//!
//! Media paths mirror the input tree: `input/a/b/scan.dcm` becomes
//! `media/a/b/scan.<ext>`. The mapping depends only on the input path and the
//! media kind, so reruns always target the same files.

use std::path::{Path, PathBuf};

use crate::config::Config;
use crate::error::Result;
use crate::study::MediaKind;

/// Whether the media file should be (re)encoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputDecision {
    Write,
    /// Target exists and overwrite is disabled
    Skip,
}

/// Destination of one media file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutput {
    /// Absolute (or media-root based) path of the media file
    pub path: PathBuf,
    /// Path relative to the media root, as recorded in the ledger
    pub relative: PathBuf,
    pub decision: OutputDecision,
}

/// Maps input files to media files
#[derive(Debug, Clone)]
pub struct OutputPathResolver {
    input_root: PathBuf,
    media_root: PathBuf,
    video_extension: String,
    image_extension: String,
    overwrite: bool,
}

impl OutputPathResolver {
    pub fn new(config: &Config) -> Self {
        Self {
            input_root: config.input.dir.clone(),
            media_root: config.media.dir.clone(),
            video_extension: config.video.extension.clone(),
            image_extension: config.image.extension.clone(),
            overwrite: config.media.overwrite,
        }
    }

    /// `source` relative to the input root. Relative inputs are taken as-is.
    pub fn source_relative<'a>(&self, source: &'a Path) -> &'a Path {
        source.strip_prefix(&self.input_root).unwrap_or(source)
    }

    fn extension_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Video => &self.video_extension,
            MediaKind::Image => &self.image_extension,
        }
    }

    /// Media path relative to the media root. Pure.
    pub fn relative_media_path(&self, source: &Path, kind: MediaKind) -> PathBuf {
        self.source_relative(source)
            .with_extension(self.extension_for(kind))
    }

    /// Compute the destination, create its parent directory and decide
    /// whether it has to be written.
    pub fn resolve(&self, source: &Path, kind: MediaKind) -> Result<ResolvedOutput> {
        let relative = self.relative_media_path(source, kind);
        let path = self.media_root.join(&relative);

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let decision = if path.is_file() && !self.overwrite {
            OutputDecision::Skip
        } else {
            OutputDecision::Write
        };

        Ok(ResolvedOutput {
            path,
            relative,
            decision,
        })
    }
}
