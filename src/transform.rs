//! Per-file conversion pipeline
//!
//! decode -> classify -> normalize -> resolve output -> encode -> record.
//! Every step runs synchronously on the calling thread; the scheduler decides
//! which thread that is.

use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{Config, ImageConfig, VideoConfig};
use crate::encode::{save_image, save_video, write_atomically};
use crate::error::Result;
use crate::ledger::{LedgerHandle, MetadataRecord};
use crate::output::{OutputDecision, OutputPathResolver};
use crate::study::{MediaKind, StillImage, StudyFile, VideoFrames};

/// Result of processing one discovered file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileOutcome {
    /// Media encoded and recorded
    Written { media: PathBuf, kind: MediaKind },
    /// Media already existed; recorded without re-encoding
    Skipped { media: PathBuf, kind: MediaKind },
    /// Not a readable study; nothing written or recorded
    Unreadable { reason: String },
    /// Conversion failed; nothing recorded
    Failed { reason: String },
}

impl fmt::Display for FileOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Written { media, kind } => write!(f, "{} written to {:?}", kind, media),
            Self::Skipped { media, kind } => write!(f, "{} exists at {:?}", kind, media),
            Self::Unreadable { reason } => write!(f, "unreadable: {}", reason),
            Self::Failed { reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Converts study files into media and ledger records
pub struct MediaTransformer {
    resolver: OutputPathResolver,
    video: VideoConfig,
    image: ImageConfig,
    ledger: LedgerHandle,
}

impl MediaTransformer {
    pub fn new(config: &Config, ledger: LedgerHandle) -> Self {
        Self {
            resolver: OutputPathResolver::new(config),
            video: config.video.clone(),
            image: config.image.clone(),
            ledger,
        }
    }

    /// Process one file. Never panics on bad input; every failure is
    /// reported through the returned outcome.
    pub fn process(&self, path: &Path) -> FileOutcome {
        tracing::info!("Processing {:?}", path);

        match self.convert(path) {
            Ok(outcome) => outcome,
            Err(e) if e.is_decode_failure() => {
                tracing::warn!("Skipping {:?}: {}", path, e);
                FileOutcome::Unreadable {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!("Failed to convert {:?}: {}", path, e);
                FileOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        }
    }

    fn convert(&self, path: &Path) -> Result<FileOutcome> {
        let study = StudyFile::open(path)?;
        let kind = study.media_kind()?;
        let pixels = study.decode_pixels()?;

        let encoded = match kind {
            MediaKind::Video => {
                let frames = pixels.into_video(study.samples_per_pixel()?)?;
                let fps = study.frame_rate(self.video.encoder.default_fps);
                Media::Video { frames, fps }
            }
            MediaKind::Image => Media::Image(pixels.into_image()?),
        };

        let output = self.resolver.resolve(path, kind)?;
        let outcome = match output.decision {
            OutputDecision::Skip => {
                tracing::warn!(
                    "{:?} already exists, not overwriting (set media.overwrite to re-encode)",
                    output.path
                );
                FileOutcome::Skipped {
                    media: output.path.clone(),
                    kind,
                }
            }
            OutputDecision::Write => {
                write_atomically(&output.path, |partial| match &encoded {
                    Media::Video { frames, fps } => {
                        save_video(frames, partial, *fps, &self.video.encoder)
                    }
                    Media::Image(image) => save_image(image, partial, &self.image.writer),
                })?;
                tracing::debug!("Wrote {} {:?}", kind, output.path);
                FileOutcome::Written {
                    media: output.path.clone(),
                    kind,
                }
            }
        };

        let dicom_file = self.resolver.source_relative(path).to_path_buf();
        let record = MetadataRecord::new(
            study.into_attributes(),
            &dicom_file,
            &output.relative,
            kind,
        );
        self.ledger.append(&record)?;

        Ok(outcome)
    }
}

/// Normalized pixels ready for an encoder
enum Media {
    Video { frames: VideoFrames, fps: u32 },
    Image(StillImage),
}
