//! Run configuration
//!
//! The runtime view of the configuration file after defaults have been
//! applied. Everything in here is validated once, before any file is touched.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::ConfigError;

/// Where DICOM files are discovered
#[derive(Debug, Clone)]
pub struct InputConfig {
    /// Root directory to scan
    pub dir: PathBuf,

    /// Walk subdirectories
    pub recursive: bool,
}

/// Where generated media is written
#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Root directory for media output, mirroring the input tree
    pub dir: PathBuf,

    /// Re-encode media that already exists
    pub overwrite: bool,
}

/// Pixel format handed to the video encoder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoPixelFormat {
    Yuv420p,
    Yuv444p,
    Rgb24,
}

impl Default for VideoPixelFormat {
    fn default() -> Self {
        Self::Yuv420p
    }
}

/// Highest frame rate handed to a video encoder
pub const MAX_FRAME_RATE: u32 = 240;

/// Enumerated video encoder settings.
///
/// Codec-private options (`crf`, `preset`) are passed to the encoder when it
/// is opened; everything else maps onto a codec context field.
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEncoderConfig {
    /// FFmpeg encoder name, e.g. `libx264` or `mpeg4`
    pub codec: String,
    pub pixel_format: VideoPixelFormat,
    /// Frame rate used when the study does not recommend one
    pub default_fps: u32,
    pub bit_rate: Option<usize>,
    pub gop_size: Option<u32>,
    pub max_b_frames: Option<usize>,
    pub crf: Option<u8>,
    pub preset: Option<String>,
}

impl Default for VideoEncoderConfig {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            pixel_format: VideoPixelFormat::default(),
            default_fps: 30,
            bit_rate: None,
            gop_size: None,
            max_b_frames: None,
            crf: None,
            preset: None,
        }
    }
}

/// Video output policy
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// File extension without the leading dot
    pub extension: String,
    pub encoder: VideoEncoderConfig,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            extension: "mp4".to_string(),
            encoder: VideoEncoderConfig::default(),
        }
    }
}

/// Still image container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StillFormat {
    Png,
    Jpeg,
}

impl StillFormat {
    /// Format conventionally stored under `extension`, if any
    pub fn for_extension(extension: &str) -> Option<Self> {
        match extension.to_ascii_lowercase().as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            _ => None,
        }
    }
}

/// PNG compression level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PngCompression {
    Fast,
    Default,
    Best,
}

/// Still image writer settings
#[derive(Debug, Clone, PartialEq)]
pub struct ImageWriterConfig {
    pub format: StillFormat,
    /// JPEG quality, 1..=100
    pub jpeg_quality: u8,
    pub png_compression: PngCompression,
}

impl Default for ImageWriterConfig {
    fn default() -> Self {
        Self {
            format: StillFormat::Png,
            jpeg_quality: 90,
            png_compression: PngCompression::Default,
        }
    }
}

/// Image output policy
#[derive(Debug, Clone)]
pub struct ImageConfig {
    /// File extension without the leading dot
    pub extension: String,
    pub writer: ImageWriterConfig,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            extension: "png".to_string(),
            writer: ImageWriterConfig::default(),
        }
    }
}

/// How an existing ledger file is treated at start-up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerMode {
    /// The ledger must not exist yet
    CreateNew,
    /// Keep existing records and append after them
    Append,
    /// Discard existing records
    Overwrite,
}

impl LedgerMode {
    /// Resolve the mode from the CLI overwrite flag and the config append flag.
    /// The CLI flag wins.
    pub fn from_flags(overwrite: bool, append: bool) -> Self {
        if overwrite {
            Self::Overwrite
        } else if append {
            Self::Append
        } else {
            Self::CreateNew
        }
    }
}

/// Metadata ledger location and policy
#[derive(Debug, Clone)]
pub struct MetadataConfig {
    pub file: PathBuf,
    pub mode: LedgerMode,
}

/// Complete run configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Worker pool size; 0 processes files sequentially
    pub num_workers: usize,
    pub input: InputConfig,
    pub media: MediaConfig,
    pub video: VideoConfig,
    pub image: ImageConfig,
    pub metadata: MetadataConfig,
    /// Where to save a copy of the effective configuration
    pub config_copy: Option<PathBuf>,
}

impl Config {
    /// Check every option that can be checked without touching a codec.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.input.dir.is_dir() {
            return Err(ConfigError::MissingInputDir(self.input.dir.clone()));
        }

        validate_extension("video.extension", &self.video.extension)?;
        validate_extension("image.extension", &self.image.extension)?;

        let encoder = &self.video.encoder;
        if encoder.codec.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "video.codec",
                reason: "must not be empty".into(),
            });
        }
        if !(1..=MAX_FRAME_RATE).contains(&encoder.default_fps) {
            return Err(ConfigError::InvalidValue {
                key: "video.default_fps",
                reason: format!("{} is outside 1..={}", encoder.default_fps, MAX_FRAME_RATE),
            });
        }
        if let Some(crf) = encoder.crf {
            if crf > 51 {
                return Err(ConfigError::InvalidValue {
                    key: "video.crf",
                    reason: format!("{} is outside 0..=51", crf),
                });
            }
        }
        if let Some(0) = encoder.gop_size {
            return Err(ConfigError::InvalidValue {
                key: "video.gop_size",
                reason: "must be greater than 0".into(),
            });
        }

        let format = self.image.writer.format;
        match StillFormat::for_extension(&self.image.extension) {
            Some(implied) if implied != format => {
                return Err(ConfigError::InvalidValue {
                    key: "image.format",
                    reason: format!(
                        "{:?} images cannot be written with extension '{}'",
                        format, self.image.extension
                    ),
                });
            }
            _ => {}
        }

        let quality = self.image.writer.jpeg_quality;
        if !(1..=100).contains(&quality) {
            return Err(ConfigError::InvalidValue {
                key: "image.jpeg_quality",
                reason: format!("{} is outside 1..=100", quality),
            });
        }

        Ok(())
    }
}

fn validate_extension(key: &'static str, extension: &str) -> Result<(), ConfigError> {
    if extension.is_empty() || extension.contains(['/', '\\']) {
        return Err(ConfigError::InvalidValue {
            key,
            reason: format!("'{}' is not a file extension", extension),
        });
    }
    Ok(())
}

#[cfg(test)]
pub(crate) fn test_config(input: PathBuf, media: PathBuf, ledger: PathBuf) -> Config {
    Config {
        num_workers: 0,
        input: InputConfig {
            dir: input,
            recursive: true,
        },
        media: MediaConfig {
            dir: media,
            overwrite: false,
        },
        video: VideoConfig {
            extension: "avi".to_string(),
            encoder: VideoEncoderConfig {
                codec: "mpeg4".to_string(),
                ..Default::default()
            },
        },
        image: ImageConfig::default(),
        metadata: MetadataConfig {
            file: ledger,
            mode: LedgerMode::CreateNew,
        },
        config_copy: None,
    }
}
