//! Configuration file support
//!
//! Loads the run configuration from a TOML file and saves a copy of it next
//! to the run's outputs.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::config::{
    Config, ImageConfig, ImageWriterConfig, InputConfig, LedgerMode, MediaConfig, MetadataConfig,
    PngCompression, StillFormat, VideoConfig, VideoEncoderConfig, VideoPixelFormat,
};
use crate::error::ConfigError;

/// Configuration file format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigFile {
    /// Worker pool size, 0 for sequential processing
    #[serde(default)]
    pub num_workers: usize,
    /// Input settings
    pub dicom: DicomSettings,
    /// Media output settings
    pub media: MediaSettings,
    /// Video output settings
    #[serde(default)]
    pub video: VideoSettings,
    /// Image output settings
    #[serde(default)]
    pub image: ImageSettings,
    /// Metadata ledger settings
    pub metadata: MetadataSettings,
    /// Where to keep a copy of this file
    pub config: Option<ConfigCopySettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DicomSettings {
    /// Directory to scan
    pub dir: PathBuf,
    /// Scan subdirectories
    pub recursive: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MediaSettings {
    /// Output root for generated media
    pub dir: PathBuf,
    /// Re-encode existing media files
    pub overwrite: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VideoSettings {
    pub extension: Option<String>,
    pub codec: Option<String>,
    pub pixel_format: Option<VideoPixelFormat>,
    pub default_fps: Option<u32>,
    pub bit_rate: Option<usize>,
    pub gop_size: Option<u32>,
    pub max_b_frames: Option<usize>,
    pub crf: Option<u8>,
    pub preset: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImageSettings {
    pub extension: Option<String>,
    /// Inferred from the extension when absent
    pub format: Option<StillFormat>,
    pub jpeg_quality: Option<u8>,
    pub png_compression: Option<PngCompression>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataSettings {
    /// Ledger file path
    pub file: PathBuf,
    /// Append to an existing ledger
    pub append: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigCopySettings {
    pub file: PathBuf,
}

impl ConfigFile {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to a TOML file
    pub fn to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let write_err = |reason: String| ConfigError::Write {
            path: path.to_path_buf(),
            reason,
        };

        let content = toml::to_string_pretty(self).map_err(|e| write_err(e.to_string()))?;
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| write_err(e.to_string()))?;
        }
        std::fs::write(path, content).map_err(|e| write_err(e.to_string()))?;
        Ok(())
    }

    /// Convert to the runtime Config. `overwrite_ledger` comes from the CLI.
    pub fn into_config(self, overwrite_ledger: bool) -> Config {
        let video_defaults = VideoEncoderConfig::default();
        let video = VideoConfig {
            extension: normalize_extension(self.video.extension, "mp4"),
            encoder: VideoEncoderConfig {
                codec: self.video.codec.unwrap_or(video_defaults.codec),
                pixel_format: self.video.pixel_format.unwrap_or_default(),
                default_fps: self.video.default_fps.unwrap_or(video_defaults.default_fps),
                bit_rate: self.video.bit_rate,
                gop_size: self.video.gop_size,
                max_b_frames: self.video.max_b_frames,
                crf: self.video.crf,
                preset: self.video.preset,
            },
        };

        let image_defaults = ImageWriterConfig::default();
        let image_extension = normalize_extension(self.image.extension, "png");
        let image = ImageConfig {
            writer: ImageWriterConfig {
                format: self
                    .image
                    .format
                    .or_else(|| StillFormat::for_extension(&image_extension))
                    .unwrap_or(StillFormat::Png),
                jpeg_quality: self.image.jpeg_quality.unwrap_or(image_defaults.jpeg_quality),
                png_compression: self
                    .image
                    .png_compression
                    .unwrap_or(image_defaults.png_compression),
            },
            extension: image_extension,
        };

        Config {
            num_workers: self.num_workers,
            input: InputConfig {
                dir: self.dicom.dir,
                recursive: self.dicom.recursive.unwrap_or(true),
            },
            media: MediaConfig {
                dir: self.media.dir,
                overwrite: self.media.overwrite.unwrap_or(false),
            },
            video,
            image,
            metadata: MetadataConfig {
                file: self.metadata.file,
                mode: LedgerMode::from_flags(
                    overwrite_ledger,
                    self.metadata.append.unwrap_or(false),
                ),
            },
            config_copy: self.config.map(|c| c.file),
        }
    }
}

/// Accept both `mp4` and `.mp4`
fn normalize_extension(extension: Option<String>, default: &str) -> String {
    extension
        .map(|e| e.trim_start_matches('.').to_string())
        .unwrap_or_else(|| default.to_string())
}
