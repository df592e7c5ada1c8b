use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the exporter
#[derive(Error, Debug)]
pub enum ExportError {
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] FfmpegError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unable to read DICOM file {path:?}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Unable to decode pixel data of {path:?}: {reason}")]
    PixelData { path: PathBuf, reason: String },

    #[error("Invalid attribute '{name}' = '{value}'")]
    InvalidAttribute { name: String, value: String },

    #[error("{kind} pixel array has shape {shape:?}, expected {expected}")]
    Shape {
        kind: &'static str,
        shape: Vec<usize>,
        expected: &'static str,
    },

    #[error("Image encoding error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Ledger error: {0}")]
    Ledger(String),

    #[error("Ledger writer is closed")]
    LedgerClosed,
}

impl ExportError {
    /// True for failures caused by a file that is not a readable study.
    ///
    /// These are skipped silently rather than counted as failed conversions.
    pub fn is_decode_failure(&self) -> bool {
        matches!(self, ExportError::Decode { .. })
    }
}

/// FFmpeg-specific errors
#[derive(Error, Debug)]
pub enum FfmpegError {
    #[error("FFmpeg initialization failed: {0}")]
    InitFailed(String),

    #[error("Failed to find encoder: {0}")]
    EncoderNotFound(String),

    #[error("Failed to create encoder: {0}")]
    EncoderCreate(String),

    #[error("Failed to create muxer: {0}")]
    MuxerCreate(String),

    #[error("Failed to create scaler: {0}")]
    ScalerCreate(String),

    #[error("Failed to write header: {0}")]
    WriteHeader(String),

    #[error("Failed to write packet: {0}")]
    WritePacket(String),

    #[error("Failed to write trailer: {0}")]
    WriteTrailer(String),

    #[error("Failed to encode frame: {0}")]
    EncodeFrame(String),

    #[error("Stream configuration failed: {0}")]
    StreamConfig(String),
}

/// Configuration loading and validation errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path:?}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("Failed to parse config file {path:?}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Failed to write config copy {path:?}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: &'static str, reason: String },

    #[error("Input directory does not exist: {0:?}")]
    MissingInputDir(PathBuf),

    #[error("Unknown video encoder '{0}'")]
    UnknownEncoder(String),

    #[error(
        "Metadata file {0:?} already exists. Use --overwrite or set metadata.append to reuse it"
    )]
    LedgerExists(PathBuf),
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ExportError>;
