//! FFmpeg module - library initialization shared by all encoders
//!
//! FFmpeg is initialized once at start-up, before the worker pool starts.
//! Encoders and muxers are created per file on the worker that needs them.

pub use ffmpeg_next as ffmpeg;

/// Initialize FFmpeg library
///
/// This should be called once at application startup.
/// Returns an error if FFmpeg fails to initialize.
pub fn init() -> Result<(), crate::error::FfmpegError> {
    ffmpeg::init().map_err(|e| {
        crate::error::FfmpegError::InitFailed(format!("ffmpeg::init() failed: {}", e))
    })?;

    // Per-frame encoder chatter would drown out per-file progress.
    ffmpeg::util::log::set_level(ffmpeg::util::log::Level::Warning);

    tracing::info!("FFmpeg initialized");

    Ok(())
}

/// Look up an encoder by name, keeping it only if it encodes video.
pub fn video_encoder(name: &str) -> Option<ffmpeg::Codec> {
    ffmpeg::encoder::find_by_name(name)
        .filter(|codec| codec.medium() == ffmpeg::media::Type::Video)
}
