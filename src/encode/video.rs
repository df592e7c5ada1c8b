//! Video encoder and muxer
//!
//! Wraps an FFmpeg output context and a video `AVCodecContext`. RGB24 frames
//! are converted to the encoder's pixel format with swscale, encoded, and the
//! resulting packets are interleaved into the container.

use std::path::Path;

use ffmpeg_next as ffmpeg;
use ffmpeg_next::codec;
use ffmpeg_next::format::Pixel;
use ffmpeg_next::software::scaling;
use ndarray::ArrayView3;

use crate::config::{VideoEncoderConfig, VideoPixelFormat, MAX_FRAME_RATE};
use crate::error::{ConfigError, ExportError, FfmpegError, Result};
use crate::study::VideoFrames;

impl VideoPixelFormat {
    fn pixel(self) -> Pixel {
        match self {
            Self::Yuv420p => Pixel::YUV420P,
            Self::Yuv444p => Pixel::YUV444P,
            Self::Rgb24 => Pixel::RGB24,
        }
    }

    /// Chroma-subsampled formats need even dimensions
    fn needs_even_dimensions(self) -> bool {
        matches!(self, Self::Yuv420p)
    }
}

/// Fail at start-up if the configured encoder is missing or not a video codec.
pub fn ensure_encoder_available(config: &VideoEncoderConfig) -> std::result::Result<(), ConfigError> {
    match crate::ffmpeg::video_encoder(&config.codec) {
        Some(_) => Ok(()),
        None => Err(ConfigError::UnknownEncoder(config.codec.clone())),
    }
}

/// Streaming video writer backed by a real FFmpeg encoder and muxer
pub struct VideoWriter {
    output: ffmpeg::format::context::Output,
    encoder: ffmpeg::encoder::Video,
    scaler: scaling::Context,
    stream_index: usize,
    encoder_timebase: ffmpeg::Rational,
    stream_timebase: ffmpeg::Rational,
    width: u32,
    height: u32,
    pts: i64,
}

impl VideoWriter {
    /// Open the container at `path` and an encoder for `width` x `height`
    /// RGB frames at `fps`. The container format follows the file extension.
    pub fn create(
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
        config: &VideoEncoderConfig,
    ) -> Result<Self> {
        let codec = crate::ffmpeg::video_encoder(&config.codec).ok_or_else(|| {
            FfmpegError::EncoderNotFound(format!(
                "{} is not a video encoder in this FFmpeg build",
                config.codec
            ))
        })?;

        let mut output = ffmpeg::format::output(&path)
            .map_err(|e| FfmpegError::MuxerCreate(format!("{:?}: {}", path, e)))?;
        let global_header = output
            .format()
            .flags()
            .contains(ffmpeg::format::Flags::GLOBAL_HEADER);

        let pixel_format = config.pixel_format.pixel();
        let (enc_width, enc_height) = if config.pixel_format.needs_even_dimensions() {
            ((width & !1).max(2), (height & !1).max(2))
        } else {
            (width, height)
        };
        let rate = fps.clamp(1, MAX_FRAME_RATE) as i32;
        let encoder_timebase = ffmpeg::Rational::new(1, rate);

        // Build context and configure the video encoder BEFORE opening
        let context = codec::Context::new_with_codec(codec);
        let mut video_enc = context.encoder().video().map_err(|e| {
            FfmpegError::EncoderCreate(format!("Cannot get video encoder handle: {}", e))
        })?;

        video_enc.set_width(enc_width);
        video_enc.set_height(enc_height);
        video_enc.set_format(pixel_format);
        video_enc.set_time_base(encoder_timebase);
        video_enc.set_frame_rate(Some(ffmpeg::Rational::new(rate, 1)));
        if let Some(bit_rate) = config.bit_rate {
            video_enc.set_bit_rate(bit_rate);
        }
        if let Some(gop) = config.gop_size {
            video_enc.set_gop(gop);
        }
        if let Some(max_b_frames) = config.max_b_frames {
            video_enc.set_max_b_frames(max_b_frames);
        }
        if global_header {
            video_enc.set_flags(codec::Flags::GLOBAL_HEADER);
        }

        let mut options = ffmpeg::Dictionary::new();
        if let Some(crf) = config.crf {
            options.set("crf", &crf.to_string());
        }
        if let Some(preset) = &config.preset {
            options.set("preset", preset);
        }

        let encoder = video_enc.open_as_with(codec, options).map_err(|e| {
            FfmpegError::EncoderCreate(format!("Failed to open {} encoder: {}", config.codec, e))
        })?;

        let stream_index = {
            let mut stream = output
                .add_stream(codec)
                .map_err(|e| FfmpegError::StreamConfig(format!("Failed to add stream: {}", e)))?;
            stream.set_parameters(&encoder);
            stream.set_time_base(encoder_timebase);
            stream.index()
        };

        output
            .write_header()
            .map_err(|e| FfmpegError::WriteHeader(e.to_string()))?;

        // The muxer may pick its own stream timebase while writing the header
        let stream_timebase = output
            .stream(stream_index)
            .map(|s| s.time_base())
            .ok_or_else(|| FfmpegError::StreamConfig("Output stream disappeared".into()))?;

        let scaler = scaling::Context::get(
            Pixel::RGB24,
            width,
            height,
            pixel_format,
            enc_width,
            enc_height,
            scaling::Flags::BILINEAR,
        )
        .map_err(|e| FfmpegError::ScalerCreate(e.to_string()))?;

        tracing::debug!(
            "Opened {} encoder {}x{} @ {} fps for {:?}",
            config.codec,
            enc_width,
            enc_height,
            rate,
            path
        );

        Ok(Self {
            output,
            encoder,
            scaler,
            stream_index,
            encoder_timebase,
            stream_timebase,
            width,
            height,
            pts: 0,
        })
    }

    /// Encode one `rows x cols x 3` RGB frame and mux whatever packets the
    /// encoder releases.
    pub fn write_frame(&mut self, rgb: ArrayView3<'_, u8>) -> Result<()> {
        let (rows, cols) = (rgb.shape()[0], rgb.shape()[1]);
        if rows != self.height as usize || cols != self.width as usize || rgb.shape()[2] != 3 {
            return Err(ExportError::Shape {
                kind: "Frame",
                shape: rgb.shape().to_vec(),
                expected: "the encoder's rows x cols x 3",
            });
        }

        let mut source = ffmpeg::util::frame::Video::new(Pixel::RGB24, self.width, self.height);
        let stride = source.stride(0);
        let row_len = cols * 3;
        let data = source.data_mut(0);
        for (row, pixels) in rgb.outer_iter().enumerate() {
            let dest = &mut data[row * stride..row * stride + row_len];
            for (d, s) in dest.iter_mut().zip(pixels.iter()) {
                *d = *s;
            }
        }

        let mut frame = ffmpeg::util::frame::Video::empty();
        self.scaler
            .run(&source, &mut frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("Pixel conversion failed: {}", e)))?;
        frame.set_pts(Some(self.pts));
        self.pts += 1;

        self.encoder
            .send_frame(&frame)
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_frame error: {}", e)))?;
        self.drain_packets()
    }

    /// Flush buffered frames out of the encoder, then close the container.
    pub fn finish(mut self) -> Result<()> {
        self.encoder
            .send_eof()
            .map_err(|e| FfmpegError::EncodeFrame(format!("send_eof error: {}", e)))?;
        self.drain_packets()?;

        self.output
            .write_trailer()
            .map_err(|e| FfmpegError::WriteTrailer(e.to_string()))?;
        Ok(())
    }

    /// Receive every packet the encoder has ready and write it to the muxer.
    fn drain_packets(&mut self) -> Result<()> {
        loop {
            let mut packet = ffmpeg::codec::packet::Packet::empty();
            match self.encoder.receive_packet(&mut packet) {
                Ok(()) => {
                    packet.set_stream(self.stream_index);
                    packet.rescale_ts(self.encoder_timebase, self.stream_timebase);
                    packet
                        .write_interleaved(&mut self.output)
                        .map_err(|e| FfmpegError::WritePacket(e.to_string()))?;
                }
                Err(ffmpeg::Error::Other { errno }) if errno == ffmpeg::error::EAGAIN => {
                    return Ok(())
                }
                Err(ffmpeg::Error::Eof) => return Ok(()),
                Err(e) => {
                    return Err(FfmpegError::EncodeFrame(format!(
                        "receive_packet error: {}",
                        e
                    ))
                    .into())
                }
            }
        }
    }
}

/// Encode every frame of `frames` into the container at `path`.
pub fn save_video(
    frames: &VideoFrames,
    path: &Path,
    fps: u32,
    config: &VideoEncoderConfig,
) -> Result<()> {
    let mut writer = VideoWriter::create(
        path,
        frames.width() as u32,
        frames.height() as u32,
        fps,
        config,
    )?;

    for index in 0..frames.frame_count() {
        writer.write_frame(frames.frame(index))?;
    }

    writer.finish()?;
    tracing::debug!(
        "Wrote {} frames of {}x{}x{} to {:?}",
        frames.frame_count(),
        frames.width(),
        frames.height(),
        frames.channels(),
        path
    );
    Ok(())
}
