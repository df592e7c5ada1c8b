//! Study decoding
//!
//! This module handles everything read from a DICOM file:
//! - Opening and parsing the file
//! - Extracting text attributes for the metadata ledger
//! - Classifying the study as video or still image
//! - Decoding and normalizing the pixel data

pub mod attributes;
pub mod pixels;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use dicom_object::{open_file, DefaultDicomObject};
use dicom_pixeldata::{ConvertOptions, PixelDecoder};

use crate::config::MAX_FRAME_RATE;
use crate::error::{ExportError, Result};

pub use attributes::extract_attributes;
pub use pixels::{PixelBuffer, PixelLayout, StillImage, VideoFrames};

/// Video or still image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaKind {
    Video,
    Image,
}

impl MediaKind {
    /// A study is a video if and only if its "Number of Frames" (default 1)
    /// is greater than 1.
    pub fn classify(attributes: &BTreeMap<String, String>) -> Result<Self> {
        let frames = match attributes.get(attributes::NUMBER_OF_FRAMES) {
            Some(value) => parse_integer(attributes::NUMBER_OF_FRAMES, value)?,
            None => 1,
        };

        Ok(if frames > 1 { Self::Video } else { Self::Image })
    }

    /// Value stored in the ledger's `media_type` field
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Video => write!(f, "Video"),
            Self::Image => write!(f, "Image"),
        }
    }
}

fn parse_integer(name: &str, value: &str) -> Result<i64> {
    value
        .trim()
        .trim_end_matches('\0')
        .parse::<i64>()
        .map_err(|_| ExportError::InvalidAttribute {
            name: name.to_string(),
            value: value.to_string(),
        })
}

/// A parsed DICOM file and its extracted attributes
pub struct StudyFile {
    path: PathBuf,
    object: DefaultDicomObject,
    attributes: BTreeMap<String, String>,
}

impl StudyFile {
    /// Open and parse a study.
    ///
    /// Any failure here means the file is not a readable study.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let object = open_file(&path).map_err(|e| ExportError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let attributes = extract_attributes(&object);

        Ok(Self {
            path,
            object,
            attributes,
        })
    }

    pub fn into_attributes(self) -> BTreeMap<String, String> {
        self.attributes
    }

    pub fn media_kind(&self) -> Result<MediaKind> {
        MediaKind::classify(&self.attributes)
    }

    /// "Samples per Pixel", 1 when absent
    pub fn samples_per_pixel(&self) -> Result<usize> {
        match self.attributes.get(attributes::SAMPLES_PER_PIXEL) {
            Some(value) => {
                let samples = parse_integer(attributes::SAMPLES_PER_PIXEL, value)?;
                usize::try_from(samples).map_err(|_| ExportError::InvalidAttribute {
                    name: attributes::SAMPLES_PER_PIXEL.to_string(),
                    value: value.clone(),
                })
            }
            None => Ok(1),
        }
    }

    /// "Recommended Display Frame Rate", or `default` when absent or unusable.
    ///
    /// The rate is rounded and capped at [`MAX_FRAME_RATE`].
    pub fn frame_rate(&self, default: u32) -> u32 {
        let Some(value) = self.attributes.get(attributes::RECOMMENDED_FRAME_RATE) else {
            return default;
        };

        match value.trim().trim_end_matches('\0').parse::<f64>() {
            Ok(fps) if fps.is_finite() && fps >= 0.5 => {
                let capped = fps.round().min(MAX_FRAME_RATE as f64) as u32;
                if capped as f64 != fps.round() {
                    tracing::warn!(
                        "Frame rate '{}' in {:?} capped at {}",
                        value,
                        self.path,
                        capped
                    );
                }
                capped
            }
            _ => {
                tracing::warn!(
                    "Ignoring unusable frame rate '{}' in {:?}, using {}",
                    value,
                    self.path,
                    default
                );
                default
            }
        }
    }

    /// Decode the pixel data into 8-bit RGB or grey samples.
    ///
    /// Grey samples go through the study's VOI window, or a min/max
    /// normalisation when it has none. Colour samples come back as
    /// interleaved RGB whatever the stored colour model.
    pub fn decode_pixels(&self) -> Result<PixelBuffer> {
        let pixel_err = |reason: String| ExportError::PixelData {
            path: self.path.clone(),
            reason,
        };

        let decoded = self
            .object
            .decode_pixel_data()
            .map_err(|e| pixel_err(e.to_string()))?;

        let layout = PixelLayout {
            frames: decoded.number_of_frames() as usize,
            rows: decoded.rows() as usize,
            columns: decoded.columns() as usize,
            samples_per_pixel: decoded.samples_per_pixel() as usize,
        };
        tracing::debug!(
            "Decoded pixel data of {:?}: {:?}, {:?}",
            self.path,
            layout,
            decoded.photometric_interpretation()
        );

        let options = ConvertOptions::new().force_8bit();
        let mut samples = Vec::with_capacity(layout.sample_count());
        for frame in 0..decoded.number_of_frames() {
            let image = decoded
                .to_dynamic_image_with_options(frame, &options)
                .map_err(|e| pixel_err(format!("frame {}: {}", frame, e)))?;
            if layout.samples_per_pixel == 1 {
                samples.extend_from_slice(image.into_luma8().as_raw());
            } else {
                samples.extend_from_slice(image.into_rgb8().as_raw());
            }
        }

        PixelBuffer::from_samples(samples, layout)
    }
}
