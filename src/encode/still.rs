//! Still image writer

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{ExtendedColorType, ImageEncoder};

use crate::config::{ImageWriterConfig, PngCompression, StillFormat};
use crate::error::Result;
use crate::study::StillImage;

/// Encode an RGB image to `path` with the configured writer.
pub fn save_image(image: &StillImage, path: &Path, config: &ImageWriterConfig) -> Result<()> {
    let bytes = image.to_bytes();
    let (width, height) = (image.width() as u32, image.height() as u32);
    let mut writer = BufWriter::new(File::create(path)?);

    match config.format {
        StillFormat::Png => {
            let compression = match config.png_compression {
                PngCompression::Fast => CompressionType::Fast,
                PngCompression::Default => CompressionType::Default,
                PngCompression::Best => CompressionType::Best,
            };
            PngEncoder::new_with_quality(&mut writer, compression, FilterType::Adaptive)
                .write_image(&bytes, width, height, ExtendedColorType::Rgb8)?;
        }
        StillFormat::Jpeg => {
            JpegEncoder::new_with_quality(&mut writer, config.jpeg_quality)
                .write_image(&bytes, width, height, ExtendedColorType::Rgb8)?;
        }
    }

    writer.flush()?;
    tracing::debug!("Wrote {}x{} image to {:?}", width, height, path);
    Ok(())
}
