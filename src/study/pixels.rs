//! Pixel buffers
//!
//! 8-bit samples produced by the DICOM decoder, shaped for the encoder that
//! will consume them: `frames x rows x cols x 3` for video, `rows x cols x 3`
//! for still images.

use std::borrow::Cow;

use ndarray::{Array3, Array4, ArrayD, ArrayView3, Axis, Ix3, Ix4, IxDyn};

use crate::error::{ExportError, Result};

/// Geometry of a decoded pixel block
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelLayout {
    pub frames: usize,
    pub rows: usize,
    pub columns: usize,
    pub samples_per_pixel: usize,
}

impl PixelLayout {
    pub fn sample_count(&self) -> usize {
        self.frames * self.rows * self.columns * self.samples_per_pixel
    }

    /// Buffer shape with singleton frame and sample axes dropped
    fn shape(&self) -> Vec<usize> {
        let mut shape = Vec::with_capacity(4);
        if self.frames > 1 {
            shape.push(self.frames);
        }
        shape.push(self.rows);
        shape.push(self.columns);
        if self.samples_per_pixel > 1 {
            shape.push(self.samples_per_pixel);
        }
        shape
    }
}

/// 8-bit pixel samples with a shape of 2 to 4 axes
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    array: ArrayD<u8>,
}

impl PixelBuffer {
    /// Wrap interleaved samples, frame after frame, in row-major order.
    pub fn from_samples(samples: Vec<u8>, layout: PixelLayout) -> Result<Self> {
        if samples.len() != layout.sample_count() {
            tracing::debug!(
                "Pixel data holds {} samples, {:?} needs {}",
                samples.len(),
                layout,
                layout.sample_count()
            );
            return Err(ExportError::Shape {
                kind: "Decoded",
                shape: vec![samples.len()],
                expected: "rows * cols * samples * frames samples",
            });
        }
        Self::from_shape(layout.shape(), samples)
    }

    fn from_shape(shape: Vec<usize>, samples: Vec<u8>) -> Result<Self> {
        let array =
            ArrayD::from_shape_vec(IxDyn(&shape), samples).map_err(|_| ExportError::Shape {
                kind: "Decoded",
                shape: shape.clone(),
                expected: "a shape matching the sample count",
            })?;
        Ok(Self { array })
    }

    pub fn shape(&self) -> &[usize] {
        self.array.shape()
    }

    /// Replicate a single grey channel into three colour channels.
    pub fn promote_grayscale(self) -> Result<Self> {
        let last = Axis(self.array.ndim());
        let view = self.array.view();
        let array = ndarray::stack(last, &[view.clone(), view.clone(), view]).map_err(|_| {
            ExportError::Shape {
                kind: "Grayscale",
                shape: self.array.shape().to_vec(),
                expected: "a stackable single-channel buffer",
            }
        })?;
        Ok(Self { array })
    }

    /// Shape the buffer as video frames.
    ///
    /// Single-sample buffers are promoted to three channels first.
    pub fn into_video(self, samples_per_pixel: usize) -> Result<VideoFrames> {
        let buffer = if samples_per_pixel == 1 {
            self.promote_grayscale()?
        } else {
            self
        };

        let shape = buffer.shape().to_vec();
        if shape.len() != 4 || shape[3] != 3 {
            return Err(ExportError::Shape {
                kind: "Video",
                shape,
                expected: "4 dimensions (frames, rows, cols, 3)",
            });
        }

        let frames = buffer
            .array
            .into_dimensionality::<Ix4>()
            .map_err(|_| ExportError::Shape {
                kind: "Video",
                shape,
                expected: "4 dimensions (frames, rows, cols, 3)",
            })?;
        Ok(VideoFrames {
            frames: frames.as_standard_layout().into_owned(),
        })
    }

    /// Shape the buffer as a single RGB image.
    pub fn into_image(self) -> Result<StillImage> {
        let shape = self.shape().to_vec();
        if shape.len() != 3 || shape[2] != 3 {
            return Err(ExportError::Shape {
                kind: "Image",
                shape,
                expected: "3 dimensions (rows, cols, 3)",
            });
        }

        let pixels = self
            .array
            .into_dimensionality::<Ix3>()
            .map_err(|_| ExportError::Shape {
                kind: "Image",
                shape,
                expected: "3 dimensions (rows, cols, 3)",
            })?;
        Ok(StillImage {
            pixels: pixels.as_standard_layout().into_owned(),
        })
    }
}

/// RGB video frames, `frames x rows x cols x 3`
#[derive(Debug, Clone)]
pub struct VideoFrames {
    frames: Array4<u8>,
}

impl VideoFrames {
    pub fn frame_count(&self) -> usize {
        self.frames.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.frames.shape()[1]
    }

    pub fn width(&self) -> usize {
        self.frames.shape()[2]
    }

    pub fn channels(&self) -> usize {
        self.frames.shape()[3]
    }

    /// One frame as `rows x cols x 3`
    pub fn frame(&self, index: usize) -> ArrayView3<'_, u8> {
        self.frames.index_axis(Axis(0), index)
    }
}

/// A single RGB image, `rows x cols x 3`
#[derive(Debug, Clone)]
pub struct StillImage {
    pixels: Array3<u8>,
}

impl StillImage {
    pub fn height(&self) -> usize {
        self.pixels.shape()[0]
    }

    pub fn width(&self) -> usize {
        self.pixels.shape()[1]
    }

    /// Interleaved RGB bytes in row-major order
    pub fn to_bytes(&self) -> Cow<'_, [u8]> {
        match self.pixels.as_slice() {
            Some(bytes) => Cow::Borrowed(bytes),
            None => Cow::Owned(self.pixels.iter().copied().collect()),
        }
    }
}
