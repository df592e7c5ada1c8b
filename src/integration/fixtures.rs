//! Test fixtures for integration tests
//!
//! Builds small synthetic studies, written as real DICOM files so the whole
//! decode path is exercised. Pixel data is native unless the fixture asks for
//! a JPEG baseline frame.

use std::path::Path;

use dicom_core::value::PixelFragmentSequence;
use dicom_core::{DataElement, PrimitiveValue, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;

/// Description of a synthetic study
#[derive(Debug, Clone)]
pub struct StudyFixture {
    pub rows: u16,
    pub columns: u16,
    pub frames: u32,
    pub samples_per_pixel: u16,
    pub bits_allocated: u16,
    pub photometric: &'static str,
    pub frame_rate: Option<&'static str>,
    pub instance_uid: String,
    /// Solid colour compressed as one JPEG baseline frame
    pub jpeg_fill: Option<[u8; 3]>,
}

impl StudyFixture {
    /// Multi-frame 8-bit MONOCHROME2 cine loop
    pub fn grayscale_cine(frames: u32, rows: u16, columns: u16) -> Self {
        Self {
            rows,
            columns,
            frames,
            samples_per_pixel: 1,
            bits_allocated: 8,
            photometric: "MONOCHROME2",
            frame_rate: None,
            instance_uid: "1.2.826.0.1.3680043.2.1125.1.1".to_string(),
            jpeg_fill: None,
        }
    }

    /// Single-frame 8-bit RGB image
    pub fn rgb_still(rows: u16, columns: u16) -> Self {
        Self {
            rows,
            columns,
            frames: 1,
            samples_per_pixel: 3,
            bits_allocated: 8,
            photometric: "RGB",
            frame_rate: None,
            instance_uid: "1.2.826.0.1.3680043.2.1125.1.2".to_string(),
            jpeg_fill: None,
        }
    }

    /// Single-frame JPEG baseline still of one colour, labelled YBR_FULL_422
    /// the way ultrasound scanners store compressed colour.
    pub fn jpeg_still(rows: u16, columns: u16, fill: [u8; 3]) -> Self {
        Self {
            photometric: "YBR_FULL_422",
            instance_uid: "1.2.826.0.1.3680043.2.1125.1.4".to_string(),
            jpeg_fill: Some(fill),
            ..Self::rgb_still(rows, columns)
        }
    }

    /// Single-frame grayscale image; cannot become a still image
    pub fn grayscale_still(rows: u16, columns: u16) -> Self {
        Self {
            frames: 1,
            instance_uid: "1.2.826.0.1.3680043.2.1125.1.3".to_string(),
            ..Self::grayscale_cine(1, rows, columns)
        }
    }

    pub fn with_bits(mut self, bits_allocated: u16) -> Self {
        self.bits_allocated = bits_allocated;
        self
    }

    pub fn with_frame_rate(mut self, fps: &'static str) -> Self {
        self.frame_rate = Some(fps);
        self
    }

    pub fn with_instance(mut self, suffix: usize) -> Self {
        self.instance_uid = format!("{}.{}", self.instance_uid, suffix);
        self
    }

    fn sample_count(&self) -> usize {
        self.frames as usize
            * self.rows as usize
            * self.columns as usize
            * self.samples_per_pixel as usize
    }

    /// Deterministic ramp covering the full sample range
    fn pixel_data(&self) -> PrimitiveValue {
        let count = self.sample_count();
        match self.bits_allocated {
            16 => PrimitiveValue::U16((0..count).map(|i| (i * 7 % 4096) as u16).collect()),
            _ => PrimitiveValue::U8((0..count).map(|i| (i % 256) as u8).collect()),
        }
    }

    fn elements(&self) -> Vec<DataElement<InMemDicomObject>> {
        let mut elements = vec![
            DataElement::new(
                tags::SOP_CLASS_UID,
                VR::UI,
                PrimitiveValue::from(uids::SECONDARY_CAPTURE_IMAGE_STORAGE),
            ),
            DataElement::new(
                tags::SOP_INSTANCE_UID,
                VR::UI,
                PrimitiveValue::from(self.instance_uid.as_str()),
            ),
            DataElement::new(tags::PATIENT_NAME, VR::PN, PrimitiveValue::from("Doe^Jane")),
            DataElement::new(tags::PATIENT_ID, VR::LO, PrimitiveValue::from("PAT001")),
            DataElement::new(tags::MODALITY, VR::CS, PrimitiveValue::from("US")),
            DataElement::new(
                tags::SAMPLES_PER_PIXEL,
                VR::US,
                PrimitiveValue::from(self.samples_per_pixel),
            ),
            DataElement::new(
                tags::PHOTOMETRIC_INTERPRETATION,
                VR::CS,
                PrimitiveValue::from(self.photometric),
            ),
            DataElement::new(tags::ROWS, VR::US, PrimitiveValue::from(self.rows)),
            DataElement::new(tags::COLUMNS, VR::US, PrimitiveValue::from(self.columns)),
            DataElement::new(
                tags::BITS_ALLOCATED,
                VR::US,
                PrimitiveValue::from(self.bits_allocated),
            ),
            DataElement::new(
                tags::BITS_STORED,
                VR::US,
                PrimitiveValue::from(self.bits_allocated),
            ),
            DataElement::new(
                tags::HIGH_BIT,
                VR::US,
                PrimitiveValue::from(self.bits_allocated - 1),
            ),
            DataElement::new(tags::PIXEL_REPRESENTATION, VR::US, PrimitiveValue::from(0_u16)),
        ];

        if self.samples_per_pixel > 1 {
            elements.push(DataElement::new(
                tags::PLANAR_CONFIGURATION,
                VR::US,
                PrimitiveValue::from(0_u16),
            ));
        }
        if self.frames > 1 {
            elements.push(DataElement::new(
                tags::NUMBER_OF_FRAMES,
                VR::IS,
                PrimitiveValue::from(self.frames.to_string()),
            ));
        }
        if let Some(fps) = self.frame_rate {
            elements.push(DataElement::new(
                tags::RECOMMENDED_DISPLAY_FRAME_RATE,
                VR::IS,
                PrimitiveValue::from(fps),
            ));
        }

        match self.jpeg_fill {
            Some(fill) => elements.push(DataElement::new(
                tags::PIXEL_DATA,
                VR::OB,
                PixelFragmentSequence::new_fragments(vec![self.jpeg_frame(fill)]),
            )),
            None => {
                let pixel_vr = if self.bits_allocated == 16 { VR::OW } else { VR::OB };
                elements.push(DataElement::new(tags::PIXEL_DATA, pixel_vr, self.pixel_data()));
            }
        }
        elements
    }

    /// One JFIF frame (YCbCr, chroma subsampled) of the fill colour
    fn jpeg_frame(&self, fill: [u8; 3]) -> Vec<u8> {
        let rgb: Vec<u8> = fill
            .iter()
            .copied()
            .cycle()
            .take(self.rows as usize * self.columns as usize * 3)
            .collect();

        let mut bytes = Vec::new();
        JpegEncoder::new_with_quality(&mut bytes, 100)
            .encode(
                &rgb,
                self.columns as u32,
                self.rows as u32,
                ExtendedColorType::Rgb8,
            )
            .expect("encode fixture JPEG");
        // Fragments have even length
        if bytes.len() % 2 == 1 {
            bytes.push(0);
        }
        bytes
    }

    fn transfer_syntax(&self) -> &'static str {
        if self.jpeg_fill.is_some() {
            uids::JPEG_BASELINE8_BIT
        } else {
            uids::EXPLICIT_VR_LITTLE_ENDIAN
        }
    }

    /// Write the study as a DICOM file.
    pub fn write(&self, path: &Path) {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("create fixture directory");
        }

        let object = InMemDicomObject::from_element_iter(self.elements());
        let file = object
            .with_meta(
                FileMetaTableBuilder::new()
                    .transfer_syntax(self.transfer_syntax())
                    .media_storage_sop_class_uid(uids::SECONDARY_CAPTURE_IMAGE_STORAGE)
                    .media_storage_sop_instance_uid(self.instance_uid.as_str()),
            )
            .expect("build file meta group");
        file.write_to_file(path).expect("write fixture study");
    }
}

/// Write a file that is not a DICOM study at all.
pub fn write_junk(path: &Path) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).expect("create fixture directory");
    }
    std::fs::write(path, b"this is a text file, not a study\n").expect("write junk file");
}
