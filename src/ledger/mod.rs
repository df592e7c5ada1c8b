//! Metadata ledger
//!
//! One JSON object per line, one line per converted study. Lines are only
//! ever appended; nothing in a run reads the ledger back.

mod writer;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::Result;
use crate::study::MediaKind;

pub use writer::{LedgerHandle, LedgerWriter};

/// Keys injected next to the study attributes
pub mod keys {
    pub const DICOM_FILE: &str = "dicom_file";
    pub const MEDIA_FILE: &str = "media_file";
    pub const MEDIA_TYPE: &str = "media_type";
}

/// Ledger entry for one converted study
#[derive(Debug, Clone, PartialEq)]
pub struct MetadataRecord {
    pub attributes: BTreeMap<String, String>,
    /// Input path relative to the input root
    pub dicom_file: PathBuf,
    /// Media path relative to the media root
    pub media_file: PathBuf,
    pub media_type: MediaKind,
}

impl MetadataRecord {
    pub fn new(
        attributes: BTreeMap<String, String>,
        dicom_file: &Path,
        media_file: &Path,
        media_type: MediaKind,
    ) -> Self {
        Self {
            attributes,
            dicom_file: dicom_file.to_path_buf(),
            media_file: media_file.to_path_buf(),
            media_type,
        }
    }

    /// Serialize as a single line of JSON with sorted keys and a trailing
    /// newline. Injected keys win over attributes of the same name.
    pub fn to_json_line(&self) -> Result<String> {
        let dicom_file = self.dicom_file.to_string_lossy();
        let media_file = self.media_file.to_string_lossy();

        let mut object: BTreeMap<&str, &str> = self
            .attributes
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        object.insert(keys::DICOM_FILE, dicom_file.as_ref());
        object.insert(keys::MEDIA_FILE, media_file.as_ref());
        object.insert(keys::MEDIA_TYPE, self.media_type.as_str());

        let mut line = serde_json::to_string(&object)?;
        line.push('\n');
        Ok(line)
    }
}
