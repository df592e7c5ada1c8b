//! Attribute extraction
//!
//! Turns the data set of a study into a flat name -> text mapping. Names are
//! the dictionary keywords rendered as words (`NumberOfFrames` becomes
//! `Number of Frames`).

use std::collections::BTreeMap;

use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::{Tag, VR};
use dicom_dictionary_std::StandardDataDictionary;
use dicom_object::InMemDicomObject;

pub const NUMBER_OF_FRAMES: &str = "Number of Frames";
pub const SAMPLES_PER_PIXEL: &str = "Samples per Pixel";
pub const RECOMMENDED_FRAME_RATE: &str = "Recommended Display Frame Rate";

/// Value representations that are never rendered: sequences and bulk binary
/// data are not text and are often megabytes long.
const EXCLUDED_VRS: [VR; 3] = [VR::SQ, VR::OB, VR::OW];

/// Words kept lower case when they are not the first word of a name
const MINOR_WORDS: [&str; 12] = [
    "a", "an", "and", "at", "by", "for", "from", "in", "of", "on", "per", "to",
];

/// Extract the text-renderable attributes of a data set.
pub fn extract_attributes(object: &InMemDicomObject) -> BTreeMap<String, String> {
    let mut attributes = BTreeMap::new();

    for element in object.iter() {
        if EXCLUDED_VRS.contains(&element.vr()) {
            continue;
        }

        let tag = element.header().tag;
        match element.to_str() {
            Ok(value) => {
                attributes.insert(attribute_name(tag), value.trim_end().to_string());
            }
            Err(e) => {
                tracing::debug!("Skipping attribute {}: {}", attribute_name(tag), e);
            }
        }
    }

    attributes
}

/// Display name for a tag, or `(GGGG,EEEE)` for tags outside the dictionary.
pub fn attribute_name(tag: Tag) -> String {
    match StandardDataDictionary.by_tag(tag) {
        Some(entry) => keyword_to_words(entry.alias()),
        None => format!("({:04X},{:04X})", tag.group(), tag.element()),
    }
}

/// `SamplesPerPixel` -> `Samples per Pixel`, `SOPClassUID` -> `SOP Class UID`
pub fn keyword_to_words(keyword: &str) -> String {
    let chars: Vec<char> = keyword.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if i > 0 && c.is_ascii_uppercase() {
            let prev = chars[i - 1];
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_ascii_lowercase());
            let boundary = prev.is_ascii_lowercase()
                || prev.is_ascii_digit()
                || (prev.is_ascii_uppercase() && next_is_lower);
            if boundary && !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .enumerate()
        .map(|(i, word)| {
            let lower = word.to_ascii_lowercase();
            if i > 0 && MINOR_WORDS.contains(&lower.as_str()) {
                lower
            } else {
                word.clone()
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
