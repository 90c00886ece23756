//! Prelink-info resolution through the `__PRELINK_INFO` property list

use crate::error::{Error, Result};
use crate::{PRELINK_BUNDLE_PATH_KEY, PRELINK_INFO_DICTIONARY_KEY, SECT_PRELINK_INFO, SEG_PRELINK_INFO};
use kextract_macho::{MachImage, ParseError};
use plist::Value;
use std::io::Cursor;
use tracing::{debug, warn};

/// Decodes the prelink-info plist and returns its kext dictionaries in
/// decoder order.
///
/// The on-disk plist roots the kext list under `_PrelinkInfoDictionary`; a
/// bare array root is accepted as well. The section payload carries one
/// trailing sentinel byte that is not part of the plist and is trimmed
/// before decoding.
pub fn prelink_descriptors(data: &[u8], image: &MachImage) -> Result<Vec<plist::Dictionary>> {
    let segment = image
        .find_segment(SEG_PRELINK_INFO.as_bytes())
        .ok_or(Error::SegmentNotFound(SEG_PRELINK_INFO))?;

    let mut matching = segment
        .sections
        .iter()
        .filter(|s| s.name() == SECT_PRELINK_INFO.as_bytes());
    let section = match (matching.next(), matching.next()) {
        (Some(section), None) => section,
        _ => return Err(Error::InfoSectionMissing),
    };

    let start = section.offset as usize;
    let len = (section.size as usize).saturating_sub(1);
    let bytes = data.get(start..start + len).ok_or(Error::Parse(ParseError::TruncatedInput {
        expected: len,
        actual: data.len().saturating_sub(start),
    }))?;

    let value = Value::from_reader(Cursor::new(bytes))?;
    let entries = match value {
        Value::Array(entries) => entries,
        Value::Dictionary(dict) => match dict.get(PRELINK_INFO_DICTIONARY_KEY).and_then(Value::as_array) {
            Some(entries) => entries.to_vec(),
            None => {
                warn!("prelink info plist holds no kext dictionary");
                Vec::new()
            }
        },
        _ => {
            warn!("prelink info plist has an unexpected root");
            Vec::new()
        }
    };

    Ok(entries
        .into_iter()
        .filter_map(|value| match value {
            Value::Dictionary(dict) => Some(dict),
            _ => None,
        })
        .collect())
}

/// Derives the kext display names: the final path component of every
/// descriptor's bundle path, in decoder order. Descriptors without a
/// bundle path are skipped.
pub fn kext_names(data: &[u8], image: &MachImage) -> Result<Vec<String>> {
    let names: Vec<String> = prelink_descriptors(data, image)?
        .iter()
        .filter_map(|dict| dict.get(PRELINK_BUNDLE_PATH_KEY))
        .filter_map(Value::as_string)
        .map(|path| match path.rsplit('/').next() {
            Some(name) => name.to_string(),
            None => path.to_string(),
        })
        .collect();
    debug!(count = names.len(), "kext names resolved");
    Ok(names)
}
