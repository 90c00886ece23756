//! Embedded kext discovery by magic-signature scanning

use crate::error::{Error, Result};
use crate::SEG_PRELINK_TEXT;
use kextract_macho::records::{MH_KEXT_BUNDLE, MH_MAGIC_BYTES};
use kextract_macho::{MachImage, ParseError};
use tracing::{debug, info};

/// One embedded kext image, keyed by the absolute byte offset at which its
/// header was found. Records are ordered by scan order (ascending offset).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KextRecord {
    pub offset: usize,
    pub image: MachImage,
}

/// Scans the prelink-text segment of `image` for embedded kext images.
///
/// The scan matches the raw on-disk magic byte pattern at every byte
/// position, so coincidental matches are expected; candidates whose nested
/// parse fails are dropped as false positives. A candidate that parses
/// cleanly but is not a kext bundle means the scan assumptions are wrong
/// and is a hard error.
pub fn scan_kexts(data: &[u8], image: &MachImage) -> Result<Vec<KextRecord>> {
    let segment = image
        .find_segment(SEG_PRELINK_TEXT.as_bytes())
        .ok_or(Error::SegmentNotFound(SEG_PRELINK_TEXT))?;

    let (start, end) = segment.file_range();
    let region = data.get(start..end).ok_or(Error::Parse(ParseError::TruncatedInput {
        expected: segment.filesize as usize,
        actual: data.len().saturating_sub(start),
    }))?;

    let pattern: &[u8] = &MH_MAGIC_BYTES;
    let mut kexts = Vec::new();
    for (pos, window) in region.windows(pattern.len()).enumerate() {
        if window != pattern {
            continue;
        }
        let offset = start + pos;
        match MachImage::parse(data, offset) {
            Ok(image) => {
                if image.header.filetype != MH_KEXT_BUNDLE {
                    return Err(Error::UnexpectedImageType {
                        offset,
                        filetype: image.header.filetype,
                    });
                }
                debug!(offset, "kext image found");
                kexts.push(KextRecord { offset, image });
            }
            Err(err) => debug!(offset, %err, "magic match is not an image"),
        }
    }

    info!(count = kexts.len(), "prelink text scan complete");
    Ok(kexts)
}
