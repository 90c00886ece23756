//! Prelinked-kernel analysis
//!
//! Layers kext discovery and prelink-info resolution on top of the
//! `kextract-macho` decoder: find the prelink segments of a kernelcache,
//! scan for embedded kext images, and cross-reference them with the
//! property-list metadata naming them.

pub mod error;
pub mod prelink;
pub mod report;
pub mod scanner;

#[cfg(test)]
pub(crate) mod testutil;

pub use error::{Error, Result};
pub use report::{KernelcacheReport, KextSummary};
pub use scanner::{scan_kexts, KextRecord};

use kextract_macho::MachImage;
use tracing::debug;

/// Segment holding the embedded kext images.
pub const SEG_PRELINK_TEXT: &str = "__PRELINK_TEXT";
/// Segment holding the prelink description metadata.
pub const SEG_PRELINK_INFO: &str = "__PRELINK_INFO";
/// Section of [`SEG_PRELINK_INFO`] carrying the plist text.
pub const SECT_PRELINK_INFO: &str = "__info";
/// Plist key wrapping the kext descriptor array.
pub const PRELINK_INFO_DICTIONARY_KEY: &str = "_PrelinkInfoDictionary";
/// Plist key holding a kext's bundle path.
pub const PRELINK_BUNDLE_PATH_KEY: &str = "_PrelinkBundlePath";

/// Parses the top-level image of a kernelcache buffer.
pub fn load(data: &[u8]) -> Result<MachImage> {
    Ok(MachImage::parse(data, 0)?)
}

/// Full pipeline: parse the top-level image, scan the prelink text for
/// kexts, resolve the prelink info, and derive the kext display names.
pub fn list_kext_names(data: &[u8]) -> Result<Vec<String>> {
    let image = load(data)?;
    let kexts = scanner::scan_kexts(data, &image)?;
    debug!(kexts = kexts.len(), "kext scan finished, resolving names");
    prelink::kext_names(data, &image)
}
