//! Serializable summaries of a scanned kernelcache

use crate::error::Result;
use crate::{prelink, scanner};
use serde::Serialize;

/// Everything the pipeline knows about one kernelcache buffer.
#[derive(Debug, Serialize)]
pub struct KernelcacheReport {
    pub kext_count: usize,
    pub names: Vec<String>,
    pub kexts: Vec<KextSummary>,
}

/// One discovered kext, enriched with its kmod_info identity when the
/// record can be located.
#[derive(Debug, Serialize)]
pub struct KextSummary {
    pub offset: usize,
    pub identifier: Option<String>,
    pub version: Option<String>,
}

/// Runs the full pipeline and folds the results into one report.
pub fn build_report(data: &[u8]) -> Result<KernelcacheReport> {
    let image = crate::load(data)?;
    let kexts = scanner::scan_kexts(data, &image)?;
    let names = prelink::kext_names(data, &image)?;

    let summaries = kexts
        .iter()
        .map(|record| {
            let kmod = record.image.kmod_info(data, record.offset);
            KextSummary {
                offset: record.offset,
                identifier: kmod
                    .as_ref()
                    .map(|k| String::from_utf8_lossy(k.name()).into_owned()),
                version: kmod
                    .as_ref()
                    .map(|k| String::from_utf8_lossy(k.version()).into_owned()),
            }
        })
        .collect();

    Ok(KernelcacheReport { kext_count: kexts.len(), names, kexts: summaries })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{bundle_path_entry, kext_image, prelink_info_plist, prelinked_kernel};

    #[test]
    fn test_report_pairs_offsets_with_names() {
        let plist = prelink_info_plist(&[
            &bundle_path_entry("/System/Library/Extensions/DriverA.kext"),
            &bundle_path_entry("/System/Library/Extensions/DriverB.kext"),
        ]);
        let kexts = [kext_image([1u8; 16]), kext_image([2u8; 16])];
        let cache = prelinked_kernel(&kexts, &[4, 0], &plist);

        let report = build_report(&cache.data).unwrap();
        assert_eq!(report.kext_count, 2);
        assert_eq!(report.names, ["DriverA.kext", "DriverB.kext"]);
        assert_eq!(report.kexts[0].offset, cache.kext_offsets[0]);
        // Minimal synthetic kexts carry no kmod_info symbol.
        assert!(report.kexts[0].identifier.is_none());
    }
}
