//! Synthetic prelinked-kernel builders shared by the test modules

use kextract_macho::records::{
    HEADER_SIZE, LC_SEGMENT, LC_UUID, MH_KEXT_BUNDLE, MH_MAGIC, SECTION_SIZE,
    SEGMENT_COMMAND_SIZE, UUID_COMMAND_SIZE,
};

pub const MH_EXECUTE: u32 = 0x2;

pub struct SyntheticCache {
    pub data: Vec<u8>,
    pub kext_offsets: Vec<usize>,
}

pub fn header_bytes(filetype: u32, ncmds: u32, sizeofcmds: u32) -> Vec<u8> {
    let mut out = Vec::new();
    for field in [MH_MAGIC, 12, 9, filetype, ncmds, sizeofcmds, 0] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out
}

fn name16(name: &[u8]) -> [u8; 16] {
    let mut out = [0u8; 16];
    out[..name.len()].copy_from_slice(name);
    out
}

/// A complete single-command image: header plus one LC_UUID.
pub fn minimal_image(filetype: u32, uuid: [u8; 16]) -> Vec<u8> {
    let mut out = header_bytes(filetype, 1, UUID_COMMAND_SIZE as u32);
    out.extend_from_slice(&LC_UUID.to_le_bytes());
    out.extend_from_slice(&(UUID_COMMAND_SIZE as u32).to_le_bytes());
    out.extend_from_slice(&uuid);
    out
}

pub fn kext_image(uuid: [u8; 16]) -> Vec<u8> {
    minimal_image(MH_KEXT_BUNDLE, uuid)
}

/// Top-level executable image holding the given pre-encoded load commands.
pub fn top_level_image(commands: &[Vec<u8>]) -> Vec<u8> {
    let total: usize = commands.iter().map(Vec::len).sum();
    let mut out = header_bytes(MH_EXECUTE, commands.len() as u32, total as u32);
    for command in commands {
        out.extend_from_slice(command);
    }
    out
}

pub fn segment_cmd(name: &[u8], fileoff: u32, filesize: u32, sections: &[Vec<u8>]) -> Vec<u8> {
    let cmdsize = SEGMENT_COMMAND_SIZE + sections.len() * SECTION_SIZE;
    let mut out = Vec::new();
    out.extend_from_slice(&LC_SEGMENT.to_le_bytes());
    out.extend_from_slice(&(cmdsize as u32).to_le_bytes());
    out.extend_from_slice(&name16(name));
    for field in [0, filesize, fileoff, filesize, 3, 3] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out.extend_from_slice(&(sections.len() as u32).to_le_bytes());
    out.extend_from_slice(&0u32.to_le_bytes());
    for section in sections {
        out.extend_from_slice(section);
    }
    out
}

pub fn section_entry(name: &[u8], segname: &[u8], offset: u32, size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&name16(name));
    out.extend_from_slice(&name16(segname));
    for field in [0, size, offset, 0, 0, 0, 0, 0, 0] {
        out.extend_from_slice(&field.to_le_bytes());
    }
    out
}

fn align16(n: usize) -> usize {
    (n + 15) & !15
}

/// Builds a full synthetic prelinked kernel.
///
/// Each kext is followed by `gaps[i]` zero bytes inside the prelink-text
/// region; `plist` becomes the `__info` section payload, with the format's
/// trailing sentinel byte appended. The text region is placed last in the
/// buffer so tests can exercise truncation at its tail.
pub fn prelinked_kernel(kexts: &[Vec<u8>], gaps: &[usize], plist: &[u8]) -> SyntheticCache {
    assert_eq!(kexts.len(), gaps.len());

    let mut region = Vec::new();
    let mut rel_offsets = Vec::new();
    for (kext, gap) in kexts.iter().zip(gaps) {
        rel_offsets.push(region.len());
        region.extend_from_slice(kext);
        region.resize(region.len() + gap, 0);
    }

    let cmds_len = 2 * SEGMENT_COMMAND_SIZE + SECTION_SIZE;
    let info_off = align16(HEADER_SIZE + cmds_len);
    let info_len = plist.len() + 1;
    let text_off = align16(info_off + info_len);

    let info_section = section_entry(
        b"__info",
        b"__PRELINK_INFO",
        info_off as u32,
        info_len as u32,
    );
    let info_segment = segment_cmd(
        b"__PRELINK_INFO",
        info_off as u32,
        info_len as u32,
        &[info_section],
    );
    let text_segment = segment_cmd(b"__PRELINK_TEXT", text_off as u32, region.len() as u32, &[]);

    let mut data = header_bytes(MH_EXECUTE, 2, cmds_len as u32);
    data.extend_from_slice(&text_segment);
    data.extend_from_slice(&info_segment);
    data.resize(info_off, 0);
    data.extend_from_slice(plist);
    data.push(0); // sentinel byte, not part of the plist payload
    data.resize(text_off, 0);
    data.extend_from_slice(&region);

    SyntheticCache {
        data,
        kext_offsets: rel_offsets.into_iter().map(|r| text_off + r).collect(),
    }
}

/// XML prelink-info plist wrapping the given kext dictionaries.
pub fn prelink_info_plist(entries: &[&str]) -> Vec<u8> {
    let mut body = String::new();
    for entry in entries {
        body.push_str(entry);
    }
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<plist version="1.0">
<dict>
  <key>_PrelinkInfoDictionary</key>
  <array>{body}</array>
</dict>
</plist>"#
    )
    .into_bytes()
}

pub fn bundle_path_entry(path: &str) -> String {
    format!("<dict><key>_PrelinkBundlePath</key><string>{path}</string></dict>")
}
