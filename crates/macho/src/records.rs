//! Fixed-layout Mach-O records and format constants
//!
//! All records are 32-bit little-endian variants; the 64-bit header family
//! is out of scope for kernelcache work. Name fields stay raw byte arrays,
//! trailing-NUL stripping happens in the `name()` accessors.

use crate::error::{ParseError, ParseResult};
use crate::reader::BinaryReader;
use bitflags::bitflags;

/// Mach-O magic for 32-bit images, as decoded from the buffer.
pub const MH_MAGIC: u32 = 0xfeedface;
/// Raw on-disk byte pattern of [`MH_MAGIC`], used for signature scanning.
pub const MH_MAGIC_BYTES: [u8; 4] = MH_MAGIC.to_le_bytes();

/// Kernel-extension bundle file type.
pub const MH_KEXT_BUNDLE: u32 = 0xb;

pub const HEADER_SIZE: usize = 28;
/// Generic (cmd, cmdsize) prefix carried by every load command.
pub const LOAD_COMMAND_SIZE: usize = 8;
pub const SEGMENT_COMMAND_SIZE: usize = 56;
pub const SECTION_SIZE: usize = 68;
pub const SYMTAB_COMMAND_SIZE: usize = 24;
pub const NLIST_SIZE: usize = 12;
pub const UUID_COMMAND_SIZE: usize = 24;
pub const KMOD_INFO_SIZE: usize = 168;

/// Load command tags the dispatcher decodes.
pub const LC_SEGMENT: u32 = 0x1;
pub const LC_SYMTAB: u32 = 0x2;
pub const LC_THREAD: u32 = 0x4;
pub const LC_UNIXTHREAD: u32 = 0x5;
pub const LC_DYSYMTAB: u32 = 0xb;
pub const LC_UUID: u32 = 0x1b;
pub const LC_CODE_SIGNATURE: u32 = 0x1d;
pub const LC_SEGMENT_SPLIT_INFO: u32 = 0x1e;
pub const LC_VERSION_MIN_MACOSX: u32 = 0x24;
pub const LC_VERSION_MIN_IPHONEOS: u32 = 0x25;
pub const LC_FUNCTION_STARTS: u32 = 0x26;
pub const LC_DATA_IN_CODE: u32 = 0x29;
pub const LC_SOURCE_VERSION: u32 = 0x2a;
pub const LC_DYLIB_CODE_SIGN_DRS: u32 = 0x2b;

/// Symbol naming the kmod_info record inside a kext's data segment.
pub const KMOD_INFO_SYMBOL: &[u8] = b"_kmod_info";

/// Mach-O file types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    Object,
    Execute,
    Fvmlib,
    Core,
    Preload,
    Dylib,
    Dylinker,
    Bundle,
    DylibStub,
    Dsym,
    KextBundle,
}

impl FileType {
    pub fn from_u32(value: u32) -> Option<Self> {
        match value {
            0x1 => Some(Self::Object),
            0x2 => Some(Self::Execute),
            0x3 => Some(Self::Fvmlib),
            0x4 => Some(Self::Core),
            0x5 => Some(Self::Preload),
            0x6 => Some(Self::Dylib),
            0x7 => Some(Self::Dylinker),
            0x8 => Some(Self::Bundle),
            0x9 => Some(Self::DylibStub),
            0xa => Some(Self::Dsym),
            MH_KEXT_BUNDLE => Some(Self::KextBundle),
            _ => None,
        }
    }
}

bitflags! {
    /// Segment memory protection bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct VmProt: u32 {
        const READ = 0x1;
        const WRITE = 0x2;
        const EXECUTE = 0x4;
    }
}

/// Strip the trailing NUL padding of a fixed-size name field.
pub(crate) fn trim_padding(name: &[u8]) -> &[u8] {
    let end = name
        .iter()
        .rposition(|&b| b != 0)
        .map(|i| i + 1)
        .unwrap_or(0);
    &name[..end]
}

/// 28-byte Mach-O header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachHeader {
    pub magic: u32,
    pub cputype: u32,
    pub cpusubtype: u32,
    pub filetype: u32,
    pub ncmds: u32,
    pub sizeofcmds: u32,
    pub flags: u32,
}

impl MachHeader {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        let magic = r.read_u32()?;
        if magic != MH_MAGIC {
            return Err(ParseError::BadMagic { expected: MH_MAGIC, actual: magic });
        }
        Ok(Self {
            magic,
            cputype: r.read_u32()?,
            cpusubtype: r.read_u32()?,
            filetype: r.read_u32()?,
            ncmds: r.read_u32()?,
            sizeofcmds: r.read_u32()?,
            flags: r.read_u32()?,
        })
    }

    pub fn file_type(&self) -> Option<FileType> {
        FileType::from_u32(self.filetype)
    }
}

/// LC_SEGMENT: a mapped region plus its declared sections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SegmentCommand {
    pub segname: [u8; 16],
    pub vmaddr: u32,
    pub vmsize: u32,
    pub fileoff: u32,
    pub filesize: u32,
    pub maxprot: u32,
    pub initprot: u32,
    pub nsects: u32,
    pub flags: u32,
    pub sections: Vec<Section>,
}

impl SegmentCommand {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        let mut segment = Self {
            segname: r.read_array()?,
            vmaddr: r.read_u32()?,
            vmsize: r.read_u32()?,
            fileoff: r.read_u32()?,
            filesize: r.read_u32()?,
            maxprot: r.read_u32()?,
            initprot: r.read_u32()?,
            nsects: r.read_u32()?,
            flags: r.read_u32()?,
            sections: Vec::new(),
        };
        for _ in 0..segment.nsects {
            segment.sections.push(Section::parse(r)?);
        }
        Ok(segment)
    }

    /// Segment name with NUL padding stripped.
    pub fn name(&self) -> &[u8] {
        trim_padding(&self.segname)
    }

    pub fn initprot_flags(&self) -> VmProt {
        VmProt::from_bits_truncate(self.initprot)
    }

    /// File byte range covered by this segment.
    pub fn file_range(&self) -> (usize, usize) {
        (self.fileoff as usize, self.fileoff as usize + self.filesize as usize)
    }
}

/// 68-byte section record, owned by its segment in declaration order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub sectname: [u8; 16],
    pub segname: [u8; 16],
    pub addr: u32,
    pub size: u32,
    pub offset: u32,
    pub align: u32,
    pub reloff: u32,
    pub nreloc: u32,
    pub flags: u32,
    pub reserved1: u32,
    pub reserved2: u32,
}

impl Section {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self {
            sectname: r.read_array()?,
            segname: r.read_array()?,
            addr: r.read_u32()?,
            size: r.read_u32()?,
            offset: r.read_u32()?,
            align: r.read_u32()?,
            reloff: r.read_u32()?,
            nreloc: r.read_u32()?,
            flags: r.read_u32()?,
            reserved1: r.read_u32()?,
            reserved2: r.read_u32()?,
        })
    }

    pub fn name(&self) -> &[u8] {
        trim_padding(&self.sectname)
    }
}

/// LC_SYMTAB fixed fields; `symbols` is resolved by the image parser's
/// detour to `symoff`/`stroff`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymtabCommand {
    pub symoff: u32,
    pub nsyms: u32,
    pub stroff: u32,
    pub strsize: u32,
    pub symbols: Vec<Symbol>,
}

impl SymtabCommand {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self {
            symoff: r.read_u32()?,
            nsyms: r.read_u32()?,
            stroff: r.read_u32()?,
            strsize: r.read_u32()?,
            symbols: Vec::new(),
        })
    }
}

/// One resolved symbol: the i-th string-pool name paired with the i-th
/// nlist record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Symbol {
    pub name: Vec<u8>,
    pub nlist: Nlist,
}

/// 12-byte nlist record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nlist {
    pub n_strx: u32,
    pub n_type: u8,
    pub n_sect: u8,
    pub n_desc: u16,
    pub n_value: u32,
}

impl Nlist {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self {
            n_strx: r.read_u32()?,
            n_type: r.read_u8()?,
            n_sect: r.read_u8()?,
            n_desc: r.read_u16()?,
            n_value: r.read_u32()?,
        })
    }
}

/// LC_UUID
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidCommand {
    pub uuid: [u8; 16],
}

impl UuidCommand {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self { uuid: r.read_array()? })
    }
}

/// LC_THREAD / LC_UNIXTHREAD. The only command whose total size is not a
/// compile-time constant: the raw state length comes from `cmdsize` and
/// must agree with the declared register-word count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadCommand {
    pub cmd: u32,
    pub flavor: u32,
    pub count: u32,
    pub state: Vec<u8>,
}

impl ThreadCommand {
    pub fn parse(r: &mut BinaryReader, cmd: u32, cmdsize: u32) -> ParseResult<Self> {
        let flavor = r.read_u32()?;
        let count = r.read_u32()?;
        let state_len = (cmdsize as usize).saturating_sub(LOAD_COMMAND_SIZE + 8);
        let state = r.read_bytes(state_len)?.to_vec();
        if state.len() != count as usize * 4 {
            return Err(ParseError::InconsistentThreadState { count, len: state.len() });
        }
        Ok(Self { cmd, flavor, count, state })
    }
}

/// LC_DYSYMTAB
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DysymtabCommand {
    pub ilocalsym: u32,
    pub nlocalsym: u32,
    pub iextdefsym: u32,
    pub nextdefsym: u32,
    pub iundefsym: u32,
    pub nundefsym: u32,
    pub tocoff: u32,
    pub ntoc: u32,
    pub modtaboff: u32,
    pub nmodtab: u32,
    pub extrefsymoff: u32,
    pub nextrefsyms: u32,
    pub indirectsymoff: u32,
    pub nindirectsyms: u32,
    pub extreloff: u32,
    pub nextrel: u32,
    pub locreloff: u32,
    pub nlocrel: u32,
}

impl DysymtabCommand {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self {
            ilocalsym: r.read_u32()?,
            nlocalsym: r.read_u32()?,
            iextdefsym: r.read_u32()?,
            nextdefsym: r.read_u32()?,
            iundefsym: r.read_u32()?,
            nundefsym: r.read_u32()?,
            tocoff: r.read_u32()?,
            ntoc: r.read_u32()?,
            modtaboff: r.read_u32()?,
            nmodtab: r.read_u32()?,
            extrefsymoff: r.read_u32()?,
            nextrefsyms: r.read_u32()?,
            indirectsymoff: r.read_u32()?,
            nindirectsyms: r.read_u32()?,
            extreloff: r.read_u32()?,
            nextrel: r.read_u32()?,
            locreloff: r.read_u32()?,
            nlocrel: r.read_u32()?,
        })
    }
}

/// LC_VERSION_MIN_MACOSX / LC_VERSION_MIN_IPHONEOS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VersionMinCommand {
    pub cmd: u32,
    pub version: u32,
    pub sdk: u32,
}

impl VersionMinCommand {
    pub fn parse(r: &mut BinaryReader, cmd: u32) -> ParseResult<Self> {
        Ok(Self { cmd, version: r.read_u32()?, sdk: r.read_u32()? })
    }
}

/// LC_SOURCE_VERSION
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceVersionCommand {
    pub version: u64,
}

impl SourceVersionCommand {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self { version: r.read_u64()? })
    }
}

/// LC_CODE_SIGNATURE, LC_SEGMENT_SPLIT_INFO, LC_FUNCTION_STARTS,
/// LC_DATA_IN_CODE, LC_DYLIB_CODE_SIGN_DRS
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkeditDataCommand {
    pub cmd: u32,
    pub dataoff: u32,
    pub datasize: u32,
}

impl LinkeditDataCommand {
    pub fn parse(r: &mut BinaryReader, cmd: u32) -> ParseResult<Self> {
        Ok(Self { cmd, dataoff: r.read_u32()?, datasize: r.read_u32()? })
    }
}

/// kmod_info record embedded in a kext's data segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KmodInfo {
    pub next: u32,
    pub info_version: i32,
    pub id: i32,
    pub name: [u8; 64],
    pub version: [u8; 64],
    pub reference_count: i32,
    pub reference_list: u32,
    pub address: u32,
    pub size: u32,
    pub hdr_size: u32,
    pub start: u32,
    pub stop: u32,
}

impl KmodInfo {
    pub fn parse(r: &mut BinaryReader) -> ParseResult<Self> {
        Ok(Self {
            next: r.read_u32()?,
            info_version: r.read_i32()?,
            id: r.read_i32()?,
            name: r.read_array()?,
            version: r.read_array()?,
            reference_count: r.read_i32()?,
            reference_list: r.read_u32()?,
            address: r.read_u32()?,
            size: r.read_u32()?,
            hdr_size: r.read_u32()?,
            start: r.read_u32()?,
            stop: r.read_u32()?,
        })
    }

    pub fn name(&self) -> &[u8] {
        trim_padding(&self.name)
    }

    pub fn version(&self) -> &[u8] {
        trim_padding(&self.version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_rejects_wrong_magic() {
        let mut data = vec![0u8; HEADER_SIZE];
        data[0..4].copy_from_slice(&0xdeadbeefu32.to_le_bytes());
        let mut r = BinaryReader::new(&data);
        let err = MachHeader::parse(&mut r).unwrap_err();
        assert!(matches!(err, ParseError::BadMagic { actual: 0xdeadbeef, .. }));
    }

    #[test]
    fn test_header_layout() {
        let mut data = Vec::new();
        for field in [MH_MAGIC, 12, 9, MH_KEXT_BUNDLE, 3, 180, 0x1] {
            data.extend_from_slice(&field.to_le_bytes());
        }
        let mut r = BinaryReader::new(&data);
        let header = MachHeader::parse(&mut r).unwrap();
        assert_eq!(header.cputype, 12);
        assert_eq!(header.ncmds, 3);
        assert_eq!(header.sizeofcmds, 180);
        assert_eq!(header.file_type(), Some(FileType::KextBundle));
        assert_eq!(r.offset(), HEADER_SIZE);
    }

    #[test]
    fn test_trim_padding() {
        assert_eq!(trim_padding(b"__TEXT\0\0\0\0\0\0\0\0\0\0"), b"__TEXT");
        assert_eq!(trim_padding(&[0u8; 16]), b"");
        assert_eq!(trim_padding(b"0123456789abcdef"), b"0123456789abcdef");
    }

    #[test]
    fn test_thread_state_length_mismatch() {
        let mut data = Vec::new();
        data.extend_from_slice(&1u32.to_le_bytes()); // flavor
        data.extend_from_slice(&17u32.to_le_bytes()); // count
        data.extend_from_slice(&[0u8; 64]); // only 16 words of state
        let mut r = BinaryReader::new(&data);
        let err = ThreadCommand::parse(&mut r, LC_UNIXTHREAD, 80).unwrap_err();
        assert!(matches!(
            err,
            ParseError::InconsistentThreadState { count: 17, len: 64 }
        ));
    }

    #[test]
    fn test_kmod_info_layout() {
        let mut data = Vec::new();
        data.extend_from_slice(&0u32.to_le_bytes()); // next
        data.extend_from_slice(&1i32.to_le_bytes()); // info_version
        data.extend_from_slice(&(-1i32).to_le_bytes()); // id
        let mut name = [0u8; 64];
        name[..15].copy_from_slice(b"com.example.kex");
        data.extend_from_slice(&name);
        let mut version = [0u8; 64];
        version[..3].copy_from_slice(b"1.0");
        data.extend_from_slice(&version);
        data.extend_from_slice(&1i32.to_le_bytes()); // reference_count
        for field in [0u32, 0x1000, 0x2000, 0x1000, 0, 0] {
            data.extend_from_slice(&field.to_le_bytes());
        }
        assert_eq!(data.len(), KMOD_INFO_SIZE);

        let mut r = BinaryReader::new(&data);
        let kmod = KmodInfo::parse(&mut r).unwrap();
        assert_eq!(kmod.name(), b"com.example.kex");
        assert_eq!(kmod.version(), b"1.0");
        assert_eq!(kmod.id, -1);
        assert_eq!(kmod.address, 0x1000);
        assert_eq!(r.offset(), KMOD_INFO_SIZE);
    }
}
