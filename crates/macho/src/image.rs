//! Image parsing: header decode and load-command dispatch

use crate::error::{ParseError, ParseResult};
use crate::reader::BinaryReader;
use crate::records::{
    DysymtabCommand, FileType, KmodInfo, LinkeditDataCommand, MachHeader, Nlist, SegmentCommand,
    SourceVersionCommand, Symbol, SymtabCommand, ThreadCommand, UuidCommand, VersionMinCommand,
    HEADER_SIZE, KMOD_INFO_SYMBOL, LC_CODE_SIGNATURE, LC_DATA_IN_CODE, LC_DYLIB_CODE_SIGN_DRS,
    LC_DYSYMTAB, LC_FUNCTION_STARTS, LC_SEGMENT, LC_SEGMENT_SPLIT_INFO, LC_SOURCE_VERSION,
    LC_SYMTAB, LC_THREAD, LC_UNIXTHREAD, LC_UUID, LC_VERSION_MIN_IPHONEOS, LC_VERSION_MIN_MACOSX,
    LOAD_COMMAND_SIZE,
};
use tracing::debug;

/// A decoded load command.
///
/// Tags without a dedicated decoder become [`LoadCommand::Unknown`]; they
/// advance the cursor by their declared size but carry no payload, so the
/// per-command bookkeeping stays checkable for every entry in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadCommand {
    Segment(SegmentCommand),
    Symtab(SymtabCommand),
    Uuid(UuidCommand),
    Thread(ThreadCommand),
    Dysymtab(DysymtabCommand),
    VersionMin(VersionMinCommand),
    SourceVersion(SourceVersionCommand),
    LinkeditData(LinkeditDataCommand),
    Unknown { cmd: u32, cmdsize: u32 },
}

/// One parsed Mach-O image: header plus its load commands in table order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachImage {
    pub header: MachHeader,
    pub commands: Vec<LoadCommand>,
}

impl MachImage {
    /// Parses the image starting at `offset` within `data`.
    ///
    /// `offset` is non-zero for images embedded inside a prelinked kernel;
    /// all file offsets carried by load commands (symbol table, kmod_info
    /// lookup) resolve relative to it.
    pub fn parse(data: &[u8], offset: usize) -> ParseResult<Self> {
        let mut r = BinaryReader::new_at(data, offset);
        let header = MachHeader::parse(&mut r)?;
        let mut commands = Vec::new();

        for _ in 0..header.ncmds {
            let cmd_start = r.offset();
            let cmd = r.read_u32()?;
            let cmdsize = r.read_u32()?;
            let expected_end = cmd_start + cmdsize as usize;

            let decoded = match cmd {
                LC_SEGMENT => LoadCommand::Segment(SegmentCommand::parse(&mut r)?),
                LC_SYMTAB => {
                    let mut symtab = SymtabCommand::parse(&mut r)?;
                    // Detour to the symbol and string pools elsewhere in the
                    // buffer; the command-table cursor is restored afterwards.
                    let resume = r.offset();
                    resolve_symbols(data, offset, &mut symtab)?;
                    r.set_offset(resume);
                    LoadCommand::Symtab(symtab)
                }
                LC_UUID => LoadCommand::Uuid(UuidCommand::parse(&mut r)?),
                LC_THREAD | LC_UNIXTHREAD => {
                    LoadCommand::Thread(ThreadCommand::parse(&mut r, cmd, cmdsize)?)
                }
                LC_DYSYMTAB => LoadCommand::Dysymtab(DysymtabCommand::parse(&mut r)?),
                LC_VERSION_MIN_MACOSX | LC_VERSION_MIN_IPHONEOS => {
                    LoadCommand::VersionMin(VersionMinCommand::parse(&mut r, cmd)?)
                }
                LC_SOURCE_VERSION => {
                    LoadCommand::SourceVersion(SourceVersionCommand::parse(&mut r)?)
                }
                LC_CODE_SIGNATURE | LC_SEGMENT_SPLIT_INFO | LC_FUNCTION_STARTS
                | LC_DATA_IN_CODE | LC_DYLIB_CODE_SIGN_DRS => {
                    LoadCommand::LinkeditData(LinkeditDataCommand::parse(&mut r, cmd)?)
                }
                _ => {
                    debug!(cmd, cmdsize, "skipping unhandled load command");
                    r.skip((cmdsize as usize).saturating_sub(LOAD_COMMAND_SIZE))?;
                    LoadCommand::Unknown { cmd, cmdsize }
                }
            };

            if r.offset() != expected_end {
                return Err(ParseError::StructuralCorruption {
                    cmd,
                    expected: expected_end,
                    actual: r.offset(),
                });
            }
            commands.push(decoded);
        }

        let consumed = r.offset() - offset - HEADER_SIZE;
        if consumed != header.sizeofcmds as usize {
            debug!(
                consumed,
                declared = header.sizeofcmds,
                "command table size differs from header declaration"
            );
        }

        Ok(Self { header, commands })
    }

    pub fn segments(&self) -> impl Iterator<Item = &SegmentCommand> {
        self.commands.iter().filter_map(|c| match c {
            LoadCommand::Segment(segment) => Some(segment),
            _ => None,
        })
    }

    pub fn find_segment(&self, name: &[u8]) -> Option<&SegmentCommand> {
        self.segments().find(|s| s.name() == name)
    }

    pub fn symtab(&self) -> Option<&SymtabCommand> {
        self.commands.iter().find_map(|c| match c {
            LoadCommand::Symtab(symtab) => Some(symtab),
            _ => None,
        })
    }

    pub fn uuid(&self) -> Option<&UuidCommand> {
        self.commands.iter().find_map(|c| match c {
            LoadCommand::Uuid(uuid) => Some(uuid),
            _ => None,
        })
    }

    pub fn file_type(&self) -> Option<FileType> {
        self.header.file_type()
    }

    /// Maps a vm address to a file offset relative to the image start.
    pub fn va_to_offset(&self, va: u32) -> Option<u32> {
        for segment in self.segments() {
            let end = segment.vmaddr.checked_add(segment.vmsize)?;
            if va >= segment.vmaddr && va < end {
                return segment.fileoff.checked_add(va - segment.vmaddr);
            }
        }
        None
    }

    /// Locates and decodes the kmod_info record of a kext image.
    ///
    /// Resolution goes through the `_kmod_info` symbol and the segment map;
    /// a kext without the symbol (or with an unmappable address) simply has
    /// no kmod_info, which is not an error.
    pub fn kmod_info(&self, data: &[u8], base: usize) -> Option<KmodInfo> {
        let symtab = self.symtab()?;
        let symbol = symtab
            .symbols
            .iter()
            .find(|s| s.name.as_slice() == KMOD_INFO_SYMBOL)?;
        let fileoff = self.va_to_offset(symbol.nlist.n_value)?;
        let mut r = BinaryReader::new_at(data, base + fileoff as usize);
        match KmodInfo::parse(&mut r) {
            Ok(kmod) => Some(kmod),
            Err(err) => {
                debug!(%err, "kmod_info record unreadable");
                None
            }
        }
    }
}

/// Reads `nsyms` nlist records at `symoff` and pairs them in order with the
/// names split out of the string pool at `stroff`. Both offsets resolve
/// relative to the image base.
fn resolve_symbols(data: &[u8], base: usize, symtab: &mut SymtabCommand) -> ParseResult<()> {
    let mut r = BinaryReader::new_at(data, base + symtab.symoff as usize);
    let mut nlists = Vec::new();
    for _ in 0..symtab.nsyms {
        nlists.push(Nlist::parse(&mut r)?);
    }

    let pool_start = base + symtab.stroff as usize;
    let pool = data
        .get(pool_start..pool_start + symtab.strsize as usize)
        .ok_or(ParseError::TruncatedInput {
            expected: symtab.strsize as usize,
            actual: data.len().saturating_sub(pool_start),
        })?;

    let names = split_string_pool(pool);
    if names.len() != symtab.nsyms as usize {
        return Err(ParseError::SymbolCountMismatch {
            declared: symtab.nsyms,
            found: names.len(),
        });
    }

    symtab.symbols = names
        .into_iter()
        .zip(nlists)
        .map(|(name, nlist)| Symbol { name: name.to_vec(), nlist })
        .collect();
    Ok(())
}

/// Splits a NUL-delimited string pool. Runs of consecutive NUL bytes yield
/// no empty entries.
fn split_string_pool(pool: &[u8]) -> Vec<&[u8]> {
    pool.split(|&b| b == 0).filter(|s| !s.is_empty()).collect()
}
