//! Error types for Mach-O decoding

use thiserror::Error;

/// Decoding failure for a single Mach-O image.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("truncated input: needed {expected} bytes, {actual} available")]
    TruncatedInput { expected: usize, actual: usize },

    #[error("bad magic: expected {expected:#010x}, got {actual:#010x}")]
    BadMagic { expected: u32, actual: u32 },

    #[error(
        "structural corruption in command {cmd:#x}: cursor at {actual:#x}, declared end {expected:#x}"
    )]
    StructuralCorruption { cmd: u32, expected: usize, actual: usize },

    #[error("thread state is {len} bytes but declares {count} register words")]
    InconsistentThreadState { count: u32, len: usize },

    #[error("string table holds {found} names, symbol table declares {declared}")]
    SymbolCountMismatch { declared: u32, found: usize },
}

/// Result type alias for decoding operations
pub type ParseResult<T> = std::result::Result<T, ParseError>;
