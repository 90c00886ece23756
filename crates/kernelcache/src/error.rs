//! Error types for the kernelcache pipeline

use kextract_macho::ParseError;
use thiserror::Error;

/// Failure in the prelinked-kernel pipeline.
#[derive(Error, Debug)]
pub enum Error {
    #[error("image parse failed: {0}")]
    Parse(#[from] ParseError),

    #[error("segment {0} not present")]
    SegmentNotFound(&'static str),

    #[error("prelink info section missing")]
    InfoSectionMissing,

    #[error("non-kext image of type {filetype:#x} at offset {offset:#x}")]
    UnexpectedImageType { offset: usize, filetype: u32 },

    #[error("prelink info plist: {0}")]
    Plist(#[from] plist::Error),
}

/// Result type alias for pipeline operations
pub type Result<T> = std::result::Result<T, Error>;
