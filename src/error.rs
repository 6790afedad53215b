use thiserror::Error;

use crate::types::SectionKind;

/// Structural reasons for rejecting a header.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Invalid {
    #[error("no Android magic value")]
    BadMagic,

    #[error("kernel size is null")]
    KernelSizeZero,

    #[error("ramdisk size is null")]
    RamdiskSizeZero,

    #[error("image page size is null")]
    PageSizeZero,

    #[error("page size {0} is not a power of two")]
    PageSizeNotPowerOfTwo(u32),

    #[error("page size {page_size} cannot hold the {header_size} byte header")]
    PageSizeTooSmall { page_size: u32, header_size: usize },

    #[error("sizes mismatch in boot image: layout needs {total} bytes, image has {actual}")]
    SizeMismatch { total: u64, actual: u64 },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("truncated {what}: expected {expected} bytes, found {found}")]
    Truncated {
        what:     &'static str,
        expected: u64,
        found:    u64,
    },

    #[error("not a valid Android boot image: {0}")]
    InvalidContainer(#[from] Invalid),

    #[error("section range {offset:#x}+{size:#x} exceeds image length {len:#x}")]
    OutOfRange { offset: u64, size: u64, len: u64 },

    #[error("{field} length ({len}) is too long (max {max})")]
    FieldTooLong {
        field: &'static str,
        len:   usize,
        max:   usize,
    },

    #[error("updated image is too big for the boot image ({size} vs {capacity} bytes)")]
    ImageTooLarge { size: u64, capacity: u64 },

    #[error("{section} is too large for the header ({len} bytes)")]
    SectionTooLarge { section: SectionKind, len: u64 },

    #[error("{section} is declared as {expected} bytes but {found} bytes are loaded")]
    SectionNotLoaded {
        section:  SectionKind,
        expected: u32,
        found:    u64,
    },

    #[error("bad config entry: {0}")]
    BadConfigEntry(String),

    #[error("cannot change boot image size for a block device ({requested} vs {capacity} bytes)")]
    BlockDeviceResize { requested: u64, capacity: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
