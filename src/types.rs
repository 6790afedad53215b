use std::{fmt, mem::size_of};

use zerocopy::{byteorder::little_endian::U32, FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

pub const BOOT_MAGIC: [u8; BOOT_MAGIC_SIZE] = *b"ANDROID!";
pub const BOOT_MAGIC_SIZE: usize = 8;
pub const BOOT_NAME_SIZE: usize = 16;
pub const BOOT_ARGS_SIZE: usize = 512;
pub const BOOT_EXTRA_ARGS_SIZE: usize = 1024;
pub const BOOT_ID_WORDS: usize = 8;
pub const BOOT_ID_SIZE: usize = BOOT_ID_WORDS * size_of::<u32>();

pub const DEFAULT_PAGE_SIZE: u32 = 2048;

/// Encoded size of [`RawHeader`], identical for every image.
pub const HEADER_SIZE: usize = size_of::<RawHeader>();

/// On-disk boot image header. All integers are little-endian.
#[repr(C)]
#[derive(FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct RawHeader {
    pub magic:         [u8; BOOT_MAGIC_SIZE],
    pub kernel_size:   U32,
    pub kernel_addr:   U32,
    pub ramdisk_size:  U32,
    pub ramdisk_addr:  U32,
    pub second_size:   U32,
    pub second_addr:   U32,
    pub tags_addr:     U32,
    pub page_size:     U32,
    pub dt_size:       U32,
    pub reserved:      U32,
    pub name:          [u8; BOOT_NAME_SIZE],
    pub cmdline:       [u8; BOOT_ARGS_SIZE],
    pub id:            [U32; BOOT_ID_WORDS],
    pub extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

/// Payload sections in the order they are laid out after the header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionKind {
    Kernel,
    Ramdisk,
    Second,
    DeviceTree,
}
impl SectionKind {
    pub const ALL: [SectionKind; 4] = [
        SectionKind::Kernel,
        SectionKind::Ramdisk,
        SectionKind::Second,
        SectionKind::DeviceTree,
    ];

    pub fn index(self) -> usize {
        match self {
            SectionKind::Kernel => 0,
            SectionKind::Ramdisk => 1,
            SectionKind::Second => 2,
            SectionKind::DeviceTree => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            SectionKind::Kernel => "kernel",
            SectionKind::Ramdisk => "ramdisk",
            SectionKind::Second => "second stage",
            SectionKind::DeviceTree => "device tree",
        }
    }

    /// File name used by extract when none is given.
    pub fn default_file_name(self) -> &'static str {
        match self {
            SectionKind::Kernel => "zImage",
            SectionKind::Ramdisk => "initrd.img",
            SectionKind::Second => "stage2.img",
            SectionKind::DeviceTree => "dt.img",
        }
    }

    /// Kernel and ramdisk must be present in every valid image.
    pub fn is_mandatory(self) -> bool { matches!(self, SectionKind::Kernel | SectionKind::Ramdisk) }
}
impl fmt::Display for SectionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.name()) }
}
