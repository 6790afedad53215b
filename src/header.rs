use std::borrow::Cow;

use zerocopy::{byteorder::little_endian::U32, FromBytes, IntoBytes};

use crate::{
    error::{Error, Result},
    types::*,
};

/// Decoded boot image header.
///
/// The four size fields describe the payload sections and are the only
/// source the layout is computed from. Outside this crate they can be read
/// but not written; section buffers and sizes change together through
/// [`SectionStore`](crate::section::SectionStore).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    pub magic:         [u8; BOOT_MAGIC_SIZE],
    kernel_size:       u32,
    pub kernel_addr:   u32,
    ramdisk_size:      u32,
    pub ramdisk_addr:  u32,
    second_size:       u32,
    pub second_addr:   u32,
    pub tags_addr:     u32,
    pub page_size:     u32,
    dt_size:           u32,
    pub reserved:      u32,
    pub name:          [u8; BOOT_NAME_SIZE],
    pub cmdline:       [u8; BOOT_ARGS_SIZE],
    pub id:            [u32; BOOT_ID_WORDS],
    pub extra_cmdline: [u8; BOOT_EXTRA_ARGS_SIZE],
}

impl Header {
    /// Header for a new image: magic set, default page size, everything else zero.
    pub fn new() -> Self {
        Header {
            magic:         BOOT_MAGIC,
            kernel_size:   0,
            kernel_addr:   0,
            ramdisk_size:  0,
            ramdisk_addr:  0,
            second_size:   0,
            second_addr:   0,
            tags_addr:     0,
            page_size:     DEFAULT_PAGE_SIZE,
            dt_size:       0,
            reserved:      0,
            name:          [0; BOOT_NAME_SIZE],
            cmdline:       [0; BOOT_ARGS_SIZE],
            id:            [0; BOOT_ID_WORDS],
            extra_cmdline: [0; BOOT_EXTRA_ARGS_SIZE],
        }
    }

    /// Decode the header from the front of `bytes`. No semantic checks are
    /// made here, see [`reader::validate`](crate::reader::validate).
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let (raw, _) = RawHeader::read_from_prefix(bytes).map_err(|_| Error::Truncated {
            what:     "header",
            expected: HEADER_SIZE as u64,
            found:    bytes.len() as u64,
        })?;
        Ok(Header {
            magic:         raw.magic,
            kernel_size:   raw.kernel_size.get(),
            kernel_addr:   raw.kernel_addr.get(),
            ramdisk_size:  raw.ramdisk_size.get(),
            ramdisk_addr:  raw.ramdisk_addr.get(),
            second_size:   raw.second_size.get(),
            second_addr:   raw.second_addr.get(),
            tags_addr:     raw.tags_addr.get(),
            page_size:     raw.page_size.get(),
            dt_size:       raw.dt_size.get(),
            reserved:      raw.reserved.get(),
            name:          raw.name,
            cmdline:       raw.cmdline,
            id:            raw.id.map(|word| word.get()),
            extra_cmdline: raw.extra_cmdline,
        })
    }

    pub fn encode(&self) -> [u8; HEADER_SIZE] {
        let raw = RawHeader {
            magic:         self.magic,
            kernel_size:   U32::new(self.kernel_size),
            kernel_addr:   U32::new(self.kernel_addr),
            ramdisk_size:  U32::new(self.ramdisk_size),
            ramdisk_addr:  U32::new(self.ramdisk_addr),
            second_size:   U32::new(self.second_size),
            second_addr:   U32::new(self.second_addr),
            tags_addr:     U32::new(self.tags_addr),
            page_size:     U32::new(self.page_size),
            dt_size:       U32::new(self.dt_size),
            reserved:      U32::new(self.reserved),
            name:          self.name,
            cmdline:       self.cmdline,
            id:            self.id.map(U32::new),
            extra_cmdline: self.extra_cmdline,
        };
        let mut bytes = [0; HEADER_SIZE];
        bytes.copy_from_slice(raw.as_bytes());
        bytes
    }

    pub fn has_valid_magic(&self) -> bool { self.magic == BOOT_MAGIC }

    pub fn kernel_size(&self) -> u32 { self.kernel_size }

    pub fn ramdisk_size(&self) -> u32 { self.ramdisk_size }

    pub fn second_size(&self) -> u32 { self.second_size }

    pub fn dt_size(&self) -> u32 { self.dt_size }

    pub fn section_size(&self, kind: SectionKind) -> u32 {
        match kind {
            SectionKind::Kernel => self.kernel_size,
            SectionKind::Ramdisk => self.ramdisk_size,
            SectionKind::Second => self.second_size,
            SectionKind::DeviceTree => self.dt_size,
        }
    }

    /// Sizes in canonical section order.
    pub fn section_sizes(&self) -> [u32; 4] { SectionKind::ALL.map(|kind| self.section_size(kind)) }

    pub(crate) fn set_section_size(&mut self, kind: SectionKind, size: u32) {
        match kind {
            SectionKind::Kernel => self.kernel_size = size,
            SectionKind::Ramdisk => self.ramdisk_size = size,
            SectionKind::Second => self.second_size = size,
            SectionKind::DeviceTree => self.dt_size = size,
        }
    }

    pub fn name(&self) -> Cow<'_, str> { text_field(&self.name) }

    pub fn cmdline(&self) -> Cow<'_, str> { text_field(&self.cmdline) }

    pub fn extra_cmdline(&self) -> Cow<'_, str> { text_field(&self.extra_cmdline) }

    /// Set the product name, silently truncated to fit with its terminator.
    pub fn set_name(&mut self, name: &str) {
        let bytes = name.as_bytes();
        let len = bytes.len().min(BOOT_NAME_SIZE - 1);
        self.name = [0; BOOT_NAME_SIZE];
        self.name[0..len].copy_from_slice(&bytes[0..len]);
    }

    pub fn set_cmdline(&mut self, cmdline: &str) -> Result<()> {
        set_text_field(&mut self.cmdline, "cmdline", cmdline)
    }

    pub fn set_extra_cmdline(&mut self, cmdline: &str) -> Result<()> {
        set_text_field(&mut self.extra_cmdline, "extra_cmdline", cmdline)
    }
}

impl Default for Header {
    fn default() -> Self { Self::new() }
}

/// Text up to the first NUL, or the whole field if it is not terminated.
pub fn text_field(field: &[u8]) -> Cow<'_, str> {
    let end = field.iter().position(|&c| c == b'\0').unwrap_or(field.len());
    String::from_utf8_lossy(&field[0..end])
}

fn set_text_field<const N: usize>(
    field: &mut [u8; N], name: &'static str, value: &str,
) -> Result<()> {
    let value = value.as_bytes();
    if value.len() >= N {
        return Err(Error::FieldTooLong {
            field: name,
            len:   value.len(),
            max:   N - 1,
        });
    }
    *field = [0; N];
    field[0..value.len()].copy_from_slice(value);
    Ok(())
}
