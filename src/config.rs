//! The `bootimg.cfg` dialect: one `key = value` header edit per line.
//!
//! ```text
//! bootsize = 0x800000
//! pagesize = 0x800
//! kerneladdr = 0x10008000
//! cmdline = console=ttyS0,115200 androidboot.hardware=qcom
//! ```

use std::{fmt::Write as _, path::Path, str::FromStr};

use tracing::debug;

use crate::{
    error::{Error, Result},
    image::BootImage,
    types::SectionKind,
};

/// A single header edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderEdit {
    BootSize(u64),
    PageSize(u32),
    KernelAddr(u32),
    RamdiskAddr(u32),
    SecondAddr(u32),
    TagsAddr(u32),
    DeviceTreeSize(u32),
    Name(String),
    Cmdline(String),
    ExtraCmdline(String),
}

impl HeaderEdit {
    pub fn key(&self) -> &'static str {
        match self {
            HeaderEdit::BootSize(_) => "bootsize",
            HeaderEdit::PageSize(_) => "pagesize",
            HeaderEdit::KernelAddr(_) => "kerneladdr",
            HeaderEdit::RamdiskAddr(_) => "ramdiskaddr",
            HeaderEdit::SecondAddr(_) => "secondaddr",
            HeaderEdit::TagsAddr(_) => "tagsaddr",
            HeaderEdit::DeviceTreeSize(_) => "devtree",
            HeaderEdit::Name(_) => "name",
            HeaderEdit::Cmdline(_) => "cmdline",
            HeaderEdit::ExtraCmdline(_) => "extra_cmdline",
        }
    }

    pub fn apply(&self, image: &mut BootImage) -> Result<()> {
        debug!(key = self.key(), "applying header edit");
        match self {
            HeaderEdit::BootSize(size) => image.set_size(*size)?,
            HeaderEdit::PageSize(value) => image.header.page_size = *value,
            HeaderEdit::KernelAddr(value) => image.header.kernel_addr = *value,
            HeaderEdit::RamdiskAddr(value) => image.header.ramdisk_addr = *value,
            HeaderEdit::SecondAddr(value) => image.header.second_addr = *value,
            HeaderEdit::TagsAddr(value) => image.header.tags_addr = *value,
            HeaderEdit::DeviceTreeSize(value) => {
                image.header.set_section_size(SectionKind::DeviceTree, *value)
            }
            HeaderEdit::Name(value) => image.header.set_name(value),
            HeaderEdit::Cmdline(value) => image.header.set_cmdline(value)?,
            HeaderEdit::ExtraCmdline(value) => image.header.set_extra_cmdline(value)?,
        }
        Ok(())
    }
}

impl FromStr for HeaderEdit {
    type Err = Error;

    fn from_str(line: &str) -> Result<Self> {
        let line = line.trim_end_matches(['\r', '\n']);
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| Error::BadConfigEntry(line.trim().to_string()))?;
        let key = key.trim();
        let value = value.trim_start_matches([' ', '\t']);
        let bad = || Error::BadConfigEntry(key.to_string());

        let number = || parse_number(value).ok_or_else(bad);
        let word = || number().and_then(|n| u32::try_from(n).map_err(|_| bad()));

        Ok(match key {
            "bootsize" => HeaderEdit::BootSize(number()?),
            "pagesize" => HeaderEdit::PageSize(word()?),
            "kerneladdr" => HeaderEdit::KernelAddr(word()?),
            "ramdiskaddr" => HeaderEdit::RamdiskAddr(word()?),
            "secondaddr" => HeaderEdit::SecondAddr(word()?),
            "tagsaddr" => HeaderEdit::TagsAddr(word()?),
            "devtree" => HeaderEdit::DeviceTreeSize(word()?),
            "name" => HeaderEdit::Name(value.to_string()),
            "cmdline" => HeaderEdit::Cmdline(value.to_string()),
            "extra_cmdline" => HeaderEdit::ExtraCmdline(value.to_string()),
            _ => return Err(bad()),
        })
    }
}

/// Parse an unsigned number the way `strtoul` with base 0 does:
/// `0x` prefix for hex, a leading `0` for octal, decimal otherwise.
pub fn parse_number(value: &str) -> Option<u64> {
    let value = value.trim();
    if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        u64::from_str_radix(hex, 16).ok()
    } else if value.len() > 1 && value.starts_with('0') {
        u64::from_str_radix(&value[1..], 8).ok()
    } else {
        value.parse().ok()
    }
}

/// Pending header edits, applied in the order they were added.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Edits(Vec<HeaderEdit>);

impl Edits {
    pub fn new() -> Self { Self::default() }

    pub fn push(&mut self, edit: HeaderEdit) { self.0.push(edit); }

    /// Parse one `key = value` entry.
    pub fn push_line(&mut self, line: &str) -> Result<()> {
        self.push(line.parse()?);
        Ok(())
    }

    /// Parse every non-blank line of `text`.
    pub fn extend_from_str(&mut self, text: &str) -> Result<()> {
        for line in text.lines().filter(|line| !line.trim().is_empty()) {
            self.push_line(line)?;
        }
        Ok(())
    }

    pub fn read_file(&mut self, path: &Path) -> Result<()> {
        let text = std::fs::read_to_string(path)?;
        self.extend_from_str(&text)
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEdit> { self.0.iter() }

    pub fn len(&self) -> usize { self.0.len() }

    pub fn is_empty(&self) -> bool { self.0.is_empty() }

    /// Apply all edits to `image`; later edits of the same key win.
    pub fn apply(&self, image: &mut BootImage) -> Result<()> { self.0.iter().try_for_each(|edit| edit.apply(image)) }
}

/// Render the header fields of `image` as a config that [`Edits`] reads back.
pub fn render(image: &BootImage) -> String {
    let header = &image.header;
    let mut config = String::new();
    let _ = writeln!(config, "bootsize = {:#x}", image.size().unwrap_or(0));
    let _ = writeln!(config, "pagesize = {:#x}", header.page_size);
    let _ = writeln!(config, "kerneladdr = {:#x}", header.kernel_addr);
    let _ = writeln!(config, "ramdiskaddr = {:#x}", header.ramdisk_addr);
    let _ = writeln!(config, "secondaddr = {:#x}", header.second_addr);
    let _ = writeln!(config, "devtree = {:#x}", header.dt_size());
    let _ = writeln!(config, "tagsaddr = {:#x}", header.tags_addr);
    let _ = writeln!(config, "name = {}", header.name());
    let _ = writeln!(config, "cmdline = {}", header.cmdline());
    let _ = writeln!(config, "extra_cmdline = {}", header.extra_cmdline());
    config
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TargetInfo;

    #[test]
    fn parse_entries() {
        assert_eq!("pagesize = 0x800".parse::<HeaderEdit>().unwrap(), HeaderEdit::PageSize(2048));
        assert_eq!("  kerneladdr\t=\t0x10008000".parse::<HeaderEdit>().unwrap(), HeaderEdit::KernelAddr(0x1000_8000));
        assert_eq!("devtree=4096".parse::<HeaderEdit>().unwrap(), HeaderEdit::DeviceTreeSize(4096));
        assert_eq!("bootsize = 010".parse::<HeaderEdit>().unwrap(), HeaderEdit::BootSize(8));
        assert_eq!(
            "cmdline = console=ttyS0 quiet \r\n".parse::<HeaderEdit>().unwrap(),
            HeaderEdit::Cmdline("console=ttyS0 quiet ".to_string())
        );
        assert_eq!("name =".parse::<HeaderEdit>().unwrap(), HeaderEdit::Name(String::new()));
    }

    #[test]
    fn reject_bad_entries() {
        assert!(matches!("pagesize 2048".parse::<HeaderEdit>(), Err(Error::BadConfigEntry(_))));
        assert!(matches!("color = red".parse::<HeaderEdit>(), Err(Error::BadConfigEntry(key)) if key == "color"));
        assert!(matches!("pagesize = lots".parse::<HeaderEdit>(), Err(Error::BadConfigEntry(_))));
        assert!(matches!("tagsaddr = 0x100000000".parse::<HeaderEdit>(), Err(Error::BadConfigEntry(_))));
    }

    #[test]
    fn numbers() {
        assert_eq!(parse_number("0"), Some(0));
        assert_eq!(parse_number("0x1F"), Some(31));
        assert_eq!(parse_number("0X10"), Some(16));
        assert_eq!(parse_number("0755"), Some(493));
        assert_eq!(parse_number("2048"), Some(2048));
        assert_eq!(parse_number("08"), None);
        assert_eq!(parse_number(""), None);
    }

    #[test]
    fn last_write_wins() {
        let mut edits = Edits::new();
        edits.extend_from_str("pagesize = 2048\n\ncmdline = first\n").unwrap();
        edits.push_line("pagesize = 4096").unwrap();
        edits.push_line("cmdline = second").unwrap();
        assert_eq!(edits.len(), 4);

        let mut image = BootImage::new();
        edits.apply(&mut image).unwrap();
        assert_eq!(image.header.page_size, 4096);
        assert_eq!(image.header.cmdline(), "second");
    }

    #[test]
    fn cmdline_too_long_is_fatal() {
        let mut edits = Edits::new();
        edits.push_line(&format!("cmdline = {}", "a".repeat(600))).unwrap();
        let mut image = BootImage::new();
        assert!(matches!(edits.apply(&mut image), Err(Error::FieldTooLong { .. })));
    }

    #[test]
    fn bootsize_on_block_device() {
        let mut image = BootImage::with_target(TargetInfo::block_device(1 << 20));
        HeaderEdit::BootSize(1 << 20).apply(&mut image).unwrap();
        assert!(matches!(
            HeaderEdit::BootSize(1 << 21).apply(&mut image),
            Err(Error::BlockDeviceResize { .. })
        ));

        let mut image = BootImage::new();
        HeaderEdit::BootSize(1 << 21).apply(&mut image).unwrap();
        assert_eq!(image.size(), Some(1 << 21));
    }

    #[test]
    fn render_round_trip() {
        let mut image = BootImage::with_target(TargetInfo::file(0x80_0000));
        image.header.kernel_addr = 0x1000_8000;
        image.header.set_name("msm8960");
        image.header.set_cmdline("console=ttyHSL0,115200,n8 androidboot.hardware=qcom").unwrap();
        let config = render(&image);
        assert!(config.starts_with("bootsize = 0x800000\npagesize = 0x800\n"));

        let mut edits = Edits::new();
        edits.extend_from_str(&config).unwrap();
        let mut copy = BootImage::new();
        edits.apply(&mut copy).unwrap();
        assert_eq!(copy.header, image.header);
        assert_eq!(copy.size(), image.size());
    }
}
