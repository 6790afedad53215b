use std::io::{Cursor, Read, Seek};

use tracing::{debug, info};

use crate::{
    checksum,
    config::Edits,
    device::TargetInfo,
    error::{Error, Result},
    header::Header,
    layout::Layout,
    reader::{self, ContainerReader},
    section::{Replacements, SectionSource, SectionStore},
    types::SectionKind,
    writer::{self, Sink},
};

/// A boot image being inspected, updated or created.
#[derive(Debug, Clone)]
pub struct BootImage {
    pub header:      Header,
    size:            Option<u64>,
    is_block_device: bool,
    sections:        SectionStore,
    source_layout:   Option<Layout>,
}

impl BootImage {
    /// A new image with default header and no declared size.
    pub fn new() -> Self {
        BootImage {
            header:          Header::new(),
            size:            None,
            is_block_device: false,
            sections:        SectionStore::new(),
            source_layout:   None,
        }
    }

    /// A new image whose declared size is the size of `target`.
    pub fn with_target(target: TargetInfo) -> Self {
        BootImage {
            size: Some(target.size),
            is_block_device: target.is_block_device,
            ..Self::new()
        }
    }

    /// Read and validate the header of an existing image.
    pub fn read_from<R: Read + Seek>(container: &mut ContainerReader<R>) -> Result<Self> {
        let header = container.read_header()?;
        let source_layout = Layout::of(&header)?;
        let target = container.target();
        info!(
            size = target.size,
            block_device = target.is_block_device,
            "opened boot image"
        );
        Ok(BootImage {
            header,
            size: Some(target.size),
            is_block_device: target.is_block_device,
            sections: SectionStore::new(),
            source_layout: Some(source_layout),
        })
    }

    /// Declared total size, `None` until set for a new image.
    pub fn size(&self) -> Option<u64> { self.size }

    pub fn set_size(&mut self, size: u64) -> Result<()> {
        match self.size {
            Some(capacity) if self.is_block_device && capacity != size => Err(Error::BlockDeviceResize {
                requested: size,
                capacity,
            }),
            _ => {
                self.size = Some(size);
                Ok(())
            }
        }
    }

    pub fn is_block_device(&self) -> bool { self.is_block_device }

    pub fn sections(&self) -> &SectionStore { &self.sections }

    pub fn section(&self, kind: SectionKind) -> Option<&[u8]> { self.sections.get(kind) }

    pub fn layout(&self) -> Result<Layout> { Layout::of(&self.header) }

    pub fn apply_edits(&mut self, edits: &Edits) -> Result<()> { edits.apply(self) }

    /// Fill the sections of an image that has no backing container yet.
    /// Sections without a replacement are absent.
    pub fn load_sections(&mut self, replacements: Replacements) -> Result<()> {
        self.resolve_sections::<Cursor<Vec<u8>>>(replacements, None)
    }

    /// Fill the sections for an in-place update: replaced sections take the
    /// new content, every other present section is read back from
    /// `container` at its current offset.
    pub fn update_sections<R: Read + Seek>(
        &mut self, replacements: Replacements, container: &mut ContainerReader<R>,
    ) -> Result<()> {
        self.resolve_sections(replacements, Some(container))
    }

    /// Sources for every section. Preserved sections are read at their
    /// extents in the image as it was read, so header edits and
    /// replacements only move them in the output.
    pub fn plan_sections(&self, mut replacements: Replacements, from_container: bool) -> [SectionSource; 4] {
        let source = self.source_layout.filter(|_| from_container);
        SectionKind::ALL.map(|kind| match (replacements.take(kind), source) {
            (Some(bytes), _) => SectionSource::External(bytes),
            (None, Some(layout)) if !layout.extent(kind).is_empty() => SectionSource::Range(layout.extent(kind)),
            _ => SectionSource::Absent,
        })
    }

    fn resolve_sections<R: Read + Seek>(
        &mut self, replacements: Replacements, mut container: Option<&mut ContainerReader<R>>,
    ) -> Result<()> {
        let plan = self.plan_sections(replacements, container.is_some());
        for (kind, source) in SectionKind::ALL.into_iter().zip(plan) {
            self.sections
                .resolve(kind, source, &mut self.header, container.as_deref_mut())?;
        }
        let total_size = self.layout()?.total_size;
        self.check_capacity(total_size)?;
        Ok(())
    }

    /// Fix the declared size of a new image, or make sure `total_size`
    /// fits the declared size of an existing one.
    fn check_capacity(&mut self, total_size: u64) -> Result<u64> {
        match self.size {
            None => {
                self.size = Some(total_size);
                Ok(total_size)
            }
            Some(capacity) if total_size > capacity => Err(Error::ImageTooLarge {
                size: total_size,
                capacity,
            }),
            Some(capacity) => Ok(capacity),
        }
    }

    /// Structural checks for an image about to be written from scratch.
    pub fn validate(&self) -> Result<()> {
        let size = match self.size {
            Some(size) => size,
            None => self.layout()?.total_size,
        };
        reader::validate(&self.header, size)?;
        Ok(())
    }

    /// Every size field must describe a loaded buffer of that length.
    fn check_sections(&self) -> Result<()> {
        for kind in SectionKind::ALL {
            let expected = self.header.section_size(kind);
            let found = self.sections.get(kind).map_or(0, |bytes| bytes.len() as u64);
            if u64::from(expected) != found {
                return Err(Error::SectionNotLoaded {
                    section: kind,
                    expected,
                    found,
                });
            }
        }
        Ok(())
    }

    /// Bytes of `kind` read from `container` at its offset, `None` when
    /// the section is absent.
    pub fn extract<R: Read + Seek>(
        &self, container: &mut ContainerReader<R>, kind: SectionKind,
    ) -> Result<Option<Vec<u8>>> {
        let extent = self.layout()?.extent(kind);
        if extent.is_empty() {
            return Ok(None);
        }
        debug!(section = %kind, offset = extent.offset, size = extent.size, "extracting section");
        container.read_range(extent).map(Some)
    }

    /// Compute the id and write the image to `target`, then cut or extend
    /// the target to the declared size. Block devices keep their size.
    /// Section buffers and capacity are checked before anything is written.
    pub fn write_to<W: Sink, P: FnMut(SectionKind, u64)>(&mut self, target: &mut W, progress: P) -> Result<()> {
        self.check_sections()?;
        let layout = self.layout()?;
        let size = self.check_capacity(layout.total_size)?;
        checksum::bind(&mut self.header, &self.sections);
        writer::write_image(target, &self.header, &self.sections, progress)?;
        if !self.is_block_device {
            target.set_len(size)?;
        }
        self.source_layout = Some(layout);
        info!(size, total_size = layout.total_size, "wrote boot image");
        Ok(())
    }
}

impl Default for BootImage {
    fn default() -> Self { Self::new() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Invalid;

    fn created(kernel: &[u8], ramdisk: &[u8]) -> Vec<u8> {
        let mut image = BootImage::new();
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Kernel, kernel.to_vec());
        replacements.set(SectionKind::Ramdisk, ramdisk.to_vec());
        image.load_sections(replacements).unwrap();
        image.validate().unwrap();
        let mut target = Cursor::new(Vec::new());
        image.write_to(&mut target, |_, _| {}).unwrap();
        target.into_inner()
    }

    fn open(bytes: Vec<u8>) -> (BootImage, ContainerReader<Cursor<Vec<u8>>>) {
        let target = TargetInfo::file(bytes.len() as u64);
        let mut container = ContainerReader::new(Cursor::new(bytes), target);
        let image = BootImage::read_from(&mut container).unwrap();
        (image, container)
    }

    #[test]
    fn create_sizes_image_by_layout() {
        let bytes = created(&[1; 5000], &[2; 3000]);
        assert_eq!(bytes.len(), 12288);
        let (image, _) = open(bytes);
        assert_eq!(image.size(), Some(12288));
        assert_eq!(image.header.kernel_size(), 5000);
        assert_ne!(image.header.id, [0; 8]);
    }

    #[test]
    fn plan_uses_offsets_before_replacement() {
        let (image, _) = open(created(&[1; 5000], &[2; 3000]));
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Kernel, vec![9; 10]);
        let plan = image.plan_sections(replacements, true);
        assert_eq!(plan[0], SectionSource::External(vec![9; 10]));
        assert_eq!(plan[1], SectionSource::Range(image.layout().unwrap().extent(SectionKind::Ramdisk)));
        assert_eq!(plan[2], SectionSource::Absent);
        assert_eq!(plan[3], SectionSource::Absent);
    }

    #[test]
    fn update_moves_following_sections() {
        let (mut image, mut container) = open(created(&[1; 5000], &[2; 3000]));
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Kernel, vec![9; 10]);
        image.update_sections(replacements, &mut container).unwrap();
        assert_eq!(image.header.kernel_size(), 10);
        assert_eq!(image.section(SectionKind::Ramdisk), Some(&[2; 3000][..]));

        let mut target = container.into_inner();
        image.write_to(&mut target, |_, _| {}).unwrap();
        let bytes = target.into_inner();
        // the file keeps its size, the ramdisk now starts on the third page
        assert_eq!(bytes.len(), 12288);
        assert!(bytes[4096..7096].iter().all(|&b| b == 2));

        let (image, mut container) = open(bytes);
        assert_eq!(image.extract(&mut container, SectionKind::Ramdisk).unwrap(), Some(vec![2; 3000]));
        assert_eq!(image.extract(&mut container, SectionKind::Second).unwrap(), None);
    }

    #[test]
    fn write_without_sections_is_rejected() {
        let original = created(&[1; 5000], &[2; 3000]);
        let (mut image, _) = open(original);
        let mut target = Cursor::new(Vec::new());
        assert!(matches!(
            image.write_to(&mut target, |_, _| {}),
            Err(Error::SectionNotLoaded {
                section:  SectionKind::Kernel,
                expected: 5000,
                found:    0,
            })
        ));
        assert!(target.into_inner().is_empty());
    }

    #[test]
    fn page_size_edit_keeps_preserved_sections() {
        let mut bytes = created(&[1; 5000], &[2; 3000]);
        bytes.resize(64 * 1024, 0);
        let (mut image, mut container) = open(bytes);
        let mut edits = Edits::new();
        edits.push_line("pagesize = 4096").unwrap();
        image.apply_edits(&edits).unwrap();
        image.update_sections(Replacements::new(), &mut container).unwrap();
        assert_eq!(image.section(SectionKind::Kernel), Some(&[1; 5000][..]));
        assert_eq!(image.section(SectionKind::Ramdisk), Some(&[2; 3000][..]));

        let mut target = container.into_inner();
        image.write_to(&mut target, |_, _| {}).unwrap();
        let (image, mut container) = open(target.into_inner());
        assert_eq!(image.header.page_size, 4096);
        assert_eq!(image.layout().unwrap().extent(SectionKind::Ramdisk).offset, 12288);
        assert_eq!(image.extract(&mut container, SectionKind::Kernel).unwrap(), Some(vec![1; 5000]));
        assert_eq!(image.extract(&mut container, SectionKind::Ramdisk).unwrap(), Some(vec![2; 3000]));
    }

    #[test]
    fn update_too_large() {
        let (mut image, mut container) = open(created(&[1; 5000], &[2; 3000]));
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Ramdisk, vec![3; 4097]);
        assert!(matches!(
            image.update_sections(replacements, &mut container),
            Err(Error::ImageTooLarge {
                size:     14336,
                capacity: 12288,
            })
        ));
    }

    #[test]
    fn bootsize_grows_image() {
        let (mut image, mut container) = open(created(&[1; 5000], &[2; 3000]));
        image.set_size(16384).unwrap();
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Ramdisk, vec![3; 4097]);
        image.update_sections(replacements, &mut container).unwrap();
        let mut target = container.into_inner();
        image.write_to(&mut target, |_, _| {}).unwrap();
        assert_eq!(target.get_ref().len(), 16384);
    }

    #[test]
    fn validate_rejects_missing_kernel() {
        let mut image = BootImage::new();
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Ramdisk, vec![1; 10]);
        image.load_sections(replacements).unwrap();
        assert!(matches!(
            image.validate(),
            Err(Error::InvalidContainer(Invalid::KernelSizeZero))
        ));
    }

    #[test]
    fn block_device_keeps_capacity() {
        let mut image = BootImage::with_target(TargetInfo::block_device(65536));
        let mut replacements = Replacements::new();
        replacements.set(SectionKind::Kernel, vec![1; 10]);
        replacements.set(SectionKind::Ramdisk, vec![2; 10]);
        image.load_sections(replacements).unwrap();
        let mut target = Cursor::new(vec![0xee; 65536]);
        image.write_to(&mut target, |_, _| {}).unwrap();
        let bytes = target.into_inner();
        assert_eq!(bytes.len(), 65536);
        assert!(bytes[6144..].iter().all(|&b| b == 0xee));
        assert!(matches!(image.set_size(4096), Err(Error::BlockDeviceResize { .. })));
    }
}
