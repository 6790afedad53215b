use std::io::{Read, Seek, SeekFrom};

use tracing::{debug, warn};

use crate::{
    device::TargetInfo,
    error::{Error, Invalid, Result},
    header::Header,
    layout::{Extent, Layout},
    types::HEADER_SIZE,
};

/// Check the structural invariants of `header` against an image of
/// `backing_size` bytes. Missing device tree, name or cmdline only warn.
pub fn validate(header: &Header, backing_size: u64) -> Result<Layout> {
    let layout = validate_structure(header)?;

    if header.dt_size() == 0 {
        warn!("device tree is null");
    }
    if header.name[0] == 0 {
        warn!("name is null");
    }
    if header.cmdline[0] == 0 {
        warn!("cmdline is null");
    }

    if layout.total_size > backing_size {
        return Err(Invalid::SizeMismatch {
            total:  layout.total_size,
            actual: backing_size,
        }
        .into());
    }
    Ok(layout)
}

/// The checks of [`validate`] that do not depend on a backing image.
pub fn validate_structure(header: &Header) -> Result<Layout> {
    if !header.has_valid_magic() {
        return Err(Invalid::BadMagic.into());
    }
    if header.kernel_size() == 0 {
        return Err(Invalid::KernelSizeZero.into());
    }
    if header.ramdisk_size() == 0 {
        return Err(Invalid::RamdiskSizeZero.into());
    }
    let layout = Layout::of(header)?;
    if (header.page_size as usize) < HEADER_SIZE {
        return Err(Invalid::PageSizeTooSmall {
            page_size:   header.page_size,
            header_size: HEADER_SIZE,
        }
        .into());
    }
    Ok(layout)
}

/// Read access to an existing image.
pub struct ContainerReader<R> {
    inner:  R,
    target: TargetInfo,
}

impl<R: Read + Seek> ContainerReader<R> {
    pub fn new(inner: R, target: TargetInfo) -> Self { ContainerReader { inner, target } }

    pub fn target(&self) -> TargetInfo { self.target }

    /// Byte length of the image, or the capacity of a block device.
    pub fn len(&self) -> u64 { self.target.size }

    pub fn is_empty(&self) -> bool { self.target.size == 0 }

    /// Decode the header without any validation.
    pub fn read_raw_header(&mut self) -> Result<Header> {
        self.inner.seek(SeekFrom::Start(0))?;
        let mut bytes = Vec::with_capacity(HEADER_SIZE);
        (&mut self.inner).take(HEADER_SIZE as u64).read_to_end(&mut bytes)?;
        Header::decode(&bytes)
    }

    /// Decode and validate the header.
    pub fn read_header(&mut self) -> Result<Header> {
        let header = self.read_raw_header()?;
        let layout = validate(&header, self.len())?;
        debug!(
            page_size = header.page_size,
            total_size = layout.total_size,
            image_size = self.len(),
            "read boot image header"
        );
        Ok(header)
    }

    /// Read the bytes of one section.
    pub fn read_range(&mut self, extent: Extent) -> Result<Vec<u8>> {
        if extent.end() > self.len() {
            return Err(Error::OutOfRange {
                offset: extent.offset,
                size:   u64::from(extent.size),
                len:    self.len(),
            });
        }
        self.inner.seek(SeekFrom::Start(extent.offset))?;
        let mut bytes = Vec::with_capacity(extent.size as usize);
        (&mut self.inner).take(u64::from(extent.size)).read_to_end(&mut bytes)?;
        if bytes.len() < extent.size as usize {
            return Err(Error::Truncated {
                what:     "section",
                expected: u64::from(extent.size),
                found:    bytes.len() as u64,
            });
        }
        Ok(bytes)
    }

    pub fn get_mut(&mut self) -> &mut R { &mut self.inner }

    pub fn into_inner(self) -> R { self.inner }
}
