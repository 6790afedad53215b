//! Page layout of a boot image.
//!
//! The header occupies the first page. Kernel, ramdisk, second stage and
//! device tree follow in that order, each starting on a page boundary and
//! zero-padded up to the next one. A section of size zero takes no pages.

use crate::{
    error::{Invalid, Result},
    header::Header,
    types::SectionKind,
};

/// Number of whole pages needed to hold `size` bytes.
///
/// `page_size` must be non-zero.
pub fn pages(size: u32, page_size: u32) -> u64 { u64::from(size).div_ceil(u64::from(page_size)) }

/// Zero bytes appended after `size` bytes so the next section is page aligned.
///
/// `page_size` must be non-zero.
pub fn padding(size: u32, page_size: u32) -> u64 {
    pages(size, page_size) * u64::from(page_size) - u64::from(size)
}

/// Byte range of one section inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Extent {
    pub offset: u64,
    pub size:   u32,
}
impl Extent {
    pub fn end(&self) -> u64 { self.offset + u64::from(self.size) }

    pub fn is_empty(&self) -> bool { self.size == 0 }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Layout {
    pub page_size:  u32,
    pub extents:    [Extent; 4],
    pub total_size: u64,
}

impl Layout {
    /// Compute the layout for section sizes given in canonical order.
    pub fn new(page_size: u32, sizes: [u32; 4]) -> Result<Self> {
        if page_size == 0 {
            return Err(Invalid::PageSizeZero.into());
        }
        if !page_size.is_power_of_two() {
            return Err(Invalid::PageSizeNotPowerOfTwo(page_size).into());
        }

        let page = u64::from(page_size);
        // the header page
        let mut used = 1;
        let extents = sizes.map(|size| {
            let extent = Extent {
                offset: used * page,
                size,
            };
            used += pages(size, page_size);
            extent
        });

        Ok(Layout {
            page_size,
            extents,
            total_size: used * page,
        })
    }

    pub fn of(header: &Header) -> Result<Self> { Self::new(header.page_size, header.section_sizes()) }

    pub fn extent(&self, kind: SectionKind) -> Extent { self.extents[kind.index()] }

    pub fn padding(&self, kind: SectionKind) -> u64 { padding(self.extent(kind).size, self.page_size) }
}
