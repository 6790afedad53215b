use std::{
    io::{Read, Seek},
    path::Path,
};

use tracing::{debug, warn};

use crate::{
    error::{Error, Result},
    header::Header,
    layout::Extent,
    reader::ContainerReader,
    types::SectionKind,
};

/// Where the bytes of a section come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SectionSource {
    /// Not present; the size field becomes zero.
    Absent,
    /// New content; the size field becomes its length.
    External(Vec<u8>),
    /// Preserved from the image being updated; the size field is unchanged.
    Range(Extent),
}

/// Replacement payloads supplied for an update or create.
#[derive(Debug, Default, Clone)]
pub struct Replacements([Option<Vec<u8>>; 4]);

impl Replacements {
    pub fn new() -> Self { Self::default() }

    pub fn set(&mut self, kind: SectionKind, bytes: Vec<u8>) -> &mut Self {
        self.0[kind.index()] = Some(bytes);
        self
    }

    /// Read the replacement for `kind` from a file.
    pub fn load(&mut self, kind: SectionKind, path: &Path) -> Result<&mut Self> {
        let bytes = std::fs::read(path)?;
        debug!(section = %kind, path = %path.display(), len = bytes.len(), "loaded replacement");
        Ok(self.set(kind, bytes))
    }

    pub fn contains(&self, kind: SectionKind) -> bool { self.0[kind.index()].is_some() }

    pub fn take(&mut self, kind: SectionKind) -> Option<Vec<u8>> { self.0[kind.index()].take() }
}

/// In-memory section payloads of one image.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SectionStore {
    buffers: [Option<Vec<u8>>; 4],
}

impl SectionStore {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, kind: SectionKind) -> Option<&[u8]> { self.buffers[kind.index()].as_deref() }

    pub fn is_present(&self, kind: SectionKind) -> bool { self.buffers[kind.index()].is_some() }

    /// Present sections in canonical order.
    pub fn iter(&self) -> impl Iterator<Item = (SectionKind, &[u8])> {
        SectionKind::ALL
            .into_iter()
            .filter_map(move |kind| self.get(kind).map(|bytes| (kind, bytes)))
    }

    /// Materialize `source` into the buffer for `kind`, keeping the size
    /// field of `header` in step with it. `container` is only needed for
    /// [`SectionSource::Range`]; without one every range is out of bounds.
    pub fn resolve<R: Read + Seek>(
        &mut self, kind: SectionKind, source: SectionSource, header: &mut Header,
        container: Option<&mut ContainerReader<R>>,
    ) -> Result<()> {
        let (buffer, size) = match source {
            SectionSource::Absent => {
                if header.section_size(kind) != 0 {
                    warn!(section = %kind, size = header.section_size(kind), "dropping section without content");
                }
                (None, 0)
            }
            SectionSource::External(bytes) => {
                let size = u32::try_from(bytes.len()).map_err(|_| Error::SectionTooLarge {
                    section: kind,
                    len:     bytes.len() as u64,
                })?;
                (Some(bytes), size)
            }
            SectionSource::Range(extent) => {
                let bytes = match container {
                    Some(container) => container.read_range(extent)?,
                    None => {
                        return Err(Error::OutOfRange {
                            offset: extent.offset,
                            size:   u64::from(extent.size),
                            len:    0,
                        })
                    }
                };
                (Some(bytes), extent.size)
            }
        };
        debug!(section = %kind, size, "resolved section");
        self.buffers[kind.index()] = buffer;
        header.set_section_size(kind, size);
        Ok(())
    }
}
