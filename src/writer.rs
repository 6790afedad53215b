use std::{
    fs::File,
    io::{self, copy, repeat, Cursor, Read, Seek, SeekFrom, Write},
};

use tracing::{debug, trace};

use crate::{
    error::{Invalid, Result},
    header::Header,
    layout::Layout,
    section::SectionStore,
    types::{SectionKind, HEADER_SIZE},
};

/// Byte sink an image can be written to and then cut to its final size.
pub trait Sink: Write + Seek {
    fn set_len(&mut self, len: u64) -> io::Result<()>;
}
impl Sink for File {
    fn set_len(&mut self, len: u64) -> io::Result<()> { File::set_len(self, len) }
}
impl Sink for Cursor<Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        resize(self.get_mut(), len)
    }
}
impl Sink for Cursor<&mut Vec<u8>> {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        resize(self.get_mut(), len)
    }
}

fn resize(buffer: &mut Vec<u8>, len: u64) -> io::Result<()> {
    let len = usize::try_from(len).map_err(|_| io::Error::new(io::ErrorKind::OutOfMemory, "image does not fit in memory"))?;
    buffer.resize(len, 0);
    Ok(())
}

pub fn write_zeros<W: Write + ?Sized>(target: &mut W, len: u64) -> io::Result<()> {
    copy(&mut repeat(0).take(len), target)?;
    Ok(())
}

/// Write `header` and the present sections into `target`.
/// The data is written in a single pass in the following order:
/// - header, zero-padded to one page
/// - kernel, ramdisk, second stage and device tree, each at its page
///   aligned offset and zero-padded to the next page
///
/// Sections without content are skipped. The header must already carry its
/// final id. `progress` is called with the byte count of every written
/// section. A failed write leaves the target partially written.
pub fn write_image<W: Write + Seek, P: FnMut(SectionKind, u64)>(
    target: &mut W, header: &Header, sections: &SectionStore, mut progress: P,
) -> Result<Layout> {
    let layout = Layout::of(header)?;
    if (layout.page_size as usize) < HEADER_SIZE {
        return Err(Invalid::PageSizeTooSmall {
            page_size:   layout.page_size,
            header_size: HEADER_SIZE,
        }
        .into());
    }

    target.seek(SeekFrom::Start(0))?;
    target.write_all(&header.encode())?;
    write_zeros(target, u64::from(layout.page_size) - HEADER_SIZE as u64)?;
    trace!("wrote header page");

    for kind in SectionKind::ALL {
        let bytes = match sections.get(kind) {
            Some(bytes) if !bytes.is_empty() => bytes,
            _ => continue,
        };
        let extent = layout.extent(kind);
        debug_assert_eq!(bytes.len(), extent.size as usize);

        target.seek(SeekFrom::Start(extent.offset))?;
        target.write_all(bytes)?;
        write_zeros(target, layout.padding(kind))?;
        debug!(section = %kind, offset = extent.offset, size = extent.size, "wrote section");
        progress(kind, bytes.len() as u64);
    }

    target.flush()?;
    Ok(layout)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{error::Error, section::SectionSource};

    /// Accepts `limit` bytes, then fails every write.
    struct FailingSink {
        inner:   Cursor<Vec<u8>>,
        written: usize,
        limit:   usize,
    }
    impl Write for FailingSink {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.written >= self.limit {
                return Err(io::Error::new(io::ErrorKind::Other, "device full"));
            }
            let len = buf.len().min(self.limit - self.written);
            self.written += len;
            self.inner.write(&buf[..len])
        }

        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }
    impl Seek for FailingSink {
        fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> { self.inner.seek(pos) }
    }

    fn sections(header: &mut Header, kernel: Vec<u8>, ramdisk: Vec<u8>) -> SectionStore {
        let mut store = SectionStore::new();
        store
            .resolve::<Cursor<Vec<u8>>>(SectionKind::Kernel, SectionSource::External(kernel), header, None)
            .unwrap();
        store
            .resolve::<Cursor<Vec<u8>>>(SectionKind::Ramdisk, SectionSource::External(ramdisk), header, None)
            .unwrap();
        store
    }

    #[test]
    fn sections_at_page_offsets() {
        let mut header = Header::new();
        let store = sections(&mut header, vec![0xaa; 5000], vec![0xbb; 3000]);
        let mut target = Cursor::new(Vec::new());
        let mut written = Vec::new();
        let layout = write_image(&mut target, &header, &store, |kind, len| written.push((kind, len))).unwrap();

        let bytes = target.into_inner();
        assert_eq!(layout.total_size, 12288);
        assert_eq!(bytes.len(), 12288);
        assert_eq!(Header::decode(&bytes).unwrap(), header);
        assert!(bytes[HEADER_SIZE..2048].iter().all(|&b| b == 0));
        assert!(bytes[2048..7048].iter().all(|&b| b == 0xaa));
        assert!(bytes[7048..8192].iter().all(|&b| b == 0));
        assert!(bytes[8192..11192].iter().all(|&b| b == 0xbb));
        assert!(bytes[11192..].iter().all(|&b| b == 0));
        assert_eq!(written, [(SectionKind::Kernel, 5000), (SectionKind::Ramdisk, 3000)]);
    }

    #[test]
    fn overwrites_in_place() {
        let mut header = Header::new();
        let store = sections(&mut header, vec![1; 10], vec![2; 10]);
        let mut existing = vec![0xff; 8192];
        let mut target = Cursor::new(&mut existing);
        write_image(&mut target, &header, &store, |_, _| {}).unwrap();
        // bytes past the layout are not touched
        assert_eq!(existing.len(), 8192);
        assert!(existing[6144..].iter().all(|&b| b == 0xff));
        assert!(existing[4096 + 10..6144].iter().all(|&b| b == 0));
    }

    #[test]
    fn rejects_small_pages() {
        let mut header = Header::new();
        let store = sections(&mut header, vec![1], vec![2]);
        header.page_size = 512;
        let mut target = Cursor::new(Vec::new());
        assert!(write_image(&mut target, &header, &store, |_, _| {}).is_err());
        assert!(target.into_inner().is_empty());
    }

    #[test]
    fn write_failure_aborts() {
        let mut header = Header::new();
        let store = sections(&mut header, vec![1; 10], vec![2; 10]);
        // header page and the padded kernel fit, the ramdisk does not
        let mut target = FailingSink {
            inner:   Cursor::new(Vec::new()),
            written: 0,
            limit:   4100,
        };
        let mut written = Vec::new();
        let result = write_image(&mut target, &header, &store, |kind, len| written.push((kind, len)));
        assert!(matches!(result, Err(Error::Io(_))));
        assert_eq!(written, [(SectionKind::Kernel, 10)]);
    }

    #[test]
    fn sink_set_len() {
        let mut sink = Cursor::new(vec![1; 10]);
        Sink::set_len(&mut sink, 4).unwrap();
        assert_eq!(sink.get_ref(), &[1, 1, 1, 1]);
        Sink::set_len(&mut sink, 6).unwrap();
        assert_eq!(sink.get_ref(), &[1, 1, 1, 1, 0, 0]);
    }
}
