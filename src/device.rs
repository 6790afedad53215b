use std::{
    fs::{File, OpenOptions},
    io::{ErrorKind, Seek, SeekFrom},
    path::Path,
};

use tracing::debug;

use crate::error::Result;

/// Backing store of an image: its byte size and whether that size is fixed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetInfo {
    pub size:            u64,
    pub is_block_device: bool,
}
impl TargetInfo {
    pub fn file(size: u64) -> Self {
        TargetInfo {
            size,
            is_block_device: false,
        }
    }

    pub fn block_device(capacity: u64) -> Self {
        TargetInfo {
            size:            capacity,
            is_block_device: true,
        }
    }
}

#[cfg(unix)]
fn is_block_device(file_type: std::fs::FileType) -> bool {
    use std::os::unix::fs::FileTypeExt;
    file_type.is_block_device()
}

#[cfg(not(unix))]
fn is_block_device(_: std::fs::FileType) -> bool { false }

/// Size of the open image. Block devices report their capacity, which is
/// found by seeking to the end; the cursor is left at the start.
pub fn query(file: &mut File) -> Result<TargetInfo> {
    let meta = file.metadata()?;
    if is_block_device(meta.file_type()) {
        let capacity = file.seek(SeekFrom::End(0))?;
        file.rewind()?;
        debug!(capacity, "image is a block device");
        Ok(TargetInfo::block_device(capacity))
    } else {
        Ok(TargetInfo::file(meta.len()))
    }
}

/// Check the target of a new image. Only a block device has a size that
/// carries over; a missing or regular file starts out empty.
pub fn probe(path: &Path) -> Result<Option<TargetInfo>> {
    let meta = match std::fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    if !is_block_device(meta.file_type()) {
        return Ok(None);
    }
    let mut file = OpenOptions::new().read(true).open(path)?;
    query(&mut file).map(Some)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn regular_file() {
        let mut file = tempfile::tempfile().unwrap();
        file.write_all(&[0; 300]).unwrap();
        assert_eq!(query(&mut file).unwrap(), TargetInfo::file(300));
    }

    #[test]
    fn probe_new_image() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("boot.img");
        assert_eq!(probe(&path).unwrap(), None);
        std::fs::write(&path, [1, 2, 3]).unwrap();
        assert_eq!(probe(&path).unwrap(), None);
    }
}
