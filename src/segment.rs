use memmap2::{Mmap, MmapOptions};
use std::fmt;
use std::fs::File;
use std::io;
use std::ops::Deref;
use std::path::Path;

/// Bytes of one dumped memory segment.
///
/// Files are memory-mapped; empty files and test buffers are held in an owned
/// vector since a zero-length mapping is not portable.
pub enum SegmentData {
    Mapped(Mmap),
    Owned(Vec<u8>),
}

impl SegmentData {
    pub fn load(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        if file.metadata()?.len() == 0 {
            return Ok(Self::Owned(Vec::new()));
        }
        let mmap = unsafe { MmapOptions::new().map(&file)? };
        Ok(Self::Mapped(mmap))
    }
}

impl From<Vec<u8>> for SegmentData {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Owned(bytes)
    }
}

impl Deref for SegmentData {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        match self {
            Self::Mapped(mmap) => mmap,
            Self::Owned(bytes) => bytes,
        }
    }
}

impl fmt::Debug for SegmentData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mapped(mmap) => write!(f, "SegmentData::Mapped({} bytes)", mmap.len()),
            Self::Owned(bytes) => write!(f, "SegmentData::Owned({} bytes)", bytes.len()),
        }
    }
}
