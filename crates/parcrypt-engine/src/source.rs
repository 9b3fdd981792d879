//! Positioned access to the payload
//!
//! Each worker opens its own reader so no file handle or seek position is
//! shared between threads.

use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

/// Random-access view of the bytes after the header
pub trait ChunkSource: Send + Sync {
    /// Payload length in bytes
    fn len(&self) -> u64;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// A reader positioned at `offset` bytes into the payload.
    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send + '_>>;
}

/// Payload stored in a file, starting `payload_offset` bytes in
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    payload_offset: u64,
    payload_len: u64,
}

impl FileSource {
    pub fn open(path: &Path, payload_offset: u64) -> io::Result<Self> {
        let file_len = std::fs::metadata(path)?.len();
        let payload_len = file_len.checked_sub(payload_offset).ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("file is {file_len} bytes, shorter than its {payload_offset}-byte header"),
            )
        })?;
        Ok(Self {
            path: path.to_path_buf(),
            payload_offset,
            payload_len,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ChunkSource for FileSource {
    fn len(&self) -> u64 {
        self.payload_len
    }

    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send + '_>> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(self.payload_offset + offset))?;
        Ok(Box::new(file))
    }
}

/// In-memory payload
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    data: Vec<u8>,
}

impl MemorySource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self { data: data.into() }
    }
}

impl ChunkSource for MemorySource {
    fn len(&self) -> u64 {
        self.data.len() as u64
    }

    fn open_at(&self, offset: u64) -> io::Result<Box<dyn Read + Send + '_>> {
        let start = usize::try_from(offset)
            .ok()
            .filter(|&o| o <= self.data.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "offset past end"))?;
        Ok(Box::new(Cursor::new(&self.data[start..])))
    }
}
