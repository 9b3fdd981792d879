//! File framing: `[salt][iv?][payload]`
//!
//! The header is written once before any payload bytes and read once before
//! decryption is planned. Chunk offsets are relative to the end of the header.

use std::io::{self, Read, Write};

use crate::orchestrator::ChunkOutput;

/// Per-file parameters stored ahead of the payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileHeader {
    pub salt: Vec<u8>,
    /// Base IV / GCM nonce; absent for ECB and stream ciphers
    pub iv: Option<Vec<u8>>,
}

impl FileHeader {
    pub fn len(&self) -> usize {
        self.salt.len() + self.iv.as_ref().map_or(0, Vec::len)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub fn write_header<W: Write>(writer: &mut W, header: &FileHeader) -> io::Result<()> {
    writer.write_all(&header.salt)?;
    if let Some(iv) = &header.iv {
        writer.write_all(iv)?;
    }
    Ok(())
}

/// Read a header of `salt_len` salt bytes followed by `iv_len` IV bytes.
pub fn read_header<R: Read>(reader: &mut R, salt_len: usize, iv_len: usize) -> io::Result<FileHeader> {
    let mut salt = vec![0u8; salt_len];
    reader.read_exact(&mut salt)?;
    let iv = if iv_len > 0 {
        let mut iv = vec![0u8; iv_len];
        reader.read_exact(&mut iv)?;
        Some(iv)
    } else {
        None
    };
    Ok(FileHeader { salt, iv })
}

/// Append chunk outputs in ascending index order. Returns bytes written.
pub fn reassemble<W: Write>(writer: &mut W, outputs: Vec<ChunkOutput>) -> io::Result<u64> {
    let mut written = 0;
    for output in outputs {
        written += output.write_to(writer)?;
    }
    Ok(written)
}
