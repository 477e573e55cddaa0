//! Byte-aligned I/O against the data region of the image.

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use crate::error::{DiskError, Result};

/// Raw access to the fixed-size data blocks. Stateless apart from the
/// region geometry; all I/O is positional, so readers never contend on a
/// shared cursor.
#[derive(Debug)]
pub struct BlockStorage {
    file: File,
    base_offset: u64,
    block_size: usize,
}

impl BlockStorage {
    pub fn new(file: File, base_offset: u64, block_size: usize) -> Self {
        Self {
            file,
            base_offset,
            block_size,
        }
    }

    /// Write `data` across `blocks` in order, one full block per index
    /// except possibly the last. The caller supplies enough bytes to fill
    /// every listed block but the final one.
    pub fn write(&self, blocks: &[i32], mut data: &[u8]) -> io::Result<()> {
        for &block in blocks {
            let chunk = data.len().min(self.block_size);
            self.file
                .write_all_at(&data[..chunk], self.block_position(block))?;
            data = &data[chunk..];
        }
        Ok(())
    }

    /// Fill the tail of `block` starting at `offset`. Writes at most
    /// `block_size - offset` bytes and returns how many were written.
    pub fn append_to_block(&self, block: i32, offset: usize, data: &[u8]) -> Result<usize> {
        if offset >= self.block_size {
            return Err(DiskError::InvalidBlockOperation {
                block,
                offset,
                block_size: self.block_size,
            });
        }
        let chunk = data.len().min(self.block_size - offset);
        self.file
            .write_all_at(&data[..chunk], self.block_position(block) + offset as u64)?;
        Ok(chunk)
    }

    /// Read one full block. Bytes past the current end of the host file
    /// read as zero; the image is sparse and unwritten space is never
    /// materialised.
    pub fn read_block(&self, block: i32) -> io::Result<Vec<u8>> {
        let mut buf = vec![0u8; self.block_size];
        read_into_at(&self.file, &mut buf, self.block_position(block))?;
        Ok(buf)
    }

    fn block_position(&self, block: i32) -> u64 {
        debug_assert!(block >= 0);
        self.base_offset + block as u64 * self.block_size as u64
    }
}

/// Fill as much of `buf` as the file provides at `offset`; anything past
/// the end of the file is left zeroed.
pub(crate) fn read_into_at(file: &File, mut buf: &mut [u8], mut offset: u64) -> io::Result<()> {
    while !buf.is_empty() {
        match file.read_at(buf, offset) {
            Ok(0) => break,
            Ok(n) => {
                let rest = buf;
                buf = &mut rest[n..];
                offset += n as u64;
            }
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
