//! The 16-byte header at the start of every disk image.

use crate::directory;

/// Serialized header length in bytes.
pub const HEADER_SIZE: usize = 16;

/// Bytes per FAT slot (one `i32` per data block).
pub const FAT_SLOT_SIZE: usize = 4;

pub const DEFAULT_BLOCK_SIZE: usize = 4096;
pub const DEFAULT_MAX_DISK_SIZE: usize = 1024 * 1024 * 1024;
pub const DEFAULT_MAX_FILES: usize = 64 * 1024;

/// Disk geometry: block size, FAT slot count (= data block count) and
/// directory capacity. Stored little-endian as three `i32`s followed by
/// four reserved zero bytes.
///
/// The regions of the image derive from these three numbers alone:
///
/// ```text
/// [ header 16B ][ FAT = fat_entries x 4B ][ directory = max_files x 32B ][ data ]
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatHeader {
    pub block_size: i32,
    pub fat_entries: i32,
    pub max_files: i32,
}

impl FormatHeader {
    pub fn new(block_size: i32, fat_entries: i32, max_files: i32) -> Self {
        Self {
            block_size,
            fat_entries,
            max_files,
        }
    }

    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut buf = [0u8; HEADER_SIZE];
        buf[0..4].copy_from_slice(&self.block_size.to_le_bytes());
        buf[4..8].copy_from_slice(&self.fat_entries.to_le_bytes());
        buf[8..12].copy_from_slice(&self.max_files.to_le_bytes());
        // bytes 12..16 reserved, kept zero
        buf
    }

    pub fn parse(buf: &[u8; HEADER_SIZE]) -> Self {
        Self {
            block_size: i32::from_le_bytes(buf[0..4].try_into().unwrap()),
            fat_entries: i32::from_le_bytes(buf[4..8].try_into().unwrap()),
            max_files: i32::from_le_bytes(buf[8..12].try_into().unwrap()),
        }
    }

    pub fn fat_offset(&self) -> u64 {
        HEADER_SIZE as u64
    }

    pub fn directory_offset(&self) -> u64 {
        self.fat_offset() + self.fat_entries as u64 * FAT_SLOT_SIZE as u64
    }

    pub fn data_offset(&self) -> u64 {
        self.directory_offset() + self.max_files as u64 * directory::ENTRY_SIZE as u64
    }
}
