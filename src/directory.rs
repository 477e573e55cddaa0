//! The flat root directory: fixed 32-byte records, one per file.
//!
//! A record's state lives in its first byte: `0x00` means the slot was
//! never used, `0xE5` marks a deleted file, anything else begins a live
//! name. Deletion writes the one marker byte and leaves the rest of the
//! record as it was.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;

use crate::block::read_into_at;
use crate::error::{DiskError, Result};

/// On-disk size of one directory record.
pub const ENTRY_SIZE: usize = 32;
/// Capacity of the zero-padded UTF-8 name field.
pub const NAME_FIELD_SIZE: usize = 24;

const TOMBSTONE: u8 = 0xE5;

/// A live directory record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub name: String,
    pub start_block: i32,
    pub file_size: i32,
}

impl DirEntry {
    fn encode(&self) -> [u8; ENTRY_SIZE] {
        let mut buf = [0u8; ENTRY_SIZE];
        let name = self.name.as_bytes();
        buf[..name.len()].copy_from_slice(name);
        buf[NAME_FIELD_SIZE..NAME_FIELD_SIZE + 4].copy_from_slice(&self.start_block.to_le_bytes());
        buf[NAME_FIELD_SIZE + 4..].copy_from_slice(&self.file_size.to_le_bytes());
        buf
    }

    /// Decode a raw slot; `None` for never-used and tombstoned slots. Only
    /// trailing zero padding is stripped from the name.
    fn decode(raw: &[u8]) -> Option<DirEntry> {
        if raw[0] == 0 || raw[0] == TOMBSTONE {
            return None;
        }
        let name_end = raw[..NAME_FIELD_SIZE]
            .iter()
            .rposition(|&b| b != 0)
            .map_or(0, |i| i + 1);
        Some(DirEntry {
            name: String::from_utf8_lossy(&raw[..name_end]).into_owned(),
            start_block: i32::from_le_bytes(raw[NAME_FIELD_SIZE..NAME_FIELD_SIZE + 4].try_into().unwrap()),
            file_size: i32::from_le_bytes(raw[NAME_FIELD_SIZE + 4..ENTRY_SIZE].try_into().unwrap()),
        })
    }
}

#[derive(Debug)]
pub struct DirectoryManager {
    file: File,
    directory_offset: u64,
    entries: Vec<Option<DirEntry>>,
    by_name: HashMap<String, usize>,
}

impl DirectoryManager {
    /// Load the directory region and build the name index from the live
    /// slots. The region may extend past the end of a sparse host file;
    /// missing bytes read as never-used slots.
    pub fn load(file: File, max_files: usize, directory_offset: u64) -> io::Result<Self> {
        let mut raw = vec![0u8; max_files * ENTRY_SIZE];
        read_into_at(&file, &mut raw, directory_offset)?;

        let mut entries = Vec::with_capacity(max_files);
        let mut by_name = HashMap::new();
        for (i, slot) in raw.chunks_exact(ENTRY_SIZE).enumerate() {
            let entry = DirEntry::decode(slot);
            if let Some(e) = &entry {
                by_name.insert(e.name.clone(), i);
            }
            entries.push(entry);
        }

        Ok(Self {
            file,
            directory_offset,
            entries,
            by_name,
        })
    }

    /// Lowest unused slot (never used or tombstoned), if any.
    pub fn find_free_entry(&self) -> Option<usize> {
        self.entries.iter().position(Option::is_none)
    }

    /// Write a full record into `index` and refresh the in-memory views.
    pub fn update_entry(
        &mut self,
        index: usize,
        name: &str,
        start_block: i32,
        file_size: i32,
    ) -> io::Result<()> {
        let entry = DirEntry {
            name: name.to_owned(),
            start_block,
            file_size,
        };
        self.file
            .write_all_at(&entry.encode(), self.slot_position(index))?;
        self.by_name.insert(entry.name.clone(), index);
        self.entries[index] = Some(entry);
        Ok(())
    }

    pub fn entry(&self, name: &str) -> Option<&DirEntry> {
        self.by_name.get(name).and_then(|&i| self.entries[i].as_ref())
    }

    pub fn entry_index(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    /// Tombstone the record: a single `0xE5` over byte 0. Unknown names
    /// are ignored; callers resolve the entry first.
    pub fn mark_deleted(&mut self, name: &str) -> io::Result<()> {
        let Some(&index) = self.by_name.get(name) else {
            return Ok(());
        };
        self.file
            .write_all_at(&[TOMBSTONE], self.slot_position(index))?;
        self.entries[index] = None;
        self.by_name.remove(name);
        Ok(())
    }

    /// Patch only the 4-byte size field of a live record.
    pub fn update_file_size(&mut self, name: &str, new_size: i32) -> Result<()> {
        let index = *self
            .by_name
            .get(name)
            .ok_or_else(|| DiskError::FileNotFound(name.to_owned()))?;
        let pos = self.slot_position(index) + (NAME_FIELD_SIZE + 4) as u64;
        self.file.write_all_at(&new_size.to_le_bytes(), pos)?;
        if let Some(entry) = self.entries[index].as_mut() {
            entry.file_size = new_size;
        }
        Ok(())
    }

    /// Names of every live file, in slot order.
    pub fn live_files(&self) -> Vec<String> {
        self.entries
            .iter()
            .flatten()
            .map(|e| e.name.clone())
            .collect()
    }

    /// Force the directory region to durable storage.
    pub fn flush(&self) -> io::Result<()> {
        self.file.sync_data()
    }

    fn slot_position(&self, index: usize) -> u64 {
        self.directory_offset + (index * ENTRY_SIZE) as u64
    }
}
