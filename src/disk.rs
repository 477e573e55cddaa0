//! The public disk facade: one host file, one lock, whole-file operations.

use std::fs::{self, File, OpenOptions};
use std::io;
use std::os::unix::fs::FileExt;
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use log::{debug, info};

use crate::block::BlockStorage;
use crate::directory::{DirectoryManager, NAME_FIELD_SIZE};
use crate::error::{DiskError, Result};
use crate::fat::{FatManager, END_OF_CHAIN};
use crate::header::{
    FormatHeader, DEFAULT_BLOCK_SIZE, DEFAULT_MAX_DISK_SIZE, DEFAULT_MAX_FILES, FAT_SLOT_SIZE,
    HEADER_SIZE,
};

/// A single-file virtual disk.
///
/// All operations take `&self`; an internal readers–writer lock serialises
/// mutations while letting reads run in parallel, so a `FatDisk` can be
/// shared across threads as-is.
#[derive(Debug)]
pub struct FatDisk {
    state: RwLock<DiskState>,
}

#[derive(Debug)]
struct DiskState {
    file: File,
    header: FormatHeader,
    fat: FatManager,
    directory: DirectoryManager,
    storage: BlockStorage,
}

// ─── Lifecycle ─────────────────────────────────────────────────────────────────

impl FatDisk {
    /// Format a fresh disk image at `path` with the default geometry
    /// (4 KiB blocks, 1 GiB data region, 65536 directory slots). Any
    /// existing file at `path` is replaced.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::create_with(
            path,
            DEFAULT_BLOCK_SIZE,
            DEFAULT_MAX_DISK_SIZE,
            DEFAULT_MAX_FILES,
        )
    }

    /// Format a fresh disk image with explicit geometry. The data region
    /// holds `max_disk_size / block_size` blocks.
    pub fn create_with<P: AsRef<Path>>(
        path: P,
        block_size: usize,
        max_disk_size: usize,
        max_files: usize,
    ) -> Result<Self> {
        let path = path.as_ref();
        let header = geometry_header(block_size, max_disk_size, max_files)?;

        if path.exists() {
            fs::remove_file(path)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        file.write_all_at(&header.serialize(), 0)?;
        // Zero-fill the FAT so every block loads as free; the directory
        // and data regions stay sparse until first written.
        let fat_region = vec![0u8; header.fat_entries as usize * FAT_SLOT_SIZE];
        file.write_all_at(&fat_region, header.fat_offset())?;

        info!(
            "formatted disk image {}: {} blocks x {} bytes, {} directory slots",
            path.display(),
            header.fat_entries,
            header.block_size,
            header.max_files
        );
        Self::assemble(file, header)
    }

    /// Open an existing disk image. Fails with [`DiskError::FileNotFound`]
    /// when there is no file at `path`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(DiskError::FileNotFound(path.display().to_string()));
        }
        let file = OpenOptions::new().read(true).write(true).open(path)?;

        let mut raw = [0u8; HEADER_SIZE];
        file.read_exact_at(&mut raw, 0)?;
        let header = FormatHeader::parse(&raw);
        if header.block_size <= 0 || header.fat_entries < 0 || header.max_files < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "disk header carries invalid geometry",
            )
            .into());
        }

        info!(
            "loaded disk image {}: {} blocks x {} bytes, {} directory slots",
            path.display(),
            header.fat_entries,
            header.block_size,
            header.max_files
        );
        Self::assemble(file, header)
    }

    fn assemble(file: File, header: FormatHeader) -> Result<Self> {
        let fat = FatManager::load(
            file.try_clone()?,
            header.fat_entries as usize,
            header.fat_offset(),
        )?;
        let directory = DirectoryManager::load(
            file.try_clone()?,
            header.max_files as usize,
            header.directory_offset(),
        )?;
        let storage = BlockStorage::new(
            file.try_clone()?,
            header.data_offset(),
            header.block_size as usize,
        );
        Ok(Self {
            state: RwLock::new(DiskState {
                file,
                header,
                fat,
                directory,
                storage,
            }),
        })
    }

    /// Flush the FAT and directory regions, force the host file durable,
    /// and release the handle. Metadata written since the last `close` is
    /// only guaranteed to survive a crash once this returns.
    pub fn close(self) -> Result<()> {
        let state = self
            .state
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);
        state.fat.flush()?;
        state.directory.flush()?;
        state.file.sync_all()?;
        info!("closed disk image");
        Ok(())
    }
}

// ─── File operations ───────────────────────────────────────────────────────────

impl FatDisk {
    /// Create an empty file. An existing file of the same name is
    /// replaced (its blocks are freed).
    pub fn create_file(&self, name: &str) -> Result<()> {
        validate_file_name(name)?;
        let mut state = self.write_state();
        state.delete_if_present(name)?;
        let index = state
            .directory
            .find_free_entry()
            .ok_or(DiskError::DirectoryFull)?;
        state.directory.update_entry(index, name, END_OF_CHAIN, 0)?;
        Ok(())
    }

    /// Create `name` with `data` as its entire contents, replacing any
    /// previous file of the same name. The old chain is freed before the
    /// new one is allocated, so a failed allocation leaves the name
    /// absent. Empty `data` records an empty file with no blocks.
    pub fn write_file(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        let mut state = self.write_state();
        state.delete_if_present(name)?;
        let index = state
            .directory
            .find_free_entry()
            .ok_or(DiskError::DirectoryFull)?;

        let block_size = state.header.block_size as usize;
        let blocks = state.allocate(data.len().div_ceil(block_size))?;
        state.storage.write(&blocks, data)?;
        state.fat.update_fat_chain(&blocks)?;

        let start_block = blocks.first().copied().unwrap_or(END_OF_CHAIN);
        state
            .directory
            .update_entry(index, name, start_block, data.len() as i32)?;
        Ok(())
    }

    /// Extend an existing file with `data`. The tail of the last block is
    /// filled first; any remainder goes into freshly allocated blocks
    /// spliced onto the chain. A failed allocation leaves the logical
    /// size unchanged (bytes already written into the old tail stay put
    /// but sit past the end of the file).
    pub fn append_file(&self, name: &str, data: &[u8]) -> Result<()> {
        validate_file_name(name)?;
        let mut state = self.write_state();
        let (current_size, mut start_block) = match state.directory.entry(name) {
            Some(entry) => (entry.file_size, entry.start_block),
            None => return Err(DiskError::FileNotFound(name.to_owned())),
        };
        if data.is_empty() {
            return Ok(());
        }

        // An empty file has no chain yet; give it its first block.
        if start_block == END_OF_CHAIN {
            let blocks = state.allocate(1)?;
            state.fat.update_fat_chain(&blocks)?;
            start_block = blocks[0];
            let index = state
                .directory
                .entry_index(name)
                .expect("entry resolved above");
            state.directory.update_entry(index, name, start_block, 0)?;
        }

        let mut last_block = start_block;
        loop {
            let next = state.fat.next_block(last_block);
            if next == END_OF_CHAIN {
                break;
            }
            last_block = next;
        }

        let block_size = state.header.block_size as usize;
        // A non-empty file whose size is an exact block multiple has a
        // full last block and no tail space.
        let offset = match current_size as usize % block_size {
            0 if current_size > 0 => block_size,
            partial => partial,
        };

        let mut written = 0;
        if offset < block_size {
            written = state.storage.append_to_block(last_block, offset, data)?;
        }

        let remaining = data.len() - written;
        if remaining > 0 {
            let blocks = state.allocate(remaining.div_ceil(block_size))?;
            state.fat.update_fat_entry(last_block, blocks[0])?;
            state.fat.update_fat_chain(&blocks)?;
            state.storage.write(&blocks, &data[written..])?;
        }

        state
            .directory
            .update_file_size(name, current_size + data.len() as i32)?;
        Ok(())
    }

    /// Read a file's entire contents.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let state = self.read_state();
        let entry = state
            .directory
            .entry(name)
            .ok_or_else(|| DiskError::FileNotFound(name.to_owned()))?;

        let size = entry.file_size as usize;
        let mut contents = Vec::with_capacity(size);
        let mut current = entry.start_block;
        while current != END_OF_CHAIN && contents.len() < size {
            let block = state.storage.read_block(current)?;
            let take = block.len().min(size - contents.len());
            contents.extend_from_slice(&block[..take]);
            current = state.fat.next_block(current);
        }
        Ok(contents)
    }

    /// Delete a file: free its chain and tombstone its directory slot.
    pub fn delete_file(&self, name: &str) -> Result<()> {
        let mut state = self.write_state();
        if !state.delete_if_present(name)? {
            return Err(DiskError::FileNotFound(name.to_owned()));
        }
        Ok(())
    }

    /// Logical size of a file in bytes.
    pub fn file_size(&self, name: &str) -> Result<usize> {
        let state = self.read_state();
        let entry = state
            .directory
            .entry(name)
            .ok_or_else(|| DiskError::FileNotFound(name.to_owned()))?;
        Ok(entry.file_size as usize)
    }

    /// Names of every live file, in directory slot order.
    pub fn list_files(&self) -> Vec<String> {
        self.read_state().directory.live_files()
    }
}

// ─── Geometry accessors ────────────────────────────────────────────────────────

impl FatDisk {
    pub fn block_size(&self) -> usize {
        self.read_state().header.block_size as usize
    }

    pub fn block_count(&self) -> usize {
        self.read_state().header.fat_entries as usize
    }

    pub fn max_files(&self) -> usize {
        self.read_state().header.max_files as usize
    }

    fn read_state(&self) -> RwLockReadGuard<'_, DiskState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> RwLockWriteGuard<'_, DiskState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DiskState {
    /// Free a file's chain and tombstone its slot, if the name is live.
    /// Runs under the caller's write guard; overwrites call this inline
    /// before re-creating the entry.
    fn delete_if_present(&mut self, name: &str) -> Result<bool> {
        let start_block = match self.directory.entry(name) {
            Some(entry) => entry.start_block,
            None => return Ok(false),
        };
        debug!("releasing '{name}' (chain start {start_block})");
        self.fat.free_chain(start_block)?;
        self.directory.mark_deleted(name)?;
        Ok(true)
    }

    fn allocate(&mut self, blocks_needed: usize) -> Result<Vec<i32>> {
        self.fat
            .allocate_blocks(blocks_needed)
            .ok_or_else(|| DiskError::InsufficientSpace {
                needed: blocks_needed,
                available: self.fat.free_block_count(),
            })
    }
}

fn validate_file_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(DiskError::InvalidFileName(
            "filename cannot be blank".to_owned(),
        ));
    }
    if name.len() > NAME_FIELD_SIZE {
        return Err(DiskError::InvalidFileName(format!(
            "filename '{name}' exceeds {NAME_FIELD_SIZE} bytes"
        )));
    }
    Ok(())
}

fn geometry_header(block_size: usize, max_disk_size: usize, max_files: usize) -> Result<FormatHeader> {
    let invalid = |what: &str| {
        DiskError::Io(io::Error::new(io::ErrorKind::InvalidInput, what.to_owned()))
    };
    if block_size == 0 || block_size > i32::MAX as usize {
        return Err(invalid("block size must be positive and fit in 32 bits"));
    }
    let fat_entries = max_disk_size / block_size;
    if fat_entries > i32::MAX as usize {
        return Err(invalid("disk size addresses more blocks than fit in 32 bits"));
    }
    if max_files > i32::MAX as usize {
        return Err(invalid("directory capacity must fit in 32 bits"));
    }
    Ok(FormatHeader::new(
        block_size as i32,
        fat_entries as i32,
        max_files as i32,
    ))
}
