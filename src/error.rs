//! Error types surfaced by disk operations.

use std::io;

use thiserror::Error;

/// Crate-wide result alias.
pub type Result<T> = std::result::Result<T, DiskError>;

/// Everything that can go wrong while operating on a disk image.
///
/// Errors abort the operation that raised them; the disk stays usable.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum DiskError {
    /// The filename is blank or its UTF-8 encoding does not fit the
    /// 24-byte on-disk name field.
    #[error("{0}")]
    InvalidFileName(String),

    /// No live directory entry with this name; also raised when the host
    /// file itself is missing on open.
    #[error("file not found: {0}")]
    FileNotFound(String),

    /// Every directory slot is in use.
    #[error("root directory full")]
    DirectoryFull,

    /// The allocator could not claim enough free blocks.
    #[error("not enough free space: {needed} blocks needed, {available} free")]
    InsufficientSpace { needed: usize, available: usize },

    /// A tail write addressed an offset outside the block.
    #[error("invalid operation on block {block}: offset {offset} exceeds block size {block_size}")]
    InvalidBlockOperation {
        block: i32,
        offset: usize,
        block_size: usize,
    },

    /// Host-file I/O failure.
    #[error(transparent)]
    Io(#[from] io::Error),
}
