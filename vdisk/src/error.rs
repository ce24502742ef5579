use std::path::PathBuf;

use thiserror::Error;

/// Broad classes of failure. Every `VdiskError` falls into exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// No free blocks, inode slots or directory slots remain.
    CapacityExhausted,
    /// The caller asked for something the disk cannot represent.
    InvalidArgument,
    /// The requested name is not in the directory.
    NotFound,
    /// The host filesystem refused a read or write.
    Io,
    /// The image or its geometry is inconsistent.
    Corrupt,
}

#[derive(Error, Debug)]
pub enum VdiskError {
    #[error("not enough free blocks: requested {requested}, {available} available")]
    NoFreeBlocks { requested: usize, available: usize },
    #[error("no free inodes")]
    InodeTableFull,
    #[error("directory full")]
    DirectoryFull,
    #[error("filename too long: {len} bytes, limit is {max}")]
    FilenameTooLong { len: usize, max: usize },
    #[error("invalid filename: {0:?}")]
    InvalidFilename(String),
    #[error("file too large: {size} bytes, limit is {max}")]
    FileTooLarge { size: usize, max: usize },
    #[error("{len} bytes do not fit in a {block_size}-byte block")]
    BlockOverflow { len: usize, block_size: usize },
    #[error("too many blocks for one inode: {count}, limit is {max}")]
    TooManyBlocks { count: usize, max: usize },
    #[error("file already exists: {0:?}")]
    AlreadyExists(String),
    #[error("disk is not initialized")]
    Uninitialized,
    #[error("disk is already initialized")]
    AlreadyInitialized,
    #[error("found no file named {0:?}")]
    NotFound(String),
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid disk geometry: {0}")]
    InvalidGeometry(String),
    #[error("corrupt disk image: {0}")]
    CorruptImage(String),
    #[error("block {0} out of range")]
    BlockOutOfRange(u32),
}

impl VdiskError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoFreeBlocks { .. } | Self::InodeTableFull | Self::DirectoryFull => {
                ErrorKind::CapacityExhausted
            }
            Self::FilenameTooLong { .. }
            | Self::InvalidFilename(_)
            | Self::FileTooLarge { .. }
            | Self::BlockOverflow { .. }
            | Self::TooManyBlocks { .. }
            | Self::AlreadyExists(_)
            | Self::Uninitialized
            | Self::AlreadyInitialized => ErrorKind::InvalidArgument,
            Self::NotFound(_) => ErrorKind::NotFound,
            Self::Io { .. } => ErrorKind::Io,
            Self::InvalidGeometry(_) | Self::CorruptImage(_) | Self::BlockOutOfRange(_) => {
                ErrorKind::Corrupt
            }
        }
    }

    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, VdiskError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errors_map_onto_taxonomy() {
        assert_eq!(
            VdiskError::NoFreeBlocks {
                requested: 2,
                available: 1
            }
            .kind(),
            ErrorKind::CapacityExhausted
        );
        assert_eq!(
            VdiskError::FilenameTooLong { len: 20, max: 15 }.kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(
            VdiskError::BlockOverflow {
                len: 65,
                block_size: 64
            }
            .kind(),
            ErrorKind::InvalidArgument
        );
        assert_eq!(VdiskError::NotFound("a".into()).kind(), ErrorKind::NotFound);
        assert_eq!(
            VdiskError::CorruptImage("short".into()).kind(),
            ErrorKind::Corrupt
        );
    }

    #[test]
    fn io_errors_carry_the_path() {
        let err = VdiskError::io(
            "/nowhere/disk.vd",
            std::io::Error::new(std::io::ErrorKind::NotFound, "missing"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("/nowhere/disk.vd"));
    }
}
