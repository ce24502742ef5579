//! A single-volume virtual disk stored as one flat image file.
//!
//! The image holds a superblock, a free-block bitmap, a fixed inode table and
//! the block store, in that order. Files live in one flat root directory
//! that fits in a single block. Each file is split across at most
//! `INODE_BLOCKS` blocks, listed in order in its inode.
//!
//! ```no_run
//! use vdisk::{Geometry, VirtualDisk};
//!
//! # fn main() -> vdisk::Result<()> {
//! let mut disk = VirtualDisk::create(Geometry::default())?;
//! disk.save_file("hello.txt", b"hello")?;
//! disk.save("disk.vd")?;
//!
//! let disk = VirtualDisk::load("disk.vd", Geometry::default())?;
//! assert_eq!(disk.read_file("hello.txt")?, b"hello");
//! # Ok(())
//! # }
//! ```

mod alloc;
mod dir;
mod disk;
mod error;
mod geometry;
pub mod io;
mod node;
mod sb;

pub use crate::alloc::{Bitmap, State};
pub use crate::dir::DirEntry;
pub use crate::disk::VirtualDisk;
pub use crate::error::{ErrorKind, Result, VdiskError};
pub use crate::geometry::{Geometry, GeometryBuilder, INODE_BLOCKS};
pub use crate::node::{Inode, InodeKind};
pub use crate::sb::SuperBlock;
