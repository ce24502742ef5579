use crate::error::{Result, VdiskError};
use crate::node::INODE_SIZE;
use crate::sb::SB_SIZE;

/// Number of block slots in an inode. There are no indirect blocks, so this
/// also bounds the size of a single file.
pub const INODE_BLOCKS: usize = 16;

/// 32k blocks, 4096 of them, for a 128M block store.
pub const DEFAULT_BLOCK_SIZE: usize = 32 * 1024;
pub const DEFAULT_BLOCK_COUNT: usize = 4096;
pub const DEFAULT_INODE_COUNT: usize = 256;
pub const DEFAULT_FILENAME_LEN: usize = 15;

/// Bytes used by the inode number at the front of every directory entry.
const DIR_INO_SIZE: usize = 4;

/// Shape of a virtual disk. Every component sizes itself from these values,
/// and an image can only be loaded with the geometry it was created with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    block_size: usize,
    block_count: usize,
    inode_count: usize,
    filename_len: usize,
}

impl Default for Geometry {
    fn default() -> Self {
        Self {
            block_size: DEFAULT_BLOCK_SIZE,
            block_count: DEFAULT_BLOCK_COUNT,
            inode_count: DEFAULT_INODE_COUNT,
            filename_len: DEFAULT_FILENAME_LEN,
        }
    }
}

impl Geometry {
    pub fn builder() -> GeometryBuilder {
        GeometryBuilder {
            geometry: Geometry::default(),
        }
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn block_count(&self) -> usize {
        self.block_count
    }

    pub fn inode_count(&self) -> usize {
        self.inode_count
    }

    pub fn filename_len(&self) -> usize {
        self.filename_len
    }

    /// Capacity of the block store in bytes.
    pub fn disk_size(&self) -> u64 {
        self.block_size as u64 * self.block_count as u64
    }

    pub fn max_file_size(&self) -> usize {
        INODE_BLOCKS * self.block_size
    }

    pub fn dir_entry_size(&self) -> usize {
        DIR_INO_SIZE + self.filename_len
    }

    /// How many entries fit in the single block backing a directory.
    pub fn dir_capacity(&self) -> usize {
        self.block_size / self.dir_entry_size()
    }

    pub fn bitmap_len(&self) -> usize {
        (self.block_count + 7) / 8
    }

    pub fn inode_table_len(&self) -> usize {
        self.inode_count * INODE_SIZE
    }

    /// Exact length of a serialized image.
    pub fn image_len(&self) -> usize {
        SB_SIZE + self.bitmap_len() + self.inode_table_len() + self.block_count * self.block_size
    }

    /// Splits a byte count into `(full, partial)` blocks, where `partial` is 1
    /// when the last block is only partly used.
    pub fn blocks_needed(&self, size: usize) -> (usize, usize) {
        let full = size / self.block_size;
        let partial = if size % self.block_size != 0 { 1 } else { 0 };
        (full, partial)
    }
}

pub struct GeometryBuilder {
    geometry: Geometry,
}

impl GeometryBuilder {
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.geometry.block_size = bytes;
        self
    }

    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.geometry.block_count = blocks;
        self
    }

    pub fn with_inode_count(mut self, inodes: usize) -> Self {
        self.geometry.inode_count = inodes;
        self
    }

    pub fn with_filename_len(mut self, len: usize) -> Self {
        self.geometry.filename_len = len;
        self
    }

    pub fn build(self) -> Result<Geometry> {
        let g = self.geometry;
        let invalid =
            |msg: String| -> Result<Geometry> { Err(VdiskError::InvalidGeometry(msg)) };

        if g.block_size == 0 {
            return invalid("block size must be non-zero".to_string());
        }
        if g.block_size.checked_mul(INODE_BLOCKS).map_or(true, |max| max > u32::MAX as usize) {
            return invalid(format!("block size {} overflows file size field", g.block_size));
        }
        if g.block_count == 0 || g.block_count > u32::MAX as usize {
            return invalid(format!("block count {} out of range", g.block_count));
        }
        if g.inode_count == 0 || g.inode_count > u32::MAX as usize {
            return invalid(format!("inode count {} out of range", g.inode_count));
        }
        // ".." must fit in a name field.
        if g.filename_len < 2 {
            return invalid(format!("filename length {} below 2", g.filename_len));
        }
        if g.dir_capacity() < 2 {
            return invalid(format!(
                "{}-byte block cannot hold \".\" and \"..\"",
                g.block_size
            ));
        }
        let store = g.block_count.checked_mul(g.block_size);
        let table = g.inode_count.checked_mul(INODE_SIZE);
        let total = store
            .zip(table)
            .and_then(|(store, table)| store.checked_add(table))
            .and_then(|len| len.checked_add(SB_SIZE + g.bitmap_len()));
        if total.is_none() {
            return invalid("image does not fit in memory".to_string());
        }
        Ok(g)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_describe_a_128m_store() {
        let g = Geometry::default();
        assert_eq!(g.disk_size(), 128 * 1024 * 1024);
        assert_eq!(g.max_file_size(), 16 * 32 * 1024);
        assert_eq!(g.dir_capacity(), 32 * 1024 / 19);
        assert_eq!(g.bitmap_len(), 512);
    }

    #[test]
    fn splits_sizes_into_full_and_partial_blocks() {
        let g = Geometry::builder().with_block_size(512).build().unwrap();
        assert_eq!(g.blocks_needed(0), (0, 0));
        assert_eq!(g.blocks_needed(1), (0, 1));
        assert_eq!(g.blocks_needed(512), (1, 0));
        assert_eq!(g.blocks_needed(513), (1, 1));
        assert_eq!(g.blocks_needed(3 * 512), (3, 0));
    }

    #[test]
    fn image_len_sums_every_region() {
        let g = Geometry::builder()
            .with_block_size(512)
            .with_block_count(64)
            .with_inode_count(16)
            .build()
            .unwrap();
        assert_eq!(g.image_len(), SB_SIZE + 8 + 16 * INODE_SIZE + 64 * 512);
    }

    #[test]
    fn rejects_degenerate_geometry() {
        assert!(Geometry::builder().with_block_size(0).build().is_err());
        assert!(Geometry::builder().with_block_count(0).build().is_err());
        assert!(Geometry::builder().with_inode_count(0).build().is_err());
        assert!(Geometry::builder().with_filename_len(1).build().is_err());
        // One 19-byte entry per 32-byte block leaves no room for "..".
        assert!(Geometry::builder().with_block_size(32).build().is_err());
    }
}
