use zerocopy::byteorder::{BigEndian, I64, U32};
use zerocopy::{AsBytes, FromBytes, FromZeroes, Unaligned};

use crate::error::{Result, VdiskError};
use crate::geometry::{Geometry, INODE_BLOCKS};
use crate::io::BlockNumber;

/// Encoded size of one inode record.
pub const INODE_SIZE: usize = std::mem::size_of::<RawInode>();

/// Slot of the root directory in the inode table.
pub const ROOT_INO: u32 = 0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InodeKind {
    File,
    Directory,
}

impl InodeKind {
    fn encode(self) -> u8 {
        match self {
            InodeKind::File => 0,
            InodeKind::Directory => 1,
        }
    }

    fn decode(tag: u8) -> Result<Self> {
        match tag {
            0 => Ok(InodeKind::File),
            1 => Ok(InodeKind::Directory),
            _ => Err(VdiskError::CorruptImage(format!("unknown inode type {}", tag))),
        }
    }
}

/// Metadata for one file or for the root directory.
///
/// The first `ceil(size / block_size)` entries of `blocks` hold the file's
/// content in order. Trailing entries are zero.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Inode {
    /// Timestamps are milliseconds since epoch.
    pub created: i64,
    pub modified: i64,
    pub accessed: i64,
    /// The total size of the file in bytes.
    pub size: u32,
    pub blocks: [BlockNumber; INODE_BLOCKS],
    pub links: u8,
    pub kind: InodeKind,
    pub in_use: bool,
}

impl Inode {
    pub fn empty() -> Self {
        Self {
            created: 0,
            modified: 0,
            accessed: 0,
            size: 0,
            blocks: [0; INODE_BLOCKS],
            links: 0,
            kind: InodeKind::File,
            in_use: false,
        }
    }

    /// The root directory occupies exactly one block.
    pub fn root(dir_block: BlockNumber, block_size: u32) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let mut blocks = [0; INODE_BLOCKS];
        blocks[0] = dir_block;
        Self {
            created: now,
            modified: now,
            accessed: now,
            size: block_size,
            blocks,
            links: 1,
            kind: InodeKind::Directory,
            in_use: true,
        }
    }

    /// Builds a file inode over blocks that have already been allocated, in
    /// file order.
    pub fn new_file(size: u32, block_list: &[BlockNumber]) -> Result<Self> {
        if block_list.len() > INODE_BLOCKS {
            return Err(VdiskError::TooManyBlocks {
                count: block_list.len(),
                max: INODE_BLOCKS,
            });
        }

        let now = chrono::Utc::now().timestamp_millis();
        let mut blocks = [0; INODE_BLOCKS];
        blocks[..block_list.len()].copy_from_slice(block_list);
        Ok(Self {
            created: now,
            modified: now,
            accessed: now,
            size,
            blocks,
            links: 1,
            kind: InodeKind::File,
            in_use: true,
        })
    }

    /// The populated prefix of the block list.
    pub fn used_blocks(&self, geometry: &Geometry) -> Result<&[BlockNumber]> {
        let (full, partial) = geometry.blocks_needed(self.size as usize);
        self.blocks.get(..full + partial).ok_or_else(|| {
            VdiskError::CorruptImage(format!(
                "inode claims {} bytes, more than {} blocks",
                self.size, INODE_BLOCKS
            ))
        })
    }

    fn parse(buf: &[u8]) -> Result<Self> {
        let raw = RawInode::read_from(buf).ok_or_else(|| {
            VdiskError::CorruptImage(format!("inode record is {} bytes", buf.len()))
        })?;
        let in_use = match raw.in_use {
            0 => false,
            1 => true,
            flag => {
                return Err(VdiskError::CorruptImage(format!(
                    "inode in-use flag {}",
                    flag
                )))
            }
        };

        let mut blocks = [0; INODE_BLOCKS];
        for (slot, raw_block) in blocks.iter_mut().zip(raw.blocks.iter()) {
            *slot = raw_block.get();
        }
        Ok(Self {
            created: raw.created.get(),
            modified: raw.modified.get(),
            accessed: raw.accessed.get(),
            size: raw.size.get(),
            blocks,
            links: raw.links,
            kind: InodeKind::decode(raw.kind)?,
            in_use,
        })
    }

    fn to_raw(&self) -> RawInode {
        let mut raw = RawInode::new_zeroed();
        raw.created.set(self.created);
        raw.modified.set(self.modified);
        raw.accessed.set(self.accessed);
        raw.size.set(self.size);
        for (raw_block, &block) in raw.blocks.iter_mut().zip(self.blocks.iter()) {
            raw_block.set(block);
        }
        raw.links = self.links;
        raw.kind = self.kind.encode();
        raw.in_use = self.in_use as u8;
        raw
    }
}

/// On-disk layout of an inode. All fields are byte aligned, so the record has
/// no padding and encodes the same way on every platform.
#[repr(C)]
#[derive(FromZeroes, FromBytes, AsBytes, Unaligned)]
struct RawInode {
    created: I64<BigEndian>,
    modified: I64<BigEndian>,
    accessed: I64<BigEndian>,
    size: U32<BigEndian>,
    blocks: [U32<BigEndian>; INODE_BLOCKS],
    links: u8,
    kind: u8,
    in_use: u8,
    _reserved: u8,
}

/// Fixed array of inode slots. Slot 0 belongs to the root directory; files
/// take the first unused slot after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InodeTable {
    nodes: Vec<Inode>,
}

impl InodeTable {
    pub fn new(count: usize) -> Self {
        Self {
            nodes: vec![Inode::empty(); count],
        }
    }

    pub fn parse(buf: &[u8], count: usize) -> Result<Self> {
        if buf.len() != count * INODE_SIZE {
            return Err(VdiskError::CorruptImage(format!(
                "inode table is {} bytes, expected {}",
                buf.len(),
                count * INODE_SIZE
            )));
        }
        let nodes = buf
            .chunks_exact(INODE_SIZE)
            .map(Inode::parse)
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { nodes })
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.nodes.len() * INODE_SIZE);
        for node in self.nodes.iter() {
            buf.extend_from_slice(node.to_raw().as_bytes());
        }
        buf
    }

    pub fn get(&self, ino: u32) -> Option<&Inode> {
        self.nodes.get(ino as usize)
    }

    pub fn root(&self) -> &Inode {
        &self.nodes[ROOT_INO as usize]
    }

    pub fn set_root(&mut self, node: Inode) {
        self.nodes[ROOT_INO as usize] = node;
    }

    /// First slot after the root whose in-use flag is clear.
    pub fn first_unused(&self) -> Option<u32> {
        self.nodes
            .iter()
            .enumerate()
            .skip(1)
            .find(|(_, node)| !node.in_use)
            .map(|(ino, _)| ino as u32)
    }

    /// Stores `node` in the first unused slot and returns its inode number.
    pub fn insert(&mut self, node: Inode) -> Result<u32> {
        let ino = self.first_unused().ok_or(VdiskError::InodeTableFull)?;
        self.nodes[ino as usize] = node;
        Ok(ino)
    }

    /// In-use slots with their inode numbers, root included.
    pub fn in_use(&self) -> impl Iterator<Item = (u32, &Inode)> {
        self.nodes
            .iter()
            .enumerate()
            .filter(|(_, node)| node.in_use)
            .map(|(ino, node)| (ino as u32, node))
    }

    /// Number of in-use inodes holding regular files.
    pub fn file_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|node| node.in_use && node.kind == InodeKind::File)
            .count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inode_record_is_96_bytes() {
        assert_eq!(INODE_SIZE, 96);
    }

    #[test]
    fn new_file_copies_block_list_in_order() {
        let node = Inode::new_file(1500, &[7, 3, 9]).unwrap();
        assert_eq!(&node.blocks[..4], &[7, 3, 9, 0]);
        assert_eq!(node.links, 1);
        assert_eq!(node.kind, InodeKind::File);
        assert!(node.in_use);
        assert_eq!(node.created, node.modified);
    }

    #[test]
    fn new_file_rejects_more_blocks_than_slots() {
        let blocks: Vec<BlockNumber> = (0..17).collect();
        match Inode::new_file(17 * 512, &blocks).unwrap_err() {
            VdiskError::TooManyBlocks { count, max } => {
                assert_eq!(count, 17);
                assert_eq!(max, INODE_BLOCKS);
            }
            e => panic!("unexpected error: {}", e),
        }
    }

    #[test]
    fn used_blocks_follows_file_size() {
        let g = Geometry::builder().with_block_size(512).build().unwrap();
        let node = Inode::new_file(1025, &[4, 5, 6]).unwrap();
        assert_eq!(node.used_blocks(&g).unwrap(), &[4, 5, 6]);

        let mut bogus = node.clone();
        bogus.size = 17 * 512;
        assert!(bogus.used_blocks(&g).is_err());
    }

    #[test]
    fn insert_skips_root_and_used_slots() {
        let mut table = InodeTable::new(4);
        table.set_root(Inode::root(0, 512));

        assert_eq!(table.insert(Inode::new_file(1, &[1]).unwrap()).unwrap(), 1);
        assert_eq!(table.insert(Inode::new_file(1, &[2]).unwrap()).unwrap(), 2);
        assert_eq!(table.insert(Inode::new_file(1, &[3]).unwrap()).unwrap(), 3);
        assert_eq!(table.file_count(), 3);
        let used: Vec<u32> = table.in_use().map(|(ino, _)| ino).collect();
        assert_eq!(used, vec![0, 1, 2, 3]);

        match table.insert(Inode::new_file(1, &[4]).unwrap()) {
            Err(VdiskError::InodeTableFull) => (),
            other => panic!("expected a full table, got {:?}", other),
        }
    }

    #[test]
    fn root_slot_is_never_handed_out() {
        // Even when the root is missing, files start at slot 1.
        let mut table = InodeTable::new(2);
        assert_eq!(table.insert(Inode::new_file(0, &[]).unwrap()).unwrap(), 1);
        assert!(table.insert(Inode::new_file(0, &[]).unwrap()).is_err());
    }

    #[test]
    fn table_survives_serialization() {
        let mut table = InodeTable::new(3);
        table.set_root(Inode::root(0, 512));
        table.insert(Inode::new_file(700, &[1, 2]).unwrap()).unwrap();

        let bytes = table.serialize();
        assert_eq!(bytes.len(), 3 * INODE_SIZE);
        assert_eq!(InodeTable::parse(&bytes, 3).unwrap(), table);
    }

    #[test]
    fn parse_rejects_unknown_kind() {
        let mut bytes = InodeTable::new(1).serialize();
        // kind byte follows three timestamps, the size and the block list.
        bytes[24 + 4 + 4 * INODE_BLOCKS + 1] = 9;
        assert!(InodeTable::parse(&bytes, 1).is_err());
    }
}
