use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use log::{debug, info, warn};

use crate::alloc::{Bitmap, State};
use crate::dir::{DirEntry, Directory, DOT, DOTDOT};
use crate::error::{Result, VdiskError};
use crate::geometry::Geometry;
use crate::io::{BlockNumber, BlockStore};
use crate::node::{Inode, InodeKind, InodeTable, ROOT_INO};
use crate::sb::{SuperBlock, SB_SIZE};

/// A fixed-capacity volume held entirely in memory and persisted as one flat
/// image.
///
/// # Layout
/// ==============================================================
/// | SuperBlock | Bitmap (blocks) | Inode table | Block store  |
/// ==============================================================
///
/// There is no locking. Pointing two processes at the same image file is not
/// supported; the last `save` wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VirtualDisk {
    geometry: Geometry,
    super_block: SuperBlock,
    bitmap: Bitmap,
    inodes: InodeTable,
    blocks: BlockStore,
}

impl VirtualDisk {
    /// An uninitialized disk: every block free and the inode table empty.
    /// Call `initialize` before storing files.
    pub fn new(geometry: Geometry) -> Self {
        Self {
            super_block: SuperBlock::new(&geometry),
            bitmap: Bitmap::new(geometry.block_count()),
            inodes: InodeTable::new(geometry.inode_count()),
            blocks: BlockStore::new(&geometry),
            geometry,
        }
    }

    /// A new disk with its root directory already created.
    pub fn create(geometry: Geometry) -> Result<Self> {
        let mut disk = Self::new(geometry);
        disk.initialize()?;
        Ok(disk)
    }

    pub fn is_initialized(&self) -> bool {
        self.inodes.root().in_use
    }

    /// Creates the root directory in the first free block. Its "." and ".."
    /// both refer to inode 0.
    pub fn initialize(&mut self) -> Result<()> {
        if self.is_initialized() {
            return Err(VdiskError::AlreadyInitialized);
        }

        let dir_block = self.allocate_blocks(1)?[0];
        let root = Directory::new(ROOT_INO, ROOT_INO, &self.geometry);
        self.blocks
            .write_block(dir_block, &root.serialize(self.geometry.block_size()))?;
        self.inodes
            .set_root(Inode::root(dir_block, self.geometry.block_size() as u32));
        self.super_block.created = self.inodes.root().created;

        info!(
            "initialized {} byte disk, root directory in block {}",
            self.super_block.disk_size, dir_block
        );
        Ok(())
    }

    /// Stores `bytes` as a new file called `name` in the root directory and
    /// returns its inode number.
    ///
    /// Every precondition is checked before anything is modified, so a failed
    /// save leaves the disk exactly as it was.
    pub fn save_file(&mut self, name: &str, bytes: &[u8]) -> Result<u32> {
        let mut root = self.read_directory()?;
        let mut entry = DirEntry::new(0, name, self.geometry.filename_len())?;
        if bytes.len() > self.geometry.max_file_size() {
            return Err(VdiskError::FileTooLarge {
                size: bytes.len(),
                max: self.geometry.max_file_size(),
            });
        }
        if root.contains(name) {
            return Err(VdiskError::AlreadyExists(name.to_string()));
        }
        if !root.has_free_slot() {
            return Err(VdiskError::DirectoryFull);
        }
        if self.inodes.first_unused().is_none() {
            return Err(VdiskError::InodeTableFull);
        }

        let (full, partial) = self.geometry.blocks_needed(bytes.len());
        let block_list = self.allocate_blocks(full + partial)?;
        self.write_bytes(&block_list, bytes)?;

        let ino = self
            .inodes
            .insert(Inode::new_file(bytes.len() as u32, &block_list)?)?;
        self.super_block.file_count += 1;

        entry.ino = ino;
        root.add_entry(entry)?;
        self.write_directory(&root)?;

        info!(
            "saved {:?} ({} bytes) as inode {} in blocks {:?}",
            name,
            bytes.len(),
            ino,
            block_list
        );
        Ok(ino)
    }

    /// Reassembles the content of the file called `name`.
    pub fn read_file(&self, name: &str) -> Result<Vec<u8>> {
        let node = self.stat(name)?;
        let size = node.size as usize;
        let (full, _) = self.geometry.blocks_needed(size);
        let block_size = self.geometry.block_size();

        let mut content = Vec::with_capacity(size);
        for (i, &blocknr) in node.used_blocks(&self.geometry)?.iter().enumerate() {
            let block = self.blocks.block(blocknr)?;
            if i < full {
                content.extend_from_slice(block);
            } else {
                content.extend_from_slice(&block[..size % block_size]);
            }
        }
        debug!("read {:?} ({} bytes)", name, content.len());
        Ok(content)
    }

    /// Looks up the inode of the file called `name`.
    pub fn stat(&self, name: &str) -> Result<&Inode> {
        let ino = self.read_directory()?.resolve(name)?;
        match self.inodes.get(ino) {
            Some(node) if node.in_use && node.kind == InodeKind::File => Ok(node),
            // "." and "..".
            Some(node) if node.in_use => Err(VdiskError::NotFound(name.to_string())),
            _ => Err(VdiskError::CorruptImage(format!(
                "{:?} refers to inode {} which holds no file",
                name, ino
            ))),
        }
    }

    /// Files in the root directory in storage order, without "." and "..".
    pub fn list(&self) -> Result<Vec<DirEntry>> {
        Ok(self
            .read_directory()?
            .entries()
            .filter(|entry| entry.name != DOT && entry.name != DOTDOT)
            .cloned()
            .collect())
    }

    pub fn geometry(&self) -> &Geometry {
        &self.geometry
    }

    pub fn super_block(&self) -> &SuperBlock {
        &self.super_block
    }

    pub fn bitmap(&self) -> &Bitmap {
        &self.bitmap
    }

    /// The whole disk in image form.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut image = Vec::with_capacity(self.geometry.image_len());
        image.extend_from_slice(&self.super_block.serialize());
        image.extend_from_slice(&self.bitmap.serialize());
        image.extend_from_slice(&self.inodes.serialize());
        image.extend_from_slice(self.blocks.as_bytes());
        image
    }

    /// Rebuilds a disk from an image made with the same geometry.
    pub fn from_bytes(geometry: Geometry, mut image: Vec<u8>) -> Result<Self> {
        if image.len() != geometry.image_len() {
            return Err(VdiskError::CorruptImage(format!(
                "image is {} bytes, expected {}",
                image.len(),
                geometry.image_len()
            )));
        }

        let bitmap_end = SB_SIZE + geometry.bitmap_len();
        let inodes_end = bitmap_end + geometry.inode_table_len();
        let super_block = SuperBlock::parse(&image[..SB_SIZE])?;
        super_block.check(&geometry)?;
        let bitmap = Bitmap::parse(&image[SB_SIZE..bitmap_end], geometry.block_count())?;
        let inodes = InodeTable::parse(&image[bitmap_end..inodes_end], geometry.inode_count())?;

        if bitmap.count_free() != super_block.free_blocks as usize {
            return Err(VdiskError::CorruptImage(format!(
                "superblock counts {} free blocks, bitmap has {}",
                super_block.free_blocks,
                bitmap.count_free()
            )));
        }
        if inodes.file_count() != super_block.file_count as usize {
            return Err(VdiskError::CorruptImage(format!(
                "superblock counts {} files, inode table has {}",
                super_block.file_count,
                inodes.file_count()
            )));
        }

        check_block_ownership(&geometry, &bitmap, &inodes)?;

        image.drain(..inodes_end);
        let blocks = BlockStore::from_bytes(&geometry, image)?;
        Ok(Self {
            geometry,
            super_block,
            bitmap,
            inodes,
            blocks,
        })
    }

    /// Writes the image to `path`, replacing whatever was there.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|e| VdiskError::io(path, e))?;
        let mut out = BufWriter::new(file);
        out.write_all(&self.to_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| VdiskError::io(path, e))?;
        info!("saved disk image to {}", path.display());
        Ok(())
    }

    /// Reads an image written by `save` with the same geometry.
    pub fn load<P: AsRef<Path>>(path: P, geometry: Geometry) -> Result<Self> {
        let path = path.as_ref();
        let image = std::fs::read(path).map_err(|e| VdiskError::io(path, e))?;
        let disk = Self::from_bytes(geometry, image).map_err(|e| {
            warn!("rejected disk image {}: {}", path.display(), e);
            e
        })?;
        info!("loaded disk image from {}", path.display());
        Ok(disk)
    }

    fn allocate_blocks(&mut self, n: usize) -> Result<Vec<BlockNumber>> {
        let granted = self.bitmap.allocate(n)?;
        self.super_block.free_blocks -= granted.len() as u32;
        Ok(granted)
    }

    /// Copies `bytes` across `block_list` one block-sized chunk at a time. A
    /// final short chunk lands at the start of the last block.
    fn write_bytes(&mut self, block_list: &[BlockNumber], bytes: &[u8]) -> Result<()> {
        let block_size = self.geometry.block_size();
        for (&blocknr, chunk) in block_list.iter().zip(bytes.chunks(block_size)) {
            debug!("writing {} bytes to block {}", chunk.len(), blocknr);
            self.blocks.write_block(blocknr, chunk)?;
        }
        Ok(())
    }

    fn root_block(&self) -> Result<BlockNumber> {
        if !self.is_initialized() {
            return Err(VdiskError::Uninitialized);
        }
        Ok(self.inodes.root().blocks[0])
    }

    fn read_directory(&self) -> Result<Directory> {
        let block = self.blocks.block(self.root_block()?)?;
        Directory::parse(block, &self.geometry)
    }

    fn write_directory(&mut self, dir: &Directory) -> Result<()> {
        let blocknr = self.root_block()?;
        self.blocks
            .write_block(blocknr, &dir.serialize(self.geometry.block_size()))
    }
}

/// Every block an in-use inode points at must be in range, marked used and
/// owned by that inode alone.
fn check_block_ownership(
    geometry: &Geometry,
    bitmap: &Bitmap,
    inodes: &InodeTable,
) -> Result<()> {
    let mut owned = HashSet::new();
    for (ino, node) in inodes.in_use() {
        for &blocknr in node.used_blocks(geometry)? {
            if blocknr as usize >= geometry.block_count() {
                return Err(VdiskError::CorruptImage(format!(
                    "inode {} points at block {} past the end of the disk",
                    ino, blocknr
                )));
            }
            if bitmap.get(blocknr as usize) == State::Free {
                return Err(VdiskError::CorruptImage(format!(
                    "inode {} uses block {} which the bitmap marks free",
                    ino, blocknr
                )));
            }
            if !owned.insert(blocknr) {
                return Err(VdiskError::CorruptImage(format!(
                    "block {} is claimed by more than one inode",
                    blocknr
                )));
            }
        }
    }
    Ok(())
}
