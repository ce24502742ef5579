use crate::error::{Result, VdiskError};
use crate::geometry::Geometry;

pub const DOT: &str = ".";
pub const DOTDOT: &str = "..";

/// A name paired with the inode it refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    pub ino: u32,
    pub name: String,
}

impl DirEntry {
    /// Checks `name` fits a directory slot of `max_len` bytes. Empty names
    /// and names containing NUL would read back as an empty slot, so both
    /// are rejected.
    pub fn new(ino: u32, name: &str, max_len: usize) -> Result<Self> {
        if name.len() > max_len {
            return Err(VdiskError::FilenameTooLong {
                len: name.len(),
                max: max_len,
            });
        }
        if name.is_empty() || name.contains('\0') {
            return Err(VdiskError::InvalidFilename(name.to_string()));
        }
        Ok(Self {
            ino,
            name: name.to_string(),
        })
    }
}

/// The flat directory stored in a single block.
///
/// Slots are filled in storage order and never removed. An empty slot is
/// one whose name starts with a zero byte.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Directory {
    entries: Vec<Option<DirEntry>>,
    filename_len: usize,
}

impl Directory {
    /// A directory with "." and ".." already in place. For the root both
    /// point at the root itself.
    pub fn new(self_ino: u32, parent_ino: u32, geometry: &Geometry) -> Self {
        let mut entries = vec![None; geometry.dir_capacity()];
        entries[0] = Some(DirEntry {
            ino: parent_ino,
            name: DOTDOT.to_string(),
        });
        entries[1] = Some(DirEntry {
            ino: self_ino,
            name: DOT.to_string(),
        });
        Self {
            entries,
            filename_len: geometry.filename_len(),
        }
    }

    pub fn parse(block: &[u8], geometry: &Geometry) -> Result<Self> {
        let entry_size = geometry.dir_entry_size();
        if block.len() != geometry.block_size() {
            return Err(VdiskError::CorruptImage(format!(
                "directory block is {} bytes, expected {}",
                block.len(),
                geometry.block_size()
            )));
        }

        let entries = block
            .chunks_exact(entry_size)
            .take(geometry.dir_capacity())
            .map(|raw| {
                let (ino, name) = raw.split_at(4);
                if name[0] == 0 {
                    return Ok(None);
                }
                let end = name.iter().position(|&b| b == 0).unwrap_or(name.len());
                let name = std::str::from_utf8(&name[..end]).map_err(|_| {
                    VdiskError::CorruptImage("directory entry is not UTF-8".to_string())
                })?;
                let mut ino_bytes = [0; 4];
                ino_bytes.copy_from_slice(ino);
                Ok(Some(DirEntry {
                    ino: u32::from_be_bytes(ino_bytes),
                    name: name.to_string(),
                }))
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            entries,
            filename_len: geometry.filename_len(),
        })
    }

    /// Encodes into a full block: each slot is a big endian inode number then
    /// the zero-padded name. Bytes past the last slot are zero.
    pub fn serialize(&self, block_size: usize) -> Vec<u8> {
        let mut block = vec![0; block_size];
        let entry_size = 4 + self.filename_len;
        for (slot, entry) in block.chunks_exact_mut(entry_size).zip(self.entries.iter()) {
            if let Some(entry) = entry {
                slot[..4].copy_from_slice(&entry.ino.to_be_bytes());
                slot[4..4 + entry.name.len()].copy_from_slice(entry.name.as_bytes());
            }
        }
        block
    }

    pub fn has_free_slot(&self) -> bool {
        self.entries.iter().any(Option::is_none)
    }

    /// Writes `entry` into the first empty slot and returns the slot index.
    pub fn add_entry(&mut self, entry: DirEntry) -> Result<usize> {
        let (slot, free) = self
            .entries
            .iter_mut()
            .enumerate()
            .find(|(_, e)| e.is_none())
            .ok_or(VdiskError::DirectoryFull)?;
        *free = Some(entry);
        Ok(slot)
    }

    /// Inode number of the first entry named `name`.
    pub fn resolve(&self, name: &str) -> Result<u32> {
        self.entries()
            .find(|entry| entry.name == name)
            .map(|entry| entry.ino)
            .ok_or_else(|| VdiskError::NotFound(name.to_string()))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries().any(|entry| entry.name == name)
    }

    /// Occupied slots in storage order.
    pub fn entries(&self) -> impl Iterator<Item = &DirEntry> {
        self.entries.iter().flatten()
    }
}
