use crate::error::{Result, VdiskError};
use crate::geometry::Geometry;

/// Encoded size of the superblock at the front of every image.
pub const SB_SIZE: usize = 28;

/// Volume-wide accounting, written at the start of the image.
///
/// `free_blocks` always equals the number of clear bits in the bitmap, and
/// `file_count` the number of in-use file inodes (the root directory is not
/// counted).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SuperBlock {
    /// Milliseconds since epoch when the image was created. Never changes.
    pub created: i64,
    /// Capacity of the block store in bytes.
    pub disk_size: u64,
    pub block_size: u32,
    pub free_blocks: u32,
    pub file_count: u32,
}

impl SuperBlock {
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            created: chrono::Utc::now().timestamp_millis(),
            disk_size: geometry.disk_size(),
            block_size: geometry.block_size() as u32,
            free_blocks: geometry.block_count() as u32,
            file_count: 0,
        }
    }

    /// Reads a superblock from a buffer of exactly `SB_SIZE` bytes.
    pub fn parse(buf: &[u8]) -> Result<Self> {
        if buf.len() != SB_SIZE {
            return Err(VdiskError::CorruptImage(format!(
                "superblock is {} bytes, expected {}",
                buf.len(),
                SB_SIZE
            )));
        }

        Ok(Self {
            created: i64::from_be_bytes(field(buf, 0)),
            disk_size: u64::from_be_bytes(field(buf, 8)),
            block_size: u32::from_be_bytes(field(buf, 16)),
            free_blocks: u32::from_be_bytes(field(buf, 20)),
            file_count: u32::from_be_bytes(field(buf, 24)),
        })
    }

    /// The encoding is the struct fields in declaration order, big endian.
    pub fn serialize(&self) -> Vec<u8> {
        let mut sb_encoded = Vec::with_capacity(SB_SIZE);
        sb_encoded.extend_from_slice(&self.created.to_be_bytes());
        sb_encoded.extend_from_slice(&self.disk_size.to_be_bytes());
        sb_encoded.extend_from_slice(&self.block_size.to_be_bytes());
        sb_encoded.extend_from_slice(&self.free_blocks.to_be_bytes());
        sb_encoded.extend_from_slice(&self.file_count.to_be_bytes());
        sb_encoded
    }

    /// Checks the superblock was written for a disk of this shape.
    pub fn check(&self, geometry: &Geometry) -> Result<()> {
        if self.block_size as usize != geometry.block_size()
            || self.disk_size != geometry.disk_size()
        {
            return Err(VdiskError::CorruptImage(format!(
                "superblock describes {} bytes in {}-byte blocks, expected {} in {}-byte blocks",
                self.disk_size,
                self.block_size,
                geometry.disk_size(),
                geometry.block_size()
            )));
        }
        if self.free_blocks as usize > geometry.block_count() {
            return Err(VdiskError::CorruptImage(format!(
                "{} free blocks on a {}-block disk",
                self.free_blocks,
                geometry.block_count()
            )));
        }
        Ok(())
    }
}

fn field<const N: usize>(buf: &[u8], at: usize) -> [u8; N] {
    let mut bytes = [0; N];
    bytes.copy_from_slice(&buf[at..at + N]);
    bytes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_encode_and_decode_superblocks() {
        let mut sb = SuperBlock::new(&Geometry::default());
        sb.free_blocks = 56;
        sb.file_count = 5;
        let encoded = sb.serialize();
        assert_eq!(encoded.len(), SB_SIZE);

        let parsed = SuperBlock::parse(&encoded).unwrap();

        assert_eq!(parsed, sb);
    }

    #[test]
    fn fields_are_big_endian_in_declaration_order() {
        let sb = SuperBlock {
            created: 1,
            disk_size: 2,
            block_size: 3,
            free_blocks: 4,
            file_count: 5,
        };
        let encoded = sb.serialize();
        assert_eq!(encoded[7], 1);
        assert_eq!(encoded[15], 2);
        assert_eq!(encoded[19], 3);
        assert_eq!(encoded[23], 4);
        assert_eq!(encoded[27], 5);
    }

    #[test]
    fn parsing_buffer_with_invalid_size_fails() {
        let wrong_size_buffer = vec![0; 512];
        assert!(SuperBlock::parse(&wrong_size_buffer).is_err());
    }

    #[test]
    fn rejects_superblock_from_another_geometry() {
        let small = Geometry::builder()
            .with_block_size(512)
            .with_block_count(64)
            .build()
            .unwrap();
        let sb = SuperBlock::new(&small);
        assert!(sb.check(&small).is_ok());
        assert!(sb.check(&Geometry::default()).is_err());
    }
}
