use crate::error::{Result, VdiskError};
use crate::geometry::Geometry;
use crate::io::BlockNumber;

/// The raw data region: `block_count` blocks of `block_size` bytes held in
/// one contiguous buffer, laid out exactly as they appear in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockStore {
    block_size: usize,
    data: Vec<u8>,
}

impl BlockStore {
    /// A zeroed store.
    pub fn new(geometry: &Geometry) -> Self {
        Self {
            block_size: geometry.block_size(),
            data: vec![0; geometry.block_count() * geometry.block_size()],
        }
    }

    /// Takes ownership of an image's data region.
    pub fn from_bytes(geometry: &Geometry, data: Vec<u8>) -> Result<Self> {
        let expected = geometry.block_count() * geometry.block_size();
        if data.len() != expected {
            return Err(VdiskError::CorruptImage(format!(
                "block store is {} bytes, expected {}",
                data.len(),
                expected
            )));
        }
        Ok(Self {
            block_size: geometry.block_size(),
            data,
        })
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    pub fn block_count(&self) -> usize {
        self.data.len() / self.block_size
    }

    /// Borrows the full contents of block `blocknr`.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range will return an error.
    pub fn block(&self, blocknr: BlockNumber) -> Result<&[u8]> {
        let start = self.offset(blocknr)?;
        Ok(&self.data[start..start + self.block_size])
    }

    /// Writes `buf` at the start of block `blocknr` and zeroes the rest of the
    /// block.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or more than one block of
    /// data, will return an error.
    pub fn write_block(&mut self, blocknr: BlockNumber, buf: &[u8]) -> Result<()> {
        let start = self.offset(blocknr)?;
        if buf.len() > self.block_size {
            return Err(VdiskError::BlockOverflow {
                len: buf.len(),
                block_size: self.block_size,
            });
        }
        let block = &mut self.data[start..start + self.block_size];
        block[..buf.len()].copy_from_slice(buf);
        block[buf.len()..].fill(0);
        Ok(())
    }

    fn offset(&self, blocknr: BlockNumber) -> Result<usize> {
        if blocknr as usize >= self.block_count() {
            return Err(VdiskError::BlockOutOfRange(blocknr));
        }
        Ok(blocknr as usize * self.block_size)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store(blocks: usize) -> BlockStore {
        let g = Geometry::builder()
            .with_block_size(64)
            .with_block_count(blocks)
            .build()
            .unwrap();
        BlockStore::new(&g)
    }

    #[test]
    fn store_allocates_correct_num_bytes() {
        let store = store(4);
        assert_eq!(store.as_bytes().len(), 4 * 64);
        assert_eq!(store.block_count(), 4);
    }

    #[test]
    fn can_read_and_write_blocks() {
        let mut store = store(4);

        store.write_block(2, &[0x55; 64]).unwrap();

        // Read a different block.
        assert_eq!(store.block(3).unwrap(), &[0x00; 64][..]);
        // Read the block with data.
        assert_eq!(store.block(2).unwrap(), &[0x55; 64][..]);
    }

    #[test]
    fn short_write_zeroes_rest_of_block() {
        let mut store = store(1);
        store.write_block(0, &[0x55; 64]).unwrap();

        store.write_block(0, &[0xAA; 10]).unwrap();

        let block = store.block(0).unwrap();
        assert_eq!(&block[..10], &[0xAA; 10]);
        assert!(block[10..].iter().all(|&b| b == 0));
    }

    #[test]
    fn access_beyond_range_fails() {
        let mut store = store(1);
        assert!(store.block(1).is_err());
        match store.write_block(1, &[0x55; 64]) {
            Err(VdiskError::BlockOutOfRange(1)) => (),
            other => panic!("expected out of range, got {:?}", other),
        }
    }

    #[test]
    fn oversized_write_fails() {
        let mut store = store(2);
        match store.write_block(0, &[0x55; 65]) {
            Err(VdiskError::BlockOverflow { len, block_size }) => {
                assert_eq!(len, 65);
                assert_eq!(block_size, 64);
            }
            other => panic!("expected an overflow, got {:?}", other),
        }
        // Nothing was written.
        assert_eq!(store.block(0).unwrap(), &[0x00; 64][..]);
    }
}
