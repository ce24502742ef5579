use log::debug;

use crate::error::{Result, VdiskError};
use crate::io::BlockNumber;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    Free,
    Used,
}

/// One bit per block on the disk, 0 for free and 1 for allocated. The bitmap
/// is the only record of which blocks are taken.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bitmap {
    /// Bit `n % 64` of word `n / 64` tracks block `n`.
    bitmap: Vec<u64>,
    /// Number of blocks tracked. Bits past this are always zero.
    len: usize,
}

impl Bitmap {
    pub fn new(len: usize) -> Self {
        Self {
            bitmap: vec![0; (len + 63) / 64],
            len,
        }
    }

    /// Decodes the on-disk form: block `n` is bit `n % 8` of byte `n / 8`.
    pub fn parse(buf: &[u8], len: usize) -> Result<Self> {
        let expected = (len + 7) / 8;
        if buf.len() != expected {
            return Err(VdiskError::CorruptImage(format!(
                "bitmap is {} bytes, expected {}",
                buf.len(),
                expected
            )));
        }

        let mut map = Self::new(len);
        for (i, &byte) in buf.iter().enumerate() {
            map.bitmap[i / 8] |= (byte as u64) << ((i % 8) * 8);
        }
        let tail = len % 64;
        if tail != 0 && map.bitmap.last().map_or(false, |&word| word >> tail != 0) {
            return Err(VdiskError::CorruptImage(
                "bitmap marks blocks past the end of the disk".to_string(),
            ));
        }
        Ok(map)
    }

    pub fn serialize(&self) -> Vec<u8> {
        (0..(self.len + 7) / 8)
            .map(|i| (self.bitmap[i / 8] >> ((i % 8) * 8)) as u8)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn get(&self, blocknr: usize) -> State {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        // Grab the u64 containing the significant bit.
        let word = self.bitmap[blocknr / 64];
        match (word >> (blocknr % 64)) & 0b01 {
            0 => State::Free,
            _ => State::Used,
        }
    }

    pub fn set_reserved(&mut self, blocknr: usize) {
        assert!(blocknr < self.len, "block {} outside bitmap", blocknr);
        self.bitmap[blocknr / 64] |= 0b01_u64 << (blocknr % 64);
    }

    pub fn count_free(&self) -> usize {
        let used: u32 = self.bitmap.iter().map(|word| word.count_ones()).sum();
        self.len - used as usize
    }

    pub fn free_blocks(&self) -> NextAvailableAllocation<'_> {
        NextAvailableAllocation::new(self)
    }

    /// Reserves the first `n` free blocks in ascending order. Nothing is
    /// marked unless all `n` are available.
    pub fn allocate(&mut self, n: usize) -> Result<Vec<BlockNumber>> {
        let granted: Vec<usize> = self.free_blocks().take(n).collect();
        if granted.len() < n {
            return Err(VdiskError::NoFreeBlocks {
                requested: n,
                available: granted.len(),
            });
        }

        for &blocknr in granted.iter() {
            self.set_reserved(blocknr);
        }
        debug!("allocated blocks {:?}", granted);
        Ok(granted.into_iter().map(|b| b as BlockNumber).collect())
    }
}

/// First-fit scan over the bitmap. Each call to the iterator returns the next
/// free block after the previous one, in ascending order.
pub struct NextAvailableAllocation<'a> {
    /// Keeps track of the next starting place for looking for available blocks.
    marker: usize,
    bitmap: &'a Bitmap,
}

impl<'a> NextAvailableAllocation<'a> {
    fn new(bitmap: &'a Bitmap) -> Self {
        Self { marker: 0, bitmap }
    }
}

impl Iterator for NextAvailableAllocation<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<Self::Item> {
        for i in self.marker..self.bitmap.len() {
            if let State::Free = self.bitmap.get(i) {
                self.marker = i + 1;
                return Some(i);
            }
        }
        self.marker = self.bitmap.len();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn can_read_and_write_values_to_bitmap() {
        let mut bmp = Bitmap::new(64);

        bmp.set_reserved(2);

        assert_eq!(bmp.get(0), State::Free);
        assert_eq!(bmp.get(2), State::Used);
    }

    #[test]
    fn can_set_values_at_ends_of_bitmap() {
        let mut bmp = Bitmap::new(4096);

        bmp.set_reserved(0);
        bmp.set_reserved(4095);

        assert_eq!(bmp.get(0), State::Used);
        assert_eq!(bmp.get(4095), State::Used);
        assert_eq!(bmp.count_free(), 4094);
    }

    #[test]
    fn allocates_first_free_blocks_in_ascending_order() {
        let mut bmp = Bitmap::new(16);
        bmp.set_reserved(1);
        bmp.set_reserved(3);

        let granted = bmp.allocate(3).unwrap();

        assert_eq!(granted, vec![0, 2, 4]);
        for &b in granted.iter() {
            assert_eq!(bmp.get(b as usize), State::Used);
        }
        assert_eq!(bmp.count_free(), 16 - 5);
    }

    #[test]
    fn failed_allocation_leaves_bitmap_unchanged() {
        let mut bmp = Bitmap::new(8);
        bmp.allocate(6).unwrap();
        let before = bmp.clone();

        match bmp.allocate(3).unwrap_err() {
            VdiskError::NoFreeBlocks {
                requested,
                available,
            } => {
                assert_eq!(requested, 3);
                assert_eq!(available, 2);
            }
            e => panic!("unexpected error: {}", e),
        }
        assert_eq!(bmp, before);
    }

    #[test]
    fn zero_block_allocation_is_empty() {
        let mut bmp = Bitmap::new(8);
        assert!(bmp.allocate(0).unwrap().is_empty());
        assert_eq!(bmp.count_free(), 8);
    }

    #[test]
    fn can_serialize_and_deserialize_state() {
        let mut bmp = Bitmap::new(100);
        bmp.set_reserved(10);
        bmp.set_reserved(11);
        bmp.set_reserved(99);

        let bytes = bmp.serialize();
        assert_eq!(bytes.len(), 13);
        assert_eq!(bytes[1], 0b0000_1100);
        assert_eq!(Bitmap::parse(&bytes, 100).unwrap(), bmp);
    }

    #[test]
    fn parsing_rejects_bits_past_the_end() {
        let mut bytes = Bitmap::new(10).serialize();
        bytes[1] = 0b1000_0000;
        assert!(Bitmap::parse(&bytes, 10).is_err());
    }

    #[test]
    fn parsing_rejects_wrong_length() {
        assert!(Bitmap::parse(&[0; 3], 64).is_err());
    }
}
