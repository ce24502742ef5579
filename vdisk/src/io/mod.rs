mod block;

pub use block::BlockStore;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{Result, VdiskError};

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockNumber = u32;

/// Reads a whole file from the host filesystem.
pub fn read_host_file<P: AsRef<Path>>(path: P) -> Result<Vec<u8>> {
    let path = path.as_ref();
    std::fs::read(path).map_err(|e| VdiskError::io(path, e))
}

/// Writes `bytes` to a file on the host filesystem, replacing any previous
/// content.
pub fn write_host_file<P: AsRef<Path>>(path: P, bytes: &[u8]) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| VdiskError::io(path, e))?;
    let mut out = BufWriter::new(file);
    out.write_all(bytes)
        .and_then(|_| out.flush())
        .map_err(|e| VdiskError::io(path, e))
}
