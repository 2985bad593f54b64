use crate::BlockId;

/// Tried to map as closely as possible to the prescribed interface found here:
/// http://web.mit.edu/6.033/1997/handouts/html/04sfs.html.
///
/// In cases where implementing the interface as described would lead to non-idiomatic
/// rust code, I opted to use a more rust-y interface.
pub trait BlockStorage {
    /// The fixed number of bytes in every block.
    fn block_size(&self) -> usize;
    /// The number of addressable blocks, valid block numbers are `0..block_count()`.
    fn block_count(&self) -> usize;
    /// Reads disk block number into provided buffer.
    ///
    /// # Errors
    ///
    /// Attempting to read a block out of range, or into a buffer shorter than
    /// one block, will return an error.
    fn read_block(&mut self, blocknr: BlockId, buf: &mut [u8]) -> std::io::Result<()>;
    /// Writes provided buffer into the specified block number.
    ///
    /// # Errors
    ///
    /// Attempting to write a block out of range, or from a buffer shorter than
    /// one block, will return an error.
    fn write_block(&mut self, blocknr: BlockId, buf: &[u8]) -> std::io::Result<()>;
    /// Flush any buffered disk IO. This is useful if it must guaranteed
    /// the disk writes actually occurred, for instance, if being re-read from
    /// disk.
    fn sync_disk(&mut self) -> std::io::Result<()>;
}
