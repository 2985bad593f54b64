use crate::BlockId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, BlockStoreError>;

#[derive(Error, Debug)]
pub enum BlockStoreError {
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error("unable to allocate {bytes} bytes for block storage")]
    OutOfMemory { bytes: usize },
    #[error("block {id} out of range (capacity {capacity})")]
    OutOfRange { id: BlockId, capacity: usize },
    #[error("buffer of {len} bytes is smaller than block size {block_size}")]
    BufferTooSmall { len: usize, block_size: usize },
    #[error("short read: expected {expected} bytes, got {actual}")]
    ShortRead { expected: usize, actual: usize },
    #[error("short write: expected {expected} bytes, wrote {actual}")]
    ShortWrite { expected: usize, actual: usize },
    #[error("reserved range holds {available} bytes, bitmap image needs {needed}")]
    ReservedTooSmall { needed: usize, available: usize },
    #[error("store has no reserved range")]
    NoReservedRange,
    #[error("block image i/o failed")]
    Io(#[from] std::io::Error),
}
