//! A fixed capacity block store: a flat array of equally sized blocks plus a
//! bitmap tracking which block ids are in use.
//!
//! The store knows nothing about files or directories, only block numbers and
//! fixed size payloads. It is meant to sit underneath a file system, which
//! can stay generic over [`io::BlockStorage`].
//!
//! ```no_run
//! use blockstore::{BlockStore, BlockStoreBuilder};
//!
//! # fn main() -> blockstore::Result<()> {
//! let mut store = BlockStore::create(64, 4096)?;
//! let id = store.allocate_any().expect("store has free blocks");
//! store.write(id, &[0x55; 4096])?;
//! store.save("disk.img")?;
//!
//! let store = BlockStoreBuilder::new()
//!     .with_block_count(64)
//!     .with_block_size(4096)
//!     .load("disk.img")?;
//! assert!(store.is_allocated(id));
//! # Ok(())
//! # }
//! ```
//!
//! ## Persisted format
//!
//! An image is exactly `capacity * block_size` raw bytes. There is no header
//! and the bitmap is not stored, so on load any block holding a non-zero byte
//! is considered allocated and every all zero block free. A block that was
//! allocated but never written comes back free.

mod alloc;
mod error;
pub mod io;
mod store;

pub use crate::alloc::{Bitmap, State};
pub use crate::error::{BlockStoreError, Result};
pub use crate::store::{BlockStore, BlockStoreBuilder};

/// The block number to access ranging from 0 (the first block) to n - 1 (the last
/// block) where n is number of blocks available.
pub type BlockId = usize;

/// Number of blocks in a store built without an explicit block count.
pub const DEFAULT_BLOCK_COUNT: usize = 64;

/// 4k is a common block size for file systems. Disks commonly are composed of
/// 512 byte blocks mapping each file system block to 8 hard disk blocks.
pub const DEFAULT_BLOCK_SIZE: usize = 4096;
