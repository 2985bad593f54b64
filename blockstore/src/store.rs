use crate::alloc::{image_len, Bitmap, FirstFit};
use crate::error::{BlockStoreError, Result};
use crate::io::image::{create_image_file, open_image_file, read_image, write_image};
use crate::io::BlockStorage;
use crate::{BlockId, DEFAULT_BLOCK_COUNT, DEFAULT_BLOCK_SIZE};
use log::{debug, trace, warn};
use std::io::{ErrorKind, Read, Write};
use std::ops::Range;
use std::path::Path;

/// A fixed number of equally sized blocks held in one contiguous buffer, with
/// a bitmap recording which block ids are handed out.
///
/// Reading and writing never consult or change allocation state, and
/// allocating a block never clears its content. Callers that want occupancy
/// to reflect content allocate before they write.
///
/// ## Reserved range
///
/// A store may set aside a contiguous run of ids for metadata (see
/// [`BlockStore::write_bitmap_image`]). Those ids start out allocated and are
/// never handed out by [`BlockStore::allocate_any`], though
/// [`BlockStore::allocate_id`] and [`BlockStore::release`] treat them like any
/// other id. Because reserved ids are ordinary set bits, `used_count` counts
/// them and `used_count() + free_count() == total_count()` always holds.
#[derive(Debug)]
pub struct BlockStore {
    bitmap: Bitmap,
    /// Block `i` occupies bytes `[i * block_size, (i + 1) * block_size)`.
    storage: Vec<u8>,
    block_size: usize,
    reserved: Option<Range<BlockId>>,
}

impl BlockStore {
    /// Creates an empty store of `capacity` blocks of `block_size` bytes with
    /// no reserved range. Use [`BlockStoreBuilder`] for anything else.
    pub fn create(capacity: usize, block_size: usize) -> Result<Self> {
        BlockStoreBuilder::new()
            .with_block_count(capacity)
            .with_block_size(block_size)
            .build()
    }

    /// Allocates a zeroed buffer and an all clear bitmap. Reserved bits are
    /// left for the caller to mark.
    fn blank(capacity: usize, block_size: usize, reserved: Option<Range<BlockId>>) -> Result<Self> {
        let bytes = capacity * block_size;
        let mut storage = Vec::new();
        storage
            .try_reserve_exact(bytes)
            .map_err(|_| BlockStoreError::OutOfMemory { bytes })?;
        storage.resize(bytes, 0);

        let bitmap = Bitmap::create(capacity).ok_or(BlockStoreError::OutOfMemory {
            bytes: image_len(capacity),
        })?;

        Ok(Self {
            bitmap,
            storage,
            block_size,
            reserved,
        })
    }

    fn mark_reserved(&mut self) {
        if let Some(range) = self.reserved.clone() {
            range.for_each(|id| self.bitmap.set(id));
        }
    }

    fn block_range(&self, id: BlockId) -> Range<usize> {
        let start = id * self.block_size;
        start..start + self.block_size
    }

    fn check_id(&self, id: BlockId) -> Result<()> {
        if id >= self.total_count() {
            warn!("block {} out of range (capacity {})", id, self.total_count());
            return Err(BlockStoreError::OutOfRange {
                id,
                capacity: self.total_count(),
            });
        }
        Ok(())
    }

    fn check_buffer(&self, len: usize) -> Result<()> {
        if len < self.block_size {
            warn!("buffer of {} bytes rejected, block size is {}", len, self.block_size);
            return Err(BlockStoreError::BufferTooSmall {
                len,
                block_size: self.block_size,
            });
        }
        Ok(())
    }

    /// Takes the lowest free id outside the reserved range. Returns `None`
    /// when every eligible id is in use.
    pub fn allocate_any(&mut self) -> Option<BlockId> {
        let next = FirstFit::new(&self.bitmap, self.reserved.clone()).next();
        match next {
            Some(id) => {
                self.bitmap.set(id);
                trace!("allocated block {}", id);
            }
            None => debug!("no free blocks left of {}", self.total_count()),
        }
        next
    }

    /// Marks `id` allocated. Fails without side effects if `id` is out of
    /// range or already in use. This is the only way to allocate a reserved id.
    pub fn allocate_id(&mut self, id: BlockId) -> bool {
        if id >= self.total_count() || self.bitmap.test(id) {
            trace!("request for block {} refused", id);
            return false;
        }
        self.bitmap.set(id);
        trace!("allocated requested block {}", id);
        true
    }

    /// Frees `id`. Releasing a free or out of range id does nothing.
    pub fn release(&mut self, id: BlockId) {
        if id < self.total_count() && self.bitmap.test(id) {
            self.bitmap.reset(id);
            trace!("released block {}", id);
        }
    }

    /// Copies block `id` into the first `block_size` bytes of `buf`, returning
    /// the number of bytes copied.
    pub fn read(&self, id: BlockId, buf: &mut [u8]) -> Result<usize> {
        self.check_id(id)?;
        self.check_buffer(buf.len())?;
        let range = self.block_range(id);
        buf[..self.block_size].copy_from_slice(&self.storage[range]);
        Ok(self.block_size)
    }

    /// Copies the first `block_size` bytes of `buf` into block `id`, returning
    /// the number of bytes written.
    pub fn write(&mut self, id: BlockId, buf: &[u8]) -> Result<usize> {
        self.check_id(id)?;
        self.check_buffer(buf.len())?;
        let range = self.block_range(id);
        self.storage[range].copy_from_slice(&buf[..self.block_size]);
        Ok(self.block_size)
    }

    pub fn used_count(&self) -> usize {
        self.bitmap.count_set()
    }

    pub fn free_count(&self) -> usize {
        self.total_count() - self.used_count()
    }

    pub fn total_count(&self) -> usize {
        self.bitmap.len()
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn reserved(&self) -> Option<Range<BlockId>> {
        self.reserved.clone()
    }

    /// Out of range ids are never allocated.
    pub fn is_allocated(&self, id: BlockId) -> bool {
        id < self.total_count() && self.bitmap.test(id)
    }

    /// Every allocated id in ascending order, reserved ids included.
    pub fn allocated_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.total_count()).filter(move |&id| self.bitmap.test(id))
    }

    /// The whole backing buffer, exactly as [`BlockStore::serialize`] writes it.
    pub fn as_bytes(&self) -> &[u8] {
        &self.storage
    }

    /// The current bitmap image, as stored by [`BlockStore::write_bitmap_image`].
    pub fn bitmap_image(&self) -> &[u8] {
        self.bitmap.as_bytes()
    }

    /// Copies the bitmap image into the reserved range, zero filling whatever
    /// the image does not cover. Returns the image length in bytes.
    pub fn write_bitmap_image(&mut self) -> Result<usize> {
        let range = self.reserved.clone().ok_or(BlockStoreError::NoReservedRange)?;
        let region = range.start * self.block_size..range.end * self.block_size;
        let image = self.bitmap.as_bytes();
        let (needed, available) = (image.len(), region.len());
        if needed > available {
            return Err(BlockStoreError::ReservedTooSmall { needed, available });
        }

        let dest = &mut self.storage[region];
        dest[..needed].copy_from_slice(image);
        dest[needed..].iter_mut().for_each(|b| *b = 0);
        debug!("stored {} byte bitmap image in blocks {:?}", needed, range);
        Ok(needed)
    }

    /// Writes the backing buffer verbatim to `dest`. The bitmap is not
    /// written, occupancy is recovered from the image on load.
    pub fn serialize<W: Write>(&self, dest: &mut W) -> Result<usize> {
        let written = write_image(dest, &self.storage)?;
        debug!(
            "serialized {} blocks ({} bytes, {} in use)",
            self.total_count(),
            written,
            self.used_count()
        );
        Ok(written)
    }

    /// Serializes into the file at `path`, creating it owner read/write only
    /// or truncating it if it exists.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<usize> {
        let mut file = create_image_file(path)?;
        let written = self.serialize(&mut file)?;
        file.sync_all()?;
        Ok(written)
    }

    /// Builds a store from `src` using default geometry and content based
    /// occupancy recovery.
    pub fn deserialize<R: Read>(src: &mut R) -> Result<Self> {
        BlockStoreBuilder::new().deserialize(src)
    }

    /// Reads the whole image, then rebuilds the bitmap either from block
    /// content or from the image kept in the reserved range.
    fn from_image<R: Read>(
        capacity: usize,
        block_size: usize,
        reserved: Option<Range<BlockId>>,
        recover_from_image: bool,
        src: &mut R,
    ) -> Result<Self> {
        let mut store = Self::blank(capacity, block_size, reserved)?;
        read_image(src, &mut store.storage)?;

        match store.reserved.clone() {
            Some(range) if recover_from_image => {
                let region = &store.storage[range.start * block_size..range.end * block_size];
                store.bitmap = Bitmap::from_bytes(capacity, region).ok_or(
                    BlockStoreError::ReservedTooSmall {
                        needed: store.bitmap.as_bytes().len(),
                        available: region.len(),
                    },
                )?;
            }
            _ => {
                // An all zero block is indistinguishable from a free one.
                for (id, block) in store.storage.chunks_exact(block_size).enumerate() {
                    if block.iter().any(|&b| b != 0) {
                        store.bitmap.set(id);
                    }
                }
            }
        }
        store.mark_reserved();

        debug!(
            "deserialized {} blocks, {} in use",
            store.total_count(),
            store.used_count()
        );
        Ok(store)
    }
}

fn into_io_error(err: BlockStoreError) -> std::io::Error {
    match err {
        BlockStoreError::Io(e) => e,
        other => std::io::Error::new(ErrorKind::InvalidInput, other),
    }
}

impl BlockStorage for BlockStore {
    fn block_size(&self) -> usize {
        self.block_size
    }

    fn block_count(&self) -> usize {
        self.total_count()
    }

    fn read_block(&mut self, blocknr: BlockId, buf: &mut [u8]) -> std::io::Result<()> {
        self.read(blocknr, buf).map(|_| ()).map_err(into_io_error)
    }

    fn write_block(&mut self, blocknr: BlockId, buf: &[u8]) -> std::io::Result<()> {
        self.write(blocknr, buf).map(|_| ()).map_err(into_io_error)
    }

    /// The store lives in memory, there is nothing to flush.
    fn sync_disk(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

/// Describes the geometry of a store before it is created or loaded.
#[derive(Debug, Clone)]
pub struct BlockStoreBuilder {
    block_count: usize,
    block_size: usize,
    reserved: Option<Range<BlockId>>,
    recover_from_image: bool,
}

impl Default for BlockStoreBuilder {
    fn default() -> Self {
        Self {
            block_count: DEFAULT_BLOCK_COUNT,
            block_size: DEFAULT_BLOCK_SIZE,
            reserved: None,
            recover_from_image: false,
        }
    }
}

impl BlockStoreBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the number of blocks in the store.
    pub fn with_block_count(mut self, blocks: usize) -> Self {
        self.block_count = blocks;
        self
    }

    /// Sets the number of bytes in every block.
    pub fn with_block_size(mut self, bytes: usize) -> Self {
        self.block_size = bytes;
        self
    }

    /// Sets aside `len` ids starting at `start`, excluded from
    /// [`BlockStore::allocate_any`].
    pub fn with_reserved(mut self, start: BlockId, len: usize) -> Self {
        self.reserved = Some(start..start.saturating_add(len));
        self
    }

    /// When loading, read occupancy back from the bitmap image in the
    /// reserved range instead of inferring it from block content.
    pub fn recover_from_bitmap_image(mut self, enabled: bool) -> Self {
        self.recover_from_image = enabled;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.block_count == 0 {
            return Err(BlockStoreError::InvalidConfig(
                "block count must be non-zero".to_string(),
            ));
        }
        if self.block_size == 0 {
            return Err(BlockStoreError::InvalidConfig(
                "block size must be non-zero".to_string(),
            ));
        }
        if self.block_count.checked_mul(self.block_size).is_none() {
            return Err(BlockStoreError::InvalidConfig(format!(
                "{} blocks of {} bytes overflows the address space",
                self.block_count, self.block_size
            )));
        }
        match &self.reserved {
            Some(range) if range.start >= range.end || range.end > self.block_count => {
                return Err(BlockStoreError::InvalidConfig(format!(
                    "reserved range {:?} must be non-empty and within {} blocks",
                    range, self.block_count
                )));
            }
            None if self.recover_from_image => {
                return Err(BlockStoreError::InvalidConfig(
                    "bitmap image recovery needs a reserved range".to_string(),
                ));
            }
            _ => {}
        }
        Ok(())
    }

    /// Creates an empty store: all blocks zeroed and free apart from the
    /// reserved range.
    pub fn build(self) -> Result<BlockStore> {
        self.validate()?;
        let mut store = BlockStore::blank(self.block_count, self.block_size, self.reserved)?;
        store.mark_reserved();
        debug!(
            "created store of {} x {} byte blocks, reserved {:?}",
            store.total_count(),
            store.block_size,
            store.reserved
        );
        Ok(store)
    }

    /// Rebuilds a store from exactly `block_count * block_size` bytes of
    /// `src`. A shorter source fails the whole load.
    pub fn deserialize<R: Read>(self, src: &mut R) -> Result<BlockStore> {
        self.validate()?;
        BlockStore::from_image(
            self.block_count,
            self.block_size,
            self.reserved,
            self.recover_from_image,
            src,
        )
    }

    /// Rebuilds a store from the image file at `path`.
    pub fn load<P: AsRef<Path>>(self, path: P) -> Result<BlockStore> {
        let mut file = open_image_file(path)?;
        self.deserialize(&mut file)
    }
}
