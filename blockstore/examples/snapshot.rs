use blockstore::{BlockStore, BlockStoreBuilder};

pub fn main() -> blockstore::Result<()> {
    let image = std::env::temp_dir().join("blockstore-snapshot.img");

    let mut store = BlockStore::create(16, 64)?;
    for fill in 1..=3_u8 {
        let id = store.allocate_any().expect("fresh store has free blocks");
        store.write(id, &[fill; 64])?;
    }
    // Allocated but never written, this one does not survive the reload.
    store.allocate_any();
    let written = store.save(&image)?;
    println!(
        "saved {} bytes, {} of {} blocks in use",
        written,
        store.used_count(),
        store.total_count()
    );

    let loaded = BlockStoreBuilder::new()
        .with_block_count(16)
        .with_block_size(64)
        .load(&image)?;
    println!(
        "loaded {} of {} blocks in use: {:?}",
        loaded.used_count(),
        loaded.total_count(),
        loaded.allocated_ids().collect::<Vec<_>>()
    );

    std::fs::remove_file(&image)?;
    Ok(())
}
