use std::io::{Seek, SeekFrom, Write};

use blockstore::{BlockStore, BlockStoreBuilder, BlockStoreError};
use tempfile::NamedTempFile;

fn geometry() -> BlockStoreBuilder {
    BlockStoreBuilder::new().with_block_count(8).with_block_size(4)
}

#[test]
fn can_save_and_load_store_through_a_file() {
    let tf = NamedTempFile::new().unwrap();
    let mut store = BlockStore::create(8, 4).unwrap();
    for &id in [1, 5].iter() {
        assert!(store.allocate_id(id));
        store.write(id, &[id as u8; 4]).unwrap();
    }

    assert_eq!(store.save(tf.path()).unwrap(), 32);
    assert_eq!(tf.as_file().metadata().unwrap().len(), 32);

    let loaded = geometry().load(tf.path()).unwrap();
    assert_eq!(loaded.allocated_ids().collect::<Vec<_>>(), vec![1, 5]);
    assert_eq!(loaded.as_bytes(), store.as_bytes());
    assert_eq!(loaded.used_count() + loaded.free_count(), loaded.total_count());
}

#[test]
fn allocated_but_unwritten_block_is_lost_on_reload() {
    let tf = NamedTempFile::new().unwrap();
    let mut store = BlockStore::create(8, 4).unwrap();
    assert_eq!(store.allocate_any(), Some(0));
    assert_eq!(store.allocate_any(), Some(1));
    store.write(1, &[0xff; 4]).unwrap();
    store.save(tf.path()).unwrap();

    let loaded = geometry().load(tf.path()).unwrap();
    assert!(!loaded.is_allocated(0));
    assert!(loaded.is_allocated(1));
    assert_eq!(loaded.used_count(), 1);
}

#[test]
fn saving_truncates_an_existing_image() {
    let mut tf = NamedTempFile::new().unwrap();
    tf.write_all(&[0xee; 100]).unwrap();

    BlockStore::create(8, 4).unwrap().save(tf.path()).unwrap();

    assert_eq!(std::fs::read(tf.path()).unwrap(), vec![0; 32]);
}

#[test]
fn loading_a_truncated_image_fails() {
    let mut tf = NamedTempFile::new().unwrap();
    tf.write_all(&[1; 20]).unwrap();

    match geometry().load(tf.path()).unwrap_err() {
        BlockStoreError::ShortRead { expected, actual } => {
            assert_eq!(expected, 32);
            assert_eq!(actual, 20);
        }
        e => panic!("unexpected error {:?}", e),
    }
}

#[test]
fn loading_a_missing_image_fails() {
    let dir = tempfile::tempdir().unwrap();
    match geometry().load(dir.path().join("missing.img")).unwrap_err() {
        BlockStoreError::Io(e) => assert_eq!(e.kind(), std::io::ErrorKind::NotFound),
        e => panic!("unexpected error {:?}", e),
    }
}

#[test]
fn deserialize_reads_from_any_stream() {
    let mut store = BlockStoreBuilder::new().build().unwrap();
    let id = store.allocate_any().unwrap();
    let block = vec![0x55; store.block_size()];
    store.write(id, &block).unwrap();

    let mut file = tempfile::tempfile().unwrap();
    store.serialize(&mut file).unwrap();
    file.seek(SeekFrom::Start(0)).unwrap();

    let loaded = BlockStore::deserialize(&mut file).unwrap();
    assert_eq!(loaded.allocated_ids().collect::<Vec<_>>(), vec![id]);
}

#[test]
fn bitmap_image_round_trips_through_a_file() {
    let tf = NamedTempFile::new().unwrap();
    let builder = BlockStoreBuilder::new()
        .with_block_count(128)
        .with_block_size(8)
        .with_reserved(126, 2);

    let mut store = builder.clone().build().unwrap();
    let ids: Vec<_> = (0..5).filter_map(|_| store.allocate_any()).collect();
    assert_eq!(ids, vec![0, 1, 2, 3, 4]);
    store.release(2);
    store.write_bitmap_image().unwrap();
    store.save(tf.path()).unwrap();

    let loaded = builder.recover_from_bitmap_image(true).load(tf.path()).unwrap();
    assert_eq!(
        loaded.allocated_ids().collect::<Vec<_>>(),
        vec![0, 1, 3, 4, 126, 127]
    );
    assert_eq!(loaded.used_count(), store.used_count());
}

#[cfg(unix)]
#[test]
fn saved_image_is_private_to_the_owner() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store.img");
    BlockStore::create(2, 4).unwrap().save(&path).unwrap();

    let mode = std::fs::metadata(&path).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o600);
}
