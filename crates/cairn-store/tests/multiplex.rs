use std::sync::Arc;

use cairn_store::{
    Bucket, BucketFlag, Driver, DriverExt, FsDriver, MemoryDriver, Multiplex, RootRecord, StoreResult,
};
use cairn_types::ContentHash;
use proptest::prelude::*;

struct Backends {
    mux: Multiplex,
    drivers: Vec<Arc<MemoryDriver>>,
}

/// Driver 0 is the primary.
fn backends(count: usize) -> Backends {
    let flag = BucketFlag::default();
    let drivers: Vec<_> = (0..count)
        .map(|_| Arc::new(MemoryDriver::new(flag.clone())))
        .collect();
    let backups = drivers[1..]
        .iter()
        .map(|d| Box::new(d.clone()) as Box<dyn Driver>)
        .collect();
    let mux = Multiplex::new(flag, Box::new(drivers[0].clone()), backups);
    Backends { mux, drivers }
}

fn put_root(driver: &dyn Driver, marker: u8, sequence: u64) -> ContentHash {
    let record = RootRecord {
        items: ContentHash::from_digest(&[marker; 32]),
        sequence,
        ..RootRecord::default()
    };
    let hash = driver.store_record(false, &record).unwrap();
    driver.store_root(true, &hash).unwrap();
    hash
}

#[test]
fn highest_sequence_wins() {
    let b = backends(3);
    put_root(&*b.drivers[0], 0, 4);
    let winner = put_root(&*b.drivers[1], 1, 9);
    put_root(&*b.drivers[2], 2, 7);

    let best = b.mux.best_root().unwrap();
    assert_eq!(best.hash, winner);
    assert_eq!(best.sequence, 9);
    assert!(best.primary_out_of_sync);
}

#[test]
fn primary_wins_ties() {
    let b = backends(2);
    let primary = put_root(&*b.drivers[0], 0, 5);
    put_root(&*b.drivers[1], 1, 5);

    let best = b.mux.best_root().unwrap();
    assert_eq!(best.hash, primary);
    assert!(!best.primary_out_of_sync);
}

#[test]
fn dangling_root_pointer_is_skipped() {
    let b = backends(2);
    b.drivers[0]
        .store_root(true, &ContentHash::from_digest(&[0xee; 32]))
        .unwrap();
    let good = put_root(&*b.drivers[1], 1, 1);

    let best = b.mux.best_root().unwrap();
    assert_eq!(best.hash, good);
    assert!(best.primary_out_of_sync);
}

#[test]
fn synchronize_brings_every_backend_to_winner() {
    let b = backends(3);
    put_root(&*b.drivers[0], 0, 2);
    let winner = put_root(&*b.drivers[1], 1, 8);

    let best = b.mux.best_root().unwrap();
    let mux = &b.mux;
    let hash = best.hash.clone();
    let copy = move |to: &dyn Driver| mux.migrate(&hash, to);
    assert!(b.mux.synchronize_plugins(&best.hash, &copy, true).unwrap());

    for driver in &b.drivers {
        assert_eq!(driver.load_root().unwrap(), winner);
        let record: RootRecord = driver.load_record(&winner, false).unwrap().unwrap();
        assert_eq!(record.sequence, 8);
    }
    assert!(!b.mux.best_root().unwrap().primary_out_of_sync);
}

#[test]
fn failed_copy_leaves_pointer_untouched() {
    let b = backends(2);
    let old = put_root(&*b.drivers[1], 1, 1);
    let target = ContentHash::from_digest(&[0x42; 32]);
    let refuse = |_: &dyn Driver| -> StoreResult<bool> { Ok(false) };

    assert!(!b.mux.synchronize_plugins(&target, &refuse, false).unwrap());
    assert_eq!(b.drivers[1].load_root().unwrap(), old);
}

#[test]
fn migrate_primary_swaps_backend() {
    let b = backends(1);
    let root = put_root(&b.mux, 3, 3);
    let dir = tempfile::tempdir().unwrap();
    let fs = FsDriver::open(dir.path(), b.mux.bucket_flag().clone()).unwrap();

    let mux = &b.mux;
    let hash = root.clone();
    let copy = move |to: &dyn Driver| mux.migrate(&hash, to);
    assert!(b.mux.migrate_primary(Box::new(fs), &root, &copy).unwrap());

    assert_eq!(b.mux.primary_name(), "filesystem");
    assert_eq!(b.mux.load_root().unwrap(), root);
    assert!(b.mux.load_from_bucket(&root, Bucket::A).unwrap().is_some());
}

proptest! {
    #[test]
    fn best_root_picks_max_sequence(seqs in proptest::collection::vec(0u64..50, 1..5)) {
        let b = backends(seqs.len());
        let hashes: Vec<_> = seqs
            .iter()
            .enumerate()
            .map(|(i, seq)| put_root(&*b.drivers[i], i as u8, *seq))
            .collect();

        let max = *seqs.iter().max().unwrap();
        let first = seqs.iter().position(|s| *s == max).unwrap();

        let best = b.mux.best_root().unwrap();
        prop_assert_eq!(best.sequence, max);
        prop_assert_eq!(&best.hash, &hashes[first]);
        prop_assert_eq!(best.primary_out_of_sync, first != 0);
    }
}
