/*!
 * Concurrent Map Tests
 * Record operations, lifecycle and locking of maps in shared regions
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use shm_registry::core::sync::{SharedLock, SpinLock, SyncConfig};
use shm_registry::registry::layout::HEADER_CAPACITY_OFFSET;
use shm_registry::{
    key_from_identity, ConcurrentMap, Deadline, DeadlineClock, ErrorKind, Identity,
    IdentityGenerator, MapConfig, MapState, MapValue, ShmRegion,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const HOST_ID: u64 = 0x1234_5678_9abc_def0;

fn generator() -> Arc<IdentityGenerator> {
    Arc::new(IdentityGenerator::with_host_id(HOST_ID))
}

fn region(capacity: usize) -> ShmRegion {
    ShmRegion::anonymous(ConcurrentMap::region_size(capacity)).unwrap()
}

fn create(region: &ShmRegion, seed: u64) -> ConcurrentMap<'_> {
    ConcurrentMap::create_with(region, seed, generator(), MapConfig::default()).unwrap()
}

#[test]
fn test_genkey_delete_and_explicit_add() {
    let region = region(4);
    let map = create(&region, 42);
    assert_eq!(map.capacity(), 4);

    let (a, b, c, d) = (MapValue(0xa), MapValue(0xb), MapValue(0xc), MapValue(0xd));
    let k1 = map.add_genkey(a).unwrap();
    let k2 = map.add_genkey(b).unwrap();
    let k3 = map.add_genkey(c).unwrap();
    assert!(k1 != k2 && k2 != k3 && k1 != k3);

    map.delete(k2).unwrap();
    assert_eq!(map.get(k2).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(map.get(k1).unwrap(), a);

    let k4 = k1 ^ k2 ^ k3 ^ 0x55;
    assert!(k4 != 0 && k4 != k1 && k4 != k3);
    map.add(k4, d).unwrap();

    assert_eq!(map.len(), 3);
    assert_eq!(map.get(k1).unwrap(), a);
    assert_eq!(map.get(k3).unwrap(), c);
    assert_eq!(map.get(k4).unwrap(), d);
}

#[test]
fn test_duplicate_key_is_rejected() {
    let region = region(4);
    let map = create(&region, 7);

    map.add(10, MapValue(1)).unwrap();
    let err = map.add(10, MapValue(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::KeyInUse);
    assert_eq!(map.get(10).unwrap(), MapValue(1));
    assert_eq!(map.len(), 1);
}

#[test]
fn test_missing_key() {
    let region = region(4);
    let map = create(&region, 7);

    assert_eq!(map.get(99).unwrap_err().kind(), ErrorKind::NotFound);
    assert_eq!(map.delete(99).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_full_map() {
    let region = region(4);
    let map = create(&region, 1);

    for key in 1..=4 {
        map.add(key, MapValue(key)).unwrap();
    }
    assert_eq!(map.add(5, MapValue(5)).unwrap_err().kind(), ErrorKind::Full);
    assert_eq!(map.add_genkey(MapValue(6)).unwrap_err().kind(), ErrorKind::Full);
    assert_eq!(map.len(), 4);

    map.delete(2).unwrap();
    map.add(5, MapValue(5)).unwrap();
    assert_eq!(map.get(5).unwrap(), MapValue(5));
}

#[test]
fn test_refill_after_drain() {
    let region = region(8);
    let map = create(&region, 3);

    for round in 0..10u64 {
        let base = round * 100 + 1;
        for key in base..base + 8 {
            map.add(key, MapValue(key)).unwrap();
        }
        assert_eq!(map.len(), 8);
        for key in base..base + 8 {
            map.delete(key).unwrap();
        }
        assert!(map.is_empty());
    }
}

#[test]
fn test_seed_only_changes_placement() {
    let keys: Vec<u64> = (1..=12).map(|k| k * 0x1_0001).collect();

    for seed in [0u64, 42, u64::MAX] {
        let region = region(16);
        let map = create(&region, seed);
        assert_eq!(map.seed(), seed);
        for key in &keys {
            map.add(*key, MapValue(*key + 1)).unwrap();
        }
        for key in keys.iter().step_by(3) {
            map.delete(*key).unwrap();
        }
        for (i, key) in keys.iter().enumerate() {
            if i % 3 == 0 {
                assert_eq!(map.get(*key).unwrap_err().kind(), ErrorKind::NotFound);
            } else {
                assert_eq!(map.get(*key).unwrap(), MapValue(*key + 1));
            }
        }
    }
}

#[test]
fn test_attach_sees_records() {
    let region = region(8);
    let map = create(&region, 42);
    map.add(1, MapValue(100)).unwrap();

    let other = ConcurrentMap::attach_with(&region, generator(), MapConfig::default()).unwrap();
    assert_eq!(other.capacity(), 8);
    assert_eq!(other.seed(), 42);
    assert_eq!(other.get(1).unwrap(), MapValue(100));

    other.add(2, MapValue(200)).unwrap();
    assert_eq!(map.get(2).unwrap(), MapValue(200));
    assert_eq!(map.len(), 2);
}

#[test]
fn test_attach_requires_live_map() {
    let region = region(4);
    let err = ConcurrentMap::attach_with(&region, generator(), MapConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);

    let map = create(&region, 1);
    map.add(1, MapValue(1)).unwrap();
    map.destroy().unwrap();
    assert_eq!(map.state(), MapState::Destroyed);

    let err = ConcurrentMap::attach_with(&region, generator(), MapConfig::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotInitialized);
    assert_eq!(map.get(1).unwrap_err().kind(), ErrorKind::NotInitialized);
    assert_eq!(map.destroy().unwrap_err().kind(), ErrorKind::NotInitialized);
}

#[test]
fn test_attach_rejects_corrupt_capacity() {
    let region = region(4);
    let map = create(&region, 1);
    map.add(1, MapValue(1)).unwrap();

    for bogus in [1u64 << 60, u64::MAX, 5, 0] {
        // SAFETY: capacity word at header offset 16, 8-byte aligned inside the region
        let capacity = unsafe { &*(region.as_ptr().add(HEADER_CAPACITY_OFFSET) as *const AtomicU64) };
        capacity.store(bogus, Ordering::Relaxed);

        let err = ConcurrentMap::attach_with(&region, generator(), MapConfig::default()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Failure, "capacity {}", bogus);
    }
}

#[test]
fn test_region_size_overflow_is_detected() {
    assert_eq!(ConcurrentMap::checked_region_size(1 << 60), None);
    assert_eq!(ConcurrentMap::checked_region_size(4), Some(ConcurrentMap::region_size(4)));
}

#[test]
fn test_genkey_gives_up_after_retries() {
    let region = region(4);
    let ids = generator();
    let config = MapConfig::default().with_genkey_retries(1);
    let map = ConcurrentMap::create_with(&region, 42, ids.clone(), config).unwrap();

    let current = ids.generate_id().unwrap();
    let next = Identity::from_parts(current.host_id(), current.pid(), current.counter().wrapping_add(1));
    map.add(key_from_identity(&next), MapValue(1)).unwrap();

    let err = map.add_genkey(MapValue(2)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Failure);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(key_from_identity(&next)).unwrap(), MapValue(1));
}

#[test]
fn test_recreate_after_destroy() {
    let region = region(4);
    {
        let map = create(&region, 1);
        map.add(1, MapValue(1)).unwrap();
        map.destroy().unwrap();
    }

    let map = create(&region, 2);
    assert!(map.is_empty());
    assert_eq!(map.get(1).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_held_lock_times_out_without_mutation() {
    let region = region(4);
    let map = create(&region, 42);
    map.add(1, MapValue(1)).unwrap();

    // SAFETY: the lock block sits at the start of the region
    let lock = unsafe { SpinLock::from_ptr(region.as_ptr(), SyncConfig::default()) };
    let guard = lock.lock(None).unwrap();
    assert!(map.stats().lock_held);

    let err = map
        .add_with_deadline(2, MapValue(2), &Deadline::TRY_ONCE)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let err = map.get_with_deadline(1, &Deadline::TRY_ONCE).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    let err = map
        .add_genkey_with_deadline(MapValue(3), &Deadline::TRY_ONCE)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);

    let clock = DeadlineClock::system();
    let start = Instant::now();
    let deadline = clock.deadline_after(Duration::from_millis(20));
    let err = map.delete_with_deadline(1, &deadline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(start.elapsed() >= Duration::from_millis(20));

    drop(guard);
    assert_eq!(map.len(), 1);
    assert_eq!(map.get(1).unwrap(), MapValue(1));
    assert_eq!(map.get(2).unwrap_err().kind(), ErrorKind::NotFound);
}

#[test]
fn test_bounded_wait_succeeds_once_released() {
    let region = region(4);
    let map = create(&region, 42);

    // SAFETY: the lock block sits at the start of the region
    let lock = unsafe { SpinLock::from_ptr(region.as_ptr(), SyncConfig::default()) };
    let clock = DeadlineClock::system();

    thread::scope(|s| {
        let guard = lock.lock(None).unwrap();
        s.spawn(move || {
            thread::sleep(Duration::from_millis(10));
            drop(guard);
        });

        let deadline = clock.deadline_after(Duration::from_secs(5));
        map.add_with_deadline(9, MapValue(9), &deadline).unwrap();
    });

    assert_eq!(map.get(9).unwrap(), MapValue(9));
}

#[test]
fn test_concurrent_handles() {
    const THREADS: u64 = 4;
    const PER_THREAD: u64 = 64;

    let region = region((THREADS * PER_THREAD) as usize);
    let map = create(&region, 42);

    thread::scope(|s| {
        for t in 0..THREADS {
            let region = &region;
            s.spawn(move || {
                let handle =
                    ConcurrentMap::attach_with(region, generator(), MapConfig::default()).unwrap();
                for i in 0..PER_THREAD {
                    let key = t * 1_000 + i + 1;
                    handle.add(key, MapValue(key * 2)).unwrap();
                }
                for i in (0..PER_THREAD).step_by(2) {
                    handle.delete(t * 1_000 + i + 1).unwrap();
                }
            });
        }
    });

    assert_eq!(map.len(), (THREADS * PER_THREAD / 2) as usize);
    for t in 0..THREADS {
        for i in 0..PER_THREAD {
            let key = t * 1_000 + i + 1;
            match map.get(key) {
                Ok(v) => {
                    assert_eq!(i % 2, 1);
                    assert_eq!(v, MapValue(key * 2));
                }
                Err(e) => {
                    assert_eq!(i % 2, 0);
                    assert_eq!(e.kind(), ErrorKind::NotFound);
                }
            }
        }
    }
}

#[test]
fn test_concurrent_genkey_keys_are_unique() {
    let region = region(512);
    let map = create(&region, 5);

    let keys: Vec<u64> = thread::scope(|s| {
        let workers: Vec<_> = (0..4)
            .map(|_| s.spawn(|| (0..100).map(|n| map.add_genkey(MapValue(n)).unwrap()).collect::<Vec<_>>()))
            .collect();
        workers.into_iter().flat_map(|w| w.join().unwrap()).collect()
    });

    let mut unique = keys.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), 400);
    assert_eq!(map.len(), 400);
}

#[derive(Debug, Clone)]
enum Op {
    Add(u64, u64),
    Get(u64),
    Delete(u64),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    // Small key space forces collisions, duplicates and long probe chains
    prop_oneof![
        (1u64..24, any::<u64>()).prop_map(|(k, v)| Op::Add(k, v)),
        (1u64..24).prop_map(Op::Get),
        (1u64..24).prop_map(Op::Delete),
    ]
}

proptest! {
    #[test]
    fn prop_map_matches_model(seed in any::<u64>(), ops in prop::collection::vec(op_strategy(), 1..200)) {
        let region = region(16);
        let map = create(&region, seed);
        let mut model: HashMap<u64, u64> = HashMap::new();

        for op in ops {
            match op {
                Op::Add(k, v) => {
                    let result = map.add(k, MapValue(v));
                    if model.contains_key(&k) {
                        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::KeyInUse);
                    } else if model.len() == 16 {
                        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::Full);
                    } else {
                        prop_assert!(result.is_ok());
                        model.insert(k, v);
                    }
                }
                Op::Get(k) => match model.get(&k) {
                    Some(v) => prop_assert_eq!(map.get(k).unwrap(), MapValue(*v)),
                    None => prop_assert_eq!(map.get(k).unwrap_err().kind(), ErrorKind::NotFound),
                },
                Op::Delete(k) => {
                    let result = map.delete(k);
                    if model.remove(&k).is_some() {
                        prop_assert!(result.is_ok());
                    } else {
                        prop_assert_eq!(result.unwrap_err().kind(), ErrorKind::NotFound);
                    }
                }
            }
            prop_assert_eq!(map.len(), model.len());
        }
    }
}
