/*!
 * Concurrent Shared Map
 *
 * Fixed-capacity hash table from 64-bit keys to opaque values, placed in a
 * shared region and guarded by the lock embedded in its header.
 *
 * # Design
 *
 * - Open addressing with linear probing from `hash_u64(key ^ seed) % capacity`
 * - Backward-shift deletion: no tombstones, so every slot stays reusable
 * - One whole-map lock; every operation (reads included) runs under it
 * - Capacity is fixed at creation; a full map reports `Full`
 */

use super::layout::{self, Layout, HEADER_SIZE, MAP_MAGIC};
use super::types::{MapState, MapStats};
use crate::core::clock::Deadline;
use crate::core::config::MapConfig;
use crate::core::errors::{ErrorKind, RegistryError, RegistryResult};
use crate::core::hash::hash_u64;
use crate::core::id::{Identity, IdentityGenerator};
use crate::core::sync::{SharedLock, SpinLock};
use crate::core::types::{MapKey, MapValue, NO_KEY};
use crate::memory::ShmRegion;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Key derived from a generated identity
///
/// Within one generator the host id and pid are fixed, so distinct counters
/// always give distinct keys.
#[inline]
pub fn key_from_identity(id: &Identity) -> MapKey {
    id.host_id() ^ id.low()
}

/// `x` lies in the cyclic range `(start, end]`
#[inline]
fn in_cyclic_range(start: usize, x: usize, end: usize) -> bool {
    if start <= end {
        start < x && x <= end
    } else {
        start < x || x <= end
    }
}

/// Handle onto a map living in a shared region
///
/// Several handles (in one or many processes) may refer to the same region;
/// the embedded lock serializes them. Dropping a handle leaves the map intact.
pub struct ConcurrentMap<'r> {
    layout: Layout,
    lock: SpinLock<'r>,
    capacity: usize,
    seed: u64,
    region_bytes: usize,
    ids: Arc<IdentityGenerator>,
    config: MapConfig,
    _region: PhantomData<&'r ShmRegion>,
}

impl<'r> ConcurrentMap<'r> {
    /// Bytes a region needs to hold `capacity` records, saturating on overflow
    pub const fn region_size(capacity: usize) -> usize {
        layout::region_size(capacity)
    }

    /// Bytes a region needs to hold `capacity` records, `None` on overflow
    pub const fn checked_region_size(capacity: usize) -> Option<usize> {
        layout::checked_region_size(capacity)
    }

    /// Create a map filling `region`, using the process-wide identity generator
    pub fn create(region: &'r ShmRegion, seed: u64) -> RegistryResult<Self> {
        Self::create_with(region, seed, IdentityGenerator::global(), MapConfig::default())
    }

    /// Create a map filling `region`
    ///
    /// The region contents are overwritten; nothing is assumed pre-zeroed.
    pub fn create_with(
        region: &'r ShmRegion,
        seed: u64,
        ids: Arc<IdentityGenerator>,
        config: MapConfig,
    ) -> RegistryResult<Self> {
        let capacity = layout::capacity_for(region.len());
        if capacity == 0 {
            return Err(RegistryError::Full(format!(
                "region of {} bytes cannot hold a single record (needs {})",
                region.len(),
                layout::region_size(1)
            )));
        }

        // SAFETY: region holds at least one header plus a slot and outlives 'r
        let layout = unsafe { Layout::new(region) };
        // SAFETY: lock block is inside the header and only touched atomically
        let lock = unsafe { SpinLock::from_ptr(layout.lock_ptr(), config.sync) };
        lock.init();

        layout
            .state()
            .store(MapState::Uninitialized.as_raw(), Ordering::Relaxed);
        layout.capacity().store(capacity as u64, Ordering::Relaxed);
        layout.count().store(0, Ordering::Relaxed);
        layout.seed().store(seed, Ordering::Relaxed);
        for index in 0..capacity {
            layout.key(index).store(NO_KEY, Ordering::Relaxed);
            layout.value(index).store(0, Ordering::Relaxed);
        }
        layout.magic().store(MAP_MAGIC, Ordering::Relaxed);
        layout
            .state()
            .store(MapState::Created.as_raw(), Ordering::Release);

        debug!(capacity, seed, region_bytes = region.len(), "Created shared map");

        Ok(Self {
            layout,
            lock,
            capacity,
            seed,
            region_bytes: region.len(),
            ids,
            config,
            _region: PhantomData,
        })
    }

    /// Open a map another handle created in `region`
    pub fn attach(region: &'r ShmRegion) -> RegistryResult<Self> {
        Self::attach_with(region, IdentityGenerator::global(), MapConfig::default())
    }

    pub fn attach_with(
        region: &'r ShmRegion,
        ids: Arc<IdentityGenerator>,
        config: MapConfig,
    ) -> RegistryResult<Self> {
        if region.len() < HEADER_SIZE {
            return Err(RegistryError::NotInitialized(format!(
                "region of {} bytes has no map header",
                region.len()
            )));
        }

        // SAFETY: region holds at least a header and outlives 'r
        let layout = unsafe { Layout::new(region) };
        let state = MapState::from_raw(layout.state().load(Ordering::Acquire));
        if layout.magic().load(Ordering::Relaxed) != MAP_MAGIC || state != MapState::Created {
            return Err(RegistryError::NotInitialized(format!(
                "region holds no live map (state {})",
                state
            )));
        }

        let raw_capacity = layout.capacity().load(Ordering::Relaxed);
        let fits = usize::try_from(raw_capacity)
            .ok()
            .filter(|&capacity| capacity > 0)
            .and_then(|capacity| layout::checked_region_size(capacity).map(|size| (capacity, size)))
            .filter(|&(_, size)| size <= region.len());
        let Some((capacity, _)) = fits else {
            return Err(RegistryError::Failure(format!(
                "header capacity {} does not fit region of {} bytes",
                raw_capacity,
                region.len()
            )));
        };
        let seed = layout.seed().load(Ordering::Relaxed);

        // SAFETY: lock block is inside the header and only touched atomically
        let lock = unsafe { SpinLock::from_ptr(layout.lock_ptr(), config.sync) };

        debug!(capacity, seed, "Attached to shared map");

        Ok(Self {
            layout,
            lock,
            capacity,
            seed,
            region_bytes: region.len(),
            ids,
            config,
            _region: PhantomData,
        })
    }

    /// Mark the map destroyed and release its lock; the memory stays mapped
    pub fn destroy(&self) -> RegistryResult<()> {
        {
            let _guard = self.lock.lock(None)?;
            self.ensure_created()?;
            self.layout.count().store(0, Ordering::Relaxed);
            self.layout
                .state()
                .store(MapState::Destroyed.as_raw(), Ordering::Release);
        }
        self.lock.destroy();
        debug!(capacity = self.capacity, "Destroyed shared map");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Record operations
    // ------------------------------------------------------------------------

    /// Insert `key`; fails with `KeyInUse` if present, `Full` at capacity
    pub fn add(&self, key: MapKey, value: MapValue) -> RegistryResult<()> {
        self.add_inner(key, value, None)
    }

    pub fn add_with_deadline(
        &self,
        key: MapKey,
        value: MapValue,
        deadline: &Deadline,
    ) -> RegistryResult<()> {
        self.add_inner(key, value, Some(deadline))
    }

    /// Insert under a freshly generated key and return it
    pub fn add_genkey(&self, value: MapValue) -> RegistryResult<MapKey> {
        self.add_genkey_inner(value, None)
    }

    pub fn add_genkey_with_deadline(
        &self,
        value: MapValue,
        deadline: &Deadline,
    ) -> RegistryResult<MapKey> {
        self.add_genkey_inner(value, Some(deadline))
    }

    /// Value stored under `key`
    pub fn get(&self, key: MapKey) -> RegistryResult<MapValue> {
        self.get_inner(key, None)
    }

    pub fn get_with_deadline(&self, key: MapKey, deadline: &Deadline) -> RegistryResult<MapValue> {
        self.get_inner(key, Some(deadline))
    }

    /// Remove `key`
    pub fn delete(&self, key: MapKey) -> RegistryResult<()> {
        self.delete_inner(key, None)
    }

    pub fn delete_with_deadline(&self, key: MapKey, deadline: &Deadline) -> RegistryResult<()> {
        self.delete_inner(key, Some(deadline))
    }

    fn add_inner(
        &self,
        key: MapKey,
        value: MapValue,
        deadline: Option<&Deadline>,
    ) -> RegistryResult<()> {
        check_key(key)?;
        self.locked(deadline, || self.insert_locked(key, value))?;
        trace!(key, value = value.get(), "Added record");
        Ok(())
    }

    fn add_genkey_inner(
        &self,
        value: MapValue,
        deadline: Option<&Deadline>,
    ) -> RegistryResult<MapKey> {
        // First use may read the boot id; keep that I/O outside the lock
        self.ids
            .host_id()
            .map_err(|e| e.context("cannot generate map key"))?;

        let retries = self.config.genkey_retries.max(1);
        let key = self.locked(deadline, || {
            for attempt in 0..retries {
                let key = key_from_identity(&self.ids.generate_id()?);
                if key == NO_KEY {
                    continue;
                }
                match self.insert_locked(key, value) {
                    Ok(()) => return Ok(key),
                    Err(e) if e.kind() == ErrorKind::KeyInUse => {
                        warn!(key, attempt, "Generated key already in use, retrying");
                    }
                    Err(e) => return Err(e),
                }
            }
            Err(RegistryError::Failure(format!(
                "no unused key after {} generated candidates",
                retries
            )))
        })?;

        trace!(key, value = value.get(), "Added record under generated key");
        Ok(key)
    }

    fn get_inner(&self, key: MapKey, deadline: Option<&Deadline>) -> RegistryResult<MapValue> {
        check_key(key)?;
        self.locked(deadline, || {
            self.find_locked(key)
                .map(|index| MapValue(self.layout.value(index).load(Ordering::Relaxed)))
                .ok_or_else(|| not_found(key))
        })
    }

    fn delete_inner(&self, key: MapKey, deadline: Option<&Deadline>) -> RegistryResult<()> {
        check_key(key)?;
        self.locked(deadline, || self.remove_locked(key))?;
        trace!(key, "Deleted record");
        Ok(())
    }

    // ------------------------------------------------------------------------
    // Introspection
    // ------------------------------------------------------------------------

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    #[inline]
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Record count snapshot, read without the lock
    pub fn len(&self) -> usize {
        self.layout.count().load(Ordering::Acquire) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state(&self) -> MapState {
        MapState::from_raw(self.layout.state().load(Ordering::Acquire))
    }

    /// Identity generator used for generated keys
    pub fn identities(&self) -> &Arc<IdentityGenerator> {
        &self.ids
    }

    pub fn stats(&self) -> MapStats {
        MapStats {
            state: self.state(),
            capacity: self.capacity,
            len: self.len(),
            seed: self.seed,
            region_bytes: self.region_bytes,
            lock_held: self.lock.is_locked(),
            lock_owner: self.lock.owner(),
        }
    }

    // ------------------------------------------------------------------------
    // Locked internals
    // ------------------------------------------------------------------------

    fn locked<T>(
        &self,
        deadline: Option<&Deadline>,
        op: impl FnOnce() -> RegistryResult<T>,
    ) -> RegistryResult<T> {
        let _guard = self.lock.lock(deadline)?;
        self.ensure_created()?;
        op()
    }

    fn ensure_created(&self) -> RegistryResult<()> {
        match self.state() {
            MapState::Created => Ok(()),
            state => Err(RegistryError::NotInitialized(format!("map is {}", state))),
        }
    }

    #[inline]
    fn home(&self, key: MapKey) -> usize {
        (hash_u64(key ^ self.seed) % self.capacity as u64) as usize
    }

    #[inline]
    fn next(&self, index: usize) -> usize {
        if index + 1 == self.capacity {
            0
        } else {
            index + 1
        }
    }

    fn find_locked(&self, key: MapKey) -> Option<usize> {
        let mut index = self.home(key);
        for _ in 0..self.capacity {
            match self.layout.key(index).load(Ordering::Relaxed) {
                NO_KEY => return None,
                k if k == key => return Some(index),
                _ => index = self.next(index),
            }
        }
        None
    }

    fn insert_locked(&self, key: MapKey, value: MapValue) -> RegistryResult<()> {
        if self.find_locked(key).is_some() {
            return Err(RegistryError::KeyInUse(format!("key {:#x}", key)));
        }

        let count = self.layout.count().load(Ordering::Relaxed);
        if count >= self.capacity as u64 {
            return Err(RegistryError::Full(format!(
                "map holds {} of {} records",
                count, self.capacity
            )));
        }

        let mut index = self.home(key);
        for _ in 0..self.capacity {
            if self.layout.key(index).load(Ordering::Relaxed) == NO_KEY {
                self.layout.value(index).store(value.get(), Ordering::Relaxed);
                self.layout.key(index).store(key, Ordering::Relaxed);
                self.layout.count().store(count + 1, Ordering::Release);
                return Ok(());
            }
            index = self.next(index);
        }

        Err(RegistryError::Failure(format!(
            "count {} below capacity {} but no free slot",
            count, self.capacity
        )))
    }

    fn remove_locked(&self, key: MapKey) -> RegistryResult<()> {
        let found = self.find_locked(key).ok_or_else(|| not_found(key))?;

        let mut hole = found;
        self.clear_slot(hole);

        // Pull back every displaced record whose home does not lie in (hole, probe]
        let mut probe = found;
        loop {
            probe = self.next(probe);
            let k = self.layout.key(probe).load(Ordering::Relaxed);
            if k == NO_KEY {
                break;
            }
            if !in_cyclic_range(hole, self.home(k), probe) {
                let v = self.layout.value(probe).load(Ordering::Relaxed);
                self.layout.value(hole).store(v, Ordering::Relaxed);
                self.layout.key(hole).store(k, Ordering::Relaxed);
                self.clear_slot(probe);
                hole = probe;
            }
        }

        let count = self.layout.count().load(Ordering::Relaxed);
        self.layout
            .count()
            .store(count.saturating_sub(1), Ordering::Release);
        Ok(())
    }

    #[inline]
    fn clear_slot(&self, index: usize) {
        self.layout.key(index).store(NO_KEY, Ordering::Relaxed);
        self.layout.value(index).store(0, Ordering::Relaxed);
    }
}

#[inline]
fn check_key(key: MapKey) -> RegistryResult<()> {
    if key == NO_KEY {
        return Err(RegistryError::InvalidArgument(
            "key 0 is reserved as the empty key".into(),
        ));
    }
    Ok(())
}

#[inline]
fn not_found(key: MapKey) -> RegistryError {
    RegistryError::NotFound(format!("key {:#x}", key))
}

impl fmt::Debug for ConcurrentMap<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConcurrentMap")
            .field("capacity", &self.capacity)
            .field("seed", &self.seed)
            .field("len", &self.len())
            .field("state", &self.state())
            .finish()
    }
}
