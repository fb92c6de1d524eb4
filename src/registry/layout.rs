/*!
 * Map Region Layout
 *
 * Fixed byte layout of a map inside its region, shared by every process:
 *
 * ```text
 * +--------------------------- header (64 bytes) ---------------------------+
 * | +0  lock block (8)  | +8 magic u32 | +12 state u32 | +16 capacity u64    |
 * | +24 count u64       | +32 seed u64 | +40 reserved (24)                   |
 * +-------------------------------------------------------------------------+
 * | slot 0: key u64, value u64 | slot 1 | ...                | slot cap-1    |
 * +-------------------------------------------------------------------------+
 * ```
 *
 * Every field is accessed through atomics. Slot key `0` marks an empty slot.
 */

use crate::core::sync::LOCK_SIZE;
use crate::memory::ShmRegion;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU32, AtomicU64};

/// "SREG"
pub const MAP_MAGIC: u32 = 0x5352_4547;

pub const HEADER_SIZE: usize = 64;

pub const HEADER_LOCK_OFFSET: usize = 0;
pub const HEADER_MAGIC_OFFSET: usize = 8;
pub const HEADER_STATE_OFFSET: usize = 12;
pub const HEADER_CAPACITY_OFFSET: usize = 16;
pub const HEADER_COUNT_OFFSET: usize = 24;
pub const HEADER_SEED_OFFSET: usize = 32;

pub const SLOTS_OFFSET: usize = HEADER_SIZE;
pub const SLOT_SIZE: usize = 16;
pub const SLOT_KEY_OFFSET: usize = 0;
pub const SLOT_VALUE_OFFSET: usize = 8;

// Compile-time checks.
const _: () = assert!(HEADER_LOCK_OFFSET + LOCK_SIZE <= HEADER_MAGIC_OFFSET);
const _: () = assert!(HEADER_SEED_OFFSET + 8 <= HEADER_SIZE);
const _: () = assert!(SLOTS_OFFSET % 8 == 0 && SLOT_SIZE % 8 == 0);

/// Bytes needed for a map of `capacity` slots, saturating at `usize::MAX`
pub const fn region_size(capacity: usize) -> usize {
    capacity.saturating_mul(SLOT_SIZE).saturating_add(HEADER_SIZE)
}

/// Bytes needed for a map of `capacity` slots, `None` on overflow
pub const fn checked_region_size(capacity: usize) -> Option<usize> {
    match capacity.checked_mul(SLOT_SIZE) {
        Some(slots) => slots.checked_add(HEADER_SIZE),
        None => None,
    }
}

/// Slots that fit in `len` bytes
pub const fn capacity_for(len: usize) -> usize {
    len.saturating_sub(HEADER_SIZE) / SLOT_SIZE
}

/// Typed atomic view over a map region
pub(crate) struct Layout {
    base: NonNull<u8>,
}

// SAFETY: all access goes through atomics
unsafe impl Send for Layout {}
unsafe impl Sync for Layout {}

impl Layout {
    /// # Safety
    /// The region must be at least [`HEADER_SIZE`] bytes, 8-byte aligned, and
    /// outlive the returned view.
    pub unsafe fn new(region: &ShmRegion) -> Self {
        Self {
            // SAFETY: ShmRegion never holds a null base
            base: NonNull::new_unchecked(region.as_ptr()),
        }
    }

    #[inline]
    fn u32_at(&self, offset: usize) -> &AtomicU32 {
        // SAFETY: offsets are in bounds and aligned per the layout constants
        unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU32) }
    }

    #[inline]
    fn u64_at(&self, offset: usize) -> &AtomicU64 {
        // SAFETY: offsets are in bounds and aligned per the layout constants
        unsafe { &*(self.base.as_ptr().add(offset) as *const AtomicU64) }
    }

    #[inline]
    pub fn lock_ptr(&self) -> *mut u8 {
        // SAFETY: the lock block is at the start of the header
        unsafe { self.base.as_ptr().add(HEADER_LOCK_OFFSET) }
    }

    #[inline]
    pub fn magic(&self) -> &AtomicU32 {
        self.u32_at(HEADER_MAGIC_OFFSET)
    }

    #[inline]
    pub fn state(&self) -> &AtomicU32 {
        self.u32_at(HEADER_STATE_OFFSET)
    }

    #[inline]
    pub fn capacity(&self) -> &AtomicU64 {
        self.u64_at(HEADER_CAPACITY_OFFSET)
    }

    #[inline]
    pub fn count(&self) -> &AtomicU64 {
        self.u64_at(HEADER_COUNT_OFFSET)
    }

    #[inline]
    pub fn seed(&self) -> &AtomicU64 {
        self.u64_at(HEADER_SEED_OFFSET)
    }

    /// Key word of slot `index`; caller keeps `index < capacity`
    #[inline]
    pub fn key(&self, index: usize) -> &AtomicU64 {
        self.u64_at(SLOTS_OFFSET + index * SLOT_SIZE + SLOT_KEY_OFFSET)
    }

    /// Value word of slot `index`; caller keeps `index < capacity`
    #[inline]
    pub fn value(&self, index: usize) -> &AtomicU64 {
        self.u64_at(SLOTS_OFFSET + index * SLOT_SIZE + SLOT_VALUE_OFFSET)
    }
}
