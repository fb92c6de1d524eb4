/*!
 * Shared-Memory Spin Lock
 *
 * Atomic lock over a fixed 8-byte block inside a shared region, so any
 * process mapping the region can place and drive it:
 *
 * ```text
 * +0  u32  state   0 = free, 1 = held
 * +4  u32  owner   pid of the holder, 0 when free (diagnostic only)
 * ```
 *
 * Waiting uses three-phase backoff (spin hint, yield, exponential sleep).
 * Bounded waits re-check the monotonic clock on every failed attempt, and a
 * sleep never overshoots the time left.
 */

use super::config::SyncConfig;
use super::traits::SharedLock;
use crate::core::clock::{Deadline, DeadlineClock};
use crate::core::errors::{RegistryError, RegistryResult};
use crate::core::types::Pid;
use std::sync::atomic::{AtomicU32, Ordering};
use std::thread;
use std::time::Duration;

pub const LOCK_SIZE: usize = 8;
pub const LOCK_STATE_OFFSET: usize = 0;
pub const LOCK_OWNER_OFFSET: usize = 4;

const UNLOCKED: u32 = 0;
const LOCKED: u32 = 1;

const INITIAL_BACKOFF: Duration = Duration::from_micros(1);

/// Handle over a lock block living in shared memory
pub struct SpinLock<'a> {
    state: &'a AtomicU32,
    owner: &'a AtomicU32,
    config: SyncConfig,
    clock: DeadlineClock,
}

impl<'a> SpinLock<'a> {
    /// View the lock block at `base`
    ///
    /// # Safety
    /// `base` must be 4-byte aligned, point to [`LOCK_SIZE`] bytes valid for
    /// `'a`, and those bytes must only ever be accessed atomically.
    pub unsafe fn from_ptr(base: *mut u8, config: SyncConfig) -> Self {
        Self {
            state: &*(base.add(LOCK_STATE_OFFSET) as *const AtomicU32),
            owner: &*(base.add(LOCK_OWNER_OFFSET) as *const AtomicU32),
            config,
            clock: DeadlineClock::system(),
        }
    }

    /// Reset to the free state; memory may hold garbage beforehand
    pub fn init(&self) {
        self.owner.store(0, Ordering::Relaxed);
        self.state.store(UNLOCKED, Ordering::Release);
    }

    /// Release the lock resource regardless of holder
    pub fn destroy(&self) {
        self.init();
    }

    pub fn is_locked(&self) -> bool {
        self.state.load(Ordering::Acquire) == LOCKED
    }

    /// Pid of the current holder, if any
    pub fn owner(&self) -> Option<Pid> {
        match self.owner.load(Ordering::Relaxed) {
            0 => None,
            pid => Some(pid),
        }
    }

    #[inline]
    fn try_acquire(&self) -> bool {
        if self
            .state
            .compare_exchange(UNLOCKED, LOCKED, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            self.owner.store(std::process::id(), Ordering::Relaxed);
            true
        } else {
            false
        }
    }
}

impl SharedLock for SpinLock<'_> {
    fn acquire(&self, deadline: Option<&Deadline>) -> RegistryResult<()> {
        let mut attempt: u32 = 0;
        let mut backoff = INITIAL_BACKOFF;

        loop {
            if self.try_acquire() {
                return Ok(());
            }

            let remaining = match deadline {
                None => None,
                Some(d) if d.is_try_once() => {
                    return Err(RegistryError::Timeout(
                        "lock is held and the deadline is try-once".into(),
                    ));
                }
                Some(d) => Some(Duration::from(
                    self.clock
                        .remaining(d)
                        .map_err(|e| e.context("lock acquisition"))?,
                )),
            };

            if attempt < self.config.spin_iterations {
                std::hint::spin_loop();
            } else if attempt < self.config.yield_iterations {
                thread::yield_now();
            } else {
                let nap = remaining.map_or(backoff, |r| backoff.min(r));
                thread::sleep(nap);
                backoff = (backoff * 2).min(self.config.max_backoff);
            }

            attempt = attempt.saturating_add(1);
        }
    }

    fn release(&self) {
        self.owner.store(0, Ordering::Relaxed);
        self.state.store(UNLOCKED, Ordering::Release);
    }

    fn name(&self) -> &'static str {
        "spin"
    }
}
