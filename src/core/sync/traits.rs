/*!
 * Synchronization Traits
 *
 * Contract for the mutual-exclusion object embedded in a shared region.
 */

use crate::core::clock::Deadline;
use crate::core::errors::RegistryResult;

/// Lock usable concurrently by every process mapping the same region
///
/// Deadline semantics for [`SharedLock::acquire`]:
/// - `None`: wait indefinitely
/// - `Some(Deadline::TRY_ONCE)`: never block
/// - `Some(d)`: give up with `Timeout` once the monotonic clock passes `d`
pub trait SharedLock: Send + Sync {
    fn acquire(&self, deadline: Option<&Deadline>) -> RegistryResult<()>;

    fn release(&self);

    /// Acquire and return a guard releasing on every exit path
    fn lock(&self, deadline: Option<&Deadline>) -> RegistryResult<SharedLockGuard<'_, Self>>
    where
        Self: Sized,
    {
        self.acquire(deadline)?;
        Ok(SharedLockGuard { lock: self })
    }

    /// Strategy name for debugging
    fn name(&self) -> &'static str;
}

/// Scoped acquisition
#[must_use = "the lock is released as soon as the guard is dropped"]
pub struct SharedLockGuard<'l, L: SharedLock> {
    lock: &'l L,
}

impl<L: SharedLock> Drop for SharedLockGuard<'_, L> {
    fn drop(&mut self) {
        self.lock.release();
    }
}
