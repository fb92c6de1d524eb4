/*!
 * Synchronization Primitives
 *
 * Cross-process mutual exclusion for data living in shared regions.
 *
 * # Architecture
 *
 * - `SharedLock`: the contract a region-embedded lock fulfills
 * - `SpinLock`: atomic implementation over a documented byte layout
 * - `SyncConfig`: backoff tuning
 */

mod config;
mod spinlock;
mod traits;

pub use config::SyncConfig;
pub use spinlock::{SpinLock, LOCK_OWNER_OFFSET, LOCK_SIZE, LOCK_STATE_OFFSET};
pub use traits::{SharedLock, SharedLockGuard};
