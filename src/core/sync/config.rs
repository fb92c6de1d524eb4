/*!
 * Synchronization Configuration
 *
 * Backoff tuning for the shared-memory lock
 */

use crate::core::limits::{LOCK_MAX_BACKOFF, LOCK_SPIN_ITERATIONS, LOCK_YIELD_ITERATIONS};
use std::time::Duration;

/// Lock backoff configuration
///
/// Waiting proceeds in three phases: tight spin for `spin_iterations`
/// attempts, `yield_now()` until `yield_iterations`, then exponentially
/// growing sleeps capped at `max_backoff`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    pub spin_iterations: u32,
    pub yield_iterations: u32,
    pub max_backoff: Duration,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            spin_iterations: LOCK_SPIN_ITERATIONS,
            yield_iterations: LOCK_YIELD_ITERATIONS,
            max_backoff: LOCK_MAX_BACKOFF,
        }
    }
}

impl SyncConfig {
    /// Configuration optimized for low-latency (< 1ms hold times expected)
    pub const fn low_latency() -> Self {
        Self {
            spin_iterations: 100,
            yield_iterations: 500,
            max_backoff: Duration::from_micros(50),
        }
    }

    /// Configuration optimized for long holds (> 1ms expected)
    pub const fn long_wait() -> Self {
        Self {
            spin_iterations: 4,
            yield_iterations: 10,
            max_backoff: Duration::from_millis(5),
        }
    }
}
