/*!
 * Registry Limits and Constants
 *
 * Centralized location for layout sizes, retry bounds and time constants.
 */

use std::time::Duration;

// =============================================================================
// TIME
// =============================================================================

pub const NSEC_PER_SEC: i64 = 1_000_000_000;

// =============================================================================
// IDENTITY
// =============================================================================

/// Kernel-exposed per-boot identifier
pub const DEFAULT_BOOT_ID_PATH: &str = "/proc/sys/kernel/random/boot_id";

/// Hex digits of the sanitized boot id folded into the host id (the trailing ones)
pub const HOST_ID_HEX_DIGITS: usize = 16;

/// Upper bound on bytes read from the boot-id source
pub const MAX_BOOT_ID_BYTES: u64 = 512;

// =============================================================================
// MAP
// =============================================================================

/// Generated-key attempts before `add_genkey` gives up
/// A collision this deep is a fault, not bad luck
pub const DEFAULT_GENKEY_RETRIES: u32 = 8;

/// Capacity used by the probe binary when none is configured
pub const DEFAULT_PROBE_CAPACITY: usize = 1024;

// =============================================================================
// LOCK BACKOFF
// =============================================================================

/// Tight spin iterations before yielding
pub const LOCK_SPIN_ITERATIONS: u32 = 10;

/// Iterations (cumulative) before switching from yield to sleep
pub const LOCK_YIELD_ITERATIONS: u32 = 50;

/// Cap for the exponential sleep phase
pub const LOCK_MAX_BACKOFF: Duration = Duration::from_millis(1);
