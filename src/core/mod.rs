/*!
 * Core Module
 * Fundamental registry types, error handling and shared utilities
 */

pub mod clock;
pub mod config;
pub mod errors;
pub mod hash;
pub mod id;
pub mod limits;
pub mod sync;
pub mod types;

// Re-export for convenience
pub use clock::{Deadline, DeadlineClock, MonotonicClock, SystemClock, Timespec};
pub use config::{MapConfig, RegistryConfig};
pub use errors::*;
pub use hash::{bytes_equal, hash_bytes, hash_u64};
pub use id::{host_id_from_boot_id, Identity, IdentityGenerator, IDENTITY_LEN};
pub use sync::{SharedLock, SpinLock, SyncConfig};
pub use types::*;
