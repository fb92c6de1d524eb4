/*!
 * Shared Registry Library
 *
 * Building blocks for coordinating processes through shared memory:
 * - Monotonic deadlines and timespec arithmetic
 * - Host-unique 128-bit identities
 * - Fast hashing of words and byte buffers
 * - A lock-guarded concurrent map living in a shared region
 */

pub mod core;
pub mod memory;
pub mod monitoring;
pub mod registry;

// Re-exports
pub use crate::core::*;
pub use memory::ShmRegion;
pub use monitoring::init_tracing;
pub use registry::{key_from_identity, ConcurrentMap, MapState, MapStats};
