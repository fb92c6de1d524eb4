/*!
 * Registry Module
 *
 * Concurrent key/value maps placed in shared memory regions.
 *
 * # Architecture
 *
 * - `layout`: byte layout of the header and slot array
 * - `map`: open-addressing table driven through the embedded lock
 * - `types`: lifecycle state and statistics
 */

pub mod layout;
pub mod map;
pub mod types;

pub use layout::{capacity_for, checked_region_size, region_size, HEADER_SIZE, MAP_MAGIC, SLOT_SIZE};
pub use map::{key_from_identity, ConcurrentMap};
pub use types::{MapState, MapStats};
