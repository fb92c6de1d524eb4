/*!
 * Memory Module
 * Regions that back shared registry structures
 */

pub mod region;

pub use region::{ShmRegion, REGION_ALIGN};
