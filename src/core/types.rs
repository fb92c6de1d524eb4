/*!
 * Core Types
 * Common types used across the registry
 */

use serde::{Deserialize, Serialize};
use std::fmt;

/// Process ID type
pub type Pid = u32;

/// Map key; `0` is reserved as "no key"
pub type MapKey = u64;

/// Reserved empty key
pub const NO_KEY: MapKey = 0;

/// Opaque record value
///
/// An offset or handle into a region the caller knows about. The map stores it
/// verbatim and never dereferences it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct MapValue(pub u64);

impl MapValue {
    #[inline]
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    #[inline]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for MapValue {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl From<MapValue> for u64 {
    fn from(value: MapValue) -> Self {
        value.0
    }
}

impl fmt::Display for MapValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}
