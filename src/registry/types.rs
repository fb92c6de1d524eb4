/*!
 * Registry Types
 * Lifecycle states and statistics for shared maps
 */

use crate::core::types::Pid;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Map lifecycle as recorded in the shared header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u32)]
pub enum MapState {
    Uninitialized = 0,
    Created = 1,
    /// Terminal
    Destroyed = 2,
}

impl MapState {
    /// Decode the header word; unknown values read as uninitialized
    pub fn from_raw(raw: u32) -> Self {
        match raw {
            1 => MapState::Created,
            2 => MapState::Destroyed,
            _ => MapState::Uninitialized,
        }
    }

    #[inline]
    pub const fn as_raw(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for MapState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapState::Uninitialized => write!(f, "uninitialized"),
            MapState::Created => write!(f, "created"),
            MapState::Destroyed => write!(f, "destroyed"),
        }
    }
}

/// Point-in-time map statistics
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct MapStats {
    pub state: MapState,
    pub capacity: usize,
    pub len: usize,
    pub seed: u64,
    pub region_bytes: usize,
    pub lock_held: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub lock_owner: Option<Pid>,
}

impl MapStats {
    /// Fraction of slots in use
    pub fn load_factor(&self) -> f64 {
        if self.capacity == 0 {
            return 0.0;
        }
        self.len as f64 / self.capacity as f64
    }
}
