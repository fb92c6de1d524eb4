/*!
 * Registry Configuration
 *
 * Builder-style configuration with environment overrides:
 * - REGISTRY_BOOT_ID_PATH: boot-id source (default: /proc/sys/kernel/random/boot_id)
 * - REGISTRY_HOST_ID: injected host id, decimal or 0x-prefixed hex
 * - REGISTRY_GENKEY_RETRIES: generated-key attempts per insert
 * - REGISTRY_MAP_CAPACITY: capacity of maps created by the probe binary
 */

use super::errors::{RegistryError, RegistryResult};
use super::limits::{DEFAULT_BOOT_ID_PATH, DEFAULT_GENKEY_RETRIES, DEFAULT_PROBE_CAPACITY};
use super::sync::SyncConfig;
use std::path::PathBuf;

pub const ENV_BOOT_ID_PATH: &str = "REGISTRY_BOOT_ID_PATH";
pub const ENV_HOST_ID: &str = "REGISTRY_HOST_ID";
pub const ENV_GENKEY_RETRIES: &str = "REGISTRY_GENKEY_RETRIES";
pub const ENV_MAP_CAPACITY: &str = "REGISTRY_MAP_CAPACITY";

/// Per-map tuning
#[derive(Debug, Clone)]
pub struct MapConfig {
    /// Generated-key attempts before `add_genkey` fails
    pub genkey_retries: u32,
    /// Lock backoff
    pub sync: SyncConfig,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            genkey_retries: DEFAULT_GENKEY_RETRIES,
            sync: SyncConfig::default(),
        }
    }
}

impl MapConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_genkey_retries(mut self, retries: u32) -> Self {
        self.genkey_retries = retries.max(1);
        self
    }

    pub fn with_sync(mut self, sync: SyncConfig) -> Self {
        self.sync = sync;
        self
    }
}

/// Process-level configuration
#[derive(Debug, Clone)]
pub struct RegistryConfig {
    pub boot_id_path: PathBuf,
    /// Injected host id; skips boot-id derivation
    pub host_id: Option<u64>,
    pub map: MapConfig,
    pub map_capacity: usize,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            boot_id_path: PathBuf::from(DEFAULT_BOOT_ID_PATH),
            host_id: None,
            map: MapConfig::default(),
            map_capacity: DEFAULT_PROBE_CAPACITY,
        }
    }
}

impl RegistryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_boot_id_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.boot_id_path = path.into();
        self
    }

    pub fn with_host_id(mut self, host_id: u64) -> Self {
        self.host_id = Some(host_id);
        self
    }

    pub fn with_map(mut self, map: MapConfig) -> Self {
        self.map = map;
        self
    }

    pub fn with_map_capacity(mut self, capacity: usize) -> Self {
        self.map_capacity = capacity;
        self
    }

    /// Defaults overridden by `REGISTRY_*` variables
    pub fn from_env() -> RegistryResult<Self> {
        let mut config = Self::default();

        if let Some(path) = env_var(ENV_BOOT_ID_PATH) {
            config.boot_id_path = PathBuf::from(path);
        }
        if let Some(raw) = env_var(ENV_HOST_ID) {
            config.host_id = Some(parse_u64(ENV_HOST_ID, &raw)?);
        }
        if let Some(raw) = env_var(ENV_GENKEY_RETRIES) {
            let retries = parse_u64(ENV_GENKEY_RETRIES, &raw)?;
            let retries = u32::try_from(retries).map_err(|_| {
                RegistryError::InvalidArgument(format!("{} out of range: {}", ENV_GENKEY_RETRIES, raw))
            })?;
            config.map = config.map.with_genkey_retries(retries);
        }
        if let Some(raw) = env_var(ENV_MAP_CAPACITY) {
            let capacity = parse_u64(ENV_MAP_CAPACITY, &raw)?;
            config.map_capacity = usize::try_from(capacity).map_err(|_| {
                RegistryError::InvalidArgument(format!("{} out of range: {}", ENV_MAP_CAPACITY, raw))
            })?;
        }

        Ok(config)
    }
}

fn env_var(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// Decimal or `0x`-prefixed hex
fn parse_u64(name: &str, raw: &str) -> RegistryResult<u64> {
    let parsed = match raw.strip_prefix("0x").or_else(|| raw.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => raw.parse::<u64>(),
    };
    parsed.map_err(|e| RegistryError::InvalidArgument(format!("{}={:?}: {}", name, raw, e)))
}
