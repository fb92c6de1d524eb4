/*!
 * Identity Generation
 *
 * 128-bit identities that never collide across hosts, processes, or time:
 * `host_id (64) || pid (32) || counter (32)` at fixed byte offsets.
 *
 * The host id is derived once per generator from the kernel boot id (or
 * injected before first use), the pid is captured at the same moment, and
 * the counter is a lock-free atomic shared by every thread using the
 * generator.
 */

use super::clock::DeadlineClock;
use super::config::RegistryConfig;
use super::errors::{RegistryError, RegistryResult};
use super::limits::{DEFAULT_BOOT_ID_PATH, HOST_ID_HEX_DIGITS, MAX_BOOT_ID_BYTES};
use super::types::Pid;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

// ============================================================================
// Identity Layout
// ============================================================================

pub const IDENTITY_LEN: usize = 16;
pub const IDENTITY_OFFSET_HOST_ID: usize = 0;
pub const IDENTITY_OFFSET_PID: usize = 8;
pub const IDENTITY_OFFSET_COUNTER: usize = 12;

/// Globally unique 128-bit identity
///
/// Fields are stored in native byte order at their fixed offsets, so the raw
/// bytes can be copied into shared memory and read back by any process on the
/// same architecture.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
#[repr(transparent)]
pub struct Identity([u8; IDENTITY_LEN]);

impl Identity {
    pub const ZERO: Identity = Identity([0; IDENTITY_LEN]);

    /// Pack the three fields at their offsets
    pub fn from_parts(host_id: u64, pid: Pid, counter: u32) -> Self {
        let mut raw = [0u8; IDENTITY_LEN];
        raw[IDENTITY_OFFSET_HOST_ID..IDENTITY_OFFSET_PID].copy_from_slice(&host_id.to_ne_bytes());
        raw[IDENTITY_OFFSET_PID..IDENTITY_OFFSET_COUNTER].copy_from_slice(&pid.to_ne_bytes());
        raw[IDENTITY_OFFSET_COUNTER..].copy_from_slice(&counter.to_ne_bytes());
        Self(raw)
    }

    #[inline]
    pub fn host_id(&self) -> u64 {
        self.high()
    }

    #[inline]
    pub fn pid(&self) -> Pid {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[IDENTITY_OFFSET_PID..IDENTITY_OFFSET_COUNTER]);
        Pid::from_ne_bytes(raw)
    }

    #[inline]
    pub fn counter(&self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(&self.0[IDENTITY_OFFSET_COUNTER..]);
        u32::from_ne_bytes(raw)
    }

    /// First 64 bits
    #[inline]
    pub fn high(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[..8]);
        u64::from_ne_bytes(raw)
    }

    /// Last 64 bits
    #[inline]
    pub fn low(&self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(&self.0[8..]);
        u64::from_ne_bytes(raw)
    }

    #[inline]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    #[inline]
    pub fn as_bytes(&self) -> &[u8; IDENTITY_LEN] {
        &self.0
    }

    /// Total order: high 64 bits first, then low 64 bits
    pub fn compare(&self, other: &Identity) -> Ordering {
        self.high()
            .cmp(&other.high())
            .then_with(|| self.low().cmp(&other.low()))
    }

    /// Copy the raw 16 bytes into the front of `dst`
    pub fn encode(&self, dst: &mut [u8]) -> RegistryResult<()> {
        let len = dst.len();
        let dst = dst.get_mut(..IDENTITY_LEN).ok_or_else(|| {
            RegistryError::InvalidArgument(format!(
                "destination holds {} bytes, identity needs {}",
                len, IDENTITY_LEN
            ))
        })?;
        dst.copy_from_slice(&self.0);
        Ok(())
    }

    /// Read the raw 16 bytes from the front of `src`
    pub fn decode(src: &[u8]) -> RegistryResult<Self> {
        let src = src.get(..IDENTITY_LEN).ok_or_else(|| {
            RegistryError::InvalidArgument(format!(
                "source holds {} bytes, identity needs {}",
                src.len(),
                IDENTITY_LEN
            ))
        })?;
        let mut raw = [0u8; IDENTITY_LEN];
        raw.copy_from_slice(src);
        Ok(Self(raw))
    }
}

impl PartialOrd for Identity {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Identity {
    fn cmp(&self, other: &Self) -> Ordering {
        self.compare(other)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}-{:08x}-{:08x}",
            self.host_id(),
            self.pid(),
            self.counter()
        )
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self)
    }
}

// ============================================================================
// Host Identity Derivation
// ============================================================================

/// Fold a boot id into a host id
///
/// Lowercases, drops every non-hex character, and folds only the last 16 hex
/// digits. Every node must derive host ids with this exact policy.
pub fn host_id_from_boot_id(boot_id: &str) -> RegistryResult<u64> {
    let digits: Vec<u32> = boot_id
        .chars()
        .map(|c| c.to_ascii_lowercase())
        .filter_map(|c| c.to_digit(16))
        .collect();

    if digits.len() < HOST_ID_HEX_DIGITS {
        return Err(RegistryError::InvalidArgument(format!(
            "boot id has {} hex digits, need at least {}",
            digits.len(),
            HOST_ID_HEX_DIGITS
        )));
    }

    let tail = &digits[digits.len() - HOST_ID_HEX_DIGITS..];
    Ok(tail
        .iter()
        .fold(0u64, |acc, &d| acc.wrapping_mul(16).wrapping_add(u64::from(d))))
}

fn read_boot_id(path: &Path) -> RegistryResult<String> {
    let mut text = String::new();
    File::open(path)
        .and_then(|file| file.take(MAX_BOOT_ID_BYTES).read_to_string(&mut text))
        .map_err(|e| {
            RegistryError::Failure(format!("unable to read boot id {}: {}", path.display(), e))
        })?;
    Ok(text)
}

// ============================================================================
// Generator
// ============================================================================

#[derive(Debug, Clone, Copy)]
struct HostState {
    host_id: u64,
    pid: Pid,
}

/// Per-process identity context
///
/// Construct independent generators in tests; use [`IdentityGenerator::global`]
/// for the process-wide instance.
pub struct IdentityGenerator {
    boot_id_path: PathBuf,
    host: OnceLock<HostState>,
    /// Serializes first-time derivation against `set_host_id`
    init: Mutex<()>,
    counter: AtomicU32,
}

static GLOBAL: OnceLock<Arc<IdentityGenerator>> = OnceLock::new();

impl IdentityGenerator {
    /// Generator reading the kernel boot id
    pub fn new() -> Self {
        Self::with_boot_id_path(DEFAULT_BOOT_ID_PATH)
    }

    /// Generator reading the boot id from `path`
    pub fn with_boot_id_path(path: impl Into<PathBuf>) -> Self {
        Self {
            boot_id_path: path.into(),
            host: OnceLock::new(),
            init: Mutex::new(()),
            counter: AtomicU32::new(0),
        }
    }

    /// Generator with an injected host id; no boot id is ever read
    pub fn with_host_id(host_id: u64) -> Self {
        let generator = Self::new();
        generator.install(host_id);
        generator
    }

    pub fn from_config(config: &RegistryConfig) -> Self {
        match config.host_id {
            Some(host_id) => {
                let generator = Self::with_boot_id_path(&config.boot_id_path);
                generator.install(host_id);
                generator
            }
            None => Self::with_boot_id_path(&config.boot_id_path),
        }
    }

    /// Process-wide generator, configured from the environment on first use
    pub fn global() -> Arc<IdentityGenerator> {
        GLOBAL
            .get_or_init(|| {
                let generator = match RegistryConfig::from_env() {
                    Ok(config) => Self::from_config(&config),
                    Err(e) => {
                        warn!(error = %e, "Ignoring malformed registry environment");
                        Self::new()
                    }
                };
                Arc::new(generator)
            })
            .clone()
    }

    pub fn boot_id_path(&self) -> &Path {
        &self.boot_id_path
    }

    /// Whether the host identity has been derived or injected
    pub fn is_initialized(&self) -> bool {
        self.host.get().is_some()
    }

    /// Memoized host id, derived from the boot id on first call
    pub fn host_id(&self) -> RegistryResult<u64> {
        self.state().map(|s| s.host_id)
    }

    /// Pid captured alongside the host id
    pub fn pid(&self) -> RegistryResult<Pid> {
        self.state().map(|s| s.pid)
    }

    /// Inject a host id; only allowed before the first derivation
    pub fn set_host_id(&self, host_id: u64) -> RegistryResult<()> {
        let _init = self.init.lock();
        if self.host.get().is_some() {
            return Err(RegistryError::AlreadyInitialized(
                "host id was already derived or set".into(),
            ));
        }
        self.install(host_id);
        Ok(())
    }

    /// Mint a new identity
    ///
    /// The counter wraps after 2^32 identities in one generator.
    pub fn generate_id(&self) -> RegistryResult<Identity> {
        let state = self.state()?;
        let counter = self.counter.fetch_add(1, AtomicOrdering::Relaxed);
        Ok(Identity::from_parts(state.host_id, state.pid, counter))
    }

    fn state(&self) -> RegistryResult<HostState> {
        if let Some(state) = self.host.get() {
            return Ok(*state);
        }

        let _init = self.init.lock();
        if let Some(state) = self.host.get() {
            return Ok(*state);
        }

        let boot_id = read_boot_id(&self.boot_id_path)?;
        let host_id = host_id_from_boot_id(&boot_id)
            .map_err(|e| e.context("unable to derive host id from boot id"))?;
        debug!(
            host_id = %format!("{:#018x}", host_id),
            path = %self.boot_id_path.display(),
            "Derived host id"
        );
        Ok(self.install(host_id))
    }

    /// Capture pid, seed the counter, publish the host state
    fn install(&self, host_id: u64) -> HostState {
        let state = HostState {
            host_id,
            pid: std::process::id(),
        };
        // Whole monotonic seconds give restart-to-restart spread
        let seed = DeadlineClock::system().now().sec() as u32;
        self.counter.store(seed, AtomicOrdering::Relaxed);
        let _ = self.host.set(state);
        state
    }
}

impl Default for IdentityGenerator {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for IdentityGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IdentityGenerator")
            .field("boot_id_path", &self.boot_id_path)
            .field("host", &self.host.get())
            .finish()
    }
}
