/*!
 * Deadline Clock
 *
 * Monotonic deadline arithmetic for every bounded wait in the registry.
 *
 * A zero relative timeout is the "try once, never block" sentinel and maps to
 * the zero deadline. Deadlines are absolute `CLOCK_MONOTONIC` points, so they
 * stay meaningful across processes on the same host and are immune to
 * wall-clock adjustments.
 */

use super::errors::{RegistryError, RegistryResult};
use super::limits::NSEC_PER_SEC;
use nix::time::{clock_gettime, ClockId};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Normalized `(seconds, nanoseconds)` pair, `0 <= nsec < 1e9`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Timespec {
    sec: i64,
    nsec: i64,
}

impl Timespec {
    pub const ZERO: Timespec = Timespec { sec: 0, nsec: 0 };

    /// Build from raw parts, carrying nanoseconds into seconds
    pub const fn new(sec: i64, nsec: i64) -> Self {
        let sec = sec.saturating_add(nsec.div_euclid(NSEC_PER_SEC));
        let nsec = nsec.rem_euclid(NSEC_PER_SEC);
        Self { sec, nsec }
    }

    /// Build from raw parts that must already be normalized
    pub fn try_new(sec: i64, nsec: i64) -> RegistryResult<Self> {
        if !(0..NSEC_PER_SEC).contains(&nsec) {
            return Err(RegistryError::InvalidArgument(format!(
                "nanoseconds {} outside [0, {})",
                nsec, NSEC_PER_SEC
            )));
        }
        Ok(Self { sec, nsec })
    }

    #[inline]
    pub const fn sec(&self) -> i64 {
        self.sec
    }

    #[inline]
    pub const fn nsec(&self) -> i64 {
        self.nsec
    }

    #[inline]
    pub const fn is_zero(&self) -> bool {
        self.sec == 0 && self.nsec == 0
    }

    /// Normalized sum
    pub fn add(&self, other: &Timespec) -> Timespec {
        let mut sec = self.sec.saturating_add(other.sec);
        let mut nsec = self.nsec + other.nsec;
        if nsec >= NSEC_PER_SEC {
            sec = sec.saturating_add(1);
            nsec -= NSEC_PER_SEC;
        }
        Timespec { sec, nsec }
    }

    /// Normalized difference `self - other`
    pub fn diff(&self, other: &Timespec) -> Timespec {
        let mut sec = self.sec.saturating_sub(other.sec);
        let mut nsec = self.nsec - other.nsec;
        if nsec < 0 {
            sec = sec.saturating_sub(1);
            nsec += NSEC_PER_SEC;
        }
        Timespec { sec, nsec }
    }

    /// Non-strict `self <= other`
    #[inline]
    pub fn le(&self, other: &Timespec) -> bool {
        self.sec < other.sec || (self.sec == other.sec && self.nsec <= other.nsec)
    }

    /// Total nanoseconds
    pub fn as_nanos(&self) -> i128 {
        i128::from(self.sec) * i128::from(NSEC_PER_SEC) + i128::from(self.nsec)
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.sec as f64 + self.nsec as f64 / NSEC_PER_SEC as f64
    }
}

impl PartialOrd for Timespec {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Timespec {
    fn cmp(&self, other: &Self) -> Ordering {
        (self.sec, self.nsec).cmp(&(other.sec, other.nsec))
    }
}

impl From<Duration> for Timespec {
    fn from(d: Duration) -> Self {
        Timespec {
            sec: i64::try_from(d.as_secs()).unwrap_or(i64::MAX),
            nsec: i64::from(d.subsec_nanos()),
        }
    }
}

impl From<Timespec> for Duration {
    /// Negative spans clamp to zero
    fn from(ts: Timespec) -> Self {
        if ts.sec < 0 {
            return Duration::ZERO;
        }
        Duration::new(ts.sec as u64, ts.nsec as u32)
    }
}

impl fmt::Display for Timespec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{:09}s", self.sec, self.nsec)
    }
}

/// Absolute monotonic point after which a bounded wait gives up
///
/// The zero deadline means "try once".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Deadline(Timespec);

impl Deadline {
    /// Try-once sentinel
    pub const TRY_ONCE: Deadline = Deadline(Timespec::ZERO);

    /// Wrap an absolute monotonic time
    pub const fn at(when: Timespec) -> Self {
        Self(when)
    }

    #[inline]
    pub const fn is_try_once(&self) -> bool {
        self.0.is_zero()
    }

    #[inline]
    pub const fn as_timespec(&self) -> &Timespec {
        &self.0
    }
}

/// Source of monotonic time
pub trait MonotonicClock: Send + Sync {
    fn now(&self) -> Timespec;
}

/// `CLOCK_MONOTONIC`
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl MonotonicClock for SystemClock {
    fn now(&self) -> Timespec {
        match clock_gettime(ClockId::CLOCK_MONOTONIC) {
            Ok(ts) => Timespec::new(ts.tv_sec() as i64, ts.tv_nsec() as i64),
            // CLOCK_MONOTONIC is mandatory on Linux; fall back to a stable origin
            Err(_) => Timespec::ZERO,
        }
    }
}

/// Converts relative timeouts to absolute deadlines and back
#[derive(Debug, Clone, Default)]
pub struct DeadlineClock<C: MonotonicClock = SystemClock> {
    clock: C,
}

impl DeadlineClock<SystemClock> {
    pub const fn system() -> Self {
        Self { clock: SystemClock }
    }
}

impl<C: MonotonicClock> DeadlineClock<C> {
    /// Use a custom time source
    pub fn with_clock(clock: C) -> Self {
        Self { clock }
    }

    #[inline]
    pub fn now(&self) -> Timespec {
        self.clock.now()
    }

    /// Monotonic time in seconds
    pub fn now_as_f64(&self) -> f64 {
        self.clock.now().as_secs_f64()
    }

    /// Absolute deadline for a relative timeout
    pub fn deadline(&self, timeout: &Timespec) -> Deadline {
        if timeout.is_zero() {
            return Deadline::TRY_ONCE;
        }
        Deadline(self.clock.now().add(timeout))
    }

    /// Absolute deadline for a `Duration`
    pub fn deadline_after(&self, timeout: Duration) -> Deadline {
        self.deadline(&Timespec::from(timeout))
    }

    /// Time left before `deadline`
    ///
    /// The try-once deadline yields zero with success. A deadline at or before
    /// now yields [`RegistryError::Timeout`].
    pub fn remaining(&self, deadline: &Deadline) -> RegistryResult<Timespec> {
        if deadline.is_try_once() {
            return Ok(Timespec::ZERO);
        }

        let now = self.clock.now();
        if deadline.0.le(&now) {
            return Err(RegistryError::Timeout(format!(
                "deadline {} passed at {}",
                deadline.0, now
            )));
        }

        Ok(deadline.0.diff(&now))
    }

    /// Whether `deadline` has passed; try-once never counts as expired
    pub fn is_expired(&self, deadline: &Deadline) -> bool {
        self.remaining(deadline).is_err()
    }
}

/// Whole seconds to nanoseconds
#[inline]
pub const fn sec_to_nsec(sec: u64) -> u64 {
    sec.saturating_mul(NSEC_PER_SEC as u64)
}
