/*!
 * Clock Tests
 * Timespec arithmetic and deadline evaluation
 */

use pretty_assertions::assert_eq;
use proptest::prelude::*;
use shm_registry::{Deadline, DeadlineClock, ErrorKind, MonotonicClock, Timespec};
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

/// Clock frozen at a settable instant
struct FixedClock(AtomicI64);

impl FixedClock {
    fn at(nanos: i64) -> Self {
        Self(AtomicI64::new(nanos))
    }
}

impl MonotonicClock for FixedClock {
    fn now(&self) -> Timespec {
        Timespec::new(0, self.0.load(Ordering::SeqCst))
    }
}

#[test]
fn test_add_and_diff_carry() {
    let a = Timespec::new(1, 900_000_000);
    let b = Timespec::new(0, 200_000_000);
    assert_eq!(a.add(&b), Timespec::new(2, 100_000_000));
    assert_eq!(Timespec::new(2, 100_000_000).diff(&b), a);
    assert_eq!(b.diff(&a), Timespec::new(-2, 300_000_000));
}

#[test]
fn test_new_normalizes() {
    let ts = Timespec::new(1, 2_500_000_000);
    assert_eq!((ts.sec(), ts.nsec()), (3, 500_000_000));
    let ts = Timespec::new(1, -1);
    assert_eq!((ts.sec(), ts.nsec()), (0, 999_999_999));

    assert_eq!(
        Timespec::try_new(0, 1_000_000_000).unwrap_err().kind(),
        ErrorKind::InvalidArgument
    );
    assert_eq!(Timespec::try_new(5, 7).unwrap(), Timespec::new(5, 7));
}

#[test]
fn test_comparison() {
    let a = Timespec::new(1, 5);
    assert!(a.le(&a));
    assert!(a.le(&Timespec::new(1, 6)));
    assert!(!Timespec::new(2, 0).le(&a));
    assert!(a < Timespec::new(2, 0));
}

#[test]
fn test_system_clock_is_monotonic() {
    let clock = DeadlineClock::system();
    let first = clock.now();
    std::thread::sleep(Duration::from_millis(2));
    let second = clock.now();
    assert!(first.le(&second));
    assert!(second.diff(&first).as_nanos() >= 2_000_000);
    assert!(clock.now_as_f64() >= first.as_secs_f64());
}

#[test]
fn test_deadline_remaining() {
    let clock = DeadlineClock::with_clock(FixedClock::at(1_000));
    let deadline = clock.deadline(&Timespec::new(0, 500));

    assert_eq!(clock.remaining(&deadline).unwrap(), Timespec::new(0, 500));
    assert!(!clock.is_expired(&deadline));

    let clock = DeadlineClock::with_clock(FixedClock::at(1_500));
    let err = clock.remaining(&deadline).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Timeout);
    assert!(clock.is_expired(&deadline));
}

#[test]
fn test_zero_timeout_is_try_once() {
    let clock = DeadlineClock::system();
    let deadline = clock.deadline(&Timespec::ZERO);
    assert!(deadline.is_try_once());
    assert_eq!(clock.remaining(&Deadline::TRY_ONCE).unwrap(), Timespec::ZERO);
    assert!(!clock.is_expired(&Deadline::TRY_ONCE));
}

#[test]
fn test_duration_conversion() {
    let ts = Timespec::from(Duration::new(3, 7));
    assert_eq!((ts.sec(), ts.nsec()), (3, 7));
    assert_eq!(Duration::from(ts), Duration::new(3, 7));
    assert_eq!(Duration::from(Timespec::new(-1, 0)), Duration::ZERO);
}

fn timespec() -> impl Strategy<Value = Timespec> {
    (-1_000_000i64..1_000_000, 0i64..1_000_000_000).prop_map(|(s, n)| Timespec::new(s, n))
}

proptest! {
    #[test]
    fn prop_add_then_diff_restores(a in timespec(), b in timespec()) {
        let sum = a.add(&b);
        prop_assert!((0..1_000_000_000).contains(&sum.nsec()));
        prop_assert_eq!(sum.diff(&b), a);
        prop_assert_eq!(sum.as_nanos(), a.as_nanos() + b.as_nanos());
    }

    #[test]
    fn prop_le_matches_ordering(a in timespec(), b in timespec()) {
        prop_assert_eq!(a.le(&b), a.as_nanos() <= b.as_nanos());
    }
}
