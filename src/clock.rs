//! Monotonic time source for the repository, freezable for tests.
//!
//! The active clock is stored thread-locally; set once at startup (or per
//! test) and read through [`now`]. The `NT_CLOCK` environment variable, when
//! set to an RFC-3339 timestamp, freezes the clock for the whole process —
//! this is how the test scenarios pin "today".

use std::cell::RefCell;

use chrono::{DateTime, NaiveDate, Utc};

/// Selector for the active time source.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Clock {
    /// Wall-clock time.
    #[default]
    System,
    /// A fixed instant, returned by every call to [`now`].
    Frozen(DateTime<Utc>),
}

thread_local! {
    /// Thread-local variable holding the current clock.
    /// This allows parallel tests to freeze time independently
    /// without interfering with each other.
    static CURRENT_CLOCK: RefCell<Option<Clock>> = const { RefCell::new(None) };
}

/// Set the thread-local clock (configure once at startup).
pub fn set_clock(clock: Clock) {
    CURRENT_CLOCK.with(|c| {
        *c.borrow_mut() = Some(clock);
    });
}

/// Retrieve the clock for the current thread, initialising from `NT_CLOCK`
/// on first use.
pub fn get_clock() -> Clock {
    CURRENT_CLOCK.with(|c| {
        let mut cur = c.borrow_mut();
        if cur.is_none() {
            *cur = Some(clock_from_env().unwrap_or(Clock::System));
        }
        cur.unwrap_or_default()
    })
}

fn clock_from_env() -> Option<Clock> {
    let raw = std::env::var("NT_CLOCK").ok()?;
    let t = DateTime::parse_from_rfc3339(raw.trim()).ok()?;
    Some(Clock::Frozen(t.with_timezone(&Utc)))
}

/// Current time according to the active clock, truncated to whole seconds so
/// persisted timestamps round-trip through RFC-3339.
pub fn now() -> DateTime<Utc> {
    let t = match get_clock() {
        Clock::System => Utc::now(),
        Clock::Frozen(t) => t,
    };
    t.with_nanosecond_zero()
}

/// Today's date according to the active clock.
pub fn today() -> NaiveDate {
    now().date_naive()
}

trait TruncateNanos {
    fn with_nanosecond_zero(self) -> DateTime<Utc>;
}

impl TruncateNanos for DateTime<Utc> {
    fn with_nanosecond_zero(self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.timestamp(), 0).unwrap_or(self)
    }
}

/// A guard to reset the clock after a test.
pub struct ClockGuard {
    prev: Clock,
}

impl Drop for ClockGuard {
    fn drop(&mut self) {
        set_clock(self.prev);
    }
}

/// Freeze the clock for the current thread and return a guard that restores
/// the previous clock when dropped.
pub fn freeze_at(t: DateTime<Utc>) -> ClockGuard {
    let prev = get_clock();
    set_clock(Clock::Frozen(t));
    ClockGuard { prev }
}
