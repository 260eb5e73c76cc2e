/// Time helpers shared by the exchange handlers and start-up logging
#[cfg(test)]
use std::sync::atomic::{AtomicI64, Ordering};
use time::{format_description, OffsetDateTime};

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Source of the current time, injectable so replies can be checked in tests
pub trait Clock: Send + Sync {
    fn now(&self) -> OffsetDateTime;

    /// Current time as whole seconds since the Unix epoch
    fn unix_now(&self) -> i64 {
        self.now().unix_timestamp()
    }
}

/// Wall clock in UTC
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }
}

/// Manually driven clock
#[cfg(test)]
#[derive(Debug)]
pub struct FixedClock {
    unix: AtomicI64,
}

#[cfg(test)]
impl FixedClock {
    pub fn new(unix: i64) -> Self {
        Self {
            unix: AtomicI64::new(unix),
        }
    }

    pub fn set(&self, unix: i64) {
        self.unix.store(unix, Ordering::SeqCst);
    }

    pub fn advance(&self, seconds: i64) {
        self.unix.fetch_add(seconds, Ordering::SeqCst);
    }
}

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(self.unix.load(Ordering::SeqCst))
            .unwrap_or(OffsetDateTime::UNIX_EPOCH)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_day_first() {
        let dt = OffsetDateTime::from_unix_timestamp(1_600_000_000).unwrap();
        assert_eq!(format_datetime(&dt), "13.09.2020 - 12:26:40");
    }

    #[test]
    fn fixed_clock_advances() {
        let clock = FixedClock::new(1_600_000_000);
        assert_eq!(clock.unix_now(), 1_600_000_000);
        clock.advance(1);
        assert_eq!(clock.unix_now(), 1_600_000_001);
        clock.set(42);
        assert_eq!(clock.unix_now(), 42);
    }
}
