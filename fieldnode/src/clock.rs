//! Wall-clock source for telemetry timestamps.

use std::time::Duration;

use chrono::{DateTime, Datelike, FixedOffset, Local, Utc};
use tracing::{debug, info};

use crate::config::ClockConfig;
use crate::error::{NodeError, Result};

/// Timestamp layout on the wire: `YYYY-MM-DD HH:MM:SS.mmm`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Source of the current wall-clock time.
pub trait Clock {
    /// Current local time.
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Host clock, in the local time zone or at a fixed UTC offset.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock {
    offset: Option<FixedOffset>,
}

impl SystemClock {
    /// Clock in the host's local time zone.
    pub fn local() -> Self {
        Self { offset: None }
    }

    /// Clock at a fixed offset east of UTC.
    pub fn with_offset(secs: i32) -> Result<Self> {
        let offset = FixedOffset::east_opt(secs)
            .ok_or_else(|| NodeError::config(format!("UTC offset {}s out of range", secs)))?;
        Ok(Self {
            offset: Some(offset),
        })
    }

    /// Build from the `clock` configuration section.
    pub fn from_config(config: &ClockConfig) -> Result<Self> {
        match config.utc_offset_secs {
            Some(secs) => Self::with_offset(secs),
            None => Ok(Self::local()),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        match self.offset {
            Some(offset) => Utc::now().with_timezone(&offset),
            None => Local::now().fixed_offset(),
        }
    }
}

/// Render a time as a telemetry timestamp.
///
/// # Example
/// ```
/// use chrono::DateTime;
/// use fieldnode::clock::format_timestamp;
///
/// let time = DateTime::parse_from_rfc3339("2026-03-01T08:05:09.042+08:00").unwrap();
/// assert_eq!(format_timestamp(&time), "2026-03-01 08:05:09.042");
/// ```
pub fn format_timestamp(time: &DateTime<FixedOffset>) -> String {
    time.format(TIMESTAMP_FORMAT).to_string()
}

/// Whether the clock reports a plausible, synchronized date.
pub fn is_synchronized<C: Clock>(clock: &C, min_year: i32) -> bool {
    clock.now().year() >= min_year
}

/// Block until the clock is synchronized.
///
/// A freshly booted device without a battery-backed clock starts near the
/// epoch; nothing useful can be timestamped until it has been set.
pub async fn wait_for_sync<C: Clock>(clock: &C, min_year: i32, poll: Duration) {
    if is_synchronized(clock, min_year) {
        return;
    }

    info!(min_year, "Waiting for time sync");
    while !is_synchronized(clock, min_year) {
        debug!(now = %clock.now(), "Clock not synchronized yet");
        tokio::time::sleep(poll).await;
    }
    info!(now = %format_timestamp(&clock.now()), "Time synchronized");
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tokio::time::Instant;

    /// Reports 1970 for the first `unsynced_reads` calls.
    struct BootClock {
        unsynced_reads: Cell<u32>,
    }

    impl Clock for BootClock {
        fn now(&self) -> DateTime<FixedOffset> {
            let remaining = self.unsynced_reads.get();
            if remaining > 0 {
                self.unsynced_reads.set(remaining - 1);
                DateTime::parse_from_rfc3339("1970-01-01T00:00:05+00:00").unwrap()
            } else {
                DateTime::parse_from_rfc3339("2026-10-18T09:30:00.250+00:00").unwrap()
            }
        }
    }

    #[test]
    fn test_fixed_offset_clock() {
        let clock = SystemClock::with_offset(8 * 3600).unwrap();
        assert_eq!(clock.now().offset().local_minus_utc(), 8 * 3600);
        assert!(SystemClock::with_offset(100_000).is_err());
    }

    #[test]
    fn test_from_config() {
        let config = ClockConfig {
            utc_offset_secs: Some(-3600),
            ..ClockConfig::default()
        };
        let clock = SystemClock::from_config(&config).unwrap();
        assert_eq!(clock.now().offset().local_minus_utc(), -3600);
    }

    #[test]
    fn test_timestamp_has_millis() {
        let time = DateTime::parse_from_rfc3339("2026-10-18T09:30:00+00:00").unwrap();
        assert_eq!(format_timestamp(&time), "2026-10-18 09:30:00.000");
    }

    #[test]
    fn test_system_clock_is_synchronized() {
        assert!(is_synchronized(&SystemClock::local(), 2016));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_for_sync_polls() {
        let clock = BootClock {
            unsynced_reads: Cell::new(4),
        };
        let start = Instant::now();
        wait_for_sync(&clock, 2016, Duration::from_millis(200)).await;

        assert!(is_synchronized(&clock, 2016));
        assert!(start.elapsed() >= Duration::from_millis(200));
    }
}
