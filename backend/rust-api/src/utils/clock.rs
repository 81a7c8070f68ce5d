use chrono::{DateTime, Duration, FixedOffset, Offset, Utc};

/// Source of wall-clock time for the scheduler and subject lines.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<FixedOffset>;
}

/// Real clock shifted into the configured local offset.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    offset: FixedOffset,
}

impl SystemClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    pub fn utc() -> Self {
        Self::new(Utc.fix())
    }
}

impl Clock for SystemClock {
    fn now(&self) -> DateTime<FixedOffset> {
        Utc::now().with_timezone(&self.offset)
    }
}

/// Clock anchored at a given instant that advances with tokio's timer.
///
/// Under a paused runtime (`tokio::time::pause`) this yields simulated
/// wall-clock time, so whole days of scheduling can be replayed instantly.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    anchor: DateTime<FixedOffset>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn starting_at(anchor: DateTime<FixedOffset>) -> Self {
        Self {
            anchor,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<FixedOffset> {
        let elapsed = Duration::from_std(self.started.elapsed()).unwrap_or_else(|_| Duration::zero());
        self.anchor + elapsed
    }
}

/// Builds a fixed offset from minutes east of UTC.
pub fn offset_from_minutes(minutes: i32) -> Option<FixedOffset> {
    FixedOffset::east_opt(minutes.checked_mul(60)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Timelike};

    #[test]
    fn offset_from_minutes_accepts_common_zones() {
        assert_eq!(offset_from_minutes(0), Some(Utc.fix()));
        assert_eq!(
            offset_from_minutes(330).map(|o| o.local_minus_utc()),
            Some(330 * 60)
        );
        assert!(offset_from_minutes(24 * 60).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_clock_follows_paused_time() {
        let anchor = FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 3, 2, 6, 59, 0)
            .unwrap();
        let clock = TokioClock::starting_at(anchor);

        tokio::time::advance(std::time::Duration::from_secs(60)).await;

        let now = clock.now();
        assert_eq!(now.hour(), 7);
        assert_eq!(now.minute(), 0);
    }
}
