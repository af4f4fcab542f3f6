use core::ops::Add;
use core::time::Duration;

use embassy_time::Instant;
use treatment_core::telemetry::TelemetryInstant;

/// Monotonic console clock backed by the embassy std time driver.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub struct ConsoleInstant(Instant);

impl ConsoleInstant {
    pub fn now() -> Self {
        Self(Instant::now())
    }

    pub const fn into_embassy(self) -> Instant {
        self.0
    }

    /// Milliseconds elapsed since `origin`, saturating at zero.
    pub fn millis_since(self, origin: Self) -> u64 {
        self.saturating_duration_since(origin)
            .as_millis()
            .try_into()
            .unwrap_or(u64::MAX)
    }
}

impl From<Instant> for ConsoleInstant {
    fn from(instant: Instant) -> Self {
        Self(instant)
    }
}

impl Add<Duration> for ConsoleInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        embassy_time::Duration::try_from(rhs)
            .ok()
            .and_then(|delta| self.0.checked_add(delta))
            .map_or(Self(Instant::MAX), Self)
    }
}

impl TelemetryInstant for ConsoleInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        self.0
            .checked_duration_since(earlier.0)
            .map_or(Duration::ZERO, Duration::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn addition_saturates_at_the_end_of_time() {
        let late = ConsoleInstant::from(Instant::MAX);
        assert_eq!(late + Duration::from_secs(1), late);
    }

    #[test]
    fn durations_never_go_negative() {
        let early = ConsoleInstant::from(Instant::from_millis(1_000));
        let late = early + Duration::from_millis(250);
        assert_eq!(late.millis_since(early), 250);
        assert_eq!(early.millis_since(late), 0);
    }
}
