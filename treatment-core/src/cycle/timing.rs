//! Fixed waits and display holds used by the treatment cycle.

use core::time::Duration;

/// Wait after the depth move before firing.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(1_000);
/// Wait after the return-home move before updating the shot counter.
pub const DEFAULT_RETURN_SETTLE: Duration = Duration::from_millis(500);
/// Upper bound on the shot counter confirmation wait.
pub const DEFAULT_CONFIRMATION_TIMEOUT: Duration = Duration::from_millis(5_000);
/// How long "cycle complete" stays visible.
pub const DEFAULT_COMPLETE_HOLD: Duration = Duration::from_millis(2_000);
/// How long "cycle error" stays visible.
pub const DEFAULT_ERROR_HOLD: Duration = Duration::from_millis(3_000);
/// How long the foot-switch indicator stays visible after the last edge.
pub const DEFAULT_FOOT_SWITCH_HOLD: Duration = Duration::from_millis(1_000);
/// Presses closer than this to the previous edge are treated as bounce.
pub const DEFAULT_FOOT_SWITCH_DEBOUNCE: Duration = Duration::from_millis(200);

/// Timing configuration for the cycle orchestrator and ready screen.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleTiming {
    settle: Duration,
    return_settle: Duration,
    confirmation_timeout: Duration,
    complete_hold: Duration,
    error_hold: Duration,
    foot_switch_hold: Duration,
    foot_switch_debounce: Duration,
}

impl CycleTiming {
    /// Timing used by the production device.
    pub const DEFAULT: Self = Self {
        settle: DEFAULT_SETTLE,
        return_settle: DEFAULT_RETURN_SETTLE,
        confirmation_timeout: DEFAULT_CONFIRMATION_TIMEOUT,
        complete_hold: DEFAULT_COMPLETE_HOLD,
        error_hold: DEFAULT_ERROR_HOLD,
        foot_switch_hold: DEFAULT_FOOT_SWITCH_HOLD,
        foot_switch_debounce: DEFAULT_FOOT_SWITCH_DEBOUNCE,
    };

    #[must_use]
    pub const fn with_settle(mut self, settle: Duration) -> Self {
        self.settle = settle;
        self
    }

    #[must_use]
    pub const fn with_return_settle(mut self, return_settle: Duration) -> Self {
        self.return_settle = return_settle;
        self
    }

    #[must_use]
    pub const fn with_confirmation_timeout(mut self, timeout: Duration) -> Self {
        self.confirmation_timeout = timeout;
        self
    }

    #[must_use]
    pub const fn with_holds(mut self, complete: Duration, error: Duration) -> Self {
        self.complete_hold = complete;
        self.error_hold = error;
        self
    }

    #[must_use]
    pub const fn with_foot_switch(mut self, hold: Duration, debounce: Duration) -> Self {
        self.foot_switch_hold = hold;
        self.foot_switch_debounce = debounce;
        self
    }

    #[must_use]
    pub const fn settle(&self) -> Duration {
        self.settle
    }

    #[must_use]
    pub const fn return_settle(&self) -> Duration {
        self.return_settle
    }

    #[must_use]
    pub const fn confirmation_timeout(&self) -> Duration {
        self.confirmation_timeout
    }

    #[must_use]
    pub const fn complete_hold(&self) -> Duration {
        self.complete_hold
    }

    #[must_use]
    pub const fn error_hold(&self) -> Duration {
        self.error_hold
    }

    #[must_use]
    pub const fn foot_switch_hold(&self) -> Duration {
        self.foot_switch_hold
    }

    #[must_use]
    pub const fn foot_switch_debounce(&self) -> Duration {
        self.foot_switch_debounce
    }
}

impl Default for CycleTiming {
    fn default() -> Self {
        Self::DEFAULT
    }
}
