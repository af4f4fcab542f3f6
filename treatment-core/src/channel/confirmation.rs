//! Request/response correlation over the event channel.
//!
//! A [`PendingConfirmation`] is created when the shot counter increment is
//! dispatched. It is consumed by exactly one of [`PendingConfirmation::resolve`]
//! or [`PendingConfirmation::expire`]; dropping it is the deregistration, so no
//! listener can outlive the cycle that created it.

use core::{fmt, ops::Add, time::Duration};

use super::{DispatchFailure, ErrorText, ShotIncrementResult};

/// Outstanding shot counter confirmation with a deadline.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct PendingConfirmation<I> {
    requested_at: I,
    deadline: I,
}

impl<I> PendingConfirmation<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    /// Starts waiting at `requested_at` for at most `timeout`.
    pub fn new(requested_at: I, timeout: Duration) -> Self {
        Self {
            requested_at,
            deadline: requested_at + timeout,
        }
    }

    /// Instant the request was dispatched.
    pub const fn requested_at(&self) -> I {
        self.requested_at
    }

    /// Instant at which the wait times out.
    pub const fn deadline(&self) -> I {
        self.deadline
    }

    /// Returns `true` once `now` has reached the deadline.
    pub fn is_expired(&self, now: I) -> bool {
        now >= self.deadline
    }

    /// Resolves the wait with a backend result.
    pub fn resolve(self, result: &ShotIncrementResult) -> ConfirmationOutcome {
        if result.success {
            ConfirmationOutcome::Confirmed {
                shot_count: result.shot_count,
            }
        } else {
            ConfirmationOutcome::Failed(ConfirmationFailure::Rejected(result.error.clone()))
        }
    }

    /// Times the wait out when the deadline has passed, otherwise hands it back.
    pub fn expire(self, now: I) -> Result<ConfirmationOutcome, Self> {
        if self.is_expired(now) {
            Ok(ConfirmationOutcome::Failed(ConfirmationFailure::TimedOut))
        } else {
            Err(self)
        }
    }
}

/// Final result of a confirmation wait.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfirmationOutcome {
    /// Backend reported success, optionally with the new counter.
    Confirmed { shot_count: Option<u32> },
    /// No confirmation was obtained.
    Failed(ConfirmationFailure),
}

/// Reason a confirmation was not obtained.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ConfirmationFailure {
    /// Backend answered without a success indicator.
    Rejected(Option<ErrorText>),
    /// No answer arrived before the deadline.
    TimedOut,
    /// The increment command itself could not be dispatched.
    NotDispatched(DispatchFailure),
}

impl ConfirmationFailure {
    /// Payload-free classification.
    #[must_use]
    pub fn kind(&self) -> ConfirmationFailureKind {
        match self {
            ConfirmationFailure::Rejected(_) => ConfirmationFailureKind::Rejected,
            ConfirmationFailure::TimedOut => ConfirmationFailureKind::TimedOut,
            ConfirmationFailure::NotDispatched(_) => ConfirmationFailureKind::NotDispatched,
        }
    }
}

impl fmt::Display for ConfirmationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfirmationFailure::Rejected(Some(error)) => write!(f, "rejected: {error}"),
            ConfirmationFailure::Rejected(None) => f.write_str("rejected"),
            ConfirmationFailure::TimedOut => f.write_str("timed out"),
            ConfirmationFailure::NotDispatched(reason) => write!(f, "not dispatched ({reason})"),
        }
    }
}

/// Payload-free [`ConfirmationFailure`] used in telemetry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ConfirmationFailureKind {
    Rejected,
    TimedOut,
    NotDispatched,
}
