//! Treatment cycle orchestration.
//!
//! A cycle moves the needle to the configured depth, fires RF, waits out the
//! RF window plus the post-fire delay, returns home and finally asks the
//! backend to bump the tip shot counter. [`CycleOrchestrator`] is poll driven:
//! callers invoke [`CycleOrchestrator::drive`] whenever time advances and
//! [`CycleOrchestrator::handle_shot_increment`] when the backend answers. Each
//! dispatch completes synchronously before the next step, and timed waits are
//! expressed as deadlines rather than sleeps, so the same state machine runs
//! under an embedded executor, a host event loop, or a test clock.

pub mod timing;

use core::{fmt, ops::Add, time::Duration};

use heapless::Vec;

use crate::channel::{
    CommandKind, ConfirmationFailure, ConfirmationFailureKind, ConfirmationOutcome,
    DeviceChannel, DeviceCommand, DispatchFailure, PendingConfirmation, ShotIncrementResult,
};
use crate::params::{ParameterError, ParameterId, ParameterStore, Quantity};
use crate::status::StatusBoard;
use crate::telemetry::{
    EventId, TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecorder,
};
use crate::trigger::TriggerSource;

pub use timing::CycleTiming;

/// Maximum number of telemetry events tracked per cycle.
pub const MAX_RUN_EVENTS: usize = 16;

/// Command returning the needle to its home position.
pub const HOME_COMMAND: DeviceCommand = DeviceCommand::move_to(0);

/// Monotonic instant usable by the orchestrator.
pub trait CycleInstant: Copy + Ord + Add<Duration, Output = Self> + TelemetryInstant {}

impl<T> CycleInstant for T where T: Copy + Ord + Add<Duration, Output = T> + TelemetryInstant {}

/// Validated inputs of one cycle, captured when the cycle starts.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleRequest {
    /// Depth converted to motor units (hundredths of a millimetre).
    pub motor_position: i32,
    pub intensity: u16,
    pub rf_time_ms: u32,
    pub delay_ms: i32,
}

impl CycleRequest {
    /// Reads DEPTH, INTENSITY, RF and DELAY TIME from the store.
    pub fn from_parameters(parameters: &ParameterStore) -> Result<Self, ParameterError> {
        let depth = parameters.quantity(ParameterId::Depth)?;
        let intensity = parameters.quantity(ParameterId::Intensity)?;
        let rf = parameters.quantity(ParameterId::Rf)?;
        let delay = parameters.quantity(ParameterId::DelayTime)?;

        Self::new(depth, intensity.truncated(), rf.truncated(), delay.truncated())
    }

    /// Validates raw cycle inputs.
    ///
    /// Depth, intensity and RF time must be strictly positive. The delay may
    /// be zero or negative.
    pub fn new(
        depth: Quantity,
        intensity: i32,
        rf_time_ms: i32,
        delay_ms: i32,
    ) -> Result<Self, ParameterError> {
        if !depth.is_positive() {
            return Err(ParameterError::NotPositive(ParameterId::Depth));
        }
        if intensity <= 0 {
            return Err(ParameterError::NotPositive(ParameterId::Intensity));
        }
        if rf_time_ms <= 0 {
            return Err(ParameterError::NotPositive(ParameterId::Rf));
        }

        Ok(Self {
            motor_position: i32::try_from(depth.hundredths())
                .map_err(|_| ParameterError::OutOfRange(ParameterId::Depth))?,
            intensity: u16::try_from(intensity)
                .map_err(|_| ParameterError::OutOfRange(ParameterId::Intensity))?,
            rf_time_ms: u32::try_from(rf_time_ms)
                .map_err(|_| ParameterError::OutOfRange(ParameterId::Rf))?,
            delay_ms,
        })
    }

    /// Wait after firing: RF time plus delay, never below zero.
    #[must_use]
    pub fn post_fire_wait(&self) -> Duration {
        let total = i64::from(self.rf_time_ms) + i64::from(self.delay_ms);
        Duration::from_millis(u64::try_from(total).unwrap_or(0))
    }

    #[must_use]
    pub const fn depth_command(&self) -> DeviceCommand {
        DeviceCommand::move_to(self.motor_position)
    }

    #[must_use]
    pub const fn rf_shot_command(&self) -> DeviceCommand {
        DeviceCommand::RfShot {
            intensity: self.intensity,
            rf_time_ms: self.rf_time_ms,
        }
    }

    #[must_use]
    pub const fn rf_dtr_high_command(&self) -> DeviceCommand {
        DeviceCommand::RfDtrHigh {
            rf_time_ms: self.rf_time_ms,
        }
    }
}

/// How a completed cycle left the shot counter.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleOutcome {
    /// Backend confirmed the increment.
    Confirmed { shot_count: Option<u32> },
    /// Treatment happened but the counter could not be confirmed.
    Unconfirmed(ConfirmationFailureKind),
}

impl CycleOutcome {
    #[must_use]
    pub const fn is_confirmed(self) -> bool {
        matches!(self, CycleOutcome::Confirmed { .. })
    }
}

/// Reason a cycle was aborted.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleError {
    /// The channel refused a motion or RF command.
    DispatchFailed {
        command: CommandKind,
        reason: DispatchFailure,
    },
    /// The operator cancelled the cycle.
    Cancelled,
}

impl fmt::Display for CycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CycleError::DispatchFailed { command, reason } => {
                write!(f, "{command} dispatch failed ({reason})")
            }
            CycleError::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Cycle lifecycle.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CycleState {
    Idle,
    MovingToDepth,
    Stabilizing,
    FiringRf,
    WaitingRfComplete,
    ReturningHome,
    UpdatingShotCount,
    Complete(CycleOutcome),
    Error(CycleError),
}

impl CycleState {
    /// Returns `true` while the cycle is executing.
    #[must_use]
    pub const fn is_active(self) -> bool {
        !matches!(
            self,
            CycleState::Idle | CycleState::Complete(_) | CycleState::Error(_)
        )
    }

    /// Returns `true` once the cycle has concluded.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, CycleState::Complete(_) | CycleState::Error(_))
    }

    /// Stable label used in telemetry and console output.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            CycleState::Idle => "idle",
            CycleState::MovingToDepth => "moving-to-depth",
            CycleState::Stabilizing => "stabilizing",
            CycleState::FiringRf => "firing-rf",
            CycleState::WaitingRfComplete => "waiting-rf-complete",
            CycleState::ReturningHome => "returning-home",
            CycleState::UpdatingShotCount => "updating-shot-count",
            CycleState::Complete(_) => "complete",
            CycleState::Error(_) => "error",
        }
    }

    /// Operator-facing status text; `None` when nothing is shown.
    #[must_use]
    pub const fn status_text(self) -> Option<&'static str> {
        match self {
            CycleState::Idle => None,
            CycleState::MovingToDepth
            | CycleState::Stabilizing
            | CycleState::FiringRf
            | CycleState::WaitingRfComplete
            | CycleState::ReturningHome
            | CycleState::UpdatingShotCount => Some("Moving..."),
            CycleState::Complete(_) => Some("Cycle complete"),
            CycleState::Error(_) => Some("Cycle error"),
        }
    }
}

/// Why a cycle request was refused.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RejectionReason {
    /// A cycle is already running.
    Busy,
    /// The backend link is down.
    Disconnected,
    /// A cycle input is missing or not usable.
    InvalidParameters(ParameterError),
}

impl fmt::Display for RejectionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RejectionReason::Busy => f.write_str("busy"),
            RejectionReason::Disconnected => f.write_str("disconnected"),
            RejectionReason::InvalidParameters(error) => write!(f, "invalid parameters: {error}"),
        }
    }
}

/// Tracks the last refused cycle request for diagnostics.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct CycleRejection {
    trigger: TriggerSource,
    reason: RejectionReason,
}

impl CycleRejection {
    const fn new(trigger: TriggerSource, reason: RejectionReason) -> Self {
        Self { trigger, reason }
    }

    /// Builds a BUSY rejection.
    #[must_use]
    pub const fn busy(trigger: TriggerSource) -> Self {
        Self::new(trigger, RejectionReason::Busy)
    }

    /// Builds a rejection caused by a lost backend link.
    #[must_use]
    pub const fn disconnected(trigger: TriggerSource) -> Self {
        Self::new(trigger, RejectionReason::Disconnected)
    }

    /// Builds a rejection caused by unusable parameters.
    #[must_use]
    pub const fn invalid_parameters(trigger: TriggerSource, error: ParameterError) -> Self {
        Self::new(trigger, RejectionReason::InvalidParameters(error))
    }

    #[must_use]
    pub const fn reason(&self) -> RejectionReason {
        self.reason
    }

    #[must_use]
    pub const fn trigger(&self) -> TriggerSource {
        self.trigger
    }
}

impl fmt::Display for CycleRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} trigger rejected: {}", self.trigger, self.reason)
    }
}

/// Errors reported when accessing the active run.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum ActiveRunError {
    /// No cycle is currently active.
    NoActiveRun,
}

impl fmt::Display for ActiveRunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("no cycle in progress")
    }
}

/// Runtime bookkeeping for the cycle in flight.
#[derive(Clone, Debug)]
pub struct CycleRun<I> {
    request: CycleRequest,
    trigger: TriggerSource,
    state: CycleState,
    started_at: I,
    deadline: Option<I>,
    confirmation: Option<PendingConfirmation<I>>,
    emitted_events: Vec<EventId, MAX_RUN_EVENTS>,
}

impl<I: Copy> CycleRun<I> {
    fn new(request: CycleRequest, trigger: TriggerSource, started_at: I) -> Self {
        Self {
            request,
            trigger,
            state: CycleState::Idle,
            started_at,
            deadline: None,
            confirmation: None,
            emitted_events: Vec::new(),
        }
    }

    /// Outstanding shot counter confirmation.
    #[must_use]
    pub const fn confirmation(&self) -> Option<&PendingConfirmation<I>> {
        self.confirmation.as_ref()
    }

    fn track_event(&mut self, event: EventId) -> bool {
        self.emitted_events.push(event).is_ok()
    }
}

/// Single-flight cycle state machine bound to a device channel.
pub struct CycleOrchestrator<C, I>
where
    C: DeviceChannel,
{
    channel: C,
    timing: CycleTiming,
    active_run: Option<CycleRun<I>>,
    status: StatusBoard<I>,
    last_rejection: Option<CycleRejection>,
    last_outcome: Option<CycleState>,
    completed_cycles: u32,
}

impl<C, I> CycleOrchestrator<C, I>
where
    C: DeviceChannel,
    I: CycleInstant,
{
    /// Creates an orchestrator with the default timing.
    pub fn new(channel: C) -> Self {
        Self::with_timing(channel, CycleTiming::default())
    }

    pub fn with_timing(channel: C, timing: CycleTiming) -> Self {
        Self {
            channel,
            timing,
            active_run: None,
            status: StatusBoard::new(),
            last_rejection: None,
            last_outcome: None,
            completed_cycles: 0,
        }
    }

    pub fn channel(&self) -> &C {
        &self.channel
    }

    pub fn channel_mut(&mut self) -> &mut C {
        &mut self.channel
    }

    pub const fn timing(&self) -> &CycleTiming {
        &self.timing
    }

    pub const fn status(&self) -> &StatusBoard<I> {
        &self.status
    }

    pub fn status_mut(&mut self) -> &mut StatusBoard<I> {
        &mut self.status
    }

    pub const fn active_run(&self) -> Option<&CycleRun<I>> {
        self.active_run.as_ref()
    }

    /// Returns `true` from trigger acceptance until the outcome is decided.
    pub const fn in_progress(&self) -> bool {
        self.active_run.is_some()
    }

    /// Whether the SEND control should currently accept presses.
    pub const fn trigger_enabled(&self) -> bool {
        !self.in_progress()
    }

    /// Current state; a finished cycle reports its outcome while it is held on screen.
    pub fn state(&self) -> CycleState {
        match self.active_run.as_ref() {
            Some(run) => run.state,
            None => self.status.held_outcome().unwrap_or(CycleState::Idle),
        }
    }

    pub const fn last_rejection(&self) -> Option<CycleRejection> {
        self.last_rejection
    }

    pub const fn last_outcome(&self) -> Option<CycleState> {
        self.last_outcome
    }

    /// Number of cycles that reached COMPLETE.
    pub const fn completed_cycles(&self) -> u32 {
        self.completed_cycles
    }

    /// Earliest instant at which [`Self::drive`] has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        let run = self.active_run.as_ref();
        let step = run.and_then(|run| run.deadline);
        let confirmation = run
            .and_then(|run| run.confirmation)
            .map(|pending| pending.deadline());

        [step, confirmation, self.status.next_deadline()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Starts a cycle if none is running, the link is up and the inputs are valid.
    ///
    /// On success the depth move is dispatched before returning.
    pub fn begin_cycle<const N: usize>(
        &mut self,
        trigger: TriggerSource,
        parameters: &ParameterStore,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> Result<(), CycleRejection> {
        let request = match self.admit(trigger, parameters) {
            Ok(request) => request,
            Err(rejection) => {
                telemetry.record(
                    TelemetryEventKind::CycleRejected(rejection.reason()),
                    TelemetryPayload::none(),
                    now,
                );
                self.last_rejection = Some(rejection);
                return Err(rejection);
            }
        };

        self.last_rejection = None;
        let mut run = CycleRun::new(request, trigger, now);
        let event = telemetry.record(
            TelemetryEventKind::CycleRequested(trigger),
            TelemetryPayload::none(),
            now,
        );
        let _ = run.track_event(event);
        self.active_run = Some(run);

        self.enter(CycleState::MovingToDepth, None, telemetry, now);
        self.drive(telemetry, now);
        Ok(())
    }

    /// Advances the active cycle and expires held status messages.
    pub fn drive<const N: usize>(&mut self, telemetry: &mut TelemetryRecorder<I, N>, now: I) {
        loop {
            if !self.advance_run(telemetry, now) {
                break;
            }
        }
        self.status.expire(now);
    }

    /// Routes a shot counter result.
    ///
    /// A successful result always updates the shot display. It resolves the
    /// cycle only while a confirmation is pending; late or unsolicited
    /// results return `None`.
    pub fn handle_shot_increment<const N: usize>(
        &mut self,
        result: &ShotIncrementResult,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> Option<ConfirmationOutcome> {
        if let Some(count) = result.shot_count.filter(|_| result.success) {
            self.status.set_shot_count(count);
        }

        let pending = self
            .active_run
            .as_mut()
            .filter(|run| run.state == CycleState::UpdatingShotCount)
            .and_then(|run| run.confirmation.take())?;

        let outcome = pending.resolve(result);
        self.conclude_confirmation(pending.requested_at(), &outcome, telemetry, now);
        Some(outcome)
    }

    /// Aborts the active cycle through the error path.
    pub fn cancel<const N: usize>(
        &mut self,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> Result<(), ActiveRunError> {
        if self.active_run.is_none() {
            return Err(ActiveRunError::NoActiveRun);
        }

        self.finish_run(CycleState::Error(CycleError::Cancelled), telemetry, now);
        Ok(())
    }

    fn admit(
        &self,
        trigger: TriggerSource,
        parameters: &ParameterStore,
    ) -> Result<CycleRequest, CycleRejection> {
        if self.active_run.is_some() {
            return Err(CycleRejection::busy(trigger));
        }

        if !self.channel.is_connected() {
            return Err(CycleRejection::disconnected(trigger));
        }

        parameters
            .cycle_request()
            .map_err(|error| CycleRejection::invalid_parameters(trigger, error))
    }

    fn advance_run<const N: usize>(
        &mut self,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> bool {
        let (state, deadline, confirmation, request) = match self.active_run.as_ref() {
            Some(run) => (run.state, run.deadline, run.confirmation, run.request),
            None => return false,
        };
        let deadline_reached = deadline.is_some_and(|deadline| now >= deadline);

        match state {
            CycleState::MovingToDepth => {
                if self.dispatch_step(request.depth_command(), telemetry, now) {
                    let settle = now + self.timing.settle();
                    self.enter(CycleState::Stabilizing, Some(settle), telemetry, now);
                }
                true
            }
            CycleState::Stabilizing => {
                if deadline_reached {
                    self.enter(CycleState::FiringRf, None, telemetry, now);
                }
                deadline_reached
            }
            CycleState::FiringRf => {
                if self.dispatch_step(request.rf_shot_command(), telemetry, now)
                    && self.dispatch_step(request.rf_dtr_high_command(), telemetry, now)
                {
                    let window = now + request.post_fire_wait();
                    self.enter(CycleState::WaitingRfComplete, Some(window), telemetry, now);
                }
                true
            }
            CycleState::WaitingRfComplete => {
                if deadline_reached {
                    self.enter(CycleState::ReturningHome, None, telemetry, now);
                }
                deadline_reached
            }
            CycleState::ReturningHome => match deadline {
                None => {
                    if self.dispatch_step(HOME_COMMAND, telemetry, now) {
                        let settle = now + self.timing.return_settle();
                        if let Some(run) = self.active_run.as_mut() {
                            run.deadline = Some(settle);
                        }
                    }
                    true
                }
                Some(_) if deadline_reached => {
                    self.enter(CycleState::UpdatingShotCount, None, telemetry, now);
                    true
                }
                Some(_) => false,
            },
            CycleState::UpdatingShotCount => match confirmation {
                None => {
                    self.request_confirmation(telemetry, now);
                    true
                }
                Some(pending) => match pending.expire(now) {
                    Ok(outcome) => {
                        if let Some(run) = self.active_run.as_mut() {
                            run.confirmation = None;
                        }
                        self.conclude_confirmation(
                            pending.requested_at(),
                            &outcome,
                            telemetry,
                            now,
                        );
                        true
                    }
                    Err(_) => false,
                },
            },
            CycleState::Idle | CycleState::Complete(_) | CycleState::Error(_) => false,
        }
    }

    fn request_confirmation<const N: usize>(
        &mut self,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) {
        let command = DeviceCommand::ShotIncrement;
        match self.channel.dispatch(command) {
            Ok(()) => {
                let event = telemetry.record_dispatch(command, now);
                let timeout = self.timing.confirmation_timeout();
                if let Some(run) = self.active_run.as_mut() {
                    let _ = run.track_event(event);
                    run.confirmation = Some(PendingConfirmation::new(now, timeout));
                }
            }
            Err(error) => {
                let reason = error.reason();
                let event = telemetry.record_dispatch_failure(command, reason, now);
                self.track_event(event);
                let outcome =
                    ConfirmationOutcome::Failed(ConfirmationFailure::NotDispatched(reason));
                self.conclude_confirmation(now, &outcome, telemetry, now);
            }
        }
    }

    fn conclude_confirmation<const N: usize>(
        &mut self,
        requested_at: I,
        outcome: &ConfirmationOutcome,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) {
        let (failure, shot_count, result) = match outcome {
            ConfirmationOutcome::Confirmed { shot_count } => (
                None,
                *shot_count,
                CycleOutcome::Confirmed {
                    shot_count: *shot_count,
                },
            ),
            ConfirmationOutcome::Failed(failure) => (
                Some(failure.kind()),
                None,
                CycleOutcome::Unconfirmed(failure.kind()),
            ),
        };

        let event = telemetry.record_shot_count(failure, shot_count, requested_at, now);
        self.track_event(event);
        self.finish_run(CycleState::Complete(result), telemetry, now);
    }

    fn dispatch_step<const N: usize>(
        &mut self,
        command: DeviceCommand,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) -> bool {
        match self.channel.dispatch(command) {
            Ok(()) => {
                let event = telemetry.record_dispatch(command, now);
                self.track_event(event);
                true
            }
            Err(error) => {
                let reason = error.reason();
                let event = telemetry.record_dispatch_failure(command, reason, now);
                self.track_event(event);
                let error = CycleError::DispatchFailed {
                    command: command.kind(),
                    reason,
                };
                self.finish_run(CycleState::Error(error), telemetry, now);
                false
            }
        }
    }

    fn enter<const N: usize>(
        &mut self,
        next: CycleState,
        deadline: Option<I>,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) {
        let Some(run) = self.active_run.as_mut() else {
            return;
        };

        run.state = next;
        run.deadline = deadline;
        let event = telemetry.record(
            TelemetryEventKind::PhaseEntered(next),
            TelemetryPayload::none(),
            now,
        );
        let _ = run.track_event(event);
        self.status.show_phase(next);
    }

    fn finish_run<const N: usize>(
        &mut self,
        outcome: CycleState,
        telemetry: &mut TelemetryRecorder<I, N>,
        now: I,
    ) {
        let Some(run) = self.active_run.take() else {
            return;
        };

        telemetry.record_cycle_completion(
            outcome,
            run.trigger,
            Some(run.started_at),
            now,
            run.emitted_events.len(),
        );

        let hold = match outcome {
            CycleState::Error(_) => self.timing.error_hold(),
            _ => self.timing.complete_hold(),
        };
        self.status.show_outcome(outcome, now + hold);
        self.last_outcome = Some(outcome);
        if matches!(outcome, CycleState::Complete(_)) {
            self.completed_cycles = self.completed_cycles.saturating_add(1);
        }
    }

    fn track_event(&mut self, event: EventId) {
        if let Some(run) = self.active_run.as_mut() {
            let _ = run.track_event(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::Unit;

    #[test]
    fn defaults_produce_reference_request() {
        let request = CycleRequest::from_parameters(&ParameterStore::new()).expect("valid");
        assert_eq!(request.motor_position, 200);
        assert_eq!(request.intensity, 50);
        assert_eq!(request.rf_time_ms, 1_000);
        assert_eq!(request.delay_ms, 100);
        assert_eq!(request.post_fire_wait(), Duration::from_millis(1_100));
        assert_eq!(request.depth_command(), DeviceCommand::move_to(200));
    }

    #[test]
    fn non_positive_inputs_are_rejected_in_order() {
        let depth = Quantity::from_raw(20, Unit::Millimeters);
        assert_eq!(
            CycleRequest::new(Quantity::from_raw(0, Unit::Millimeters), 0, 0, 0),
            Err(ParameterError::NotPositive(ParameterId::Depth))
        );
        assert_eq!(
            CycleRequest::new(depth, 0, 1_000, 0),
            Err(ParameterError::NotPositive(ParameterId::Intensity))
        );
        assert_eq!(
            CycleRequest::new(depth, 50, -10, 0),
            Err(ParameterError::NotPositive(ParameterId::Rf))
        );
        assert_eq!(
            CycleRequest::new(depth, 70_000, 1_000, 0),
            Err(ParameterError::OutOfRange(ParameterId::Intensity))
        );
    }

    #[test]
    fn negative_delay_shortens_wait_without_underflow() {
        let depth = Quantity::from_raw(5, Unit::Millimeters);
        let request = CycleRequest::new(depth, 10, 100, -40).expect("valid");
        assert_eq!(request.motor_position, 50);
        assert_eq!(request.post_fire_wait(), Duration::from_millis(60));

        let request = CycleRequest::new(depth, 10, 100, -500).expect("valid");
        assert_eq!(request.post_fire_wait(), Duration::ZERO);
    }

    #[test]
    fn missing_inputs_surface_parameter_id() {
        let mut store = ParameterStore::new();
        store.remove(ParameterId::DelayTime);
        assert_eq!(
            CycleRequest::from_parameters(&store),
            Err(ParameterError::Missing(ParameterId::DelayTime))
        );
    }

    #[test]
    fn state_predicates() {
        assert!(!CycleState::Idle.is_active());
        assert!(CycleState::UpdatingShotCount.is_active());
        let done = CycleState::Complete(CycleOutcome::Confirmed { shot_count: None });
        assert!(done.is_terminal());
        assert!(!done.is_active());
        assert!(CycleState::Error(CycleError::Cancelled).is_terminal());
        assert_eq!(done.status_text(), Some("Cycle complete"));
        assert_eq!(CycleState::Idle.status_text(), None);
    }
}
