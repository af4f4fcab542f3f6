//! Ready-screen session.
//!
//! [`TreatmentSession`] owns everything the ready screen needs for its
//! lifetime: the parameter store, the cycle orchestrator bound to the device
//! channel, foot-switch filtering and the telemetry ring. Backend events are
//! routed through [`TreatmentSession::handle_event`]; time advances through
//! [`TreatmentSession::poll`].

use crate::channel::{
    ConfirmationOutcome, DeviceChannel, DeviceCommand, DeviceEvent, DispatchError, EepromQuery,
    ErrorText,
};
use crate::cycle::{
    ActiveRunError, CycleInstant, CycleOrchestrator, CycleRejection, CycleState, CycleTiming,
};
use crate::params::{ParameterError, ParameterStore};
use crate::status::StatusSnapshot;
use crate::telemetry::{
    TELEMETRY_RING_CAPACITY, TelemetryEventKind, TelemetryPayload, TelemetryRecorder,
    TipTelemetry,
};
use crate::trigger::{FootSwitchEdge, FootSwitchGate, TriggerSource};

/// Result of routing one backend event.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum EventEffect {
    /// Display state was refreshed.
    Updated,
    /// A foot-switch press started a cycle.
    CycleStarted(TriggerSource),
    /// A foot-switch press was refused.
    CycleRejected(CycleRejection),
    /// Press ignored as contact bounce.
    FootSwitchBounced,
    /// Release; informational only.
    FootSwitchReleased,
    /// The pending shot counter confirmation was resolved.
    ShotCountResolved(ConfirmationOutcome),
    /// Shot counter result with no cycle waiting for it.
    ShotCountReported,
    /// Tip memory contents were applied.
    TipHydrated {
        tip_type: Option<u8>,
        shot_count: Option<u32>,
    },
    /// Tip memory read reported failure.
    TipReadFailed(Option<ErrorText>),
    /// Tip memory contents could not be stored.
    TipRejected(ParameterError),
    /// Backend reported an error message.
    ServerError,
}

/// Ready-screen state for one connection lifetime.
pub struct TreatmentSession<C, I, const N: usize = TELEMETRY_RING_CAPACITY>
where
    C: DeviceChannel,
    I: CycleInstant,
{
    parameters: ParameterStore,
    orchestrator: CycleOrchestrator<C, I>,
    foot_switch: FootSwitchGate<I>,
    telemetry: TelemetryRecorder<I, N>,
    tip_read_at: Option<I>,
}

impl<C, I, const N: usize> TreatmentSession<C, I, N>
where
    C: DeviceChannel,
    I: CycleInstant,
{
    /// Creates a session with default parameters and timing.
    pub fn new(channel: C) -> Self {
        Self::with_timing(channel, CycleTiming::default())
    }

    pub fn with_timing(channel: C, timing: CycleTiming) -> Self {
        let mut orchestrator = CycleOrchestrator::with_timing(channel, timing);
        let connected = orchestrator.channel().is_connected();
        orchestrator.status_mut().set_link(connected);

        Self {
            parameters: ParameterStore::new(),
            orchestrator,
            foot_switch: FootSwitchGate::new(timing.foot_switch_debounce()),
            telemetry: TelemetryRecorder::new(),
            tip_read_at: None,
        }
    }

    pub const fn parameters(&self) -> &ParameterStore {
        &self.parameters
    }

    pub fn parameters_mut(&mut self) -> &mut ParameterStore {
        &mut self.parameters
    }

    pub const fn orchestrator(&self) -> &CycleOrchestrator<C, I> {
        &self.orchestrator
    }

    pub fn channel(&self) -> &C {
        self.orchestrator.channel()
    }

    pub fn channel_mut(&mut self) -> &mut C {
        self.orchestrator.channel_mut()
    }

    pub const fn telemetry(&self) -> &TelemetryRecorder<I, N> {
        &self.telemetry
    }

    /// Current cycle state.
    pub fn state(&self) -> CycleState {
        self.orchestrator.state()
    }

    /// Captures the ready screen.
    pub fn snapshot(&self) -> StatusSnapshot {
        let tip = self.parameters.tip_type().unwrap_or_default();
        self.orchestrator
            .status()
            .snapshot(tip, self.orchestrator.trigger_enabled())
    }

    /// Handles the on-screen SEND control.
    pub fn trigger_manual(&mut self, now: I) -> Result<(), CycleRejection> {
        self.orchestrator
            .begin_cycle(TriggerSource::Manual, &self.parameters, &mut self.telemetry, now)
    }

    /// Aborts the running cycle.
    pub fn cancel(&mut self, now: I) -> Result<(), ActiveRunError> {
        self.orchestrator.cancel(&mut self.telemetry, now)
    }

    /// Schedules a tip memory read for `at`; it is skipped if the link is down then.
    pub fn schedule_tip_read(&mut self, at: I) {
        self.tip_read_at = Some(at);
    }

    /// Issues a tip memory read immediately.
    pub fn request_tip_read(&mut self) -> Result<(), DispatchError<C::Error>> {
        self.tip_read_at = None;
        self.orchestrator
            .channel_mut()
            .dispatch(DeviceCommand::EepromRead(EepromQuery::default()))
    }

    /// Earliest instant at which [`Self::poll`] has work to do.
    pub fn next_wakeup(&self) -> Option<I> {
        [self.orchestrator.next_deadline(), self.tip_read_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// Advances timed work up to `now`.
    ///
    /// Returns the dispatch error of a scheduled tip read, if one was due and failed.
    pub fn poll(&mut self, now: I) -> Result<(), DispatchError<C::Error>> {
        self.orchestrator.drive(&mut self.telemetry, now);

        match self.tip_read_at {
            Some(at) if now >= at => {
                self.tip_read_at = None;
                if self.orchestrator.channel().is_connected() {
                    self.request_tip_read()
                } else {
                    Ok(())
                }
            }
            _ => Ok(()),
        }
    }

    /// Routes one backend event.
    pub fn handle_event(&mut self, event: DeviceEvent, now: I) -> EventEffect {
        match event {
            DeviceEvent::Connected => {
                self.orchestrator.status_mut().set_link(true);
                self.record(TelemetryEventKind::LinkConnected, now);
                EventEffect::Updated
            }
            DeviceEvent::Disconnected => {
                self.orchestrator.status_mut().set_link(false);
                self.record(TelemetryEventKind::LinkDisconnected, now);
                EventEffect::Updated
            }
            DeviceEvent::MotorStatus(status) => {
                self.orchestrator.status_mut().set_motor(status);
                EventEffect::Updated
            }
            DeviceEvent::FootSwitch { pressed } => self.handle_foot_switch(pressed, now),
            DeviceEvent::ShotIncrement(result) => {
                match self
                    .orchestrator
                    .handle_shot_increment(&result, &mut self.telemetry, now)
                {
                    Some(outcome) => EventEffect::ShotCountResolved(outcome),
                    None => EventEffect::ShotCountReported,
                }
            }
            DeviceEvent::EepromRead(result) => {
                if !result.success {
                    return EventEffect::TipReadFailed(result.error);
                }

                let stored = result
                    .tip_type
                    .map(|code| self.parameters.set_tip_type(code));
                if let Some(Err(error)) = stored {
                    return EventEffect::TipRejected(error);
                }
                if let Some(count) = result.shot_count {
                    self.orchestrator.status_mut().set_shot_count(count);
                }

                self.telemetry.record(
                    TelemetryEventKind::TipHydrated,
                    TelemetryPayload::Tip(TipTelemetry {
                        tip_type: result.tip_type,
                        shot_count: result.shot_count,
                    }),
                    now,
                );
                EventEffect::TipHydrated {
                    tip_type: result.tip_type,
                    shot_count: result.shot_count,
                }
            }
            DeviceEvent::ServerError(message) => {
                self.orchestrator.status_mut().set_server_error(message);
                self.record(TelemetryEventKind::ServerError, now);
                EventEffect::ServerError
            }
        }
    }

    fn handle_foot_switch(&mut self, pressed: bool, now: I) -> EventEffect {
        self.record(TelemetryEventKind::FootSwitch { pressed }, now);
        let clear_at = now + self.orchestrator.timing().foot_switch_hold();

        match self.foot_switch.on_edge(pressed, now) {
            FootSwitchEdge::Released => {
                self.orchestrator
                    .status_mut()
                    .reschedule_foot_switch(clear_at);
                EventEffect::FootSwitchReleased
            }
            FootSwitchEdge::Bounced => {
                self.record(TelemetryEventKind::FootSwitchBounced, now);
                EventEffect::FootSwitchBounced
            }
            FootSwitchEdge::Pressed => {
                self.orchestrator.status_mut().show_foot_switch(clear_at);
                match self.orchestrator.begin_cycle(
                    TriggerSource::FootSwitch,
                    &self.parameters,
                    &mut self.telemetry,
                    now,
                ) {
                    Ok(()) => EventEffect::CycleStarted(TriggerSource::FootSwitch),
                    Err(rejection) => EventEffect::CycleRejected(rejection),
                }
            }
        }
    }

    fn record(&mut self, event: TelemetryEventKind, now: I) {
        self.telemetry.record(event, TelemetryPayload::none(), now);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::{ops::Add, time::Duration};

    use heapless::Vec;

    use crate::channel::{EepromReadResult, ShotIncrementResult};
    use crate::cycle::RejectionReason;
    use crate::telemetry::TelemetryInstant;

    #[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
    struct MockInstant(u64);

    impl Add<Duration> for MockInstant {
        type Output = Self;

        fn add(self, rhs: Duration) -> Self::Output {
            Self(self.0 + u64::try_from(rhs.as_millis()).expect("duration fits"))
        }
    }

    impl TelemetryInstant for MockInstant {
        fn saturating_duration_since(&self, earlier: Self) -> Duration {
            Duration::from_millis(self.0.saturating_sub(earlier.0))
        }
    }

    #[derive(Default)]
    struct RecordingChannel {
        offline: bool,
        commands: Vec<DeviceCommand, 32>,
    }

    impl DeviceChannel for RecordingChannel {
        type Error = ();

        fn dispatch(&mut self, command: DeviceCommand) -> Result<(), DispatchError<Self::Error>> {
            if self.offline {
                return Err(DispatchError::Disconnected);
            }
            self.commands
                .push(command)
                .map_err(|_| DispatchError::QueueFull)
        }

        fn is_connected(&self) -> bool {
            !self.offline
        }
    }

    type Session = TreatmentSession<RecordingChannel, MockInstant, 64>;

    #[test]
    fn foot_switch_press_starts_cycle_and_shows_indicator() {
        let mut session = Session::new(RecordingChannel::default());

        let effect = session.handle_event(
            DeviceEvent::FootSwitch { pressed: true },
            MockInstant(0),
        );
        assert_eq!(effect, EventEffect::CycleStarted(TriggerSource::FootSwitch));
        assert_eq!(session.state(), CycleState::Stabilizing);
        assert!(session.snapshot().foot_switch_active);
        assert_eq!(session.channel().commands.as_slice(), &[DeviceCommand::move_to(200)]);

        session.poll(MockInstant(999)).expect("poll");
        assert!(session.snapshot().foot_switch_active);
        session.poll(MockInstant(1_000)).expect("poll");
        assert!(!session.snapshot().foot_switch_active);
    }

    #[test]
    fn foot_switch_while_disconnected_only_warns() {
        let channel = RecordingChannel {
            offline: true,
            ..RecordingChannel::default()
        };
        let mut session = Session::new(channel);

        let effect = session.handle_event(
            DeviceEvent::FootSwitch { pressed: true },
            MockInstant(0),
        );
        match effect {
            EventEffect::CycleRejected(rejection) => {
                assert_eq!(rejection.reason(), RejectionReason::Disconnected);
                assert_eq!(rejection.trigger(), TriggerSource::FootSwitch);
            }
            other => panic!("expected rejection, got {other:?}"),
        }
        assert!(session.channel().commands.is_empty());
        assert_eq!(session.state(), CycleState::Idle);
    }

    #[test]
    fn release_never_starts_or_stops_a_cycle() {
        let mut session = Session::new(RecordingChannel::default());
        let effect = session.handle_event(
            DeviceEvent::FootSwitch { pressed: false },
            MockInstant(0),
        );
        assert_eq!(effect, EventEffect::FootSwitchReleased);
        assert_eq!(session.state(), CycleState::Idle);

        session.trigger_manual(MockInstant(10)).expect("cycle starts");
        session.handle_event(DeviceEvent::FootSwitch { pressed: false }, MockInstant(400));
        assert_eq!(session.state(), CycleState::Stabilizing);
    }

    #[test]
    fn bounced_press_is_ignored() {
        let mut session = Session::new(RecordingChannel::default());
        session.handle_event(DeviceEvent::FootSwitch { pressed: true }, MockInstant(0));
        session.handle_event(DeviceEvent::FootSwitch { pressed: false }, MockInstant(40));
        let effect = session.handle_event(
            DeviceEvent::FootSwitch { pressed: true },
            MockInstant(80),
        );
        assert_eq!(effect, EventEffect::FootSwitchBounced);
        assert_eq!(session.channel().commands.len(), 1);
    }

    #[test]
    fn tip_memory_hydrates_type_and_count() {
        let mut session = Session::new(RecordingChannel::default());
        session.schedule_tip_read(MockInstant(2_000));
        assert_eq!(session.next_wakeup(), Some(MockInstant(2_000)));

        session.poll(MockInstant(1_999)).expect("poll");
        assert!(session.channel().commands.is_empty());
        session.poll(MockInstant(2_000)).expect("poll");
        assert_eq!(
            session.channel().commands.as_slice(),
            &[DeviceCommand::EepromRead(EepromQuery::default())]
        );
        assert_eq!(session.next_wakeup(), None);

        let effect = session.handle_event(
            DeviceEvent::EepromRead(EepromReadResult::read(25, 340)),
            MockInstant(2_100),
        );
        assert_eq!(
            effect,
            EventEffect::TipHydrated {
                tip_type: Some(25),
                shot_count: Some(340),
            }
        );
        let snapshot = session.snapshot();
        assert_eq!(snapshot.tip_type.as_str(), "25PIN");
        assert_eq!(snapshot.shot_count, Some(340));
    }

    #[test]
    fn failed_tip_read_leaves_defaults() {
        let mut session = Session::new(RecordingChannel::default());
        let effect = session.handle_event(
            DeviceEvent::EepromRead(EepromReadResult::failed("no tip")),
            MockInstant(0),
        );
        assert!(matches!(effect, EventEffect::TipReadFailed(Some(_))));
        assert_eq!(session.parameters().tip_type(), Some("NONE"));
    }

    #[test]
    fn unsolicited_shot_count_updates_display_only() {
        let mut session = Session::new(RecordingChannel::default());
        let effect = session.handle_event(
            DeviceEvent::ShotIncrement(ShotIncrementResult::confirmed(77)),
            MockInstant(0),
        );
        assert_eq!(effect, EventEffect::ShotCountReported);
        assert_eq!(session.snapshot().shot_count, Some(77));
        assert_eq!(session.state(), CycleState::Idle);
    }

    #[test]
    fn link_events_track_connectivity() {
        let mut session = Session::new(RecordingChannel::default());
        assert!(session.snapshot().link_connected);

        session.handle_event(DeviceEvent::Disconnected, MockInstant(0));
        assert!(!session.snapshot().link_connected);
        assert_eq!(
            session.telemetry().latest().map(|record| record.event),
            Some(TelemetryEventKind::LinkDisconnected)
        );
    }
}
