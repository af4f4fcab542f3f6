use core::ops::Add;
use core::time::Duration;

use treatment_core::channel::{
    CommandKind, ConfirmationFailure, ConfirmationFailureKind, ConfirmationOutcome,
    DeviceChannel, DeviceCommand, DeviceEvent, DispatchError, DispatchFailure, EepromReadResult,
    ShotIncrementResult,
};
use treatment_core::cycle::{CycleOutcome, CycleState};
use treatment_core::session::{EventEffect, TreatmentSession};
use treatment_core::telemetry::{TelemetryEventKind, TelemetryInstant, TelemetryPayload};

#[test]
fn missing_confirmation_completes_at_timeout() {
    let mut session = build_session(RecordingChannel::default());
    hydrate(&mut session, 340);
    run_to_confirmation(&mut session);

    session.poll(MockInstant(7_599)).expect("poll");
    assert_eq!(session.state(), CycleState::UpdatingShotCount);
    assert!(session.orchestrator().in_progress());

    session.poll(MockInstant(7_600)).expect("poll");
    assert_eq!(
        session.state(),
        CycleState::Complete(CycleOutcome::Unconfirmed(ConfirmationFailureKind::TimedOut))
    );
    assert!(!session.orchestrator().in_progress());
    assert_eq!(
        session.snapshot().shot_count,
        Some(340),
        "shot display must not change without a confirmation"
    );

    let record = session
        .telemetry()
        .oldest_first()
        .find(|record| {
            matches!(
                record.event,
                TelemetryEventKind::ShotCountUnconfirmed(ConfirmationFailureKind::TimedOut)
            )
        })
        .copied()
        .expect("timeout recorded");
    match record.details {
        TelemetryPayload::ShotCount(details) => {
            assert_eq!(details.waited, Duration::from_millis(5_000));
        }
        other => panic!("expected shot count payload, got {other:?}"),
    }
}

#[test]
fn negative_result_still_completes() {
    let mut session = build_session(RecordingChannel::default());
    hydrate(&mut session, 340);
    run_to_confirmation(&mut session);

    let effect = session.handle_event(
        DeviceEvent::ShotIncrement(ShotIncrementResult::rejected("tip memory locked")),
        MockInstant(3_000),
    );
    match effect {
        EventEffect::ShotCountResolved(ConfirmationOutcome::Failed(
            ConfirmationFailure::Rejected(Some(error)),
        )) => assert_eq!(error.as_str(), "tip memory locked"),
        other => panic!("expected rejected confirmation, got {other:?}"),
    }

    assert_eq!(
        session.state(),
        CycleState::Complete(CycleOutcome::Unconfirmed(ConfirmationFailureKind::Rejected))
    );
    assert_eq!(session.snapshot().shot_count, Some(340));
    assert_eq!(
        session.next_wakeup(),
        Some(MockInstant(5_000)),
        "only the completion hold remains"
    );
}

#[test]
fn late_result_updates_display_without_reopening_cycle() {
    let mut session = build_session(RecordingChannel::default());
    run_to_confirmation(&mut session);
    session.poll(MockInstant(7_600)).expect("poll");
    let timed_out =
        CycleState::Complete(CycleOutcome::Unconfirmed(ConfirmationFailureKind::TimedOut));
    assert_eq!(session.state(), timed_out);

    let effect = session.handle_event(
        DeviceEvent::ShotIncrement(ShotIncrementResult::confirmed(341)),
        MockInstant(8_000),
    );
    assert_eq!(effect, EventEffect::ShotCountReported);
    assert_eq!(session.state(), timed_out);
    assert_eq!(session.snapshot().shot_count, Some(341));
}

#[test]
fn early_result_does_not_resolve_before_request() {
    let mut session = build_session(RecordingChannel::default());
    session.trigger_manual(MockInstant(0)).expect("cycle starts");

    let effect = session.handle_event(
        DeviceEvent::ShotIncrement(ShotIncrementResult::confirmed(9)),
        MockInstant(100),
    );
    assert_eq!(effect, EventEffect::ShotCountReported);
    assert_eq!(session.state(), CycleState::Stabilizing);
}

#[test]
fn refused_increment_completes_unconfirmed() {
    let channel = RecordingChannel {
        fail_on: Some(CommandKind::ShotIncrement),
        ..RecordingChannel::default()
    };
    let mut session = build_session(channel);
    session.trigger_manual(MockInstant(0)).expect("cycle starts");
    for at in [1_000, 2_100, 2_600] {
        session.poll(MockInstant(at)).expect("poll");
    }

    assert_eq!(
        session.state(),
        CycleState::Complete(CycleOutcome::Unconfirmed(
            ConfirmationFailureKind::NotDispatched
        ))
    );
    assert_eq!(session.channel().commands.len(), 4);
    assert_eq!(session.next_wakeup(), Some(MockInstant(4_600)));

    let refused_event = TelemetryEventKind::DispatchFailed(CommandKind::ShotIncrement);
    let refused = session
        .telemetry()
        .oldest_first()
        .find(|record| record.event == refused_event)
        .expect("refused increment is recorded");
    assert!(matches!(
        refused.details,
        TelemetryPayload::Command(details) if details.failure == Some(DispatchFailure::QueueFull)
    ));

    let unconfirmed =
        TelemetryEventKind::ShotCountUnconfirmed(ConfirmationFailureKind::NotDispatched);
    assert!(
        session
            .telemetry()
            .oldest_first()
            .any(|record| record.event == unconfirmed)
    );
}

#[test]
fn every_cycle_drops_its_pending_confirmation() {
    let mut session = build_session(RecordingChannel::default());
    run_to_confirmation(&mut session);
    assert!(
        session
            .orchestrator()
            .active_run()
            .and_then(|run| run.confirmation())
            .is_some()
    );

    session.cancel(MockInstant(2_700)).expect("cancel");
    assert!(session.orchestrator().active_run().is_none());

    let effect = session.handle_event(
        DeviceEvent::ShotIncrement(ShotIncrementResult::confirmed(5)),
        MockInstant(2_800),
    );
    assert_eq!(effect, EventEffect::ShotCountReported);
    assert_eq!(session.next_wakeup(), Some(MockInstant(5_700)));
}

fn hydrate(session: &mut Session, shots: u32) {
    session.handle_event(
        DeviceEvent::EepromRead(EepromReadResult::read(16, shots)),
        MockInstant(0),
    );
}

fn run_to_confirmation(session: &mut Session) {
    session.trigger_manual(MockInstant(0)).expect("cycle starts");
    for at in [1_000, 2_100, 2_600] {
        session.poll(MockInstant(at)).expect("poll");
    }
    assert_eq!(session.state(), CycleState::UpdatingShotCount);
    assert_eq!(
        session.channel().commands.last(),
        Some(&DeviceCommand::ShotIncrement)
    );
}

type Session = TreatmentSession<RecordingChannel, MockInstant, 64>;

fn build_session(channel: RecordingChannel) -> Session {
    TreatmentSession::new(channel)
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord)]
struct MockInstant(u64);

impl Add<Duration> for MockInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self::Output {
        Self(self.0 + u64::try_from(rhs.as_millis()).expect("duration fits in u64"))
    }
}

impl TelemetryInstant for MockInstant {
    fn saturating_duration_since(&self, earlier: Self) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }
}

#[derive(Default)]
struct RecordingChannel {
    fail_on: Option<CommandKind>,
    commands: Vec<DeviceCommand>,
}

impl DeviceChannel for RecordingChannel {
    type Error = ();

    fn dispatch(&mut self, command: DeviceCommand) -> Result<(), DispatchError<Self::Error>> {
        if self.fail_on == Some(command.kind()) {
            return Err(DispatchError::QueueFull);
        }
        self.commands.push(command);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}
