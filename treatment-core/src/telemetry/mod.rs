//! Telemetry event catalog and ring buffer shared by embedded and host targets.
//!
//! Every decision the orchestrator takes (phase changes, dispatches, rejected
//! triggers, confirmation results) is recorded here instead of being logged
//! directly, so hosts decide how to surface it. Records are kept in a bounded
//! `heapless` ring and remain `no_std` compatible.

use core::{convert::TryFrom, fmt, time::Duration};

use heapless::{HistoryBuf, OldestOrdered};

use crate::channel::confirmation::ConfirmationFailureKind;
use crate::channel::{CommandKind, DeviceCommand, DispatchFailure};
use crate::cycle::{CycleError, CycleState, RejectionReason};
use crate::trigger::TriggerSource;

/// Identifier used when tracking emitted telemetry events.
pub type EventId = u32;

/// Discriminated telemetry events.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TelemetryEventKind {
    CycleRequested(TriggerSource),
    CycleRejected(RejectionReason),
    PhaseEntered(CycleState),
    CommandDispatched(CommandKind),
    DispatchFailed(CommandKind),
    ShotCountConfirmed,
    ShotCountUnconfirmed(ConfirmationFailureKind),
    CycleComplete,
    CycleFailed(CycleError),
    FootSwitch { pressed: bool },
    FootSwitchBounced,
    LinkConnected,
    LinkDisconnected,
    TipHydrated,
    ServerError,
}

impl fmt::Display for TelemetryEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TelemetryEventKind::CycleRequested(source) => write!(f, "cycle-requested {source}"),
            TelemetryEventKind::CycleRejected(reason) => write!(f, "cycle-rejected {reason}"),
            TelemetryEventKind::PhaseEntered(state) => write!(f, "phase {}", state.label()),
            TelemetryEventKind::CommandDispatched(kind) => write!(f, "dispatched {kind}"),
            TelemetryEventKind::DispatchFailed(kind) => write!(f, "dispatch-failed {kind}"),
            TelemetryEventKind::ShotCountConfirmed => f.write_str("shot-count-confirmed"),
            TelemetryEventKind::ShotCountUnconfirmed(kind) => {
                write!(f, "shot-count-unconfirmed {kind:?}")
            }
            TelemetryEventKind::CycleComplete => f.write_str("cycle-complete"),
            TelemetryEventKind::CycleFailed(error) => write!(f, "cycle-failed {error}"),
            TelemetryEventKind::FootSwitch { pressed: true } => f.write_str("foot-switch pressed"),
            TelemetryEventKind::FootSwitch { pressed: false } => {
                f.write_str("foot-switch released")
            }
            TelemetryEventKind::FootSwitchBounced => f.write_str("foot-switch bounced"),
            TelemetryEventKind::LinkConnected => f.write_str("link-connected"),
            TelemetryEventKind::LinkDisconnected => f.write_str("link-disconnected"),
            TelemetryEventKind::TipHydrated => f.write_str("tip-hydrated"),
            TelemetryEventKind::ServerError => f.write_str("server-error"),
        }
    }
}

/// Payloads carried alongside telemetry events.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum TelemetryPayload {
    /// No additional metadata accompanies the event.
    None,
    /// Command that was dispatched or refused.
    Command(CommandTelemetry),
    /// Summary of a finished cycle.
    Cycle(CycleTelemetry),
    /// Result of the shot counter confirmation wait.
    ShotCount(ShotCountTelemetry),
    /// Tip memory contents applied to the session.
    Tip(TipTelemetry),
}

impl TelemetryPayload {
    /// Convenience constructor when no payload data is needed.
    #[must_use]
    pub const fn none() -> Self {
        TelemetryPayload::None
    }
}

/// Command payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CommandTelemetry {
    pub command: DeviceCommand,
    pub failure: Option<DispatchFailure>,
}

impl CommandTelemetry {
    #[must_use]
    pub const fn new(command: DeviceCommand, failure: Option<DispatchFailure>) -> Self {
        Self { command, failure }
    }
}

/// Cycle completion summary payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct CycleTelemetry {
    pub outcome: CycleState,
    pub trigger: TriggerSource,
    pub duration: Option<Duration>,
    pub events_recorded: u8,
}

impl CycleTelemetry {
    #[must_use]
    pub const fn new(
        outcome: CycleState,
        trigger: TriggerSource,
        duration: Option<Duration>,
        events_recorded: u8,
    ) -> Self {
        Self {
            outcome,
            trigger,
            duration,
            events_recorded,
        }
    }
}

/// Shot counter confirmation payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ShotCountTelemetry {
    pub shot_count: Option<u32>,
    pub waited: Duration,
}

/// Tip memory payload.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TipTelemetry {
    pub tip_type: Option<u8>,
    pub shot_count: Option<u32>,
}

/// Total number of telemetry entries retained in memory.
pub const TELEMETRY_RING_CAPACITY: usize = 128;

/// Trait implemented by monotonic instant wrappers used for telemetry tracking.
pub trait TelemetryInstant: Copy {
    /// Returns the saturating duration from `earlier` to `self`.
    fn saturating_duration_since(&self, earlier: Self) -> Duration;
}

/// Telemetry record stored in the ring buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct TelemetryRecord<TInstant>
where
    TInstant: Copy,
{
    pub id: EventId,
    pub timestamp: TInstant,
    pub event: TelemetryEventKind,
    pub details: TelemetryPayload,
}

/// Telemetry ring buffer type alias.
pub type TelemetryRing<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY> =
    HistoryBuf<TelemetryRecord<TInstant>, CAPACITY>;

/// Records telemetry events into a fixed-size ring buffer.
pub struct TelemetryRecorder<TInstant, const CAPACITY: usize = TELEMETRY_RING_CAPACITY>
where
    TInstant: Copy,
{
    ring: TelemetryRing<TInstant, CAPACITY>,
    next_event_id: EventId,
}

impl<TInstant, const CAPACITY: usize> TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    /// Creates a new telemetry recorder with an empty history.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_event_id: 0,
        }
    }

    /// Returns an iterator over the recorded telemetry in chronological order.
    pub fn oldest_first(&self) -> OldestOrdered<'_, TelemetryRecord<TInstant>> {
        self.ring.oldest_ordered()
    }

    /// Returns records newer than `last_seen`, oldest first.
    pub fn since(
        &self,
        last_seen: Option<EventId>,
    ) -> impl Iterator<Item = &TelemetryRecord<TInstant>> + '_ {
        self.oldest_first()
            .filter(move |record| last_seen.is_none_or(|seen| record.id > seen))
    }

    /// Returns the most recent telemetry record, if available.
    pub fn latest(&self) -> Option<&TelemetryRecord<TInstant>> {
        self.ring.recent()
    }

    /// Returns the number of records currently stored.
    pub fn len(&self) -> usize {
        self.ring.len()
    }

    /// Returns `true` when no telemetry records are stored.
    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Records an arbitrary telemetry event with the supplied payload.
    pub fn record(
        &mut self,
        event: TelemetryEventKind,
        payload: TelemetryPayload,
        timestamp: TInstant,
    ) -> EventId {
        let id = self.next_event_id;
        self.next_event_id = self.next_event_id.wrapping_add(1);

        self.ring.write(TelemetryRecord {
            id,
            timestamp,
            event,
            details: payload,
        });

        id
    }

    /// Records a command accepted by the channel.
    pub fn record_dispatch(&mut self, command: DeviceCommand, timestamp: TInstant) -> EventId {
        self.record(
            TelemetryEventKind::CommandDispatched(command.kind()),
            TelemetryPayload::Command(CommandTelemetry::new(command, None)),
            timestamp,
        )
    }

    /// Records a command refused by the channel.
    pub fn record_dispatch_failure(
        &mut self,
        command: DeviceCommand,
        failure: DispatchFailure,
        timestamp: TInstant,
    ) -> EventId {
        self.record(
            TelemetryEventKind::DispatchFailed(command.kind()),
            TelemetryPayload::Command(CommandTelemetry::new(command, Some(failure))),
            timestamp,
        )
    }

    /// Records the end of a confirmation wait.
    pub fn record_shot_count(
        &mut self,
        failure: Option<ConfirmationFailureKind>,
        shot_count: Option<u32>,
        requested_at: TInstant,
        timestamp: TInstant,
    ) -> EventId {
        let event = match failure {
            None => TelemetryEventKind::ShotCountConfirmed,
            Some(kind) => TelemetryEventKind::ShotCountUnconfirmed(kind),
        };
        let payload = TelemetryPayload::ShotCount(ShotCountTelemetry {
            shot_count,
            waited: timestamp.saturating_duration_since(requested_at),
        });
        self.record(event, payload, timestamp)
    }

    /// Records the end of a cycle.
    pub fn record_cycle_completion(
        &mut self,
        outcome: CycleState,
        trigger: TriggerSource,
        started_at: Option<TInstant>,
        timestamp: TInstant,
        events_recorded: usize,
    ) -> EventId {
        let duration = started_at.map(|start| timestamp.saturating_duration_since(start));
        let payload = TelemetryPayload::Cycle(CycleTelemetry::new(
            outcome,
            trigger,
            duration,
            truncate_count(events_recorded),
        ));
        let event = match outcome {
            CycleState::Error(error) => TelemetryEventKind::CycleFailed(error),
            _ => TelemetryEventKind::CycleComplete,
        };

        self.record(event, payload, timestamp)
    }
}

impl<TInstant, const CAPACITY: usize> Default for TelemetryRecorder<TInstant, CAPACITY>
where
    TInstant: Copy + TelemetryInstant,
{
    fn default() -> Self {
        Self::new()
    }
}

fn truncate_count(count: usize) -> u8 {
    u8::try_from(count).unwrap_or(u8::MAX)
}
