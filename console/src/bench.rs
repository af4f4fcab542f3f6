//! Simulated handpiece backend.
//!
//! Every command is serialised to its wire form and parsed back the way the
//! backend would, and every reply is queued as a wire message that the
//! console decodes on delivery. Only the message contract is modelled.

use core::time::Duration;

use clap::ValueEnum;
use tracing::debug;
use treatment_core::channel::{
    CommandKind, DeviceChannel, DeviceCommand, DeviceEvent, DispatchError, MotorStatus,
};

use crate::error::ConsoleError;
use crate::instant::ConsoleInstant;
use crate::wire::{
    ServerMessage, WireCommand, WireMotorStatus, WireResult, WireResultBody, WireTipData,
    decode_command, encode_command, encode_message,
};

/// Time the motor takes to report a reached position.
const MOVE_LATENCY: Duration = Duration::from_millis(40);
/// Time the serial bridge takes to acknowledge an RF frame.
const SERIAL_ACK_LATENCY: Duration = Duration::from_millis(10);
/// Time a tip memory read takes.
const EEPROM_LATENCY: Duration = Duration::from_millis(120);

/// How the bench answers shot counter increments.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum ConfirmBehavior {
    /// Increment and report the new count.
    #[default]
    Ok,
    /// Answer with a failure result.
    Reject,
    /// Never answer.
    Drop,
}

/// Command kinds the bench can be told to refuse.
#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
pub enum FailCommand {
    Move,
    RfShot,
    RfDtrHigh,
    ShotIncrement,
    EepromRead,
}

impl From<FailCommand> for CommandKind {
    fn from(command: FailCommand) -> Self {
        match command {
            FailCommand::Move => CommandKind::Move,
            FailCommand::RfShot => CommandKind::RfShot,
            FailCommand::RfDtrHigh => CommandKind::RfDtrHigh,
            FailCommand::ShotIncrement => CommandKind::ShotIncrement,
            FailCommand::EepromRead => CommandKind::EepromRead,
        }
    }
}

#[derive(Clone, Debug)]
pub struct BenchConfig {
    pub confirm: ConfirmBehavior,
    pub confirm_latency: Duration,
    pub fail_command: Option<CommandKind>,
    pub initial_shots: u32,
    pub tip_type: u8,
    pub start_connected: bool,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            confirm: ConfirmBehavior::Ok,
            confirm_latency: Duration::from_millis(50),
            fail_command: None,
            initial_shots: 0,
            tip_type: 16,
            start_connected: true,
        }
    }
}

pub struct SimulatedDevice {
    config: BenchConfig,
    connected: bool,
    clock: Option<ConsoleInstant>,
    shot_count: u32,
    motor: MotorStatus,
    scheduled: Vec<(ConsoleInstant, ServerMessage)>,
    outbound: Vec<String>,
}

impl SimulatedDevice {
    pub fn new(config: BenchConfig) -> Self {
        Self {
            connected: config.start_connected,
            shot_count: config.initial_shots,
            motor: MotorStatus {
                motor_connected: true,
                position: Some(0),
                force: Some(0),
                sensor: Some(0),
                set_position: Some(0),
                needle_tip_connected: true,
                rf_connected: true,
            },
            config,
            clock: None,
            scheduled: Vec::new(),
            outbound: Vec::new(),
        }
    }

    /// Sets the time used to schedule replies to the next dispatches.
    pub fn set_clock(&mut self, now: ConsoleInstant) {
        self.clock = Some(now);
    }

    pub const fn shot_count(&self) -> u32 {
        self.shot_count
    }

    pub fn connect(&mut self) -> DeviceEvent {
        self.connected = true;
        DeviceEvent::Connected
    }

    /// Drops the link. Replies still in flight are lost.
    pub fn disconnect(&mut self) -> DeviceEvent {
        self.connected = false;
        self.scheduled.clear();
        DeviceEvent::Disconnected
    }

    /// Wire message for a foot-switch edge, as the backend would push it.
    pub fn foot_switch(&self, pressed: bool) -> Result<String, ConsoleError> {
        encode_message(&ServerMessage::FootSwitch { pressed })
    }

    /// Earliest instant a queued reply becomes deliverable.
    pub fn next_due(&self) -> Option<ConsoleInstant> {
        self.scheduled.iter().map(|(at, _)| *at).min()
    }

    /// Removes and encodes every reply due at or before `now`, in delivery order.
    pub fn drain_due(&mut self, now: ConsoleInstant) -> Result<Vec<String>, ConsoleError> {
        let (mut due, later): (Vec<_>, Vec<_>) = self
            .scheduled
            .drain(..)
            .partition(|(at, _)| *at <= now);
        self.scheduled = later;
        due.sort_by_key(|(at, _)| *at);

        due.iter()
            .map(|(_, message)| encode_message(message))
            .collect()
    }

    /// Wire text of every command dispatched since the last call.
    pub fn take_outbound(&mut self) -> Vec<String> {
        std::mem::take(&mut self.outbound)
    }

    fn schedule(&mut self, delay: Duration, message: ServerMessage) {
        let Some(now) = self.clock else {
            return;
        };
        self.scheduled.push((now + delay, message));
    }

    fn respond(&mut self, command: WireCommand) {
        match command {
            WireCommand::Move { position, .. } => {
                self.motor.set_position = Some(position);
                self.motor.position = Some(position);
                let data = WireMotorStatus::from(&self.motor);
                self.schedule(MOVE_LATENCY, ServerMessage::Status { data });
            }
            WireCommand::RfShot { .. } | WireCommand::RfDtrHigh { .. } => {
                self.schedule(
                    SERIAL_ACK_LATENCY,
                    ServerMessage::Serial {
                        result: WireResult::Message("OK".to_string()),
                    },
                );
            }
            WireCommand::ShotIncrement => self.respond_shot_increment(),
            WireCommand::EepromRead { .. } => {
                let result = WireResult::Detailed(WireResultBody {
                    success: true,
                    data: Some(WireTipData {
                        tip_type: Some(self.config.tip_type),
                        shot_count: Some(self.shot_count),
                    }),
                    ..WireResultBody::default()
                });
                self.schedule(EEPROM_LATENCY, ServerMessage::EepromRead { result });
            }
        }
    }

    fn respond_shot_increment(&mut self) {
        let result = match self.config.confirm {
            ConfirmBehavior::Drop => return,
            ConfirmBehavior::Ok => {
                self.shot_count = self.shot_count.saturating_add(1);
                WireResultBody {
                    success: true,
                    shot_count: Some(self.shot_count),
                    ..WireResultBody::default()
                }
            }
            ConfirmBehavior::Reject => WireResultBody {
                success: false,
                error: Some("shot counter write failed".to_string()),
                ..WireResultBody::default()
            },
        };
        self.schedule(
            self.config.confirm_latency,
            ServerMessage::ShotIncrement {
                result: WireResult::Detailed(result),
            },
        );
    }
}

impl DeviceChannel for SimulatedDevice {
    type Error = ConsoleError;

    fn dispatch(&mut self, command: DeviceCommand) -> Result<(), DispatchError<Self::Error>> {
        if !self.connected {
            return Err(DispatchError::Disconnected);
        }
        let kind = command.kind();
        if self.config.fail_command == Some(kind) {
            return Err(DispatchError::Other(ConsoleError::BenchRefused { command: kind }));
        }

        let json = encode_command(&command).map_err(DispatchError::Other)?;
        debug!(target: "wire", direction = "tx", %json);
        let parsed = decode_command(&json).map_err(DispatchError::Other)?;
        self.outbound.push(json);
        self.respond(parsed);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wire::decode_message;
    use embassy_time::Instant;
    use treatment_core::channel::{EepromQuery, EepromReadResult, ShotIncrementResult};

    fn at(ms: u64) -> ConsoleInstant {
        ConsoleInstant::from(Instant::from_millis(ms))
    }

    fn bench(config: BenchConfig) -> SimulatedDevice {
        let mut device = SimulatedDevice::new(config);
        device.set_clock(at(1_000));
        device
    }

    #[test]
    fn confirmed_increment_arrives_after_latency() {
        let mut device = bench(BenchConfig {
            initial_shots: 340,
            ..BenchConfig::default()
        });
        device
            .dispatch(DeviceCommand::ShotIncrement)
            .expect("dispatch");
        assert_eq!(device.take_outbound(), vec![r#"{"cmd":"shot_increment"}"#]);
        assert_eq!(device.next_due(), Some(at(1_050)));

        assert!(device.drain_due(at(1_049)).expect("drain").is_empty());
        let due = device.drain_due(at(1_050)).expect("drain");
        assert_eq!(due.len(), 1);
        assert_eq!(
            decode_message(&due[0]).expect("decode"),
            Some(DeviceEvent::ShotIncrement(ShotIncrementResult::confirmed(341)))
        );
        assert_eq!(device.next_due(), None);
    }

    #[test]
    fn dropped_confirmation_never_answers() {
        let mut device = bench(BenchConfig {
            confirm: ConfirmBehavior::Drop,
            ..BenchConfig::default()
        });
        device
            .dispatch(DeviceCommand::ShotIncrement)
            .expect("dispatch");
        assert_eq!(device.next_due(), None);
        assert_eq!(device.shot_count(), 0);
    }

    #[test]
    fn refused_command_and_offline_link() {
        let mut device = bench(BenchConfig {
            fail_command: Some(CommandKind::RfShot),
            ..BenchConfig::default()
        });
        let refused = device.dispatch(DeviceCommand::RfShot {
            intensity: 50,
            rf_time_ms: 1_000,
        });
        assert!(matches!(
            refused,
            Err(DispatchError::Other(ConsoleError::BenchRefused {
                command: CommandKind::RfShot
            }))
        ));
        assert!(device.take_outbound().is_empty());

        assert_eq!(device.disconnect(), DeviceEvent::Disconnected);
        assert!(matches!(
            device.dispatch(DeviceCommand::move_to(0)),
            Err(DispatchError::Disconnected)
        ));
        assert_eq!(device.connect(), DeviceEvent::Connected);
        assert!(device.dispatch(DeviceCommand::move_to(0)).is_ok());
    }

    #[test]
    fn eeprom_read_reports_configured_tip() {
        let mut device = bench(BenchConfig {
            tip_type: 49,
            initial_shots: 7,
            ..BenchConfig::default()
        });
        device
            .dispatch(DeviceCommand::EepromRead(EepromQuery::default()))
            .expect("dispatch");
        let due = device.drain_due(at(2_000)).expect("drain");
        assert_eq!(
            decode_message(&due[0]).expect("decode"),
            Some(DeviceEvent::EepromRead(EepromReadResult::read(49, 7)))
        );
    }

    #[test]
    fn replies_are_delivered_in_time_order() {
        let mut device = bench(BenchConfig::default());
        device.dispatch(DeviceCommand::move_to(200)).expect("move");
        device
            .dispatch(DeviceCommand::RfDtrHigh { rf_time_ms: 1_000 })
            .expect("dtr");

        let due = device.drain_due(at(1_100)).expect("drain");
        assert_eq!(due.len(), 2);
        assert!(due[0].contains(r#""type":"serial""#), "{}", due[0]);
        assert!(due[1].contains(r#""setPos":200"#), "{}", due[1]);
    }
}
