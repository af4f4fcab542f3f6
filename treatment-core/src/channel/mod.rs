//! Device channel abstractions.
//!
//! The handpiece backend is reached over a bidirectional message channel. The
//! orchestrator only needs two things from it: a synchronous dispatch that
//! reports whether a command was accepted, and a connectivity predicate.
//! Asynchronous results flow back as [`DeviceEvent`] values that the owning
//! session routes to whoever is interested.

pub mod confirmation;

use core::fmt;

use heapless::String;

pub use confirmation::{
    ConfirmationFailure, ConfirmationFailureKind, ConfirmationOutcome, PendingConfirmation,
};

/// Capacity of error strings carried by backend results.
pub const MAX_ERROR_LEN: usize = 64;

/// Error text reported by the backend.
pub type ErrorText = String<MAX_ERROR_LEN>;

/// Truncates arbitrary text into an [`ErrorText`].
#[must_use]
pub fn error_text(text: &str) -> ErrorText {
    let mut out = ErrorText::new();
    for ch in text.chars() {
        if out.push(ch).is_err() {
            break;
        }
    }
    out
}

/// Motion profile requested for a move command.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub enum MoveMode {
    /// Absolute positional move.
    #[default]
    Position,
}

impl MoveMode {
    /// Wire label for the mode.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            MoveMode::Position => "position",
        }
    }
}

/// Tip memory read parameters.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct EepromQuery {
    pub mtr_version: &'static str,
    pub country: &'static str,
}

impl EepromQuery {
    /// Memory layout revision used by current tips.
    pub const DEFAULT_MTR_VERSION: &'static str = "2.0";
    /// Regional layout used by current tips.
    pub const DEFAULT_COUNTRY: &'static str = "CLASSYS";
}

impl Default for EepromQuery {
    fn default() -> Self {
        Self {
            mtr_version: Self::DEFAULT_MTR_VERSION,
            country: Self::DEFAULT_COUNTRY,
        }
    }
}

/// Structured command sent to the backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DeviceCommand {
    /// Move the needle motor to an absolute position (hundredths of a millimetre).
    Move { position: i32, mode: MoveMode },
    /// Fire an RF shot at `intensity` percent for `rf_time_ms`.
    RfShot { intensity: u16, rf_time_ms: u32 },
    /// Hold the RF control line high for `rf_time_ms`.
    RfDtrHigh { rf_time_ms: u32 },
    /// Increment the tip shot counter and report the new value.
    ShotIncrement,
    /// Read tip type and shot counter from tip memory.
    EepromRead(EepromQuery),
}

impl DeviceCommand {
    /// Positional move helper.
    #[must_use]
    pub const fn move_to(position: i32) -> Self {
        DeviceCommand::Move {
            position,
            mode: MoveMode::Position,
        }
    }

    /// Returns the command discriminant.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            DeviceCommand::Move { .. } => CommandKind::Move,
            DeviceCommand::RfShot { .. } => CommandKind::RfShot,
            DeviceCommand::RfDtrHigh { .. } => CommandKind::RfDtrHigh,
            DeviceCommand::ShotIncrement => CommandKind::ShotIncrement,
            DeviceCommand::EepromRead(_) => CommandKind::EepromRead,
        }
    }
}

/// Command discriminant used in diagnostics and telemetry.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CommandKind {
    Move,
    RfShot,
    RfDtrHigh,
    ShotIncrement,
    EepromRead,
}

impl CommandKind {
    /// Wire name of the command.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            CommandKind::Move => "move",
            CommandKind::RfShot => "rf_shot",
            CommandKind::RfDtrHigh => "rf_dtr_high",
            CommandKind::ShotIncrement => "shot_increment",
            CommandKind::EepromRead => "eeprom_read",
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error surfaced when a command cannot be dispatched.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchError<E = ()> {
    /// Channel is not connected to the backend.
    Disconnected,
    /// Outbound buffer has reached its capacity.
    QueueFull,
    /// Transport-specific failure.
    Other(E),
}

impl<E> DispatchError<E> {
    /// Drops the transport detail, keeping only the failure class.
    #[must_use]
    pub fn reason(&self) -> DispatchFailure {
        match self {
            DispatchError::Disconnected => DispatchFailure::Disconnected,
            DispatchError::QueueFull => DispatchFailure::QueueFull,
            DispatchError::Other(_) => DispatchFailure::Transport,
        }
    }
}

/// Transport-agnostic dispatch failure class.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum DispatchFailure {
    Disconnected,
    QueueFull,
    Transport,
}

impl fmt::Display for DispatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DispatchFailure::Disconnected => "disconnected",
            DispatchFailure::QueueFull => "queue-full",
            DispatchFailure::Transport => "transport",
        })
    }
}

/// Trait implemented by transports that carry commands to the backend.
pub trait DeviceChannel {
    /// Transport-specific error type.
    type Error;

    /// Dispatches a command without waiting for its effect.
    fn dispatch(&mut self, command: DeviceCommand) -> Result<(), DispatchError<Self::Error>>;

    /// Returns `true` while the backend link is up.
    fn is_connected(&self) -> bool;
}

/// Periodic motor and accessory status pushed by the backend.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
pub struct MotorStatus {
    pub motor_connected: bool,
    pub position: Option<i32>,
    pub force: Option<i32>,
    pub sensor: Option<i32>,
    pub set_position: Option<i32>,
    pub needle_tip_connected: bool,
    pub rf_connected: bool,
}

/// Result of a shot counter increment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ShotIncrementResult {
    pub success: bool,
    pub shot_count: Option<u32>,
    pub error: Option<ErrorText>,
}

impl ShotIncrementResult {
    /// Successful increment reporting the new counter value.
    #[must_use]
    pub const fn confirmed(shot_count: u32) -> Self {
        Self {
            success: true,
            shot_count: Some(shot_count),
            error: None,
        }
    }

    /// Failed increment carrying the backend error.
    #[must_use]
    pub fn rejected(error: &str) -> Self {
        Self {
            success: false,
            shot_count: None,
            error: Some(error_text(error)),
        }
    }
}

/// Result of a tip memory read.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct EepromReadResult {
    pub success: bool,
    pub tip_type: Option<u8>,
    pub shot_count: Option<u32>,
    pub error: Option<ErrorText>,
}

impl EepromReadResult {
    /// Successful read.
    #[must_use]
    pub const fn read(tip_type: u8, shot_count: u32) -> Self {
        Self {
            success: true,
            tip_type: Some(tip_type),
            shot_count: Some(shot_count),
            error: None,
        }
    }

    /// Failed read carrying the backend error.
    #[must_use]
    pub fn failed(error: &str) -> Self {
        Self {
            success: false,
            tip_type: None,
            shot_count: None,
            error: Some(error_text(error)),
        }
    }
}

/// Asynchronous notification delivered by the backend.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum DeviceEvent {
    Connected,
    Disconnected,
    MotorStatus(MotorStatus),
    FootSwitch { pressed: bool },
    ShotIncrement(ShotIncrementResult),
    EepromRead(EepromReadResult),
    ServerError(ErrorText),
}

impl DeviceEvent {
    /// Short label used in diagnostics.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            DeviceEvent::Connected => "connected",
            DeviceEvent::Disconnected => "disconnected",
            DeviceEvent::MotorStatus(_) => "motor_status",
            DeviceEvent::FootSwitch { .. } => "foot_switch",
            DeviceEvent::ShotIncrement(_) => "shot_increment",
            DeviceEvent::EepromRead(_) => "eeprom_read",
            DeviceEvent::ServerError(_) => "error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_kinds_use_wire_names() {
        assert_eq!(DeviceCommand::move_to(200).kind().as_str(), "move");
        assert_eq!(
            DeviceCommand::RfShot {
                intensity: 50,
                rf_time_ms: 1_000
            }
            .kind()
            .as_str(),
            "rf_shot"
        );
        assert_eq!(CommandKind::RfDtrHigh.as_str(), "rf_dtr_high");
        assert_eq!(DeviceCommand::ShotIncrement.kind(), CommandKind::ShotIncrement);
        assert_eq!(
            DeviceCommand::EepromRead(EepromQuery::default()).kind(),
            CommandKind::EepromRead
        );
    }

    #[test]
    fn dispatch_error_keeps_only_failure_class() {
        assert_eq!(
            DispatchError::Other(7u8).reason(),
            DispatchFailure::Transport
        );
        assert_eq!(
            DispatchError::<()>::Disconnected.reason(),
            DispatchFailure::Disconnected
        );
        assert_eq!(
            DispatchError::<()>::QueueFull.reason(),
            DispatchFailure::QueueFull
        );
    }

    #[test]
    fn error_text_truncates_long_messages() {
        let long = [b'x'; 200];
        let long = core::str::from_utf8(&long).expect("ascii");
        assert_eq!(error_text(long).len(), MAX_ERROR_LEN);
    }
}
