//! JSON message contract spoken with the handpiece backend.
//!
//! Commands are objects tagged by `cmd`; backend messages are objects tagged
//! by `type`. Field names follow the backend verbatim, including its camelCase
//! leftovers (`mtrVersion`, `setPos`).

use serde::{Deserialize, Serialize};
use treatment_core::channel::{
    DeviceCommand, DeviceEvent, EepromQuery, EepromReadResult, MotorStatus, ShotIncrementResult,
    error_text,
};

use crate::error::ConsoleError;

/// Marker the backend puts in a free-text result when the update succeeded.
const SUCCESS_MARKER: &str = "성공";

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum WireCommand {
    Move {
        position: i32,
        mode: String,
    },
    RfShot {
        intensity: u16,
        rf_time: u32,
    },
    RfDtrHigh {
        rf_time: u32,
    },
    ShotIncrement,
    EepromRead {
        #[serde(rename = "mtrVersion")]
        mtr_version: String,
        country: String,
    },
}

impl From<&DeviceCommand> for WireCommand {
    fn from(command: &DeviceCommand) -> Self {
        match *command {
            DeviceCommand::Move { position, mode } => WireCommand::Move {
                position,
                mode: mode.as_str().to_string(),
            },
            DeviceCommand::RfShot {
                intensity,
                rf_time_ms,
            } => WireCommand::RfShot {
                intensity,
                rf_time: rf_time_ms,
            },
            DeviceCommand::RfDtrHigh { rf_time_ms } => WireCommand::RfDtrHigh {
                rf_time: rf_time_ms,
            },
            DeviceCommand::ShotIncrement => WireCommand::ShotIncrement,
            DeviceCommand::EepromRead(EepromQuery {
                mtr_version,
                country,
            }) => WireCommand::EepromRead {
                mtr_version: mtr_version.to_string(),
                country: country.to_string(),
            },
        }
    }
}

/// Serialises a command into its wire form.
pub fn encode_command(command: &DeviceCommand) -> Result<String, ConsoleError> {
    Ok(serde_json::to_string(&WireCommand::from(command))?)
}

/// Parses a command as the backend would receive it.
pub fn decode_command(text: &str) -> Result<WireCommand, ConsoleError> {
    Ok(serde_json::from_str(text)?)
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireMotorStatus {
    #[serde(default)]
    pub motor_connected: bool,
    #[serde(default)]
    pub position: Option<i32>,
    #[serde(default)]
    pub force: Option<i32>,
    #[serde(default)]
    pub sensor: Option<i32>,
    #[serde(default, rename = "setPos")]
    pub set_position: Option<i32>,
    #[serde(default)]
    pub needle_tip_connected: bool,
    #[serde(default)]
    pub rf_connected: bool,
}

impl From<WireMotorStatus> for MotorStatus {
    fn from(status: WireMotorStatus) -> Self {
        MotorStatus {
            motor_connected: status.motor_connected,
            position: status.position,
            force: status.force,
            sensor: status.sensor,
            set_position: status.set_position,
            needle_tip_connected: status.needle_tip_connected,
            rf_connected: status.rf_connected,
        }
    }
}

impl From<&MotorStatus> for WireMotorStatus {
    fn from(status: &MotorStatus) -> Self {
        WireMotorStatus {
            motor_connected: status.motor_connected,
            position: status.position,
            force: status.force,
            sensor: status.sensor,
            set_position: status.set_position,
            needle_tip_connected: status.needle_tip_connected,
            rf_connected: status.rf_connected,
        }
    }
}

/// Backend result payload: either a structured object or a bare message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireResult {
    Detailed(WireResultBody),
    Message(String),
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireResultBody {
    #[serde(default)]
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub shot_count: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<WireTipData>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WireTipData {
    #[serde(default)]
    pub tip_type: Option<u8>,
    #[serde(default)]
    pub shot_count: Option<u32>,
}

impl WireResult {
    fn succeeded(&self) -> bool {
        match self {
            WireResult::Detailed(body) => {
                body.success || body.status.as_deref() == Some("success")
            }
            WireResult::Message(text) => text.contains(SUCCESS_MARKER),
        }
    }

    fn error(&self) -> Option<&str> {
        match self {
            WireResult::Detailed(body) => body.error.as_deref(),
            WireResult::Message(text) => Some(text.as_str()),
        }
    }

    fn into_shot_increment(self) -> ShotIncrementResult {
        let success = self.succeeded();
        let shot_count = match &self {
            WireResult::Detailed(body) => body
                .shot_count
                .or_else(|| body.data.as_ref().and_then(|data| data.shot_count)),
            WireResult::Message(_) => None,
        };
        ShotIncrementResult {
            success,
            shot_count,
            error: if success {
                None
            } else {
                self.error().map(error_text)
            },
        }
    }

    fn into_eeprom_read(self) -> EepromReadResult {
        let success = self.succeeded();
        let data = match &self {
            WireResult::Detailed(body) => body.data.clone().unwrap_or_default(),
            WireResult::Message(_) => WireTipData::default(),
        };
        EepromReadResult {
            success,
            tip_type: data.tip_type.filter(|_| success),
            shot_count: data.shot_count.filter(|_| success),
            error: if success {
                None
            } else {
                self.error().map(error_text)
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Status { data: WireMotorStatus },
    FootSwitch { pressed: bool },
    ShotIncrement { result: WireResult },
    EepromRead { result: WireResult },
    EepromWrite { result: WireResult },
    Serial { result: WireResult },
    Error { result: String },
}

impl ServerMessage {
    /// Converts into the event routed to the session.
    ///
    /// Acknowledgements nothing on the ready screen consumes map to `None`.
    pub fn into_event(self) -> Option<DeviceEvent> {
        match self {
            ServerMessage::Status { data } => Some(DeviceEvent::MotorStatus(data.into())),
            ServerMessage::FootSwitch { pressed } => Some(DeviceEvent::FootSwitch { pressed }),
            ServerMessage::ShotIncrement { result } => {
                Some(DeviceEvent::ShotIncrement(result.into_shot_increment()))
            }
            ServerMessage::EepromRead { result } => {
                Some(DeviceEvent::EepromRead(result.into_eeprom_read()))
            }
            ServerMessage::Error { result } => Some(DeviceEvent::ServerError(error_text(&result))),
            ServerMessage::EepromWrite { .. } | ServerMessage::Serial { .. } => None,
        }
    }
}

/// Serialises a backend message.
pub fn encode_message(message: &ServerMessage) -> Result<String, ConsoleError> {
    Ok(serde_json::to_string(message)?)
}

/// Decodes one backend message.
///
/// Messages whose `type` is not part of the contract are reported as
/// [`ConsoleError::UnknownMessage`] so the caller can log and skip them.
pub fn decode_message(text: &str) -> Result<Option<DeviceEvent>, ConsoleError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .unwrap_or_default();
    if !KNOWN_MESSAGE_TYPES.contains(&kind) {
        return Err(ConsoleError::UnknownMessage(kind.to_string()));
    }

    let message: ServerMessage = serde_json::from_value(value)?;
    Ok(message.into_event())
}

const KNOWN_MESSAGE_TYPES: [&str; 7] = [
    "status",
    "foot_switch",
    "shot_increment",
    "eeprom_read",
    "eeprom_write",
    "serial",
    "error",
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn commands_use_backend_field_names() {
        let json = encode_command(&DeviceCommand::move_to(200)).expect("encode");
        assert_eq!(json, r#"{"cmd":"move","position":200,"mode":"position"}"#);

        let json = encode_command(&DeviceCommand::RfShot {
            intensity: 50,
            rf_time_ms: 1_000,
        })
        .expect("encode");
        assert_eq!(json, r#"{"cmd":"rf_shot","intensity":50,"rf_time":1000}"#);

        let json = encode_command(&DeviceCommand::RfDtrHigh { rf_time_ms: 1_000 }).expect("encode");
        assert_eq!(json, r#"{"cmd":"rf_dtr_high","rf_time":1000}"#);

        let json = encode_command(&DeviceCommand::ShotIncrement).expect("encode");
        assert_eq!(json, r#"{"cmd":"shot_increment"}"#);

        let json =
            encode_command(&DeviceCommand::EepromRead(EepromQuery::default())).expect("encode");
        assert_eq!(
            json,
            r#"{"cmd":"eeprom_read","mtrVersion":"2.0","country":"CLASSYS"}"#
        );
    }

    #[test]
    fn backend_parses_what_the_console_sends() {
        let json = encode_command(&DeviceCommand::move_to(0)).expect("encode");
        assert_eq!(
            decode_command(&json).expect("decode"),
            WireCommand::Move {
                position: 0,
                mode: "position".to_string(),
            }
        );
    }

    #[test]
    fn status_message_fills_motor_status() {
        let event = decode_message(
            r#"{"type":"status","data":{"position":120,"force":3,"sensor":7,"setPos":200,
                "gpio18":"LOW","gpio23":"HIGH","needle_tip_connected":true,
                "motor_connected":true,"rf_connected":false}}"#,
        )
        .expect("decode");
        assert_eq!(
            event,
            Some(DeviceEvent::MotorStatus(MotorStatus {
                motor_connected: true,
                position: Some(120),
                force: Some(3),
                sensor: Some(7),
                set_position: Some(200),
                needle_tip_connected: true,
                rf_connected: false,
            }))
        );
    }

    #[test]
    fn shot_increment_accepts_object_and_text_results() {
        let event = decode_message(
            r#"{"type":"shot_increment","result":{"success":true,"shot_count":341}}"#,
        )
        .expect("decode");
        assert_eq!(
            event,
            Some(DeviceEvent::ShotIncrement(ShotIncrementResult::confirmed(341)))
        );

        let event = decode_message(r#"{"type":"shot_increment","result":"샷 카운트 증가 성공"}"#)
            .expect("decode");
        assert!(matches!(
            event,
            Some(DeviceEvent::ShotIncrement(ShotIncrementResult {
                success: true,
                shot_count: None,
                ..
            }))
        ));

        let event = decode_message(
            r#"{"type":"shot_increment","result":{"success":false,"error":"tip locked"}}"#,
        )
        .expect("decode");
        assert_eq!(
            event,
            Some(DeviceEvent::ShotIncrement(ShotIncrementResult::rejected(
                "tip locked"
            )))
        );
    }

    #[test]
    fn english_failure_text_is_not_a_success() {
        for text in [
            "shot increment unsuccessful: eeprom locked",
            "no success",
            "success",
        ] {
            let message = format!(r#"{{"type":"shot_increment","result":"{text}"}}"#);
            let event = decode_message(&message).expect("decode");
            assert_eq!(
                event,
                Some(DeviceEvent::ShotIncrement(ShotIncrementResult::rejected(text))),
                "{text}"
            );
        }
    }

    #[test]
    fn eeprom_read_reports_tip_data() {
        let event = decode_message(
            r#"{"type":"eeprom_read","result":{"success":true,"data":{"tip_type":25,"shot_count":12,"manufacture_date":"2024-01-02"}}}"#,
        )
        .expect("decode");
        assert_eq!(
            event,
            Some(DeviceEvent::EepromRead(EepromReadResult::read(25, 12)))
        );

        let event = decode_message(
            r#"{"type":"eeprom_read","result":{"success":false,"error":"no tip"}}"#,
        )
        .expect("decode");
        assert_eq!(
            event,
            Some(DeviceEvent::EepromRead(EepromReadResult::failed("no tip")))
        );
    }

    #[test]
    fn acknowledgements_and_unknown_types_are_distinguished() {
        assert_eq!(
            decode_message(r#"{"type":"serial","result":"OK"}"#).expect("decode"),
            None
        );
        assert!(matches!(
            decode_message(r#"{"type":"telemetry","data":{}}"#),
            Err(ConsoleError::UnknownMessage(kind)) if kind == "telemetry"
        ));
        assert!(matches!(
            decode_message("not json"),
            Err(ConsoleError::Wire(_))
        ));
    }

    #[test]
    fn error_messages_become_server_errors() {
        let event = decode_message(r#"{"type":"error","result":"serial port busy"}"#)
            .expect("decode");
        assert_eq!(
            event,
            Some(DeviceEvent::ServerError(error_text("serial port busy")))
        );
    }
}
