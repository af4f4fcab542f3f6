use std::io;

use thiserror::Error;
use treatment_core::channel::CommandKind;

/// Failures surfaced by the console host.
#[derive(Debug, Error)]
pub enum ConsoleError {
    #[error("io {0}")]
    Io(#[from] io::Error),
    #[error("wire {0}")]
    Wire(#[from] serde_json::Error),
    #[error("wire unknown message type `{0}`")]
    UnknownMessage(String),
    #[error("syntax {0}")]
    Syntax(String),
    #[error("command {command} refused by bench")]
    BenchRefused { command: CommandKind },
}

impl ConsoleError {
    /// Line printed to the operator; the session keeps running afterwards.
    pub fn operator_line(&self) -> String {
        format!("ERR {self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn operator_lines_lead_with_error_kind() {
        let error = ConsoleError::Syntax("expected parameter name".to_string());
        assert_eq!(error.operator_line(), "ERR syntax expected parameter name");

        let error = ConsoleError::BenchRefused {
            command: CommandKind::RfShot,
        };
        assert_eq!(error.operator_line(), "ERR command rf_shot refused by bench");
    }
}
