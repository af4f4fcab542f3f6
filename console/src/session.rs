use core::time::Duration;
use std::fs::{self, OpenOptions};
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tracing::{debug, error, info, warn};
use treatment_core::channel::{CommandKind, DeviceChannel, DeviceEvent, DispatchError};
use treatment_core::cycle::{CycleState, CycleTiming};
use treatment_core::params::ParameterError;
use treatment_core::session::{EventEffect, TreatmentSession};
use treatment_core::status::StatusFormatter;
use treatment_core::telemetry::{
    EventId, TelemetryEventKind, TelemetryInstant, TelemetryPayload, TelemetryRecord,
};

use crate::bench::SimulatedDevice;
use crate::error::ConsoleError;
use crate::grammar::{ConsoleCommand, parse_command};
use crate::instant::ConsoleInstant;
use crate::wire::decode_message;

const DEFAULT_TELEMETRY_LINES: usize = 10;

pub const HELP_TOPICS: &[(&str, &str)] = &[
    ("send", "send                          - start one treatment cycle"),
    (
        "foot",
        "foot press|release            - simulate a foot-switch edge",
    ),
    (
        "adjust",
        "adjust <param> up|down        - step a parameter by its unit",
    ),
    (
        "set",
        "set <param> <value>           - enter a value such as 2.5mm",
    ),
    ("params", "params                        - list treatment parameters"),
    ("status", "status                        - show the ready screen"),
    ("connect", "connect                       - bring the backend link up"),
    ("disconnect", "disconnect                    - drop the backend link"),
    ("eeprom", "eeprom                        - read tip type and shot count"),
    ("cancel", "cancel                        - abort the running cycle"),
    (
        "telemetry",
        "telemetry [n]                 - show the last n telemetry records",
    ),
    ("help", "help [topic]                  - show help for a command"),
    ("exit", "exit|quit                     - close the console"),
];

pub type Session = TreatmentSession<SimulatedDevice, ConsoleInstant>;

/// Host console bound to one ready-screen session.
pub struct ConsoleSession {
    session: Session,
    transcript: Option<TranscriptLogger>,
    started_at: ConsoleInstant,
    eeprom_delay: Duration,
    telemetry_cursor: Option<EventId>,
}

impl ConsoleSession {
    pub fn new(
        device: SimulatedDevice,
        timing: CycleTiming,
        eeprom_delay: Duration,
        transcript: Option<TranscriptLogger>,
        now: ConsoleInstant,
    ) -> Self {
        let mut session = Session::with_timing(device, timing);
        if session.channel().is_connected() {
            session.schedule_tip_read(now + eeprom_delay);
        }

        Self {
            session,
            transcript,
            started_at: now,
            eeprom_delay,
            telemetry_cursor: None,
        }
    }

    pub const fn session(&self) -> &Session {
        &self.session
    }

    /// Earliest instant at which [`Self::tick`] has work to do.
    pub fn next_wakeup(&self) -> Option<ConsoleInstant> {
        [self.session.next_wakeup(), self.session.channel().next_due()]
            .into_iter()
            .flatten()
            .min()
    }

    /// Runs due timers and delivers due backend messages.
    pub fn tick(&mut self, now: ConsoleInstant) -> io::Result<Vec<String>> {
        self.session.channel_mut().set_clock(now);
        let mut lines = Vec::new();

        if let Err(error) = self.session.poll(now) {
            lines.push(dispatch_error_line(CommandKind::EepromRead, &error));
        }

        match self.session.channel_mut().drain_due(now) {
            Ok(messages) => {
                for message in messages {
                    lines.extend(self.deliver_message(&message, now)?);
                }
            }
            Err(error) => lines.push(error.operator_line()),
        }

        lines.extend(self.flush_activity(now)?);
        self.record_output(now, &lines)?;
        Ok(lines)
    }

    pub fn handle_command(&mut self, line: &str, now: ConsoleInstant) -> io::Result<Vec<String>> {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            return Ok(Vec::new());
        }

        self.append(now, TranscriptRole::Host, trimmed)?;
        self.session.channel_mut().set_clock(now);

        let mut lines = match parse_command(trimmed) {
            Ok(command) => self.execute(command, now)?,
            Err(error) => vec![error.operator_line()],
        };

        lines.extend(self.flush_activity(now)?);
        self.record_output(now, &lines)?;
        Ok(lines)
    }

    fn execute(
        &mut self,
        command: ConsoleCommand<'_>,
        now: ConsoleInstant,
    ) -> io::Result<Vec<String>> {
        let lines = match command {
            ConsoleCommand::Help { topic } => help_lines(topic),
            ConsoleCommand::Send => match self.session.trigger_manual(now) {
                Ok(()) => vec![format!("OK send state={}", self.session.state().label())],
                Err(rejection) => vec![format!("ERR rejected {rejection}")],
            },
            ConsoleCommand::Foot { pressed } => match self.session.channel().foot_switch(pressed) {
                Ok(message) => self.deliver_message(&message, now)?,
                Err(error) => vec![error.operator_line()],
            },
            ConsoleCommand::Adjust { id, direction } => {
                parameter_line(self.session.parameters_mut().adjust(id, direction))
            }
            ConsoleCommand::Set { id, value } => {
                parameter_line(self.session.parameters_mut().set_value(id, value))
            }
            ConsoleCommand::Params => self
                .session
                .parameters()
                .iter()
                .map(|parameter| {
                    let fixed = if parameter.has_buttons { "" } else { " (fixed)" };
                    format!("{:<10} {}{fixed}", parameter.name(), parameter.value)
                })
                .collect(),
            ConsoleCommand::Status => StatusFormatter::new(&self.session.snapshot()).lines(),
            ConsoleCommand::Connect => {
                if self.session.channel().is_connected() {
                    vec!["OK already connected".to_string()]
                } else {
                    let event = self.session.channel_mut().connect();
                    self.apply_event(event, now);
                    self.session.schedule_tip_read(now + self.eeprom_delay);
                    vec![format!(
                        "OK connected tip-read=+{}ms",
                        self.eeprom_delay.as_millis()
                    )]
                }
            }
            ConsoleCommand::Disconnect => {
                let event = self.session.channel_mut().disconnect();
                self.apply_event(event, now);
                vec!["OK disconnected".to_string()]
            }
            ConsoleCommand::Eeprom => match self.session.request_tip_read() {
                Ok(()) => vec!["OK eeprom_read requested".to_string()],
                Err(error) => vec![dispatch_error_line(CommandKind::EepromRead, &error)],
            },
            ConsoleCommand::Cancel => match self.session.cancel(now) {
                Ok(()) => vec!["OK cancelled".to_string()],
                Err(_) => vec!["ERR cancel no active cycle".to_string()],
            },
            ConsoleCommand::Telemetry { limit } => {
                self.telemetry_lines(limit.unwrap_or(DEFAULT_TELEMETRY_LINES))
            }
            ConsoleCommand::Exit => vec!["Session closed.".to_string()],
        };
        Ok(lines)
    }

    fn deliver_message(&mut self, message: &str, now: ConsoleInstant) -> io::Result<Vec<String>> {
        self.append(now, TranscriptRole::Inbound, message)?;
        debug!(target: "wire", direction = "rx", json = %message);

        Ok(match decode_message(message) {
            Ok(Some(event)) => self.apply_event(event, now).into_iter().collect(),
            Ok(None) => Vec::new(),
            Err(error) => {
                warn!(%error, "skipping backend message");
                vec![error.operator_line()]
            }
        })
    }

    /// Routes an event; returns a line only for effects telemetry does not narrate.
    fn apply_event(&mut self, event: DeviceEvent, now: ConsoleInstant) -> Option<String> {
        match self.session.handle_event(event, now) {
            EventEffect::ShotCountReported => Some(match self.session.snapshot().shot_count {
                Some(count) => format!("EVT shot count reported shots={count}"),
                None => "EVT shot count reported".to_string(),
            }),
            EventEffect::TipReadFailed(Some(error)) => {
                Some(format!("EVT tip read failed: {error}"))
            }
            EventEffect::TipReadFailed(None) => Some("EVT tip read failed".to_string()),
            EventEffect::TipRejected(error) => Some(parameter_error_line(error)),
            _ => None,
        }
    }

    /// Writes outbound wire traffic to the transcript and mirrors new telemetry.
    fn flush_activity(&mut self, now: ConsoleInstant) -> io::Result<Vec<String>> {
        for message in self.session.channel_mut().take_outbound() {
            self.append(now, TranscriptRole::Outbound, &message)?;
        }

        let mut lines = Vec::new();
        let mut cursor = self.telemetry_cursor;
        for record in self.session.telemetry().since(self.telemetry_cursor) {
            log_record(record);
            if let Some(line) = describe_record(record, self.started_at) {
                lines.push(line);
            }
            cursor = Some(record.id);
        }
        self.telemetry_cursor = cursor;
        Ok(lines)
    }

    fn telemetry_lines(&self, limit: usize) -> Vec<String> {
        let telemetry = self.session.telemetry();
        let skip = telemetry.len().saturating_sub(limit);
        telemetry
            .oldest_first()
            .skip(skip)
            .map(|record| {
                format!(
                    "#{:<4} +{}ms {}{}",
                    record.id,
                    record.timestamp.millis_since(self.started_at),
                    record.event,
                    payload_suffix(&record.details)
                )
            })
            .collect()
    }

    fn append(&mut self, now: ConsoleInstant, role: TranscriptRole, line: &str) -> io::Result<()> {
        let elapsed = now.saturating_duration_since(self.started_at);
        match self.transcript.as_mut() {
            Some(transcript) => transcript.append_line(elapsed, role, line),
            None => Ok(()),
        }
    }

    fn record_output(&mut self, now: ConsoleInstant, lines: &[String]) -> io::Result<()> {
        for line in lines {
            self.append(now, TranscriptRole::Console, line)?;
        }
        Ok(())
    }
}

fn help_lines(topic: Option<&str>) -> Vec<String> {
    let mut lines = Vec::new();
    match topic {
        Some(target) => {
            if let Some((_, detail)) = HELP_TOPICS
                .iter()
                .find(|(name, _)| name.eq_ignore_ascii_case(target))
            {
                lines.push((*detail).to_string());
            } else {
                lines.push(format!("No help available for `{target}`."));
                lines.push(format!("Available topics: {}", help_topic_list()));
            }
        }
        None => {
            lines.push("Available commands:".to_string());
            for (_, detail) in HELP_TOPICS {
                lines.push(format!("  {detail}"));
            }
            lines.push("Parameters: tip-type intensity rf depth mode delay-time".to_string());
            lines.push("Type `help <topic>` for a specific command.".to_string());
        }
    }
    lines
}

fn help_topic_list() -> String {
    HELP_TOPICS
        .iter()
        .map(|(name, _)| *name)
        .collect::<Vec<_>>()
        .join(", ")
}

fn parameter_line(
    result: Result<&treatment_core::params::TreatmentParameter, ParameterError>,
) -> Vec<String> {
    vec![match result {
        Ok(parameter) => format!("OK {} = {}", parameter.name(), parameter.value),
        Err(error) => parameter_error_line(error),
    }]
}

fn parameter_error_line(error: ParameterError) -> String {
    format!("ERR parameter {error}")
}

fn dispatch_error_line(command: CommandKind, error: &DispatchError<ConsoleError>) -> String {
    match error {
        DispatchError::Other(detail) => format!("ERR dispatch {command} {detail}"),
        other => format!("ERR dispatch {command} {}", other.reason()),
    }
}

fn payload_suffix(details: &TelemetryPayload) -> String {
    match details {
        TelemetryPayload::None => String::new(),
        TelemetryPayload::Command(command) => match command.failure {
            Some(failure) => format!(" ({failure})"),
            None => String::new(),
        },
        TelemetryPayload::Cycle(cycle) => {
            let duration = cycle
                .duration
                .map_or_else(|| "n/a".to_string(), format_duration_short);
            format!(
                " trigger={} duration={duration} events={}",
                cycle.trigger, cycle.events_recorded
            )
        }
        TelemetryPayload::ShotCount(shots) => match shots.shot_count {
            Some(count) => format!(" shots={count} waited={}", format_duration_short(shots.waited)),
            None => format!(" waited={}", format_duration_short(shots.waited)),
        },
        TelemetryPayload::Tip(tip) => {
            let tip_type = tip
                .tip_type
                .map_or_else(|| "n/a".to_string(), |code| code.to_string());
            let shots = tip
                .shot_count
                .map_or_else(|| "n/a".to_string(), |count| count.to_string());
            format!(" type={tip_type} shots={shots}")
        }
    }
}

/// Operator-facing narration of a telemetry record. Dispatches stay in the log.
fn describe_record(
    record: &TelemetryRecord<ConsoleInstant>,
    started_at: ConsoleInstant,
) -> Option<String> {
    match record.event {
        TelemetryEventKind::CommandDispatched(_) | TelemetryEventKind::FootSwitch { .. } => None,
        TelemetryEventKind::PhaseEntered(state) => Some(format!(
            "EVT +{}ms phase {}{}",
            record.timestamp.millis_since(started_at),
            state.label(),
            state
                .status_text()
                .map(|text| format!(" \"{text}\""))
                .unwrap_or_default()
        )),
        event => Some(format!(
            "EVT +{}ms {event}{}",
            record.timestamp.millis_since(started_at),
            payload_suffix(&record.details)
        )),
    }
}

fn log_record(record: &TelemetryRecord<ConsoleInstant>) {
    match record.event {
        TelemetryEventKind::CommandDispatched(kind) => log_dispatch(record.id, kind),
        TelemetryEventKind::FootSwitch { pressed } => {
            debug!(target: "cycle", id = record.id, pressed, "foot switch edge");
        }
        TelemetryEventKind::PhaseEntered(state) => log_phase(record.id, state),
        TelemetryEventKind::ShotCountUnconfirmed(_)
        | TelemetryEventKind::CycleRejected(_)
        | TelemetryEventKind::FootSwitchBounced
        | TelemetryEventKind::LinkDisconnected => log_warning(record),
        TelemetryEventKind::CycleFailed(_)
        | TelemetryEventKind::DispatchFailed(_)
        | TelemetryEventKind::ServerError => log_failure(record),
        TelemetryEventKind::CycleRequested(_)
        | TelemetryEventKind::ShotCountConfirmed
        | TelemetryEventKind::CycleComplete
        | TelemetryEventKind::LinkConnected
        | TelemetryEventKind::TipHydrated => {
            info!(
                target: "cycle",
                id = record.id,
                "{}{}",
                record.event,
                payload_suffix(&record.details)
            );
        }
    }
}

fn log_dispatch(id: EventId, kind: CommandKind) {
    debug!(target: "cycle", id, command = %kind, "command dispatched");
}

fn log_phase(id: EventId, state: CycleState) {
    info!(target: "cycle", id, phase = state.label(), "phase entered");
}

fn log_warning(record: &TelemetryRecord<ConsoleInstant>) {
    warn!(target: "cycle", id = record.id, "{}{}", record.event, payload_suffix(&record.details));
}

fn log_failure(record: &TelemetryRecord<ConsoleInstant>) {
    error!(target: "cycle", id = record.id, "{}{}", record.event, payload_suffix(&record.details));
}

/// Append-only session transcript with millisecond offsets.
pub struct TranscriptLogger {
    writer: BufWriter<std::fs::File>,
}

impl TranscriptLogger {
    pub fn create(path: &Path) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }

        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path)?;

        let mut logger = Self {
            writer: BufWriter::new(file),
        };
        logger.write_header()?;
        Ok(logger)
    }

    fn write_header(&mut self) -> io::Result<()> {
        writeln!(self.writer, "# Treatment console transcript")?;
        writeln!(
            self.writer,
            "# Timestamps are milliseconds since session start"
        )?;
        writeln!(self.writer)?;
        self.writer.flush()
    }

    fn append_line(
        &mut self,
        elapsed: Duration,
        role: TranscriptRole,
        line: &str,
    ) -> io::Result<()> {
        writeln!(
            self.writer,
            "[+{:>6} ms] {} {}",
            elapsed.as_millis(),
            role.prefix(),
            line
        )?;
        self.writer.flush()
    }
}

#[derive(Clone, Copy, Debug)]
enum TranscriptRole {
    Host,
    Console,
    Outbound,
    Inbound,
}

impl TranscriptRole {
    fn prefix(self) -> &'static str {
        match self {
            TranscriptRole::Host => "HOST>",
            TranscriptRole::Console => "CONS<",
            TranscriptRole::Outbound => "WIRE>",
            TranscriptRole::Inbound => "WIRE<",
        }
    }
}

fn format_duration_short(duration: Duration) -> String {
    if duration.as_secs() == 0 {
        format!("{}ms", duration.as_millis())
    } else {
        format!("{:.3}s", duration.as_secs_f64())
    }
}
