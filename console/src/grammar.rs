//! Operator console grammar.
//!
//! One command per line. Keywords are case-insensitive; parameter names accept
//! `-` or `_` in place of spaces (`delay-time`).

use treatment_core::params::{Direction, ParameterId};
use winnow::ModalResult;
use winnow::ascii::{Caseless, dec_uint, space1};
use winnow::combinator::{alt, fail, opt, preceded};
use winnow::error::{ContextError, ParseError, StrContext, StrContextValue};
use winnow::prelude::*;
use winnow::stream::Stream;
use winnow::token::{rest, take_while};

use crate::error::ConsoleError;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ConsoleCommand<'a> {
    Help { topic: Option<&'a str> },
    Send,
    Foot { pressed: bool },
    Adjust { id: ParameterId, direction: Direction },
    Set { id: ParameterId, value: &'a str },
    Params,
    Status,
    Connect,
    Disconnect,
    Eeprom,
    Cancel,
    Telemetry { limit: Option<usize> },
    Exit,
}

/// Parses one console line.
pub fn parse_command(line: &str) -> Result<ConsoleCommand<'_>, ConsoleError> {
    command
        .parse(line.trim())
        .map_err(|error| syntax_error(&error))
}

fn command<'a>(input: &mut &'a str) -> ModalResult<ConsoleCommand<'a>> {
    let start = input.checkpoint();
    let keyword = word.parse_next(input)?;

    match keyword.to_ascii_lowercase().as_str() {
        "help" => opt(preceded(space1, word))
            .map(|topic| ConsoleCommand::Help { topic })
            .parse_next(input),
        "send" => Ok(ConsoleCommand::Send),
        "foot" => preceded(space1, switch_edge)
            .map(|pressed| ConsoleCommand::Foot { pressed })
            .parse_next(input),
        "adjust" => (preceded(space1, parameter), preceded(space1, direction))
            .map(|(id, direction)| ConsoleCommand::Adjust { id, direction })
            .parse_next(input),
        "set" => (preceded(space1, parameter), preceded(space1, value))
            .map(|(id, value)| ConsoleCommand::Set { id, value })
            .parse_next(input),
        "params" => Ok(ConsoleCommand::Params),
        "status" => Ok(ConsoleCommand::Status),
        "connect" => Ok(ConsoleCommand::Connect),
        "disconnect" => Ok(ConsoleCommand::Disconnect),
        "eeprom" => Ok(ConsoleCommand::Eeprom),
        "cancel" => Ok(ConsoleCommand::Cancel),
        "telemetry" => opt(preceded(space1, dec_uint))
            .map(|limit: Option<usize>| ConsoleCommand::Telemetry { limit })
            .parse_next(input),
        "exit" | "quit" => Ok(ConsoleCommand::Exit),
        _ => {
            input.reset(&start);
            fail.context(StrContext::Label("command"))
                .context(StrContext::Expected(StrContextValue::Description(
                    "a command listed by `help`",
                )))
                .parse_next(input)
        }
    }
}

fn word<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    take_while(1.., |c: char| !c.is_whitespace()).parse_next(input)
}

fn parameter(input: &mut &str) -> ModalResult<ParameterId> {
    take_while(1.., |c: char| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        .verify_map(ParameterId::from_name)
        .context(StrContext::Label("parameter"))
        .context(StrContext::Expected(StrContextValue::Description(
            "tip-type, intensity, rf, depth, mode or delay-time",
        )))
        .parse_next(input)
}

fn direction(input: &mut &str) -> ModalResult<Direction> {
    alt((
        Caseless("up").value(Direction::Increase),
        Caseless("down").value(Direction::Decrease),
    ))
    .context(StrContext::Label("direction"))
    .context(StrContext::Expected(StrContextValue::Description("up or down")))
    .parse_next(input)
}

fn switch_edge(input: &mut &str) -> ModalResult<bool> {
    alt((
        Caseless("press").value(true),
        Caseless("release").value(false),
    ))
    .context(StrContext::Label("foot switch edge"))
    .context(StrContext::Expected(StrContextValue::Description(
        "press or release",
    )))
    .parse_next(input)
}

fn value<'a>(input: &mut &'a str) -> ModalResult<&'a str> {
    rest.verify(|text: &str| !text.trim().is_empty())
        .context(StrContext::Label("value"))
        .parse_next(input)
}

fn syntax_error(error: &ParseError<&str, ContextError>) -> ConsoleError {
    let context = error.inner();
    let label = context
        .context()
        .find_map(|entry| match entry {
            StrContext::Label(label) => Some(*label),
            _ => None,
        })
        .unwrap_or("input");
    let expected: Vec<String> = context
        .context()
        .filter_map(|entry| match entry {
            StrContext::Expected(value) => Some(value.to_string()),
            _ => None,
        })
        .collect();

    let mut message = format!("invalid {label} at column {}", error.offset() + 1);
    if !expected.is_empty() {
        message.push_str(", expected ");
        message.push_str(&expected.join(" or "));
    }
    ConsoleError::Syntax(message)
}
