//! Replays scripted console sessions on a simulated clock and writes their
//! transcripts under `transcripts/`.

#![allow(dead_code)]

#[path = "../bench.rs"]
mod bench;
#[path = "../error.rs"]
mod error;
#[path = "../grammar.rs"]
mod grammar;
#[path = "../instant.rs"]
mod instant;
#[path = "../session.rs"]
mod session;
#[path = "../wire.rs"]
mod wire;

use core::time::Duration;
use std::io;
use std::path::Path;

use embassy_time::Instant;
use treatment_core::cycle::CycleTiming;

use bench::{BenchConfig, ConfirmBehavior, SimulatedDevice};
use instant::ConsoleInstant;
use session::{ConsoleSession, TranscriptLogger};

const OUTPUT_DIR: &str = "transcripts";
const EEPROM_DELAY: Duration = Duration::from_millis(2_000);

/// One console line issued at a fixed offset; `None` only advances time.
type Step = (u64, Option<&'static str>);

const REFERENCE_CYCLE: &[Step] = &[
    (0, Some("params")),
    (2_500, Some("status")),
    (3_000, Some("send")),
    (3_010, Some("send")),
    (8_000, Some("status")),
    (8_100, Some("telemetry 4")),
];

const CONFIRMATION_TIMEOUT: &[Step] = &[
    (2_500, Some("adjust depth up")),
    (2_600, Some("send")),
    (10_000, None),
    (10_100, Some("status")),
    (14_000, Some("status")),
];

const FOOT_SWITCH: &[Step] = &[
    (2_500, Some("foot press")),
    (2_550, Some("foot release")),
    (2_600, Some("foot press")),
    (3_600, Some("status")),
    (8_000, Some("disconnect")),
    (8_100, Some("foot press")),
    (9_000, Some("connect")),
    (12_000, Some("status")),
];

fn main() -> io::Result<()> {
    record(
        "reference-cycle.log",
        BenchConfig {
            initial_shots: 340,
            ..BenchConfig::default()
        },
        REFERENCE_CYCLE,
    )?;
    record(
        "confirmation-timeout.log",
        BenchConfig {
            confirm: ConfirmBehavior::Drop,
            initial_shots: 340,
            ..BenchConfig::default()
        },
        CONFIRMATION_TIMEOUT,
    )?;
    record("foot-switch.log", BenchConfig::default(), FOOT_SWITCH)?;
    Ok(())
}

fn record(name: &str, bench: BenchConfig, steps: &[Step]) -> io::Result<()> {
    let transcript = TranscriptLogger::create(&Path::new(OUTPUT_DIR).join(name))?;
    let origin = ConsoleInstant::from(Instant::from_millis(0));
    let mut console = ConsoleSession::new(
        SimulatedDevice::new(bench),
        CycleTiming::default(),
        EEPROM_DELAY,
        Some(transcript),
        origin,
    );

    for &(offset, line) in steps {
        let at = origin + Duration::from_millis(offset);
        run_until(&mut console, at)?;
        if let Some(line) = line {
            console.handle_command(line, at)?;
        }
    }

    let _ = console.handle_command("exit", origin + Duration::from_millis(60_000))?;
    println!(
        "{name}: {} telemetry records, {} cycles completed, bench counter at {}",
        console.session().telemetry().len(),
        console.session().orchestrator().completed_cycles(),
        console.session().channel().shot_count()
    );
    Ok(())
}

fn run_until(console: &mut ConsoleSession, until: ConsoleInstant) -> io::Result<()> {
    while let Some(wakeup) = console.next_wakeup().filter(|wakeup| *wakeup <= until) {
        console.tick(wakeup)?;
    }
    Ok(())
}
