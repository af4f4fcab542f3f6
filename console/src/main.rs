mod bench;
mod error;
mod grammar;
mod instant;
mod session;
mod wire;

use core::time::Duration;
use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::thread;

use clap::Parser;
use embassy_executor::Spawner;
use embassy_futures::block_on;
use embassy_futures::select::{Either, select};
use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::channel::Channel;
use embassy_time::Timer;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use treatment_core::cycle::CycleTiming;

use bench::{BenchConfig, ConfirmBehavior, FailCommand, SimulatedDevice};
use error::ConsoleError;
use grammar::{ConsoleCommand, parse_command};
use instant::ConsoleInstant;
use session::{ConsoleSession, TranscriptLogger};

const INPUT_DEPTH: usize = 4;

enum InputEvent {
    Line(String),
    Closed,
}

static INPUT: Channel<CriticalSectionRawMutex, InputEvent, INPUT_DEPTH> = Channel::new();

/// Ready-screen console driving a simulated handpiece backend.
#[derive(Debug, Parser)]
#[command(name = "treatment-console", version)]
struct Args {
    /// Wait after the depth move before firing.
    #[arg(long, value_name = "MS")]
    settle_ms: Option<u64>,
    /// Wait after the home move before updating the shot counter.
    #[arg(long, value_name = "MS")]
    return_settle_ms: Option<u64>,
    /// How long to wait for the shot counter confirmation.
    #[arg(long, value_name = "MS")]
    confirm_timeout_ms: Option<u64>,
    /// How long the completion status stays on screen.
    #[arg(long, value_name = "MS")]
    complete_hold_ms: Option<u64>,
    /// How long the error status stays on screen.
    #[arg(long, value_name = "MS")]
    error_hold_ms: Option<u64>,
    /// How the bench answers shot counter increments.
    #[arg(long, value_enum, default_value_t = ConfirmBehavior::Ok)]
    confirm: ConfirmBehavior,
    #[arg(long, value_name = "MS", default_value_t = 50)]
    confirm_latency_ms: u64,
    /// Command kind the bench refuses to dispatch.
    #[arg(long, value_enum)]
    fail_command: Option<FailCommand>,
    #[arg(long, default_value_t = 0)]
    initial_shots: u32,
    /// Tip type code reported by tip memory.
    #[arg(long, default_value_t = 16)]
    tip_type: u8,
    #[arg(long)]
    start_disconnected: bool,
    /// Write a timestamped transcript of the session.
    #[arg(long, value_name = "PATH")]
    transcript: Option<PathBuf>,
    /// Delay before the first tip memory read after the link comes up.
    #[arg(long, value_name = "MS", default_value_t = 2_000)]
    eeprom_delay_ms: u64,
}

impl Args {
    fn timing(&self) -> CycleTiming {
        let defaults = CycleTiming::default();
        let millis = |value: Option<u64>, fallback: Duration| {
            value.map_or(fallback, Duration::from_millis)
        };

        defaults
            .with_settle(millis(self.settle_ms, defaults.settle()))
            .with_return_settle(millis(self.return_settle_ms, defaults.return_settle()))
            .with_confirmation_timeout(millis(
                self.confirm_timeout_ms,
                defaults.confirmation_timeout(),
            ))
            .with_holds(
                millis(self.complete_hold_ms, defaults.complete_hold()),
                millis(self.error_hold_ms, defaults.error_hold()),
            )
    }

    fn bench(&self) -> BenchConfig {
        BenchConfig {
            confirm: self.confirm,
            confirm_latency: Duration::from_millis(self.confirm_latency_ms),
            fail_command: self.fail_command.map(Into::into),
            initial_shots: self.initial_shots,
            tip_type: self.tip_type,
            start_connected: !self.start_disconnected,
        }
    }
}

#[embassy_executor::main]
async fn main(_spawner: Spawner) {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(io::stderr)
        .init();

    let args = Args::parse();
    if let Err(error) = run(&args).await {
        error!(%error, "console terminated");
        eprintln!("{}", error.operator_line());
        std::process::exit(1);
    }
}

async fn run(args: &Args) -> Result<(), ConsoleError> {
    let transcript = args
        .transcript
        .as_deref()
        .map(TranscriptLogger::create)
        .transpose()?;
    let device = SimulatedDevice::new(args.bench());
    let mut console = ConsoleSession::new(
        device,
        args.timing(),
        Duration::from_millis(args.eeprom_delay_ms),
        transcript,
        ConsoleInstant::now(),
    );

    let _input = thread::spawn(read_input);
    info!(timing = ?args.timing(), "console ready");

    let mut stdout = io::stdout();
    writeln!(
        stdout,
        "Treatment console ready. Type `help` for commands or `exit` to quit."
    )?;
    prompt(&mut stdout)?;

    loop {
        let wakeup = console.next_wakeup();
        let timer = async {
            match wakeup {
                Some(at) => Timer::at(at.into_embassy()).await,
                None => core::future::pending::<()>().await,
            }
        };

        match select(INPUT.receive(), timer).await {
            Either::First(InputEvent::Line(line)) => {
                let trimmed = line.trim();
                let lines = console.handle_command(trimmed, ConsoleInstant::now())?;
                print_lines(&mut stdout, &lines)?;
                if should_terminate(trimmed) {
                    break;
                }
                prompt(&mut stdout)?;
            }
            Either::First(InputEvent::Closed) => {
                writeln!(stdout)?;
                break;
            }
            Either::Second(()) => {
                let lines = console.tick(ConsoleInstant::now())?;
                if !lines.is_empty() {
                    writeln!(stdout)?;
                    print_lines(&mut stdout, &lines)?;
                    prompt(&mut stdout)?;
                }
            }
        }
    }

    Ok(())
}

fn read_input() {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        match line {
            Ok(line) => block_on(INPUT.send(InputEvent::Line(line))),
            Err(error) => {
                error!(%error, "stdin read failed");
                break;
            }
        }
    }
    block_on(INPUT.send(InputEvent::Closed));
}

fn should_terminate(input: &str) -> bool {
    matches!(parse_command(input), Ok(ConsoleCommand::Exit))
}

fn prompt(stdout: &mut io::Stdout) -> io::Result<()> {
    write!(stdout, "> ")?;
    stdout.flush()
}

fn print_lines(stdout: &mut io::Stdout, lines: &[String]) -> io::Result<()> {
    for line in lines {
        writeln!(stdout, "{line}")?;
    }
    Ok(())
}
