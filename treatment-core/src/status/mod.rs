//! Ready-screen status surface.
//!
//! [`StatusBoard`] holds the transient overlay shown while a cycle runs plus
//! the sticky indicators fed by backend events (link, motor, shot counter).
//! Every timed clear is owned by the message that scheduled it, so replacing a
//! message also cancels its clear. [`StatusFormatter`] renders a
//! [`StatusSnapshot`] into the lines printed by front-ends.

use core::fmt;

use crate::channel::{ErrorText, MotorStatus};
use crate::cycle::CycleState;
use crate::params::{TIP_SHOT_CAPACITY, ValueText};

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
struct Banner<I> {
    state: CycleState,
    clear_at: Option<I>,
}

/// Mutable display state driven by the orchestrator and backend events.
#[derive(Clone, Debug)]
pub struct StatusBoard<I> {
    banner: Option<Banner<I>>,
    foot_switch_clear_at: Option<I>,
    shot_count: Option<u32>,
    link_connected: bool,
    motor: Option<MotorStatus>,
    server_error: Option<ErrorText>,
}

impl<I> StatusBoard<I>
where
    I: Copy + Ord,
{
    #[must_use]
    pub const fn new() -> Self {
        Self {
            banner: None,
            foot_switch_clear_at: None,
            shot_count: None,
            link_connected: false,
            motor: None,
            server_error: None,
        }
    }

    /// Shows a running phase until it is replaced.
    pub fn show_phase(&mut self, state: CycleState) {
        self.banner = Some(Banner {
            state,
            clear_at: None,
        });
    }

    /// Shows a cycle outcome until `clear_at`.
    pub fn show_outcome(&mut self, state: CycleState, clear_at: I) {
        self.banner = Some(Banner {
            state,
            clear_at: Some(clear_at),
        });
    }

    /// State currently shown in the overlay.
    #[must_use]
    pub fn banner(&self) -> Option<CycleState> {
        self.banner.map(|banner| banner.state)
    }

    /// Overlay text, if any.
    #[must_use]
    pub fn banner_text(&self) -> Option<&'static str> {
        self.banner().and_then(CycleState::status_text)
    }

    /// Terminal state that is still on screen.
    #[must_use]
    pub fn held_outcome(&self) -> Option<CycleState> {
        self.banner().filter(|state| state.is_terminal())
    }

    /// Shows the foot-switch indicator until `clear_at`.
    pub fn show_foot_switch(&mut self, clear_at: I) {
        self.foot_switch_clear_at = Some(clear_at);
    }

    /// Moves the indicator clear to `clear_at` if the indicator is visible.
    pub fn reschedule_foot_switch(&mut self, clear_at: I) {
        if let Some(current) = self.foot_switch_clear_at.as_mut() {
            *current = clear_at.max(*current);
        }
    }

    #[must_use]
    pub const fn foot_switch_active(&self) -> bool {
        self.foot_switch_clear_at.is_some()
    }

    pub fn set_shot_count(&mut self, count: u32) {
        self.shot_count = Some(count);
    }

    #[must_use]
    pub const fn shot_count(&self) -> Option<u32> {
        self.shot_count
    }

    pub fn set_link(&mut self, connected: bool) {
        self.link_connected = connected;
        if connected {
            self.server_error = None;
        }
    }

    #[must_use]
    pub const fn link_connected(&self) -> bool {
        self.link_connected
    }

    pub fn set_motor(&mut self, status: MotorStatus) {
        self.motor = Some(status);
    }

    #[must_use]
    pub const fn motor(&self) -> Option<&MotorStatus> {
        self.motor.as_ref()
    }

    pub fn set_server_error(&mut self, error: ErrorText) {
        self.server_error = Some(error);
    }

    /// Clears every message whose hold has elapsed. Returns `true` on change.
    pub fn expire(&mut self, now: I) -> bool {
        let mut changed = false;

        if self
            .banner
            .and_then(|banner| banner.clear_at)
            .is_some_and(|at| now >= at)
        {
            self.banner = None;
            changed = true;
        }

        if self.foot_switch_clear_at.is_some_and(|at| now >= at) {
            self.foot_switch_clear_at = None;
            changed = true;
        }

        changed
    }

    /// Earliest pending clear.
    #[must_use]
    pub fn next_deadline(&self) -> Option<I> {
        let banner = self.banner.and_then(|banner| banner.clear_at);
        [banner, self.foot_switch_clear_at]
            .into_iter()
            .flatten()
            .min()
    }

    /// Captures the board together with session-owned fields.
    #[must_use]
    pub fn snapshot(&self, tip_type: &str, trigger_enabled: bool) -> StatusSnapshot {
        let mut tip = ValueText::new();
        for ch in tip_type.chars() {
            if tip.push(ch).is_err() {
                break;
            }
        }

        StatusSnapshot {
            cycle: self.banner(),
            trigger_enabled,
            foot_switch_active: self.foot_switch_active(),
            shot_count: self.shot_count,
            tip_type: tip,
            link_connected: self.link_connected,
            motor: self.motor,
            server_error: self.server_error.clone(),
        }
    }
}

impl<I> Default for StatusBoard<I>
where
    I: Copy + Ord,
{
    fn default() -> Self {
        Self::new()
    }
}

/// Percentage of the tip shot budget consumed, capped at 100.
#[must_use]
pub fn shot_progress_percent(count: u32) -> u8 {
    let percent = u64::from(count) * 100 / u64::from(TIP_SHOT_CAPACITY);
    u8::try_from(percent.min(100)).unwrap_or(100)
}

/// Point-in-time view of the ready screen.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct StatusSnapshot {
    pub cycle: Option<CycleState>,
    pub trigger_enabled: bool,
    pub foot_switch_active: bool,
    pub shot_count: Option<u32>,
    pub tip_type: ValueText,
    pub link_connected: bool,
    pub motor: Option<MotorStatus>,
    pub server_error: Option<ErrorText>,
}

/// Helper that renders a [`StatusSnapshot`] into human-readable lines.
#[derive(Clone, Copy, Debug)]
pub struct StatusFormatter<'a> {
    snapshot: &'a StatusSnapshot,
}

impl<'a> StatusFormatter<'a> {
    /// Creates a new formatter for the provided snapshot.
    #[must_use]
    pub const fn new(snapshot: &'a StatusSnapshot) -> Self {
        Self { snapshot }
    }

    /// Writes the cycle line (e.g. `cycle status="Moving..." state=stabilizing send=disabled foot-switch=idle`).
    pub fn write_cycle_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str("cycle status=")?;
        match self.snapshot.cycle.and_then(CycleState::status_text) {
            Some(text) => write!(writer, "\"{text}\"")?,
            None => writer.write_str("none")?,
        }

        let state = self.snapshot.cycle.unwrap_or(CycleState::Idle);
        write!(writer, " state={}", state.label())?;
        match state {
            CycleState::Complete(outcome) if !outcome.is_confirmed() => {
                writer.write_str(" shot-count=unconfirmed")?;
            }
            CycleState::Error(error) => write!(writer, " error=\"{error}\"")?,
            _ => {}
        }

        writer.write_str(if self.snapshot.trigger_enabled {
            " send=enabled"
        } else {
            " send=disabled"
        })?;
        writer.write_str(if self.snapshot.foot_switch_active {
            " foot-switch=active"
        } else {
            " foot-switch=idle"
        })
    }

    /// Writes the tip line (e.g. `tip type=16PIN shots=120/2000 (6%)`).
    pub fn write_tip_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        write!(writer, "tip type={} shots=", self.snapshot.tip_type)?;
        match self.snapshot.shot_count {
            Some(count) => write!(
                writer,
                "{count}/{TIP_SHOT_CAPACITY} ({}%)",
                shot_progress_percent(count)
            ),
            None => writer.write_str("unknown"),
        }
    }

    /// Writes the link line (e.g. `link connected`).
    pub fn write_link_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        writer.write_str(if self.snapshot.link_connected {
            "link connected"
        } else {
            "link disconnected"
        })?;
        if let Some(error) = self.snapshot.server_error.as_deref() {
            write!(writer, " error=\"{error}\"")?;
        }
        Ok(())
    }

    /// Writes the motor line (e.g. `motor connected=yes position=200 set=200 ...`).
    pub fn write_motor_line<W: fmt::Write>(&self, writer: &mut W) -> fmt::Result {
        let Some(motor) = self.snapshot.motor.as_ref() else {
            return writer.write_str("motor status=unknown");
        };

        write!(writer, "motor connected={}", yes_no(motor.motor_connected))?;
        writer.write_str(" position=")?;
        write_optional(writer, motor.position)?;
        writer.write_str(" set=")?;
        write_optional(writer, motor.set_position)?;
        writer.write_str(" force=")?;
        write_optional(writer, motor.force)?;
        writer.write_str(" sensor=")?;
        write_optional(writer, motor.sensor)?;
        write!(
            writer,
            " needle-tip={} rf={}",
            yes_no(motor.needle_tip_connected),
            yes_no(motor.rf_connected)
        )
    }

    /// Renders every status line.
    #[cfg(feature = "alloc")]
    #[must_use]
    pub fn lines(&self) -> alloc::vec::Vec<alloc::string::String> {
        use alloc::string::String;

        let writers: [fn(&Self, &mut String) -> fmt::Result; 4] = [
            Self::write_cycle_line,
            Self::write_tip_line,
            Self::write_link_line,
            Self::write_motor_line,
        ];

        writers
            .iter()
            .map(|write_line| {
                let mut line = String::new();
                // Writing into a String cannot fail.
                let _ = write_line(self, &mut line);
                line
            })
            .collect()
    }
}

const fn yes_no(flag: bool) -> &'static str {
    if flag { "yes" } else { "no" }
}

fn write_optional<W: fmt::Write>(writer: &mut W, value: Option<i32>) -> fmt::Result {
    match value {
        Some(value) => write!(writer, "{value}"),
        None => writer.write_str("n/a"),
    }
}
