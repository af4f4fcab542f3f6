//! Cycle trigger sources and foot-switch edge filtering.

use core::{fmt, ops::Add, time::Duration};

/// Origin of a cycle request.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TriggerSource {
    /// On-screen SEND control.
    Manual,
    /// Physical foot switch.
    FootSwitch,
}

impl TriggerSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            TriggerSource::Manual => "manual",
            TriggerSource::FootSwitch => "foot-switch",
        }
    }
}

impl fmt::Display for TriggerSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a foot-switch edge.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum FootSwitchEdge {
    /// Accepted press; a cycle should be requested.
    Pressed,
    /// Press that arrived too close to the previous edge.
    Bounced,
    /// Release.
    Released,
}

/// Debounces foot-switch edges reported by the backend.
#[derive(Copy, Clone, Debug)]
pub struct FootSwitchGate<I> {
    debounce: Duration,
    last_edge_at: Option<I>,
    pressed: bool,
}

impl<I> FootSwitchGate<I>
where
    I: Copy + Ord + Add<Duration, Output = I>,
{
    #[must_use]
    pub const fn new(debounce: Duration) -> Self {
        Self {
            debounce,
            last_edge_at: None,
            pressed: false,
        }
    }

    /// Returns `true` while the switch is held down.
    #[must_use]
    pub const fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Classifies an edge observed at `now`.
    pub fn on_edge(&mut self, pressed: bool, now: I) -> FootSwitchEdge {
        let previous = self.last_edge_at.replace(now);

        if !pressed {
            self.pressed = false;
            return FootSwitchEdge::Released;
        }

        let bounced = previous.is_some_and(|at| now < at + self.debounce);
        self.pressed = true;
        if bounced {
            FootSwitchEdge::Bounced
        } else {
            FootSwitchEdge::Pressed
        }
    }
}
