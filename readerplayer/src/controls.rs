use embassy_time::{Duration, Instant};
use embedded_hal::digital::{InputPin, OutputPin};
use log::warn;

/// Push button wired against a pull-up: pressed while the pin reads low.
pub struct Button<P> {
    input: P,
}

impl<P: InputPin> Button<P> {
    pub fn new(input: P) -> Self {
        Self { input }
    }

    /// A pin that cannot be read counts as released.
    pub fn is_pressed(&mut self) -> bool {
        self.input.is_low().unwrap_or(false)
    }
}

/// Accepts at most one press per window.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    window: Duration,
    last_accepted: Instant,
}

impl Debounce {
    /// Starts as if a press had been accepted at `now`, so presses right after
    /// startup are ignored too.
    pub fn new(window: Duration, now: Instant) -> Self {
        Self {
            window,
            last_accepted: now,
        }
    }

    pub fn accept(&mut self, now: Instant) -> bool {
        if now.saturating_duration_since(self.last_accepted) < self.window {
            return false;
        }
        self.last_accepted = now;
        true
    }

    pub fn last_accepted(&self) -> Instant {
        self.last_accepted
    }
}

/// LED that is lit while the player is playing.
pub struct StatusLed<P> {
    output: P,
    lit: bool,
}

impl<P: OutputPin> StatusLed<P> {
    pub fn new(output: P) -> Self {
        Self { output, lit: false }
    }

    pub fn set(&mut self, lit: bool) {
        let result = if lit {
            self.output.set_high()
        } else {
            self.output.set_low()
        };
        if let Err(err) = result {
            warn!("Failed to switch status LED: {:?}", err);
        }
        self.lit = lit;
    }

    pub fn is_lit(&self) -> bool {
        self.lit
    }
}
