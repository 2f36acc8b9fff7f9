//! Edge detection and pulse timing.
//!
//! Every discrete control (clock, reset, panel button plus its CV jack) goes
//! through a Schmitt trigger: it fires once when the signal rises through the
//! high threshold and re-arms only after falling below the low threshold.

/// Hysteresis edge detector.
#[derive(Clone, Copy, Debug)]
pub struct SchmittTrigger {
    low: f32,
    high: f32,
    state: bool,
}

impl SchmittTrigger {
    /// Default low threshold in volts.
    pub const LOW_THRESHOLD: f32 = 0.1;
    /// Default high threshold in volts.
    pub const HIGH_THRESHOLD: f32 = 1.0;

    /// Creates a trigger with custom thresholds (`low <= high`).
    pub fn with_thresholds(low: f32, high: f32) -> Self {
        Self {
            low: low.min(high),
            high,
            state: false,
        }
    }

    /// Creates a trigger with the default 0.1 V / 1.0 V band.
    pub fn new() -> Self {
        Self::with_thresholds(Self::LOW_THRESHOLD, Self::HIGH_THRESHOLD)
    }

    /// Feeds one frame; returns true only on the rising edge.
    pub fn process(&mut self, value: f32) -> bool {
        if self.state {
            if value <= self.low {
                self.state = false;
            }
            false
        } else if value >= self.high {
            self.state = true;
            true
        } else {
            false
        }
    }

    /// Returns true while the signal is considered high.
    pub fn is_high(&self) -> bool {
        self.state
    }

    /// Forgets the current state, re-arming the trigger.
    pub fn reset(&mut self) {
        self.state = false;
    }
}

impl Default for SchmittTrigger {
    fn default() -> Self {
        Self::new()
    }
}

/// Edge detector for a panel button summed with its CV input.
#[derive(Clone, Copy, Debug, Default)]
pub struct ButtonTrigger {
    trigger: SchmittTrigger,
}

impl ButtonTrigger {
    /// Creates a button trigger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Feeds the button value and CV voltage; true on the press edge.
    pub fn process(&mut self, button: f32, cv: f32) -> bool {
        self.trigger.process(button + cv)
    }

    /// Returns true while the button (or its CV) is held.
    pub fn is_held(&self) -> bool {
        self.trigger.is_high()
    }

    /// Re-arms the trigger.
    pub fn reset(&mut self) {
        self.trigger.reset();
    }
}

/// Countdown that stays high for a fixed number of frames after firing.
#[derive(Clone, Copy, Debug, Default)]
pub struct PulseTimer {
    remaining: u64,
}

impl PulseTimer {
    /// Creates an idle timer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Starts (or restarts) a pulse lasting `frames` frames.
    pub fn fire(&mut self, frames: u64) {
        self.remaining = frames;
    }

    /// Advances one frame; returns true if the pulse was high for this frame.
    pub fn process(&mut self) -> bool {
        if self.remaining > 0 {
            self.remaining -= 1;
            true
        } else {
            false
        }
    }

    /// Returns true while the pulse is running.
    pub fn is_active(&self) -> bool {
        self.remaining > 0
    }

    /// Frames left in the current pulse.
    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Stops the pulse.
    pub fn cancel(&mut self) {
        self.remaining = 0;
    }
}
