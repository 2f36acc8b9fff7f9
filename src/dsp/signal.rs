//! Signal types and buffers for sequencer modules.
//!
//! Eurorack-style voltage conventions: pitch CV is 1 V per octave, gates swing
//! between 0 V and 10 V, triggers are short gates detected on their rising edge.

/// Voltage of a high gate or trigger output.
pub const GATE_HIGH: f32 = 10.0;

/// Voltage of a low gate output.
pub const GATE_LOW: f32 = 0.0;

/// Converts a semitone offset to volts at 1 V/oct.
pub fn semitones_to_volts(semitones: i32) -> f32 {
    semitones as f32 / 12.0
}

/// Converts a boolean gate state to an output voltage.
pub fn gate_voltage(high: bool) -> f32 {
    if high {
        GATE_HIGH
    } else {
        GATE_LOW
    }
}

/// The kind of signal a port carries.
///
/// - **Cv**: continuous control voltage (pitch at 1 V/oct, modulation, velocity)
/// - **Gate**: held on/off level, 0 V or 10 V
/// - **Trigger**: edge-detected event input (clock, reset, button CV)
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SignalType {
    Cv,
    Gate,
    Trigger,
}

impl SignalType {
    /// Returns a human-readable name for the signal type.
    pub fn name(&self) -> &'static str {
        match self {
            SignalType::Cv => "CV",
            SignalType::Gate => "Gate",
            SignalType::Trigger => "Trigger",
        }
    }

    /// Checks if an output of this type can drive an input of `target` type.
    ///
    /// Every voltage can be patched anywhere, except that a continuous CV
    /// feeding an edge-detected input is refused to avoid accidental clocks.
    pub fn can_connect_to(&self, target: SignalType) -> bool {
        !matches!((self, target), (SignalType::Cv, SignalType::Trigger))
    }
}

/// A buffer containing one block of frames for a port.
///
/// Pre-allocated so the audio thread never allocates.
#[derive(Clone, Debug)]
pub struct SignalBuffer {
    /// The frame data. Length matches the host's block size.
    pub samples: Vec<f32>,
    /// The type of signal stored in this buffer.
    pub signal_type: SignalType,
}

impl SignalBuffer {
    /// Creates a zeroed buffer with the specified size and type.
    pub fn new(size: usize, signal_type: SignalType) -> Self {
        Self {
            samples: vec![0.0; size],
            signal_type,
        }
    }

    /// Creates a new CV buffer.
    pub fn cv(size: usize) -> Self {
        Self::new(size, SignalType::Cv)
    }

    /// Creates a new gate buffer.
    pub fn gate(size: usize) -> Self {
        Self::new(size, SignalType::Gate)
    }

    /// Creates a new trigger buffer.
    pub fn trigger(size: usize) -> Self {
        Self::new(size, SignalType::Trigger)
    }

    /// Returns the sample at `index`, or `default` when out of range.
    pub fn get_or(&self, index: usize, default: f32) -> f32 {
        self.samples.get(index).copied().unwrap_or(default)
    }

    /// Clears the buffer, setting all samples to zero.
    pub fn clear(&mut self) {
        self.samples.fill(0.0);
    }

    /// Fills the buffer with a constant value.
    pub fn fill(&mut self, value: f32) {
        self.samples.fill(value);
    }

    /// Returns the number of samples in the buffer.
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Returns true if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Reads frame `index` of optional input `port`, falling back to `default`
/// when the port is unpatched or the buffer is short.
pub fn input_at(inputs: &[&SignalBuffer], port: usize, index: usize, default: f32) -> f32 {
    inputs
        .get(port)
        .map(|buf| buf.get_or(index, default))
        .unwrap_or(default)
}

/// Writes `value` into frame `index` of output `port` if it exists.
pub fn write_output(outputs: &mut [SignalBuffer], port: usize, index: usize, value: f32) {
    if let Some(sample) = outputs.get_mut(port).and_then(|buf| buf.samples.get_mut(index)) {
        *sample = value;
    }
}
