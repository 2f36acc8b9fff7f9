//! Processing context for sequencer modules.
//!
//! Provides the runtime timing information modules need while processing,
//! plus the divider used to throttle UI-only work such as lights.

/// Context provided to modules during processing.
///
/// Contains the sample rate and the number of frames in the current block.
/// Modules advance their state once per frame of the block.
#[derive(Clone, Copy, Debug)]
pub struct ProcessContext {
    /// The host sample rate in Hz (e.g., 44100, 48000).
    pub sample_rate: f32,
    /// The number of frames in the current processing block.
    pub block_size: usize,
}

impl ProcessContext {
    /// Creates a new process context.
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
        }
    }

    /// Returns the duration of one frame in seconds.
    pub fn sample_time(&self) -> f32 {
        1.0 / self.sample_rate
    }

    /// Converts a duration in seconds to a frame count.
    pub fn seconds_to_samples(&self, seconds: f32) -> u64 {
        (seconds * self.sample_rate).round().max(0.0) as u64
    }

    /// Converts a frame count to seconds.
    pub fn samples_to_seconds(&self, samples: u64) -> f32 {
        samples as f32 / self.sample_rate
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::new(44100.0, 256)
    }
}

/// Counter that fires once every `period` frames.
///
/// Lights are a UI-only concern, so modules recompute them at a reduced
/// cadence rather than on every frame.
#[derive(Clone, Copy, Debug)]
pub struct LightDivider {
    period: u32,
    count: u32,
}

impl LightDivider {
    /// Default light refresh period in frames.
    pub const DEFAULT_PERIOD: u32 = 256;

    /// Creates a divider firing every `period` frames (at least 1).
    pub fn new(period: u32) -> Self {
        Self {
            period: period.max(1),
            count: 0,
        }
    }

    /// Advances by one frame, returning true when the period elapses.
    pub fn tick(&mut self) -> bool {
        self.count += 1;
        if self.count >= self.period {
            self.count = 0;
            true
        } else {
            false
        }
    }

    /// Returns the refresh period in frames.
    pub fn period(&self) -> u32 {
        self.period
    }
}

impl Default for LightDivider {
    fn default() -> Self {
        Self::new(Self::DEFAULT_PERIOD)
    }
}
