//! Master clock module.
//!
//! A BPM clock with three sub-clocks that multiply or divide the master,
//! plus reset and run outputs for driving the sequencers.

use crate::dsp::{
    context::ProcessContext,
    module_trait::{DspModule, ModuleCategory, ModuleError, ModuleInfo},
    parameter::{param_or, ParameterDefinition},
    port::PortDefinition,
    signal::{gate_voltage, input_at, write_output, SignalBuffer},
    ButtonTrigger, LightDivider, ParameterDisplay, PulseTimer, SignalType,
};
use crate::persistence::schema::{from_bytes, to_bytes, ClockedState};

use super::seq_core::TRIGGER_SECONDS;

const NUM_SUB_CLOCKS: usize = 3;
const NUM_LIGHTS: usize = 2 + NUM_SUB_CLOCKS;

/// Beat counter wraps here; every ratio divides it.
const BEAT_WRAP: f64 = 840.0;

static RATIO_LABELS: [&str; 15] = [
    "/8", "/7", "/6", "/5", "/4", "/3", "/2", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8",
];

/// Sub-clock rate relative to the master.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClockRatio {
    /// Faster than the master by this factor.
    Multiply(u32),
    /// Slower than the master by this factor.
    Divide(u32),
}

impl ClockRatio {
    /// Converts a ratio knob index (0-14, "/8" to "x8") to a ratio.
    pub fn from_param(value: f32) -> Self {
        let index = value.round().clamp(0.0, 14.0) as i32 - 7;
        if index >= 0 {
            ClockRatio::Multiply(index as u32 + 1)
        } else {
            ClockRatio::Divide((1 - index) as u32)
        }
    }

    /// Sub-clock beats per master beat.
    pub fn factor(&self) -> f64 {
        match *self {
            ClockRatio::Multiply(n) => n as f64,
            ClockRatio::Divide(n) => 1.0 / n as f64,
        }
    }
}

/// Whether a pulse wave with `pulse_width` is high at `beats`.
fn pulse_high(beats: f64, pulse_width: f32) -> bool {
    beats.fract() < pulse_width as f64
}

/// Master clock with three ratio sub-clocks.
///
/// # Ports
///
/// **Inputs:** Reset, Run.
///
/// **Outputs:** Master, Clock 1-3, Reset (10 ms pulse), Run (gate).
///
/// # Parameters
///
/// - **Tempo** (30-300 BPM)
/// - **Run**, **Reset** (buttons)
/// - **Pulse Width** of the master (1-99%)
/// - **Ratio 1-3** ("/8" to "x8") and **Pulse Width 1-3**
pub struct Clocked {
    /// Master beats since the last reset, wrapped at [`BEAT_WRAP`].
    beats: f64,
    running: bool,
    sample_rate: f32,
    reset: ButtonTrigger,
    run: ButtonTrigger,
    reset_pulse: PulseTimer,
    trigger_frames: u64,
    light_divider: LightDivider,
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    lights: [f32; NUM_LIGHTS],
}

impl Clocked {
    pub fn new() -> Self {
        let mut clock = Self {
            beats: 0.0,
            running: true,
            sample_rate: 44100.0,
            reset: ButtonTrigger::new(),
            run: ButtonTrigger::new(),
            reset_pulse: PulseTimer::new(),
            trigger_frames: 0,
            light_divider: LightDivider::default(),
            ports: vec![
                PortDefinition::input("reset", "Reset", SignalType::Trigger),
                PortDefinition::input("run", "Run", SignalType::Trigger),
                PortDefinition::output("master", "Master", SignalType::Gate),
                PortDefinition::output("clk_1", "Clock 1", SignalType::Gate),
                PortDefinition::output("clk_2", "Clock 2", SignalType::Gate),
                PortDefinition::output("clk_3", "Clock 3", SignalType::Gate),
                PortDefinition::output("reset", "Reset", SignalType::Trigger),
                PortDefinition::output("run", "Run", SignalType::Gate),
            ],
            parameters: vec![
                ParameterDefinition::new(
                    "tempo",
                    "Tempo",
                    30.0,
                    300.0,
                    120.0,
                    ParameterDisplay::linear("BPM"),
                ),
                ParameterDefinition::button("run", "Run"),
                ParameterDefinition::button("reset", "Reset"),
                Self::width_param("pw", "Pulse Width"),
                ParameterDefinition::choice("ratio_1", "Ratio 1", &RATIO_LABELS, 8),
                ParameterDefinition::choice("ratio_2", "Ratio 2", &RATIO_LABELS, 9),
                ParameterDefinition::choice("ratio_3", "Ratio 3", &RATIO_LABELS, 5),
                Self::width_param("pw_1", "Pulse Width 1"),
                Self::width_param("pw_2", "Pulse Width 2"),
                Self::width_param("pw_3", "Pulse Width 3"),
            ],
            lights: [0.0; NUM_LIGHTS],
        };
        clock.prepare(44100.0, 0);
        clock
    }

    fn width_param(id: &'static str, name: &'static str) -> ParameterDefinition {
        ParameterDefinition::new(id, name, 1.0, 99.0, 50.0, ParameterDisplay::linear("%"))
    }

    const PORT_RESET: usize = 0;
    const PORT_RUN: usize = 1;
    const OUT_MASTER: usize = 0;
    const OUT_CLOCK: usize = 1;
    const OUT_RESET: usize = 4;
    const OUT_RUN: usize = 5;

    const PARAM_TEMPO: usize = 0;
    const PARAM_RUN: usize = 1;
    const PARAM_RESET: usize = 2;
    const PARAM_PW: usize = 3;
    const PARAM_RATIO: usize = 4;
    const PARAM_SUB_PW: usize = 7;

    const LIGHT_RUN: usize = 0;
    const LIGHT_MASTER: usize = 1;
    const LIGHT_CLOCK: usize = 2;

    pub fn is_running(&self) -> bool {
        self.running
    }

    fn restart(&mut self) {
        self.beats = 0.0;
        self.reset_pulse.fire(self.trigger_frames);
    }
}

impl Default for Clocked {
    fn default() -> Self {
        Self::new()
    }
}

impl DspModule for Clocked {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "clk.clocked",
            name: "Clocked",
            category: ModuleCategory::Clock,
            description: "Master BPM clock with three multiplied or divided sub-clocks",
        };
        &INFO
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.sample_rate = sample_rate;
        self.trigger_frames = (TRIGGER_SECONDS * sample_rate).round().max(1.0) as u64;
    }

    fn process(
        &mut self,
        inputs: &[&SignalBuffer],
        outputs: &mut [SignalBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        let tempo = self.parameters[Self::PARAM_TEMPO]
            .clamp(param_or(params, Self::PARAM_TEMPO, 120.0));
        let beats_per_frame = tempo as f64 / 60.0 / self.sample_rate as f64;
        let width = |index: usize| {
            self.parameters[index].clamp(param_or(params, index, 50.0)) / 100.0
        };
        let master_width = width(Self::PARAM_PW);
        let mut subs = [(1.0, 0.5); NUM_SUB_CLOCKS];
        for (k, sub) in subs.iter_mut().enumerate() {
            let ratio = self.parameters[Self::PARAM_RATIO + k].default;
            let ratio = ClockRatio::from_param(param_or(params, Self::PARAM_RATIO + k, ratio));
            *sub = (ratio.factor(), width(Self::PARAM_SUB_PW + k));
        }
        let run_button = param_or(params, Self::PARAM_RUN, 0.0);
        let reset_button = param_or(params, Self::PARAM_RESET, 0.0);

        for i in 0..context.block_size {
            if self.run.process(run_button, input_at(inputs, Self::PORT_RUN, i, 0.0)) {
                self.running = !self.running;
                if self.running {
                    self.restart();
                }
            }
            if self
                .reset
                .process(reset_button, input_at(inputs, Self::PORT_RESET, i, 0.0))
            {
                self.restart();
            }

            let master = self.running && pulse_high(self.beats, master_width);
            write_output(outputs, Self::OUT_MASTER, i, gate_voltage(master));
            for (k, &(factor, pw)) in subs.iter().enumerate() {
                let high = self.running && pulse_high(self.beats * factor, pw);
                write_output(outputs, Self::OUT_CLOCK + k, i, gate_voltage(high));
            }
            write_output(outputs, Self::OUT_RESET, i, gate_voltage(self.reset_pulse.process()));
            write_output(outputs, Self::OUT_RUN, i, gate_voltage(self.running));

            if self.light_divider.tick() {
                self.lights[Self::LIGHT_RUN] = if self.running { 1.0 } else { 0.0 };
                self.lights[Self::LIGHT_MASTER] = if master { 1.0 } else { 0.0 };
                for (k, &(factor, pw)) in subs.iter().enumerate() {
                    let high = self.running && pulse_high(self.beats * factor, pw);
                    self.lights[Self::LIGHT_CLOCK + k] = if high { 1.0 } else { 0.0 };
                }
            }

            if self.running {
                self.beats = (self.beats + beats_per_frame) % BEAT_WRAP;
            }
        }
    }

    fn reset(&mut self) {
        self.beats = 0.0;
        self.reset_pulse.cancel();
        self.lights = [0.0; NUM_LIGHTS];
    }

    fn serialize_state(&self) -> Option<Vec<u8>> {
        to_bytes(&ClockedState {
            running: self.running,
        })
    }

    fn deserialize_state(&mut self, data: &[u8]) -> Result<(), ModuleError> {
        let state: ClockedState = from_bytes(data)?;
        self.running = state.running;
        Ok(())
    }

    fn lights(&self) -> &[f32] {
        &self.lights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::modules::PhraseSeq16;

    const SR: f32 = 1000.0;

    fn render(clock: &mut Clocked, params: &[f32], frames: usize) -> Vec<SignalBuffer> {
        let mut outputs = vec![SignalBuffer::gate(frames); 6];
        clock.process(&[], &mut outputs, params, &ProcessContext::new(SR, frames));
        outputs
    }

    fn rising_edges(buffer: &SignalBuffer) -> usize {
        let mut prev = 0.0;
        let mut count = 0;
        for &s in &buffer.samples {
            if s > 5.0 && prev <= 5.0 {
                count += 1;
            }
            prev = s;
        }
        count
    }

    fn defaults(clock: &Clocked) -> Vec<f32> {
        clock.parameters().iter().map(|p| p.default).collect()
    }

    #[test]
    fn test_ratio_conversion() {
        assert_eq!(ClockRatio::from_param(7.0), ClockRatio::Multiply(1));
        assert_eq!(ClockRatio::from_param(8.0), ClockRatio::Multiply(2));
        assert_eq!(ClockRatio::from_param(14.0), ClockRatio::Multiply(8));
        assert_eq!(ClockRatio::from_param(6.0), ClockRatio::Divide(2));
        assert_eq!(ClockRatio::from_param(0.0), ClockRatio::Divide(8));
        assert_eq!(ClockRatio::from_param(99.0), ClockRatio::Multiply(8));
        assert!(BEAT_WRAP % 7.0 == 0.0 && BEAT_WRAP % 8.0 == 0.0);
    }

    #[test]
    fn test_master_and_sub_clock_rates() {
        let mut clock = Clocked::new();
        clock.prepare(SR, 2000);
        let params = defaults(&clock);
        let out = render(&mut clock, &params, 2000);
        // 120 BPM at 1 kHz: one beat per 500 frames.
        assert_eq!(rising_edges(&out[0]), 4);
        assert_eq!(rising_edges(&out[1]), 8, "x2");
        assert_eq!(rising_edges(&out[2]), 12, "x3");
        assert_eq!(rising_edges(&out[3]), 2, "/3");
        let high = out[0].samples[..500].iter().filter(|&&s| s > 5.0).count();
        assert!((249..=251).contains(&high), "50% width, got {}", high);
        assert!(out[5].samples.iter().all(|&s| s == 10.0));
    }

    #[test]
    fn test_run_button_stops_and_restarts() {
        let mut clock = Clocked::new();
        clock.prepare(SR, 10);
        let mut params = defaults(&clock);
        render(&mut clock, &params, 300);
        params[Clocked::PARAM_RUN] = 1.0;
        let out = render(&mut clock, &params, 10);
        assert!(!clock.is_running());
        assert!(out[0].samples.iter().all(|&s| s == 0.0));
        assert!(out[5].samples.iter().all(|&s| s == 0.0));

        params[Clocked::PARAM_RUN] = 0.0;
        render(&mut clock, &params, 1);
        params[Clocked::PARAM_RUN] = 1.0;
        let out = render(&mut clock, &params, 20);
        assert!(clock.is_running());
        assert_eq!(out[0].samples[0], 10.0, "restart begins on a beat");
        assert_eq!(out[4].samples[0], 10.0, "restart emits a reset pulse");
        assert_eq!(out[4].samples[10], 0.0, "reset pulse lasts 10 ms");
    }

    #[test]
    fn test_state_round_trip() {
        let mut clock = Clocked::new();
        clock.running = false;
        let blob = clock.serialize_state().unwrap();
        let mut restored = Clocked::new();
        restored.deserialize_state(&blob).unwrap();
        assert!(!restored.is_running());
        assert!(restored.deserialize_state(b"nope").is_err());
    }

    #[test]
    fn test_drives_phrase_sequencer() {
        let mut clock = Clocked::new();
        let mut seq = PhraseSeq16::default();
        clock.prepare(SR, 100);
        seq.prepare(SR, 100);
        let clock_params = defaults(&clock);
        let seq_params: Vec<f32> = seq.parameters().iter().map(|p| p.default).collect();
        let ctx = ProcessContext::new(SR, 100);
        for _ in 0..20 {
            let clocks = render(&mut clock, &clock_params, 100);
            let mut seq_out = vec![SignalBuffer::cv(100); 3];
            seq.process(&[&clocks[0]], &mut seq_out, &seq_params, &ctx);
        }
        // Edges at frames 0, 500, 1000 and 1500.
        assert_eq!(seq.sequencer().track(0).step_index_run(), 4);
    }
}
