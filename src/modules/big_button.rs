//! Big-button gate sequencer.
//!
//! Six channels of 128-step gate patterns, two banks per channel, written
//! live with one large button. A press that lands in the second half of a
//! clock period is held back and written on the following step so a late
//! hit still lands on the beat it was meant for. The step cursor runs
//! through the shared run-mode engine with the `BIG_BUTTON_SEQ` variant.

use crate::dsp::{
    context::ProcessContext,
    module_trait::{DspModule, ModuleCategory, ModuleError, ModuleInfo},
    parameter::{param_or, ParameterDefinition},
    port::PortDefinition,
    signal::{gate_voltage, input_at, write_output, SignalBuffer},
    ButtonTrigger, LightDivider, SchmittTrigger, SignalType,
};
use crate::persistence::schema::{from_bytes, to_bytes, BigButtonState};
use crate::sequencer::{RunHistory, RunMode, BIG_BUTTON_SEQ};
use rand::rngs::SmallRng;
use rand::SeedableRng;

use super::seq_core::RESET_CLOCK_IGNORE_SECONDS;

pub const NUM_CHANNELS: usize = 6;
pub const NUM_BANKS: usize = 2;
pub const MAX_STEPS: usize = 128;
const WORDS: usize = MAX_STEPS / 64;
const NUM_LIGHTS: usize = NUM_CHANNELS + 3;

/// A late press waits this much past the measured period before it is
/// written to the current step instead.
const PENDING_TIMEOUT_RATIO: f64 = 1.01;

static CHANNEL_LABELS: [&str; NUM_CHANNELS] = ["1", "2", "3", "4", "5", "6"];

static GATE_IDS: [&str; NUM_CHANNELS] = ["gate_1", "gate_2", "gate_3", "gate_4", "gate_5", "gate_6"];
static GATE_NAMES: [&str; NUM_CHANNELS] = ["Gate 1", "Gate 2", "Gate 3", "Gate 4", "Gate 5", "Gate 6"];
static CV_IDS: [&str; NUM_CHANNELS] = ["cv_1", "cv_2", "cv_3", "cv_4", "cv_5", "cv_6"];
static CV_NAMES: [&str; NUM_CHANNELS] = ["CV 1", "CV 2", "CV 3", "CV 4", "CV 5", "CV 6"];

/// Button press waiting for the next clock edge. A write carries the CV
/// sampled when the button went down.
#[derive(Clone, Copy, Debug, PartialEq)]
enum PendingOp {
    Write(f32),
    Delete,
}

type GateBits = [u64; WORDS];

fn bit(bits: &GateBits, step: usize) -> bool {
    bits[step >> 6] & (1 << (step & 63)) != 0
}

fn set_bit(bits: &mut GateBits, step: usize, on: bool) {
    if on {
        bits[step >> 6] |= 1 << (step & 63);
    } else {
        bits[step >> 6] &= !(1 << (step & 63));
    }
}

/// Six-channel live gate recorder.
///
/// # Ports
///
/// **Inputs:** Clock, Reset, Channel CV (offsets the channel knob by volts),
/// Big CV, Delete CV, Bank CV, Clear CV, CV (sampled on write).
///
/// **Outputs:** Gate 1-6 (high while the clock is high on a set step),
/// CV 1-6.
pub struct BigButtonSeq {
    gates: [[GateBits; NUM_BANKS]; NUM_CHANNELS],
    cv: [[[f32; MAX_STEPS]; NUM_BANKS]; NUM_CHANNELS],
    banks: [usize; NUM_CHANNELS],
    channel: usize,
    step: usize,
    history: RunHistory,
    rng: SmallRng,
    pending: Option<PendingOp>,
    clock: SchmittTrigger,
    reset: ButtonTrigger,
    big: ButtonTrigger,
    delete: ButtonTrigger,
    bank: ButtonTrigger,
    clear: ButtonTrigger,
    /// Frames since the last clock edge.
    clock_time: u64,
    /// Frames between the last two clock edges; zero until measured.
    last_period: u64,
    clock_ignore_left: u64,
    clock_ignore_frames: u64,
    light_divider: LightDivider,
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    lights: [f32; NUM_LIGHTS],
}

impl BigButtonSeq {
    pub fn new() -> Self {
        let mut ports = vec![
            PortDefinition::input("clock", "Clock", SignalType::Trigger),
            PortDefinition::input("reset", "Reset", SignalType::Trigger),
            PortDefinition::input("channel", "Channel CV", SignalType::Cv),
            PortDefinition::input("big", "Big CV", SignalType::Trigger),
            PortDefinition::input("delete", "Delete CV", SignalType::Trigger),
            PortDefinition::input("bank", "Bank CV", SignalType::Trigger),
            PortDefinition::input("clear", "Clear CV", SignalType::Trigger),
            PortDefinition::input("cv", "CV", SignalType::Cv),
        ];
        for c in 0..NUM_CHANNELS {
            ports.push(PortDefinition::output(GATE_IDS[c], GATE_NAMES[c], SignalType::Gate));
        }
        for c in 0..NUM_CHANNELS {
            ports.push(PortDefinition::output(CV_IDS[c], CV_NAMES[c], SignalType::Cv));
        }

        let mut module = Self {
            gates: [[[0; WORDS]; NUM_BANKS]; NUM_CHANNELS],
            cv: [[[0.0; MAX_STEPS]; NUM_BANKS]; NUM_CHANNELS],
            banks: [0; NUM_CHANNELS],
            channel: 0,
            step: 0,
            history: RunHistory::Reset,
            rng: SmallRng::seed_from_u64(0),
            pending: None,
            clock: SchmittTrigger::new(),
            reset: ButtonTrigger::new(),
            big: ButtonTrigger::new(),
            delete: ButtonTrigger::new(),
            bank: ButtonTrigger::new(),
            clear: ButtonTrigger::new(),
            clock_time: 0,
            last_period: 0,
            clock_ignore_left: 0,
            clock_ignore_frames: 0,
            light_divider: LightDivider::default(),
            ports,
            parameters: vec![
                ParameterDefinition::choice("channel", "Channel", &CHANNEL_LABELS, 0),
                ParameterDefinition::stepped("length", "Length", 1, MAX_STEPS as i32, 32, ""),
                ParameterDefinition::button("big", "Big Button"),
                ParameterDefinition::button("delete", "Delete"),
                ParameterDefinition::button("bank", "Bank"),
                ParameterDefinition::button("clear", "Clear"),
                ParameterDefinition::button("fill", "Fill"),
                ParameterDefinition::button("reset", "Reset"),
            ],
            lights: [0.0; NUM_LIGHTS],
        };
        module.prepare(44100.0, 0);
        module
    }

    const PORT_CLOCK: usize = 0;
    const PORT_RESET: usize = 1;
    const PORT_CHANNEL: usize = 2;
    const PORT_BIG: usize = 3;
    const PORT_DELETE: usize = 4;
    const PORT_BANK: usize = 5;
    const PORT_CLEAR: usize = 6;
    const PORT_CV: usize = 7;
    const OUT_GATE: usize = 0;
    const OUT_CV: usize = NUM_CHANNELS;

    const PARAM_CHANNEL: usize = 0;
    const PARAM_LENGTH: usize = 1;
    const PARAM_BIG: usize = 2;
    const PARAM_DELETE: usize = 3;
    const PARAM_BANK: usize = 4;
    const PARAM_CLEAR: usize = 5;
    const PARAM_FILL: usize = 6;
    const PARAM_RESET: usize = 7;

    const LIGHT_CHANNEL: usize = 0;
    const LIGHT_STEP: usize = NUM_CHANNELS;
    const LIGHT_BANK: usize = NUM_CHANNELS + 1;
    const LIGHT_PENDING: usize = NUM_CHANNELS + 2;

    pub fn channel(&self) -> usize {
        self.channel
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn bank(&self, channel: usize) -> usize {
        self.banks[channel]
    }

    /// Gate bit of `channel` at `step` in its selected bank.
    pub fn gate(&self, channel: usize, step: usize) -> bool {
        bit(&self.gates[channel][self.banks[channel]], step)
    }

    pub fn cv(&self, channel: usize, step: usize) -> f32 {
        self.cv[channel][self.banks[channel]][step]
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    fn apply_op(&mut self, op: PendingOp) {
        let (c, b, s) = (self.channel, self.banks[self.channel], self.step);
        match op {
            PendingOp::Write(cv) => {
                set_bit(&mut self.gates[c][b], s, true);
                self.cv[c][b][s] = cv;
            }
            PendingOp::Delete => set_bit(&mut self.gates[c][b], s, false),
        }
    }

    /// Writes now, or defers to the next edge when pressed late in the period.
    fn press(&mut self, op: PendingOp) {
        if self.last_period > 0 && self.clock_time * 2 > self.last_period {
            self.pending = Some(op);
        } else {
            self.pending = None;
            self.apply_op(op);
        }
    }

    fn clock_edge(&mut self, length: usize) {
        self.last_period = self.clock_time;
        self.clock_time = 0;
        let mode = BIG_BUTTON_SEQ.seq_modes.first().copied().unwrap_or(RunMode::Fwd);
        self.step = self
            .history
            .advance(self.step, length, mode, 1, None, &mut self.rng)
            .index;
        if let Some(op) = self.pending.take() {
            self.apply_op(op);
        }
    }

    fn restart(&mut self) {
        self.step = 0;
        self.history = RunHistory::Reset;
        self.pending = None;
        self.clock_time = 0;
        self.clock_ignore_left = self.clock_ignore_frames;
    }
}

impl Default for BigButtonSeq {
    fn default() -> Self {
        Self::new()
    }
}

impl DspModule for BigButtonSeq {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "seq.bigbutton",
            name: "Big Button Sequencer",
            category: ModuleCategory::Sequencer,
            description: "Six channel live gate recorder with two banks per channel",
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
        self.clock_ignore_frames = (RESET_CLOCK_IGNORE_SECONDS * sample_rate).round().max(1.0) as u64;
    }

    fn process(
        &mut self,
        inputs: &[&SignalBuffer],
        outputs: &mut [SignalBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        let length = self.parameters[Self::PARAM_LENGTH]
            .as_index(param_or(params, Self::PARAM_LENGTH, 32.0))
            .clamp(1, BIG_BUTTON_SEQ.max_steps);
        let channel_knob = param_or(params, Self::PARAM_CHANNEL, 0.0).round();
        let big_button = param_or(params, Self::PARAM_BIG, 0.0);
        let delete_button = param_or(params, Self::PARAM_DELETE, 0.0);
        let bank_button = param_or(params, Self::PARAM_BANK, 0.0);
        let clear_button = param_or(params, Self::PARAM_CLEAR, 0.0);
        let reset_button = param_or(params, Self::PARAM_RESET, 0.0);
        let fill = param_or(params, Self::PARAM_FILL, 0.0) > 0.5;

        for i in 0..context.block_size {
            let cv_in = input_at(inputs, Self::PORT_CV, i, 0.0);
            let channel_cv = input_at(inputs, Self::PORT_CHANNEL, i, 0.0).round();
            self.channel = (channel_knob + channel_cv).clamp(0.0, (NUM_CHANNELS - 1) as f32) as usize;

            // Buttons and their CV jacks.
            if self.bank.process(bank_button, input_at(inputs, Self::PORT_BANK, i, 0.0)) {
                self.banks[self.channel] ^= 1;
            }
            if self.clear.process(clear_button, input_at(inputs, Self::PORT_CLEAR, i, 0.0)) {
                self.gates[self.channel][self.banks[self.channel]] = [0; WORDS];
                self.pending = None;
            }
            if self.big.process(big_button, input_at(inputs, Self::PORT_BIG, i, 0.0)) {
                self.press(PendingOp::Write(cv_in));
            }
            if self.delete.process(delete_button, input_at(inputs, Self::PORT_DELETE, i, 0.0)) {
                self.press(PendingOp::Delete);
            }

            // Clock, then reset, which supersedes it.
            self.clock_time = self.clock_time.saturating_add(1);
            let edge = self.clock.process(input_at(inputs, Self::PORT_CLOCK, i, 0.0));
            if self.clock_ignore_left > 0 {
                self.clock_ignore_left -= 1;
            } else if edge {
                self.clock_edge(length);
            }
            if self
                .reset
                .process(reset_button, input_at(inputs, Self::PORT_RESET, i, 0.0))
            {
                self.restart();
            }
            if self.step >= length {
                self.step = 0;
            }

            if let Some(op) = self.pending {
                if self.last_period > 0
                    && self.clock_time as f64 > self.last_period as f64 * PENDING_TIMEOUT_RATIO
                {
                    self.pending = None;
                    self.apply_op(op);
                }
            }

            let clock_high = self.clock.is_high();
            for c in 0..NUM_CHANNELS {
                let on = self.gate(c, self.step) || (fill && c == self.channel);
                write_output(outputs, Self::OUT_GATE + c, i, gate_voltage(on && clock_high));
                write_output(outputs, Self::OUT_CV + c, i, self.cv(c, self.step));
            }

            if self.light_divider.tick() {
                for c in 0..NUM_CHANNELS {
                    self.lights[Self::LIGHT_CHANNEL + c] = if c == self.channel { 1.0 } else { 0.0 };
                }
                self.lights[Self::LIGHT_STEP] = if self.gate(self.channel, self.step) { 1.0 } else { 0.0 };
                self.lights[Self::LIGHT_BANK] = self.banks[self.channel] as f32;
                self.lights[Self::LIGHT_PENDING] = if self.pending.is_some() { 1.0 } else { 0.0 };
            }
        }
    }

    fn reset(&mut self) {
        self.restart();
        self.clock_ignore_left = 0;
        self.last_period = 0;
        self.clock.reset();
        self.lights = [0.0; NUM_LIGHTS];
    }

    fn serialize_state(&self) -> Option<Vec<u8>> {
        let mut cv = Vec::with_capacity(NUM_CHANNELS * NUM_BANKS * MAX_STEPS);
        for channel in &self.cv {
            for bank in channel {
                cv.extend_from_slice(bank);
            }
        }
        to_bytes(&BigButtonState {
            channel: self.channel,
            step: self.step,
            banks: self.banks.to_vec(),
            gates: self.gates.to_vec(),
            cv,
        })
    }

    fn deserialize_state(&mut self, data: &[u8]) -> Result<(), ModuleError> {
        let state: BigButtonState = from_bytes(data)?;
        self.channel = state.channel.min(NUM_CHANNELS - 1);
        self.step = state.step.min(MAX_STEPS - 1);
        for (dst, &src) in self.banks.iter_mut().zip(&state.banks) {
            *dst = src.min(NUM_BANKS - 1);
        }
        for (dst, src) in self.gates.iter_mut().zip(&state.gates) {
            *dst = *src;
        }
        let slots = self.cv.iter_mut().flat_map(|c| c.iter_mut()).flat_map(|b| b.iter_mut());
        for (dst, &src) in slots.zip(&state.cv) {
            *dst = src;
        }
        if state.banks.len() > NUM_CHANNELS || state.gates.len() > NUM_CHANNELS {
            log::warn!("big button state has more than {} channels, extra dropped", NUM_CHANNELS);
        }
        self.pending = None;
        Ok(())
    }

    fn lights(&self) -> &[f32] {
        &self.lights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::BIG_BUTTON_SEQ;

    const SR: f32 = 1000.0;

    struct Rig {
        module: BigButtonSeq,
        params: Vec<f32>,
        outputs: Vec<SignalBuffer>,
    }

    impl Rig {
        fn new() -> Self {
            let mut module = BigButtonSeq::new();
            module.prepare(SR, 1);
            let params = module.parameters().iter().map(|p| p.default).collect();
            Self {
                module,
                params,
                outputs: vec![SignalBuffer::gate(1); 2 * NUM_CHANNELS],
            }
        }

        fn frame(&mut self, clock: f32) {
            self.frame_with_cv(clock, 0.0);
        }

        fn frame_with_cv(&mut self, clock: f32, cv: f32) {
            let mut clk = SignalBuffer::trigger(1);
            clk.fill(clock);
            let idle = SignalBuffer::cv(1);
            let mut cv_in = SignalBuffer::cv(1);
            cv_in.fill(cv);
            let inputs = [&clk, &idle, &idle, &idle, &idle, &idle, &idle, &cv_in];
            self.module.process(
                &inputs,
                &mut self.outputs,
                &self.params,
                &ProcessContext::new(SR, 1),
            );
        }

        /// One clock period of `frames` frames, high for the first half.
        fn period(&mut self, frames: usize) {
            for f in 0..frames {
                self.frame(if f < frames / 2 { 10.0 } else { 0.0 });
            }
        }

        fn tap(&mut self, param: usize, clock: f32) {
            self.params[param] = 1.0;
            self.frame(clock);
            self.params[param] = 0.0;
            self.frame(clock);
        }
    }

    #[test]
    fn test_capacities_match_config() {
        assert_eq!(BIG_BUTTON_SEQ.num_tracks, NUM_CHANNELS);
        assert_eq!(BIG_BUTTON_SEQ.max_steps, MAX_STEPS);
        assert_eq!(BIG_BUTTON_SEQ.max_seqs, NUM_BANKS);
    }

    #[test]
    fn test_early_press_writes_current_step() {
        let mut rig = Rig::new();
        rig.period(10);
        rig.period(10);
        assert_eq!(rig.module.step(), 2);
        // First frames of step 3.
        rig.frame(10.0);
        rig.tap(BigButtonSeq::PARAM_BIG, 10.0);
        assert_eq!(rig.module.step(), 3);
        assert!(rig.module.gate(0, 3));
        assert!(!rig.module.has_pending());
        assert_eq!(rig.outputs[0].samples[0], 10.0, "gate follows the clock");
    }

    #[test]
    fn test_late_press_lands_on_next_step() {
        let mut rig = Rig::new();
        rig.period(10);
        rig.period(10);
        rig.frame(10.0);
        for _ in 0..6 {
            rig.frame(0.0);
        }
        rig.tap(BigButtonSeq::PARAM_BIG, 0.0);
        assert!(rig.module.has_pending());
        assert!(!rig.module.gate(0, 3));
        rig.frame(10.0);
        assert_eq!(rig.module.step(), 4);
        assert!(rig.module.gate(0, 4));
        assert!(!rig.module.has_pending());
    }

    #[test]
    fn test_late_press_keeps_cv_from_the_press() {
        let mut rig = Rig::new();
        rig.period(10);
        rig.period(10);
        rig.frame(10.0);
        for _ in 0..6 {
            rig.frame(0.0);
        }
        rig.params[BigButtonSeq::PARAM_BIG] = 1.0;
        rig.frame_with_cv(0.0, 2.5);
        rig.params[BigButtonSeq::PARAM_BIG] = 0.0;
        assert!(rig.module.has_pending());
        rig.frame_with_cv(0.0, -1.0);
        rig.frame_with_cv(10.0, -1.0);
        assert_eq!(rig.module.step(), 4);
        assert!(rig.module.gate(0, 4));
        assert_eq!(rig.module.cv(0, 4), 2.5);
    }

    #[test]
    fn test_steps_through_forward_run_history() {
        let mut rig = Rig::new();
        rig.params[BigButtonSeq::PARAM_LENGTH] = 2.0;
        rig.period(4);
        assert_eq!(rig.module.step(), 1);
        assert_eq!(rig.module.history, RunHistory::Forward { reps_left: 1 });
        rig.period(4);
        assert_eq!(rig.module.step(), 0);
        assert_eq!(rig.module.history, RunHistory::Forward { reps_left: 0 });
        rig.tap(BigButtonSeq::PARAM_RESET, 0.0);
        assert_eq!(rig.module.history, RunHistory::Reset);
    }

    #[test]
    fn test_pending_times_out_without_clock() {
        let mut rig = Rig::new();
        rig.period(10);
        rig.period(10);
        rig.frame(10.0);
        rig.tap(BigButtonSeq::PARAM_BIG, 10.0);
        assert!(rig.module.gate(0, 3));
        for _ in 0..6 {
            rig.frame(0.0);
        }
        rig.tap(BigButtonSeq::PARAM_DELETE, 0.0);
        assert!(rig.module.has_pending());
        for _ in 0..4 {
            rig.frame(0.0);
        }
        assert!(!rig.module.has_pending(), "applied once 1% past the period");
        assert_eq!(rig.module.step(), 3);
        assert!(!rig.module.gate(0, 3));
    }

    #[test]
    fn test_bank_clear_and_fill() {
        let mut rig = Rig::new();
        rig.tap(BigButtonSeq::PARAM_BIG, 0.0);
        assert!(rig.module.gate(0, 0));
        rig.tap(BigButtonSeq::PARAM_BANK, 0.0);
        assert_eq!(rig.module.bank(0), 1);
        assert!(!rig.module.gate(0, 0), "other bank is empty");
        rig.tap(BigButtonSeq::PARAM_BANK, 0.0);
        rig.tap(BigButtonSeq::PARAM_CLEAR, 0.0);
        assert!(!rig.module.gate(0, 0));

        rig.params[BigButtonSeq::PARAM_CHANNEL] = 2.0;
        rig.params[BigButtonSeq::PARAM_FILL] = 1.0;
        rig.frame(10.0);
        assert_eq!(rig.module.channel(), 2);
        assert_eq!(rig.outputs[2].samples[0], 10.0);
        assert_eq!(rig.outputs[0].samples[0], 0.0);
    }

    #[test]
    fn test_length_wraps_and_reset_ignores_clock() {
        let mut rig = Rig::new();
        rig.params[BigButtonSeq::PARAM_LENGTH] = 3.0;
        for _ in 0..4 {
            rig.period(4);
        }
        assert_eq!(rig.module.step(), 1);
        rig.params[BigButtonSeq::PARAM_RESET] = 1.0;
        rig.frame(0.0);
        rig.params[BigButtonSeq::PARAM_RESET] = 0.0;
        assert_eq!(rig.module.step(), 0);
        rig.frame(10.0);
        assert_eq!(rig.module.step(), 0, "edge inside the ignore window");
    }

    #[test]
    fn test_state_round_trip() {
        let mut rig = Rig::new();
        rig.params[BigButtonSeq::PARAM_CHANNEL] = 4.0;
        rig.params[BigButtonSeq::PARAM_LENGTH] = 128.0;
        rig.period(10);
        rig.tap(BigButtonSeq::PARAM_BANK, 0.0);
        for _ in 0..70 {
            rig.period(4);
        }
        rig.frame(10.0);
        rig.tap(BigButtonSeq::PARAM_BIG, 10.0);
        let step = rig.module.step();
        assert!(step >= 64);

        let blob = rig.module.serialize_state().unwrap();
        let mut restored = BigButtonSeq::new();
        restored.deserialize_state(&blob).unwrap();
        assert_eq!(restored.bank(4), 1);
        assert!(restored.gate(4, step));
        assert_eq!(restored.step(), step);
        assert!(restored.deserialize_state(b"{}").is_ok());
    }
}
