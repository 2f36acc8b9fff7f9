//! Phrase sequencer modules.
//!
//! One track of the kernel with the 24-unit gate table and two gate lanes.
//! `PhraseSeq16` and `PhraseSeq32` differ only in capacities; the
//! semi-modular voice uses the 16-step layout.

use crate::dsp::{
    context::ProcessContext,
    module_trait::{DspModule, ModuleCategory, ModuleError, ModuleInfo},
    parameter::{param_or, ParameterDefinition},
    port::PortDefinition,
    signal::{gate_voltage, input_at, write_output, SignalBuffer},
    SignalType,
};
use crate::engine::{ControlHandle, EditCommand};
use crate::persistence::schema::{from_bytes, to_bytes, SeqModuleState, SequencerState};
use crate::sequencer::{KernelConfig, Sequencer, PHRASE_SEQ_16, PHRASE_SEQ_32};

use super::seq_core::{SeqCore, TransportInput};

static PPS_LABELS: [&str; 13] = [
    "1", "2", "4", "6", "8", "10", "12", "14", "16", "18", "20", "22", "24",
];

static INFO_16: ModuleInfo = ModuleInfo {
    id: "seq.phrase16",
    name: "Phrase Sequencer 16",
    category: ModuleCategory::Sequencer,
    description: "16 sequences of 16 steps chained into a song, two gates per step",
};

static INFO_32: ModuleInfo = ModuleInfo {
    id: "seq.phrase32",
    name: "Phrase Sequencer 32",
    category: ModuleCategory::Sequencer,
    description: "32 sequences of 32 steps chained into a song, two gates per step",
};

/// 16-step variant.
pub type PhraseSeq16 = PhraseSeq<16>;
/// 32-step variant.
pub type PhraseSeq32 = PhraseSeq<32>;

const NUM_LIGHTS: usize = 4;

/// A single-track phrase sequencer with `STEPS` steps per sequence.
///
/// # Ports
///
/// **Inputs:** Clock, Reset, Run, Seq CV (0-10 V selects the played
/// sequence while in sequence mode).
///
/// **Outputs:** CV, Gate 1, Gate 2.
pub struct PhraseSeq<const STEPS: usize> {
    core: SeqCore,
    info: &'static ModuleInfo,
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    lights: [f32; NUM_LIGHTS],
}

impl<const STEPS: usize> PhraseSeq<STEPS> {
    fn with_config(config: &'static KernelConfig, info: &'static ModuleInfo) -> Self {
        debug_assert_eq!(config.max_steps, STEPS);
        Self {
            core: SeqCore::new(config),
            info,
            ports: vec![
                PortDefinition::input("clock", "Clock", SignalType::Trigger),
                PortDefinition::input("reset", "Reset", SignalType::Trigger),
                PortDefinition::input("run", "Run", SignalType::Trigger),
                PortDefinition::input("seq_cv", "Seq CV", SignalType::Cv),
                PortDefinition::output("cv", "CV", SignalType::Cv),
                PortDefinition::output("gate_1", "Gate 1", SignalType::Gate),
                PortDefinition::output("gate_2", "Gate 2", SignalType::Gate),
            ],
            parameters: vec![
                ParameterDefinition::button("run", "Run"),
                ParameterDefinition::button("reset", "Reset"),
                ParameterDefinition::choice("pps", "Pulses/Step", &PPS_LABELS, 0),
                ParameterDefinition::toggle("hold", "Hold Ties", true),
                ParameterDefinition::toggle("reset_on_run", "Reset on Run", true),
            ],
            lights: [0.0; NUM_LIGHTS],
        }
    }

    const PORT_CLOCK: usize = 0;
    const PORT_RESET: usize = 1;
    const PORT_RUN: usize = 2;
    const PORT_SEQ_CV: usize = 3;
    const OUT_CV: usize = 0;
    const OUT_GATE1: usize = 1;
    const OUT_GATE2: usize = 2;

    const PARAM_RUN: usize = 0;
    const PARAM_RESET: usize = 1;
    const PARAM_PPS: usize = 2;
    const PARAM_HOLD: usize = 3;
    const PARAM_RESET_ON_RUN: usize = 4;

    const LIGHT_RUN: usize = 0;
    const LIGHT_GATE1: usize = 1;
    const LIGHT_GATE2: usize = 2;
    const LIGHT_WARNING: usize = 3;

    pub fn connect_edits(&mut self) -> ControlHandle {
        self.core.connect_edits()
    }

    /// Applies an edit directly; returns true if it was refused.
    pub fn apply_edit(&mut self, cmd: EditCommand) -> bool {
        self.core.apply_edit(cmd)
    }

    pub fn sequencer(&self) -> &Sequencer {
        &self.core.sequencer
    }

    pub fn is_running(&self) -> bool {
        self.core.is_running()
    }

    /// Sequence picked by a 0-10 V selector voltage.
    fn seq_from_cv(&self, volts: f32) -> usize {
        let max = self.core.sequencer.config().max_seqs.saturating_sub(1) as f32;
        (volts / 10.0 * max).round().clamp(0.0, max) as usize
    }
}

impl Default for PhraseSeq<16> {
    fn default() -> Self {
        Self::with_config(&PHRASE_SEQ_16, &INFO_16)
    }
}

impl Default for PhraseSeq<32> {
    fn default() -> Self {
        Self::with_config(&PHRASE_SEQ_32, &INFO_32)
    }
}

impl<const STEPS: usize> DspModule for PhraseSeq<STEPS> {
    fn info(&self) -> &ModuleInfo {
        self.info
    }

    fn ports(&self) -> &[PortDefinition] {
        &self.ports
    }

    fn parameters(&self) -> &[ParameterDefinition] {
        &self.parameters
    }

    fn prepare(&mut self, sample_rate: f32, _max_block_size: usize) {
        self.core.prepare(sample_rate);
    }

    fn process(
        &mut self,
        inputs: &[&SignalBuffer],
        outputs: &mut [SignalBuffer],
        params: &[f32],
        context: &ProcessContext,
    ) {
        let pps = &self.parameters[Self::PARAM_PPS];
        let pps_index = pps.as_index(param_or(params, Self::PARAM_PPS, pps.default));
        self.core.apply_settings(
            pps_index,
            param_or(params, Self::PARAM_HOLD, 1.0) > 0.5,
            param_or(params, Self::PARAM_RESET_ON_RUN, 1.0) > 0.5,
        );
        self.core.drain_edits();

        let run_button = param_or(params, Self::PARAM_RUN, 0.0);
        let reset_button = param_or(params, Self::PARAM_RESET, 0.0);
        let seq_cv_patched = inputs.len() > Self::PORT_SEQ_CV;

        for i in 0..context.block_size {
            if seq_cv_patched && self.core.sequencer.editing_sequence() {
                let seq = self.seq_from_cv(input_at(inputs, Self::PORT_SEQ_CV, i, 0.0));
                self.core.sequencer.set_seq_index_edit(seq, false);
            }

            self.core.process_transport(TransportInput {
                clock: input_at(inputs, Self::PORT_CLOCK, i, 0.0),
                reset_cv: input_at(inputs, Self::PORT_RESET, i, 0.0),
                reset_button,
                run_cv: input_at(inputs, Self::PORT_RUN, i, 0.0),
                run_button,
            });

            let frame = self.core.track_frame(0);
            write_output(outputs, Self::OUT_CV, i, frame.cv);
            write_output(outputs, Self::OUT_GATE1, i, gate_voltage(frame.gate));
            write_output(outputs, Self::OUT_GATE2, i, gate_voltage(frame.gate2));

            if self.core.end_frame() {
                self.lights[Self::LIGHT_RUN] = if self.core.is_running() { 1.0 } else { 0.0 };
                self.lights[Self::LIGHT_GATE1] = if frame.gate { 1.0 } else { 0.0 };
                self.lights[Self::LIGHT_GATE2] = if frame.gate2 { 1.0 } else { 0.0 };
                self.lights[Self::LIGHT_WARNING] =
                    if self.core.warning_active() { 1.0 } else { 0.0 };
            }
        }
    }

    fn reset(&mut self) {
        self.core.reset();
        self.lights = [0.0; NUM_LIGHTS];
    }

    fn serialize_state(&self) -> Option<Vec<u8>> {
        to_bytes(&SeqModuleState {
            sequencer: SequencerState::capture(&self.core.sequencer),
            running: self.core.running,
            reset_on_run: self.core.reset_on_run,
        })
    }

    fn deserialize_state(&mut self, data: &[u8]) -> Result<(), ModuleError> {
        let state: SeqModuleState = from_bytes(data)?;
        state.sequencer.restore(&mut self.core.sequencer);
        self.core.running = state.running;
        self.core.reset_on_run = state.reset_on_run;
        Ok(())
    }

    fn lights(&self) -> &[f32] {
        &self.lights
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StepFlag;
    use crate::sequencer::{GateMode, RunMode};

    const BLOCK: usize = 8;

    fn run_block(module: &mut PhraseSeq16, inputs: &[&SignalBuffer]) -> Vec<SignalBuffer> {
        let params: Vec<f32> = module.parameters().iter().map(|p| p.default).collect();
        let mut outputs = vec![SignalBuffer::cv(BLOCK); 3];
        module.process(inputs, &mut outputs, &params, &ProcessContext::new(1000.0, BLOCK));
        outputs
    }

    fn clock_buffer() -> SignalBuffer {
        let mut clock = SignalBuffer::trigger(BLOCK);
        clock.samples[..BLOCK / 2].fill(10.0);
        clock
    }

    #[test]
    fn test_variants() {
        let short = PhraseSeq16::default();
        let long = PhraseSeq32::default();
        assert_eq!(short.info().id, "seq.phrase16");
        assert_eq!(long.info().id, "seq.phrase32");
        assert_eq!(short.sequencer().config().max_steps, 16);
        assert_eq!(long.sequencer().config().max_seqs, 32);
        assert_eq!(short.parameters()[2].max, 12.0);
        assert!(short.sequencer().config().allows_seq_mode(RunMode::Fw2));
    }

    #[test]
    fn test_gate2_lane_uses_its_own_mode() {
        let mut module = PhraseSeq16::default();
        module.prepare(1000.0, BLOCK);
        module.apply_edit(EditCommand::SetPulsesPerStep {
            pps: 4,
            multi_tracks: false,
        });
        module.apply_edit(EditCommand::SetGate2Mode {
            mode: GateMode::Quarter,
            multi_tracks: false,
            count: 16,
        });
        let clock = clock_buffer();
        let mut gates = Vec::new();
        for _ in 0..4 {
            let out = run_block(&mut module, &[&clock]);
            gates.push((out[1].samples[0], out[2].samples[0]));
        }
        assert_eq!(module.sequencer().track(0).step_index_run(), 1);
        assert!(gates.iter().all(|&(g1, _)| g1 == 10.0), "FULL gate holds all pulses");
        // Edges land on pulses 1, 2 and 3 of step 0, then pulse 0 of step 1.
        assert!(gates[..3].iter().all(|&(_, g2)| g2 == 0.0), "25% gate closes after 1/4");
        assert_eq!(gates[3].1, 10.0);
    }

    #[test]
    fn test_seq_cv_selects_sequence() {
        let mut module = PhraseSeq16::default();
        let clock = SignalBuffer::trigger(BLOCK);
        let reset = SignalBuffer::trigger(BLOCK);
        let run = SignalBuffer::trigger(BLOCK);
        let mut seq_cv = SignalBuffer::cv(BLOCK);
        seq_cv.fill(10.0);
        run_block(&mut module, &[&clock, &reset, &run, &seq_cv]);
        assert_eq!(module.sequencer().seq_index_edit(), 15);

        module.apply_edit(EditCommand::SetEditingSequence(false));
        seq_cv.fill(0.0);
        run_block(&mut module, &[&clock, &reset, &run, &seq_cv]);
        assert_eq!(module.sequencer().seq_index_edit(), 15, "ignored in song mode");
    }

    #[test]
    fn test_hold_ties_keeps_gate_open_across_steps() {
        let mut module = PhraseSeq16::default();
        module.prepare(1000.0, BLOCK);
        module.apply_edit(EditCommand::SelectStep(2));
        module.apply_edit(EditCommand::Toggle {
            flag: StepFlag::Tied,
            multi_tracks: false,
            count: 1,
        });
        let clock = clock_buffer();
        let out = run_block(&mut module, &[&clock]);
        assert_eq!(module.sequencer().track(0).step_index_run(), 1);
        assert_eq!(out[1].samples[BLOCK - 1], 10.0, "origin holds past the clock");
        let out = run_block(&mut module, &[&clock]);
        assert_eq!(module.sequencer().track(0).step_index_run(), 2);
        assert_eq!(out[1].samples[0], 10.0);
    }

    #[test]
    fn test_song_mode_plays_phrases() {
        let mut module = PhraseSeq16::default();
        module.apply_edit(EditCommand::SelectSequence {
            seq: 1,
            multi_tracks: false,
        });
        module.apply_edit(EditCommand::SetLength {
            length: 2,
            multi_tracks: false,
        });
        module.apply_edit(EditCommand::WriteCv {
            value: 2.0,
            multi_tracks: false,
            count: 2,
        });
        module.apply_edit(EditCommand::SelectPhrase(0));
        module.apply_edit(EditCommand::SetPhraseSeq {
            seq: 1,
            multi_tracks: false,
        });
        module.apply_edit(EditCommand::SetEditingSequence(false));
        module.apply_edit(EditCommand::InitRun);
        let out = run_block(&mut module, &[&clock_buffer()]);
        assert_eq!(out[0].samples[0], 2.0);
    }

    #[test]
    fn test_state_round_trip() {
        let mut module = PhraseSeq32::default();
        module.apply_edit(EditCommand::SelectStep(20));
        module.apply_edit(EditCommand::WriteCv {
            value: -1.0,
            multi_tracks: false,
            count: 1,
        });
        module.apply_edit(EditCommand::SetRunModeSeq {
            mode: RunMode::Fw3,
            multi_tracks: false,
        });
        let blob = module.serialize_state().unwrap();
        let mut restored = PhraseSeq32::default();
        restored.deserialize_state(&blob).unwrap();
        assert_eq!(restored.sequencer().track(0).cv(0, 20), -1.0);
        assert_eq!(restored.sequencer().track(0).run_mode_seq(0), RunMode::Fw3);
    }
}
