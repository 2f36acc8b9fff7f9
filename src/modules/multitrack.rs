//! Four-track sequencer module.
//!
//! Wraps the multi-track kernel: each track has its own sequences and song,
//! and tracks set to TKA follow track 1's position.

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
use crate::sequencer::{Sequencer, MULTI_TRACK};

use super::seq_core::{SeqCore, TransportInput};

/// Number of tracks.
pub const NUM_TRACKS: usize = 4;

const NUM_LIGHTS: usize = 2 + NUM_TRACKS;

static CV_IDS: [&str; NUM_TRACKS] = ["cv_1", "cv_2", "cv_3", "cv_4"];
static CV_NAMES: [&str; NUM_TRACKS] = ["CV 1", "CV 2", "CV 3", "CV 4"];
static GATE_IDS: [&str; NUM_TRACKS] = ["gate_1", "gate_2", "gate_3", "gate_4"];
static GATE_NAMES: [&str; NUM_TRACKS] = ["Gate 1", "Gate 2", "Gate 3", "Gate 4"];
static VEL_IDS: [&str; NUM_TRACKS] = ["vel_1", "vel_2", "vel_3", "vel_4"];
static VEL_NAMES: [&str; NUM_TRACKS] = ["Velocity 1", "Velocity 2", "Velocity 3", "Velocity 4"];

static PPS_LABELS: [&str; 15] = [
    "1", "2", "4", "6", "8", "10", "12", "14", "16", "18", "20", "22", "24", "48", "96",
];

/// A four-track step sequencer with songs, velocity and track following.
///
/// # Ports
///
/// **Inputs:** Clock, Reset, Run.
///
/// **Outputs:** CV, Gate and Velocity for each of the four tracks.
///
/// # Parameters
///
/// - **Run** / **Reset** (buttons)
/// - **Pulses/Step**: clock pulses per step, shared by every track
/// - **Hold Ties**: tied steps keep the gate open
/// - **Reset on Run**: starting the transport restarts the cursors
pub struct MultiTrackSeq {
    core: SeqCore,
    ports: Vec<PortDefinition>,
    parameters: Vec<ParameterDefinition>,
    lights: [f32; NUM_LIGHTS],
}

impl MultiTrackSeq {
    pub fn new() -> Self {
        let mut ports = vec![
            PortDefinition::input("clock", "Clock", SignalType::Trigger),
            PortDefinition::input("reset", "Reset", SignalType::Trigger),
            PortDefinition::input("run", "Run", SignalType::Trigger),
        ];
        for t in 0..NUM_TRACKS {
            ports.push(PortDefinition::output(CV_IDS[t], CV_NAMES[t], SignalType::Cv));
        }
        for t in 0..NUM_TRACKS {
            ports.push(PortDefinition::output(GATE_IDS[t], GATE_NAMES[t], SignalType::Gate));
        }
        for t in 0..NUM_TRACKS {
            ports.push(PortDefinition::output(VEL_IDS[t], VEL_NAMES[t], SignalType::Cv));
        }

        Self {
            core: SeqCore::new(&MULTI_TRACK),
            ports,
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
    const OUT_CV: usize = 0;
    const OUT_GATE: usize = NUM_TRACKS;
    const OUT_VELOCITY: usize = 2 * NUM_TRACKS;

    const PARAM_RUN: usize = 0;
    const PARAM_RESET: usize = 1;
    const PARAM_PPS: usize = 2;
    const PARAM_HOLD: usize = 3;
    const PARAM_RESET_ON_RUN: usize = 4;

    const LIGHT_RUN: usize = 0;
    const LIGHT_GATE: usize = 1;
    const LIGHT_WARNING: usize = 1 + NUM_TRACKS;

    /// Creates the edit queue; the returned handle belongs to the control
    /// thread.
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

    fn update_lights(&mut self) {
        self.lights[Self::LIGHT_RUN] = if self.core.is_running() { 1.0 } else { 0.0 };
        for t in 0..NUM_TRACKS {
            let frame = self.core.track_frame(t);
            self.lights[Self::LIGHT_GATE + t] = if frame.gate { 1.0 } else { 0.0 };
        }
        self.lights[Self::LIGHT_WARNING] = if self.core.warning_active() { 1.0 } else { 0.0 };
    }
}

impl Default for MultiTrackSeq {
    fn default() -> Self {
        Self::new()
    }
}

impl DspModule for MultiTrackSeq {
    fn info(&self) -> &ModuleInfo {
        static INFO: ModuleInfo = ModuleInfo {
            id: "seq.multitrack",
            name: "Multi-Track Sequencer",
            category: ModuleCategory::Sequencer,
            description: "Four tracks of 32-step sequences with songs and velocity",
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

        for i in 0..context.block_size {
            self.core.process_transport(TransportInput {
                clock: input_at(inputs, Self::PORT_CLOCK, i, 0.0),
                reset_cv: input_at(inputs, Self::PORT_RESET, i, 0.0),
                reset_button,
                run_cv: input_at(inputs, Self::PORT_RUN, i, 0.0),
                run_button,
            });

            for t in 0..NUM_TRACKS {
                let frame = self.core.track_frame(t);
                write_output(outputs, Self::OUT_CV + t, i, frame.cv);
                write_output(outputs, Self::OUT_GATE + t, i, gate_voltage(frame.gate));
                write_output(outputs, Self::OUT_VELOCITY + t, i, frame.velocity);
            }

            if self.core.end_frame() {
                self.update_lights();
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
    use crate::engine::SequencerEvent;
    use crate::sequencer::RunMode;

    const BLOCK: usize = 8;

    fn params(module: &MultiTrackSeq) -> Vec<f32> {
        module.parameters().iter().map(|p| p.default).collect()
    }

    fn outputs() -> Vec<SignalBuffer> {
        vec![SignalBuffer::cv(BLOCK); 3 * NUM_TRACKS]
    }

    /// Runs one block with the clock high for the first half.
    fn clock_block(module: &mut MultiTrackSeq, outputs: &mut [SignalBuffer]) {
        let mut clock = SignalBuffer::trigger(BLOCK);
        clock.samples[..BLOCK / 2].fill(10.0);
        let params = params(module);
        let ctx = ProcessContext::new(1000.0, BLOCK);
        module.process(&[&clock], outputs, &params, &ctx);
    }

    #[test]
    fn test_info_and_ports() {
        let module = MultiTrackSeq::new();
        assert_eq!(module.info().id, "seq.multitrack");
        assert_eq!(module.info().category, ModuleCategory::Sequencer);
        assert_eq!(module.ports().len(), 3 + 3 * NUM_TRACKS);
        assert!(module.ports()[0].is_input());
        assert_eq!(module.ports()[3].id, "cv_1");
        assert_eq!(module.ports()[7].id, "gate_1");
        assert_eq!(module.parameters()[MultiTrackSeq::PARAM_PPS].max, 14.0);
    }

    #[test]
    fn test_tracks_step_together() {
        let mut module = MultiTrackSeq::new();
        module.prepare(1000.0, BLOCK);
        module.apply_edit(EditCommand::SelectStep(1));
        module.apply_edit(EditCommand::WriteCv {
            value: 0.5,
            multi_tracks: true,
            count: 1,
        });
        let mut outs = outputs();
        clock_block(&mut module, &mut outs);
        for t in 0..NUM_TRACKS {
            assert_eq!(module.sequencer().track(t).step_index_run(), 1);
            assert_eq!(outs[MultiTrackSeq::OUT_CV + t].samples[0], 0.5);
            assert_eq!(outs[MultiTrackSeq::OUT_GATE + t].samples[0], 10.0);
            assert_eq!(outs[MultiTrackSeq::OUT_GATE + t].samples[BLOCK - 1], 0.0);
            assert_eq!(outs[MultiTrackSeq::OUT_VELOCITY + t].samples[0], 5.0);
        }
    }

    #[test]
    fn test_follower_track_reads_master_position() {
        let mut module = MultiTrackSeq::new();
        module.prepare(1000.0, BLOCK);
        module.apply_edit(EditCommand::SetLength {
            length: 3,
            multi_tracks: false,
        });
        module.apply_edit(EditCommand::SelectTrack(2));
        module.apply_edit(EditCommand::SetRunModeSeq {
            mode: RunMode::Tka,
            multi_tracks: false,
        });
        let mut outs = outputs();
        for _ in 0..4 {
            clock_block(&mut module, &mut outs);
        }
        let master = module.sequencer().track(0).step_index_run();
        assert_eq!(master, 1);
        assert_eq!(module.sequencer().track(2).step_index_run(), master);
        assert_eq!(module.sequencer().track(1).step_index_run(), 4);
    }

    #[test]
    fn test_edits_arrive_through_queue() {
        let mut module = MultiTrackSeq::new();
        let mut control = module.connect_edits();
        control
            .send(EditCommand::SetPulsesPerStep {
                pps: 2,
                multi_tracks: true,
            })
            .unwrap();
        let mut outs = outputs();
        clock_block(&mut module, &mut outs);
        assert_eq!(module.sequencer().track(3).pulses_per_step(), 2);
        assert_eq!(module.sequencer().track(0).step_index_run(), 0);
        clock_block(&mut module, &mut outs);
        assert_eq!(module.sequencer().track(0).step_index_run(), 1);
        assert!(control.recv_event().is_none(), "positions wait for the light cadence");
        let mut long = vec![SignalBuffer::cv(256); 3 * NUM_TRACKS];
        let params = params(&module);
        module.process(&[], &mut long, &params, &ProcessContext::new(1000.0, 256));
        assert!(matches!(
            control.recv_event(),
            Some(SequencerEvent::PlayPosition { track: 0, step: 1, .. })
        ));
    }

    #[test]
    fn test_state_round_trip() {
        let mut module = MultiTrackSeq::new();
        module.apply_edit(EditCommand::SelectTrack(3));
        module.apply_edit(EditCommand::SetVelocity {
            value: 40,
            multi_tracks: false,
            count: 4,
        });
        module.apply_edit(EditCommand::SetDelay {
            delay: 2,
            multi_tracks: false,
        });
        let blob = module.serialize_state().expect("state");

        let mut restored = MultiTrackSeq::new();
        restored.deserialize_state(&blob).unwrap();
        assert_eq!(restored.sequencer().track(3).attributes(0, 3).velocity(), 40);
        assert_eq!(restored.sequencer().track(3).delay(), 2);
        assert_eq!(restored.sequencer().track_index_edit(), 3);
        assert!(restored.deserialize_state(b"not json").is_err());
    }

    #[test]
    fn test_lights_refresh_at_divider_cadence() {
        let mut module = MultiTrackSeq::new();
        let mut outs = vec![SignalBuffer::cv(256); 3 * NUM_TRACKS];
        let params = params(&module);
        let ctx = ProcessContext::new(44100.0, 256);
        module.process(&[], &mut outs, &params, &ctx);
        assert_eq!(module.lights()[MultiTrackSeq::LIGHT_RUN], 1.0);
        module.reset();
        assert_eq!(module.lights()[MultiTrackSeq::LIGHT_RUN], 0.0);
    }
}
