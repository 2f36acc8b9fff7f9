//! Playback loop shared by the kernel-based sequencer modules.
//!
//! Each frame runs in a fixed order: edge triggers, clock, reset, outputs,
//! lights. Pending edits are drained once at the start of the block.

use crate::dsp::{ButtonTrigger, LightDivider, PulseTimer, SchmittTrigger};
use crate::engine::{AudioHandle, ControlHandle, EditChannels, EditCommand, SequencerEvent};
use crate::sequencer::{KernelConfig, Sequencer, EDITING_GATE_SECONDS};

/// Length of a trigger-mode gate.
pub const TRIGGER_SECONDS: f32 = 0.01;

/// Clock edges are ignored this long after a reset.
pub const RESET_CLOCK_IGNORE_SECONDS: f32 = 0.001;

/// Length of the warning flash after a refused edit.
pub const WARNING_SECONDS: f32 = 0.5;

/// Raw transport voltages for one frame.
#[derive(Clone, Copy, Debug, Default)]
pub struct TransportInput {
    pub clock: f32,
    pub reset_cv: f32,
    pub reset_button: f32,
    pub run_cv: f32,
    pub run_button: f32,
}

/// Output voltages of one track for one frame.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TrackFrame {
    pub cv: f32,
    pub gate: bool,
    pub gate2: bool,
    pub velocity: f32,
}

/// Transport, triggers, edit queue and lights around a [`Sequencer`].
pub struct SeqCore {
    pub(crate) sequencer: Sequencer,
    clock: SchmittTrigger,
    reset: ButtonTrigger,
    run: ButtonTrigger,
    pub(crate) running: bool,
    pub(crate) reset_on_run: bool,
    clock_high: bool,
    clock_ignore_left: u64,
    clock_ignore_frames: u64,
    trigger_frames: u64,
    triggers: Box<[PulseTimer]>,
    trigger_active: Box<[bool]>,
    warning: PulseTimer,
    warning_frames: u64,
    editing_gate_frames: u64,
    light_divider: LightDivider,
    edits: Option<AudioHandle>,
    last_pps_index: Option<usize>,
    last_hold: Option<bool>,
}

impl SeqCore {
    pub fn new(config: &'static KernelConfig) -> Self {
        let sequencer = Sequencer::new(config);
        let tracks = sequencer.num_tracks();
        let mut core = Self {
            sequencer,
            clock: SchmittTrigger::new(),
            reset: ButtonTrigger::new(),
            run: ButtonTrigger::new(),
            running: true,
            reset_on_run: true,
            clock_high: false,
            clock_ignore_left: 0,
            clock_ignore_frames: 0,
            trigger_frames: 0,
            triggers: vec![PulseTimer::new(); tracks].into_boxed_slice(),
            trigger_active: vec![false; tracks].into_boxed_slice(),
            warning: PulseTimer::new(),
            warning_frames: 0,
            editing_gate_frames: 0,
            light_divider: LightDivider::default(),
            edits: None,
            last_pps_index: None,
            last_hold: None,
        };
        core.prepare(44100.0);
        core
    }

    pub fn prepare(&mut self, sample_rate: f32) {
        let frames = |seconds: f32| (seconds * sample_rate).round().max(1.0) as u64;
        self.clock_ignore_frames = frames(RESET_CLOCK_IGNORE_SECONDS);
        self.trigger_frames = frames(TRIGGER_SECONDS);
        self.warning_frames = frames(WARNING_SECONDS);
        self.editing_gate_frames = frames(EDITING_GATE_SECONDS);
    }

    /// Creates the edit queue and returns its control side. A previously
    /// connected queue is replaced.
    pub fn connect_edits(&mut self) -> ControlHandle {
        let (control, audio) = EditChannels::with_defaults().split();
        self.edits = Some(audio);
        control
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Applies queued edits. Note entry while stopped opens the preview gate.
    pub fn drain_edits(&mut self) {
        let Some(mut edits) = self.edits.take() else {
            return;
        };
        while let Some(cmd) = edits.recv_command() {
            if self.apply_edit(cmd) {
                edits.send_event_lossy(SequencerEvent::EditRejected);
            }
        }
        self.edits = Some(edits);
    }

    /// Applies one edit; returns true if it was refused.
    pub fn apply_edit(&mut self, cmd: EditCommand) -> bool {
        if cmd == EditCommand::ManualStep {
            self.step(false);
            return false;
        }
        let rejected = cmd.apply(&mut self.sequencer);
        if rejected {
            self.warning.fire(self.warning_frames);
        }
        let note_entry = matches!(
            cmd,
            EditCommand::WriteCv { .. }
                | EditCommand::SetOctave { .. }
                | EditCommand::SetKey { .. }
                | EditCommand::RandomizeCv { .. }
        );
        if note_entry && !self.running {
            let cv = self.sequencer.current_cv();
            self.sequencer.start_editing_gate(self.editing_gate_frames, cv);
        }
        rejected
    }

    /// Picks up panel settings that map onto sequencer settings. A knob's
    /// first reading is only recorded so restored state is not overwritten.
    pub fn apply_settings(&mut self, pps_index: usize, hold: bool, reset_on_run: bool) {
        self.reset_on_run = reset_on_run;
        if self.last_pps_index.is_some_and(|last| last != pps_index) {
            let pps = self.sequencer.config().pps_at(pps_index);
            self.sequencer.set_pulses_per_step(pps, true);
        }
        self.last_pps_index = Some(pps_index);
        if self.last_hold.is_some_and(|last| last != hold) {
            self.sequencer.set_hold_tied_notes(hold);
        }
        self.last_hold = Some(hold);
    }

    fn step(&mut self, real_edge: bool) {
        let triggers = &mut self.triggers;
        let trigger_frames = self.trigger_frames;
        let mut phrase_changed = 0u32;
        self.sequencer.clock_step(real_edge, |track, outcome| {
            if outcome.step_entered {
                if let Some(timer) = triggers.get_mut(track) {
                    timer.fire(trigger_frames);
                }
            }
            if outcome.phrase_changed && track < 32 {
                phrase_changed |= 1 << track;
            }
        });
        if phrase_changed == 0 {
            return;
        }
        if let Some(edits) = self.edits.as_mut() {
            let tracks = self.sequencer.num_tracks();
            for track in (0..tracks).filter(|&t| phrase_changed & (1 << t) != 0) {
                edits.send_event_lossy(SequencerEvent::PhraseChanged {
                    track,
                    phrase: self.sequencer.track(track).phrase_index_run(),
                });
            }
        }
    }

    fn restart(&mut self) {
        self.sequencer.init_run();
        self.clock_ignore_left = self.clock_ignore_frames;
        for timer in self.triggers.iter_mut() {
            timer.cancel();
        }
    }

    /// Runs the transport for one frame: edges, clock, reset.
    pub fn process_transport(&mut self, input: TransportInput) {
        let clock_edge = self.clock.process(input.clock);
        let reset_edge = self.reset.process(input.reset_button, input.reset_cv);
        let run_edge = self.run.process(input.run_button, input.run_cv);
        self.clock_high = self.clock.is_high();

        if run_edge {
            self.running = !self.running;
            if self.running && self.reset_on_run {
                self.restart();
            }
            if let Some(edits) = self.edits.as_mut() {
                edits.send_event_lossy(SequencerEvent::Running(self.running));
            }
        }

        let clock_ignored = self.clock_ignore_left > 0;
        self.clock_ignore_left = self.clock_ignore_left.saturating_sub(1);
        if reset_edge {
            self.restart();
        } else if clock_edge && self.running && !clock_ignored {
            self.step(true);
        }

        for (active, timer) in self.trigger_active.iter_mut().zip(self.triggers.iter_mut()) {
            *active = timer.process();
        }
    }

    /// Output voltages of `track` for the current frame.
    pub fn track_frame(&self, track: usize) -> TrackFrame {
        let sequencer = &self.sequencer;
        if self.running {
            let trigger = self.trigger_active.get(track).copied().unwrap_or(false);
            TrackFrame {
                cv: sequencer.cv_out(track),
                gate: sequencer.gate_out(track, self.clock_high, trigger),
                gate2: sequencer.gate2_out(track, self.clock_high, trigger),
                velocity: sequencer.velocity_out(track),
            }
        } else if let Some(cv) = sequencer.editing_gate(track) {
            TrackFrame {
                cv,
                gate: true,
                gate2: true,
                velocity: sequencer.velocity_out(track),
            }
        } else {
            TrackFrame {
                cv: sequencer.edit_cv(track),
                velocity: sequencer.velocity_out(track),
                ..TrackFrame::default()
            }
        }
    }

    /// Advances per-frame timers. Returns true on frames where lights
    /// should be refreshed; play positions are reported on those frames.
    pub fn end_frame(&mut self) -> bool {
        self.sequencer.tick();
        self.warning.process();
        if !self.light_divider.tick() {
            return false;
        }
        if let Some(edits) = self.edits.as_mut() {
            for track in 0..self.sequencer.num_tracks() {
                let kernel = self.sequencer.track(track);
                edits.send_event_lossy(SequencerEvent::PlayPosition {
                    track,
                    step: kernel.step_index_run(),
                    phrase: kernel.phrase_index_run(),
                });
            }
        }
        true
    }

    /// True while the refused-edit warning is showing.
    pub fn warning_active(&self) -> bool {
        self.warning.is_active()
    }

    /// Returns playback to the start without touching musical data.
    pub fn reset(&mut self) {
        self.clock.reset();
        self.reset.reset();
        self.run.reset();
        self.clock_high = false;
        self.warning.cancel();
        self.restart();
        self.clock_ignore_left = 0;
    }
}
