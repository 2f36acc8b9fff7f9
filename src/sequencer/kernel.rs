//! One track of the sequencer.
//!
//! A [`SequencerKernel`] owns every sequence and the song of a track, plus the
//! playback cursor that walks them. Editing operations mutate the stored data
//! in place while playback continues; nothing here allocates after
//! construction, and every index argument is clamped rather than rejected.

use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::attributes::{Phrase, SeqAttributes, StepAttributes};
use super::clipboard::{SeqClipboard, SongClipboard};
use super::config::KernelConfig;
use super::gate::{calc_gate_code, pattern_code, GateCode, GateMode, GateStep};
use super::run_mode::{RunHistory, RunMode};

/// Lowest octave reachable from the keyboard.
pub const MIN_OCTAVE: i32 = -3;
/// Highest octave reachable from the keyboard.
pub const MAX_OCTAVE: i32 = 3;
/// Longest start delay, in clock pulses.
pub const MAX_DELAY: u32 = 99;

/// Step storage of one sequence.
#[derive(Clone, Debug, PartialEq)]
pub struct Sequence {
    pub cv: Box<[f32]>,
    pub attributes: Box<[StepAttributes]>,
    pub seq_attr: SeqAttributes,
}

impl Sequence {
    /// Creates an initialized sequence of `capacity` steps.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            cv: vec![0.0; capacity].into_boxed_slice(),
            attributes: vec![StepAttributes::INIT; capacity].into_boxed_slice(),
            seq_attr: SeqAttributes::new(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.cv.len()
    }

    pub fn length(&self) -> usize {
        self.seq_attr.length
    }

    /// Restores init values in place.
    pub fn init(&mut self) {
        self.cv.fill(0.0);
        self.attributes.fill(StepAttributes::INIT);
        self.seq_attr = SeqAttributes::new(self.capacity());
    }

    /// Overwrites steps and attributes with `other`'s, truncating to the
    /// shorter capacity.
    pub fn copy_from(&mut self, other: &Sequence) {
        let n = self.capacity().min(other.capacity());
        self.cv[..n].copy_from_slice(&other.cv[..n]);
        self.attributes[..n].copy_from_slice(&other.attributes[..n]);
        let capacity = self.capacity();
        self.seq_attr = other.seq_attr;
        self.seq_attr.set_length(other.seq_attr.length, capacity);
        self.reattach_seams();
    }

    /// Step whose note a tie at `step` continues: the previous step, with
    /// step 0 continuing the last played step.
    fn tie_origin(&self, step: usize) -> usize {
        if step == 0 {
            self.length() - 1
        } else {
            step - 1
        }
    }

    /// Step played after `step`. Played steps wrap from the last one back to
    /// step 0; steps past the length continue in storage order.
    fn play_next(&self, step: usize) -> Option<usize> {
        let length = self.length();
        if step + 1 == length {
            (length > 1).then_some(0)
        } else if step + 1 < self.capacity() {
            Some(step + 1)
        } else {
            None
        }
    }

    /// Copies the CV of `step` into the tied steps that follow it, wrapping
    /// into a tie at step 0 when the chain reaches the last played step.
    fn propagate_tie(&mut self, step: usize) {
        let cv = self.cv[step];
        let last_played = self.length() - 1;
        let mut reached_end = step == last_played;
        for i in step + 1..self.capacity() {
            if !self.attributes[i].tied() {
                break;
            }
            self.cv[i] = cv;
            reached_end |= i == last_played;
        }
        if reached_end && step != 0 && self.attributes[0].tied() {
            for i in 0..self.capacity() {
                if !self.attributes[i].tied() {
                    break;
                }
                self.cv[i] = cv;
            }
        }
    }

    /// Copies each tied step's CV from its origin so every chain mirrors
    /// its first note.
    fn normalize_ties(&mut self) {
        for i in 1..self.capacity() {
            if self.attributes[i].tied() {
                self.cv[i] = self.cv[i - 1];
            }
        }
        if self.length() > 1 && self.attributes[0].tied() {
            self.cv[0] = self.cv[self.length() - 1];
            self.propagate_tie(0);
        }
    }

    /// Writes the gate modes of every tie chain for hold (`true`) or
    /// retrigger (`false`) behaviour. Chains follow play order, so a tie at
    /// step 0 extends the note of the last played step.
    fn apply_hold_modes(&mut self, hold: bool) {
        for start in 0..self.capacity() {
            if !self.attributes[start].tied() {
                continue;
            }
            let origin = self.tie_origin(start);
            if origin == start || self.attributes[origin].tied() {
                continue;
            }
            let mut last = start;
            while let Some(next) = self.play_next(last) {
                if next == start || !self.attributes[next].tied() {
                    break;
                }
                last = next;
            }
            if hold {
                let terminating = self.attributes[origin].gate_mode();
                self.attributes[origin].set_gate_mode(GateMode::Full);
                let mut i = start;
                while i != last {
                    self.attributes[i].set_gate_mode(GateMode::Full);
                    match self.play_next(i) {
                        Some(next) => i = next,
                        None => break,
                    }
                }
                self.attributes[last].set_gate_mode(terminating);
            } else {
                let terminating = self.attributes[last].gate_mode();
                self.attributes[origin].set_gate_mode(terminating);
            }
        }
    }

    /// Carries the origin's gate mode to the end of the chain that a new tie
    /// at `step` joins, leaving every earlier step of it at full length.
    fn carry_hold_mode(&mut self, step: usize) {
        let mut prev = self.tie_origin(step);
        let mut i = step;
        loop {
            let carried = self.attributes[prev].gate_mode();
            self.attributes[i].set_gate_mode(carried);
            self.attributes[prev].set_gate_mode(GateMode::Full);
            match self.play_next(i) {
                Some(next) if next != step && self.attributes[next].tied() => {
                    prev = i;
                    i = next;
                }
                _ => break,
            }
        }
    }

    /// Hands the terminating gate mode of the chain after `step` back to the
    /// step it used to continue.
    fn release_hold_mode(&mut self, step: usize) {
        let origin = self.tie_origin(step);
        if origin == step {
            return;
        }
        let mut terminating = self.attributes[step].gate_mode();
        let mut i = step;
        while let Some(next) = self.play_next(i) {
            if next == step || !self.attributes[next].tied() {
                break;
            }
            terminating = self.attributes[next].gate_mode();
            i = next;
        }
        self.attributes[origin].set_gate_mode(terminating);
    }

    /// Re-copies the CVs of the ties whose origin depends on the length: one
    /// at step 0 and one at the first step past the length.
    fn reattach_seams(&mut self) {
        let length = self.length();
        if length > 1 && self.attributes[0].tied() {
            self.cv[0] = self.cv[length - 1];
            self.propagate_tie(0);
        }
        if length < self.capacity() && self.attributes[length].tied() {
            self.propagate_tie(length - 1);
        }
    }
}

/// Playback position and per-step runtime state of a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunCursor {
    pub step_index_run: usize,
    pub phrase_index_run: usize,
    pub step_history: RunHistory,
    pub phrase_history: RunHistory,
    /// Pulse within the current step, `[0, pulses_per_step)`.
    pub ppqn_count: u32,
    /// Clock pulses still to be swallowed by the start delay.
    pub ppqn_left_to_skip: u32,
    pub gate_code: GateCode,
    pub gate2_code: GateCode,
    /// Frames left in the current slide.
    pub slide_steps_remain: u64,
    /// CV change per slide frame.
    pub slide_cv_delta: f32,
    /// The origin of the current tie chain fired its gate.
    pub chain_gate_open: bool,
}

/// Run position of the master track, read by followers in TKA mode.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MasterCursor {
    pub step_index_run: usize,
    pub phrase_index_run: usize,
}

/// What one clock edge did to the cursor.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ClockOutcome {
    /// The edge was swallowed by the start delay.
    pub skipped: bool,
    /// A new step started on this edge.
    pub step_entered: bool,
    /// The step cursor completed a traversal cycle.
    pub boundary: bool,
    /// The song moved to another phrase.
    pub phrase_changed: bool,
}

/// Direction of [`SequencerKernel::rotate_seq`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RotateDirection {
    Left,
    Right,
}

/// Storage, cursor and editing operations of one track.
pub struct SequencerKernel {
    config: &'static KernelConfig,
    id: usize,
    pub(crate) sequences: Box<[Sequence]>,
    pub(crate) phrases: Box<[Phrase]>,
    pub(crate) begin: usize,
    pub(crate) end: usize,
    pub(crate) run_mode_song: RunMode,
    pub(crate) pulses_per_step: u32,
    pub(crate) delay: u32,
    pub(crate) hold_tied_notes: bool,
    pub(crate) seq_index_edit: usize,
    pub(crate) cursor: RunCursor,
    clock_period: u64,
    clock_time: u64,
    rng: SmallRng,
}

impl SequencerKernel {
    /// Creates track `id` of a `config` variant.
    pub fn new(config: &'static KernelConfig, id: usize) -> Self {
        Self::with_rng(config, id, SmallRng::from_entropy())
    }

    /// Creates a track whose random draws are reproducible.
    pub fn with_seed(config: &'static KernelConfig, id: usize, seed: u64) -> Self {
        Self::with_rng(config, id, SmallRng::seed_from_u64(seed))
    }

    fn with_rng(config: &'static KernelConfig, id: usize, rng: SmallRng) -> Self {
        let sequences = (0..config.max_seqs.max(1))
            .map(|_| Sequence::new(config.max_steps))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        let phrases = vec![Phrase::default(); config.max_phrases.max(1)].into_boxed_slice();
        let mut kernel = Self {
            config,
            id,
            sequences,
            phrases,
            begin: 0,
            end: 0,
            run_mode_song: RunMode::Fwd,
            pulses_per_step: 1,
            delay: 0,
            hold_tied_notes: true,
            seq_index_edit: 0,
            cursor: RunCursor::default(),
            clock_period: 0,
            clock_time: 0,
            rng,
        };
        kernel.init_run(true);
        kernel
    }

    /// Restores init values for every sequence, the song and the settings.
    pub fn init(&mut self) {
        for sequence in self.sequences.iter_mut() {
            sequence.init();
        }
        self.init_song();
        self.pulses_per_step = 1;
        self.delay = 0;
        self.hold_tied_notes = true;
        self.seq_index_edit = 0;
    }

    pub fn config(&self) -> &'static KernelConfig {
        self.config
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn max_steps(&self) -> usize {
        self.sequences[0].capacity()
    }

    pub fn max_seqs(&self) -> usize {
        self.sequences.len()
    }

    pub fn max_phrases(&self) -> usize {
        self.phrases.len()
    }

    fn seq_idx(&self, seq: usize) -> usize {
        seq.min(self.max_seqs() - 1)
    }

    fn step_idx(&self, step: usize) -> usize {
        step.min(self.max_steps() - 1)
    }

    fn phrase_idx(&self, phrase: usize) -> usize {
        phrase.min(self.max_phrases() - 1)
    }

    /// Steps `[step, step + n)` of a bulk edit; `n` never passes the end.
    fn run_range(&self, step: usize, count: usize) -> std::ops::Range<usize> {
        let step = self.step_idx(step);
        step..step + count.max(1).min(self.max_steps() - step)
    }

    pub fn sequence(&self, seq: usize) -> &Sequence {
        &self.sequences[self.seq_idx(seq)]
    }

    pub fn cv(&self, seq: usize, step: usize) -> f32 {
        self.sequence(seq).cv[self.step_idx(step)]
    }

    pub fn attributes(&self, seq: usize, step: usize) -> StepAttributes {
        self.sequence(seq).attributes[self.step_idx(step)]
    }

    pub fn length(&self, seq: usize) -> usize {
        self.sequence(seq).length()
    }

    pub fn run_mode_seq(&self, seq: usize) -> RunMode {
        self.sequence(seq).seq_attr.run_mode
    }

    pub fn transpose(&self, seq: usize) -> i32 {
        self.sequence(seq).seq_attr.transpose
    }

    pub fn phrase(&self, phrase: usize) -> Phrase {
        self.phrases[self.phrase_idx(phrase)]
    }

    pub fn begin(&self) -> usize {
        self.begin
    }

    pub fn end(&self) -> usize {
        self.end
    }

    pub fn run_mode_song(&self) -> RunMode {
        self.run_mode_song
    }

    pub fn pulses_per_step(&self) -> u32 {
        self.pulses_per_step
    }

    pub fn delay(&self) -> u32 {
        self.delay
    }

    pub fn hold_tied_notes(&self) -> bool {
        self.hold_tied_notes
    }

    pub fn seq_index_edit(&self) -> usize {
        self.seq_index_edit
    }

    pub fn set_seq_index_edit(&mut self, seq: usize) {
        self.seq_index_edit = self.seq_idx(seq);
    }

    pub fn cursor(&self) -> &RunCursor {
        &self.cursor
    }

    pub fn step_index_run(&self) -> usize {
        self.cursor.step_index_run
    }

    pub fn phrase_index_run(&self) -> usize {
        self.cursor.phrase_index_run
    }

    /// Cursor snapshot handed to follower tracks.
    pub fn master_cursor(&self) -> MasterCursor {
        MasterCursor {
            step_index_run: self.cursor.step_index_run,
            phrase_index_run: self.cursor.phrase_index_run,
        }
    }

    /// Frames between the last two real clock edges.
    pub fn clock_period(&self) -> u64 {
        self.clock_period
    }

    /// Sequence being played: the edited one in sequence mode, otherwise the
    /// one named by the current phrase.
    pub fn play_seq(&self, editing_sequence: bool) -> usize {
        if editing_sequence {
            self.seq_index_edit
        } else {
            self.seq_idx(self.phrase(self.cursor.phrase_index_run).seq_num)
        }
    }

    // ---- CV editing ----

    /// Writes `value` to `count` steps from `step`, skipping tied steps, and
    /// carries it into the tie chains that follow. Returns `value`.
    pub fn write_cv(&mut self, seq: usize, step: usize, value: f32, count: usize) -> f32 {
        let seq = self.seq_idx(seq);
        for i in self.run_range(step, count) {
            if !self.sequences[seq].attributes[i].tied() {
                self.sequences[seq].cv[i] = value;
                self.propagate_cv_to_tied(seq, i);
            }
        }
        value
    }

    /// Moves the note at `step` to `octave` (clamped to -3..=3), keeping its
    /// pitch class, and writes it to `count` steps.
    pub fn apply_new_octave(&mut self, seq: usize, step: usize, octave: i32, count: usize) -> f32 {
        let current = self.cv(seq, step);
        let value = current.rem_euclid(1.0) + octave.clamp(MIN_OCTAVE, MAX_OCTAVE) as f32;
        self.write_cv(seq, step, value, count)
    }

    /// Sets the pitch class of the note at `step` (0 = C, 11 = B), keeping
    /// its octave, and writes it to `count` steps.
    pub fn apply_new_key(&mut self, seq: usize, step: usize, key: i32, count: usize) -> f32 {
        let current = self.cv(seq, step);
        let value = current.floor() + key.clamp(0, 11) as f32 / 12.0;
        self.write_cv(seq, step, value, count)
    }

    fn propagate_cv_to_tied(&mut self, seq: usize, step: usize) {
        self.sequences[seq].propagate_tie(step);
    }

    // ---- attribute editing ----

    /// Applies a note flag to a run of steps. Tied steps keep their flags;
    /// returns true if turning a flag on was refused for one of them.
    fn set_note_flag(
        &mut self,
        seq: usize,
        step: usize,
        on: bool,
        count: usize,
        apply: fn(&mut StepAttributes, bool),
    ) -> bool {
        let seq = self.seq_idx(seq);
        let mut rejected = false;
        for i in self.run_range(step, count) {
            let attr = &mut self.sequences[seq].attributes[i];
            if attr.tied() {
                rejected |= on;
            } else {
                apply(attr, on);
            }
        }
        rejected
    }

    fn set_value(
        &mut self,
        seq: usize,
        step: usize,
        count: usize,
        apply: impl Fn(&mut StepAttributes),
    ) {
        let seq = self.seq_idx(seq);
        for i in self.run_range(step, count) {
            apply(&mut self.sequences[seq].attributes[i]);
        }
    }

    /// Returns true if a tied step refused the gate.
    pub fn set_gate(&mut self, seq: usize, step: usize, on: bool, count: usize) -> bool {
        self.set_note_flag(seq, step, on, count, StepAttributes::set_gate)
    }

    /// Returns true if a tied step refused the probability gate.
    pub fn set_gate_p(&mut self, seq: usize, step: usize, on: bool, count: usize) -> bool {
        self.set_note_flag(seq, step, on, count, StepAttributes::set_gate_p)
    }

    /// Returns true if a tied step refused gate2.
    pub fn set_gate2(&mut self, seq: usize, step: usize, on: bool, count: usize) -> bool {
        self.set_note_flag(seq, step, on, count, StepAttributes::set_gate2)
    }

    /// Returns true if a tied step refused the slide.
    pub fn set_slide(&mut self, seq: usize, step: usize, on: bool, count: usize) -> bool {
        self.set_note_flag(seq, step, on, count, StepAttributes::set_slide)
    }

    /// Ties or unties a run of steps, keeping CVs and hold gate modes of the
    /// affected chains consistent.
    pub fn set_tied(&mut self, seq: usize, step: usize, on: bool, count: usize) {
        let seq = self.seq_idx(seq);
        for i in self.run_range(step, count) {
            let tied = self.sequences[seq].attributes[i].tied();
            if on && !tied {
                self.activate_tied_step(seq, i);
            } else if !on && tied {
                self.deactivate_tied_step(seq, i);
            }
        }
    }

    fn activate_tied_step(&mut self, seq: usize, step: usize) {
        let hold = self.hold_tied_notes;
        let sequence = &mut self.sequences[seq];
        sequence.attributes[step].set_tied(true);
        let origin = sequence.tie_origin(step);
        if origin == step {
            return;
        }
        sequence.cv[step] = sequence.cv[origin];
        sequence.propagate_tie(step);
        if hold {
            sequence.carry_hold_mode(step);
        }
    }

    fn deactivate_tied_step(&mut self, seq: usize, step: usize) {
        let hold = self.hold_tied_notes;
        let sequence = &mut self.sequences[seq];
        sequence.attributes[step].set_tied(false);
        if hold {
            sequence.release_hold_mode(step);
        }
    }

    pub fn set_gate_p_val(&mut self, seq: usize, step: usize, percent: u8, count: usize) {
        self.set_value(seq, step, count, |a| a.set_gate_p_value(percent));
    }

    pub fn set_slide_val(&mut self, seq: usize, step: usize, value: u8, count: usize) {
        let value = value.min(self.config.slide_max);
        self.set_value(seq, step, count, |a| a.set_slide_value(value));
    }

    pub fn set_velocity_val(&mut self, seq: usize, step: usize, value: u8, count: usize) {
        let value = value.min(self.config.velocity_max);
        self.set_value(seq, step, count, |a| a.set_velocity(value));
    }

    pub fn set_gate_mode(&mut self, seq: usize, step: usize, mode: GateMode, count: usize) {
        self.set_value(seq, step, count, |a| a.set_gate_mode(mode));
    }

    pub fn set_gate2_mode(&mut self, seq: usize, step: usize, mode: GateMode, count: usize) {
        self.set_value(seq, step, count, |a| a.set_gate2_mode(mode));
    }

    /// Negates the gate of `step` and applies that state to the whole run.
    /// Returns true if a tied step refused it.
    pub fn toggle_gate(&mut self, seq: usize, step: usize, count: usize) -> bool {
        let on = !self.attributes(seq, step).gate();
        self.set_gate(seq, step, on, count)
    }

    pub fn toggle_gate_p(&mut self, seq: usize, step: usize, count: usize) -> bool {
        let on = !self.attributes(seq, step).gate_p();
        self.set_gate_p(seq, step, on, count)
    }

    pub fn toggle_gate2(&mut self, seq: usize, step: usize, count: usize) -> bool {
        let on = !self.attributes(seq, step).gate2();
        self.set_gate2(seq, step, on, count)
    }

    pub fn toggle_slide(&mut self, seq: usize, step: usize, count: usize) -> bool {
        let on = !self.attributes(seq, step).slide();
        self.set_slide(seq, step, on, count)
    }

    pub fn toggle_tied(&mut self, seq: usize, step: usize, count: usize) {
        let on = !self.attributes(seq, step).tied();
        self.set_tied(seq, step, on, count);
    }

    // ---- sequence editing ----

    /// Circular-shifts the first `length` steps `count` positions.
    ///
    /// Steps move with their attributes, so tie chains inside the played
    /// range move as a whole. Ties at step 0 and just past the length are
    /// re-attached to their new origins.
    pub fn rotate_seq(&mut self, seq: usize, direction: RotateDirection, count: usize) {
        let seq = self.seq_idx(seq);
        let sequence = &mut self.sequences[seq];
        let length = sequence.length();
        let shift = count % length;
        match direction {
            RotateDirection::Right => {
                sequence.cv[..length].rotate_right(shift);
                sequence.attributes[..length].rotate_right(shift);
            }
            RotateDirection::Left => {
                sequence.cv[..length].rotate_left(shift);
                sequence.attributes[..length].rotate_left(shift);
            }
        }
        sequence.reattach_seams();
    }

    /// Shifts every step of the sequence by `delta` semitones and records
    /// the offset.
    pub fn transpose_seq(&mut self, seq: usize, delta: i32) {
        let seq = self.seq_idx(seq);
        let sequence = &mut self.sequences[seq];
        let offset = delta as f32 / 12.0;
        for cv in sequence.cv.iter_mut() {
            *cv += offset;
        }
        sequence.seq_attr.add_transpose(delta);
    }

    pub fn set_length(&mut self, seq: usize, length: usize) {
        let max_steps = self.max_steps();
        let seq = self.seq_idx(seq);
        self.sequences[seq].seq_attr.set_length(length, max_steps);
        self.sequences[seq].reattach_seams();
    }

    /// Sets a sequence's run mode; modes the variant lacks become forward.
    pub fn set_run_mode_seq(&mut self, seq: usize, mode: RunMode) {
        let mode = self.config.seq_mode_or_fwd(mode);
        let seq = self.seq_idx(seq);
        self.sequences[seq].seq_attr.run_mode = mode;
    }

    pub fn init_sequence(&mut self, seq: usize) {
        let seq = self.seq_idx(seq);
        self.sequences[seq].init();
    }

    /// Fills a sequence with random notes and legal random attributes.
    pub fn randomize_sequence(&mut self, seq: usize) {
        let seq = self.seq_idx(seq);
        let config = self.config;
        let hold = self.hold_tied_notes;
        let sequence = &mut self.sequences[seq];
        for i in 0..sequence.capacity() {
            sequence.cv[i] = random_note(&mut self.rng);
            sequence.attributes[i] = StepAttributes::random(&mut self.rng, config);
        }
        sequence.normalize_ties();
        if hold {
            sequence.apply_hold_modes(true);
        }
    }

    // ---- song editing ----

    pub fn set_phrase_seq_num(&mut self, phrase: usize, seq: usize) {
        let seq = self.seq_idx(seq);
        let phrase = self.phrase_idx(phrase);
        self.phrases[phrase].seq_num = seq;
    }

    pub fn set_phrase_reps(&mut self, phrase: usize, reps: u32) {
        let phrase = self.phrase_idx(phrase);
        self.phrases[phrase].reps = reps.min(Phrase::MAX_REPS);
    }

    /// Sets the first played phrase, at most the current end.
    pub fn set_begin(&mut self, phrase: usize) {
        self.begin = self.phrase_idx(phrase).min(self.end);
    }

    /// Sets the last played phrase, at least the current begin.
    pub fn set_end(&mut self, phrase: usize) {
        self.end = self.phrase_idx(phrase).max(self.begin);
    }

    /// Sets the song run mode; modes the variant lacks become forward.
    pub fn set_run_mode_song(&mut self, mode: RunMode) {
        self.run_mode_song = self.config.song_mode_or_fwd(mode);
    }

    pub fn init_song(&mut self) {
        self.phrases.fill(Phrase::default());
        self.begin = 0;
        self.end = 0;
        self.run_mode_song = RunMode::Fwd;
    }

    // ---- settings ----

    /// Sets pulses per step, snapped to the variant's table.
    pub fn set_pulses_per_step(&mut self, pps: u32) {
        self.pulses_per_step = self.config.snap_pps(pps);
    }

    /// Sets the start delay in clock pulses.
    pub fn set_delay(&mut self, delay: u32) {
        self.delay = delay.min(MAX_DELAY);
    }

    /// Switches between holding tied notes and letting them fall silent,
    /// rewriting the gate modes of existing chains.
    pub fn set_hold_tied_notes(&mut self, hold: bool) {
        if hold == self.hold_tied_notes {
            return;
        }
        self.hold_tied_notes = hold;
        for sequence in self.sequences.iter_mut() {
            sequence.apply_hold_modes(hold);
        }
    }

    // ---- copy / paste ----

    /// Copies sequence `src_seq` of `other` over sequence `seq`.
    pub fn copy_sequence_from(&mut self, other: &SequencerKernel, src_seq: usize, seq: usize) {
        let seq = self.seq_idx(seq);
        self.sequences[seq].copy_from(other.sequence(src_seq));
    }

    /// Copies every sequence, the song and the settings of `other`. The run
    /// cursor and edit position stay.
    pub fn copy_content_from(&mut self, other: &SequencerKernel) {
        for (dst, src) in self.sequences.iter_mut().zip(other.sequences.iter()) {
            dst.copy_from(src);
        }
        let max_seqs = self.max_seqs();
        for (dst, src) in self.phrases.iter_mut().zip(other.phrases.iter()) {
            *dst = Phrase::new(src.seq_num.min(max_seqs - 1), src.reps);
        }
        let max_phrases = self.max_phrases();
        self.end = other.end.min(max_phrases - 1);
        self.begin = other.begin.min(self.end);
        self.run_mode_song = other.run_mode_song;
        self.pulses_per_step = other.pulses_per_step;
        self.delay = other.delay;
        self.hold_tied_notes = other.hold_tied_notes;
    }

    /// Snapshots `count` steps from `start` into `clipboard`.
    pub fn copy_sequence(&self, clipboard: &mut SeqClipboard, seq: usize, start: usize, count: usize) {
        let sequence = self.sequence(seq);
        let start = self.step_idx(start);
        let count = count
            .min(self.max_steps() - start)
            .min(clipboard.capacity());
        clipboard.cv[..count].copy_from_slice(&sequence.cv[start..start + count]);
        clipboard.attributes[..count].copy_from_slice(&sequence.attributes[start..start + count]);
        clipboard.seq_attr = sequence.seq_attr;
        clipboard.stored_len = count;
    }

    /// Writes the snapshot back from `start`. A snapshot covering the whole
    /// sequence also restores length, run mode and transpose.
    pub fn paste_sequence(&mut self, clipboard: &SeqClipboard, seq: usize, start: usize) {
        let seq = self.seq_idx(seq);
        let start = self.step_idx(start);
        let max_steps = self.max_steps();
        let count = clipboard.stored_len.min(max_steps - start);
        if count == 0 {
            return;
        }
        let config = self.config;
        let sequence = &mut self.sequences[seq];
        sequence.cv[start..start + count].copy_from_slice(&clipboard.cv[..count]);
        for (dst, src) in sequence.attributes[start..start + count]
            .iter_mut()
            .zip(clipboard.attributes[..count].iter())
        {
            *dst = src.sanitized(config);
        }
        if count == max_steps {
            sequence.seq_attr = clipboard.seq_attr;
            sequence.seq_attr.set_length(clipboard.seq_attr.length, max_steps);
            sequence.seq_attr.run_mode = config.seq_mode_or_fwd(clipboard.seq_attr.run_mode);
        }
        sequence.reattach_seams();
        if start > 0 {
            self.propagate_cv_to_tied(seq, start - 1);
        }
        self.propagate_cv_to_tied(seq, start + count - 1);
    }

    /// Snapshots `count` phrases from `start` plus the song range and mode.
    pub fn copy_song(&self, clipboard: &mut SongClipboard, start: usize, count: usize) {
        let start = self.phrase_idx(start);
        let count = count
            .min(self.max_phrases() - start)
            .min(clipboard.capacity());
        clipboard.phrases[..count].copy_from_slice(&self.phrases[start..start + count]);
        clipboard.begin = self.begin;
        clipboard.end = self.end;
        clipboard.run_mode = self.run_mode_song;
        clipboard.stored_len = count;
    }

    /// Writes the phrase snapshot back from `start`. A snapshot covering the
    /// whole song also restores begin, end and run mode.
    pub fn paste_song(&mut self, clipboard: &SongClipboard, start: usize) {
        let start = self.phrase_idx(start);
        let max_phrases = self.max_phrases();
        let max_seqs = self.max_seqs();
        let count = clipboard.stored_len.min(max_phrases - start);
        for (dst, src) in self.phrases[start..start + count]
            .iter_mut()
            .zip(clipboard.phrases[..count].iter())
        {
            *dst = Phrase::new(src.seq_num.min(max_seqs - 1), src.reps);
        }
        if count == max_phrases {
            self.end = clipboard.end.min(max_phrases - 1);
            self.begin = clipboard.begin.min(self.end);
            self.run_mode_song = self.config.song_mode_or_fwd(clipboard.run_mode);
        }
    }

    // ---- playback ----

    /// Puts the cursor on the starting phrase and step for the current run
    /// modes and clears pulse, delay and slide state.
    pub fn init_run(&mut self, editing_sequence: bool) {
        let song_mode = self.config.song_mode_or_fwd(self.run_mode_song);
        let start = if song_mode.starts_at_end() {
            self.end
        } else {
            self.begin
        };
        self.cursor = RunCursor {
            phrase_index_run: self
                .find_playable(start, song_mode.starts_at_end())
                .unwrap_or(start),
            ppqn_left_to_skip: self.delay,
            ..RunCursor::default()
        };
        self.cursor.step_index_run = self.start_step(self.play_seq(editing_sequence));
        self.refresh_gate_codes(editing_sequence);
    }

    fn start_step(&self, seq: usize) -> usize {
        let sequence = self.sequence(seq);
        if self.config.seq_mode_or_fwd(sequence.seq_attr.run_mode).starts_at_end() {
            sequence.length() - 1
        } else {
            0
        }
    }

    /// Advances the cursor by one clock pulse.
    ///
    /// `real_edge` is true for an edge from the clock input: it measures the
    /// clock period and is subject to the start delay. A synthesized advance
    /// (manual stepping) passes false and does neither. `master` is the
    /// master track's cursor after its own edge, for TKA followers.
    ///
    /// Must be called once per pulse, in order. The gate code is rolled on
    /// the first pulse of a step and an `OffForStep` result is kept for the
    /// remaining pulses; calling out of order re-rolls the probability gate.
    pub fn clock_step(
        &mut self,
        real_edge: bool,
        editing_sequence: bool,
        master: Option<MasterCursor>,
    ) -> ClockOutcome {
        let mut outcome = ClockOutcome::default();
        if real_edge {
            self.clock_period = self.clock_time;
            self.clock_time = 0;
            if self.cursor.ppqn_left_to_skip > 0 {
                self.cursor.ppqn_left_to_skip -= 1;
                outcome.skipped = true;
                return outcome;
            }
        }
        self.cursor.ppqn_count += 1;
        if self.cursor.ppqn_count >= self.pulses_per_step {
            self.cursor.ppqn_count = 0;
            let prev_cv = self.cv_out(editing_sequence);
            self.move_index_run(editing_sequence, master, &mut outcome);
            outcome.step_entered = true;
            self.start_slide(editing_sequence, prev_cv);
        }
        self.refresh_gate_codes(editing_sequence);
        outcome
    }

    fn move_index_run(
        &mut self,
        editing_sequence: bool,
        master: Option<MasterCursor>,
        outcome: &mut ClockOutcome,
    ) {
        let seq = self.play_seq(editing_sequence);
        let seq_attr = self.sequences[seq].seq_attr;
        let mode = self.config.seq_mode_or_fwd(seq_attr.run_mode);
        let reps = if editing_sequence {
            1
        } else {
            self.phrase(self.cursor.phrase_index_run).reps
        };
        let advance = self.cursor.step_history.advance(
            self.cursor.step_index_run,
            seq_attr.length,
            mode,
            reps,
            master.map(|m| m.step_index_run),
            &mut self.rng,
        );
        self.cursor.step_index_run = advance.index;
        outcome.boundary = advance.boundary;

        if advance.boundary && !editing_sequence {
            let before = self.cursor.phrase_index_run;
            self.move_phrase_run(master.map(|m| m.phrase_index_run));
            outcome.phrase_changed = self.cursor.phrase_index_run != before;
            self.cursor.step_history = RunHistory::Reset;
            self.cursor.step_index_run = self.start_step(self.play_seq(false));
        }
    }

    fn move_phrase_run(&mut self, master_phrase: Option<usize>) {
        let count = self.end - self.begin + 1;
        let relative = self.cursor.phrase_index_run.clamp(self.begin, self.end) - self.begin;
        let mode = self.config.song_mode_or_fwd(self.run_mode_song);
        let advance = self.cursor.phrase_history.advance(
            relative,
            count,
            mode,
            1,
            master_phrase.map(|p| p.saturating_sub(self.begin)),
            &mut self.rng,
        );
        let backward = self.cursor.phrase_history.is_reversing();
        if let Some(phrase) = self.find_playable(self.begin + advance.index, backward) {
            self.cursor.phrase_index_run = phrase;
        }
    }

    /// First phrase at or after `from` (before, when `backward`) inside the
    /// song range whose reps are non-zero, wrapping within the range.
    fn find_playable(&self, from: usize, backward: bool) -> Option<usize> {
        let count = self.end - self.begin + 1;
        let relative = from.clamp(self.begin, self.end) - self.begin;
        (0..count)
            .map(|k| {
                if backward {
                    (relative + count - k) % count
                } else {
                    (relative + k) % count
                }
            })
            .map(|r| self.begin + r)
            .find(|&p| self.phrases[p].is_playable())
    }

    fn start_slide(&mut self, editing_sequence: bool, prev_cv: f32) {
        let seq = self.play_seq(editing_sequence);
        let step = self.cursor.step_index_run;
        let attr = self.sequences[seq].attributes[step];
        if attr.slide() {
            let frames = self.clock_period as f64
                * f64::from(self.pulses_per_step)
                * f64::from(attr.slide_value())
                / 100.0;
            let remain = frames as u64;
            self.cursor.slide_steps_remain = remain;
            self.cursor.slide_cv_delta = if remain > 0 {
                (self.sequences[seq].cv[step] - prev_cv) / remain as f32
            } else {
                0.0
            };
        } else {
            self.cursor.slide_steps_remain = 0;
            self.cursor.slide_cv_delta = 0.0;
        }
    }

    fn refresh_gate_codes(&mut self, editing_sequence: bool) {
        let first_pulse = self.cursor.ppqn_count == 0;
        if first_pulse || self.cursor.gate_code != GateCode::OffForStep {
            self.cursor.gate_code = self.gate1_code(editing_sequence);
        }
        if self.config.has_gate2 && (first_pulse || self.cursor.gate2_code != GateCode::OffForStep) {
            self.cursor.gate2_code = self.gate2_code(editing_sequence);
        }
    }

    fn gate1_code(&mut self, editing_sequence: bool) -> GateCode {
        let seq = self.play_seq(editing_sequence);
        let sequence = &self.sequences[seq];
        let step = self.cursor.step_index_run.min(sequence.capacity() - 1);
        let attr = sequence.attributes[step];
        let holds_into_next = self.hold_tied_notes
            && sequence
                .play_next(step)
                .is_some_and(|next| next < sequence.length() && sequence.attributes[next].tied());
        let ppqn = self.cursor.ppqn_count;
        let pps = self.pulses_per_step;
        let table = self.config.gate_table;

        let code = if attr.tied() {
            if self.hold_tied_notes && self.cursor.chain_gate_open {
                pattern_code(attr.gate_mode(), ppqn, pps, table)
            } else {
                GateCode::OffForPulse
            }
        } else {
            let step_gate = GateStep {
                gate: attr.gate(),
                probability: attr.probability(),
                mode: attr.gate_mode(),
            };
            let code = calc_gate_code(step_gate, ppqn, pps, table, &mut self.rng);
            if ppqn == 0 {
                self.cursor.chain_gate_open = attr.gate() && code != GateCode::OffForStep;
            }
            code
        };
        if holds_into_next && code == GateCode::ClockHigh {
            GateCode::On
        } else {
            code
        }
    }

    fn gate2_code(&mut self, editing_sequence: bool) -> GateCode {
        let seq = self.play_seq(editing_sequence);
        let sequence = &self.sequences[seq];
        let step = self.cursor.step_index_run.min(sequence.capacity() - 1);
        let attr = sequence.attributes[step];
        let step_gate = GateStep {
            gate: attr.gate2() && !attr.tied(),
            probability: None,
            mode: attr.gate2_mode(),
        };
        calc_gate_code(
            step_gate,
            self.cursor.ppqn_count,
            self.pulses_per_step,
            self.config.gate_table,
            &mut self.rng,
        )
    }

    /// Advances per-frame timers: the slide countdown and the clock-period
    /// measurement. Call once per frame.
    pub fn tick(&mut self) {
        if self.cursor.slide_steps_remain > 0 {
            self.cursor.slide_steps_remain -= 1;
        }
        self.clock_time = self.clock_time.saturating_add(1);
    }

    /// Current CV, including any slide in progress.
    pub fn cv_out(&self, editing_sequence: bool) -> f32 {
        let sequence = &self.sequences[self.play_seq(editing_sequence)];
        let step = self.cursor.step_index_run.min(sequence.capacity() - 1);
        sequence.cv[step] - self.cursor.slide_steps_remain as f32 * self.cursor.slide_cv_delta
    }

    /// Gate level given the clock input level and whether the step's short
    /// trigger window is still open.
    pub fn gate_out(&self, clock_high: bool, trigger_active: bool) -> bool {
        self.cursor.gate_code.is_high(clock_high, trigger_active)
    }

    pub fn gate2_out(&self, clock_high: bool, trigger_active: bool) -> bool {
        self.config.has_gate2 && self.cursor.gate2_code.is_high(clock_high, trigger_active)
    }

    /// Velocity of the playing step, scaled to 0..10 V.
    pub fn velocity_out(&self, editing_sequence: bool) -> f32 {
        if !self.config.has_velocity || self.config.velocity_max == 0 {
            return 0.0;
        }
        let sequence = &self.sequences[self.play_seq(editing_sequence)];
        let step = self.cursor.step_index_run.min(sequence.capacity() - 1);
        f32::from(sequence.attributes[step].velocity()) * 10.0 / f32::from(self.config.velocity_max)
    }

    /// Reseeds the random source.
    pub fn reseed(&mut self, seed: u64) {
        self.rng = SmallRng::seed_from_u64(seed);
    }

    pub(crate) fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }

    /// Repairs restored data: clamps lengths, modes, song range, cursor
    /// indices and attributes, then re-applies the tie rule. Returns true if
    /// anything had to change.
    pub(crate) fn sanitize(&mut self) -> bool {
        let config = self.config;
        let max_steps = self.max_steps();
        let max_seqs = self.max_seqs();
        let max_phrases = self.max_phrases();
        let mut changed = false;

        for sequence in self.sequences.iter_mut() {
            let before = sequence.clone();
            for attr in sequence.attributes.iter_mut() {
                *attr = attr.sanitized(config);
            }
            sequence.seq_attr.set_length(sequence.seq_attr.length, max_steps);
            sequence.seq_attr.run_mode = config.seq_mode_or_fwd(sequence.seq_attr.run_mode);
            sequence.seq_attr.add_transpose(0);
            sequence.normalize_ties();
            changed |= *sequence != before;
        }
        for phrase in self.phrases.iter_mut() {
            let fixed = Phrase::new(phrase.seq_num.min(max_seqs - 1), phrase.reps);
            changed |= fixed != *phrase;
            *phrase = fixed;
        }
        let end = self.end.min(max_phrases - 1);
        let begin = self.begin.min(end);
        let song_mode = config.song_mode_or_fwd(self.run_mode_song);
        let pps = config.snap_pps(self.pulses_per_step);
        changed |= end != self.end
            || begin != self.begin
            || song_mode != self.run_mode_song
            || pps != self.pulses_per_step
            || self.delay > MAX_DELAY
            || self.seq_index_edit >= max_seqs;
        self.end = end;
        self.begin = begin;
        self.run_mode_song = song_mode;
        self.pulses_per_step = pps;
        self.delay = self.delay.min(MAX_DELAY);
        self.seq_index_edit = self.seq_index_edit.min(max_seqs - 1);

        let cursor = &mut self.cursor;
        let phrase_run = cursor.phrase_index_run.clamp(begin, end);
        let step_run = cursor.step_index_run.min(max_steps - 1);
        let ppqn = cursor.ppqn_count.min(pps - 1);
        changed |= phrase_run != cursor.phrase_index_run
            || step_run != cursor.step_index_run
            || ppqn != cursor.ppqn_count;
        cursor.phrase_index_run = phrase_run;
        cursor.step_index_run = step_run;
        cursor.ppqn_count = ppqn;
        changed
    }
}

/// Random note on a semitone between -3 V and +4 V.
fn random_note<R: Rng + ?Sized>(rng: &mut R) -> f32 {
    rng.gen_range(-36..48) as f32 / 12.0
}
