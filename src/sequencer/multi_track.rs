//! Multi-track orchestration.
//!
//! [`Sequencer`] owns one [`SequencerKernel`] per track plus the editing
//! cursor, which is separate from every track's playback cursor. Each edit
//! comes in a single-track form and an all-tracks form selected by
//! `multi_tracks`. The all-tracks form computes the new value once from the
//! edited track and writes that same value everywhere, so toggles never
//! alternate between tracks.

use std::ops::Range;

use rand::Rng;

use super::attributes::{Phrase, StepAttributes};
use super::clipboard::{SeqClipboard, SongClipboard};
use super::config::KernelConfig;
use super::gate::GateMode;
use super::kernel::{ClockOutcome, RotateDirection, SequencerKernel, MAX_OCTAVE, MIN_OCTAVE};
use super::run_mode::RunMode;

/// Seconds the note-entry preview gate stays open.
pub const EDITING_GATE_SECONDS: f32 = 0.4;

/// Preview note played while entering notes with the transport stopped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct EditingGate {
    /// Frames left before the preview gate closes.
    pub frames_left: u64,
    pub cv: f32,
    pub track: usize,
}

/// Every track of a module plus the shared editing cursor and copy buffers.
pub struct Sequencer {
    config: &'static KernelConfig,
    tracks: Box<[SequencerKernel]>,
    track_index_edit: usize,
    step_index_edit: usize,
    phrase_index_edit: usize,
    editing_sequence: bool,
    /// Move the edit cursor one step after each CV write.
    auto_step: bool,
    seq_clipboard: SeqClipboard,
    song_clipboard: SongClipboard,
    editing_gate: EditingGate,
}

impl Sequencer {
    /// Creates the tracks of a `config` variant.
    pub fn new(config: &'static KernelConfig) -> Self {
        let tracks = (0..config.num_tracks.max(1))
            .map(|id| SequencerKernel::new(config, id))
            .collect::<Vec<_>>();
        Self::from_tracks(config, tracks)
    }

    /// Creates tracks with reproducible random draws.
    pub fn with_seed(config: &'static KernelConfig, seed: u64) -> Self {
        let tracks = (0..config.num_tracks.max(1))
            .map(|id| SequencerKernel::with_seed(config, id, seed.wrapping_add(id as u64)))
            .collect::<Vec<_>>();
        Self::from_tracks(config, tracks)
    }

    fn from_tracks(config: &'static KernelConfig, tracks: Vec<SequencerKernel>) -> Self {
        Self {
            config,
            tracks: tracks.into_boxed_slice(),
            track_index_edit: 0,
            step_index_edit: 0,
            phrase_index_edit: 0,
            editing_sequence: true,
            auto_step: false,
            seq_clipboard: SeqClipboard::new(config.max_steps.max(1)),
            song_clipboard: SongClipboard::new(config.max_phrases.max(1)),
            editing_gate: EditingGate::default(),
        }
    }

    /// Restores init values on every track and the editing cursor.
    pub fn init(&mut self) {
        for track in self.tracks.iter_mut() {
            track.init();
        }
        self.track_index_edit = 0;
        self.step_index_edit = 0;
        self.phrase_index_edit = 0;
        self.editing_sequence = true;
        self.editing_gate = EditingGate::default();
        self.init_run();
    }

    pub fn config(&self) -> &'static KernelConfig {
        self.config
    }

    pub fn num_tracks(&self) -> usize {
        self.tracks.len()
    }

    /// Track `index`, clamped to the last track.
    pub fn track(&self, index: usize) -> &SequencerKernel {
        &self.tracks[index.min(self.tracks.len() - 1)]
    }

    pub(crate) fn tracks_mut(&mut self) -> &mut [SequencerKernel] {
        &mut self.tracks
    }

    fn edit_track(&self) -> &SequencerKernel {
        &self.tracks[self.track_index_edit]
    }

    /// Tracks touched by an edit.
    fn targets(&self, multi_tracks: bool) -> Range<usize> {
        if multi_tracks {
            0..self.tracks.len()
        } else {
            self.track_index_edit..self.track_index_edit + 1
        }
    }

    // ---- editing cursor ----

    pub fn track_index_edit(&self) -> usize {
        self.track_index_edit
    }

    pub fn set_track_index_edit(&mut self, track: usize) {
        self.track_index_edit = track.min(self.tracks.len() - 1);
    }

    pub fn step_index_edit(&self) -> usize {
        self.step_index_edit
    }

    pub fn set_step_index_edit(&mut self, step: usize) {
        self.step_index_edit = step.min(self.config.max_steps.max(1) - 1);
    }

    /// Moves the edited step by `delta`, wrapping inside the edited
    /// sequence's length.
    pub fn move_step_index_edit(&mut self, delta: i32) {
        let track = self.edit_track();
        let length = track.length(track.seq_index_edit()) as i64;
        let step = (self.step_index_edit as i64).min(length - 1);
        self.step_index_edit = (step + i64::from(delta)).rem_euclid(length) as usize;
    }

    pub fn phrase_index_edit(&self) -> usize {
        self.phrase_index_edit
    }

    pub fn set_phrase_index_edit(&mut self, phrase: usize) {
        self.phrase_index_edit = phrase.min(self.config.max_phrases.max(1) - 1);
    }

    /// Moves the edited phrase by `delta`, wrapping over the song slots.
    pub fn move_phrase_index_edit(&mut self, delta: i32) {
        let count = self.config.max_phrases.max(1) as i64;
        self.phrase_index_edit =
            (self.phrase_index_edit as i64 + i64::from(delta)).rem_euclid(count) as usize;
    }

    /// Sequence edited on the edit track.
    pub fn seq_index_edit(&self) -> usize {
        self.edit_track().seq_index_edit()
    }

    pub fn set_seq_index_edit(&mut self, seq: usize, multi_tracks: bool) {
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_seq_index_edit(seq);
        }
    }

    /// Moves the edited sequence by `delta`, wrapping over the sequence slots.
    pub fn move_seq_index_edit(&mut self, delta: i32, multi_tracks: bool) {
        let count = self.config.max_seqs.max(1) as i64;
        let seq = (self.seq_index_edit() as i64 + i64::from(delta)).rem_euclid(count) as usize;
        self.set_seq_index_edit(seq, multi_tracks);
    }

    pub fn editing_sequence(&self) -> bool {
        self.editing_sequence
    }

    /// Switches between playing the edited sequence and playing the song.
    pub fn set_editing_sequence(&mut self, editing_sequence: bool) {
        self.editing_sequence = editing_sequence;
    }

    pub fn auto_step(&self) -> bool {
        self.auto_step
    }

    pub fn set_auto_step(&mut self, auto_step: bool) {
        self.auto_step = auto_step;
    }

    // ---- step edits ----

    /// Writes `value` at the edited step of every target track.
    pub fn write_cv(&mut self, value: f32, multi_tracks: bool, count: usize) -> f32 {
        let step = self.step_index_edit;
        for t in self.targets(multi_tracks) {
            let track = &mut self.tracks[t];
            let seq = track.seq_index_edit();
            track.write_cv(seq, step, value, count);
        }
        if self.auto_step {
            self.move_step_index_edit(1);
        }
        value
    }

    /// Moves the edited note to `octave`, keeping its pitch class.
    pub fn apply_new_octave(&mut self, octave: i32, multi_tracks: bool, count: usize) -> f32 {
        let current = self.current_cv();
        let value = current.rem_euclid(1.0) + octave.clamp(MIN_OCTAVE, MAX_OCTAVE) as f32;
        self.write_cv(value, multi_tracks, count)
    }

    /// Sets the pitch class of the edited note, keeping its octave.
    pub fn apply_new_key(&mut self, key: i32, multi_tracks: bool, count: usize) -> f32 {
        let value = self.current_cv().floor() + key.clamp(0, 11) as f32 / 12.0;
        self.write_cv(value, multi_tracks, count)
    }

    /// Writes one random note to the edited step of every target track.
    pub fn randomize_cv(&mut self, multi_tracks: bool, count: usize) -> f32 {
        let value = self.tracks[self.track_index_edit].rng().gen_range(-36..48) as f32 / 12.0;
        self.write_cv(value, multi_tracks, count)
    }

    /// CV of the edited step on the edit track.
    pub fn current_cv(&self) -> f32 {
        let track = self.edit_track();
        track.cv(track.seq_index_edit(), self.step_index_edit)
    }

    fn apply_flag(
        &mut self,
        on: bool,
        multi_tracks: bool,
        count: usize,
        set: fn(&mut SequencerKernel, usize, usize, bool, usize) -> bool,
    ) -> bool {
        let step = self.step_index_edit;
        let mut rejected = false;
        for t in self.targets(multi_tracks) {
            let track = &mut self.tracks[t];
            let seq = track.seq_index_edit();
            rejected |= set(track, seq, step, on, count);
        }
        rejected
    }

    fn edit_attributes(&self) -> StepAttributes {
        let track = self.edit_track();
        track.attributes(track.seq_index_edit(), self.step_index_edit)
    }

    /// Toggles the gate; returns true if a tied step refused it.
    pub fn toggle_gate(&mut self, multi_tracks: bool, count: usize) -> bool {
        let on = !self.edit_attributes().gate();
        self.apply_flag(on, multi_tracks, count, SequencerKernel::set_gate)
    }

    pub fn toggle_gate_p(&mut self, multi_tracks: bool, count: usize) -> bool {
        let on = !self.edit_attributes().gate_p();
        self.apply_flag(on, multi_tracks, count, SequencerKernel::set_gate_p)
    }

    pub fn toggle_gate2(&mut self, multi_tracks: bool, count: usize) -> bool {
        let on = !self.edit_attributes().gate2();
        self.apply_flag(on, multi_tracks, count, SequencerKernel::set_gate2)
    }

    pub fn toggle_slide(&mut self, multi_tracks: bool, count: usize) -> bool {
        let on = !self.edit_attributes().slide();
        self.apply_flag(on, multi_tracks, count, SequencerKernel::set_slide)
    }

    pub fn toggle_tied(&mut self, multi_tracks: bool, count: usize) {
        let on = !self.edit_attributes().tied();
        let step = self.step_index_edit;
        for t in self.targets(multi_tracks) {
            let track = &mut self.tracks[t];
            let seq = track.seq_index_edit();
            track.set_tied(seq, step, on, count);
        }
    }

    fn for_edited_step(&mut self, multi_tracks: bool, mut f: impl FnMut(&mut SequencerKernel, usize, usize)) {
        let step = self.step_index_edit;
        for t in self.targets(multi_tracks) {
            let track = &mut self.tracks[t];
            let seq = track.seq_index_edit();
            f(track, seq, step);
        }
    }

    pub fn set_gate_p_val(&mut self, percent: u8, multi_tracks: bool, count: usize) {
        self.for_edited_step(multi_tracks, |k, seq, step| k.set_gate_p_val(seq, step, percent, count));
    }

    pub fn set_slide_val(&mut self, value: u8, multi_tracks: bool, count: usize) {
        self.for_edited_step(multi_tracks, |k, seq, step| k.set_slide_val(seq, step, value, count));
    }

    pub fn set_velocity_val(&mut self, value: u8, multi_tracks: bool, count: usize) {
        self.for_edited_step(multi_tracks, |k, seq, step| k.set_velocity_val(seq, step, value, count));
    }

    pub fn set_gate_mode(&mut self, mode: GateMode, multi_tracks: bool, count: usize) {
        self.for_edited_step(multi_tracks, |k, seq, step| k.set_gate_mode(seq, step, mode, count));
    }

    pub fn set_gate2_mode(&mut self, mode: GateMode, multi_tracks: bool, count: usize) {
        self.for_edited_step(multi_tracks, |k, seq, step| k.set_gate2_mode(seq, step, mode, count));
    }

    // ---- sequence edits ----

    pub fn set_length(&mut self, length: usize, multi_tracks: bool) {
        self.for_edited_step(multi_tracks, |k, seq, _| k.set_length(seq, length));
    }

    pub fn set_run_mode_seq(&mut self, mode: RunMode, multi_tracks: bool) {
        self.for_edited_step(multi_tracks, |k, seq, _| k.set_run_mode_seq(seq, mode));
    }

    pub fn transpose_seq(&mut self, delta: i32, multi_tracks: bool) {
        self.for_edited_step(multi_tracks, |k, seq, _| k.transpose_seq(seq, delta));
    }

    pub fn rotate_seq(&mut self, direction: RotateDirection, count: usize, multi_tracks: bool) {
        self.for_edited_step(multi_tracks, |k, seq, _| k.rotate_seq(seq, direction, count));
    }

    pub fn init_sequence(&mut self, multi_tracks: bool) {
        self.for_edited_step(multi_tracks, |k, seq, _| k.init_sequence(seq));
    }

    /// Randomizes the edited sequence of the edit track and, for all-tracks
    /// edits, copies the result to the other tracks.
    pub fn randomize_sequence(&mut self, multi_tracks: bool) {
        let edit = self.track_index_edit;
        let seq = self.tracks[edit].seq_index_edit();
        self.tracks[edit].randomize_sequence(seq);
        if multi_tracks {
            for t in 0..self.tracks.len() {
                if let Some((from, to)) = self.split_pair(edit, t) {
                    let dest = to.seq_index_edit();
                    to.copy_sequence_from(from, seq, dest);
                }
            }
        }
    }

    /// Borrows track `src` shared and track `dest` exclusively; `None` when
    /// they are the same track.
    fn split_pair(
        &mut self,
        src: usize,
        dest: usize,
    ) -> Option<(&SequencerKernel, &mut SequencerKernel)> {
        if src == dest || src >= self.tracks.len() || dest >= self.tracks.len() {
            return None;
        }
        let (low, high) = self.tracks.split_at_mut(src.max(dest));
        if src < dest {
            Some((&low[src], &mut high[0]))
        } else {
            Some((&high[0], &mut low[dest]))
        }
    }

    // ---- copy / paste ----

    /// Copies `count` steps from the edited step of the edit track.
    pub fn copy_sequence(&mut self, count: usize) {
        let track = &self.tracks[self.track_index_edit];
        track.copy_sequence(
            &mut self.seq_clipboard,
            track.seq_index_edit(),
            self.step_index_edit,
            count,
        );
    }

    /// Pastes the step buffer at the edited step.
    pub fn paste_sequence(&mut self, multi_tracks: bool) {
        let step = self.step_index_edit;
        for t in self.targets(multi_tracks) {
            let track = &mut self.tracks[t];
            let seq = track.seq_index_edit();
            track.paste_sequence(&self.seq_clipboard, seq, step);
        }
    }

    /// Copies `count` phrases from the edited phrase of the edit track.
    pub fn copy_song(&mut self, count: usize) {
        self.tracks[self.track_index_edit].copy_song(
            &mut self.song_clipboard,
            self.phrase_index_edit,
            count,
        );
    }

    pub fn paste_song(&mut self, multi_tracks: bool) {
        let phrase = self.phrase_index_edit;
        for t in self.targets(multi_tracks) {
            self.tracks[t].paste_song(&self.song_clipboard, phrase);
        }
    }

    pub fn seq_clipboard(&self) -> &SeqClipboard {
        &self.seq_clipboard
    }

    pub fn song_clipboard(&self) -> &SongClipboard {
        &self.song_clipboard
    }

    /// Copies every sequence, the song and the settings of the edit track to
    /// track `dest`.
    pub fn copy_track_to(&mut self, dest: usize) {
        let dest = dest.min(self.tracks.len() - 1);
        if let Some((from, to)) = self.split_pair(self.track_index_edit, dest) {
            to.copy_content_from(from);
        }
    }

    // ---- song edits ----

    pub fn set_phrase_seq_num(&mut self, seq: usize, multi_tracks: bool) {
        let phrase = self.phrase_index_edit;
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_phrase_seq_num(phrase, seq);
        }
    }

    pub fn set_phrase_reps(&mut self, reps: u32, multi_tracks: bool) {
        let phrase = self.phrase_index_edit;
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_phrase_reps(phrase, reps);
        }
    }

    /// Makes the edited phrase the first one played.
    pub fn set_begin(&mut self, multi_tracks: bool) {
        let phrase = self.phrase_index_edit;
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_begin(phrase);
        }
    }

    /// Makes the edited phrase the last one played.
    pub fn set_end(&mut self, multi_tracks: bool) {
        let phrase = self.phrase_index_edit;
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_end(phrase);
        }
    }

    pub fn set_run_mode_song(&mut self, mode: RunMode, multi_tracks: bool) {
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_run_mode_song(mode);
        }
    }

    pub fn init_song(&mut self, multi_tracks: bool) {
        for t in self.targets(multi_tracks) {
            self.tracks[t].init_song();
        }
    }

    /// Phrase at the edited slot of the edit track.
    pub fn edited_phrase(&self) -> Phrase {
        self.edit_track().phrase(self.phrase_index_edit)
    }

    // ---- settings ----

    pub fn set_pulses_per_step(&mut self, pps: u32, multi_tracks: bool) {
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_pulses_per_step(pps);
        }
    }

    pub fn set_delay(&mut self, delay: u32, multi_tracks: bool) {
        for t in self.targets(multi_tracks) {
            self.tracks[t].set_delay(delay);
        }
    }

    /// Hold-tied-notes applies to every track.
    pub fn set_hold_tied_notes(&mut self, hold: bool) {
        for track in self.tracks.iter_mut() {
            track.set_hold_tied_notes(hold);
        }
    }

    pub fn hold_tied_notes(&self) -> bool {
        self.tracks[0].hold_tied_notes()
    }

    // ---- playback ----

    /// Re-initializes every track's run cursor.
    pub fn init_run(&mut self) {
        let editing_sequence = self.editing_sequence;
        for track in self.tracks.iter_mut() {
            track.init_run(editing_sequence);
        }
    }

    /// Clocks every track once. Track 0 goes first; the others receive its
    /// cursor as their master. `on_track` sees each track's outcome.
    pub fn clock_step(&mut self, real_edge: bool, mut on_track: impl FnMut(usize, ClockOutcome)) {
        let editing_sequence = self.editing_sequence;
        let (master, followers) = self.tracks.split_at_mut(1);
        let outcome = master[0].clock_step(real_edge, editing_sequence, None);
        on_track(0, outcome);
        let cursor = master[0].master_cursor();
        for (i, track) in followers.iter_mut().enumerate() {
            let outcome = track.clock_step(real_edge, editing_sequence, Some(cursor));
            on_track(i + 1, outcome);
        }
    }

    /// Per-frame timers of every track and the preview gate.
    pub fn tick(&mut self) {
        for track in self.tracks.iter_mut() {
            track.tick();
        }
        self.editing_gate.frames_left = self.editing_gate.frames_left.saturating_sub(1);
    }

    /// Opens the note-entry preview gate on the edit track for `frames`.
    pub fn start_editing_gate(&mut self, frames: u64, cv: f32) {
        self.editing_gate = EditingGate {
            frames_left: frames,
            cv,
            track: self.track_index_edit,
        };
    }

    /// Preview CV if the preview gate is open on `track`.
    pub fn editing_gate(&self, track: usize) -> Option<f32> {
        (self.editing_gate.frames_left > 0 && self.editing_gate.track == track)
            .then_some(self.editing_gate.cv)
    }

    pub fn cv_out(&self, track: usize) -> f32 {
        self.track(track).cv_out(self.editing_sequence)
    }

    /// CV under the edit cursor of `track`, shown while the transport is
    /// stopped.
    pub fn edit_cv(&self, track: usize) -> f32 {
        let kernel = self.track(track);
        kernel.cv(kernel.seq_index_edit(), self.step_index_edit)
    }

    pub fn gate_out(&self, track: usize, clock_high: bool, trigger_active: bool) -> bool {
        self.track(track).gate_out(clock_high, trigger_active)
    }

    pub fn gate2_out(&self, track: usize, clock_high: bool, trigger_active: bool) -> bool {
        self.track(track).gate2_out(clock_high, trigger_active)
    }

    pub fn velocity_out(&self, track: usize) -> f32 {
        self.track(track).velocity_out(self.editing_sequence)
    }
}
