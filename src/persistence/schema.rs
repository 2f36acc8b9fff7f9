//! Serialized state of kernels, sequencers and modules.
//!
//! Every struct carries `#[serde(default)]`, so a blob with missing keys or
//! short arrays restores cleanly: absent fields take their init value and
//! short arrays fill only the leading entries. Restored data is then repaired
//! by the kernel's sanitizer, and a warning is logged when anything had to be
//! clamped or dropped.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::dsp::ModuleError;
use crate::sequencer::{
    Phrase, RunCursor, RunMode, Sequence, Sequencer, SequencerKernel, StepAttributes,
};

/// One sequence: attributes plus per-step CV and step attributes. A zero
/// length means the key was absent and keeps the current length.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceState {
    pub length: usize,
    pub run_mode: RunMode,
    pub transpose: i32,
    pub cv: Vec<f32>,
    pub attributes: Vec<StepAttributes>,
}

impl SequenceState {
    pub fn capture(sequence: &Sequence) -> Self {
        Self {
            length: sequence.seq_attr.length,
            run_mode: sequence.seq_attr.run_mode,
            transpose: sequence.seq_attr.transpose,
            cv: sequence.cv.to_vec(),
            attributes: sequence.attributes.to_vec(),
        }
    }

    /// Copies into `sequence`; returns true if entries past its capacity were
    /// dropped.
    fn restore(&self, sequence: &mut Sequence) -> bool {
        let capacity = sequence.capacity();
        for (dst, src) in sequence.cv.iter_mut().zip(&self.cv) {
            *dst = *src;
        }
        for (dst, src) in sequence.attributes.iter_mut().zip(&self.attributes) {
            *dst = *src;
        }
        if self.length > 0 {
            sequence.seq_attr.length = self.length;
        }
        sequence.seq_attr.run_mode = self.run_mode;
        sequence.seq_attr.transpose = self.transpose;
        self.cv.len() > capacity || self.attributes.len() > capacity
    }
}

/// Everything one track needs to resume: sequences, song, settings and the
/// run cursor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KernelState {
    pub pulses_per_step: u32,
    pub delay: u32,
    pub hold_tied_notes: bool,
    pub run_mode_song: RunMode,
    pub begin: usize,
    pub end: usize,
    pub seq_index_edit: usize,
    pub phrases: Vec<Phrase>,
    pub sequences: Vec<SequenceState>,
    pub cursor: RunCursor,
}

impl Default for KernelState {
    fn default() -> Self {
        Self {
            pulses_per_step: 1,
            delay: 0,
            hold_tied_notes: true,
            run_mode_song: RunMode::Fwd,
            begin: 0,
            end: 0,
            seq_index_edit: 0,
            phrases: Vec::new(),
            sequences: Vec::new(),
            cursor: RunCursor::default(),
        }
    }
}

impl KernelState {
    pub fn capture(kernel: &SequencerKernel) -> Self {
        Self {
            pulses_per_step: kernel.pulses_per_step,
            delay: kernel.delay,
            hold_tied_notes: kernel.hold_tied_notes,
            run_mode_song: kernel.run_mode_song,
            begin: kernel.begin,
            end: kernel.end,
            seq_index_edit: kernel.seq_index_edit,
            phrases: kernel.phrases.to_vec(),
            sequences: kernel.sequences.iter().map(SequenceState::capture).collect(),
            cursor: kernel.cursor,
        }
    }

    /// Writes this state into `kernel` and repairs it. Returns true if
    /// anything was truncated or clamped.
    pub fn restore(&self, kernel: &mut SequencerKernel) -> bool {
        let mut changed = self.sequences.len() > kernel.sequences.len()
            || self.phrases.len() > kernel.phrases.len();
        for (dst, src) in kernel.sequences.iter_mut().zip(&self.sequences) {
            changed |= src.restore(dst);
        }
        for (dst, src) in kernel.phrases.iter_mut().zip(&self.phrases) {
            *dst = *src;
        }
        kernel.pulses_per_step = self.pulses_per_step;
        kernel.delay = self.delay;
        kernel.hold_tied_notes = self.hold_tied_notes;
        kernel.run_mode_song = self.run_mode_song;
        kernel.begin = self.begin;
        kernel.end = self.end;
        kernel.seq_index_edit = self.seq_index_edit;
        kernel.cursor = self.cursor;
        changed |= kernel.sanitize();
        changed
    }
}

/// All tracks of a [`Sequencer`] plus its editing cursor.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequencerState {
    pub tracks: Vec<KernelState>,
    pub editing_sequence: bool,
    pub track_index_edit: usize,
    pub step_index_edit: usize,
    pub phrase_index_edit: usize,
    pub auto_step: bool,
}

impl Default for SequencerState {
    fn default() -> Self {
        Self {
            tracks: Vec::new(),
            editing_sequence: true,
            track_index_edit: 0,
            step_index_edit: 0,
            phrase_index_edit: 0,
            auto_step: false,
        }
    }
}

impl SequencerState {
    pub fn capture(sequencer: &Sequencer) -> Self {
        Self {
            tracks: (0..sequencer.num_tracks())
                .map(|t| KernelState::capture(sequencer.track(t)))
                .collect(),
            editing_sequence: sequencer.editing_sequence(),
            track_index_edit: sequencer.track_index_edit(),
            step_index_edit: sequencer.step_index_edit(),
            phrase_index_edit: sequencer.phrase_index_edit(),
            auto_step: sequencer.auto_step(),
        }
    }

    /// Writes this state into `sequencer`, logging a warning if it had to be
    /// repaired. Returns true in that case.
    pub fn restore(&self, sequencer: &mut Sequencer) -> bool {
        let mut changed = self.tracks.len() > sequencer.num_tracks();
        for (dst, src) in sequencer.tracks_mut().iter_mut().zip(&self.tracks) {
            changed |= src.restore(dst);
        }
        sequencer.set_editing_sequence(self.editing_sequence);
        sequencer.set_track_index_edit(self.track_index_edit);
        sequencer.set_step_index_edit(self.step_index_edit);
        sequencer.set_phrase_index_edit(self.phrase_index_edit);
        sequencer.set_auto_step(self.auto_step);
        changed |= sequencer.track_index_edit() != self.track_index_edit
            || sequencer.step_index_edit() != self.step_index_edit
            || sequencer.phrase_index_edit() != self.phrase_index_edit;
        if changed {
            log::warn!(
                "restored {} state was truncated or out of range and has been repaired",
                sequencer.config().name
            );
        }
        changed
    }
}

/// State of a kernel-based sequencer module.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeqModuleState {
    pub sequencer: SequencerState,
    pub running: bool,
    pub reset_on_run: bool,
}

impl Default for SeqModuleState {
    fn default() -> Self {
        Self {
            sequencer: SequencerState::default(),
            running: true,
            reset_on_run: true,
        }
    }
}

/// State of the big-button gate sequencer.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BigButtonState {
    pub channel: usize,
    pub step: usize,
    /// Selected bank per channel.
    pub banks: Vec<usize>,
    /// Gate bits per channel and bank, two words per 128 steps.
    pub gates: Vec<[[u64; 2]; 2]>,
    /// CV per channel, bank and step, flattened in that order.
    pub cv: Vec<f32>,
}

/// State of the master clock.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClockedState {
    pub running: bool,
}

impl Default for ClockedState {
    fn default() -> Self {
        Self { running: true }
    }
}

/// Encodes a state struct as a JSON blob.
pub fn to_bytes<T: Serialize>(state: &T) -> Option<Vec<u8>> {
    match serde_json::to_vec(state) {
        Ok(bytes) => Some(bytes),
        Err(err) => {
            log::warn!("failed to serialize module state: {}", err);
            None
        }
    }
}

/// Decodes a JSON blob; only malformed JSON is an error.
pub fn from_bytes<T: DeserializeOwned>(data: &[u8]) -> Result<T, ModuleError> {
    Ok(serde_json::from_slice(data)?)
}
