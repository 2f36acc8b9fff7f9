//! Variant descriptors.
//!
//! Every sequencer in the family shares one kernel. What differs between them
//! (capacities, gate-table resolution, the run modes offered at sequence and
//! song level, the pulses-per-step choices) is described by a static
//! [`KernelConfig`].

use super::gate::GateTable;
use super::run_mode::RunMode;

/// Static description of one sequencer variant.
#[derive(Debug, PartialEq, Eq)]
pub struct KernelConfig {
    pub name: &'static str,
    /// Tracks (or channels) driven in parallel.
    pub num_tracks: usize,
    /// Step capacity of one sequence.
    pub max_steps: usize,
    /// Sequences per track.
    pub max_seqs: usize,
    /// Song slots per track.
    pub max_phrases: usize,
    pub gate_table: GateTable,
    /// Run modes offered for sequences, in panel order.
    pub seq_modes: &'static [RunMode],
    /// Run modes offered for the song, in panel order.
    pub song_modes: &'static [RunMode],
    /// Pulses-per-step choices, ascending.
    pub pps_values: &'static [u32],
    pub slide_max: u8,
    pub velocity_max: u8,
    pub has_gate2: bool,
    pub has_velocity: bool,
}

const PPS_24: &[u32] = &[1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24];
const PPS_96: &[u32] = &[1, 2, 4, 6, 8, 10, 12, 14, 16, 18, 20, 22, 24, 48, 96];

const MODES_MULTI_TRACK: &[RunMode] = &[
    RunMode::Fwd,
    RunMode::Rev,
    RunMode::Ppg,
    RunMode::Pen,
    RunMode::Brn,
    RunMode::Rnd,
    RunMode::Tka,
];

const MODES_PHRASE_SEQ: &[RunMode] = &[
    RunMode::Fwd,
    RunMode::Rev,
    RunMode::Ppg,
    RunMode::Pen,
    RunMode::Brn,
    RunMode::Rnd,
    RunMode::Fw2,
    RunMode::Fw3,
    RunMode::Fw4,
];

const SONG_MODES_PHRASE_SEQ: &[RunMode] = &[
    RunMode::Fwd,
    RunMode::Rev,
    RunMode::Ppg,
    RunMode::Pen,
    RunMode::Brn,
    RunMode::Rnd,
];

const MODES_FWD_ONLY: &[RunMode] = &[RunMode::Fwd];

/// Four-track kernel with 96-unit gate patterns.
pub static MULTI_TRACK: KernelConfig = KernelConfig {
    name: "MultiTrack",
    num_tracks: 4,
    max_steps: 32,
    max_seqs: 64,
    max_phrases: 99,
    gate_table: GateTable::Fine96,
    seq_modes: MODES_MULTI_TRACK,
    song_modes: MODES_MULTI_TRACK,
    pps_values: PPS_96,
    slide_max: 100,
    velocity_max: 200,
    has_gate2: false,
    has_velocity: true,
};

pub static PHRASE_SEQ_16: KernelConfig = KernelConfig {
    name: "PhraseSeq16",
    num_tracks: 1,
    max_steps: 16,
    max_seqs: 16,
    max_phrases: 16,
    gate_table: GateTable::Coarse24,
    seq_modes: MODES_PHRASE_SEQ,
    song_modes: SONG_MODES_PHRASE_SEQ,
    pps_values: PPS_24,
    slide_max: 100,
    velocity_max: 0,
    has_gate2: true,
    has_velocity: false,
};

pub static PHRASE_SEQ_32: KernelConfig = KernelConfig {
    name: "PhraseSeq32",
    num_tracks: 1,
    max_steps: 32,
    max_seqs: 32,
    max_phrases: 32,
    gate_table: GateTable::Coarse24,
    seq_modes: MODES_PHRASE_SEQ,
    song_modes: SONG_MODES_PHRASE_SEQ,
    pps_values: PPS_24,
    slide_max: 100,
    velocity_max: 0,
    has_gate2: true,
    has_velocity: false,
};

/// Six gate channels, 128 steps, forward only.
pub static BIG_BUTTON_SEQ: KernelConfig = KernelConfig {
    name: "BigButtonSeq",
    num_tracks: 6,
    max_steps: 128,
    max_seqs: 2,
    max_phrases: 1,
    gate_table: GateTable::Fine96,
    seq_modes: MODES_FWD_ONLY,
    song_modes: MODES_FWD_ONLY,
    pps_values: &[1],
    slide_max: 0,
    velocity_max: 0,
    has_gate2: false,
    has_velocity: false,
};

impl KernelConfig {
    /// Every built-in variant.
    pub fn all() -> [&'static KernelConfig; 4] {
        [&MULTI_TRACK, &PHRASE_SEQ_16, &PHRASE_SEQ_32, &BIG_BUTTON_SEQ]
    }

    pub fn allows_seq_mode(&self, mode: RunMode) -> bool {
        self.seq_modes.contains(&mode)
    }

    pub fn allows_song_mode(&self, mode: RunMode) -> bool {
        self.song_modes.contains(&mode)
    }

    /// `mode` if the variant offers it for sequences, otherwise forward.
    pub fn seq_mode_or_fwd(&self, mode: RunMode) -> RunMode {
        if self.allows_seq_mode(mode) {
            mode
        } else {
            RunMode::Fwd
        }
    }

    /// `mode` if the variant offers it for the song, otherwise forward.
    pub fn song_mode_or_fwd(&self, mode: RunMode) -> RunMode {
        if self.allows_song_mode(mode) {
            mode
        } else {
            RunMode::Fwd
        }
    }

    /// Snaps a pulses-per-step request to the largest table entry not above
    /// it (the smallest entry for requests below the table).
    pub fn snap_pps(&self, requested: u32) -> u32 {
        self.pps_values
            .iter()
            .copied()
            .filter(|&v| v <= requested)
            .last()
            .or_else(|| self.pps_values.first().copied())
            .unwrap_or(1)
    }

    /// Pulses-per-step for a panel knob position.
    pub fn pps_at(&self, index: usize) -> u32 {
        self.pps_values
            .get(index.min(self.pps_values.len().saturating_sub(1)))
            .copied()
            .unwrap_or(1)
    }
}
