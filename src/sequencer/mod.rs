//! Sequencer kernel
//!
//! Step storage, run modes, gate codes and the per-track playback cursor
//! shared by every sequencer module, plus the multi-track orchestrator.

pub mod attributes;
pub mod clipboard;
pub mod config;
pub mod gate;
pub mod kernel;
pub mod multi_track;
pub mod run_mode;

pub use attributes::{Phrase, SeqAttributes, StepAttributes};
pub use clipboard::{SeqClipboard, SongClipboard};
pub use config::{KernelConfig, BIG_BUTTON_SEQ, MULTI_TRACK, PHRASE_SEQ_16, PHRASE_SEQ_32};
pub use gate::{GateCode, GateMode, GateTable};
pub use kernel::{
    ClockOutcome, MasterCursor, RotateDirection, RunCursor, Sequence, SequencerKernel, MAX_DELAY,
};
pub use multi_track::{EditingGate, Sequencer, EDITING_GATE_SECONDS};
pub use run_mode::{RunHistory, RunMode};
