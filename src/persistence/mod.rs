//! Persistence module
//!
//! Module state blobs and preset files using serde and JSON.

pub mod preset;
pub mod schema;

pub use preset::{load_from_file, save_to_file, Preset, PresetError, PRESET_VERSION};
pub use schema::{
    BigButtonState, ClockedState, KernelState, SeqModuleState, SequenceState, SequencerState,
};
