//! Engine module
//!
//! Cross-thread edit delivery. Editing gestures travel from a control thread
//! to the audio thread as [`EditCommand`] values over lock-free queues, and
//! feedback comes back as [`SequencerEvent`] values.

pub mod channels;
pub mod commands;

pub use channels::{
    AudioHandle, ControlHandle, EditChannels, DEFAULT_COMMAND_BUFFER_SIZE,
    DEFAULT_EVENT_BUFFER_SIZE,
};
pub use commands::{EditCommand, SequencerEvent, StepFlag};
