//! Modules module
//!
//! Built-in sequencer and clock modules.
//! The kernel-based sequencers share their transport loop through `seq_core`.

pub mod big_button;
pub mod clock;
pub mod multitrack;
pub mod phrase_seq;
pub mod seq_core;

// Re-export commonly used types
pub use big_button::BigButtonSeq;
pub use clock::{ClockRatio, Clocked};
pub use multitrack::MultiTrackSeq;
pub use phrase_seq::{PhraseSeq, PhraseSeq16, PhraseSeq32};
pub use seq_core::{SeqCore, TrackFrame, TransportInput};
