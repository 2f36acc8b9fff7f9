//! Modular Sequencer Library
//!
//! Step-sequencer kernel and the sequencer modules built on it.
//! Modules are driven once per sample by a host and read knob/CV state,
//! writing output voltages and light values.

pub mod dsp;
pub mod engine;
pub mod modules;
pub mod persistence;
pub mod sequencer;
