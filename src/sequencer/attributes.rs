//! Per-step, per-sequence and per-phrase attribute types.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::config::KernelConfig;
use super::gate::GateMode;
use super::run_mode::RunMode;

/// Largest slide value any variant accepts.
pub const SLIDE_VALUE_LIMIT: u8 = 200;
/// Largest velocity any variant accepts.
pub const VELOCITY_LIMIT: u8 = 200;
/// Transpose offsets are kept within this many semitones of zero.
pub const TRANSPOSE_LIMIT: i32 = 99;

const GATE: u64 = 1 << 0;
const GATE_P: u64 = 1 << 1;
const GATE2: u64 = 1 << 2;
const SLIDE: u64 = 1 << 3;
const TIED: u64 = 1 << 4;
const GATE_P_VALUE_SHIFT: u32 = 8;
const SLIDE_VALUE_SHIFT: u32 = 16;
const GATE_MODE_SHIFT: u32 = 24;
const GATE2_MODE_SHIFT: u32 = 28;
const VELOCITY_SHIFT: u32 = 32;
const BYTE: u64 = 0xFF;
const NIBBLE: u64 = 0xF;

/// Playback attributes of one step, packed into a single integer.
///
/// A tied step never starts a note of its own: setting `tied` clears the
/// gate, probability gate, gate2 and slide flags, and those flags cannot be
/// set again while the step stays tied.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StepAttributes(u64);

impl StepAttributes {
    /// Attributes of a freshly initialized step.
    pub const INIT: StepAttributes = StepAttributes(
        GATE | GATE2
            | (50 << GATE_P_VALUE_SHIFT)
            | (10 << SLIDE_VALUE_SHIFT)
            | ((GateMode::Full as u64) << GATE_MODE_SHIFT)
            | ((GateMode::Full as u64) << GATE2_MODE_SHIFT)
            | (100 << VELOCITY_SHIFT),
    );

    /// Wraps a raw packed value without validation.
    pub fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Packed representation.
    pub fn raw(&self) -> u64 {
        self.0
    }

    fn flag(&self, mask: u64) -> bool {
        self.0 & mask != 0
    }

    fn put_flag(&mut self, mask: u64, on: bool) {
        if on {
            self.0 |= mask;
        } else {
            self.0 &= !mask;
        }
    }

    fn field(&self, shift: u32, mask: u64) -> u64 {
        (self.0 >> shift) & mask
    }

    fn put_field(&mut self, shift: u32, mask: u64, value: u64) {
        self.0 = (self.0 & !(mask << shift)) | ((value & mask) << shift);
    }

    pub fn gate(&self) -> bool {
        self.flag(GATE)
    }

    pub fn gate_p(&self) -> bool {
        self.flag(GATE_P)
    }

    pub fn gate2(&self) -> bool {
        self.flag(GATE2)
    }

    pub fn slide(&self) -> bool {
        self.flag(SLIDE)
    }

    pub fn tied(&self) -> bool {
        self.flag(TIED)
    }

    /// Probability percent used when the probability gate is on.
    pub fn gate_p_value(&self) -> u8 {
        self.field(GATE_P_VALUE_SHIFT, BYTE) as u8
    }

    pub fn slide_value(&self) -> u8 {
        self.field(SLIDE_VALUE_SHIFT, BYTE) as u8
    }

    pub fn gate_mode(&self) -> GateMode {
        GateMode::from_index(self.field(GATE_MODE_SHIFT, NIBBLE) as usize)
    }

    pub fn gate2_mode(&self) -> GateMode {
        GateMode::from_index(self.field(GATE2_MODE_SHIFT, NIBBLE) as usize)
    }

    pub fn velocity(&self) -> u8 {
        self.field(VELOCITY_SHIFT, BYTE) as u8
    }

    /// Probability of the gate firing, if the probability gate is on.
    pub fn probability(&self) -> Option<u8> {
        self.gate_p().then(|| self.gate_p_value())
    }

    /// Sets the gate flag. Ignored on a tied step.
    pub fn set_gate(&mut self, on: bool) {
        if !self.tied() {
            self.put_flag(GATE, on);
        }
    }

    /// Sets the probability-gate flag. Ignored on a tied step.
    pub fn set_gate_p(&mut self, on: bool) {
        if !self.tied() {
            self.put_flag(GATE_P, on);
        }
    }

    /// Sets the gate2 flag. Ignored on a tied step.
    pub fn set_gate2(&mut self, on: bool) {
        if !self.tied() {
            self.put_flag(GATE2, on);
        }
    }

    /// Sets the slide flag. Ignored on a tied step.
    pub fn set_slide(&mut self, on: bool) {
        if !self.tied() {
            self.put_flag(SLIDE, on);
        }
    }

    /// Sets or clears the tie. Tying clears gate, gate2, probability and
    /// slide; untying leaves them cleared.
    pub fn set_tied(&mut self, on: bool) {
        self.put_flag(TIED, on);
        if on {
            self.0 &= !(GATE | GATE_P | GATE2 | SLIDE);
        }
    }

    pub fn set_gate_p_value(&mut self, percent: u8) {
        self.put_field(GATE_P_VALUE_SHIFT, BYTE, u64::from(percent.min(100)));
    }

    pub fn set_slide_value(&mut self, value: u8) {
        self.put_field(SLIDE_VALUE_SHIFT, BYTE, u64::from(value.min(SLIDE_VALUE_LIMIT)));
    }

    pub fn set_gate_mode(&mut self, mode: GateMode) {
        self.put_field(GATE_MODE_SHIFT, NIBBLE, mode.index() as u64);
    }

    pub fn set_gate2_mode(&mut self, mode: GateMode) {
        self.put_field(GATE2_MODE_SHIFT, NIBBLE, mode.index() as u64);
    }

    pub fn set_velocity(&mut self, value: u8) {
        self.put_field(VELOCITY_SHIFT, BYTE, u64::from(value.min(VELOCITY_LIMIT)));
    }

    /// Returns a copy with every field brought into the variant's ranges and
    /// the tie rule re-applied. Unused bits are dropped.
    pub fn sanitized(&self, config: &KernelConfig) -> Self {
        let mut out = StepAttributes(0);
        out.put_flag(GATE, self.gate());
        out.put_flag(GATE_P, self.gate_p());
        out.put_flag(GATE2, self.gate2());
        out.put_flag(SLIDE, self.slide());
        out.set_gate_p_value(self.gate_p_value());
        out.set_slide_value(self.slide_value().min(config.slide_max));
        out.set_gate_mode(self.gate_mode());
        out.set_gate2_mode(self.gate2_mode());
        out.set_velocity(self.velocity().min(config.velocity_max));
        out.set_tied(self.tied());
        out
    }

    /// Produces random, legal attributes for the variant.
    pub fn random<R: Rng + ?Sized>(rng: &mut R, config: &KernelConfig) -> Self {
        let mut out = StepAttributes(0);
        out.put_flag(GATE, rng.gen_bool(0.5));
        out.put_flag(GATE_P, rng.gen_bool(0.5));
        out.put_flag(GATE2, config.has_gate2 && rng.gen_bool(0.5));
        out.put_flag(SLIDE, rng.gen_bool(0.5));
        out.set_gate_p_value(rng.gen_range(0..=100));
        out.set_slide_value(rng.gen_range(0..=config.slide_max));
        out.set_gate_mode(GateMode::from_index(rng.gen_range(0..GateMode::ALL.len())));
        if config.has_gate2 {
            out.set_gate2_mode(GateMode::from_index(rng.gen_range(0..GateMode::ALL.len())));
        }
        if config.has_velocity {
            out.set_velocity(rng.gen_range(0..=config.velocity_max));
        }
        out.set_tied(rng.gen_bool(0.25));
        out
    }
}

impl Default for StepAttributes {
    fn default() -> Self {
        Self::INIT
    }
}

impl std::fmt::Debug for StepAttributes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepAttributes")
            .field("gate", &self.gate())
            .field("gate_p", &self.gate_p())
            .field("gate2", &self.gate2())
            .field("slide", &self.slide())
            .field("tied", &self.tied())
            .field("gate_p_value", &self.gate_p_value())
            .field("slide_value", &self.slide_value())
            .field("gate_mode", &self.gate_mode())
            .field("gate2_mode", &self.gate2_mode())
            .field("velocity", &self.velocity())
            .finish()
    }
}

/// Length, run mode and transpose offset of a sequence.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeqAttributes {
    pub length: usize,
    pub run_mode: RunMode,
    pub transpose: i32,
}

impl SeqAttributes {
    pub fn new(length: usize) -> Self {
        Self {
            length: length.max(1),
            run_mode: RunMode::Fwd,
            transpose: 0,
        }
    }

    /// Sets the length, clamped to `[1, max_steps]`.
    pub fn set_length(&mut self, length: usize, max_steps: usize) {
        self.length = length.clamp(1, max_steps.max(1));
    }

    /// Accumulates a transpose offset, saturating at the display limit.
    pub fn add_transpose(&mut self, delta: i32) {
        self.transpose = self
            .transpose
            .saturating_add(delta)
            .clamp(-TRANSPOSE_LIMIT, TRANSPOSE_LIMIT);
    }
}

/// One slot of a song.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Phrase {
    /// Sequence played by this slot.
    pub seq_num: usize,
    /// Times the sequence repeats; zero skips the slot.
    pub reps: u32,
}

impl Phrase {
    /// Largest repeat count a phrase accepts.
    pub const MAX_REPS: u32 = 99;

    pub fn new(seq_num: usize, reps: u32) -> Self {
        Self {
            seq_num,
            reps: reps.min(Self::MAX_REPS),
        }
    }

    /// Whether the song engine stops on this slot.
    pub fn is_playable(&self) -> bool {
        self.reps > 0
    }
}

impl Default for Phrase {
    fn default() -> Self {
        Self::new(0, 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::config::{MULTI_TRACK, PHRASE_SEQ_16};
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    #[test]
    fn test_init_attributes() {
        let a = StepAttributes::default();
        assert!(a.gate());
        assert!(a.gate2());
        assert!(!a.gate_p());
        assert!(!a.slide());
        assert!(!a.tied());
        assert_eq!(a.gate_p_value(), 50);
        assert_eq!(a.slide_value(), 10);
        assert_eq!(a.gate_mode(), GateMode::Full);
        assert_eq!(a.velocity(), 100);
    }

    #[test]
    fn test_fields_are_independent() {
        let mut a = StepAttributes::default();
        a.set_gate_mode(GateMode::Tr3);
        a.set_gate2_mode(GateMode::Duo);
        a.set_velocity(7);
        a.set_slide_value(199);
        a.set_gate_p_value(33);
        assert_eq!(a.gate_mode(), GateMode::Tr3);
        assert_eq!(a.gate2_mode(), GateMode::Duo);
        assert_eq!(a.velocity(), 7);
        assert_eq!(a.slide_value(), 199);
        assert_eq!(a.gate_p_value(), 33);
        assert!(a.gate());
    }

    #[test]
    fn test_setters_clamp() {
        let mut a = StepAttributes::default();
        a.set_gate_p_value(250);
        a.set_slide_value(255);
        a.set_velocity(255);
        assert_eq!(a.gate_p_value(), 100);
        assert_eq!(a.slide_value(), SLIDE_VALUE_LIMIT);
        assert_eq!(a.velocity(), VELOCITY_LIMIT);
    }

    #[test]
    fn test_tie_clears_note_flags() {
        let mut a = StepAttributes::default();
        a.set_gate_p(true);
        a.set_slide(true);
        a.set_tied(true);
        assert!(!a.gate() && !a.gate_p() && !a.gate2() && !a.slide());

        a.set_gate(true);
        a.set_slide(true);
        assert!(!a.gate() && !a.slide(), "flags stay cleared while tied");

        a.set_tied(false);
        assert!(!a.gate(), "untying does not restore the gate");
        a.set_gate(true);
        assert!(a.gate());
    }

    #[test]
    fn test_probability() {
        let mut a = StepAttributes::default();
        assert_eq!(a.probability(), None);
        a.set_gate_p(true);
        a.set_gate_p_value(20);
        assert_eq!(a.probability(), Some(20));
    }

    #[test]
    fn test_random_is_legal() {
        let mut rng = SmallRng::seed_from_u64(5);
        for _ in 0..500 {
            let a = StepAttributes::random(&mut rng, &PHRASE_SEQ_16);
            if a.tied() {
                assert!(!a.gate() && !a.gate_p() && !a.gate2() && !a.slide());
            }
            assert!(a.slide_value() <= PHRASE_SEQ_16.slide_max);
            assert!(a.gate_p_value() <= 100);
            assert_eq!(a.velocity(), 0, "no velocity lane");
        }
    }

    #[test]
    fn test_sanitized_repairs_raw_values() {
        let a = StepAttributes::from_raw(u64::MAX);
        let s = a.sanitized(&MULTI_TRACK);
        assert!(s.tied());
        assert!(!s.gate() && !s.slide());
        assert_eq!(s.gate_p_value(), 100);
        assert!(s.slide_value() <= MULTI_TRACK.slide_max);
        assert_eq!(s.gate_mode(), GateMode::Trig);
        assert_eq!(s.raw() >> 40, 0);
    }

    #[test]
    fn test_sanitized_keeps_legal_values() {
        let a = StepAttributes::default();
        assert_eq!(a.sanitized(&MULTI_TRACK), a);
    }

    #[test]
    fn test_seq_attributes() {
        let mut s = SeqAttributes::new(16);
        s.set_length(0, 16);
        assert_eq!(s.length, 1);
        s.set_length(40, 16);
        assert_eq!(s.length, 16);
        s.add_transpose(90);
        s.add_transpose(20);
        assert_eq!(s.transpose, 99);
        s.add_transpose(-250);
        assert_eq!(s.transpose, -99);
    }

    #[test]
    fn test_phrase() {
        assert!(Phrase::default().is_playable());
        assert!(!Phrase::new(3, 0).is_playable());
        assert_eq!(Phrase::new(0, 500).reps, Phrase::MAX_REPS);
    }
}
