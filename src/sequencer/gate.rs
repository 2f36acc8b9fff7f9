//! Gate modes and per-pulse gate codes.
//!
//! When a step spans several clock pulses, its gate follows a rhythmic
//! sub-pattern chosen by [`GateMode`]. The patterns are fixed bit masks over a
//! step divided into 96 (or 24) time units; pulse `n` of a step with `pps`
//! pulses reads bit `n * (units / pps)`.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Sub-pulse pattern of a step's gate.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GateMode {
    /// First quarter of the step.
    Quarter,
    /// Three evenly spaced pulses.
    Tri,
    /// First half of the step.
    Half,
    /// Second and third triplet pulses.
    T23,
    /// First three quarters of the step.
    ThreeQuarters,
    /// Whole step.
    #[default]
    Full,
    /// First triplet pulse only.
    Tr1,
    /// Two pulses.
    Duo,
    /// Second triplet pulse only.
    Tr2,
    /// Second duo pulse only.
    D2,
    /// Third triplet pulse only.
    Tr3,
    /// Short trigger at the start of the step.
    Trig,
}

impl GateMode {
    /// Every gate mode, in table order.
    pub const ALL: [GateMode; 12] = [
        GateMode::Quarter,
        GateMode::Tri,
        GateMode::Half,
        GateMode::T23,
        GateMode::ThreeQuarters,
        GateMode::Full,
        GateMode::Tr1,
        GateMode::Duo,
        GateMode::Tr2,
        GateMode::D2,
        GateMode::Tr3,
        GateMode::Trig,
    ];

    /// Position in the mask tables.
    pub fn index(&self) -> usize {
        *self as usize
    }

    /// Mode at table position `index`, clamped to the last mode.
    pub fn from_index(index: usize) -> Self {
        Self::ALL[index.min(Self::ALL.len() - 1)]
    }

    /// Panel label.
    pub fn label(&self) -> &'static str {
        match self {
            GateMode::Quarter => "25%",
            GateMode::Tri => "TRI",
            GateMode::Half => "50%",
            GateMode::T23 => "T23",
            GateMode::ThreeQuarters => "75%",
            GateMode::Full => "FUL",
            GateMode::Tr1 => "TR1",
            GateMode::Duo => "DUO",
            GateMode::Tr2 => "TR2",
            GateMode::D2 => "D2",
            GateMode::Tr3 => "TR3",
            GateMode::Trig => "TRG",
        }
    }
}

/// What the gate output does for the current pulse.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateCode {
    /// Probability roll failed: silent for every pulse of the step.
    OffForStep,
    /// Silent for this pulse.
    #[default]
    OffForPulse,
    /// High for this pulse.
    On,
    /// Follows the clock input's high time.
    ClockHigh,
    /// Short trigger at the start of the step.
    Trigger,
}

impl GateCode {
    /// Legacy integer encoding (-1 to 3).
    pub fn code(&self) -> i8 {
        match self {
            GateCode::OffForStep => -1,
            GateCode::OffForPulse => 0,
            GateCode::On => 1,
            GateCode::ClockHigh => 2,
            GateCode::Trigger => 3,
        }
    }

    /// Resolves the gate level for this frame.
    ///
    /// `clock_high` is the clock input's current level and `trigger_active`
    /// whether the short-trigger window since the step's first pulse is open.
    pub fn is_high(&self, clock_high: bool, trigger_active: bool) -> bool {
        match self {
            GateCode::On => true,
            GateCode::ClockHigh => clock_high,
            GateCode::Trigger => trigger_active,
            GateCode::OffForStep | GateCode::OffForPulse => false,
        }
    }
}

/// 96-unit masks, low 64 bits.
const MASKS_96_LOW: [u64; 12] = [
    0x0000_0000_00FF_FFFF, // 25%
    0x0000_FFFF_0000_FFFF, // TRI
    0x0000_FFFF_FFFF_FFFF, // 50%
    0x0000_FFFF_0000_0000, // T23
    0xFFFF_FFFF_FFFF_FFFF, // 75%
    0xFFFF_FFFF_FFFF_FFFF, // FUL
    0x0000_0000_0000_FFFF, // TR1
    0xFFFF_0000_00FF_FFFF, // DUO
    0x0000_FFFF_0000_0000, // TR2
    0xFFFF_0000_0000_0000, // D2
    0x0000_0000_0000_0000, // TR3
    0,                     // TRG
];

/// 96-unit masks, high 32 bits.
const MASKS_96_HIGH: [u64; 12] = [
    0x0000_0000, // 25%
    0x0000_FFFF, // TRI
    0x0000_0000, // 50%
    0x0000_FFFF, // T23
    0x0000_00FF, // 75%
    0xFFFF_FFFF, // FUL
    0x0000_0000, // TR1
    0x0000_00FF, // DUO
    0x0000_0000, // TR2
    0x0000_00FF, // D2
    0x0000_FFFF, // TR3
    0,           // TRG
];

/// 24-unit masks.
const MASKS_24: [u32; 12] = [
    0x00_003F, // 25%
    0x0F_0F0F, // TRI
    0x00_0FFF, // 50%
    0x0F_0F00, // T23
    0x03_FFFF, // 75%
    0xFF_FFFF, // FUL
    0x00_000F, // TR1
    0x03_F03F, // DUO
    0x00_0F00, // TR2
    0x03_F000, // D2
    0x0F_0000, // TR3
    0,         // TRG
];

/// Resolution of the gate pattern tables.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateTable {
    /// 96 units per step, allows up to 96 pulses per step.
    Fine96,
    /// 24 units per step, allows up to 24 pulses per step.
    Coarse24,
}

impl GateTable {
    /// Time units per step.
    pub fn units(&self) -> u32 {
        match self {
            GateTable::Fine96 => 96,
            GateTable::Coarse24 => 24,
        }
    }

    /// Reads the pattern bit for pulse `ppqn_count` of `pps` pulses per step.
    pub fn hit(&self, mode: GateMode, ppqn_count: u32, pps: u32) -> bool {
        let pps = pps.clamp(1, self.units());
        let shift = ppqn_count * (self.units() / pps);
        match self {
            GateTable::Fine96 => {
                if shift >= 96 {
                    false
                } else if shift >= 64 {
                    (MASKS_96_HIGH[mode.index()] >> (shift - 64)) & 1 == 1
                } else {
                    (MASKS_96_LOW[mode.index()] >> shift) & 1 == 1
                }
            }
            GateTable::Coarse24 => shift < 24 && (MASKS_24[mode.index()] >> shift) & 1 == 1,
        }
    }
}

/// Gate-relevant view of one step lane.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GateStep {
    /// Gate enabled.
    pub gate: bool,
    /// Probability percent (0 to 100) when the probability gate is on.
    pub probability: Option<u8>,
    /// Sub-pulse pattern.
    pub mode: GateMode,
}

/// Computes the gate code for pulse `ppqn_count` of a step.
///
/// Precondition: called once per pulse in pulse order. The probability roll
/// only happens on pulse 0, and callers keep an [`GateCode::OffForStep`]
/// result for the rest of the step instead of calling again.
pub fn calc_gate_code<R: Rng + ?Sized>(
    step: GateStep,
    ppqn_count: u32,
    pps: u32,
    table: GateTable,
    rng: &mut R,
) -> GateCode {
    if ppqn_count == 0 {
        if let Some(percent) = step.probability {
            let draw: f32 = rng.gen();
            if draw >= f32::from(percent.min(100)) / 100.0 {
                return GateCode::OffForStep;
            }
        }
    }
    if !step.gate {
        return GateCode::OffForPulse;
    }
    pattern_code(step.mode, ppqn_count, pps, table)
}

/// Pattern part of the gate code, for a step whose gate is known to fire.
pub fn pattern_code(mode: GateMode, ppqn_count: u32, pps: u32, table: GateTable) -> GateCode {
    if pps <= 1 && mode == GateMode::Full {
        return GateCode::ClockHigh;
    }
    if mode == GateMode::Trig {
        return if ppqn_count == 0 {
            GateCode::Trigger
        } else {
            GateCode::OffForPulse
        };
    }
    if table.hit(mode, ppqn_count, pps) {
        GateCode::On
    } else {
        GateCode::OffForPulse
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;

    fn on(mode: GateMode) -> GateStep {
        GateStep {
            gate: true,
            probability: None,
            mode,
        }
    }

    fn pattern(mode: GateMode, pps: u32, table: GateTable) -> Vec<bool> {
        (0..pps).map(|n| table.hit(mode, n, pps)).collect()
    }

    #[test]
    fn test_mode_index_round_trip() {
        for (i, mode) in GateMode::ALL.iter().enumerate() {
            assert_eq!(mode.index(), i);
            assert_eq!(GateMode::from_index(i), *mode);
        }
        assert_eq!(GateMode::from_index(99), GateMode::Trig);
    }

    #[test]
    fn test_fine_table_quarter_notes() {
        let t = GateTable::Fine96;
        assert_eq!(pattern(GateMode::Quarter, 4, t), vec![true, false, false, false]);
        assert_eq!(pattern(GateMode::Half, 4, t), vec![true, true, false, false]);
        assert_eq!(pattern(GateMode::ThreeQuarters, 4, t), vec![true, true, true, false]);
        assert_eq!(pattern(GateMode::Full, 4, t), vec![true; 4]);
    }

    #[test]
    fn test_fine_table_triplets() {
        let t = GateTable::Fine96;
        let tri = pattern(GateMode::Tri, 6, t);
        assert_eq!(tri, vec![true, false, true, false, true, false]);
        assert_eq!(pattern(GateMode::Tr1, 6, t), vec![true, false, false, false, false, false]);
        assert_eq!(pattern(GateMode::Tr2, 6, t), vec![false, false, true, false, false, false]);
        assert_eq!(pattern(GateMode::Tr3, 6, t), vec![false, false, false, false, true, false]);
        assert_eq!(pattern(GateMode::T23, 6, t), vec![false, false, true, false, true, false]);
    }

    #[test]
    fn test_fine_table_duos() {
        let t = GateTable::Fine96;
        assert_eq!(pattern(GateMode::Duo, 4, t), vec![true, false, true, false]);
        assert_eq!(pattern(GateMode::D2, 4, t), vec![false, false, true, false]);
    }

    #[test]
    fn test_coarse_table_matches_fine_at_shared_resolutions() {
        for mode in GateMode::ALL {
            for pps in [2, 4, 6, 12, 24] {
                assert_eq!(
                    pattern(mode, pps, GateTable::Coarse24),
                    pattern(mode, pps, GateTable::Fine96),
                    "{:?} at {} pps",
                    mode,
                    pps
                );
            }
        }
    }

    #[test]
    fn test_exact_mask_values() {
        assert_eq!(MASKS_96_LOW[7], 0xFFFF000000FFFFFF);
        assert_eq!(MASKS_96_HIGH[5], 0x00000000FFFFFFFF);
        assert_eq!(MASKS_24[7], 0x03F03F);
        assert_eq!(MASKS_24[3], 0x0F0F00);
    }

    #[test]
    fn test_single_pulse_full_follows_clock() {
        let mut rng = SmallRng::seed_from_u64(1);
        let code = calc_gate_code(on(GateMode::Full), 0, 1, GateTable::Fine96, &mut rng);
        assert_eq!(code, GateCode::ClockHigh);
        let code = calc_gate_code(on(GateMode::Quarter), 0, 1, GateTable::Fine96, &mut rng);
        assert_eq!(code, GateCode::On);
    }

    #[test]
    fn test_trigger_only_on_first_pulse() {
        let mut rng = SmallRng::seed_from_u64(1);
        let first = calc_gate_code(on(GateMode::Trig), 0, 4, GateTable::Fine96, &mut rng);
        let later = calc_gate_code(on(GateMode::Trig), 2, 4, GateTable::Fine96, &mut rng);
        assert_eq!(first, GateCode::Trigger);
        assert_eq!(later, GateCode::OffForPulse);
    }

    #[test]
    fn test_gate_off_is_off_for_pulse() {
        let mut rng = SmallRng::seed_from_u64(1);
        let step = GateStep {
            gate: false,
            probability: None,
            mode: GateMode::Full,
        };
        assert_eq!(
            calc_gate_code(step, 0, 4, GateTable::Fine96, &mut rng),
            GateCode::OffForPulse
        );
    }

    #[test]
    fn test_zero_probability_is_off_for_step() {
        let mut rng = SmallRng::seed_from_u64(3);
        let step = GateStep {
            gate: true,
            probability: Some(0),
            mode: GateMode::Full,
        };
        for _ in 0..100 {
            assert_eq!(
                calc_gate_code(step, 0, 4, GateTable::Fine96, &mut rng),
                GateCode::OffForStep
            );
        }
    }

    #[test]
    fn test_full_probability_always_fires() {
        let mut rng = SmallRng::seed_from_u64(3);
        let step = GateStep {
            gate: true,
            probability: Some(100),
            mode: GateMode::Full,
        };
        for _ in 0..100 {
            assert_eq!(calc_gate_code(step, 0, 4, GateTable::Fine96, &mut rng), GateCode::On);
        }
    }

    #[test]
    fn test_probability_only_rolled_on_first_pulse() {
        let mut rng = SmallRng::seed_from_u64(3);
        let step = GateStep {
            gate: true,
            probability: Some(0),
            mode: GateMode::Full,
        };
        assert_eq!(calc_gate_code(step, 1, 4, GateTable::Fine96, &mut rng), GateCode::On);
    }

    #[test]
    fn test_deterministic_without_probability() {
        let mut rng = SmallRng::seed_from_u64(11);
        for mode in GateMode::ALL {
            for pps in [1, 4, 6, 8, 24, 96] {
                for n in 0..pps {
                    let a = calc_gate_code(on(mode), n, pps, GateTable::Fine96, &mut rng);
                    let b = calc_gate_code(on(mode), n, pps, GateTable::Fine96, &mut rng);
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn test_gate_code_levels() {
        assert!(GateCode::On.is_high(false, false));
        assert!(GateCode::ClockHigh.is_high(true, false));
        assert!(!GateCode::ClockHigh.is_high(false, true));
        assert!(GateCode::Trigger.is_high(false, true));
        assert!(!GateCode::OffForStep.is_high(true, true));
        assert_eq!(GateCode::OffForStep.code(), -1);
        assert_eq!(GateCode::Trigger.code(), 3);
    }
}
