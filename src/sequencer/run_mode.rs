//! Run modes and the index-advancing state machine.
//!
//! The same engine moves the step cursor through a sequence and the phrase
//! cursor through a song. Each call returns the next index and whether a full
//! traversal cycle (a *boundary*) was completed, which is what makes a song
//! advance to its next phrase.

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Index progression algorithm.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RunMode {
    /// Forward, wrapping to the first index.
    #[default]
    Fwd,
    /// Reverse, wrapping to the last index.
    Rev,
    /// Ping-pong; both endpoints play twice.
    Ppg,
    /// Pendulum; endpoints play once.
    Pen,
    /// Brownian random walk of -1, 0 or +1.
    Brn,
    /// Uniform random.
    Rnd,
    /// Forward, each pass repeated twice before a boundary.
    Fw2,
    /// Forward, each pass repeated three times before a boundary.
    Fw3,
    /// Forward, each pass repeated four times before a boundary.
    Fw4,
    /// Follow the master track's index.
    Tka,
}

impl RunMode {
    /// Every run mode, in panel order.
    pub const ALL: [RunMode; 10] = [
        RunMode::Fwd,
        RunMode::Rev,
        RunMode::Ppg,
        RunMode::Pen,
        RunMode::Brn,
        RunMode::Rnd,
        RunMode::Fw2,
        RunMode::Fw3,
        RunMode::Fw4,
        RunMode::Tka,
    ];

    /// Three-letter panel label.
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Fwd => "FWD",
            RunMode::Rev => "REV",
            RunMode::Ppg => "PPG",
            RunMode::Pen => "PEN",
            RunMode::Brn => "BRN",
            RunMode::Rnd => "RND",
            RunMode::Fw2 => "FW2",
            RunMode::Fw3 => "FW3",
            RunMode::Fw4 => "FW4",
            RunMode::Tka => "TKA",
        }
    }

    /// Parses a panel label.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|m| m.label() == label)
    }

    /// Pass multiplier of the forward family, `None` for other modes.
    pub fn forward_multiplier(&self) -> Option<u32> {
        match self {
            RunMode::Fwd => Some(1),
            RunMode::Fw2 => Some(2),
            RunMode::Fw3 => Some(3),
            RunMode::Fw4 => Some(4),
            _ => None,
        }
    }

    /// True when a fresh run starts on the last index.
    pub fn starts_at_end(&self) -> bool {
        *self == RunMode::Rev
    }

    /// True for the stochastic modes.
    pub fn is_random(&self) -> bool {
        matches!(self, RunMode::Brn | RunMode::Rnd)
    }
}

/// Direction of travel in the two-phase modes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Phase {
    #[default]
    Forward,
    Reverse,
}

/// Continuation state of a run cursor.
///
/// One variant per mode family; a history whose variant does not match the
/// requested mode, or whose counter is exhausted, is re-seeded on the next
/// advance. Switching modes mid-run therefore restarts that mode's phase and
/// repeat counting.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunHistory {
    /// Freshly reset; any mode seeds from here.
    #[default]
    Reset,
    Forward { reps_left: u32 },
    Reverse { reps_left: u32 },
    PingPong { phase: Phase, reps_left: u32 },
    Pendulum { phase: Phase, reps_left: u32 },
    Brownian { steps_left: u32 },
    Random { steps_left: u32 },
}

/// Result of one advance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Advance {
    /// The new index, always in `[0, count)`.
    pub index: usize,
    /// True when this move completed a traversal cycle.
    pub boundary: bool,
}

impl RunHistory {
    /// True while the cursor is travelling towards index 0.
    pub fn is_reversing(&self) -> bool {
        matches!(
            self,
            RunHistory::Reverse { .. }
                | RunHistory::PingPong {
                    phase: Phase::Reverse,
                    ..
                }
                | RunHistory::Pendulum {
                    phase: Phase::Reverse,
                    ..
                }
        )
    }

    /// Moves `index` one position according to `mode`.
    ///
    /// `count` is the number of reachable indices (clamped to at least 1),
    /// `reps` how many full cycles must complete before a boundary is
    /// reported (clamped to at least 1). `master` is the master track's
    /// current index, consulted only by [`RunMode::Tka`]; without a master,
    /// TKA runs forward.
    pub fn advance<R: Rng + ?Sized>(
        &mut self,
        index: usize,
        count: usize,
        mode: RunMode,
        reps: u32,
        master: Option<usize>,
        rng: &mut R,
    ) -> Advance {
        let count = count.max(1);
        let reps = reps.max(1);
        let index = index.min(count - 1);
        let last = count - 1;

        match mode {
            RunMode::Tka => match master {
                Some(master_index) => Advance {
                    index: master_index.min(last),
                    boundary: false,
                },
                None => self.advance_forward(index, last, reps),
            },
            RunMode::Rev => {
                let mut reps_left = match *self {
                    RunHistory::Reverse { reps_left } if reps_left > 0 => reps_left,
                    _ => reps,
                };
                let mut boundary = false;
                let next = if index == 0 {
                    reps_left -= 1;
                    boundary = reps_left == 0;
                    last
                } else {
                    index - 1
                };
                *self = RunHistory::Reverse { reps_left };
                Advance {
                    index: next,
                    boundary,
                }
            }
            RunMode::Ppg | RunMode::Pen => {
                let pendulum = mode == RunMode::Pen;
                let (mut phase, mut reps_left) = match (*self, pendulum) {
                    (RunHistory::PingPong { phase, reps_left }, false)
                    | (RunHistory::Pendulum { phase, reps_left }, true)
                        if reps_left > 0 =>
                    {
                        (phase, reps_left)
                    }
                    _ => (Phase::Forward, reps),
                };
                let mut boundary = false;
                let next = match phase {
                    Phase::Forward => {
                        if index + 1 > last {
                            phase = Phase::Reverse;
                            if pendulum {
                                last.saturating_sub(1)
                            } else {
                                last
                            }
                        } else {
                            index + 1
                        }
                    }
                    Phase::Reverse => {
                        if index == 0 {
                            phase = Phase::Forward;
                            reps_left -= 1;
                            boundary = reps_left == 0;
                            if pendulum {
                                1.min(last)
                            } else {
                                0
                            }
                        } else {
                            index - 1
                        }
                    }
                };
                *self = if pendulum {
                    RunHistory::Pendulum { phase, reps_left }
                } else {
                    RunHistory::PingPong { phase, reps_left }
                };
                Advance {
                    index: next,
                    boundary,
                }
            }
            RunMode::Brn => {
                let mut steps_left = match *self {
                    RunHistory::Brownian { steps_left } if steps_left > 0 => steps_left,
                    _ => count as u32 * reps,
                };
                let next = match rng.gen_range(0..3u8) {
                    0 => {
                        if index == 0 {
                            last
                        } else {
                            index - 1
                        }
                    }
                    1 => index,
                    _ => {
                        if index + 1 > last {
                            0
                        } else {
                            index + 1
                        }
                    }
                };
                steps_left -= 1;
                *self = RunHistory::Brownian { steps_left };
                Advance {
                    index: next,
                    boundary: steps_left == 0,
                }
            }
            RunMode::Rnd => {
                let mut steps_left = match *self {
                    RunHistory::Random { steps_left } if steps_left > 0 => steps_left,
                    _ => count as u32 * reps,
                };
                let next = rng.gen_range(0..count);
                steps_left -= 1;
                *self = RunHistory::Random { steps_left };
                Advance {
                    index: next,
                    boundary: steps_left == 0,
                }
            }
            RunMode::Fwd | RunMode::Fw2 | RunMode::Fw3 | RunMode::Fw4 => {
                let multiplier = mode.forward_multiplier().unwrap_or(1);
                self.advance_forward(index, last, reps * multiplier)
            }
        }
    }

    fn advance_forward(&mut self, index: usize, last: usize, total_reps: u32) -> Advance {
        let mut reps_left = match *self {
            RunHistory::Forward { reps_left } if reps_left > 0 => reps_left,
            _ => total_reps,
        };
        let mut boundary = false;
        let next = if index + 1 > last {
            reps_left -= 1;
            boundary = reps_left == 0;
            0
        } else {
            index + 1
        };
        *self = RunHistory::Forward { reps_left };
        Advance {
            index: next,
            boundary,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::BTreeSet;

    fn rng() -> SmallRng {
        SmallRng::seed_from_u64(7)
    }

    /// Runs `calls` advances from `start`, returning visited indices and the
    /// call numbers (1-based) that reported a boundary.
    fn run(mode: RunMode, count: usize, start: usize, calls: usize) -> (Vec<usize>, Vec<usize>) {
        let mut history = RunHistory::Reset;
        let mut rng = rng();
        let mut index = start;
        let mut visited = Vec::new();
        let mut boundaries = Vec::new();
        for call in 1..=calls {
            let adv = history.advance(index, count, mode, 1, None, &mut rng);
            index = adv.index;
            visited.push(index);
            if adv.boundary {
                boundaries.push(call);
            }
        }
        (visited, boundaries)
    }

    fn covers(visited: &[usize], count: usize) -> bool {
        let set: BTreeSet<_> = visited.iter().copied().collect();
        (0..count).all(|i| set.contains(&i))
    }

    #[test]
    fn test_labels_round_trip() {
        for mode in RunMode::ALL {
            assert_eq!(RunMode::from_label(mode.label()), Some(mode));
        }
        assert_eq!(RunMode::from_label("XYZ"), None);
    }

    #[test]
    fn test_forward_cycle() {
        for count in [1, 2, 3, 16] {
            let (visited, boundaries) = run(RunMode::Fwd, count, 0, count * 3);
            assert!(covers(&visited[..count], count));
            assert_eq!(boundaries, vec![count, count * 2, count * 3], "count {}", count);
        }
    }

    #[test]
    fn test_forward_wraparound_reports_boundary() {
        let mut history = RunHistory::Reset;
        let adv = history.advance(3, 4, RunMode::Fwd, 1, None, &mut rng());
        assert_eq!(adv, Advance { index: 0, boundary: true });
    }

    #[test]
    fn test_reverse_cycle() {
        for count in [1, 2, 3, 16] {
            let (visited, boundaries) = run(RunMode::Rev, count, count - 1, count * 2);
            assert!(covers(&visited[..count], count));
            assert_eq!(boundaries, vec![count, count * 2], "count {}", count);
            assert_eq!(visited[count - 1], count - 1);
        }
    }

    #[test]
    fn test_ping_pong_repeats_endpoints() {
        let (visited, boundaries) = run(RunMode::Ppg, 4, 0, 8);
        assert_eq!(visited, vec![1, 2, 3, 3, 2, 1, 0, 0]);
        assert_eq!(boundaries, vec![8]);
    }

    #[test]
    fn test_ping_pong_cycle_counts() {
        for count in [1, 2, 3, 16] {
            let cycle = 2 * count;
            let (visited, boundaries) = run(RunMode::Ppg, count, 0, cycle * 2);
            assert!(covers(&visited[..cycle], count));
            assert_eq!(boundaries, vec![cycle, cycle * 2], "count {}", count);
        }
    }

    #[test]
    fn test_pendulum_skips_endpoint_repeats() {
        let (visited, boundaries) = run(RunMode::Pen, 4, 0, 12);
        assert_eq!(visited, vec![1, 2, 3, 2, 1, 0, 1, 2, 3, 2, 1, 0]);
        assert_eq!(boundaries, vec![7]);
    }

    #[test]
    fn test_pendulum_small_counts_stay_in_range() {
        for count in [1, 2, 3] {
            let (visited, boundaries) = run(RunMode::Pen, count, 0, 20);
            assert!(visited.iter().all(|&i| i < count));
            assert!(covers(&visited, count));
            assert!(!boundaries.is_empty());
        }
    }

    #[test]
    fn test_pendulum_cycle_length() {
        let count = 16;
        let (_, boundaries) = run(RunMode::Pen, count, 0, 200);
        let gaps: Vec<_> = boundaries.windows(2).map(|w| w[1] - w[0]).collect();
        assert!(gaps.iter().all(|&g| g == 2 * count - 2), "gaps {:?}", gaps);
    }

    #[test]
    fn test_random_modes_stay_in_range_and_report_boundaries() {
        for mode in [RunMode::Brn, RunMode::Rnd] {
            for count in [1, 2, 3, 16] {
                let (visited, boundaries) = run(mode, count, 0, count * 10);
                assert!(visited.iter().all(|&i| i < count), "{:?} left range", mode);
                assert_eq!(boundaries.len(), 10, "{:?} count {}", mode, count);
            }
        }
    }

    #[test]
    fn test_brownian_moves_at_most_one() {
        let mut history = RunHistory::Reset;
        let mut rng = rng();
        let mut index = 5;
        for _ in 0..200 {
            let next = history.advance(index, 16, RunMode::Brn, 1, None, &mut rng).index;
            let dist = (next as i32 - index as i32).abs();
            assert!(dist <= 1 || dist == 15, "jump {} -> {}", index, next);
            index = next;
        }
    }

    #[test]
    fn test_forward_multipliers_delay_boundary() {
        let (_, fw2) = run(RunMode::Fw2, 4, 0, 16);
        let (_, fw3) = run(RunMode::Fw3, 4, 0, 24);
        let (_, fw4) = run(RunMode::Fw4, 4, 0, 16);
        assert_eq!(fw2, vec![8, 16]);
        assert_eq!(fw3, vec![12, 24]);
        assert_eq!(fw4, vec![16]);
    }

    #[test]
    fn test_reps_delay_boundary() {
        let mut history = RunHistory::Reset;
        let mut rng = rng();
        let mut index = 0;
        let mut boundary_at = None;
        for call in 1..=12 {
            let adv = history.advance(index, 4, RunMode::Fwd, 3, None, &mut rng);
            index = adv.index;
            if adv.boundary {
                boundary_at = Some(call);
                break;
            }
        }
        assert_eq!(boundary_at, Some(12));
    }

    #[test]
    fn test_follow_master() {
        let mut history = RunHistory::Reset;
        let mut rng = rng();
        let adv = history.advance(0, 8, RunMode::Tka, 1, Some(5), &mut rng);
        assert_eq!(adv, Advance { index: 5, boundary: false });
        let clamped = history.advance(0, 4, RunMode::Tka, 1, Some(9), &mut rng);
        assert_eq!(clamped.index, 3);
        assert_eq!(history, RunHistory::Reset, "following keeps no state");
    }

    #[test]
    fn test_follow_without_master_runs_forward() {
        let mut history = RunHistory::Reset;
        let adv = history.advance(2, 8, RunMode::Tka, 1, None, &mut rng());
        assert_eq!(adv.index, 3);
    }

    #[test]
    fn test_mode_switch_reseeds_history() {
        let mut history = RunHistory::Forward { reps_left: 1 };
        let mut rng = rng();
        history.advance(2, 4, RunMode::Ppg, 1, None, &mut rng);
        assert_eq!(
            history,
            RunHistory::PingPong {
                phase: Phase::Forward,
                reps_left: 1
            }
        );
    }

    #[test]
    fn test_out_of_range_index_is_clamped() {
        let mut history = RunHistory::Reset;
        let adv = history.advance(40, 4, RunMode::Fwd, 1, None, &mut rng());
        assert_eq!(adv.index, 0);
        assert!(adv.boundary);
    }

    #[test]
    fn test_reversing_phase() {
        let mut history = RunHistory::Reset;
        assert!(!history.is_reversing());
        let mut r = rng();
        history.advance(0, 4, RunMode::Rev, 1, None, &mut r);
        assert!(history.is_reversing());
        let mut history = RunHistory::Reset;
        history.advance(2, 4, RunMode::Ppg, 1, None, &mut r);
        assert!(!history.is_reversing());
        history.advance(3, 4, RunMode::Ppg, 1, None, &mut r);
        assert!(history.is_reversing());
    }
}
