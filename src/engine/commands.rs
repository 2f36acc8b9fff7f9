//! Edit Commands and Sequencer Events
//!
//! Defines the messages that flow between a control thread and the audio
//! thread running a sequencer module. All types here are `Copy` so they can
//! cross the ring buffers without allocating.

use crate::sequencer::{GateMode, RotateDirection, RunMode, Sequencer};

/// Step flag addressed by [`EditCommand::Toggle`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepFlag {
    Gate,
    GateP,
    Gate2,
    Slide,
    Tied,
}

/// Editing gestures sent from the control thread to a sequencer module.
///
/// Commands mirror the [`Sequencer`] editing API. Fields named
/// `multi_tracks` select the all-tracks form, `count` is the number of
/// consecutive steps touched starting at the edit cursor.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum EditCommand {
    /// Move the edit cursor to a track.
    SelectTrack(usize),
    /// Move the edit cursor to a step.
    SelectStep(usize),
    /// Move the edit cursor by a number of steps, wrapping.
    MoveStep(i32),
    SelectPhrase(usize),
    MovePhrase(i32),
    SelectSequence { seq: usize, multi_tracks: bool },
    MoveSequence { delta: i32, multi_tracks: bool },
    /// Play the edited sequence (true) or the song (false).
    SetEditingSequence(bool),

    /// Write a pitch CV at the edit cursor.
    WriteCv { value: f32, multi_tracks: bool, count: usize },
    SetOctave { octave: i32, multi_tracks: bool, count: usize },
    SetKey { key: i32, multi_tracks: bool, count: usize },
    RandomizeCv { multi_tracks: bool, count: usize },
    Toggle { flag: StepFlag, multi_tracks: bool, count: usize },
    SetGatePValue { percent: u8, multi_tracks: bool, count: usize },
    SetSlideValue { value: u8, multi_tracks: bool, count: usize },
    SetVelocity { value: u8, multi_tracks: bool, count: usize },
    SetGateMode { mode: GateMode, multi_tracks: bool, count: usize },
    SetGate2Mode { mode: GateMode, multi_tracks: bool, count: usize },

    SetLength { length: usize, multi_tracks: bool },
    SetRunModeSeq { mode: RunMode, multi_tracks: bool },
    TransposeSeq { delta: i32, multi_tracks: bool },
    RotateSeq {
        direction: RotateDirection,
        count: usize,
        multi_tracks: bool,
    },
    InitSequence { multi_tracks: bool },
    RandomizeSequence { multi_tracks: bool },

    /// Copy `count` steps from the edit cursor.
    CopySequence { count: usize },
    PasteSequence { multi_tracks: bool },
    /// Copy `count` phrases from the edited phrase.
    CopySong { count: usize },
    PasteSong { multi_tracks: bool },
    /// Copy the edit track's content and settings to another track.
    CopyTrack { dest: usize },

    SetPhraseSeq { seq: usize, multi_tracks: bool },
    SetPhraseReps { reps: u32, multi_tracks: bool },
    /// Make the edited phrase the first of the song.
    SetBegin { multi_tracks: bool },
    /// Make the edited phrase the last of the song.
    SetEnd { multi_tracks: bool },
    SetRunModeSong { mode: RunMode, multi_tracks: bool },
    InitSong { multi_tracks: bool },

    SetPulsesPerStep { pps: u32, multi_tracks: bool },
    SetDelay { delay: u32, multi_tracks: bool },
    SetHoldTiedNotes(bool),
    /// Move the edit cursor forward after each CV write.
    SetAutoStep(bool),
    /// Advance every track by one step without a clock edge.
    ManualStep,
    /// Restart every track's cursor.
    InitRun,
    /// Restore init values everywhere.
    Init,
    /// Reseed the random sources for reproducible playback.
    Reseed(u64),
}

impl EditCommand {
    /// Applies the command to `sequencer`.
    ///
    /// Returns true when a gate-class edit was refused because it targeted a
    /// tied step.
    pub fn apply(self, sequencer: &mut Sequencer) -> bool {
        match self {
            EditCommand::SelectTrack(track) => sequencer.set_track_index_edit(track),
            EditCommand::SelectStep(step) => sequencer.set_step_index_edit(step),
            EditCommand::MoveStep(delta) => sequencer.move_step_index_edit(delta),
            EditCommand::SelectPhrase(phrase) => sequencer.set_phrase_index_edit(phrase),
            EditCommand::MovePhrase(delta) => sequencer.move_phrase_index_edit(delta),
            EditCommand::SelectSequence { seq, multi_tracks } => {
                sequencer.set_seq_index_edit(seq, multi_tracks)
            }
            EditCommand::MoveSequence { delta, multi_tracks } => {
                sequencer.move_seq_index_edit(delta, multi_tracks)
            }
            EditCommand::SetEditingSequence(editing) => sequencer.set_editing_sequence(editing),

            EditCommand::WriteCv {
                value,
                multi_tracks,
                count,
            } => {
                sequencer.write_cv(value, multi_tracks, count);
            }
            EditCommand::SetOctave {
                octave,
                multi_tracks,
                count,
            } => {
                sequencer.apply_new_octave(octave, multi_tracks, count);
            }
            EditCommand::SetKey {
                key,
                multi_tracks,
                count,
            } => {
                sequencer.apply_new_key(key, multi_tracks, count);
            }
            EditCommand::RandomizeCv {
                multi_tracks,
                count,
            } => {
                sequencer.randomize_cv(multi_tracks, count);
            }
            EditCommand::Toggle {
                flag,
                multi_tracks,
                count,
            } => {
                return match flag {
                    StepFlag::Gate => sequencer.toggle_gate(multi_tracks, count),
                    StepFlag::GateP => sequencer.toggle_gate_p(multi_tracks, count),
                    StepFlag::Gate2 => sequencer.toggle_gate2(multi_tracks, count),
                    StepFlag::Slide => sequencer.toggle_slide(multi_tracks, count),
                    StepFlag::Tied => {
                        sequencer.toggle_tied(multi_tracks, count);
                        false
                    }
                };
            }
            EditCommand::SetGatePValue {
                percent,
                multi_tracks,
                count,
            } => sequencer.set_gate_p_val(percent, multi_tracks, count),
            EditCommand::SetSlideValue {
                value,
                multi_tracks,
                count,
            } => sequencer.set_slide_val(value, multi_tracks, count),
            EditCommand::SetVelocity {
                value,
                multi_tracks,
                count,
            } => sequencer.set_velocity_val(value, multi_tracks, count),
            EditCommand::SetGateMode {
                mode,
                multi_tracks,
                count,
            } => sequencer.set_gate_mode(mode, multi_tracks, count),
            EditCommand::SetGate2Mode {
                mode,
                multi_tracks,
                count,
            } => sequencer.set_gate2_mode(mode, multi_tracks, count),

            EditCommand::SetLength {
                length,
                multi_tracks,
            } => sequencer.set_length(length, multi_tracks),
            EditCommand::SetRunModeSeq { mode, multi_tracks } => {
                sequencer.set_run_mode_seq(mode, multi_tracks)
            }
            EditCommand::TransposeSeq {
                delta,
                multi_tracks,
            } => sequencer.transpose_seq(delta, multi_tracks),
            EditCommand::RotateSeq {
                direction,
                count,
                multi_tracks,
            } => sequencer.rotate_seq(direction, count, multi_tracks),
            EditCommand::InitSequence { multi_tracks } => sequencer.init_sequence(multi_tracks),
            EditCommand::RandomizeSequence { multi_tracks } => {
                sequencer.randomize_sequence(multi_tracks)
            }

            EditCommand::CopySequence { count } => sequencer.copy_sequence(count),
            EditCommand::PasteSequence { multi_tracks } => sequencer.paste_sequence(multi_tracks),
            EditCommand::CopySong { count } => sequencer.copy_song(count),
            EditCommand::PasteSong { multi_tracks } => sequencer.paste_song(multi_tracks),
            EditCommand::CopyTrack { dest } => sequencer.copy_track_to(dest),

            EditCommand::SetPhraseSeq { seq, multi_tracks } => {
                sequencer.set_phrase_seq_num(seq, multi_tracks)
            }
            EditCommand::SetPhraseReps { reps, multi_tracks } => {
                sequencer.set_phrase_reps(reps, multi_tracks)
            }
            EditCommand::SetBegin { multi_tracks } => sequencer.set_begin(multi_tracks),
            EditCommand::SetEnd { multi_tracks } => sequencer.set_end(multi_tracks),
            EditCommand::SetRunModeSong { mode, multi_tracks } => {
                sequencer.set_run_mode_song(mode, multi_tracks)
            }
            EditCommand::InitSong { multi_tracks } => sequencer.init_song(multi_tracks),

            EditCommand::SetPulsesPerStep { pps, multi_tracks } => {
                sequencer.set_pulses_per_step(pps, multi_tracks)
            }
            EditCommand::SetDelay {
                delay,
                multi_tracks,
            } => sequencer.set_delay(delay, multi_tracks),
            EditCommand::SetHoldTiedNotes(hold) => sequencer.set_hold_tied_notes(hold),
            EditCommand::SetAutoStep(auto_step) => sequencer.set_auto_step(auto_step),
            EditCommand::ManualStep => sequencer.clock_step(false, |_, _| {}),
            EditCommand::InitRun => sequencer.init_run(),
            EditCommand::Init => sequencer.init(),
            EditCommand::Reseed(seed) => {
                for (id, track) in sequencer.tracks_mut().iter_mut().enumerate() {
                    track.reseed(seed.wrapping_add(id as u64));
                }
            }
        }
        false
    }
}

/// Feedback sent from the audio thread to the control thread.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SequencerEvent {
    /// Current run position of a track, sent at the light cadence.
    PlayPosition {
        track: usize,
        step: usize,
        phrase: usize,
    },
    /// A gate-class edit targeted a tied step and was ignored.
    EditRejected,
    /// A track's song moved to another phrase.
    PhraseChanged { track: usize, phrase: usize },
    /// Playback started (true) or stopped (false).
    Running(bool),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sequencer::PHRASE_SEQ_16;

    fn sequencer() -> Sequencer {
        Sequencer::with_seed(&PHRASE_SEQ_16, 3)
    }

    #[test]
    fn test_command_is_copy() {
        let cmd = EditCommand::WriteCv {
            value: 1.0,
            multi_tracks: false,
            count: 1,
        };
        let copied = cmd;
        assert_eq!(cmd, copied);
        assert!(format!("{:?}", cmd).contains("WriteCv"));
    }

    #[test]
    fn test_apply_write_cv_and_select() {
        let mut seq = sequencer();
        EditCommand::SelectStep(3).apply(&mut seq);
        EditCommand::WriteCv {
            value: 0.5,
            multi_tracks: false,
            count: 1,
        }
        .apply(&mut seq);
        assert_eq!(seq.track(0).cv(0, 3), 0.5);
    }

    #[test]
    fn test_apply_reports_rejection() {
        let mut seq = sequencer();
        EditCommand::SelectStep(2).apply(&mut seq);
        let tie = EditCommand::Toggle {
            flag: StepFlag::Tied,
            multi_tracks: false,
            count: 1,
        };
        assert!(!tie.apply(&mut seq));
        let slide = EditCommand::Toggle {
            flag: StepFlag::Slide,
            multi_tracks: false,
            count: 1,
        };
        assert!(slide.apply(&mut seq), "slide on a tied step is refused");
        assert!(!seq.track(0).attributes(0, 2).slide());
    }

    #[test]
    fn test_apply_song_edits() {
        let mut seq = sequencer();
        EditCommand::SelectPhrase(3).apply(&mut seq);
        EditCommand::SetPhraseSeq {
            seq: 5,
            multi_tracks: false,
        }
        .apply(&mut seq);
        EditCommand::SetEnd {
            multi_tracks: false,
        }
        .apply(&mut seq);
        assert_eq!(seq.track(0).phrase(3).seq_num, 5);
        assert_eq!(seq.track(0).end(), 3);
    }

    #[test]
    fn test_apply_settings() {
        let mut seq = sequencer();
        EditCommand::SetPulsesPerStep {
            pps: 5,
            multi_tracks: false,
        }
        .apply(&mut seq);
        EditCommand::SetHoldTiedNotes(false).apply(&mut seq);
        assert_eq!(seq.track(0).pulses_per_step(), 4);
        assert!(!seq.hold_tied_notes());
    }

    #[test]
    fn test_event_copy() {
        let event = SequencerEvent::PlayPosition {
            track: 1,
            step: 7,
            phrase: 0,
        };
        let copied = event;
        assert_eq!(event, copied);
    }
}
