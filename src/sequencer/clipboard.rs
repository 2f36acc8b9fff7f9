//! Copy buffers for sequences and songs.
//!
//! A buffer is a detached snapshot; it lives until the next copy overwrites
//! it. Storage is sized once from the variant and never grows.

use super::attributes::{Phrase, SeqAttributes, StepAttributes};
use super::run_mode::RunMode;

/// Snapshot of a run of steps plus the sequence's attributes.
#[derive(Clone, Debug, PartialEq)]
pub struct SeqClipboard {
    pub(crate) cv: Box<[f32]>,
    pub(crate) attributes: Box<[StepAttributes]>,
    pub(crate) seq_attr: SeqAttributes,
    pub(crate) stored_len: usize,
}

impl SeqClipboard {
    /// Creates an empty buffer able to hold `capacity` steps.
    pub fn new(capacity: usize) -> Self {
        Self {
            cv: vec![0.0; capacity].into_boxed_slice(),
            attributes: vec![StepAttributes::default(); capacity].into_boxed_slice(),
            seq_attr: SeqAttributes::new(capacity),
            stored_len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.cv.len()
    }

    /// Number of steps held; zero before the first copy.
    pub fn stored_len(&self) -> usize {
        self.stored_len
    }

    pub fn is_empty(&self) -> bool {
        self.stored_len == 0
    }

    /// True when the snapshot spans a whole sequence.
    pub fn is_full_range(&self) -> bool {
        self.stored_len == self.capacity()
    }
}

/// Snapshot of a run of phrases plus the song's range and run mode.
#[derive(Clone, Debug, PartialEq)]
pub struct SongClipboard {
    pub(crate) phrases: Box<[Phrase]>,
    pub(crate) begin: usize,
    pub(crate) end: usize,
    pub(crate) run_mode: RunMode,
    pub(crate) stored_len: usize,
}

impl SongClipboard {
    /// Creates an empty buffer able to hold `capacity` phrases.
    pub fn new(capacity: usize) -> Self {
        Self {
            phrases: vec![Phrase::default(); capacity].into_boxed_slice(),
            begin: 0,
            end: 0,
            run_mode: RunMode::Fwd,
            stored_len: 0,
        }
    }

    pub fn capacity(&self) -> usize {
        self.phrases.len()
    }

    pub fn stored_len(&self) -> usize {
        self.stored_len
    }

    pub fn is_empty(&self) -> bool {
        self.stored_len == 0
    }

    pub fn is_full_range(&self) -> bool {
        self.stored_len == self.capacity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_buffers_are_empty() {
        let seq = SeqClipboard::new(16);
        assert!(seq.is_empty());
        assert_eq!(seq.capacity(), 16);
        assert!(!seq.is_full_range());

        let song = SongClipboard::new(99);
        assert!(song.is_empty());
        assert_eq!(song.capacity(), 99);
    }
}
