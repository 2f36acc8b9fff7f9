//! Edit Channels
//!
//! Lock-free communication between a control thread and the audio thread
//! running a sequencer module. Uses rtrb ring buffers for SPSC
//! (single-producer, single-consumer) queues.

use rtrb::{Consumer, Producer, RingBuffer};

use super::commands::{EditCommand, SequencerEvent};

/// Default buffer size for the edit queue (control -> audio).
pub const DEFAULT_COMMAND_BUFFER_SIZE: usize = 256;

/// Default buffer size for the event queue (audio -> control).
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 64;

/// Holds both directions of communication channels.
/// Split into producer/consumer pairs for the two threads.
pub struct EditChannels {
    command_tx: Producer<EditCommand>,
    command_rx: Consumer<EditCommand>,
    event_tx: Producer<SequencerEvent>,
    event_rx: Consumer<SequencerEvent>,
}

impl EditChannels {
    /// Creates channels holding up to `command_capacity` edits and
    /// `event_capacity` events.
    pub fn new(command_capacity: usize, event_capacity: usize) -> Self {
        let (command_tx, command_rx) = RingBuffer::new(command_capacity);
        let (event_tx, event_rx) = RingBuffer::new(event_capacity);

        Self {
            command_tx,
            command_rx,
            event_tx,
            event_rx,
        }
    }

    /// Creates channels with default buffer sizes.
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_COMMAND_BUFFER_SIZE, DEFAULT_EVENT_BUFFER_SIZE)
    }

    /// Splits the channels into control-side and audio-side handles that can
    /// be sent to different threads.
    pub fn split(self) -> (ControlHandle, AudioHandle) {
        let control = ControlHandle {
            command_tx: self.command_tx,
            event_rx: self.event_rx,
        };
        let audio = AudioHandle {
            command_rx: self.command_rx,
            event_tx: self.event_tx,
        };
        (control, audio)
    }
}

impl Default for EditChannels {
    fn default() -> Self {
        Self::with_defaults()
    }
}

/// Control-side handle: sends edits, receives feedback.
pub struct ControlHandle {
    command_tx: Producer<EditCommand>,
    event_rx: Consumer<SequencerEvent>,
}

impl ControlHandle {
    /// Queues an edit.
    /// Returns Err(cmd) if the buffer is full; the edit is never lost silently.
    pub fn send(&mut self, cmd: EditCommand) -> Result<(), EditCommand> {
        self.command_tx.push(cmd).map_err(|rtrb::PushError::Full(cmd)| {
            log::debug!("edit queue full, returning {:?}", cmd);
            cmd
        })
    }

    /// Receives one event, if any.
    pub fn recv_event(&mut self) -> Option<SequencerEvent> {
        self.event_rx.pop().ok()
    }

    /// Drains all pending events.
    pub fn drain_events(&mut self) -> impl Iterator<Item = SequencerEvent> + '_ {
        std::iter::from_fn(|| self.recv_event())
    }

    /// Number of edits that can still be queued.
    pub fn command_slots_available(&self) -> usize {
        self.command_tx.slots()
    }

    pub fn is_command_buffer_full(&self) -> bool {
        self.command_tx.is_full()
    }
}

/// Audio-side handle: receives edits, sends feedback.
///
/// All methods are real-time safe (non-blocking, no allocations).
pub struct AudioHandle {
    command_rx: Consumer<EditCommand>,
    event_tx: Producer<SequencerEvent>,
}

impl AudioHandle {
    /// Receives one edit, if any.
    pub fn recv_command(&mut self) -> Option<EditCommand> {
        self.command_rx.pop().ok()
    }

    /// Runs `handler` on every pending edit, in order.
    pub fn process_commands<F>(&mut self, mut handler: F)
    where
        F: FnMut(EditCommand),
    {
        while let Some(cmd) = self.recv_command() {
            handler(cmd);
        }
    }

    /// Sends an event, dropping it if the control side is not keeping up.
    pub fn send_event_lossy(&mut self, event: SequencerEvent) {
        let _ = self.event_tx.push(event);
    }

    /// Number of edits waiting.
    pub fn commands_pending(&self) -> usize {
        self.command_rx.slots()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(value: f32) -> EditCommand {
        EditCommand::WriteCv {
            value,
            multi_tracks: false,
            count: 1,
        }
    }

    #[test]
    fn test_default_channels() {
        let (control, audio) = EditChannels::with_defaults().split();
        assert_eq!(control.command_slots_available(), DEFAULT_COMMAND_BUFFER_SIZE);
        assert_eq!(audio.commands_pending(), 0);
    }

    #[test]
    fn test_command_send_receive() {
        let (mut control, mut audio) = EditChannels::new(8, 8).split();
        assert!(control.send(EditCommand::SelectStep(4)).is_ok());
        assert_eq!(audio.recv_command(), Some(EditCommand::SelectStep(4)));
        assert!(audio.recv_command().is_none());
    }

    #[test]
    fn test_full_queue_returns_command() {
        let (mut control, _audio) = EditChannels::new(2, 2).split();
        assert!(control.send(write(0.0)).is_ok());
        assert!(control.send(write(1.0)).is_ok());
        assert!(control.is_command_buffer_full());
        assert_eq!(control.send(write(2.0)), Err(write(2.0)));
    }

    #[test]
    fn test_process_commands_in_order() {
        let (mut control, mut audio) = EditChannels::new(8, 8).split();
        control.send(write(0.0)).unwrap();
        control.send(write(1.0)).unwrap();
        control.send(EditCommand::InitRun).unwrap();
        assert_eq!(audio.commands_pending(), 3);

        let mut received = Vec::new();
        audio.process_commands(|cmd| received.push(cmd));
        assert_eq!(received, vec![write(0.0), write(1.0), EditCommand::InitRun]);
    }

    #[test]
    fn test_events_are_lossy() {
        let (mut control, mut audio) = EditChannels::new(1, 1).split();
        audio.send_event_lossy(SequencerEvent::EditRejected);
        audio.send_event_lossy(SequencerEvent::Running(true));
        let events: Vec<_> = control.drain_events().collect();
        assert_eq!(events, vec![SequencerEvent::EditRejected]);
    }

    #[test]
    fn test_handles_are_send() {
        fn assert_send<T: Send>() {}
        assert_send::<ControlHandle>();
        assert_send::<AudioHandle>();
    }
}
