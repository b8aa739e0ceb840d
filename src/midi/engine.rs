use crossbeam::channel::{Receiver, RecvTimeoutError};
use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Custom error type for MIDI operations
#[derive(Debug, Clone, PartialEq)]
pub enum MidiError {
    /// Error when sending a MIDI message or scheduling an event
    SendError(String),
    /// Error when receiving a MIDI message
    RecvError(String),
    /// Error when connecting to a MIDI device
    ConnectionError(String),
}

impl fmt::Display for MidiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MidiError::SendError(msg) => write!(f, "MIDI send error: {}", msg),
            MidiError::RecvError(msg) => write!(f, "MIDI receive error: {}", msg),
            MidiError::ConnectionError(msg) => write!(f, "MIDI connection error: {}", msg),
        }
    }
}

impl Error for MidiError {}

/// Result type for MIDI operations
pub type Result<T> = std::result::Result<T, MidiError>;

/// The transport control messages this crate speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiMessage {
    /// MIDI Clock timing message
    Clock,
    /// MIDI Start message
    Start,
    /// MIDI Stop message
    Stop,
    /// MIDI Continue message
    Continue,
}

impl MidiMessage {
    /// Decodes a raw message. Anything that is not a transport control message is ignored.
    pub fn parse(data: &[u8]) -> Option<MidiMessage> {
        match data.first()? {
            0xF8 => Some(MidiMessage::Clock),
            0xFA => Some(MidiMessage::Start),
            0xFB => Some(MidiMessage::Continue),
            0xFC => Some(MidiMessage::Stop),
            _ => None,
        }
    }

    pub fn to_byte(self) -> u8 {
        match self {
            MidiMessage::Clock => 0xF8,
            MidiMessage::Start => 0xFA,
            MidiMessage::Continue => 0xFB,
            MidiMessage::Stop => 0xFC,
        }
    }
}

/// An inbound message with its arrival time in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimestampedMessage {
    pub timestamp_us: u64,
    pub message: MidiMessage,
}

impl TimestampedMessage {
    pub fn new(timestamp_us: u64, message: MidiMessage) -> Self {
        Self {
            timestamp_us,
            message,
        }
    }
}

/// Source of inbound MIDI messages
pub trait MidiEngine: Send {
    /// Waits up to `timeout` for the next message.
    ///
    /// `Ok(None)` means nothing arrived in time; an error means the input is gone for good.
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<TimestampedMessage>>;
}

/// [`MidiEngine`] fed through a channel, typically from a driver callback thread
pub struct ChannelEngine {
    rx: Receiver<TimestampedMessage>,
}

impl ChannelEngine {
    pub fn new(rx: Receiver<TimestampedMessage>) -> Self {
        Self { rx }
    }
}

impl MidiEngine for ChannelEngine {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<TimestampedMessage>> {
        match self.rx.recv_timeout(timeout) {
            Ok(msg) => Ok(Some(msg)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                Err(MidiError::RecvError("input channel disconnected".to_string()))
            }
        }
    }
}

/// What an outbound queue event does when its tick comes up
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Start,
    Clock,
    Stop,
    /// Switch the queue's tick-to-time mapping to this many microseconds per beat
    TempoChange(u32),
}

impl EventKind {
    /// Wire message for this event. Tempo changes never leave the queue.
    pub fn message(self) -> Option<MidiMessage> {
        match self {
            EventKind::Start => Some(MidiMessage::Start),
            EventKind::Clock => Some(MidiMessage::Clock),
            EventKind::Stop => Some(MidiMessage::Stop),
            EventKind::TempoChange(_) => None,
        }
    }
}

/// An event placed on the output queue at a tick position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledEvent {
    pub tick: u64,
    pub kind: EventKind,
}

impl ScheduledEvent {
    pub fn new(tick: u64, kind: EventKind) -> Self {
        Self { tick, kind }
    }
}

/// A tick-addressed playback queue that turns ticks into wall-clock time
pub trait OutputQueue: Send {
    /// Sets the tempo in effect from tick 0. Only meaningful before [`OutputQueue::start`].
    fn set_initial_tempo(&mut self, micros_per_beat: u32) -> Result<()>;

    fn schedule(&mut self, event: ScheduledEvent) -> Result<()>;

    /// Starts the queue's clock; tick 0 maps to this instant.
    fn start(&mut self) -> Result<()>;

    /// Delivers what is still pending and releases the queue.
    fn stop(&mut self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam::channel::unbounded;

    #[test]
    fn test_parse_transport_messages() {
        assert_eq!(MidiMessage::parse(&[0xF8]), Some(MidiMessage::Clock));
        assert_eq!(MidiMessage::parse(&[0xFA]), Some(MidiMessage::Start));
        assert_eq!(MidiMessage::parse(&[0xFB]), Some(MidiMessage::Continue));
        assert_eq!(MidiMessage::parse(&[0xFC]), Some(MidiMessage::Stop));
    }

    #[test]
    fn test_parse_ignores_other_messages() {
        assert_eq!(MidiMessage::parse(&[]), None);
        assert_eq!(MidiMessage::parse(&[0x90, 60, 100]), None);
        assert_eq!(MidiMessage::parse(&[0xFE]), None);
    }

    #[test]
    fn test_tempo_change_has_no_wire_message() {
        assert_eq!(EventKind::TempoChange(500_000).message(), None);
        assert_eq!(EventKind::Clock.message().map(MidiMessage::to_byte), Some(0xF8));
    }

    #[test]
    fn test_channel_engine_timeout_and_disconnect() {
        let (tx, rx) = unbounded();
        let mut engine = ChannelEngine::new(rx);

        assert_eq!(engine.recv_timeout(Duration::from_millis(1)), Ok(None));

        tx.send(TimestampedMessage::new(10, MidiMessage::Start))
            .unwrap();
        assert_eq!(
            engine.recv_timeout(Duration::from_millis(1)),
            Ok(Some(TimestampedMessage::new(10, MidiMessage::Start)))
        );

        drop(tx);
        assert!(matches!(
            engine.recv_timeout(Duration::from_millis(1)),
            Err(MidiError::RecvError(_))
        ));
    }

    #[test]
    fn test_midi_error_display() {
        let error = MidiError::ConnectionError("no such port".to_string());
        assert_eq!(error.to_string(), "MIDI connection error: no such port");
    }
}
