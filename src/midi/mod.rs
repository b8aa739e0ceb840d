//! MIDI transport boundary for pulseclockrs
//!
//! This module is everything between the timing core and a real MIDI port:
//! - Transport control messages, events addressed to queue ticks, and error handling
//! - The [`MidiEngine`] trait for inbound messages and the [`OutputQueue`] trait for
//!   tick-scheduled outbound events
//! - [`MidirEngine`] and [`MidirSink`] for real MIDI device communication via midir
//! - [`TickDispatcher`], the output queue that turns ticks into wall-clock time
//! - Mock implementations for testing
//!
pub mod dispatcher;
mod engine;
pub mod midir_engine;
pub mod mock_engine;

pub use engine::{
    ChannelEngine, EventKind, MidiEngine, MidiError, MidiMessage, OutputQueue, Result,
    ScheduledEvent, TimestampedMessage,
};

pub use dispatcher::{MessageSink, TempoAnchor, TickDispatcher};
pub use midir_engine::{MidirEngine, MidirSink};
pub use mock_engine::{MockMidiEngine, QueueCall, RecordingQueue};
