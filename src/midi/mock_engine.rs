use crate::midi::engine::{
    MidiEngine, MidiError, MidiMessage, OutputQueue, Result, ScheduledEvent, TimestampedMessage,
};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays a fixed script of inbound messages, then reports the input as gone
pub struct MockMidiEngine {
    script: VecDeque<TimestampedMessage>,
}

impl MockMidiEngine {
    pub fn new(script: Vec<TimestampedMessage>) -> Self {
        Self {
            script: script.into(),
        }
    }

    /// Start, then `count` clock pulses `interval_us` apart beginning at `first_us`
    pub fn steady_clock(first_us: u64, interval_us: u64, count: usize) -> Self {
        let mut script = vec![TimestampedMessage::new(first_us, MidiMessage::Start)];
        script.extend(
            (0..count as u64)
                .map(|i| TimestampedMessage::new(first_us + i * interval_us, MidiMessage::Clock)),
        );
        Self::new(script)
    }

    pub fn remaining(&self) -> usize {
        self.script.len()
    }
}

impl MidiEngine for MockMidiEngine {
    fn recv_timeout(&mut self, _timeout: Duration) -> Result<Option<TimestampedMessage>> {
        self.script
            .pop_front()
            .map(Some)
            .ok_or_else(|| MidiError::RecvError("mock input exhausted".to_string()))
    }
}

/// Every call made on a [`RecordingQueue`], in order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueCall {
    SetInitialTempo(u32),
    Schedule(ScheduledEvent),
    Start,
    Stop,
}

/// Output queue that records calls instead of playing them.
///
/// Clones share the same log, so a test can keep one handle after moving the queue.
#[derive(Debug, Clone, Default)]
pub struct RecordingQueue {
    calls: Arc<Mutex<Vec<QueueCall>>>,
    fail_after: Option<usize>,
}

impl RecordingQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accepts `scheduled` events, then fails every further schedule call
    pub fn failing_after(scheduled: usize) -> Self {
        Self {
            calls: Arc::default(),
            fail_after: Some(scheduled),
        }
    }

    pub fn calls(&self) -> Vec<QueueCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn scheduled(&self) -> Vec<ScheduledEvent> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                QueueCall::Schedule(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: QueueCall) -> Result<()> {
        let mut calls = self
            .calls
            .lock()
            .map_err(|_| MidiError::SendError("recording queue poisoned".to_string()))?;
        calls.push(call);
        Ok(())
    }
}

impl OutputQueue for RecordingQueue {
    fn set_initial_tempo(&mut self, micros_per_beat: u32) -> Result<()> {
        self.record(QueueCall::SetInitialTempo(micros_per_beat))
    }

    fn schedule(&mut self, event: ScheduledEvent) -> Result<()> {
        if let Some(limit) = self.fail_after {
            if self.scheduled().len() >= limit {
                return Err(MidiError::SendError("mock queue refused event".to_string()));
            }
        }
        self.record(QueueCall::Schedule(event))
    }

    fn start(&mut self) -> Result<()> {
        self.record(QueueCall::Start)
    }

    fn stop(&mut self) -> Result<()> {
        self.record(QueueCall::Stop)
    }
}
