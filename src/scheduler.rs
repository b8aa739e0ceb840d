//! Placement of outgoing events on the queue timeline
//!
//! Pulses go out at the tick clock's position. Tempo changes go out one tick after the
//! highest tick anything has been scheduled at, so the queue never re-times an event it
//! already holds.

use crate::config::MICROS_PER_MINUTE;
use crate::generator::GeneratorError;
use crate::tick_clock::{TickClock, TickPosition};

/// A tempo change that has been placed on the timeline
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledChange {
    pub target_tick: TickPosition,
    pub micros_per_beat: u32,
}

/// Microseconds per beat for a validated tempo. Integer division, so 90 BPM is 666,666.
///
/// Tempos so fast that a beat rounds to 0 µs are rejected along with non-positive ones.
pub fn micros_per_beat(bpm: i32) -> Result<u32, GeneratorError> {
    match u32::try_from(bpm) {
        Ok(b) if b > 0 && MICROS_PER_MINUTE / b > 0 => Ok(MICROS_PER_MINUTE / b),
        _ => Err(GeneratorError::InvalidTempo(bpm)),
    }
}

#[derive(Debug, Clone, Default)]
pub struct TempoScheduler {
    clock: TickClock,
    high_water: TickPosition,
}

impl TempoScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Tick the next pulse goes out at
    pub fn current(&self) -> TickPosition {
        self.clock.current()
    }

    pub fn high_water(&self) -> TickPosition {
        self.high_water
    }

    /// Rewinds the tick clock to 0 for a stream start. The high-water mark is kept so
    /// tempo changes queued before the start still order after it.
    pub fn restart(&mut self) {
        self.clock.reset();
    }

    /// Advances past a pulse that has been handed to the queue
    pub fn commit_pulse(&mut self) -> TickPosition {
        let position = self.clock.advance();
        self.mark_scheduled(position);
        position
    }

    /// Records that something now occupies `tick`
    pub fn mark_scheduled(&mut self, tick: TickPosition) {
        self.high_water = self.high_water.max(tick);
    }

    /// Where a tempo change to `bpm` would land. Does not change any state.
    pub fn plan_tempo_change(&self, bpm: i32) -> Result<ScheduledChange, GeneratorError> {
        Ok(ScheduledChange {
            target_tick: self.high_water + 1,
            micros_per_beat: micros_per_beat(bpm)?,
        })
    }

    pub fn commit_tempo_change(&mut self, change: ScheduledChange) {
        self.mark_scheduled(change.target_tick);
    }
}
