//! Tempo estimation from incoming MIDI clock pulses

use crate::config::{HISTORY_CAPACITY, PPQN};
use crate::midi::{MidiMessage, TimestampedMessage};
use log::{debug, info, warn};

/// Transport messages as seen by the estimator
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockMessage {
    Tick { timestamp_us: u64 },
    Start,
    Stop,
    Continue,
}

impl From<TimestampedMessage> for ClockMessage {
    fn from(msg: TimestampedMessage) -> Self {
        match msg.message {
            MidiMessage::Clock => ClockMessage::Tick {
                timestamp_us: msg.timestamp_us,
            },
            MidiMessage::Start => ClockMessage::Start,
            MidiMessage::Stop => ClockMessage::Stop,
            MidiMessage::Continue => ClockMessage::Continue,
        }
    }
}

/// Emitted on every beat boundary
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoReport {
    pub pulse_count: u64,
    pub beat_count: u64,
    /// Most recent accepted pulse-to-pulse interval
    pub last_interval_us: u64,
    pub bpm: f64,
    /// Number of intervals the BPM was averaged over
    pub samples: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTotals {
    pub pulse_count: u64,
    pub beat_count: u64,
}

/// Observable outcome of a [`ClockMessage`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClockEvent {
    Started,
    Resumed,
    Stopped(SessionTotals),
    /// A pulse arrived before any Start or Continue; counting began anyway
    ImplicitStart,
    Beat(TempoReport),
}

/// Fixed-capacity ring of the most recent pulse intervals
#[derive(Debug, Clone)]
pub struct IntervalHistory {
    slots: [u64; HISTORY_CAPACITY],
    cursor: usize,
    len: usize,
}

impl Default for IntervalHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl IntervalHistory {
    pub fn new() -> Self {
        Self {
            slots: [0; HISTORY_CAPACITY],
            cursor: 0,
            len: 0,
        }
    }

    /// Stores `interval_us`, overwriting the oldest sample once full
    pub fn push(&mut self, interval_us: u64) {
        self.slots[self.cursor] = interval_us;
        self.cursor = (self.cursor + 1) % HISTORY_CAPACITY;
        if self.len < HISTORY_CAPACITY {
            self.len += 1;
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.cursor = 0;
        self.len = 0;
    }

    /// Populated samples in slot order, not arrival order
    pub fn samples(&self) -> &[u64] {
        // Slots fill from index 0, so the populated ones are always a prefix
        &self.slots[..self.len]
    }

    pub fn mean(&self) -> Option<f64> {
        if self.is_empty() {
            return None;
        }
        let sum: u64 = self.samples().iter().sum();
        Some(sum as f64 / self.len as f64)
    }
}

/// Converts an average pulse interval into beats per minute
pub fn bpm_from_interval(average_interval_us: f64) -> f64 {
    if average_interval_us <= 0.0 {
        return 0.0;
    }
    let pulses_per_second = 1_000_000.0 / average_interval_us;
    let beats_per_second = pulses_per_second / PPQN as f64;
    beats_per_second * 60.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Transport {
    /// Nothing seen yet
    Idle,
    Running,
    Stopped,
}

/// Moving-average tempo estimator over the last [`HISTORY_CAPACITY`] pulse intervals
#[derive(Debug, Clone)]
pub struct TempoEstimator {
    history: IntervalHistory,
    last_timestamp_us: Option<u64>,
    last_interval_us: Option<u64>,
    pulse_count: u64,
    beat_count: u64,
    transport: Transport,
    clock_before_start: bool,
}

impl Default for TempoEstimator {
    fn default() -> Self {
        Self::new()
    }
}

impl TempoEstimator {
    pub fn new() -> Self {
        Self {
            history: IntervalHistory::new(),
            last_timestamp_us: None,
            last_interval_us: None,
            pulse_count: 0,
            beat_count: 0,
            transport: Transport::Idle,
            clock_before_start: false,
        }
    }

    pub fn process_message(&mut self, msg: ClockMessage) -> Option<ClockEvent> {
        match msg {
            ClockMessage::Start => {
                self.reset();
                self.transport = Transport::Running;
                info!("MIDI START received");
                Some(ClockEvent::Started)
            }
            ClockMessage::Continue => {
                self.transport = Transport::Running;
                info!(
                    "MIDI CONTINUE received at pulse {}, {} intervals kept",
                    self.pulse_count,
                    self.history.len()
                );
                Some(ClockEvent::Resumed)
            }
            ClockMessage::Stop => {
                // Nothing has run yet, so the next pulse still starts implicitly
                if self.transport != Transport::Idle {
                    self.transport = Transport::Stopped;
                }
                let totals = self.totals();
                info!(
                    "MIDI STOP received: {} pulses, {} beats",
                    totals.pulse_count, totals.beat_count
                );
                Some(ClockEvent::Stopped(totals))
            }
            ClockMessage::Tick { timestamp_us } => match self.transport {
                Transport::Running => self.on_pulse_arrival(timestamp_us).map(ClockEvent::Beat),
                Transport::Idle => {
                    warn!("MIDI CLOCK received before an explicit start, starting implicitly");
                    self.clock_before_start = true;
                    self.transport = Transport::Running;
                    // The very first pulse can never complete a beat
                    let report = self.on_pulse_arrival(timestamp_us);
                    Some(report.map_or(ClockEvent::ImplicitStart, ClockEvent::Beat))
                }
                Transport::Stopped => {
                    debug!("Dropping MIDI CLOCK while stopped");
                    None
                }
            },
        }
    }

    /// Accounts for one pulse and returns a report when it completes a beat
    pub fn on_pulse_arrival(&mut self, timestamp_us: u64) -> Option<TempoReport> {
        self.pulse_count += 1;

        if let Some(previous) = self.last_timestamp_us {
            match timestamp_us.checked_sub(previous) {
                Some(interval) if interval > 0 => {
                    self.history.push(interval);
                    self.last_interval_us = Some(interval);
                }
                _ => debug!(
                    "Discarding non-positive pulse interval ({} us after {} us)",
                    timestamp_us, previous
                ),
            }
        }
        self.last_timestamp_us = Some(timestamp_us);

        if self.pulse_count % PPQN != 0 {
            return None;
        }
        self.beat_count += 1;

        let bpm = self.current_bpm()?;
        let report = TempoReport {
            pulse_count: self.pulse_count,
            beat_count: self.beat_count,
            last_interval_us: self.last_interval_us.unwrap_or_default(),
            bpm,
            samples: self.history.len(),
        };
        debug!("Beat report: {:?}", report);
        Some(report)
    }

    /// Clears history, counters and the previous timestamp
    pub fn reset(&mut self) {
        self.history.clear();
        self.last_timestamp_us = None;
        self.last_interval_us = None;
        self.pulse_count = 0;
        self.beat_count = 0;
    }

    /// Smoothed BPM over the populated history, if any interval has been seen
    pub fn current_bpm(&self) -> Option<f64> {
        self.history.mean().map(bpm_from_interval)
    }

    pub fn totals(&self) -> SessionTotals {
        SessionTotals {
            pulse_count: self.pulse_count,
            beat_count: self.beat_count,
        }
    }

    pub fn pulse_count(&self) -> u64 {
        self.pulse_count
    }

    pub fn beat_count(&self) -> u64 {
        self.beat_count
    }

    pub fn history(&self) -> &IntervalHistory {
        &self.history
    }

    pub fn is_running(&self) -> bool {
        self.transport == Transport::Running
    }

    /// Whether a pulse was ever seen before an explicit Start or Continue
    pub fn clock_before_start(&self) -> bool {
        self.clock_before_start
    }
}
