// clock.rs

use crate::config::PPQN;
use crate::generator::{GeneratorError, Result};
use crate::midi::OutputQueue;
use crate::scheduler::{micros_per_beat, ScheduledChange};
use crate::Generator;
use log::{info, trace, warn};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Time between two MIDI clock pulses at the given tempo
pub fn pulse_interval(micros_per_beat: u32) -> Duration {
    Duration::from_nanos(u64::from(micros_per_beat) * 1_000 / PPQN)
}

/// Paces pulses against absolute deadlines so sleep jitter does not accumulate
#[derive(Debug, Clone)]
pub struct PulsePacer {
    interval: Duration,
    next_deadline: Instant,
}

impl PulsePacer {
    pub fn new(micros_per_beat: u32, now: Instant) -> Self {
        Self {
            interval: pulse_interval(micros_per_beat),
            next_deadline: now,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Switches tempo and restarts the deadline chain from `now`
    pub fn set_tempo(&mut self, micros_per_beat: u32, now: Instant) {
        self.interval = pulse_interval(micros_per_beat);
        self.next_deadline = now;
    }

    /// How long to sleep after a pulse sent at `now`.
    ///
    /// Running behind by more than a whole interval resyncs to `now` instead of
    /// bursting to catch up.
    pub fn wait_after_pulse(&mut self, now: Instant) -> Duration {
        self.next_deadline += self.interval;
        match self.next_deadline.checked_duration_since(now) {
            Some(wait) => wait,
            None => {
                if now.duration_since(self.next_deadline) > self.interval {
                    trace!("Pulse pacer behind schedule, resyncing");
                    self.next_deadline = now;
                }
                Duration::ZERO
            }
        }
    }
}

/// Cycles through a list of tempos, one step every `every`
#[derive(Debug, Clone)]
pub struct TempoSequence {
    tempos: Vec<i32>,
    index: usize,
    every: Duration,
    next_change: Instant,
}

impl TempoSequence {
    pub fn new(tempos: Vec<i32>, every: Duration, now: Instant) -> Self {
        Self {
            tempos,
            index: 0,
            every,
            next_change: now + every,
        }
    }

    /// The next tempo if its step is due at `now`
    pub fn due(&mut self, now: Instant) -> Option<i32> {
        if self.tempos.is_empty() || now < self.next_change {
            return None;
        }
        let bpm = self.tempos[self.index];
        self.index = (self.index + 1) % self.tempos.len();
        self.next_change += self.every;
        Some(bpm)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorStatus {
    Started { bpm: i32 },
    Beat {
        beat_count: u64,
        pulse_count: u64,
        queue_tick: u64,
    },
    TempoChanged { bpm: i32, change: ScheduledChange },
    Stopped { pulse_count: u64, beat_count: u64 },
}

#[derive(Debug, Clone)]
pub struct GeneratorSettings {
    pub bpm: i32,
    pub tempo_sequence: Vec<i32>,
    pub change_every: Duration,
}

/// Starts the session, emits pulses until `running` is cleared, then sends Stop and
/// closes the session.
pub fn run_generator<Q, F>(
    generator: &mut Generator<Q>,
    settings: &GeneratorSettings,
    running: &AtomicBool,
    mut on_status: F,
) -> Result<()>
where
    Q: OutputQueue,
    F: FnMut(GeneratorStatus),
{
    let start = Instant::now();
    let mut pacer = PulsePacer::new(micros_per_beat(settings.bpm)?, start);
    let mut sequence =
        TempoSequence::new(settings.tempo_sequence.clone(), settings.change_every, start);
    info!(
        "Pulse interval {:?} at {} BPM",
        pacer.interval(),
        settings.bpm
    );

    generator.start()?;
    on_status(GeneratorStatus::Started { bpm: settings.bpm });

    let mut pulse_count = 0u64;
    let mut beat_count = 0u64;

    while running.load(Ordering::SeqCst) {
        let now = Instant::now();
        if let Some(bpm) = sequence.due(now) {
            match generator.request_tempo_change(bpm) {
                Ok(change) => {
                    pacer.set_tempo(change.micros_per_beat, now);
                    on_status(GeneratorStatus::TempoChanged { bpm, change });
                }
                Err(GeneratorError::InvalidTempo(bpm)) => {
                    warn!("Skipping invalid tempo {} in sequence", bpm)
                }
                Err(e) => return Err(e),
            }
        }

        let queue_tick = generator.send_clock()?;
        pulse_count += 1;
        if pulse_count % PPQN == 0 {
            beat_count += 1;
            on_status(GeneratorStatus::Beat {
                beat_count,
                pulse_count,
                queue_tick,
            });
        }

        thread::sleep(pacer.wait_after_pulse(Instant::now()));
    }

    info!("Stopping MIDI clock after {} pulses", pulse_count);
    generator.send_stop()?;
    generator.close()?;
    on_status(GeneratorStatus::Stopped {
        pulse_count,
        beat_count,
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pulse_interval_at_120_bpm() {
        assert_eq!(pulse_interval(500_000), Duration::from_nanos(20_833_333));
    }

    #[test]
    fn test_pacer_keeps_absolute_deadlines() {
        let start = Instant::now();
        let mut pacer = PulsePacer::new(500_000, start);
        let interval = pacer.interval();

        // Pulse sent late by 5 ms: the wait shrinks instead of drifting
        let wait = pacer.wait_after_pulse(start + Duration::from_millis(5));
        assert_eq!(wait, interval - Duration::from_millis(5));
    }

    #[test]
    fn test_pacer_resyncs_when_far_behind() {
        let start = Instant::now();
        let mut pacer = PulsePacer::new(500_000, start);
        let late = start + Duration::from_millis(100);

        assert_eq!(pacer.wait_after_pulse(late), Duration::ZERO);
        // Deadline chain restarted from the late pulse
        assert_eq!(pacer.wait_after_pulse(late), pacer.interval());
    }

    #[test]
    fn test_tempo_sequence_cycles() {
        let start = Instant::now();
        let every = Duration::from_secs(10);
        let mut sequence = TempoSequence::new(vec![80, 140], every, start);

        assert_eq!(sequence.due(start), None);
        assert_eq!(sequence.due(start + every), Some(80));
        assert_eq!(sequence.due(start + every), None);
        assert_eq!(sequence.due(start + every * 2), Some(140));
        assert_eq!(sequence.due(start + every * 3), Some(80));
    }

    #[test]
    fn test_empty_sequence_never_changes() {
        let start = Instant::now();
        let mut sequence = TempoSequence::new(Vec::new(), Duration::from_secs(1), start);
        assert_eq!(sequence.due(start + Duration::from_secs(60)), None);
    }
}
