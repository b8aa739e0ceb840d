//! MIDI clock generator session
//!
//! A [`Generator`] holds at most one session. The session owns the output queue and the
//! timeline; it is created by [`Generator::open`] and destroyed by [`Generator::close`]
//! or by the first transport failure, after which every operation reports
//! [`GeneratorError::NotInitialized`] until the generator is opened again.

use crate::midi::{EventKind, MidiError, OutputQueue, ScheduledEvent};
use crate::scheduler::{micros_per_beat, ScheduledChange, TempoScheduler};
use crate::tick_clock::TickPosition;
use log::{debug, error, info, warn};
use std::error::Error;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum GeneratorError {
    /// No session is open
    NotInitialized,
    /// Tempo must be a positive number of beats per minute
    InvalidTempo(i32),
    /// The output queue failed; the session has been closed
    Transport(MidiError),
}

impl fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GeneratorError::NotInitialized => write!(f, "MIDI generator not initialized"),
            GeneratorError::InvalidTempo(bpm) => write!(f, "invalid BPM {}", bpm),
            GeneratorError::Transport(e) => write!(f, "transport failure: {}", e),
        }
    }
}

impl Error for GeneratorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            GeneratorError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<MidiError> for GeneratorError {
    fn from(e: MidiError) -> Self {
        GeneratorError::Transport(e)
    }
}

pub type Result<T> = std::result::Result<T, GeneratorError>;

struct Session<Q> {
    queue: Q,
    scheduler: TempoScheduler,
    started: bool,
}

impl<Q: OutputQueue> Session<Q> {
    fn schedule(&mut self, tick: TickPosition, kind: EventKind) -> Result<()> {
        self.queue.schedule(ScheduledEvent::new(tick, kind))?;
        Ok(())
    }
}

pub struct Generator<Q: OutputQueue> {
    session: Option<Session<Q>>,
}

impl<Q: OutputQueue> Default for Generator<Q> {
    fn default() -> Self {
        Self::new()
    }
}

impl<Q: OutputQueue> Generator<Q> {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Opens a session on `queue` with the timeline at tick 0 and the queue set to `initial_bpm`
    pub fn open(&mut self, mut queue: Q, initial_bpm: i32) -> Result<()> {
        let micros_per_beat = micros_per_beat(initial_bpm)?;
        if self.session.is_some() {
            warn!("Opening a generator session while one is open, closing the old one");
            self.close()?;
        }

        queue.set_initial_tempo(micros_per_beat)?;
        self.session = Some(Session {
            queue,
            scheduler: TempoScheduler::new(),
            started: false,
        });
        info!(
            "MIDI generator initialized at {} BPM ({} us/beat)",
            initial_bpm, micros_per_beat
        );
        Ok(())
    }

    /// Schedules MIDI Start at tick 0 and starts the queue
    pub fn start(&mut self) -> Result<()> {
        self.with_session(|session| {
            if session.started {
                warn!("MIDI START requested on a running session, ignoring");
                return Ok(());
            }
            session.scheduler.restart();
            session.schedule(0, EventKind::Start)?;
            session.scheduler.mark_scheduled(0);
            session.queue.start()?;
            session.started = true;
            info!("MIDI START sent, queue started");
            Ok(())
        })
    }

    /// Schedules one clock pulse at the current tick and returns the advanced position
    pub fn send_clock(&mut self) -> Result<TickPosition> {
        self.with_session(|session| {
            let tick = session.scheduler.current();
            session.schedule(tick, EventKind::Clock)?;
            Ok(session.scheduler.commit_pulse())
        })
    }

    /// Schedules MIDI Stop at the current tick
    pub fn send_stop(&mut self) -> Result<TickPosition> {
        self.with_session(|session| {
            let tick = session.scheduler.current();
            session.schedule(tick, EventKind::Stop)?;
            session.scheduler.mark_scheduled(tick);
            info!("MIDI STOP sent at tick {}", tick);
            Ok(tick)
        })
    }

    /// Queues a tempo change after everything already scheduled
    pub fn request_tempo_change(&mut self, bpm: i32) -> Result<ScheduledChange> {
        self.with_session(|session| {
            let change = session.scheduler.plan_tempo_change(bpm)?;
            session.schedule(
                change.target_tick,
                EventKind::TempoChange(change.micros_per_beat),
            )?;
            session.scheduler.commit_tempo_change(change);
            info!(
                "MIDI tempo (queued) set to {} BPM ({} us/beat) at tick {}",
                bpm, change.micros_per_beat, change.target_tick
            );
            Ok(change)
        })
    }

    pub fn current_tick(&self) -> Option<TickPosition> {
        self.session.as_ref().map(|s| s.scheduler.current())
    }

    pub fn high_water_tick(&self) -> Option<TickPosition> {
        self.session.as_ref().map(|s| s.scheduler.high_water())
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    /// Stops the queue and destroys the session. Closing a closed generator does nothing.
    pub fn close(&mut self) -> Result<()> {
        match self.session.take() {
            Some(mut session) => {
                session.queue.stop()?;
                info!("MIDI generator closed");
                Ok(())
            }
            None => Ok(()),
        }
    }

    fn with_session<T>(&mut self, f: impl FnOnce(&mut Session<Q>) -> Result<T>) -> Result<T> {
        let session = self.session.as_mut().ok_or(GeneratorError::NotInitialized)?;
        let result = f(session);
        if let Err(GeneratorError::Transport(e)) = &result {
            error!("Transport failure, closing generator session: {}", e);
            if let Some(mut session) = self.session.take() {
                if let Err(e) = session.queue.stop() {
                    debug!("Queue stop after failure also failed: {}", e);
                }
            }
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::midi::{QueueCall, RecordingQueue};

    fn open_generator() -> (Generator<RecordingQueue>, RecordingQueue) {
        let queue = RecordingQueue::new();
        let mut generator = Generator::new();
        generator.open(queue.clone(), 120).unwrap();
        (generator, queue)
    }

    #[test]
    fn test_operations_before_open_fail() {
        let mut generator: Generator<RecordingQueue> = Generator::new();
        assert_eq!(generator.start(), Err(GeneratorError::NotInitialized));
        assert_eq!(generator.send_clock(), Err(GeneratorError::NotInitialized));
        assert_eq!(
            generator.request_tempo_change(120),
            Err(GeneratorError::NotInitialized)
        );
        assert_eq!(generator.current_tick(), None);
    }

    #[test]
    fn test_not_initialized_takes_precedence_over_invalid_tempo() {
        let mut generator: Generator<RecordingQueue> = Generator::new();
        assert_eq!(
            generator.request_tempo_change(0),
            Err(GeneratorError::NotInitialized)
        );
    }

    #[test]
    fn test_open_sets_initial_tempo() {
        let (_generator, queue) = open_generator();
        assert_eq!(queue.calls(), vec![QueueCall::SetInitialTempo(500_000)]);
    }

    #[test]
    fn test_open_rejects_invalid_tempo() {
        let mut generator = Generator::new();
        assert_eq!(
            generator.open(RecordingQueue::new(), 0),
            Err(GeneratorError::InvalidTempo(0))
        );
        assert!(!generator.is_open());
    }

    #[test]
    fn test_start_twice_schedules_once() {
        let (mut generator, queue) = open_generator();
        generator.start().unwrap();
        generator.start().unwrap();
        assert_eq!(
            queue.scheduled(),
            vec![ScheduledEvent::new(0, EventKind::Start)]
        );
    }

    #[test]
    fn test_start_rewinds_to_tick_zero() {
        let (mut generator, queue) = open_generator();
        generator.send_clock().unwrap();
        generator.send_clock().unwrap();
        assert_eq!(generator.current_tick(), Some(8));

        generator.start().unwrap();
        assert_eq!(generator.current_tick(), Some(0));
        assert_eq!(generator.high_water_tick(), Some(8));
        assert_eq!(generator.send_clock(), Ok(4));
        assert_eq!(
            generator.request_tempo_change(100).unwrap().target_tick,
            9
        );
        assert_eq!(
            queue.scheduled()[2],
            ScheduledEvent::new(0, EventKind::Start)
        );
    }

    #[test]
    fn test_stop_goes_out_at_current_tick() {
        let (mut generator, queue) = open_generator();
        generator.start().unwrap();
        generator.send_clock().unwrap();
        generator.send_clock().unwrap();
        assert_eq!(generator.send_stop(), Ok(8));
        assert_eq!(
            queue.scheduled().last(),
            Some(&ScheduledEvent::new(8, EventKind::Stop))
        );
    }

    #[test]
    fn test_close_stops_queue() {
        let (mut generator, queue) = open_generator();
        generator.close().unwrap();
        assert_eq!(queue.calls().last(), Some(&QueueCall::Stop));
        assert!(!generator.is_open());
        assert_eq!(generator.close(), Ok(()));
    }

    #[test]
    fn test_error_display() {
        assert_eq!(GeneratorError::InvalidTempo(-5).to_string(), "invalid BPM -5");
        assert_eq!(
            GeneratorError::NotInitialized.to_string(),
            "MIDI generator not initialized"
        );
    }
}
