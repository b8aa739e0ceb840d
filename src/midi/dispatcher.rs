//! Tick-addressed output queue
//!
//! [`TickDispatcher`] owns a thread that holds every scheduled event ordered by tick and
//! fires it when its wall-clock time comes up. Ticks are converted to time at
//! [`QUEUE_RESOLUTION`] ticks per quarter note using the tempo in effect at that tick.
//! Tempo change events only alter the mapping from their own tick onward, so anything
//! fired earlier keeps the timing it was scheduled with.

use crate::config::{DEFAULT_MICROS_PER_BEAT, QUEUE_RESOLUTION};
use crate::midi::engine::{
    EventKind, MidiError, MidiMessage, OutputQueue, Result, ScheduledEvent,
};
use crossbeam::channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use log::{debug, error, info, trace};
use std::cmp::{Ordering as CmpOrdering, Reverse};
use std::collections::BinaryHeap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

/// Where fired messages end up
pub trait MessageSink: Send + 'static {
    fn send(&mut self, msg: MidiMessage) -> Result<()>;
}

/// Maps tick positions to microseconds since the queue started.
///
/// Valid for ticks at or after `tick`; a new anchor is taken at every tempo change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoAnchor {
    tick: u64,
    offset_us: u64,
    micros_per_beat: u32,
}

impl TempoAnchor {
    pub fn new(micros_per_beat: u32) -> Self {
        Self {
            tick: 0,
            offset_us: 0,
            micros_per_beat,
        }
    }

    pub fn micros_per_beat(&self) -> u32 {
        self.micros_per_beat
    }

    /// Microseconds since queue start at which `tick` is due. Ticks before the anchor
    /// are already overdue and map to the anchor itself.
    pub fn micros_at(&self, tick: u64) -> u64 {
        let ticks = u128::from(tick.saturating_sub(self.tick));
        let elapsed = ticks * u128::from(self.micros_per_beat) / u128::from(QUEUE_RESOLUTION);
        self.offset_us
            .saturating_add(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    /// Anchor for a tempo change taking effect at `tick`.
    pub fn retempo(&self, tick: u64, micros_per_beat: u32) -> Self {
        Self {
            tick: tick.max(self.tick),
            offset_us: self.micros_at(tick),
            micros_per_beat,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
struct Pending {
    tick: u64,
    seq: u64,
    kind: EventKind,
}

impl Ord for Pending {
    fn cmp(&self, other: &Self) -> CmpOrdering {
        (self.tick, self.seq).cmp(&(other.tick, other.seq))
    }
}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<CmpOrdering> {
        Some(self.cmp(other))
    }
}

enum Command {
    SetTempo(u32),
    Schedule(ScheduledEvent),
    Start,
    Stop,
}

pub struct TickDispatcher {
    tx: Sender<Command>,
    failed: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl TickDispatcher {
    pub fn new<S: MessageSink>(sink: S) -> Self {
        let (tx, rx) = unbounded();
        let failed = Arc::new(AtomicBool::new(false));
        let thread_failed = Arc::clone(&failed);

        let handle = thread::spawn(move || {
            info!("Tick dispatcher thread started");
            DispatchLoop::new(sink, thread_failed).run(rx);
            info!("Tick dispatcher thread stopped");
        });

        Self {
            tx,
            failed,
            handle: Some(handle),
        }
    }

    fn command(&self, command: Command) -> Result<()> {
        if self.failed.load(Ordering::SeqCst) {
            return Err(MidiError::SendError(
                "output queue failed to deliver an event".to_string(),
            ));
        }
        self.tx
            .send(command)
            .map_err(|_| MidiError::SendError("output queue is not running".to_string()))
    }
}

impl OutputQueue for TickDispatcher {
    fn set_initial_tempo(&mut self, micros_per_beat: u32) -> Result<()> {
        self.command(Command::SetTempo(micros_per_beat))
    }

    fn schedule(&mut self, event: ScheduledEvent) -> Result<()> {
        self.command(Command::Schedule(event))
    }

    fn start(&mut self) -> Result<()> {
        self.command(Command::Start)
    }

    fn stop(&mut self) -> Result<()> {
        let handle = match self.handle.take() {
            Some(handle) => handle,
            None => return Ok(()),
        };
        // A dead thread has already dropped the receiver; joining is all that is left.
        let _ = self.tx.send(Command::Stop);
        handle
            .join()
            .map_err(|_| MidiError::SendError("tick dispatcher thread panicked".to_string()))
    }
}

impl Drop for TickDispatcher {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            error!("Failed to stop tick dispatcher: {}", e);
        }
    }
}

struct DispatchLoop<S> {
    sink: S,
    failed: Arc<AtomicBool>,
    pending: BinaryHeap<Reverse<Pending>>,
    next_seq: u64,
    anchor: TempoAnchor,
    started_at: Option<Instant>,
    draining: bool,
}

impl<S: MessageSink> DispatchLoop<S> {
    fn new(sink: S, failed: Arc<AtomicBool>) -> Self {
        Self {
            sink,
            failed,
            pending: BinaryHeap::new(),
            next_seq: 0,
            anchor: TempoAnchor::new(DEFAULT_MICROS_PER_BEAT),
            started_at: None,
            draining: false,
        }
    }

    fn run(mut self, rx: Receiver<Command>) {
        loop {
            if self.draining && (self.pending.is_empty() || self.started_at.is_none()) {
                break;
            }

            let command = match self.next_due() {
                Some(due) => match rx.recv_deadline(due) {
                    Ok(command) => Some(command),
                    Err(RecvTimeoutError::Timeout) => None,
                    Err(RecvTimeoutError::Disconnected) => {
                        if !self.draining {
                            debug!("Dispatcher channel closed, draining pending events");
                            self.draining = true;
                        }
                        thread::sleep(due.saturating_duration_since(Instant::now()));
                        None
                    }
                },
                None if self.draining => break,
                None => match rx.recv() {
                    Ok(command) => Some(command),
                    Err(_) => {
                        debug!("Dispatcher channel closed with nothing pending");
                        break;
                    }
                },
            };

            match command {
                Some(command) => self.handle(command),
                None => self.fire_due(),
            }

            if self.failed.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    fn handle(&mut self, command: Command) {
        match command {
            Command::SetTempo(micros_per_beat) => {
                if self.started_at.is_some() {
                    error!("Ignoring initial tempo set after the queue started");
                } else {
                    self.anchor = TempoAnchor::new(micros_per_beat);
                    debug!("Queue tempo set to {} us/beat", micros_per_beat);
                }
            }
            Command::Schedule(event) => {
                trace!("Queued {:?} at tick {}", event.kind, event.tick);
                self.pending.push(Reverse(Pending {
                    tick: event.tick,
                    seq: self.next_seq,
                    kind: event.kind,
                }));
                self.next_seq += 1;
            }
            Command::Start => {
                if self.started_at.is_none() {
                    self.started_at = Some(Instant::now());
                    info!("Output queue started");
                }
            }
            Command::Stop => {
                debug!("Output queue stopping, {} events pending", self.pending.len());
                self.draining = true;
            }
        }
    }

    fn next_due(&self) -> Option<Instant> {
        let started_at = self.started_at?;
        let Reverse(next) = self.pending.peek()?;
        Some(started_at + Duration::from_micros(self.anchor.micros_at(next.tick)))
    }

    fn fire_due(&mut self) {
        let now = Instant::now();
        while let Some(due) = self.next_due() {
            if due > now {
                break;
            }
            let Some(Reverse(event)) = self.pending.pop() else {
                break;
            };
            self.fire(event);
            if self.failed.load(Ordering::SeqCst) {
                break;
            }
        }
    }

    fn fire(&mut self, event: Pending) {
        match event.kind {
            EventKind::TempoChange(micros_per_beat) => {
                self.anchor = self.anchor.retempo(event.tick, micros_per_beat);
                info!(
                    "Queue tempo now {} us/beat from tick {}",
                    micros_per_beat, event.tick
                );
            }
            kind => {
                if let Some(msg) = kind.message() {
                    if let Err(e) = self.sink.send(msg) {
                        error!("Failed to send {:?} at tick {}: {}", msg, event.tick, e);
                        self.failed.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
    }
}
