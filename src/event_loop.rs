// event_loop.rs

use crate::estimator::{ClockEvent, SessionTotals, TempoEstimator};
use crate::midi::{MidiEngine, MidiError};
use log::{debug, error, info};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// How often the loop wakes up to check the stop flag when no input arrives
pub const POLL_INTERVAL: Duration = Duration::from_millis(250);

/// Feeds inbound transport messages to a [`TempoEstimator`]
pub struct EventLoop<E: MidiEngine> {
    engine: E,
    estimator: TempoEstimator,
}

impl<E: MidiEngine> EventLoop<E> {
    pub fn new(engine: E) -> Self {
        EventLoop {
            engine,
            estimator: TempoEstimator::new(),
        }
    }

    /// Runs until `running` is cleared or the input goes away.
    ///
    /// The message being processed always completes before the flag is checked again.
    /// Losing the input ends the session with an error.
    pub fn run<F>(&mut self, running: &AtomicBool, mut on_event: F) -> Result<SessionTotals, MidiError>
    where
        F: FnMut(ClockEvent),
    {
        info!("Observer waiting for MIDI clock data");
        while running.load(Ordering::SeqCst) {
            match self.engine.recv_timeout(POLL_INTERVAL) {
                Ok(Some(msg)) => {
                    if let Some(event) = self.estimator.process_message(msg.into()) {
                        on_event(event);
                    }
                }
                Ok(None) => debug!("No MIDI input within {:?}", POLL_INTERVAL),
                Err(e) => {
                    error!("MIDI input lost: {}", e);
                    return Err(e);
                }
            }
        }

        let totals = self.estimator.totals();
        info!(
            "Observer stopped: {} pulses, {} beats",
            totals.pulse_count, totals.beat_count
        );
        Ok(totals)
    }

    pub fn estimator(&self) -> &TempoEstimator {
        &self.estimator
    }
}
