pub mod clock;
pub mod config;
pub mod estimator;
pub mod event_loop;
pub mod generator;
pub mod logging;
pub mod midi;
pub mod scheduler;
pub mod tick_clock;
pub mod ui;

pub use estimator::{ClockEvent, ClockMessage, TempoEstimator, TempoReport};
pub use generator::{Generator, GeneratorError};
pub use scheduler::ScheduledChange;
pub use tick_clock::{TickClock, TickPosition};
