// ui.rs

use crate::clock::GeneratorStatus;
use crate::config::BEATS_PER_BAR;
use crate::estimator::{ClockEvent, TempoReport};
use indicatif::{MultiProgress, ProgressBar, ProgressDrawTarget, ProgressStyle};
use log::debug;

fn create_beat_progress(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new(BEATS_PER_BAR));
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:20.cyan}] {pos}/{len}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("⣀⣤⣦⣶⣷⣿ "),
    );
    pb.set_prefix("Beat");
    pb
}

fn create_transport_spinner(multi_progress: &MultiProgress) -> ProgressBar {
    let pb = multi_progress.add(ProgressBar::new_spinner());
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold.dim} {spinner} {wide_msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_prefix("Transport");
    pb
}

fn timestamp() -> String {
    chrono::Local::now().format("%H:%M:%S%.3f").to_string()
}

pub fn format_report(report: &TempoReport) -> String {
    format!(
        "Beat {:4} | Tick {:6} | Interval: {:7.2} µs | BPM: {:6.2} | Avg over {} ticks",
        report.beat_count,
        report.pulse_count,
        report.last_interval_us as f64,
        report.bpm,
        report.samples
    )
}

pub fn format_generator_beat(beat_count: u64, pulse_count: u64, queue_tick: u64) -> String {
    format!(
        "Beat {:4} | MIDI Tick {:6} | Queue Tick {:6}",
        beat_count, pulse_count, queue_tick
    )
}

pub fn describe_clock_event(event: &ClockEvent) -> String {
    match event {
        ClockEvent::Started => ">>> MIDI START received".to_string(),
        ClockEvent::Resumed => ">>> MIDI CONTINUE received".to_string(),
        ClockEvent::Stopped(totals) => format!(
            ">>> MIDI STOP received | Total ticks: {} | Total beats: {}",
            totals.pulse_count, totals.beat_count
        ),
        ClockEvent::ImplicitStart => ">>> MIDI CLOCK received (but not started yet)".to_string(),
        ClockEvent::Beat(report) => format_report(report),
    }
}

pub fn describe_generator_status(status: &GeneratorStatus) -> String {
    match status {
        GeneratorStatus::Started { bpm } => format!(">>> MIDI START sent at {} BPM", bpm),
        GeneratorStatus::Beat {
            beat_count,
            pulse_count,
            queue_tick,
        } => format_generator_beat(*beat_count, *pulse_count, *queue_tick),
        GeneratorStatus::TempoChanged { bpm, change } => format!(
            ">>> Tempo changed to {} BPM ({} us/beat) at queue tick {}",
            bpm, change.micros_per_beat, change.target_tick
        ),
        GeneratorStatus::Stopped {
            pulse_count,
            beat_count,
        } => format!(
            ">>> MIDI STOP sent | Total ticks: {} | Total beats: {}",
            pulse_count, beat_count
        ),
    }
}

/// Terminal status: one line per event above a beat-in-bar bar and a transport spinner
pub struct StatusDisplay {
    multi_progress: MultiProgress,
    beat_pb: ProgressBar,
    transport_pb: ProgressBar,
}

impl StatusDisplay {
    pub fn new() -> Self {
        Self::with_draw_target(ProgressDrawTarget::stderr())
    }

    pub fn hidden() -> Self {
        Self::with_draw_target(ProgressDrawTarget::hidden())
    }

    fn with_draw_target(target: ProgressDrawTarget) -> Self {
        let multi_progress = MultiProgress::with_draw_target(target);
        let beat_pb = create_beat_progress(&multi_progress);
        let transport_pb = create_transport_spinner(&multi_progress);
        StatusDisplay {
            multi_progress,
            beat_pb,
            transport_pb,
        }
    }

    fn print(&self, line: String) {
        if let Err(e) = self
            .multi_progress
            .println(format!("[{}] {}", timestamp(), line))
        {
            debug!("Status line not printed: {}", e);
        }
    }

    fn show_beat(&self, beat_count: u64) {
        if beat_count > 0 {
            self.beat_pb
                .set_position((beat_count - 1) % BEATS_PER_BAR + 1);
        }
    }

    pub fn show_clock_event(&self, event: &ClockEvent) {
        match event {
            ClockEvent::Beat(report) => {
                self.show_beat(report.beat_count);
                self.transport_pb.set_message(format!(
                    "BPM: {:.2}, Tick Count: {}, Transport: Running",
                    report.bpm, report.pulse_count
                ));
            }
            ClockEvent::Started | ClockEvent::ImplicitStart => {
                self.beat_pb.set_position(0);
                self.transport_pb
                    .set_message("Transport: Running".to_string());
            }
            ClockEvent::Resumed => self
                .transport_pb
                .set_message("Transport: Running".to_string()),
            ClockEvent::Stopped(_) => self
                .transport_pb
                .set_message("Transport: Stopped".to_string()),
        }
        self.transport_pb.tick();
        self.print(describe_clock_event(event));
    }

    pub fn show_generator_status(&self, status: &GeneratorStatus) {
        match status {
            GeneratorStatus::Beat {
                beat_count,
                queue_tick,
                ..
            } => {
                self.show_beat(*beat_count);
                self.transport_pb
                    .set_message(format!("Queue Tick: {}, Transport: Running", queue_tick));
            }
            GeneratorStatus::Stopped { .. } => self
                .transport_pb
                .set_message("Transport: Stopped".to_string()),
            _ => {}
        }
        self.transport_pb.tick();
        self.print(describe_generator_status(status));
    }

    pub fn finish(&self) {
        self.beat_pb.finish_and_clear();
        self.transport_pb.finish_and_clear();
    }
}

impl Default for StatusDisplay {
    fn default() -> Self {
        Self::new()
    }
}
