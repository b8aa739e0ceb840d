use pulseclockrs::config::{HISTORY_CAPACITY, PPQN};
use pulseclockrs::estimator::{ClockEvent, ClockMessage, TempoEstimator, TempoReport};

const BPM_TOLERANCE: f64 = 0.5;

fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

fn tick(timestamp_us: u64) -> ClockMessage {
    ClockMessage::Tick { timestamp_us }
}

fn started_estimator() -> TempoEstimator {
    let mut estimator = TempoEstimator::new();
    estimator.process_message(ClockMessage::Start);
    estimator
}

/// Feeds `count` pulses `interval_us` apart and collects the beat reports
fn feed(estimator: &mut TempoEstimator, start_us: u64, interval_us: u64, count: u64) -> Vec<TempoReport> {
    (0..count)
        .filter_map(|i| match estimator.process_message(tick(start_us + i * interval_us)) {
            Some(ClockEvent::Beat(report)) => Some(report),
            _ => None,
        })
        .collect()
}

fn expected_bpm(interval_us: u64) -> f64 {
    60.0 / (interval_us as f64 * PPQN as f64 / 1_000_000.0)
}

#[test]
fn test_one_beat_at_120_bpm() {
    init_logging();
    let mut estimator = started_estimator();

    let reports = feed(&mut estimator, 1_000, 20_833, 24);

    assert_eq!(reports.len(), 1);
    let report = reports[0];
    assert_eq!(report.pulse_count, 24);
    assert_eq!(report.beat_count, 1);
    assert_eq!(report.last_interval_us, 20_833);
    assert_eq!(report.samples, 23);
    assert!(
        (report.bpm - 120.0).abs() < BPM_TOLERANCE,
        "Expected ~120 BPM, got {}",
        report.bpm
    );
}

#[test]
fn test_constant_spacing_after_window_fills() {
    init_logging();
    for interval_us in [10_000u64, 17_857, 20_833, 41_667] {
        let mut estimator = started_estimator();
        feed(&mut estimator, 0, interval_us, HISTORY_CAPACITY as u64 + 30);

        assert_eq!(estimator.history().len(), HISTORY_CAPACITY);
        let bpm = estimator.current_bpm().unwrap();
        assert!(
            (bpm - expected_bpm(interval_us)).abs() < 1e-6,
            "interval {} us: expected {}, got {}",
            interval_us,
            expected_bpm(interval_us),
            bpm
        );
    }
}

#[test]
fn test_partial_window_uses_populated_count() {
    let mut estimator = started_estimator();
    // Two intervals: 10 ms and 30 ms, mean 20 ms
    estimator.process_message(tick(0));
    estimator.process_message(tick(10_000));
    estimator.process_message(tick(40_000));

    assert_eq!(estimator.history().len(), 2);
    let bpm = estimator.current_bpm().unwrap();
    assert!((bpm - expected_bpm(20_000)).abs() < 1e-9);
}

#[test]
fn test_window_forgets_old_tempo() {
    let mut estimator = started_estimator();
    feed(&mut estimator, 0, 20_833, 200);

    // 140 BPM for a full window replaces every 120 BPM sample
    let start = 200 * 20_833;
    feed(&mut estimator, start, 17_857, HISTORY_CAPACITY as u64 + 1);

    assert_eq!(estimator.history().len(), HISTORY_CAPACITY);
    assert!(estimator.history().samples().iter().all(|&i| i == 17_857));
    let bpm = estimator.current_bpm().unwrap();
    assert!((bpm - 140.0).abs() < BPM_TOLERANCE, "got {}", bpm);
}

#[test]
fn test_degenerate_intervals_leave_history_untouched() {
    let mut estimator = started_estimator();
    feed(&mut estimator, 0, 20_833, 10);
    let samples = estimator.history().samples().to_vec();
    let bpm = estimator.current_bpm();

    let last = 9 * 20_833;
    estimator.process_message(tick(last));
    estimator.process_message(tick(last - 1));

    assert_eq!(estimator.history().samples(), samples.as_slice());
    assert_eq!(estimator.current_bpm(), bpm);
}

#[test]
fn test_start_resets_and_continue_resumes() {
    let mut estimator = started_estimator();
    feed(&mut estimator, 0, 20_833, 48);
    assert_eq!(estimator.beat_count(), 2);

    estimator.process_message(ClockMessage::Stop);
    estimator.process_message(ClockMessage::Continue);
    let reports = feed(&mut estimator, 48 * 20_833, 20_833, 24);
    assert_eq!(estimator.pulse_count(), 72);
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].beat_count, 3);

    estimator.process_message(ClockMessage::Start);
    assert_eq!(estimator.pulse_count(), 0);
    assert_eq!(estimator.beat_count(), 0);
    assert!(estimator.history().is_empty());

    // First pulse after a restart computes no interval
    estimator.process_message(tick(10_000_000));
    assert!(estimator.history().is_empty());
}

#[test]
fn test_pulses_after_stop_wait_for_start() {
    let mut estimator = started_estimator();
    feed(&mut estimator, 0, 20_833, 10);
    estimator.process_message(ClockMessage::Stop);

    assert!(feed(&mut estimator, 1_000_000, 20_833, 48).is_empty());
    assert_eq!(estimator.pulse_count(), 10);

    estimator.process_message(ClockMessage::Start);
    let reports = feed(&mut estimator, 5_000_000, 20_833, 24);
    assert_eq!(reports.len(), 1);
}

#[test]
fn test_stop_while_idle_keeps_implicit_start() {
    init_logging();
    let mut estimator = TempoEstimator::new();

    assert!(matches!(
        estimator.process_message(ClockMessage::Stop),
        Some(ClockEvent::Stopped(totals)) if totals.pulse_count == 0
    ));
    assert_eq!(
        estimator.process_message(tick(0)),
        Some(ClockEvent::ImplicitStart)
    );
    let reports = feed(&mut estimator, 20_833, 20_833, 47);

    assert!(estimator.clock_before_start());
    assert!(estimator.is_running());
    assert_eq!(estimator.pulse_count(), 48);
    assert_eq!(reports.len(), 2);
    assert!((reports[1].bpm - 120.0).abs() < BPM_TOLERANCE);
}
