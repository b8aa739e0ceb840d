use pulseclockrs::{
    clock::{run_generator, GeneratorSettings},
    config::{Config, Mode},
    event_loop::EventLoop,
    logging,
    midi::{MidirEngine, MidirSink, TickDispatcher},
    ui::StatusDisplay,
    Generator,
};
use std::error::Error;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn main() {
    initialize_logging();

    let config = match Config::new() {
        Ok(config) => config,
        Err(e) => exit_with_error(&format!("Invalid configuration: {}", e)),
    };

    let running = install_stop_handler();

    let result = match config.mode {
        Mode::Observe => run_observer(&config, &running),
        Mode::Generate => run_clock_generator(&config, &running),
    };

    if let Err(e) = result {
        exit_with_error(&e.to_string());
    }
    log::info!("Shutdown complete");
}

fn initialize_logging() {
    // The terminal is for status output; without a log file we simply run unlogged.
    if let Err(e) = logging::init_logger() {
        eprintln!("Logging disabled: {}", e);
    }
    log::info!("Application starting");
}

fn install_stop_handler() -> Arc<AtomicBool> {
    let running = Arc::new(AtomicBool::new(true));
    let running_for_ctrlc = running.clone();
    ctrlc::set_handler(move || {
        log::info!("Received interrupt, shutting down");
        running_for_ctrlc.store(false, Ordering::SeqCst);
    })
    .expect("Error setting Ctrl-C handler");
    running
}

fn run_observer(config: &Config, running: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let engine = MidirEngine::new(config.device.as_deref())?;
    println!("MIDI Clock Analyzer started");
    println!("Press Ctrl+C to stop\n");

    let display = StatusDisplay::new();
    let mut event_loop = EventLoop::new(engine);
    let result = event_loop.run(running, |event| display.show_clock_event(&event));
    display.finish();

    let totals = result?;
    println!("Total ticks received: {}", totals.pulse_count);
    println!("Total beats: {}", totals.beat_count);
    Ok(())
}

fn run_clock_generator(config: &Config, running: &AtomicBool) -> Result<(), Box<dyn Error>> {
    let sink = MidirSink::new(config.device.as_deref())?;
    let mut generator = Generator::new();
    generator.open(TickDispatcher::new(sink), config.bpm)?;
    println!("MIDI Clock Generator started at {} BPM", config.bpm);
    println!("Press Ctrl+C to stop\n");

    let settings = GeneratorSettings {
        bpm: config.bpm,
        tempo_sequence: config.tempo_sequence.clone(),
        change_every: config.change_every,
    };

    let display = StatusDisplay::new();
    let result = run_generator(&mut generator, &settings, running, |status| {
        display.show_generator_status(&status)
    });
    display.finish();
    result?;
    Ok(())
}

fn exit_with_error(message: &str) -> ! {
    log::error!("{}", message);
    eprintln!("{}", message);
    std::process::exit(1);
}
