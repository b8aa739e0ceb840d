// config.rs

use clap::{value_parser, Arg, ArgMatches, Command};
use config::{ConfigError, Environment, File};
use log::{debug, info};
use std::path::Path;
use std::time::Duration;

/// MIDI clock pulses per quarter note.
pub const PPQN: u64 = 24;
/// Resolution of the output queue in ticks per quarter note.
pub const QUEUE_RESOLUTION: u64 = 96;
/// Queue ticks covered by one outgoing MIDI clock pulse.
pub const TICKS_PER_PULSE: u64 = QUEUE_RESOLUTION / PPQN;
/// Number of intervals the tempo estimator averages over (4 beats).
pub const HISTORY_CAPACITY: usize = 96;
pub const BEATS_PER_BAR: u64 = 4;

pub const MICROS_PER_MINUTE: u32 = 60_000_000;
pub const DEFAULT_BPM: u32 = 120;
pub const DEFAULT_MICROS_PER_BEAT: u32 = MICROS_PER_MINUTE / DEFAULT_BPM;

const DEFAULT_CHANGE_EVERY_SECS: i64 = 10;
const ENV_PREFIX: &str = "PULSECLOCK";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    /// Listen to an incoming clock and estimate its tempo
    Observe,
    /// Emit a clock at a controllable tempo
    Generate,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: Mode,
    pub device: Option<String>,
    pub bpm: i32,
    /// Tempos cycled through by the generator, one step every `change_every`
    pub tempo_sequence: Vec<i32>,
    pub change_every: Duration,
}

impl Config {
    pub fn command() -> Command {
        Command::new("pulseclockrs")
            .about("MIDI clock tempo observer and generator")
            .subcommand_required(true)
            .arg(
                Arg::new("config")
                    .long("config")
                    .value_name("FILE")
                    .help("Reads settings from a TOML file")
                    .global(true)
                    .required(false),
            )
            .arg(
                Arg::new("device")
                    .short('d')
                    .long("device")
                    .value_name("DEVICE")
                    .help("Connects to the MIDI port whose name contains DEVICE")
                    .global(true)
                    .required(false),
            )
            .subcommand(Command::new("observe").about("Estimates the tempo of an incoming MIDI clock"))
            .subcommand(
                Command::new("generate")
                    .about("Sends MIDI clock at a given tempo")
                    .arg(
                        Arg::new("bpm")
                            .short('b')
                            .long("bpm")
                            .value_name("BPM")
                            .help("Sets the initial beats per minute")
                            .value_parser(value_parser!(i64))
                            .required(false),
                    )
                    .arg(
                        Arg::new("tempo-sequence")
                            .long("tempo-sequence")
                            .value_name("BPM,BPM,...")
                            .help("Cycles through these tempos while generating")
                            .required(false),
                    )
                    .arg(
                        Arg::new("change-every")
                            .long("change-every")
                            .value_name("SECONDS")
                            .help("Seconds between tempo sequence steps")
                            .value_parser(value_parser!(i64))
                            .required(false),
                    ),
            )
    }

    pub fn new() -> Result<Self, ConfigError> {
        let matches = Self::command().get_matches();
        Self::from_matches(&matches)
    }

    pub fn from_matches(matches: &ArgMatches) -> Result<Self, ConfigError> {
        let (mode, sub_matches) = match matches.subcommand() {
            Some(("observe", sub)) => (Mode::Observe, sub),
            Some(("generate", sub)) => (Mode::Generate, sub),
            _ => return Err(ConfigError::Message("missing subcommand".to_string())),
        };
        debug!("Selected mode: {:?}", mode);

        let settings = Self::layered_settings(sub_matches)?;

        let bpm = parse_bpm(settings.get_int("bpm")?)?;
        let tempo_sequence = parse_tempo_sequence(&settings.get_string("tempo_sequence")?)?;
        let change_every = parse_change_every(settings.get_int("change_every")?)?;
        let device = match settings.get_string("device") {
            Ok(name) if !name.is_empty() => Some(name),
            Ok(_) | Err(ConfigError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        info!(
            "Configuration: mode={:?}, device={:?}, bpm={}, tempo_sequence={:?}, change_every={:?}",
            mode, device, bpm, tempo_sequence, change_every
        );

        Ok(Config {
            mode,
            device,
            bpm,
            tempo_sequence,
            change_every,
        })
    }

    // Defaults < config file < PULSECLOCK_* environment < command line
    fn layered_settings(matches: &ArgMatches) -> Result<config::Config, ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("bpm", i64::from(DEFAULT_BPM))?
            .set_default("tempo_sequence", "")?
            .set_default("change_every", DEFAULT_CHANGE_EVERY_SECS)?;

        if let Some(path) = matches.get_one::<String>("config") {
            debug!("Reading configuration file: {}", path);
            builder = builder.add_source(File::from(Path::new(path)));
        }

        builder = builder.add_source(Environment::with_prefix(ENV_PREFIX));

        if let Some(device) = matches.get_one::<String>("device") {
            builder = builder.set_override("device", device.as_str())?;
        }
        if let Some(bpm) = matches.try_get_one::<i64>("bpm").ok().flatten() {
            builder = builder.set_override("bpm", *bpm)?;
        }
        if let Some(sequence) = matches.try_get_one::<String>("tempo-sequence").ok().flatten() {
            builder = builder.set_override("tempo_sequence", sequence.as_str())?;
        }
        if let Some(secs) = matches.try_get_one::<i64>("change-every").ok().flatten() {
            builder = builder.set_override("change_every", *secs)?;
        }

        builder.build()
    }
}

// A tempo whose beat rounds to 0 µs cannot be paced
fn parse_bpm(value: i64) -> Result<i32, ConfigError> {
    match i32::try_from(value) {
        Ok(bpm) if bpm > 0 && i64::from(bpm) <= i64::from(MICROS_PER_MINUTE) => Ok(bpm),
        _ => Err(ConfigError::Message(format!("invalid BPM {}", value))),
    }
}

fn parse_tempo_sequence(raw: &str) -> Result<Vec<i32>, ConfigError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            let value = s
                .parse::<i64>()
                .map_err(|_| ConfigError::Message(format!("invalid tempo '{}'", s)))?;
            parse_bpm(value)
        })
        .collect()
}

fn parse_change_every(secs: i64) -> Result<Duration, ConfigError> {
    match u64::try_from(secs) {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(ConfigError::Message(format!(
            "invalid tempo change interval {}",
            secs
        ))),
    }
}
