use crate::midi::dispatcher::MessageSink;
use crate::midi::engine::{ChannelEngine, MidiEngine, MidiError, MidiMessage, Result, TimestampedMessage};
use crossbeam::channel::unbounded;
use log::{debug, info, trace};
use midir::{Ignore, MidiInput, MidiInputConnection, MidiOutput, MidiOutputConnection};
use std::time::Duration;

const CLIENT_NAME: &str = "pulseclockrs";
const INPUT_PORT_NAME: &str = "pulseclockrs-in";
const OUTPUT_PORT_NAME: &str = "pulseclockrs-out";

fn connection_error(e: impl std::fmt::Display) -> MidiError {
    MidiError::ConnectionError(e.to_string())
}

/// Inbound MIDI from a named device, or from a virtual port when no device is given
pub struct MidirEngine {
    _connection: MidiInputConnection<()>,
    inner: ChannelEngine,
}

impl MidirEngine {
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let mut midi_in = MidiInput::new(CLIENT_NAME).map_err(connection_error)?;
        // Clock and transport messages count as "time" messages in midir
        midi_in.ignore(Ignore::None);

        let (tx, rx) = unbounded();
        let callback = move |stamp: u64, data: &[u8], _: &mut ()| {
            if let Some(message) = MidiMessage::parse(data) {
                trace!("Received {:?} at {} us", message, stamp);
                if tx.send(TimestampedMessage::new(stamp, message)).is_err() {
                    trace!("Observer gone, dropping {:?}", message);
                }
            }
        };

        let connection = match device_name {
            Some(name) => {
                let in_ports = midi_in.ports();
                let in_port = in_ports
                    .iter()
                    .find(|p| midi_in.port_name(p).unwrap_or_default().contains(name))
                    .ok_or_else(|| {
                        MidiError::ConnectionError(format!("input device '{}' not found", name))
                    })?;
                let port_name = midi_in.port_name(in_port).map_err(connection_error)?;
                info!("Connecting to MIDI input port: {}", port_name);
                midi_in
                    .connect(in_port, INPUT_PORT_NAME, callback, ())
                    .map_err(connection_error)?
            }
            None => Self::open_virtual(midi_in, callback)?,
        };

        Ok(MidirEngine {
            _connection: connection,
            inner: ChannelEngine::new(rx),
        })
    }

    #[cfg(unix)]
    fn open_virtual<F>(midi_in: MidiInput, callback: F) -> Result<MidiInputConnection<()>>
    where
        F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
    {
        use midir::os::unix::VirtualInput;

        info!("Registering virtual MIDI input port: {}", INPUT_PORT_NAME);
        midi_in
            .create_virtual(INPUT_PORT_NAME, callback, ())
            .map_err(connection_error)
    }

    #[cfg(not(unix))]
    fn open_virtual<F>(_midi_in: MidiInput, _callback: F) -> Result<MidiInputConnection<()>>
    where
        F: FnMut(u64, &[u8], &mut ()) + Send + 'static,
    {
        Err(MidiError::ConnectionError(
            "virtual ports are not supported on this platform, pass --device".to_string(),
        ))
    }
}

impl MidiEngine for MidirEngine {
    fn recv_timeout(&mut self, timeout: Duration) -> Result<Option<TimestampedMessage>> {
        self.inner.recv_timeout(timeout)
    }
}

/// Outbound MIDI connection used as the tick dispatcher's sink
pub struct MidirSink {
    connection: MidiOutputConnection,
}

impl MidirSink {
    pub fn new(device_name: Option<&str>) -> Result<Self> {
        let midi_out = MidiOutput::new(CLIENT_NAME).map_err(connection_error)?;

        let connection = match device_name {
            Some(name) => {
                let out_ports = midi_out.ports();
                let out_port = out_ports
                    .iter()
                    .find(|p| midi_out.port_name(p).unwrap_or_default().contains(name))
                    .ok_or_else(|| {
                        MidiError::ConnectionError(format!("output device '{}' not found", name))
                    })?;
                let port_name = midi_out.port_name(out_port).map_err(connection_error)?;
                info!("Connecting to MIDI output port: {}", port_name);
                midi_out
                    .connect(out_port, OUTPUT_PORT_NAME)
                    .map_err(connection_error)?
            }
            None => Self::open_virtual(midi_out)?,
        };

        Ok(MidirSink { connection })
    }

    #[cfg(unix)]
    fn open_virtual(midi_out: MidiOutput) -> Result<MidiOutputConnection> {
        use midir::os::unix::VirtualOutput;

        info!("Registering virtual MIDI output port: {}", OUTPUT_PORT_NAME);
        midi_out
            .create_virtual(OUTPUT_PORT_NAME)
            .map_err(connection_error)
    }

    #[cfg(not(unix))]
    fn open_virtual(_midi_out: MidiOutput) -> Result<MidiOutputConnection> {
        Err(MidiError::ConnectionError(
            "virtual ports are not supported on this platform, pass --device".to_string(),
        ))
    }
}

impl MessageSink for MidirSink {
    fn send(&mut self, msg: MidiMessage) -> Result<()> {
        debug!("Sending {:?}", msg);
        self.connection
            .send(&[msg.to_byte()])
            .map_err(|e| MidiError::SendError(e.to_string()))
    }
}
