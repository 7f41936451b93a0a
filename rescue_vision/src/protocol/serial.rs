// THEORY:
// The serial link to the motion controller is owned by exactly one session.
//
// 1.  **Channel**: `SerialChannel` is the seam between the engine and the port. It
//     only needs two things: hand over whatever bytes are pending (possibly none)
//     and write a reply. The real implementation wraps a `serialport` handle whose
//     reads are bounded by the configured timeout.
// 2.  **Session**: a session is either enabled (it owns a channel) or disabled.
//     Disabling drops the channel, which closes the port. There is no way back:
//     after a channel failure the protocol goes silent for the rest of the process
//     while vision keeps running.

use crate::config::SerialConfig;
use crate::error::{RescueError, Result};
use serialport::SerialPort;
use std::io::{self, Read, Write};
use std::time::Duration;
use tracing::{error, info};

pub trait SerialChannel: Send {
    /// Every byte currently waiting, empty when nothing has arrived.
    fn read_pending(&mut self) -> Result<Vec<u8>>;
    fn write_reply(&mut self, bytes: &[u8]) -> Result<()>;
}

/// A `serialport` handle.
pub struct SerialPortChannel {
    port: Box<dyn SerialPort>,
}

impl SerialPortChannel {
    pub fn open(config: &SerialConfig) -> Result<Self> {
        let port = serialport::new(&config.port, config.baud_rate)
            .timeout(Duration::from_millis(config.timeout_ms))
            .open()
            .map_err(|source| RescueError::SerialOpen { port: config.port.clone(), source })?;
        Ok(Self { port })
    }
}

impl SerialChannel for SerialPortChannel {
    fn read_pending(&mut self) -> Result<Vec<u8>> {
        let waiting = self.port.bytes_to_read().map_err(io::Error::from)? as usize;
        if waiting == 0 {
            return Ok(Vec::new());
        }
        let mut buffer = vec![0u8; waiting];
        match self.port.read(&mut buffer) {
            Ok(read) => {
                buffer.truncate(read);
                Ok(buffer)
            }
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn write_reply(&mut self, bytes: &[u8]) -> Result<()> {
        self.port.write_all(bytes)?;
        self.port.flush()?;
        Ok(())
    }
}

pub enum SerialSession {
    Enabled(Box<dyn SerialChannel>),
    Disabled,
}

impl SerialSession {
    /// Opens the configured port. A port that cannot be opened yields a disabled
    /// session; vision keeps running without a controller link.
    pub fn open(config: &SerialConfig) -> Self {
        match SerialPortChannel::open(config) {
            Ok(channel) => {
                info!(port = %config.port, baud = config.baud_rate, "serial port opened");
                SerialSession::Enabled(Box::new(channel))
            }
            Err(e) => {
                error!(error = %e, "serial disabled");
                SerialSession::Disabled
            }
        }
    }

    pub fn with_channel(channel: Box<dyn SerialChannel>) -> Self {
        SerialSession::Enabled(channel)
    }

    pub fn is_enabled(&self) -> bool {
        matches!(self, SerialSession::Enabled(_))
    }

    pub fn channel_mut(&mut self) -> Option<&mut (dyn SerialChannel + 'static)> {
        match self {
            SerialSession::Enabled(channel) => Some(channel.as_mut()),
            SerialSession::Disabled => None,
        }
    }

    /// Permanent. The channel is dropped, closing the port.
    pub fn disable(&mut self, cause: &RescueError) {
        if self.is_enabled() {
            error!(error = %cause, "serial channel failed, disabling protocol");
        }
        *self = SerialSession::Disabled;
    }
}
