use log::{error, info};
use serialport::{ClearBuffer, SerialPort};
use std::io::{self, Read, Write};
use std::time::{Duration, Instant};

use crate::config::settings::{Config, ParityConfig};
use crate::utils::error::RelayError;

/// Byte-level access to the RS-485 line.
///
/// A link is owned by exactly one driver; dropping it releases the port.
pub trait SerialLink: Send {
    /// Discard anything sitting in the receive buffer.
    fn clear_input(&mut self) -> io::Result<()>;

    /// Write the whole frame and block until it has left the output buffer.
    fn send(&mut self, frame: &[u8]) -> io::Result<()>;

    /// Read until `buf` is full or `timeout` has elapsed, returning the number
    /// of bytes received. Running out of time is not an error.
    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize>;
}

pub struct SerialPortLink {
    port: Box<dyn SerialPort>,
    name: String,
}

impl SerialPortLink {
    pub fn open(config: &Config) -> Result<Self, RelayError> {
        info!("🔌 Connecting to relay board on {}", config.serial_port);
        info!(
            "⚙️  Configuration: {} baud, 8 data bits, {:?} parity, 1 stop bit",
            config.baud_rate, config.parity
        );

        let serial_parity = match config.parity {
            ParityConfig::None => serialport::Parity::None,
            ParityConfig::Even => serialport::Parity::Even,
            ParityConfig::Odd => serialport::Parity::Odd,
        };

        let port = serialport::new(&config.serial_port, config.baud_rate)
            .timeout(config.timing.read_timeout())
            .data_bits(serialport::DataBits::Eight)
            .stop_bits(serialport::StopBits::One)
            .parity(serial_parity)
            .flow_control(serialport::FlowControl::None)
            .open()
            .map_err(|e| {
                error!("❌ Failed to open serial port {}: {}", config.serial_port, e);
                RelayError::ConnectionError(format!("Failed to open port {}: {}", config.serial_port, e))
            })?;

        info!("✅ Serial port {} opened", config.serial_port);
        Ok(Self {
            port,
            name: config.serial_port.clone(),
        })
    }
}

impl SerialLink for SerialPortLink {
    fn clear_input(&mut self) -> io::Result<()> {
        self.port.clear(ClearBuffer::Input).map_err(io::Error::from)
    }

    fn send(&mut self, frame: &[u8]) -> io::Result<()> {
        self.port.write_all(frame)?;
        self.port.flush()
    }

    fn receive(&mut self, buf: &mut [u8], timeout: Duration) -> io::Result<usize> {
        // The port timeout applies per read call, so track one overall deadline.
        let deadline = Instant::now() + timeout;
        let mut filled = 0;

        while filled < buf.len() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            self.port.set_timeout(deadline - now).map_err(io::Error::from)?;

            match self.port.read(&mut buf[filled..]) {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if e.kind() == io::ErrorKind::TimedOut => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        Ok(filled)
    }
}

impl Drop for SerialPortLink {
    fn drop(&mut self) {
        info!("🔒 Serial port {} released", self.name);
    }
}
