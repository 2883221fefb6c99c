use clap::ArgMatches;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::utils::error::RelayError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    // Connection settings
    pub serial_port: String,
    pub baud_rate: u32,
    pub parity: ParityConfig,
    pub device_id: u8,

    /// Drop responses whose trailing CRC does not check out.
    pub verify_response_crc: bool,

    pub timing: TimingConfig,
}

/// Board timing, tuned against the 4-channel relay board at 9600 baud.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Pause between flushing a request and reading the reply.
    pub tx_wait_ms: u64,
    /// Upper bound on waiting for a reply.
    pub read_timeout_ms: u64,
    /// Pause after opening the port before the first request.
    pub open_settle_ms: u64,
    /// Idle time between polling iterations.
    pub poll_interval_ms: u64,
    /// Largest reply read per transaction.
    pub max_response_len: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParityConfig {
    None,
    Even,
    Odd,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            tx_wait_ms: 8,
            read_timeout_ms: 25,
            open_settle_ms: 100,
            poll_interval_ms: 10,
            max_response_len: 20,
        }
    }
}

impl TimingConfig {
    /// Everything set to zero; for simulated boards.
    pub fn immediate() -> Self {
        Self {
            tx_wait_ms: 0,
            read_timeout_ms: 0,
            open_settle_ms: 0,
            poll_interval_ms: 0,
            ..Self::default()
        }
    }

    pub fn tx_wait(&self) -> Duration {
        Duration::from_millis(self.tx_wait_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn open_settle(&self) -> Duration {
        Duration::from_millis(self.open_settle_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Worst-case time spent inside one transaction.
    pub fn transaction_floor(&self) -> Duration {
        self.tx_wait() + self.read_timeout()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: default_port().to_string(),
            baud_rate: 9600,
            parity: ParityConfig::None,
            device_id: 1,
            verify_response_crc: false,
            timing: TimingConfig::default(),
        }
    }
}

fn default_port() -> &'static str {
    if cfg!(target_os = "windows") {
        "COM1"
    } else if cfg!(target_os = "macos") {
        "/dev/tty.usbserial-0001"
    } else {
        "/dev/ttyUSB0"
    }
}

impl Config {
    /// Start from `--config FILE` (or defaults) and apply command-line overrides.
    pub fn from_matches(matches: &ArgMatches) -> Result<Self, RelayError> {
        let mut config = match matches.get_one::<String>("config") {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };

        if let Some(port) = matches.get_one::<String>("port") {
            config.serial_port = port.clone();
        }
        if let Some(&baud) = matches.get_one::<u32>("baud") {
            config.baud_rate = baud;
        }
        if let Some(&device_id) = matches.get_one::<u8>("device-id") {
            config.device_id = device_id;
        }
        if let Some(&interval) = matches.get_one::<u64>("interval") {
            config.timing.poll_interval_ms = interval;
        }
        if matches.get_flag("verify-crc") {
            config.verify_response_crc = true;
        }

        config.validate()?;
        debug!("Resolved configuration: {:?}", config);
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, RelayError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            RelayError::ConfigError(format!("Cannot read {}: {}", path.display(), e))
        })?;
        let config: Config = toml::from_str(&content)?;
        info!("📄 Loaded configuration from {}", path.display());
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), RelayError> {
        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), RelayError> {
        if self.serial_port.trim().is_empty() {
            return Err(RelayError::ConfigError("serial_port must not be empty".to_string()));
        }
        if self.baud_rate == 0 {
            return Err(RelayError::ConfigError("baud_rate must be positive".to_string()));
        }
        if !(1..=247).contains(&self.device_id) {
            return Err(RelayError::ConfigError(format!(
                "device_id {} out of range 1-247",
                self.device_id
            )));
        }
        if self.timing.max_response_len < crate::modbus::protocol::MIN_RESPONSE_LEN {
            return Err(RelayError::ConfigError(format!(
                "max_response_len {} is shorter than a status reply",
                self.timing.max_response_len
            )));
        }
        Ok(())
    }
}
