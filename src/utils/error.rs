use thiserror::Error;

#[derive(Error, Debug)]
pub enum RelayError {
    #[error("Connection error: {0}")]
    ConnectionError(String),

    #[error("Communication error: {0}")]
    CommunicationError(String),

    #[error("Invalid channel: {0} (expected 1-4)")]
    InvalidChannel(u8),

    #[error("Invalid channel index: {0} (expected 0-3)")]
    InvalidChannelIndex(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

impl From<std::io::Error> for RelayError {
    fn from(err: std::io::Error) -> Self {
        RelayError::CommunicationError(format!("IO error: {}", err))
    }
}

impl From<serialport::Error> for RelayError {
    fn from(err: serialport::Error) -> Self {
        RelayError::ConnectionError(format!("Serial port error: {}", err))
    }
}

impl From<serde_json::Error> for RelayError {
    fn from(err: serde_json::Error) -> Self {
        RelayError::SerializationError(format!("JSON error: {}", err))
    }
}

impl From<toml::de::Error> for RelayError {
    fn from(err: toml::de::Error) -> Self {
        RelayError::ConfigError(format!("TOML parse error: {}", err))
    }
}

impl From<toml::ser::Error> for RelayError {
    fn from(err: toml::ser::Error) -> Self {
        RelayError::SerializationError(format!("TOML error: {}", err))
    }
}
