//! RS-485 Relay Board Library
//!
//! Driver and polling controller for 4-channel relay/input boards that speak
//! a Modbus RTU subset (read coils, read discrete inputs, write single coil)
//! over a serial line. The frame codec lives in [`modbus`], the board driver
//! in [`devices`], and the monitor / input-to-relay loops in [`services`].

pub mod cli;
pub mod config;
pub mod devices;
pub mod modbus;
pub mod output;
pub mod services;
pub mod utils;

// Re-export commonly used types
pub use config::Config;
pub use devices::{Channel, ChannelStates, RelayBoard};
pub use modbus::{SerialLink, SerialPortLink};
pub use services::{MonitorLoop, PollObserver, PollOptions, PollSummary, StopFlag, TriggerLoop};
pub use utils::error::RelayError;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
