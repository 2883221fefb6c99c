pub mod client;
pub mod crc;
#[cfg(any(test, feature = "mock"))]
pub mod mock;
pub mod protocol;

pub use client::{SerialLink, SerialPortLink};
pub use crc::crc16_modbus;
pub use protocol::{build_request, parse_response, FunctionCode};
