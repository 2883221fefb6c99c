use log::{debug, info, warn};
use std::thread;

use super::channel::{Channel, ChannelStates, NUMBER_OF_CHANNELS};
use crate::config::settings::{Config, TimingConfig};
use crate::modbus::client::{SerialLink, SerialPortLink};
use crate::modbus::protocol::{build_request, encode_coil, parse_response, parse_response_strict, FunctionCode};
use crate::utils::error::RelayError;

/// Bit count sent with both read requests. The board does not answer a request
/// for 4 bits even though it only has 4 channels, so always ask for 8.
pub const READ_BIT_COUNT: u16 = 0x0008;

const STATUS_ADDRESS: u16 = 0x0000;

/// Driver for the 4-channel RS-485 relay board.
///
/// Every operation is one blocking transaction: clear the receive buffer,
/// send the request, wait `tx_wait`, then read whatever arrives within
/// `read_timeout`. A missing or unrecognized reply is not an error; reads
/// report "no data" and the caller carries on. Only a failing port is.
pub struct RelayBoard<L: SerialLink = SerialPortLink> {
    link: L,
    device_id: u8,
    timing: TimingConfig,
    verify_crc: bool,
}

impl RelayBoard<SerialPortLink> {
    /// Open the configured serial port and wait for the board to settle.
    pub fn open(config: &Config) -> Result<Self, RelayError> {
        config.validate()?;
        let link = SerialPortLink::open(config)?;
        thread::sleep(config.timing.open_settle());
        Ok(Self::new(link, config))
    }
}

impl<L: SerialLink> RelayBoard<L> {
    pub fn new(link: L, config: &Config) -> Self {
        info!("📟 Relay board driver ready (device id {})", config.device_id);
        Self {
            link,
            device_id: config.device_id,
            timing: config.timing.clone(),
            verify_crc: config.verify_response_crc,
        }
    }

    /// Run one request/response exchange and return the raw reply bytes (possibly empty).
    fn transact(&mut self, function: FunctionCode, address: u16, value: u16) -> Result<Vec<u8>, RelayError> {
        let request = build_request(self.device_id, function.code(), address, value);
        debug!("📤 TX {}: {}", function, hex::encode(request));

        self.link
            .clear_input()
            .map_err(|e| RelayError::CommunicationError(format!("Clear input failed: {}", e)))?;
        self.link
            .send(&request)
            .map_err(|e| RelayError::CommunicationError(format!("Write failed: {}", e)))?;

        thread::sleep(self.timing.tx_wait());

        let mut response = vec![0u8; self.timing.max_response_len];
        let received = self
            .link
            .receive(&mut response, self.timing.read_timeout())
            .map_err(|e| RelayError::CommunicationError(format!("Read failed: {}", e)))?;
        response.truncate(received);

        debug!("📥 RX {}: {} ({} bytes)", function, hex::encode(&response), received);
        Ok(response)
    }

    fn read_status(&mut self, function: FunctionCode) -> Result<Option<u8>, RelayError> {
        let response = self.transact(function, STATUS_ADDRESS, READ_BIT_COUNT)?;

        let status = if self.verify_crc {
            parse_response_strict(&response, function.code())
        } else {
            parse_response(&response, function.code())
        };

        if status.is_none() {
            debug!("No usable reply to {} ({} bytes received)", function, response.len());
        }
        Ok(status)
    }

    /// Raw relay byte from read-coils, `None` when the board did not answer.
    pub fn relay_status(&mut self) -> Result<Option<u8>, RelayError> {
        self.read_status(FunctionCode::ReadCoils)
    }

    /// Raw, still active-low, input byte from read-discrete-inputs.
    pub fn inputs_raw(&mut self) -> Result<Option<u8>, RelayError> {
        self.read_status(FunctionCode::ReadDiscreteInputs)
    }

    pub fn try_read_relays(&mut self) -> Result<Option<ChannelStates>, RelayError> {
        Ok(self.relay_status()?.map(ChannelStates::from_relay_status))
    }

    /// Triggered inputs are `true`.
    pub fn try_read_inputs(&mut self) -> Result<Option<ChannelStates>, RelayError> {
        Ok(self.inputs_raw()?.map(ChannelStates::from_input_status))
    }

    /// Relay states; all off if the board did not answer.
    pub fn read_relays(&mut self) -> Result<ChannelStates, RelayError> {
        Ok(self.try_read_relays()?.unwrap_or_default())
    }

    /// Input states; none triggered if the board did not answer.
    pub fn read_inputs(&mut self) -> Result<ChannelStates, RelayError> {
        Ok(self.try_read_inputs()?.unwrap_or_default())
    }

    /// Write one coil. The echo is read and discarded; a missing echo only logs.
    pub fn set_relay(&mut self, channel: Channel, on: bool) -> Result<(), RelayError> {
        let response = self.transact(FunctionCode::WriteSingleCoil, channel.coil_address(), encode_coil(on))?;
        if response.is_empty() {
            warn!("⚠️  No acknowledgement for relay {} {}", channel, if on { "ON" } else { "OFF" });
        }
        Ok(())
    }

    /// Zero-based variant of [`set_relay`](Self::set_relay).
    pub fn set_relay_index(&mut self, index: usize, on: bool) -> Result<(), RelayError> {
        if index >= NUMBER_OF_CHANNELS {
            return Err(RelayError::InvalidChannelIndex(index));
        }
        self.set_relay(Channel::ALL[index], on)
    }

    pub fn relay_on(&mut self, number: u8) -> Result<(), RelayError> {
        self.set_relay(Channel::new(number)?, true)
    }

    pub fn relay_off(&mut self, number: u8) -> Result<(), RelayError> {
        self.set_relay(Channel::new(number)?, false)
    }

    pub fn all_on(&mut self) -> Result<(), RelayError> {
        self.set_all(true)
    }

    pub fn all_off(&mut self) -> Result<(), RelayError> {
        self.set_all(false)
    }

    /// Writes every channel even if one fails; returns the first failure.
    fn set_all(&mut self, on: bool) -> Result<(), RelayError> {
        let mut first_error = None;
        for channel in Channel::ALL {
            if let Err(e) = self.set_relay(channel, on) {
                warn!("Relay {} write failed: {}", channel, e);
                first_error.get_or_insert(e);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Flip one relay based on a fresh read and return its new state.
    /// An unanswered read counts as "off", so the relay gets switched on.
    pub fn toggle(&mut self, channel: Channel) -> Result<bool, RelayError> {
        let new_state = !self.read_relays()?.get(channel);
        self.set_relay(channel, new_state)?;
        Ok(new_state)
    }

    /// Release the serial port.
    pub fn close(self) {
        info!("🔌 Closing relay board (device id {})", self.device_id);
        drop(self.link);
    }

    /// De-energize every relay, then release the port. The port is released
    /// even when a write fails.
    pub fn shutdown(mut self) -> Result<(), RelayError> {
        info!("🛑 Turning off all relays before disconnect");
        let result = self.all_off();
        self.close();
        result
    }
}
