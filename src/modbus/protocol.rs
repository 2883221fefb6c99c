//! Request framing and response recognition for the relay board.
//!
//! Every request is a fixed 8-byte frame:
//!
//! ```text
//! [device_id, function, addr_hi, addr_lo, value_hi, value_lo, crc_lo, crc_hi]
//! ```
//!
//! Responses are recognized leniently: anything at least [`MIN_RESPONSE_LEN`] bytes
//! long whose function byte matches the request carries its data in byte 3.
//! The trailing CRC is not checked unless [`parse_response_strict`] is used.

use super::crc::{crc16_matches, crc16_modbus};

pub const REQUEST_LEN: usize = 8;
pub const MIN_RESPONSE_LEN: usize = 4;

/// Single-coil write values.
pub const COIL_ON: u16 = 0xFF00;
pub const COIL_OFF: u16 = 0x0000;

pub type Frame = [u8; REQUEST_LEN];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FunctionCode {
    ReadCoils = 0x01,
    ReadDiscreteInputs = 0x02,
    WriteSingleCoil = 0x05,
}

impl FunctionCode {
    pub fn code(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for FunctionCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FunctionCode::ReadCoils => "read-coils",
            FunctionCode::ReadDiscreteInputs => "read-inputs",
            FunctionCode::WriteSingleCoil => "write-coil",
        };
        write!(f, "{} (0x{:02X})", name, self.code())
    }
}

/// Build a request frame. Address and value are big-endian, CRC little-endian.
///
/// The argument types bound every field to its wire width; callers holding
/// wider integers have to convert with `try_from` rather than truncate.
pub fn build_request(device_id: u8, function: u8, address: u16, value: u16) -> Frame {
    let mut frame = [0u8; REQUEST_LEN];
    frame[0] = device_id;
    frame[1] = function;
    frame[2..4].copy_from_slice(&address.to_be_bytes());
    frame[4..6].copy_from_slice(&value.to_be_bytes());

    let crc = crc16_modbus(&frame[..6]);
    frame[6..8].copy_from_slice(&crc.to_le_bytes());
    frame
}

pub fn encode_coil(on: bool) -> u16 {
    if on {
        COIL_ON
    } else {
        COIL_OFF
    }
}

/// Returns the status byte (byte 3) when the response is recognized, `None` otherwise.
pub fn parse_response(response: &[u8], expected_function: u8) -> Option<u8> {
    if response.len() >= MIN_RESPONSE_LEN && response[1] == expected_function {
        Some(response[3])
    } else {
        None
    }
}

/// Like [`parse_response`], but also requires the byte-count field and a valid
/// CRC over `3 + byte_count` bytes. Trailing bytes after the CRC are ignored.
pub fn parse_response_strict(response: &[u8], expected_function: u8) -> Option<u8> {
    let status = parse_response(response, expected_function)?;
    let byte_count = response[2] as usize;
    if byte_count == 0 {
        return None;
    }
    let frame_len = 3 + byte_count + 2;
    if response.len() < frame_len || !crc16_matches(&response[..frame_len]) {
        return None;
    }
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_read_coils_known_vector() {
        let frame = build_request(1, FunctionCode::ReadCoils.code(), 0x0000, 0x0008);
        assert_eq!(frame, [0x01, 0x01, 0x00, 0x00, 0x00, 0x08, 0x3D, 0xCC]);
    }

    #[test]
    fn test_build_read_inputs_known_vector() {
        let frame = build_request(1, FunctionCode::ReadDiscreteInputs.code(), 0x0000, 0x0008);
        assert_eq!(frame, [0x01, 0x02, 0x00, 0x00, 0x00, 0x08, 0x79, 0xCC]);
    }

    #[test]
    fn test_build_write_coil_layout() {
        let frame = build_request(0x11, FunctionCode::WriteSingleCoil.code(), 0x1234, COIL_ON);
        assert_eq!(&frame[..6], &[0x11, 0x05, 0x12, 0x34, 0xFF, 0x00]);
        assert!(crc16_matches(&frame));
    }

    #[test]
    fn test_encode_coil() {
        assert_eq!(encode_coil(true), 0xFF00);
        assert_eq!(encode_coil(false), 0x0000);
    }

    #[test]
    fn test_parse_response_rejects_short_input() {
        for len in 0..MIN_RESPONSE_LEN {
            let buf = vec![0x01; len];
            assert_eq!(parse_response(&buf, 0x01), None, "len {}", len);
        }
    }

    #[test]
    fn test_parse_response_rejects_function_mismatch() {
        assert_eq!(parse_response(&[0x01, 0x02, 0x01, 0x05], 0x01), None);
        assert_eq!(parse_response(&[0x01, 0x81, 0x01, 0x05, 0x00, 0x00], 0x01), None);
    }

    #[test]
    fn test_parse_response_returns_data_byte_for_every_value() {
        for status in 0..=255u8 {
            let buf = [0x01, 0x02, 0x01, status];
            assert_eq!(parse_response(&buf, 0x02), Some(status));
        }
    }

    #[test]
    fn test_parse_response_ignores_bad_crc_by_default() {
        let buf = [0x01, 0x01, 0x01, 0x05, 0xDE, 0xAD];
        assert_eq!(parse_response(&buf, 0x01), Some(0x05));
        assert_eq!(parse_response_strict(&buf, 0x01), None);
    }

    #[test]
    fn test_parse_response_strict_accepts_valid_frame() {
        let mut buf = vec![0x01, 0x01, 0x01, 0x05];
        let crc = crc16_modbus(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        assert_eq!(parse_response_strict(&buf, 0x01), Some(0x05));

        // Truncated before the CRC
        assert_eq!(parse_response_strict(&buf[..5], 0x01), None);
    }
}
