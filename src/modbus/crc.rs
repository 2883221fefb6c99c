/// Modbus CRC16: seed 0xFFFF, reflected polynomial 0xA001, LSB first.
///
/// The result goes on the wire little-endian (`crc.to_le_bytes()`).
pub fn crc16_modbus(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;
    let poly: u16 = 0xA001;

    for &byte in data {
        crc ^= byte as u16;
        for _ in 0..8 {
            if crc & 0x0001 != 0 {
                crc = (crc >> 1) ^ poly;
            } else {
                crc >>= 1;
            }
        }
    }
    crc
}

/// Check that the last two bytes of `frame` are the little-endian CRC of the rest.
pub fn crc16_matches(frame: &[u8]) -> bool {
    if frame.len() < 2 {
        return false;
    }
    let data_len = frame.len() - 2;
    let received = u16::from_le_bytes([frame[data_len], frame[data_len + 1]]);
    received == crc16_modbus(&frame[..data_len])
}
