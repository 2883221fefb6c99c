use serde::{Deserialize, Serialize};
use std::fmt;

use crate::utils::error::RelayError;

/// Number of relays (and of inputs) on the board.
pub const NUMBER_OF_CHANNELS: usize = 4;

/// A relay or input channel, numbered 1 to 4 as printed on the board.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub struct Channel(u8);

impl Channel {
    pub const ALL: [Channel; NUMBER_OF_CHANNELS] = [Channel(1), Channel(2), Channel(3), Channel(4)];

    pub fn new(number: u8) -> Result<Self, RelayError> {
        if (1..=NUMBER_OF_CHANNELS as u8).contains(&number) {
            Ok(Self(number))
        } else {
            Err(RelayError::InvalidChannel(number))
        }
    }

    /// 1-based channel number.
    pub fn number(self) -> u8 {
        self.0
    }

    /// 0-based position, also the coil address and the bit in the status byte.
    pub fn index(self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn coil_address(self) -> u16 {
        self.index() as u16
    }

    fn mask(self) -> u8 {
        1 << self.index()
    }
}

impl TryFrom<u8> for Channel {
    type Error = RelayError;

    fn try_from(number: u8) -> Result<Self, Self::Error> {
        Channel::new(number)
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// On/off state of the four relays, or triggered state of the four inputs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelStates {
    pub ch1: bool,
    pub ch2: bool,
    pub ch3: bool,
    pub ch4: bool,
}

impl ChannelStates {
    pub const ALL_OFF: ChannelStates = ChannelStates {
        ch1: false,
        ch2: false,
        ch3: false,
        ch4: false,
    };

    pub fn from_array(states: [bool; NUMBER_OF_CHANNELS]) -> Self {
        Self {
            ch1: states[0],
            ch2: states[1],
            ch3: states[2],
            ch4: states[3],
        }
    }

    pub fn to_array(self) -> [bool; NUMBER_OF_CHANNELS] {
        [self.ch1, self.ch2, self.ch3, self.ch4]
    }

    /// Relay bits are reported as-is: 1 means energized. Only the low nibble is used.
    pub fn from_relay_status(status: u8) -> Self {
        Self::from_array(Channel::ALL.map(|ch| status & ch.mask() != 0))
    }

    /// Inputs are active-low: a 0 bit means the input is pulled to GND (triggered).
    pub fn from_input_status(status: u8) -> Self {
        Self::from_array(Channel::ALL.map(|ch| status & ch.mask() == 0))
    }

    pub fn get(&self, channel: Channel) -> bool {
        self.to_array()[channel.index()]
    }

    pub fn set(&mut self, channel: Channel, on: bool) {
        match channel.number() {
            1 => self.ch1 = on,
            2 => self.ch2 = on,
            3 => self.ch3 = on,
            _ => self.ch4 = on,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Channel, bool)> {
        Channel::ALL.into_iter().zip(self.to_array())
    }

    /// Channels whose state differs from `previous`, lowest first.
    pub fn changed_since(&self, previous: &ChannelStates) -> Vec<Channel> {
        self.iter()
            .filter(|&(ch, state)| previous.get(ch) != state)
            .map(|(ch, _)| ch)
            .collect()
    }

    pub fn count_on(&self) -> usize {
        self.to_array().iter().filter(|&&on| on).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_range() {
        assert!(Channel::new(0).is_err());
        assert!(Channel::new(5).is_err());
        assert!(matches!(Channel::try_from(9), Err(RelayError::InvalidChannel(9))));

        let ch = Channel::new(3).unwrap();
        assert_eq!(ch.number(), 3);
        assert_eq!(ch.index(), 2);
        assert_eq!(ch.coil_address(), 2);
    }

    #[test]
    fn test_relay_nibble_matches_bit_tests() {
        for nibble in 0..16u8 {
            let states = ChannelStates::from_relay_status(nibble).to_array();
            for bit in 0..4 {
                assert_eq!(states[bit], nibble & (1 << bit) != 0, "nibble {:04b} bit {}", nibble, bit);
            }
        }
    }

    #[test]
    fn test_input_nibble_is_inverted() {
        for nibble in 0..16u8 {
            let states = ChannelStates::from_input_status(nibble).to_array();
            for bit in 0..4 {
                assert_eq!(states[bit], nibble & (1 << bit) == 0, "nibble {:04b} bit {}", nibble, bit);
            }
        }
    }

    #[test]
    fn test_high_nibble_ignored() {
        assert_eq!(ChannelStates::from_relay_status(0xF0), ChannelStates::ALL_OFF);
        assert_eq!(ChannelStates::from_input_status(0x0F), ChannelStates::ALL_OFF);
    }

    #[test]
    fn test_changed_since() {
        let before = ChannelStates::from_array([true, false, false, true]);
        let mut after = before;
        after.set(Channel::new(2).unwrap(), true);
        after.set(Channel::new(4).unwrap(), false);

        let changed: Vec<u8> = after.changed_since(&before).iter().map(|c| c.number()).collect();
        assert_eq!(changed, vec![2, 4]);
        assert!(before.changed_since(&before).is_empty());
        assert_eq!(after.count_on(), 2);
    }
}
