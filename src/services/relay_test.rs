use log::info;
use std::thread;
use std::time::Duration;

use crate::devices::{Channel, RelayBoard};
use crate::modbus::client::SerialLink;
use crate::utils::error::RelayError;

/// Click each relay in turn so wiring can be checked by ear.
#[derive(Debug, Clone)]
pub struct RelayTestSequence {
    pub on_time: Duration,
    pub off_time: Duration,
}

impl Default for RelayTestSequence {
    fn default() -> Self {
        Self {
            on_time: Duration::from_millis(200),
            off_time: Duration::from_millis(100),
        }
    }
}

impl RelayTestSequence {
    /// All off, then each relay on for `on_time` and off for `off_time`.
    /// `on_step` is called just before a relay is switched on.
    pub fn run<L: SerialLink>(
        &self,
        board: &mut RelayBoard<L>,
        mut on_step: impl FnMut(Channel),
    ) -> Result<(), RelayError> {
        info!("🧪 Testing relays...");
        board.all_off()?;
        thread::sleep(self.off_time);

        for channel in Channel::ALL {
            on_step(channel);
            board.set_relay(channel, true)?;
            thread::sleep(self.on_time);
            board.set_relay(channel, false)?;
            thread::sleep(self.off_time);
        }

        info!("✅ Relay test complete");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::{Config, TimingConfig};
    use crate::modbus::mock::MockLink;
    use crate::modbus::protocol::FunctionCode;

    #[test]
    fn test_sequence_clicks_each_relay_once() {
        let link = MockLink::new();
        let handle = link.clone();
        handle.set_relay_status(0x0F);
        let config = Config {
            timing: TimingConfig::immediate(),
            ..Config::default()
        };
        let mut board = RelayBoard::new(link, &config);

        let sequence = RelayTestSequence {
            on_time: Duration::ZERO,
            off_time: Duration::ZERO,
        };
        let mut steps = Vec::new();
        sequence.run(&mut board, |ch| steps.push(ch.number())).unwrap();

        assert_eq!(steps, vec![1, 2, 3, 4]);
        let writes = handle.frames_with_function(FunctionCode::WriteSingleCoil);
        assert_eq!(writes.len(), 12);
        // After the initial all-off: on/off pairs per channel
        for (i, pair) in writes[4..].chunks(2).enumerate() {
            assert_eq!(pair[0][3] as usize, i);
            assert_eq!(&pair[0][4..6], &[0xFF, 0x00]);
            assert_eq!(&pair[1][4..6], &[0x00, 0x00]);
        }
        assert_eq!(handle.relay_status(), 0x00);
    }
}
