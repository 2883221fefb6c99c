pub mod channel;
pub mod relay_board;

pub use channel::{Channel, ChannelStates, NUMBER_OF_CHANNELS};
pub use relay_board::RelayBoard;
