pub mod poller;
pub mod relay_test;

pub use poller::{MonitorEvent, MonitorLoop, PollObserver, PollOptions, PollSummary, StopFlag, TriggerEvent, TriggerLoop};
pub use relay_test::RelayTestSequence;
