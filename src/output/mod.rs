pub mod formatters;
pub mod senders;

pub use formatters::{ConsoleFormatter, JsonFormatter, StatusFormatter};
pub use senders::{ConsoleSender, DataSender, EventPublisher, FileSender};
