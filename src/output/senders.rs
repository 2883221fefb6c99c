use log::{error, info};
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::Path;

use super::formatters::StatusFormatter;
use crate::services::poller::{MonitorEvent, PollObserver, TriggerEvent};
use crate::utils::error::RelayError;

pub trait DataSender: Send {
    fn send(&mut self, data: &str) -> Result<(), RelayError>;
    fn sender_type(&self) -> &str;
    fn destination(&self) -> &str;
}

/// Prints one line per message, or rewrites the current line when `inline` is set.
pub struct ConsoleSender {
    inline: bool,
}

impl ConsoleSender {
    pub fn new() -> Self {
        Self { inline: false }
    }

    pub fn inline() -> Self {
        Self { inline: true }
    }
}

impl Default for ConsoleSender {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSender for ConsoleSender {
    fn send(&mut self, data: &str) -> Result<(), RelayError> {
        let mut stdout = io::stdout().lock();
        if self.inline {
            write!(stdout, "\r{}", data)?;
        } else {
            writeln!(stdout, "{}", data)?;
        }
        stdout.flush()?;
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "console"
    }

    fn destination(&self) -> &str {
        "stdout"
    }
}

/// Appends every message as a line to a file.
pub struct FileSender {
    file_path: String,
}

impl FileSender {
    pub fn new<P: AsRef<Path>>(file_path: P) -> Self {
        Self {
            file_path: file_path.as_ref().to_string_lossy().to_string(),
        }
    }
}

impl DataSender for FileSender {
    fn send(&mut self, data: &str) -> Result<(), RelayError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.file_path)
            .map_err(|e| {
                error!("❌ Failed to open file {}: {}", self.file_path, e);
                RelayError::CommunicationError(format!("File open error: {}", e))
            })?;

        writeln!(file, "{}", data).map_err(|e| {
            error!("❌ Failed to write to file {}: {}", self.file_path, e);
            RelayError::CommunicationError(format!("File write error: {}", e))
        })?;
        Ok(())
    }

    fn sender_type(&self) -> &str {
        "file"
    }

    fn destination(&self) -> &str {
        &self.file_path
    }
}

/// Renders loop events with one formatter and fans them out to every sender.
/// A failing sender is logged and skipped; it never stops the loop.
pub struct EventPublisher {
    formatter: Box<dyn StatusFormatter>,
    senders: Vec<Box<dyn DataSender>>,
}

impl EventPublisher {
    pub fn new(formatter: Box<dyn StatusFormatter>) -> Self {
        Self {
            formatter,
            senders: Vec::new(),
        }
    }

    pub fn add_sender(&mut self, sender: Box<dyn DataSender>) {
        info!("📤 Output added: {} → {}", sender.sender_type(), sender.destination());
        self.senders.push(sender);
    }

    pub fn formatter(&self) -> &dyn StatusFormatter {
        self.formatter.as_ref()
    }

    pub fn publish(&mut self, data: &str) {
        if data.is_empty() {
            return;
        }
        for sender in &mut self.senders {
            if let Err(e) = sender.send(data) {
                error!("❌ {} output failed: {}", sender.sender_type(), e);
            }
        }
    }
}

impl PollObserver for EventPublisher {
    fn on_monitor(&mut self, event: &MonitorEvent) {
        let line = self.formatter.format_monitor_event(event);
        self.publish(&line);
    }

    fn on_trigger(&mut self, event: &TriggerEvent) {
        let line = self.formatter.format_trigger_event(event);
        self.publish(&line);
    }
}
