//! Interactive command prompt.
//!
//! Lines arrive over a channel fed by a stdin reader thread, so the prompt
//! loop never blocks indefinitely: it wakes up regularly to check its own
//! running flag and the shared [`StopFlag`].

use log::error;
use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use crate::devices::{Channel, RelayBoard};
use crate::modbus::client::SerialLink;
use crate::output::formatters::StatusFormatter;
use crate::services::poller::{MonitorEvent, MonitorLoop, PollObserver, PollOptions, StopFlag};
use crate::utils::error::RelayError;

const WAKE_INTERVAL: Duration = Duration::from_millis(100);

const HELP: &str = "Commands:
  1-4      : Toggle relay 1-4
  on N     : Turn relay N on
  off N    : Turn relay N off
  all on   : All relays on
  all off  : All relays off
  status   : Read current status
  monitor  : Start continuous monitoring (Ctrl+C returns here)
  help     : Show this list
  quit     : Exit";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellCommand {
    Toggle(Channel),
    On(Channel),
    Off(Channel),
    AllOn,
    AllOff,
    Status,
    Monitor,
    Help,
    Quit,
    Empty,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseError {
    Unknown,
    BadChannel(String),
}

fn parse_channel(arg: &str) -> Result<Channel, ParseError> {
    arg.parse::<u8>()
        .ok()
        .and_then(|n| Channel::new(n).ok())
        .ok_or_else(|| ParseError::BadChannel(arg.to_string()))
}

pub fn parse_command(line: &str) -> Result<ShellCommand, ParseError> {
    let line = line.trim().to_lowercase();
    let words: Vec<&str> = line.split_whitespace().collect();

    match words.as_slice() {
        [] => Ok(ShellCommand::Empty),
        ["q"] | ["quit"] | ["exit"] => Ok(ShellCommand::Quit),
        ["help"] | ["?"] => Ok(ShellCommand::Help),
        ["status"] => Ok(ShellCommand::Status),
        ["monitor"] => Ok(ShellCommand::Monitor),
        ["all", "on"] => Ok(ShellCommand::AllOn),
        ["all", "off"] => Ok(ShellCommand::AllOff),
        ["on", n] => parse_channel(n).map(ShellCommand::On),
        ["off", n] => parse_channel(n).map(ShellCommand::Off),
        [n] if n.chars().all(|c| c.is_ascii_digit()) => parse_channel(n).map(ShellCommand::Toggle),
        _ => Err(ParseError::Unknown),
    }
}

/// Forward stdin lines to a channel from a background thread.
pub fn spawn_stdin_reader() -> Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(_) => break,
            }
        }
    });
    rx
}

struct WriterObserver<'a, W: Write> {
    out: &'a mut W,
    formatter: &'a dyn StatusFormatter,
}

impl<W: Write> PollObserver for WriterObserver<'_, W> {
    fn on_monitor(&mut self, event: &MonitorEvent) {
        if let Err(e) = writeln!(self.out, "{}", self.formatter.format_monitor_event(event)) {
            error!("Failed to write monitor row: {}", e);
        }
    }
}

pub struct Shell<'a> {
    formatter: &'a dyn StatusFormatter,
    poll: PollOptions,
    stop: StopFlag,
    running: bool,
}

impl<'a> Shell<'a> {
    pub fn new(formatter: &'a dyn StatusFormatter, poll: PollOptions, stop: StopFlag) -> Self {
        Self {
            formatter,
            poll,
            stop,
            running: true,
        }
    }

    /// Serve commands until `quit`, end of input, or the stop flag.
    /// The board stays open; closing it is up to the caller.
    pub fn run<L: SerialLink, W: Write>(
        &mut self,
        board: &mut RelayBoard<L>,
        lines: &Receiver<String>,
        out: &mut W,
    ) -> Result<(), RelayError> {
        writeln!(out, "{}\n", HELP)?;
        let mut prompted = false;

        while self.running {
            if self.stop.is_stopped() {
                writeln!(out)?;
                break;
            }
            if !prompted {
                write!(out, "> ")?;
                out.flush()?;
                prompted = true;
            }

            match lines.recv_timeout(WAKE_INTERVAL) {
                Ok(line) => {
                    prompted = false;
                    match parse_command(&line) {
                        Ok(command) => self.execute(command, board, out)?,
                        Err(ParseError::BadChannel(arg)) => {
                            writeln!(out, "  Invalid relay '{}': expected 1-4", arg)?
                        }
                        Err(ParseError::Unknown) => writeln!(out, "  Unknown command. Type 'quit' to exit.")?,
                    }
                }
                Err(RecvTimeoutError::Timeout) => continue,
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }

        self.running = false;
        Ok(())
    }

    fn execute<L: SerialLink, W: Write>(
        &mut self,
        command: ShellCommand,
        board: &mut RelayBoard<L>,
        out: &mut W,
    ) -> Result<(), RelayError> {
        match command {
            ShellCommand::Toggle(channel) => {
                let on = board.toggle(channel)?;
                writeln!(out, "  Relay {} {}", channel, if on { "ON" } else { "OFF" })?;
            }
            ShellCommand::On(channel) => {
                board.set_relay(channel, true)?;
                writeln!(out, "  Relay {} ON", channel)?;
            }
            ShellCommand::Off(channel) => {
                board.set_relay(channel, false)?;
                writeln!(out, "  Relay {} OFF", channel)?;
            }
            ShellCommand::AllOn => {
                board.all_on()?;
                writeln!(out, "  All relays ON")?;
            }
            ShellCommand::AllOff => {
                board.all_off()?;
                writeln!(out, "  All relays OFF")?;
            }
            ShellCommand::Status => {
                let relays = board.relay_status()?;
                let inputs = board.inputs_raw()?;
                writeln!(out, "{}", self.formatter.format_status(relays, inputs))?;
            }
            ShellCommand::Monitor => {
                let header = self.formatter.format_monitor_header();
                if !header.is_empty() {
                    writeln!(out, "{}", header)?;
                }
                let monitor = MonitorLoop::new(self.poll.clone(), self.stop.clone());
                let mut observer = WriterObserver {
                    out: &mut *out,
                    formatter: self.formatter,
                };
                monitor.poll(board, &mut observer)?;
                // Ctrl+C ends the monitor, not the shell.
                self.stop.reset();
                writeln!(out, "\n  Monitor stopped.")?;
            }
            ShellCommand::Help => writeln!(out, "{}", HELP)?,
            ShellCommand::Quit => self.running = false,
            ShellCommand::Empty => {}
        }
        Ok(())
    }
}
