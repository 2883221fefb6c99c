use anyhow::Result;
use clap::ArgMatches;
use log::info;
use std::io;

use super::shell::{spawn_stdin_reader, Shell};
use crate::config::Config;
use crate::devices::{Channel, RelayBoard};
use crate::output::{ConsoleFormatter, ConsoleSender, EventPublisher, FileSender, JsonFormatter, StatusFormatter};
use crate::services::{MonitorLoop, PollOptions, RelayTestSequence, StopFlag, TriggerLoop};

fn formatter_for(matches: &ArgMatches) -> Box<dyn StatusFormatter> {
    match matches.get_one::<String>("format").map(String::as_str) {
        Some("json") => {
            info!("🎨 Using JSON formatter");
            Box::new(JsonFormatter)
        }
        _ => Box::new(ConsoleFormatter),
    }
}

fn poll_options(matches: &ArgMatches, config: &Config) -> PollOptions {
    PollOptions::new(config.timing.poll_interval()).with_max_cycles(matches.get_one::<u64>("cycles").copied())
}

/// Console output plus the optional `--output-file` copy.
fn publisher_for(matches: &ArgMatches, inline_console: bool) -> EventPublisher {
    let mut publisher = EventPublisher::new(formatter_for(matches));
    let console = if inline_console {
        ConsoleSender::inline()
    } else {
        ConsoleSender::new()
    };
    publisher.add_sender(Box::new(console));

    if let Some(output_file) = matches.get_one::<String>("output-file") {
        info!("📝 Adding file output: {}", output_file);
        publisher.add_sender(Box::new(FileSender::new(output_file)));
    }
    publisher
}

fn channel_from(matches: &ArgMatches) -> Result<Channel> {
    let number = matches.get_one::<u8>("channel").copied().unwrap_or_default();
    Ok(Channel::new(number)?)
}

/// Dispatch the selected subcommand. Runs on a blocking thread; `stop` is
/// raised by the Ctrl+C handler.
pub fn handle_subcommands(matches: &ArgMatches, config: &Config, stop: &StopFlag) -> Result<()> {
    match matches.subcommand() {
        Some(("monitor", _)) => {
            let board = RelayBoard::open(config)?;
            let mut publisher = publisher_for(matches, false);
            let header = publisher.formatter().format_monitor_header();
            publisher.publish(&header);

            let summary = MonitorLoop::new(poll_options(matches, config), stop.clone()).run(board, &mut publisher)?;
            println!("\nStopped. {} cycles, {} changes.", summary.cycles, summary.changes);
        }
        Some(("trigger", _)) => {
            let board = RelayBoard::open(config)?;
            let json = matches.get_one::<String>("format").map(String::as_str) == Some("json");
            let mut publisher = publisher_for(matches, !json);
            let header = publisher.formatter().format_trigger_header();
            if !header.is_empty() {
                println!("{}", header);
            }

            let summary = TriggerLoop::new(poll_options(matches, config), stop.clone()).run(board, &mut publisher)?;
            println!(
                "\n\nStopped: all relays off. {} cycles, {} relay writes.",
                summary.cycles, summary.relay_writes
            );
        }
        Some(("test", _)) => {
            let mut board = RelayBoard::open(config)?;
            println!("Testing relays...");
            let result = RelayTestSequence::default().run(&mut board, |channel| println!("  Relay {} ON...", channel));
            board.close();
            result?;
            println!("Done!");
        }
        Some(("status", _)) => {
            let mut board = RelayBoard::open(config)?;
            let relays = board.relay_status();
            let inputs = board.inputs_raw();
            board.close();
            println!("{}", formatter_for(matches).format_status(relays?, inputs?));
        }
        Some((name @ ("on" | "off"), sub)) => {
            let channel = channel_from(sub)?;
            let on = name == "on";
            let mut board = RelayBoard::open(config)?;
            let result = board.set_relay(channel, on);
            board.close();
            result?;
            println!("  Relay {} {}", channel, if on { "ON" } else { "OFF" });
        }
        Some((name @ ("all-on" | "all-off"), _)) => {
            let on = name == "all-on";
            let mut board = RelayBoard::open(config)?;
            let result = if on { board.all_on() } else { board.all_off() };
            board.close();
            result?;
            println!("  All relays {}", if on { "ON" } else { "OFF" });
        }
        Some(("save-config", sub)) => {
            if let Some(path) = sub.get_one::<String>("path") {
                config.save_to_file(path)?;
                println!("Configuration written to {}", path);
            }
        }
        _ => {
            let mut board = RelayBoard::open(config)?;
            let formatter = formatter_for(matches);
            println!("{}", "=".repeat(60));
            println!("485 RELAY 4CH - INTERACTIVE MODE");
            println!("{}", "=".repeat(60));
            println!();

            let lines = spawn_stdin_reader();
            let mut shell = Shell::new(formatter.as_ref(), poll_options(matches, config), stop.clone());
            let result = shell.run(&mut board, &lines, &mut io::stdout());
            board.close();
            result?;
        }
    }

    Ok(())
}
