use clap::{value_parser, Arg, ArgAction, Command};

fn channel_arg() -> Arg {
    Arg::new("channel")
        .help("Relay number (1-4)")
        .required(true)
        .value_parser(value_parser!(u8).range(1..=4))
}

pub fn build_cli() -> Command {
    Command::new("relay485")
        .version(crate::VERSION)
        .about("Monitor and control a 4-channel RS-485 relay/input board")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .global(true)
                .help("TOML configuration file"),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .global(true)
                .help("Serial port (default /dev/ttyUSB0)"),
        )
        .arg(
            Arg::new("baud")
                .short('b')
                .long("baud")
                .global(true)
                .value_parser(value_parser!(u32))
                .help("Baud rate (default 9600)"),
        )
        .arg(
            Arg::new("device-id")
                .short('d')
                .long("device-id")
                .global(true)
                .value_parser(value_parser!(u8))
                .help("Modbus device id (default 1)"),
        )
        .arg(
            Arg::new("interval")
                .short('i')
                .long("interval")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Polling interval in milliseconds (default 10)"),
        )
        .arg(
            Arg::new("cycles")
                .long("cycles")
                .global(true)
                .value_parser(value_parser!(u64))
                .help("Stop polling after this many iterations"),
        )
        .arg(
            Arg::new("format")
                .short('f')
                .long("format")
                .global(true)
                .value_parser(["console", "json"])
                .default_value("console")
                .help("Output format"),
        )
        .arg(
            Arg::new("output-file")
                .short('o')
                .long("output-file")
                .global(true)
                .help("Also append monitor/trigger output to this file"),
        )
        .arg(
            Arg::new("verify-crc")
                .long("verify-crc")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Discard replies with a bad CRC"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log every frame (debug level)"),
        )
        .subcommand(Command::new("monitor").about("Print relay and input status whenever it changes"))
        .subcommand(Command::new("trigger").about("Drive each relay from the input with the same number"))
        .subcommand(Command::new("test").about("Click each relay in turn"))
        .subcommand(Command::new("status").about("Read relay and input status once"))
        .subcommand(Command::new("on").about("Turn a relay on").arg(channel_arg()))
        .subcommand(Command::new("off").about("Turn a relay off").arg(channel_arg()))
        .subcommand(Command::new("all-on").about("Turn all relays on"))
        .subcommand(Command::new("all-off").about("Turn all relays off"))
        .subcommand(Command::new("interactive").about("Interactive command prompt (default)"))
        .subcommand(
            Command::new("save-config")
                .about("Write the resolved configuration to a TOML file")
                .arg(Arg::new("path").required(true)),
        )
}
