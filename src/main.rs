use anyhow::Result;
use env_logger::Env;
use log::{error, info};

use relay485::cli::{build_cli, handle_subcommands};
use relay485::{Config, StopFlag};

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = build_cli().get_matches();
    init_logging(matches.get_flag("verbose"));

    let config = Config::from_matches(&matches)?;
    info!("🖥️  relay485 v{} on {} (device id {})", relay485::VERSION, config.serial_port, config.device_id);

    // Ctrl+C only raises the flag; loops notice it at the top of their next
    // iteration and run their own shutdown.
    let stop = StopFlag::new();
    let signal_stop = stop.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            info!("🛑 Interrupt received, stopping...");
            signal_stop.stop();
        }
    });

    tokio::task::spawn_blocking(move || handle_subcommands(&matches, &config, &stop))
        .await?
        .inspect_err(|e| error!("❌ {:#}", e))
}
