pub mod args;
pub mod commands;
pub mod shell;

pub use args::build_cli;
pub use commands::handle_subcommands;
