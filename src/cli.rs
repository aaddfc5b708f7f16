use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use vidrelay::config::LogMode;

#[derive(Parser, Debug)]
#[command(name = "vidrelay")]
#[command(about = "Discord bot that relays linked videos", long_about = None)]
pub struct Cli {
    /// Path to the TOML config file (defaults to $VIDRELAY_CONFIG or config/vidrelay.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to Discord and start relaying
    Run(RunArgs),
    /// Validate configuration and probe the downloader, then exit
    Check,
}

#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Override logging.mode from the config
    #[arg(long, value_enum)]
    pub log_mode: Option<LogModeArg>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
pub enum LogModeArg {
    Detailed,
    Minimal,
}

impl From<LogModeArg> for LogMode {
    fn from(arg: LogModeArg) -> Self {
        match arg {
            LogModeArg::Detailed => LogMode::Detailed,
            LogModeArg::Minimal => LogMode::Minimal,
        }
    }
}
