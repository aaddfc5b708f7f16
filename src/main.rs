mod app;
mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use vidrelay::config::Config;
use vidrelay::observability::init_tracing;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let cli = Cli::parse();
    let config = Config::load(cli.config)?;

    match cli.command {
        Commands::Run(args) => {
            let mode = args.log_mode.map(Into::into).unwrap_or(config.logging.mode);
            init_tracing(mode);
            app::run(config).await?
        }
        Commands::Check => {
            init_tracing(config.logging.mode);
            app::check(&config).await?
        }
    }

    Ok(())
}
