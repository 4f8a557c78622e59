use anyhow::Result;
use clap::Parser;

mod cli;
mod commands;

use api_log_collector::config::{self, Config};
use api_log_collector::init_tracing;

#[tokio::main]
async fn main() -> Result<()> {
    let args = cli::Cli::parse();

    match args.get_command() {
        cli::Commands::Start => {
            let cfg = load(&args)?;
            commands::start::execute(cfg).await?;
        }
        cli::Commands::Test => {
            let cfg = load(&args)?;
            commands::test::execute(&cfg)?;
        }
        cli::Commands::Cleanup { days } => {
            let cfg = load(&args)?;
            commands::cleanup::execute(&cfg, days).await?;
        }
        cli::Commands::Version => {
            println!("API Log Collector v{}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

/// Load configuration, then initialize logging from it
///
/// Configuration errors are reported before logging is set up.
fn load(args: &cli::Cli) -> Result<Config> {
    let cfg = config::load_config(&args.config, &args.overrides())?;
    init_tracing(&cfg.logging);
    Ok(cfg)
}
