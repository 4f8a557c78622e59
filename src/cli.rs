use api_log_collector::config::ConfigOverrides;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "api-log-collector",
    version,
    about = "Collects API access records from supervised program logs"
)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml", global = true)]
    pub config: PathBuf,

    /// Database connection string (overrides database.url)
    #[arg(long, global = true)]
    pub dsn: Option<String>,

    /// Comma-separated programs to monitor (overrides monitor.programs)
    #[arg(long, global = true)]
    pub programs: Option<String>,

    /// API list file (overrides api_list.path)
    #[arg(long = "apilist", global = true)]
    pub api_list: Option<PathBuf>,

    /// Server tag for stored records (overrides monitor.server)
    #[arg(long, global = true)]
    pub server: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Start collecting (default)
    Start,

    /// Test configuration and API list validity
    Test,

    /// Run one retention sweep now
    Cleanup {
        /// Retention window in days (defaults to retention.days)
        #[arg(short, long)]
        days: Option<u32>,
    },

    /// Show version information
    Version,
}

impl Cli {
    /// Get the command to execute, defaulting to Start if none provided
    pub fn get_command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Start)
    }

    pub fn overrides(&self) -> ConfigOverrides {
        ConfigOverrides {
            dsn: self.dsn.clone(),
            programs: self.programs.clone(),
            api_list: self.api_list.clone(),
            server: self.server.clone(),
        }
    }
}
