use clap::Parser;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "unison-node")]
#[command(about = "P2P radio peer: round consensus and live stream manifest publisher", long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Override data directory
    #[arg(short, long)]
    pub data_dir: Option<PathBuf>,

    /// Apply `[profiles.<name>]` overrides from the config file
    #[arg(short, long, env = "UNISON_PROFILE")]
    pub profile: Option<String>,

    /// Log filters, e.g. `info` or `info,unison_core::application=debug`
    #[arg(short, long)]
    pub log_level: Option<String>,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn apply_to_env(&self) {
        if let Some(config_path) = &self.config {
            std::env::set_var(unison_core::infrastructure::config::CONFIG_PATH_ENV, config_path);
        }

        if let Some(data_dir) = &self.data_dir {
            std::env::set_var(unison_core::infrastructure::config::DATA_DIR_ENV, data_dir);
        }
    }
}
