//! The `procwardend` command line: `clap`-derived, exposing `--config` and
//! `--print-config` as the "debug info" escape hatch.

use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Path to the supervisor's YAML configuration file.
    #[arg(short, long, default_value_t = String::from("/etc/procwarden/config.yaml"))]
    config: String,

    /// Load and resolve the configuration, print it, and exit without
    /// starting any children.
    #[arg(long)]
    print_config: bool,
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }

    pub fn config_path(&self) -> PathBuf {
        PathBuf::from(&self.config)
    }

    pub fn print_config(&self) -> bool {
        self.print_config
    }
}
