//! Command-line interface.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::Config;

/// Cookie-authenticated storefront API with role and policy gating
#[derive(Debug, Parser)]
#[command(name = "storefront-gate")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Read configuration from this file instead of the default lookup
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Run the HTTP server (default)
    Serve,

    /// Write a default config file if none exists
    InitConfig,

    /// Load and validate the config, then exit
    CheckConfig,
}

impl Cli {
    #[must_use]
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Serve)
    }

    /// Resolves configuration from `--config` or the default search path.
    pub fn load_config(&self) -> anyhow::Result<Config> {
        match &self.config {
            Some(path) => Config::load_from_path(path),
            None => Config::load(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serve_is_default() {
        let cli = Cli::parse_from(["storefront-gate"]);
        assert!(matches!(cli.command(), Commands::Serve));
    }

    #[test]
    fn test_subcommands_parse() {
        let cli = Cli::parse_from(["storefront-gate", "check-config", "--config", "x.toml"]);
        assert!(matches!(cli.command(), Commands::CheckConfig));
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));

        let cli = Cli::parse_from(["storefront-gate", "init-config"]);
        assert!(matches!(cli.command(), Commands::InitConfig));
    }
}
