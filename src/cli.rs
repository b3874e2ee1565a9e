use clap::{Parser, Subcommand};

use crate::config::Config;
use crate::error::{PilothouseError, Result};
use crate::server;

/// Pilothouse - browser automation server for test runners
#[derive(Parser)]
#[command(name = "pilothouse")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Bind address (overrides config)
    #[arg(long, env = "PILOTHOUSE_SERVER_HOST", global = true)]
    pub host: Option<String>,

    /// Bind port (overrides config)
    #[arg(short, long, env = "PILOTHOUSE_SERVER_PORT", global = true)]
    pub port: Option<u16>,

    /// Browser executable path (overrides auto-discovery)
    #[arg(long, env = "PILOTHOUSE_BROWSER_EXECUTABLE", global = true)]
    pub browser_path: Option<String>,

    /// Launch browsers with a visible window (headless is the default)
    #[arg(long, global = true)]
    pub headful: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the automation server
    Serve,

    /// Configuration management
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(Subcommand)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,

    /// Show the configuration file path
    Path,
}

impl Cli {
    pub async fn run(&self) -> Result<()> {
        match &self.command {
            Commands::Serve => {
                let mut config = Config::load()?;
                if let Some(ref host) = self.host {
                    config.server.host = host.clone();
                }
                if let Some(port) = self.port {
                    config.server.port = port;
                }
                if let Some(ref path) = self.browser_path {
                    config.browser.executable = Some(path.clone());
                }
                if self.headful {
                    config.browser.headless = false;
                }
                server::serve(config).await
            }
            Commands::Config { command } => match command {
                ConfigCommands::Show => {
                    let config = Config::load()?;
                    let text = toml::to_string_pretty(&config)
                        .map_err(|e| PilothouseError::ConfigError(e.to_string()))?;
                    println!("{text}");
                    Ok(())
                }
                ConfigCommands::Path => {
                    println!("{}", Config::config_path().display());
                    Ok(())
                }
            },
        }
    }
}
