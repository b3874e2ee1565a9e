use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pilothouse::cli::Cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Default to info; tungstenite frame logging is noise at that level
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new("info")
            .add_directive("tungstenite=warn".parse().unwrap())
            .add_directive("tokio_tungstenite=warn".parse().unwrap())
    });

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let cli = Cli::parse();
    cli.run().await?;
    Ok(())
}
