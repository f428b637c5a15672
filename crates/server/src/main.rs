use anyhow::Result;
use clap::Parser;
use tracing_subscriber::EnvFilter;

use grass_config::{CONF_FILENAME, ServerConfig};
use grass_server::listener::Server;

#[derive(Debug, Parser)]
#[command(name = "server", version, about = "GRASS sandboxed remote shell server")]
struct Cli {
    /// Configuration file, looked up in the working directory by default.
    #[arg(long, default_value = CONF_FILENAME)]
    config: std::path::PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = ServerConfig::load_from(&cli.config)?;
    let server = Server::bind(config).await?;

    tokio::select! {
        result = server.serve() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received; shutting down");
            Ok(())
        }
    }
}
