use std::io::IsTerminal;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tokio::io::{AsyncRead, AsyncWrite};
use tracing_subscriber::EnvFilter;

use grass_client::Driver;

#[derive(Debug, Parser)]
#[command(name = "client", version, about = "GRASS remote shell client")]
struct Cli {
    /// Server address.
    host: String,
    /// Server control port.
    port: u16,
    /// Read commands from this file instead of stdin.
    input_file: Option<PathBuf>,
    /// Write responses to this file instead of stdout.
    output_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let mut driver = Driver::new(cli.host, cli.port);

    let (input, output): (Box<dyn AsyncRead + Unpin>, Box<dyn AsyncWrite + Unpin + Send>) =
        match (cli.input_file, cli.output_file) {
            (Some(input_path), Some(output_path)) => {
                let input = tokio::fs::File::open(&input_path)
                    .await
                    .with_context(|| format!("cannot open input file {}", input_path.display()))?;
                let output = tokio::fs::File::create(&output_path)
                    .await
                    .with_context(|| format!("cannot open output file {}", output_path.display()))?;
                (Box::new(input), Box::new(output))
            }
            (None, None) => {
                driver.interactive = std::io::stdin().is_terminal();
                (Box::new(tokio::io::stdin()), Box::new(tokio::io::stdout()))
            }
            _ => bail!("input and output files must be provided together"),
        };

    driver.run(input, output).await
}
