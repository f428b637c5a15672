//! Control-channel protocol driver for the GRASS client.
//!
//! One line in, one command out, one response back. Responses announcing a
//! data channel spawn a concurrent transfer task; everything else goes to
//! the output stream verbatim. The REPL never blocks on a transfer.

pub mod transfer;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use grass_core::limits::MAX_RESPONSE_LEN;
use grass_core::tokenize;
use grass_core::wire::Response;

/// The vocabulary the client recognizes locally. Anything else is rejected
/// without a round-trip.
const SHELL_COMMANDS: &[&str] = &[
    "login", "pass", "ping", "ls", "cd", "mkdir", "rm", "get", "put", "grep", "date", "whoami",
    "w", "logout", "exit",
];

fn is_known_command(name: &str) -> bool {
    SHELL_COMMANDS.contains(&name)
}

/// What the last-issued command entitles the next response to trigger.
#[derive(Debug, Clone)]
enum TransferPlan {
    Get { filename: String },
    Put { filename: String, size: u64 },
}

pub struct Driver {
    pub host: String,
    pub port: u16,
    /// Directory where transferred files are read from and written to.
    pub local_dir: PathBuf,
    /// Write a `> ` prompt before each input line.
    pub interactive: bool,
}

impl Driver {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
            local_dir: PathBuf::from("."),
            interactive: false,
        }
    }

    /// Run the read-send-receive loop until `exit` or end of input, then
    /// wait for in-flight transfers to settle.
    pub async fn run<R, W>(self, input: R, output: W) -> Result<()>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let mut stream = TcpStream::connect((self.host.as_str(), self.port)).await?;
        let output = Arc::new(Mutex::new(output));
        let mut reader = BufReader::new(input);
        let mut line = String::new();
        let mut response = vec![0u8; MAX_RESPONSE_LEN];
        let mut transfers: Vec<JoinHandle<()>> = Vec::new();

        loop {
            if self.interactive {
                let mut out = output.lock().await;
                out.write_all(b"> ").await?;
                out.flush().await?;
            }

            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                break; // end of input
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            let (name, rest) = tokenize::command_name(trimmed);
            if !is_known_command(name) {
                print_line(&output, "ERROR: invalid command").await?;
                continue;
            }

            // exit never goes on the wire; it just ends the loop
            if name == "exit" {
                break;
            }

            let plan = match prepare_transfer(name, rest) {
                Ok(plan) => plan,
                Err(msg) => {
                    print_line(&output, msg).await?;
                    continue;
                }
            };

            stream.write_all(trimmed.as_bytes()).await?;
            stream.write_all(b"\n").await?;

            let n = stream.read(&mut response).await?;
            if n == 0 {
                print_line(&output, "Error: server closed the connection").await?;
                break;
            }
            let raw = String::from_utf8_lossy(&response[..n]).into_owned();
            debug!(command = name, response = raw.as_str(), "response received");

            match (Response::classify(&raw), plan) {
                (Response::GetPort { port, size }, Some(TransferPlan::Get { filename })) => {
                    transfers.push(transfer::spawn_download(
                        self.host.clone(),
                        port,
                        size,
                        self.local_dir.join(filename),
                        Arc::clone(&output),
                    ));
                }
                (Response::PutPort { port }, Some(TransferPlan::Put { filename, size })) => {
                    transfers.push(transfer::spawn_upload(
                        self.host.clone(),
                        port,
                        self.local_dir.join(filename),
                        size,
                        Arc::clone(&output),
                    ));
                }
                _ => print_line(&output, &raw).await?,
            }
        }

        // let in-flight transfers finish before tearing down
        for handle in transfers {
            let _ = handle.await;
        }
        Ok(())
    }
}

/// For `get` and `put`, extract what the upcoming announcement will need.
/// Local failures short-circuit without a round-trip; a line the tokenizer
/// rejects is still sent so the server's diagnostic comes back.
fn prepare_transfer(name: &str, rest: &str) -> Result<Option<TransferPlan>, &'static str> {
    let argv = match tokenize::tokenize_args(rest) {
        Ok(argv) => argv,
        Err(_) => return Ok(None),
    };
    match name {
        "get" => {
            if argv.len() != 1 {
                return Err("ERROR: wrong number of arguments");
            }
            Ok(Some(TransferPlan::Get { filename: argv[0].clone() }))
        }
        "put" => {
            if argv.len() != 2 {
                return Err("ERROR: wrong number of arguments");
            }
            let size = argv[1].parse().map_err(|_| "ERROR: invalid file size")?;
            Ok(Some(TransferPlan::Put { filename: argv[0].clone(), size }))
        }
        _ => Ok(None),
    }
}

async fn print_line<W>(output: &Arc<Mutex<W>>, text: &str) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut out = output.lock().await;
    out.write_all(text.as_bytes()).await?;
    out.write_all(b"\n").await?;
    out.flush().await?;
    Ok(())
}
