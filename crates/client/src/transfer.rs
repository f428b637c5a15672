//! Client half of the data-channel transfers.
//!
//! Each task owns its socket, its file and nothing else; failures are
//! reported on the shared output stream and a short download is deleted
//! rather than left half-written.

use std::path::PathBuf;
use std::sync::Arc;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::warn;

use grass_core::GrassError;
use grass_core::limits::{MAX_RECV_CHUNK, MAX_SEND_CHUNK};

const TRANSFER_FAILED: &str = "Error: file transfer failed.";

/// Download `size` bytes from the announced port into `path`.
pub fn spawn_download<W>(
    host: String,
    port: u16,
    size: u64,
    path: PathBuf,
    output: Arc<Mutex<W>>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let file = match File::create(&path).await {
            Ok(f) => f,
            Err(_) => {
                report(&output, "Error: Impossible to open file").await;
                return;
            }
        };
        if let Err(err) = download_stream(file, &host, port, size).await {
            warn!(%err, path = %path.display(), "download failed");
            let _ = tokio::fs::remove_file(&path).await;
            report(&output, TRANSFER_FAILED).await;
        }
    })
}

/// Upload the declared number of bytes from `path` to the announced port.
pub fn spawn_upload<W>(
    host: String,
    port: u16,
    path: PathBuf,
    declared: u64,
    output: Arc<Mutex<W>>,
) -> JoinHandle<()>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let file = match File::open(&path).await {
            Ok(f) => f,
            Err(_) => {
                report(&output, "Error: Impossible to open file").await;
                return;
            }
        };
        if let Err(err) = upload_stream(file, &host, port, declared).await {
            warn!(%err, path = %path.display(), "upload failed");
            report(&output, TRANSFER_FAILED).await;
        }
    })
}

pub async fn download_stream(
    mut file: File,
    host: &str,
    port: u16,
    size: u64,
) -> Result<(), GrassError> {
    let mut socket = TcpStream::connect((host, port)).await?;

    let mut chunk = [0u8; MAX_RECV_CHUNK];
    let mut received: u64 = 0;
    while received < size {
        let want = (size - received).min(MAX_RECV_CHUNK as u64) as usize;
        let n = socket.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n]).await?;
        received += n as u64;
    }
    file.flush().await?;

    if received != size {
        return Err(GrassError::Transfer { got: received, expected: size });
    }
    Ok(())
}

pub async fn upload_stream(
    mut file: File,
    host: &str,
    port: u16,
    declared: u64,
) -> Result<(), GrassError> {
    let mut socket = TcpStream::connect((host, port)).await?;

    let mut chunk = [0u8; MAX_SEND_CHUNK];
    let mut sent: u64 = 0;
    while sent < declared {
        let want = (declared - sent).min(MAX_SEND_CHUNK as u64) as usize;
        let n = file.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        socket.write_all(&chunk[..n]).await?;
        sent += n as u64;
    }
    socket.shutdown().await?;

    if sent != declared {
        return Err(GrassError::Transfer { got: sent, expected: declared });
    }
    Ok(())
}

async fn report<W>(output: &Arc<Mutex<W>>, message: &str)
where
    W: AsyncWrite + Unpin,
{
    let mut out = output.lock().await;
    let _ = out.write_all(message.as_bytes()).await;
    let _ = out.write_all(b"\n").await;
    let _ = out.flush().await;
}
