//! Out-of-band data-channel transfers.
//!
//! Each GET or PUT allocates a fresh loopback listener on an OS-assigned
//! port, announces the port on the control channel, and hands the open
//! file to a task that serves exactly one peer. Transfer tasks never touch
//! session state; a task that fails only logs locally.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, warn};

use grass_core::GrassError;
use grass_core::limits::{MAX_RECV_CHUNK, MAX_SEND_CHUNK, TRANSFER_ACCEPT_TIMEOUT_SECS};

/// Bind a fresh loopback listener on an OS-assigned port.
pub async fn allocate() -> io::Result<(TcpListener, u16)> {
    let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
    let port = listener.local_addr()?.port();
    Ok((listener, port))
}

/// Wait for the single data-channel peer. The listener is consumed, so it
/// closes as soon as the one connection (or the timeout) arrives.
async fn accept_single(listener: TcpListener) -> Result<TcpStream, GrassError> {
    match timeout(
        Duration::from_secs(TRANSFER_ACCEPT_TIMEOUT_SECS),
        listener.accept(),
    )
    .await
    {
        Ok(Ok((stream, _))) => Ok(stream),
        Ok(Err(e)) => Err(e.into()),
        Err(_) => Err(GrassError::Io(io::Error::new(
            io::ErrorKind::TimedOut,
            "data-channel accept timed out",
        ))),
    }
}

/// Spawn the server half of a GET: accept one peer, stream `len` bytes out.
pub fn spawn_send(listener: TcpListener, file: File, len: u64, session: u64) {
    tokio::spawn(async move {
        match send_file(listener, file, len).await {
            Ok(()) => debug!(session, len, "outbound transfer complete"),
            Err(err) => warn!(session, %err, "outbound file transfer failed"),
        }
    });
}

pub async fn send_file(listener: TcpListener, mut file: File, len: u64) -> Result<(), GrassError> {
    let mut socket = accept_single(listener).await?;

    let mut chunk = [0u8; MAX_SEND_CHUNK];
    let mut sent: u64 = 0;
    while sent < len {
        let want = (len - sent).min(MAX_SEND_CHUNK as u64) as usize;
        let n = file.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        socket.write_all(&chunk[..n]).await?;
        sent += n as u64;
    }
    socket.shutdown().await?;

    if sent != len {
        return Err(GrassError::Transfer { got: sent, expected: len });
    }
    Ok(())
}

/// Spawn the server half of a PUT: accept one peer, read exactly `len`
/// bytes into `file`. A short transfer removes the partial file.
pub fn spawn_recv(listener: TcpListener, file: File, path: PathBuf, len: u64, session: u64) {
    tokio::spawn(async move {
        match recv_file(listener, file, &path, len).await {
            Ok(()) => debug!(session, len, path = %path.display(), "inbound transfer complete"),
            Err(err) => warn!(session, %err, path = %path.display(), "inbound file transfer failed"),
        }
    });
}

pub async fn recv_file(
    listener: TcpListener,
    file: File,
    path: &Path,
    len: u64,
) -> Result<(), GrassError> {
    let result = recv_into(listener, file, len).await;
    if result.is_err() {
        let _ = tokio::fs::remove_file(path).await;
    }
    result
}

async fn recv_into(listener: TcpListener, mut file: File, len: u64) -> Result<(), GrassError> {
    let mut socket = accept_single(listener).await?;

    let mut chunk = [0u8; MAX_RECV_CHUNK];
    let mut written: u64 = 0;
    while written < len {
        let want = (len - written).min(MAX_RECV_CHUNK as u64) as usize;
        let n = socket.read(&mut chunk[..want]).await?;
        if n == 0 {
            break;
        }
        file.write_all(&chunk[..n]).await?;
        written += n as u64;
    }
    file.flush().await?;

    if written != len {
        return Err(GrassError::Transfer { got: written, expected: len });
    }
    Ok(())
}
