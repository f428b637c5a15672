//! Control-channel listener: bind the configured port, spawn one session
//! task per accepted connection. The listener holds no per-session state.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use tokio::net::{TcpListener, TcpSocket};
use tracing::{error, info, warn};

use grass_config::ServerConfig;
use grass_core::limits::SERVER_BACKLOG;

use crate::session::{self, ServerCtx};

pub struct Server {
    listener: TcpListener,
    ctx: Arc<ServerCtx>,
}

impl Server {
    /// Bind the loopback control port. Port 0 asks the OS for a free one;
    /// `local_addr` reports what was actually bound.
    pub async fn bind(config: ServerConfig) -> Result<Self> {
        let addr: SocketAddr = format!("127.0.0.1:{}", config.listen_port).parse()?;
        let socket = TcpSocket::new_v4()?;
        socket.set_reuseaddr(true)?;
        socket.bind(addr)?;
        let listener = socket.listen(SERVER_BACKLOG)?;

        Ok(Self {
            listener,
            ctx: Arc::new(ServerCtx::new(config)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accept loop. A failed accept is transient (fd exhaustion, peer
    /// reset); only bind failure is fatal, so log and keep accepting.
    pub async fn serve(self) -> Result<()> {
        info!(addr = %self.listener.local_addr()?, "grass server listening");

        let next_session = AtomicU64::new(1);
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(err) => {
                    warn!(%err, "accept failed");
                    continue;
                }
            };
            let ctx = Arc::clone(&self.ctx);
            let id = next_session.fetch_add(1, Ordering::Relaxed);
            info!(session = id, %peer, "connection accepted");
            tokio::spawn(async move {
                match session::handle_connection(stream, ctx, id).await {
                    Ok(()) => info!(session = id, "connection closed"),
                    Err(err) => error!(session = id, %err, "session failed"),
                }
            });
        }
    }
}
