//! Per-connection session: authentication state, the command loop, and
//! response framing.
//!
//! Within a session, commands are strictly serialized: a response is fully
//! written before the next line is read. The control channel is the only
//! thing that can end a session; handler errors become `Error: ...`
//! responses and the loop continues.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tracing::debug;

use grass_config::ServerConfig;
use grass_core::limits::{MAX_RECV_LEN, MAX_RESPONSE_LEN};
use grass_core::{GrassError, tokenize, wire};

use crate::commands;
use crate::users::Roster;

/// Shared, immutable server state handed to every session.
pub struct ServerCtx {
    pub base_dir: String,
    pub roster: Roster,
}

impl ServerCtx {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            base_dir: config.base_dir,
            roster: Roster::new(config.users),
        }
    }
}

/// Two-step authentication state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    Anonymous,
    /// `login` accepted; only `pass` may follow.
    LoginPending(usize),
    Authenticated(usize),
}

/// Bounded response buffer, reset to the success sentinel at the start of
/// every command cycle.
pub struct ResponseBuf {
    buf: String,
}

impl ResponseBuf {
    fn new() -> Self {
        Self { buf: wire::OK.to_owned() }
    }

    pub fn reset(&mut self) {
        self.buf.clear();
        self.buf.push_str(wire::OK);
    }

    /// Store a response, truncated at `MAX_RESPONSE_LEN` on a char boundary.
    pub fn set(&mut self, msg: &str) {
        let mut end = msg.len().min(MAX_RESPONSE_LEN);
        while end > 0 && !msg.is_char_boundary(end) {
            end -= 1;
        }
        self.buf.clear();
        self.buf.push_str(&msg[..end]);
    }

    /// What actually goes on the wire: an empty buffer degrades to `OK`.
    pub fn payload(&self) -> &str {
        if self.buf.is_empty() { wire::OK } else { &self.buf }
    }
}

pub struct Session {
    pub(crate) ctx: Arc<ServerCtx>,
    pub(crate) cwd: String,
    pub(crate) auth: AuthState,
    pub(crate) response: ResponseBuf,
    pub(crate) id: u64,
}

impl Session {
    pub fn new(ctx: Arc<ServerCtx>, id: u64) -> Self {
        let cwd = ctx.base_dir.clone();
        Self {
            ctx,
            cwd,
            auth: AuthState::Anonymous,
            response: ResponseBuf::new(),
            id,
        }
    }

    /// Run one command cycle: reset the response, parse, gate, dispatch.
    /// Never fails; every error path lands in the response buffer.
    pub async fn run_command(&mut self, line: &str) {
        self.response.reset();

        if line.len() > MAX_RECV_LEN {
            self.response.set("Error: the command line is too long.");
            return;
        }

        let (name, rest) = tokenize::command_name(line);
        let Some(spec) = commands::lookup(name) else {
            self.response.set("Error: Command not found");
            return;
        };

        // pass must directly follow login; anything else aborts the login
        if spec.name != "pass" {
            if let AuthState::LoginPending(_) = self.auth {
                self.auth = AuthState::Anonymous;
                self.response
                    .set("Error: Expected 'pass' command after login. Aborting login");
                return;
            }
        }

        let argv = match tokenize::tokenize_args(rest) {
            Ok(argv) => argv,
            Err(_) => {
                self.response.set("Error: Missing end quote");
                return;
            }
        };

        if argv.len() != spec.arity {
            self.response.set("Error: Wrong number of arguments.");
            return;
        }

        if spec.requires_auth && !matches!(self.auth, AuthState::Authenticated(_)) {
            self.response.set("Error: This command requires authentication");
            return;
        }

        if let Err(err) = self.dispatch(spec.name, &argv).await {
            debug!(session = self.id, command = spec.name, %err, "command failed");
        }
        debug!(
            session = self.id,
            command = spec.name,
            response = self.response.payload(),
            "command handled"
        );
    }

    /// Release any roster claim and return to `Anonymous`.
    pub(crate) fn logout_cleanup(&mut self) {
        if let AuthState::Authenticated(idx) = self.auth {
            self.ctx.roster.release(idx);
        }
        self.auth = AuthState::Anonymous;
    }

    async fn serve<R, W>(&mut self, reader: &mut BufReader<R>, writer: &mut W) -> Result<(), GrassError>
    where
        R: AsyncRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let mut line = String::new();
        loop {
            line.clear();
            if reader.read_line(&mut line).await? == 0 {
                return Ok(());
            }
            let trimmed = line.trim_end_matches(['\r', '\n']);
            self.run_command(trimmed).await;
            writer.write_all(self.response.payload().as_bytes()).await?;
            writer.flush().await?;
        }
    }
}

/// Drive one accepted control-channel connection to completion. Logout
/// cleanup runs on every exit path, including socket errors.
pub async fn handle_connection<S>(stream: S, ctx: Arc<ServerCtx>, id: u64) -> Result<(), GrassError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (read_half, mut write_half) = tokio::io::split(stream);
    let mut reader = BufReader::new(read_half);

    let mut session = Session::new(ctx, id);
    let result = session.serve(&mut reader, &mut write_half).await;
    session.logout_cleanup();
    result
}
