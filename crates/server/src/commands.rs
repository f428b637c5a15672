//! The command table and one handler per verb.
//!
//! Handlers never abort the session: every failure writes a human-readable
//! `Error: ...` response and returns the matching error kind for logging.
//! Path-taking verbs all follow the same gauntlet: syntax check, append to
//! the working directory, length check, sandbox check, then the
//! existence/type check at the filesystem.

use std::os::unix::fs::DirBuilderExt;
use std::path::PathBuf;

use tracing::info;

use grass_core::{GrassError, paths, sanitize, wire};

use crate::session::{AuthState, Session};
use crate::users::ClaimOutcome;
use crate::{exec, transfer};

pub struct CommandSpec {
    pub name: &'static str,
    pub arity: usize,
    pub requires_auth: bool,
}

const fn spec(name: &'static str, arity: usize, requires_auth: bool) -> CommandSpec {
    CommandSpec { name, arity, requires_auth }
}

/// The protocol vocabulary. `whoami` gates itself so an anonymous caller
/// sees the dedicated no-logged-user message instead of the generic one.
pub const COMMANDS: &[CommandSpec] = &[
    spec("ls", 0, true),
    spec("ping", 1, false),
    spec("login", 1, false),
    spec("pass", 1, false),
    spec("cd", 1, true),
    spec("mkdir", 1, true),
    spec("rm", 1, true),
    spec("date", 0, true),
    spec("grep", 1, true),
    spec("whoami", 0, false),
    spec("w", 0, true),
    spec("logout", 0, true),
    spec("exit", 0, false),
    spec("get", 1, true),
    spec("put", 2, true),
];

pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|c| c.name == name)
}

/// True when the argument names an entry of the current directory and
/// nothing else.
fn is_plain_name(name: &str) -> bool {
    !name.contains('/') && !name.contains('~')
}

impl Session {
    pub(crate) async fn dispatch(&mut self, name: &str, argv: &[String]) -> Result<(), GrassError> {
        match name {
            "login" => self.handle_login(&argv[0]),
            "pass" => self.handle_pass(&argv[0]),
            "ping" => self.handle_ping(&argv[0]).await,
            "ls" => self.handle_ls().await,
            "cd" => self.handle_cd(&argv[0]).await,
            "mkdir" => self.handle_mkdir(&argv[0]).await,
            "rm" => self.handle_rm(&argv[0]).await,
            "grep" => self.handle_grep(&argv[0]).await,
            "date" => self.handle_date().await,
            "whoami" => self.handle_whoami(),
            "w" => self.handle_w(),
            "logout" | "exit" => {
                self.logout_cleanup();
                Ok(())
            }
            "get" => self.handle_get(&argv[0]).await,
            "put" => self.handle_put(&argv[0], &argv[1]).await,
            _ => {
                self.response.set("Error: Internal error");
                Err(GrassError::Internal("command in table but not in dispatch"))
            }
        }
    }

    // ── Authentication ──────────────────────────────────────────────────────

    fn handle_login(&mut self, username: &str) -> Result<(), GrassError> {
        // a fresh login always drops whatever authentication existed
        self.logout_cleanup();

        match self.ctx.roster.find(username) {
            Some(idx) => {
                self.auth = AuthState::LoginPending(idx);
                Ok(())
            }
            None => {
                self.response.set("Error: Username not found. Aborting.");
                Err(GrassError::NotFound("user"))
            }
        }
    }

    fn handle_pass(&mut self, password: &str) -> Result<(), GrassError> {
        let AuthState::LoginPending(idx) = self.auth else {
            self.response
                .set("Error : pass must be called directly after login");
            return Err(GrassError::Protocol("pass without a pending login"));
        };
        self.auth = AuthState::Anonymous;

        let password_ok = self.ctx.roster.directory().get(idx).password == password;
        match self.ctx.roster.try_claim(idx, password_ok) {
            ClaimOutcome::AlreadyOnline => {
                self.response
                    .set("Error: This user is already connected somewhere else");
                Err(GrassError::Protocol("user already logged in"))
            }
            ClaimOutcome::BadPassword => {
                self.response.set("Error : Authentication failed.");
                Err(GrassError::Auth)
            }
            ClaimOutcome::Claimed => {
                self.auth = AuthState::Authenticated(idx);
                info!(
                    session = self.id,
                    user = %self.ctx.roster.directory().get(idx).name,
                    "user authenticated"
                );
                Ok(())
            }
        }
    }

    fn handle_whoami(&mut self) -> Result<(), GrassError> {
        match self.auth {
            AuthState::Authenticated(idx) => {
                let name = self.ctx.roster.directory().get(idx).name.clone();
                self.response.set(&name);
                Ok(())
            }
            _ => {
                self.response.set("Error : No logged user");
                Err(GrassError::Permission("no logged user"))
            }
        }
    }

    fn handle_w(&mut self) -> Result<(), GrassError> {
        let names = self.ctx.roster.online_names().join(" ");
        self.response.set(&names);
        Ok(())
    }

    // ── Shell-outs ──────────────────────────────────────────────────────────

    async fn handle_ping(&mut self, host: &str) -> Result<(), GrassError> {
        if let Err(err) = sanitize::ensure_plain_argument(host) {
            self.response.set("Error: Invalid host name");
            return Err(err);
        }
        self.capture_into_response("ping", &[host, "-c", "1"], None).await
    }

    async fn handle_ls(&mut self) -> Result<(), GrassError> {
        let cwd = self.cwd.clone();
        self.capture_into_response("ls", &["-l", &cwd], None).await
    }

    async fn handle_grep(&mut self, pattern: &str) -> Result<(), GrassError> {
        // regex metacharacters are legitimate in a pattern; only control
        // bytes are out
        if let Err(err) = sanitize::ensure_printable(pattern) {
            self.response.set("Error: Invalid pattern");
            return Err(err);
        }
        let cwd = self.cwd.clone();
        self.capture_into_response("grep", &["-rl", pattern, "."], Some(&cwd))
            .await
    }

    async fn handle_date(&mut self) -> Result<(), GrassError> {
        self.capture_into_response("date", &[], None).await
    }

    async fn capture_into_response(
        &mut self,
        program: &str,
        args: &[&str],
        cwd: Option<&str>,
    ) -> Result<(), GrassError> {
        match exec::capture(program, args, cwd).await {
            Ok(output) => {
                self.response.set(&output);
                Ok(())
            }
            Err(err) => {
                self.response
                    .set("Error: Internal error upon command execution on host system");
                Err(err)
            }
        }
    }

    // ── Filesystem ──────────────────────────────────────────────────────────

    /// Resolve a user path against the working directory and run the
    /// sandbox gauntlet. Error responses are set by the caller to keep the
    /// original per-verb wording.
    fn resolve_sandboxed(&self, rel: &str) -> Result<String, SandboxFailure> {
        let path = paths::append_relative(&self.cwd, rel).map_err(|_| SandboxFailure::Resolve)?;
        if paths::path_too_long(&path, &self.ctx.base_dir) {
            return Err(SandboxFailure::TooLong);
        }
        if !paths::is_subpath_of(&path, &self.ctx.base_dir) {
            return Err(SandboxFailure::Escape);
        }
        Ok(path)
    }

    async fn handle_cd(&mut self, target: &str) -> Result<(), GrassError> {
        let new_path = match self.resolve_sandboxed(target) {
            Ok(p) => p,
            Err(SandboxFailure::TooLong) => {
                self.response.set("Error : the path is too long.");
                return Err(GrassError::TooLarge("path"));
            }
            Err(_) => {
                self.response.set("Error : access denied!");
                return Err(GrassError::Permission("path leaves the sandbox"));
            }
        };

        match tokio::fs::metadata(&new_path).await {
            Ok(meta) if meta.is_dir() => {
                self.cwd = new_path;
                Ok(())
            }
            _ => {
                self.response.set("Error : directory not found");
                Err(GrassError::NotFound("directory"))
            }
        }
    }

    async fn handle_mkdir(&mut self, name: &str) -> Result<(), GrassError> {
        if !is_plain_name(name) {
            self.response
                .set("Error : Please specify file or directory name within current directory");
            return Err(GrassError::Protocol("name is not a plain filename"));
        }

        let path = match self.resolve_sandboxed(name) {
            Ok(p) => p,
            Err(SandboxFailure::Resolve) => {
                self.response.set("Error : path creation failed");
                return Err(GrassError::Dir("path resolution failed"));
            }
            Err(SandboxFailure::TooLong) => {
                self.response.set("Error : the path is too long.");
                return Err(GrassError::TooLarge("path"));
            }
            Err(SandboxFailure::Escape) => {
                self.response.set("Error : Access denied!");
                return Err(GrassError::Permission("path leaves the sandbox"));
            }
        };

        if tokio::fs::metadata(&path).await.map(|m| m.is_dir()).unwrap_or(false) {
            self.response.set("Error : Directory already exists");
            return Ok(());
        }

        // owner rwx only
        let mut builder = std::fs::DirBuilder::new();
        builder.mode(0o700);
        if let Err(err) = builder.create(&path) {
            self.response.set("Error : Impossible to create directory");
            return Err(err.into());
        }
        Ok(())
    }

    async fn handle_rm(&mut self, name: &str) -> Result<(), GrassError> {
        if !is_plain_name(name) {
            self.response
                .set("Error : Please specify file or directory name within current directory");
            return Err(GrassError::Protocol("name is not a plain filename"));
        }

        let path = match self.resolve_sandboxed(name) {
            Ok(p) => p,
            Err(SandboxFailure::Resolve) => {
                self.response.set("Error : path creation failed");
                return Err(GrassError::Dir("path resolution failed"));
            }
            Err(SandboxFailure::TooLong) => {
                self.response.set("Error : the path is too long.");
                return Err(GrassError::TooLarge("path"));
            }
            Err(SandboxFailure::Escape) => {
                self.response.set("Error : Access denied!");
                return Err(GrassError::Permission("path leaves the sandbox"));
            }
        };

        let removed = match tokio::fs::symlink_metadata(&path).await {
            Ok(meta) if meta.is_dir() => tokio::fs::remove_dir(&path).await,
            Ok(_) => tokio::fs::remove_file(&path).await,
            Err(e) => Err(e),
        };
        if let Err(err) = removed {
            self.response.set("Error : Could not execute remove");
            return Err(err.into());
        }
        Ok(())
    }

    // ── Transfers ───────────────────────────────────────────────────────────

    async fn handle_get(&mut self, name: &str) -> Result<(), GrassError> {
        if !is_plain_name(name) {
            self.response
                .set("Error: Please specify file name within current directory");
            return Err(GrassError::Protocol("name is not a plain filename"));
        }

        let path = match self.resolve_sandboxed(name) {
            Ok(p) => p,
            Err(SandboxFailure::Resolve) => {
                self.response.set("Error: path creation failed");
                return Err(GrassError::Dir("path resolution failed"));
            }
            Err(SandboxFailure::TooLong) => {
                self.response.set("Error : the path is too long.");
                return Err(GrassError::TooLarge("path"));
            }
            Err(SandboxFailure::Escape) => {
                self.response.set("Error: Access denied!");
                return Err(GrassError::Permission("path leaves the sandbox"));
            }
        };

        let file = match tokio::fs::File::open(&path).await {
            Ok(f) => f,
            Err(_) => {
                self.response.set("Error: No such file");
                return Err(GrassError::NotFound("file"));
            }
        };
        let meta = match file.metadata().await {
            Ok(m) if m.is_file() => m,
            Ok(_) => {
                self.response.set("Error: No such file");
                return Err(GrassError::NotFound("file"));
            }
            Err(err) => {
                self.response.set("Error: Could not retrieve file size");
                return Err(err.into());
            }
        };
        let len = meta.len();

        let (listener, port) = match transfer::allocate().await {
            Ok(pair) => pair,
            Err(err) => {
                self.response.set("Error: Could not setup transfer thread");
                return Err(err.into());
            }
        };
        transfer::spawn_send(listener, file, len, self.id);

        self.response.set(&wire::format_get(port, len));
        Ok(())
    }

    async fn handle_put(&mut self, name: &str, size: &str) -> Result<(), GrassError> {
        if !is_plain_name(name) {
            self.response
                .set("Error: Please specify file name within executable's directory");
            return Err(GrassError::Protocol("name is not a plain filename"));
        }

        let path = match self.resolve_sandboxed(name) {
            Ok(p) => p,
            Err(SandboxFailure::Resolve) => {
                self.response.set("Error: Path creation failed");
                return Err(GrassError::Dir("path resolution failed"));
            }
            Err(SandboxFailure::TooLong) => {
                self.response.set("Error : the path is too long.");
                return Err(GrassError::TooLarge("path"));
            }
            Err(SandboxFailure::Escape) => {
                self.response.set("Error: Access denied!");
                return Err(GrassError::Permission("path leaves the sandbox"));
            }
        };

        let declared: u64 = match size.parse() {
            Ok(n) => n,
            Err(_) => {
                self.response.set("Error: Invalid file size");
                return Err(GrassError::Parse("file size is not a number"));
            }
        };

        let file = match tokio::fs::File::create(&path).await {
            Ok(f) => f,
            Err(err) => {
                self.response.set("Error: Impossible to open file");
                return Err(err.into());
            }
        };

        let (listener, port) = match transfer::allocate().await {
            Ok(pair) => pair,
            Err(err) => {
                self.response.set("Error: Could not setup transfer thread");
                return Err(err.into());
            }
        };
        transfer::spawn_recv(listener, file, PathBuf::from(&path), declared, self.id);

        self.response.set(&wire::format_put(port));
        Ok(())
    }
}

enum SandboxFailure {
    /// `append_relative` rejected the argument or it escaped the fs root.
    Resolve,
    TooLong,
    Escape,
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    use grass_config::ServerConfig;
    use grass_core::limits::MAX_BASE_PATH_LEN;
    use grass_core::wire::Response;

    use crate::session::{ServerCtx, Session};

    fn ctx_for(base_dir: &str) -> Arc<ServerCtx> {
        let mut cfg =
            ServerConfig::parse_str("base /unused\nport 1\nuser alice secret\n", "/").unwrap();
        cfg.base_dir = base_dir.to_owned();
        Arc::new(ServerCtx::new(cfg))
    }

    async fn authed_session(base_dir: &str) -> Session {
        let mut s = Session::new(ctx_for(base_dir), 1);
        s.run_command("login alice").await;
        s.run_command("pass secret").await;
        assert_eq!(s.response.payload(), "OK");
        s
    }

    async fn respond(s: &mut Session, line: &str) -> String {
        s.run_command(line).await;
        s.response.payload().to_owned()
    }

    #[tokio::test]
    async fn cd_descends_and_climbs_within_the_sandbox() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        std::fs::create_dir(dir.path().join("subdir")).unwrap();

        let mut s = authed_session(&base).await;
        assert_eq!(respond(&mut s, "cd subdir").await, "OK");
        assert_eq!(s.cwd, format!("{base}/subdir"));
        assert_eq!(respond(&mut s, "cd ..").await, "OK");
        assert_eq!(s.cwd, base);
    }

    #[tokio::test]
    async fn cd_above_the_base_is_denied_and_cwd_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        assert_eq!(respond(&mut s, "cd ..").await, "Error : access denied!");
        assert_eq!(s.cwd, base);
        assert_eq!(respond(&mut s, "cd sub/../..").await, "Error : access denied!");
        assert_eq!(s.cwd, base);
    }

    #[tokio::test]
    async fn cd_rejects_absolute_and_missing_targets() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        assert_eq!(respond(&mut s, "cd /etc").await, "Error : access denied!");
        assert_eq!(respond(&mut s, "cd nowhere").await, "Error : directory not found");
    }

    #[tokio::test]
    async fn path_length_boundary_is_enforced() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        // exactly at the limit: `/` + 127 chars
        let ok_name = "a".repeat(MAX_BASE_PATH_LEN - 1);
        let long_name = "a".repeat(MAX_BASE_PATH_LEN);

        let mut s = authed_session(&base).await;
        assert_eq!(respond(&mut s, &format!("mkdir {ok_name}")).await, "OK");
        assert_eq!(
            respond(&mut s, &format!("mkdir {long_name}")).await,
            "Error : the path is too long."
        );
    }

    #[tokio::test]
    async fn mkdir_and_rm_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        assert_eq!(respond(&mut s, "mkdir d1").await, "OK");
        assert!(dir.path().join("d1").is_dir());
        assert_eq!(
            respond(&mut s, "mkdir d1").await,
            "Error : Directory already exists"
        );

        assert_eq!(respond(&mut s, "rm d1").await, "OK");
        assert!(!dir.path().join("d1").exists());
        assert_eq!(respond(&mut s, "rm d1").await, "Error : Could not execute remove");
    }

    #[tokio::test]
    async fn mkdir_rejects_separators_and_home() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        for bad in ["a/b", "~home", "../up"] {
            assert_eq!(
                respond(&mut s, &format!("mkdir {bad}")).await,
                "Error : Please specify file or directory name within current directory",
                "{bad}"
            );
        }
    }

    #[tokio::test]
    async fn rm_removes_files_too() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        std::fs::write(dir.path().join("junk.txt"), "x").unwrap();

        let mut s = authed_session(&base).await;
        assert_eq!(respond(&mut s, "rm junk.txt").await, "OK");
        assert!(!dir.path().join("junk.txt").exists());
    }

    #[tokio::test]
    async fn ls_lists_the_working_directory() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        std::fs::write(dir.path().join("visible.txt"), "x").unwrap();

        let mut s = authed_session(&base).await;
        let out = respond(&mut s, "ls").await;
        assert!(out.contains("visible.txt"), "{out}");
    }

    #[tokio::test]
    async fn grep_finds_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        std::fs::write(dir.path().join("hit.txt"), "hello world\n").unwrap();
        std::fs::write(dir.path().join("miss.txt"), "nothing here\n").unwrap();

        let mut s = authed_session(&base).await;
        let out = respond(&mut s, "grep \"hello world\"").await;
        assert!(out.contains("hit.txt"), "{out}");
        assert!(!out.contains("miss.txt"), "{out}");
    }

    #[tokio::test]
    async fn ping_rejects_hostile_hosts() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        assert_eq!(
            respond(&mut s, "ping \"localhost;reboot\"").await,
            "Error: Invalid host name"
        );
    }

    #[tokio::test]
    async fn get_announces_port_and_size_then_serves_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let payload = b"the quick brown fox jumps over lazy d";
        std::fs::write(dir.path().join("notes.txt"), payload).unwrap();

        let mut s = authed_session(&base).await;
        let raw = respond(&mut s, "get notes.txt").await;
        let Response::GetPort { port, size } = Response::classify(&raw) else {
            panic!("unexpected response: {raw}");
        };
        assert_eq!(size, payload.len() as u64);

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut received = Vec::new();
        stream.read_to_end(&mut received).await.unwrap();
        assert_eq!(received, payload);
    }

    #[tokio::test]
    async fn get_rejects_traversal_and_missing_files() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        assert_eq!(
            respond(&mut s, "get ../../etc/passwd").await,
            "Error: Please specify file name within current directory"
        );
        assert_eq!(respond(&mut s, "get nope.txt").await, "Error: No such file");
    }

    #[tokio::test]
    async fn put_receives_the_declared_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let payload = b"uploaded contents";

        let mut s = authed_session(&base).await;
        let raw = respond(&mut s, &format!("put up.txt {}", payload.len())).await;
        let Response::PutPort { port } = Response::classify(&raw) else {
            panic!("unexpected response: {raw}");
        };

        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(payload).await.unwrap();
        stream.shutdown().await.unwrap();

        // the transfer task runs concurrently with the session
        for _ in 0..50 {
            if dir.path().join("up.txt").exists()
                && std::fs::read(dir.path().join("up.txt")).unwrap() == payload
            {
                return;
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("upload never landed");
    }

    #[tokio::test]
    async fn put_rejects_a_garbage_size() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();

        let mut s = authed_session(&base).await;
        assert_eq!(
            respond(&mut s, "put up.txt many").await,
            "Error: Invalid file size"
        );
    }

    #[tokio::test]
    async fn get_and_put_round_trip_is_byte_identical() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_string_lossy().to_string();
        let payload: Vec<u8> = (0..700u32).map(|i| (i % 253) as u8).collect();
        std::fs::write(dir.path().join("orig.bin"), &payload).unwrap();

        let mut s = authed_session(&base).await;

        let raw = respond(&mut s, "get orig.bin").await;
        let Response::GetPort { port, size } = Response::classify(&raw) else {
            panic!("unexpected response: {raw}");
        };
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        let mut downloaded = Vec::new();
        stream.read_to_end(&mut downloaded).await.unwrap();
        assert_eq!(downloaded.len() as u64, size);

        let raw = respond(&mut s, &format!("put copy.bin {size}")).await;
        let Response::PutPort { port } = Response::classify(&raw) else {
            panic!("unexpected response: {raw}");
        };
        let mut stream = TcpStream::connect(("127.0.0.1", port)).await.unwrap();
        stream.write_all(&downloaded).await.unwrap();
        stream.shutdown().await.unwrap();

        for _ in 0..50 {
            if let Ok(copied) = std::fs::read(dir.path().join("copy.bin")) {
                if copied == payload {
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
        panic!("round trip never completed");
    }
}
