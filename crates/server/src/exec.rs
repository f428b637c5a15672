//! Captured subprocess execution for the shell-out verbs.
//!
//! Commands run with an argument vector, never through `sh -c`; stdout and
//! stderr are captured over pipes, merged, and truncated to the response
//! cap.

use std::io;
use std::time::Duration;

use grass_core::GrassError;
use grass_core::limits::MAX_RESPONSE_LEN;

/// Upper bound on a single shell-out. `ping -c 1` against a dead host is
/// the slowest caller and resolves well under this.
const COMMAND_TIMEOUT_SECS: u64 = 30;

/// Run `program` with `args`, optionally in `cwd`, and return the merged
/// stdout+stderr capped at `MAX_RESPONSE_LEN` bytes.
pub async fn capture(
    program: &str,
    args: &[&str],
    cwd: Option<&str>,
) -> Result<String, GrassError> {
    let mut cmd = tokio::process::Command::new(program);
    cmd.args(args);
    if let Some(dir) = cwd {
        cmd.current_dir(dir);
    }
    cmd.kill_on_drop(true);

    let output = tokio::time::timeout(Duration::from_secs(COMMAND_TIMEOUT_SECS), cmd.output())
        .await
        .map_err(|_| {
            GrassError::Io(io::Error::new(io::ErrorKind::TimedOut, "command timed out"))
        })??;

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));
    Ok(truncate_response(combined))
}

/// Cap at `MAX_RESPONSE_LEN` bytes, rounded down to a char boundary.
fn truncate_response(mut s: String) -> String {
    if s.len() > MAX_RESPONSE_LEN {
        let mut end = MAX_RESPONSE_LEN;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}
