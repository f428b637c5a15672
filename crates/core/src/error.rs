use thiserror::Error;

/// Error kinds produced by the protocol core and its consumers.
///
/// Handlers map these onto the human-readable `Error: ...` strings sent on
/// the control channel; the variants themselves carry the classification
/// used by tests and logging.
#[derive(Debug, Error)]
pub enum GrassError {
    /// A user, command, path or file that does not exist.
    #[error("not found: {0}")]
    NotFound(&'static str),

    /// Socket, file or subprocess I/O failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Wrong argument count, `pass` without a pending login, invalid tokens.
    #[error("protocol violation: {0}")]
    Protocol(&'static str),

    /// Config or command syntax error.
    #[error("parse error: {0}")]
    Parse(&'static str),

    /// Path or argument over its configured limit.
    #[error("{0} is too long")]
    TooLarge(&'static str),

    /// Internal precondition failure.
    #[error("internal error: {0}")]
    Internal(&'static str),

    /// Path traversal out of the sandbox, or a non-directory target.
    #[error("directory error: {0}")]
    Dir(&'static str),

    /// Wrong password.
    #[error("authentication failed")]
    Auth,

    /// Subpath check failed, or the command requires authentication.
    #[error("permission denied: {0}")]
    Permission(&'static str),

    /// Data-channel byte count mismatch.
    #[error("transfer failed: moved {got} of {expected} bytes")]
    Transfer { got: u64, expected: u64 },
}
