//! Protocol-wide size limits, shared by server and client.

/// Arguments longer than this are silently truncated by the tokenizer.
pub const MAX_ARG_LEN: usize = 512;

/// Upper bound on a single control-channel response.
pub const MAX_RESPONSE_LEN: usize = 4096;

/// Longest command line accepted on the control channel.
pub const MAX_RECV_LEN: usize = 4096;

/// Sandbox depth: a resolved path may exceed the base directory by at most
/// this many bytes, so the enforceable depth is independent of where the
/// base directory itself lies.
pub const MAX_BASE_PATH_LEN: usize = 128;

/// Data-channel write granularity for outbound (GET) transfers.
pub const MAX_SEND_CHUNK: usize = 256;

/// Data-channel read granularity for inbound (PUT) transfers.
pub const MAX_RECV_CHUNK: usize = 128;

/// Listen backlog for the control-channel listener.
pub const SERVER_BACKLOG: u32 = 3;

/// How long a data-channel listener waits for its single peer.
pub const TRANSFER_ACCEPT_TIMEOUT_SECS: u64 = 30;
