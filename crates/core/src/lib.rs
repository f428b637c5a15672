//! Shared protocol core for the GRASS remote shell: error type, wire
//! limits, command tokenization, path sandboxing and response framing.
//!
//! Everything here is pure and synchronous; the server and client crates
//! layer sockets and filesystems on top.

mod error;
pub mod limits;
pub mod paths;
pub mod sanitize;
pub mod tokenize;
pub mod wire;

pub use error::GrassError;
