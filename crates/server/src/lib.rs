//! GRASS server: sandboxed multi-user remote shell over TCP.
//!
//! The listener accepts control-channel connections and runs one session
//! task per client; sessions dispatch line commands to handlers, which may
//! resolve sandboxed paths, capture subprocess output, or hand a file off
//! to an ephemeral data-channel transfer task.

pub mod commands;
pub mod exec;
pub mod listener;
pub mod session;
pub mod transfer;
pub mod users;
