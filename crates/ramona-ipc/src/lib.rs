//! Control channel between the `ramona` CLI and a running supervisor.
//!
//! Requests and responses are serde types exchanged as one JSON document per
//! line over a Unix socket.

pub mod client;
pub mod paths;
pub mod pidfile;
pub mod server;

pub use client::{is_running, ClientError, ControlClient};
pub use server::{bind, serve};
pub use paths::ControlPaths;
pub use pidfile::{read_pid, PidFile};
