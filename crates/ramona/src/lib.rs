//! # ramona
//!
//! Supervisor core: keeps a fixed roster of external programs alive, starts
//! and stops them on command and captures their output.
//!
//! Every program runs through the same state machine
//! (`STOPPED -> STARTING -> RUNNING -> STOPPING -> STOPPED`, with `FATAL` for
//! processes that die on their own). All of it is driven from a single
//! [`Reactor`] task; nothing in here blocks.
//!
//! ```rust,no_run
//! use ramona::{Config, Reactor, ReactorOptions, Roster};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> ramona::Result<()> {
//! let config = Config::load("ramona.toml".as_ref())?;
//! let roster = Roster::new(config.programs)?;
//! let (reactor, handle) = Reactor::new(roster, ReactorOptions {
//!     tick: config.server.tick,
//!     autostart: true,
//! });
//!
//! tokio::spawn(async move {
//!     let status = handle.status().await;
//!     println!("{:?}", status);
//! });
//! reactor.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod handle;
pub mod matcher;
pub mod output;
pub mod program;
pub mod reactor;
pub mod roster;
pub mod signals;
pub mod types;

pub use config::{Config, ProgramConfig, ServerConfig};
pub use error::{Error, Result};
pub use handle::ProcessHandle;
pub use matcher::StreamMatcher;
pub use program::Program;
pub use reactor::{Command, Reactor, ReactorHandle, ReactorOptions};
pub use roster::Roster;
pub use types::*;
