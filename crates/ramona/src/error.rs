use std::path::PathBuf;

use thiserror::Error;

use crate::types::ProgramState;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
	#[error("failed to read config {}: {source}", .path.display())]
	ConfigRead {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("invalid config: {0}")]
	ConfigParse(#[from] toml::de::Error),

	#[error("invalid config: {0}")]
	Config(String),

	#[error("program {0} doesn't specify command - don't know how to launch it")]
	MissingCommand(String),

	#[error("program {program}: cannot split command: {message}")]
	Command { program: String, message: String },

	#[error("unknown signal: {0}")]
	UnknownSignal(String),

	#[error("program {0} is declared more than once")]
	DuplicateProgram(String),

	#[error("unknown program: {0}")]
	UnknownProgram(String),

	#[error("{program}: cannot {action} while {state}")]
	InvalidState {
		program: String,
		action: &'static str,
		state: ProgramState,
	},

	#[error("cannot open log {}: {source}", .path.display())]
	LogSink {
		path: PathBuf,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to spawn {command}: {source}")]
	Spawn {
		command: String,
		#[source]
		source: std::io::Error,
	},

	#[error("event loop setup failed: {0}")]
	EventLoop(#[source] std::io::Error),

	#[error("supervisor is shutting down")]
	ShuttingDown,
}
