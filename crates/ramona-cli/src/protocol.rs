use ramona::ProgramStatus;
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "ramona";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "cmd", rename_all = "snake_case")]
pub enum Request {
	/// Empty `names` means every stopped program.
	Start {
		#[serde(default)]
		names: Vec<String>,
	},
	/// Empty `names` means every live program.
	Stop {
		#[serde(default)]
		names: Vec<String>,
	},
	Status,
	Ping,
	Shutdown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
	Ok { message: Option<String> },
	Status { programs: Vec<ProgramStatus> },
	Error { message: String },
	Pong,
}

pub fn control_paths(socket: Option<std::path::PathBuf>) -> ramona_ipc::ControlPaths {
	ramona_ipc::ControlPaths::new(APP_NAME).with_socket(socket)
}
