use std::fmt;
use std::time::{Instant, SystemTime, UNIX_EPOCH};

use nix::sys::signal::Signal;
use nix::sys::wait::WaitStatus;
use nix::unistd::Pid;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProgramState {
	Stopped,
	Starting,
	Running,
	Stopping,
	Fatal,
}

impl ProgramState {
	/// True while a process is tracked for the program.
	pub fn is_live(self) -> bool {
		matches!(
			self,
			ProgramState::Starting | ProgramState::Running | ProgramState::Stopping
		)
	}

	pub fn label(self) -> &'static str {
		match self {
			ProgramState::Stopped => "STOPPED",
			ProgramState::Starting => "STARTING",
			ProgramState::Running => "RUNNING",
			ProgramState::Stopping => "STOPPING",
			ProgramState::Fatal => "FATAL",
		}
	}
}

impl fmt::Display for ProgramState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.label())
	}
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stream {
	Stdout,
	Stderr,
}

impl Stream {
	pub const ALL: [Stream; 2] = [Stream::Stdout, Stream::Stderr];
}

impl fmt::Display for Stream {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Stream::Stdout => f.write_str("stdout"),
			Stream::Stderr => f.write_str("stderr"),
		}
	}
}

/// How a reaped child terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitStatus {
	Exited(i32),
	Signaled(i32),
}

impl ExitStatus {
	/// Extract the terminated pid and status from a `waitpid` result.
	/// Stop/continue notifications and `StillAlive` yield `None`.
	pub fn from_wait(status: WaitStatus) -> Option<(Pid, ExitStatus)> {
		match status {
			WaitStatus::Exited(pid, code) => Some((pid, ExitStatus::Exited(code))),
			WaitStatus::Signaled(pid, signal, _) => Some((pid, ExitStatus::Signaled(signal as i32))),
			_ => None,
		}
	}
}

impl fmt::Display for ExitStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			ExitStatus::Exited(code) => write!(f, "exit {}", code),
			ExitStatus::Signaled(num) => match Signal::try_from(*num) {
				Ok(signal) => write!(f, "killed by {}", signal),
				Err(_) => write!(f, "killed by signal {}", num),
			},
		}
	}
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramStatus {
	pub name: String,
	pub state: ProgramState,
	pub pid: Option<i32>,
	pub launch_cnt: u32,
	pub start_time: Option<u64>,
	pub stop_time: Option<u64>,
	pub term_time: Option<u64>,
}

impl ProgramStatus {
	pub fn uptime_secs(&self, now: u64) -> Option<u64> {
		if self.state.is_live() {
			self.start_time.map(|t| now.saturating_sub(t))
		} else {
			None
		}
	}
}

/// Notifications published by programs for whoever subscribes to the roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgramEvent {
	Fatal {
		program: String,
		pid: Option<i32>,
		status: Option<ExitStatus>,
	},
	PatternDetected {
		program: String,
		stream: Stream,
		offset: usize,
	},
}

/// Convert a monotonic instant into Unix seconds for reporting.
pub fn unix_secs(at: Instant) -> u64 {
	let age = Instant::now().saturating_duration_since(at);
	SystemTime::now()
		.checked_sub(age)
		.and_then(|t| t.duration_since(UNIX_EPOCH).ok())
		.map(|d| d.as_secs())
		.unwrap_or(0)
}
