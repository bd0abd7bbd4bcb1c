use std::path::PathBuf;

/// Where a supervisor keeps its socket and pid file.
#[derive(Debug, Clone)]
pub struct ControlPaths {
	pub app_name: String,
	socket: Option<PathBuf>,
}

impl ControlPaths {
	pub fn new(app_name: impl Into<String>) -> Self {
		Self {
			app_name: app_name.into(),
			socket: None,
		}
	}

	/// Use an explicit socket path instead of the one under the state dir.
	pub fn with_socket(mut self, socket: Option<PathBuf>) -> Self {
		self.socket = socket;
		self
	}

	pub fn state_dir(&self) -> PathBuf {
		if let Ok(dir) = std::env::var("XDG_STATE_HOME") {
			PathBuf::from(dir).join(&self.app_name)
		} else if let Some(home) = home_dir() {
			home.join(".local").join("state").join(&self.app_name)
		} else {
			PathBuf::from("/tmp").join(&self.app_name)
		}
	}

	pub fn socket_path(&self) -> PathBuf {
		match &self.socket {
			Some(path) => path.clone(),
			None => self.state_dir().join(format!("{}.sock", self.app_name)),
		}
	}

	pub fn pid_path(&self) -> PathBuf {
		self.state_dir().join(format!("{}.pid", self.app_name))
	}
}

fn home_dir() -> Option<PathBuf> {
	std::env::var("HOME").ok().map(PathBuf::from)
}
