use std::io;
use std::path::{Path, PathBuf};

/// Pid file holding the current process id; removed again on drop.
#[derive(Debug)]
pub struct PidFile {
	path: PathBuf,
}

impl PidFile {
	pub fn create(path: &Path) -> io::Result<Self> {
		if let Some(parent) = path.parent() {
			std::fs::create_dir_all(parent)?;
		}
		std::fs::write(path, format!("{}\n", std::process::id()))?;
		Ok(Self {
			path: path.to_path_buf(),
		})
	}

	pub fn path(&self) -> &Path {
		&self.path
	}
}

impl Drop for PidFile {
	fn drop(&mut self) {
		let _ = std::fs::remove_file(&self.path);
	}
}

/// Read the pid a supervisor wrote, if any.
pub fn read_pid(path: &Path) -> Option<u32> {
	std::fs::read_to_string(path)
		.ok()
		.and_then(|s| s.trim().parse().ok())
}
