use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Append-mode log file receiving one stream of a spawned process.
///
/// Open for the lifetime of a single spawn; dropping it closes the file.
#[derive(Debug)]
pub struct LogSink {
	file: File,
	path: PathBuf,
	bytes_written: u64,
	failed: bool,
}

impl LogSink {
	pub fn open(path: &Path) -> Result<Self> {
		let file = OpenOptions::new()
			.create(true)
			.append(true)
			.open(path)
			.map_err(|source| Error::LogSink {
				path: path.to_path_buf(),
				source,
			})?;
		Ok(Self {
			file,
			path: path.to_path_buf(),
			bytes_written: 0,
			failed: false,
		})
	}

	pub fn write(&mut self, data: &[u8]) {
		match self.file.write_all(data) {
			Ok(()) => {
				self.bytes_written += data.len() as u64;
				self.failed = false;
			}
			Err(e) => {
				// Warn once per failure streak, not once per chunk.
				if !self.failed {
					tracing::warn!(path = %self.path.display(), "log write failed: {}", e);
				}
				self.failed = true;
			}
		}
	}

	pub fn path(&self) -> &Path {
		&self.path
	}

	pub fn bytes_written(&self) -> u64 {
		self.bytes_written
	}
}

pub fn stdout_log_path(log_dir: &Path, program: &str) -> PathBuf {
	log_dir.join(format!("{}-out.log", program))
}

pub fn stderr_log_path(log_dir: &Path, program: &str) -> PathBuf {
	log_dir.join(format!("{}-err.log", program))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn log_paths_follow_program_name() {
		let dir = Path::new("/var/log/ramona");
		assert_eq!(stdout_log_path(dir, "web"), dir.join("web-out.log"));
		assert_eq!(stderr_log_path(dir, "web"), dir.join("web-err.log"));
	}

	#[test]
	fn appends_across_reopen() {
		let dir = std::env::temp_dir().join(format!("ramona-sink-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let path = dir.join("web-out.log");
		let _ = std::fs::remove_file(&path);

		let mut sink = LogSink::open(&path).unwrap();
		sink.write(b"first\n");
		assert_eq!(sink.bytes_written(), 6);
		drop(sink);

		let mut sink = LogSink::open(&path).unwrap();
		sink.write(b"second\n");
		drop(sink);

		assert_eq!(std::fs::read_to_string(&path).unwrap(), "first\nsecond\n");
		let _ = std::fs::remove_dir_all(&dir);
	}

	#[test]
	fn open_fails_for_missing_directory() {
		let path = Path::new("/nonexistent-ramona-dir/x-out.log");
		assert!(matches!(LogSink::open(path), Err(Error::LogSink { .. })));
	}
}
