use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use nix::sys::signal::Signal;
use serde::Deserialize;

use crate::error::{Error, Result};
use crate::output;
use crate::signals::{self, DEFAULT_STOP_SIGNALS};

/// Raw TOML layout.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ConfigFile {
	#[serde(default)]
	pub server: ServerSection,
	#[serde(default)]
	pub program: Vec<ProgramSection>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerSection {
	#[serde(default = "default_logdir")]
	pub logdir: PathBuf,
	#[serde(default = "default_tick_ms")]
	pub tick_ms: u64,
	pub socket: Option<PathBuf>,
}

impl Default for ServerSection {
	fn default() -> Self {
		Self {
			logdir: default_logdir(),
			tick_ms: default_tick_ms(),
			socket: None,
		}
	}
}

fn default_logdir() -> PathBuf {
	PathBuf::from("log")
}
fn default_tick_ms() -> u64 {
	250
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgramSection {
	pub name: String,
	pub command: Option<String>,
	#[serde(default = "default_start_timeout")]
	pub start_timeout: f64,
	#[serde(default = "default_stop_timeout")]
	pub stop_timeout: f64,
	#[serde(default = "default_stop_signals")]
	pub stop_signals: String,
	#[serde(default = "default_error_pattern")]
	pub error_pattern: String,
}

fn default_start_timeout() -> f64 {
	1.0
}
fn default_stop_timeout() -> f64 {
	3.0
}
fn default_stop_signals() -> String {
	DEFAULT_STOP_SIGNALS.to_string()
}
fn default_error_pattern() -> String {
	"error".to_string()
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
	pub log_dir: PathBuf,
	pub tick: Duration,
	pub socket: Option<PathBuf>,
}

/// Validated settings for one program. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ProgramConfig {
	pub name: String,
	pub command: Vec<String>,
	pub start_timeout: Duration,
	pub stop_timeout: Duration,
	pub stop_signals: Vec<Signal>,
	pub error_pattern: String,
	pub stdout_log: PathBuf,
	pub stderr_log: PathBuf,
}

impl ProgramConfig {
	/// Config with the documented defaults, logging into `log_dir`.
	pub fn new(name: impl Into<String>, command: Vec<String>, log_dir: &Path) -> Self {
		let name = name.into();
		Self {
			stdout_log: output::stdout_log_path(log_dir, &name),
			stderr_log: output::stderr_log_path(log_dir, &name),
			name,
			command,
			start_timeout: Duration::from_secs(1),
			stop_timeout: Duration::from_secs(3),
			stop_signals: vec![Signal::SIGINT, Signal::SIGTERM, Signal::SIGKILL],
			error_pattern: default_error_pattern(),
		}
	}
}

#[derive(Debug, Clone)]
pub struct Config {
	pub server: ServerConfig,
	pub programs: Vec<ProgramConfig>,
}

impl Config {
	pub fn load(path: &Path) -> Result<Self> {
		let content = std::fs::read_to_string(path).map_err(|source| Error::ConfigRead {
			path: path.to_path_buf(),
			source,
		})?;
		let config = Self::parse(&content)?;
		tracing::debug!(path = %path.display(), programs = config.programs.len(), "config loaded");
		Ok(config)
	}

	pub fn parse(content: &str) -> Result<Self> {
		let file: ConfigFile = toml::from_str(content)?;
		Self::from_file(file)
	}

	pub fn from_file(file: ConfigFile) -> Result<Self> {
		if file.server.tick_ms == 0 || file.server.tick_ms >= 1000 {
			return Err(Error::Config(format!(
				"server.tick_ms must be between 1 and 999, got {}",
				file.server.tick_ms
			)));
		}
		let server = ServerConfig {
			log_dir: file.server.logdir,
			tick: Duration::from_millis(file.server.tick_ms),
			socket: file.server.socket,
		};

		let mut seen = HashSet::new();
		let mut programs = Vec::with_capacity(file.program.len());
		for section in file.program {
			if !seen.insert(section.name.clone()) {
				return Err(Error::DuplicateProgram(section.name));
			}
			programs.push(program_config(section, &server.log_dir)?);
		}

		Ok(Self { server, programs })
	}
}

fn program_config(section: ProgramSection, log_dir: &Path) -> Result<ProgramConfig> {
	let name = section.name;
	if name.is_empty() || name.contains('/') {
		return Err(Error::Config(format!("invalid program name {:?}", name)));
	}

	let command = section
		.command
		.ok_or_else(|| Error::MissingCommand(name.clone()))?;
	let argv = shell_words::split(&command).map_err(|e| Error::Command {
		program: name.clone(),
		message: e.to_string(),
	})?;
	if argv.is_empty() {
		return Err(Error::MissingCommand(name));
	}

	let start_timeout = seconds(&name, "start_timeout", section.start_timeout)?;
	let stop_timeout = seconds(&name, "stop_timeout", section.stop_timeout)?;
	let stop_signals = signals::parse_signals(&section.stop_signals)?;

	Ok(ProgramConfig {
		stdout_log: output::stdout_log_path(log_dir, &name),
		stderr_log: output::stderr_log_path(log_dir, &name),
		name,
		command: argv,
		start_timeout,
		stop_timeout,
		stop_signals,
		error_pattern: section.error_pattern,
	})
}

fn seconds(program: &str, field: &str, value: f64) -> Result<Duration> {
	Duration::try_from_secs_f64(value)
		.map_err(|_| Error::Config(format!("program {}: {} must be a non-negative number of seconds", program, field)))
}
