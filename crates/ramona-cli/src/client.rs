use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use owo_colors::OwoColorize;
use ramona::{Config, ProgramState, ProgramStatus};
use ramona_ipc::{ClientError, ControlClient};

use crate::protocol::{self, Request, Response};

/// Socket of the supervisor described by `config`, falling back to the
/// default location when the file is missing or has no override.
pub fn socket_path(config: &Path) -> PathBuf {
	let socket = Config::load(config).ok().and_then(|c| c.server.socket);
	protocol::control_paths(socket).socket_path()
}

fn request(socket: &Path, req: &Request) -> Result<Response> {
	let mut client = ControlClient::<Request, Response>::connect(socket)?;
	Ok(client.send(req)?)
}

fn print_ok(response: Response) -> Result<()> {
	match response {
		Response::Ok { message } => {
			if let Some(message) = message {
				for line in message.lines() {
					println!("{}", line);
				}
			}
			Ok(())
		}
		Response::Error { message } => bail!("{}", message),
		other => bail!("unexpected response: {:?}", other),
	}
}

pub fn cmd_start(socket: &Path, names: Vec<String>) -> Result<()> {
	print_ok(request(socket, &Request::Start { names })?)
}

pub fn cmd_stop(socket: &Path, names: Vec<String>) -> Result<()> {
	print_ok(request(socket, &Request::Stop { names })?)
}

pub fn cmd_ping(socket: &Path) -> Result<()> {
	match request(socket, &Request::Ping)? {
		Response::Pong => {
			let pid = ramona_ipc::read_pid(&protocol::control_paths(None).pid_path());
			match pid {
				Some(pid) => println!("{} (pid {})", "pong".green(), pid),
				None => println!("{}", "pong".green()),
			}
			Ok(())
		}
		other => bail!("unexpected response: {:?}", other),
	}
}

pub fn cmd_shutdown(socket: &Path) -> Result<()> {
	match request(socket, &Request::Shutdown) {
		Ok(response) => print_ok(response),
		// The supervisor may exit before the reply is flushed.
		Err(e) if matches!(e.downcast_ref::<ClientError>(), Some(ClientError::Closed)) => {
			println!("shutting down");
			Ok(())
		}
		Err(e) => Err(e),
	}
}

pub fn cmd_status(socket: &Path) -> Result<()> {
	let programs = match request(socket, &Request::Status).context("cannot query supervisor")? {
		Response::Status { programs } => programs,
		Response::Error { message } => bail!("{}", message),
		other => bail!("unexpected response: {:?}", other),
	};

	let now = SystemTime::now()
		.duration_since(UNIX_EPOCH)
		.map(|d| d.as_secs())
		.unwrap_or(0);
	let width = programs.iter().map(|p| p.name.len()).max().unwrap_or(0).max(4);
	println!(
		"  {:<width$} {:<9} {:<8} {:<8} {}",
		"NAME".bold(),
		"STATE".bold(),
		"PID".bold(),
		"LAUNCHES".bold(),
		"UPTIME".bold(),
		width = width
	);
	for program in &programs {
		print_program_line(program, now, width);
	}
	Ok(())
}

fn print_program_line(program: &ProgramStatus, now: u64, width: usize) {
	let label = format!("{:<9}", program.state.label());
	let (circle, label) = match program.state {
		ProgramState::Running => ("●".green().to_string(), label.green().to_string()),
		ProgramState::Starting | ProgramState::Stopping => ("●".yellow().to_string(), label.yellow().to_string()),
		ProgramState::Fatal => ("●".red().to_string(), label.red().to_string()),
		ProgramState::Stopped => ("○".dimmed().to_string(), label.dimmed().to_string()),
	};
	let pid = program.pid.map(|p| p.to_string()).unwrap_or_else(|| "-".to_string());
	let uptime = program
		.uptime_secs(now)
		.map(format_uptime)
		.unwrap_or_else(|| "-".to_string());
	println!(
		"{} {:<width$} {} {:<8} {:<8} {}",
		circle,
		program.name,
		label,
		pid,
		program.launch_cnt,
		uptime,
		width = width
	);
}

fn format_uptime(secs: u64) -> String {
	if secs < 60 {
		format!("{}s", secs)
	} else if secs < 3600 {
		format!("{}m{}s", secs / 60, secs % 60)
	} else if secs < 86400 {
		format!("{}h{}m", secs / 3600, (secs % 3600) / 60)
	} else {
		format!("{}d{}h", secs / 86400, (secs % 86400) / 3600)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn uptime_units() {
		assert_eq!(format_uptime(0), "0s");
		assert_eq!(format_uptime(59), "59s");
		assert_eq!(format_uptime(61), "1m1s");
		assert_eq!(format_uptime(3 * 3600 + 120), "3h2m");
		assert_eq!(format_uptime(2 * 86400 + 3600), "2d1h");
	}

	#[test]
	fn socket_falls_back_to_state_dir() {
		let path = socket_path(Path::new("/nonexistent/ramona.toml"));
		assert!(path.ends_with("ramona/ramona.sock"));
	}

	#[test]
	fn socket_override_from_config() {
		let dir = std::env::temp_dir().join(format!("ramona-cli-{}", std::process::id()));
		std::fs::create_dir_all(&dir).unwrap();
		let config = dir.join("ramona.toml");
		std::fs::write(
			&config,
			"[server]\nsocket = \"/tmp/custom-ramona.sock\"\n\n[[program]]\nname = \"web\"\ncommand = \"sleep 60\"\n",
		)
		.unwrap();
		assert_eq!(socket_path(&config), PathBuf::from("/tmp/custom-ramona.sock"));
		let _ = std::fs::remove_dir_all(&dir);
	}
}
