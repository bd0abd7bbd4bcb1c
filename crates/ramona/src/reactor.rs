use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::wait::{waitpid, WaitPidFlag, WaitStatus};
use nix::unistd::Pid;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::{mpsc, oneshot};
use tokio::time::{self, MissedTickBehavior};

use crate::error::{Error, Result};
use crate::roster::Roster;
use crate::types::{ExitStatus, ProgramStatus};

const COMMAND_BUFFER: usize = 64;

/// Operator requests handled on the reactor thread. An empty `names` list
/// means every program.
#[derive(Debug)]
pub enum Command {
	Start {
		names: Vec<String>,
		reply: oneshot::Sender<Result<Vec<String>>>,
	},
	Stop {
		names: Vec<String>,
		reply: oneshot::Sender<Result<Vec<String>>>,
	},
	Status {
		reply: oneshot::Sender<Vec<ProgramStatus>>,
	},
	Shutdown,
}

/// Cloneable sender side used by the control surface.
#[derive(Debug, Clone)]
pub struct ReactorHandle {
	commands: mpsc::Sender<Command>,
}

impl ReactorHandle {
	pub async fn start(&self, names: Vec<String>) -> Result<Vec<String>> {
		let (reply, rx) = oneshot::channel();
		self.send(Command::Start { names, reply }).await?;
		rx.await.map_err(|_| Error::ShuttingDown)?
	}

	pub async fn stop(&self, names: Vec<String>) -> Result<Vec<String>> {
		let (reply, rx) = oneshot::channel();
		self.send(Command::Stop { names, reply }).await?;
		rx.await.map_err(|_| Error::ShuttingDown)?
	}

	pub async fn status(&self) -> Result<Vec<ProgramStatus>> {
		let (reply, rx) = oneshot::channel();
		self.send(Command::Status { reply }).await?;
		rx.await.map_err(|_| Error::ShuttingDown)
	}

	pub async fn shutdown(&self) -> Result<()> {
		self.send(Command::Shutdown).await
	}

	async fn send(&self, command: Command) -> Result<()> {
		self.commands.send(command).await.map_err(|_| Error::ShuttingDown)
	}
}

#[derive(Debug, Clone)]
pub struct ReactorOptions {
	pub tick: Duration,
	pub autostart: bool,
}

impl Default for ReactorOptions {
	fn default() -> Self {
		Self {
			tick: Duration::from_millis(250),
			autostart: true,
		}
	}
}

/// Single-threaded driver for a [`Roster`]: output readiness, the periodic
/// tick, child reaping and operator commands are all dispatched from one
/// task, so program state is never touched concurrently.
pub struct Reactor {
	roster: Roster,
	options: ReactorOptions,
	commands: mpsc::Receiver<Command>,
	commands_open: bool,
	draining: bool,
}

impl Reactor {
	pub fn new(roster: Roster, options: ReactorOptions) -> (Self, ReactorHandle) {
		let (tx, rx) = mpsc::channel(COMMAND_BUFFER);
		let reactor = Self {
			roster,
			options,
			commands: rx,
			commands_open: true,
			draining: false,
		};
		(reactor, ReactorHandle { commands: tx })
	}

	pub fn roster(&self) -> &Roster {
		&self.roster
	}

	/// Run until shutdown is requested and every program has stopped.
	pub async fn run(mut self) -> Result<Roster> {
		// Installed before anything is spawned so no exit goes unnoticed.
		let mut sigchld = signal(SignalKind::child()).map_err(Error::EventLoop)?;
		let mut sigterm = signal(SignalKind::terminate()).map_err(Error::EventLoop)?;
		let mut sigint = signal(SignalKind::interrupt()).map_err(Error::EventLoop)?;

		let mut ticker = time::interval(self.options.tick);
		ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

		if self.options.autostart {
			self.roster.start_all();
		}

		loop {
			if self.draining && self.roster.is_idle() {
				tracing::info!("all programs stopped");
				return Ok(self.roster);
			}

			tokio::select! {
				_ = ticker.tick() => {
					// SIGCHLD deliveries coalesce; a reap per tick catches stragglers.
					self.reap_children();
					self.roster.on_tick(Instant::now());
				}
				_ = sigchld.recv() => self.reap_children(),
				(index, stream) = self.roster.readable() => self.roster.on_readable(index, stream),
				command = self.commands.recv(), if self.commands_open => match command {
					Some(command) => self.dispatch(command),
					None => {
						self.commands_open = false;
						self.begin_shutdown("control channel closed");
					}
				},
				_ = sigterm.recv() => self.begin_shutdown("SIGTERM"),
				_ = sigint.recv() => self.begin_shutdown("SIGINT"),
			}
		}
	}

	fn dispatch(&mut self, command: Command) {
		match command {
			Command::Start { names, reply } => {
				let result = if self.draining {
					Err(Error::ShuttingDown)
				} else {
					self.start(&names)
				};
				let _ = reply.send(result);
			}
			Command::Stop { names, reply } => {
				let _ = reply.send(self.stop(&names));
			}
			Command::Status { reply } => {
				let _ = reply.send(self.roster.status());
			}
			Command::Shutdown => self.begin_shutdown("shutdown requested"),
		}
	}

	// Every name is checked before any program is touched, so a bad name
	// rejects the whole request.
	fn start(&mut self, names: &[String]) -> Result<Vec<String>> {
		if names.is_empty() {
			self.roster.start_all();
			return Ok(vec!["all stopped programs: starting".to_string()]);
		}
		let names = unique(names);
		for name in &names {
			self.roster.check_start(name)?;
		}
		let messages = names
			.into_iter()
			.map(|name| match self.roster.start(name) {
				Ok(()) => format!("{}: starting", name),
				// Launch failures leave the program Fatal; the rest still start.
				Err(e) => format!("{}: {}", name, e),
			})
			.collect();
		Ok(messages)
	}

	fn stop(&mut self, names: &[String]) -> Result<Vec<String>> {
		if names.is_empty() {
			self.roster.stop_all();
			return Ok(vec!["all running programs: stopping".to_string()]);
		}
		let names = unique(names);
		for name in &names {
			self.roster.check_stop(name)?;
		}
		let mut messages = Vec::with_capacity(names.len());
		for name in names {
			self.roster.stop(name)?;
			messages.push(format!("{}: stopping", name));
		}
		Ok(messages)
	}

	fn begin_shutdown(&mut self, reason: &str) {
		if !self.draining {
			tracing::info!("{}, stopping all programs", reason);
		}
		self.draining = true;
		self.roster.stop_all();
	}

	fn reap_children(&mut self) {
		loop {
			match waitpid(Pid::from_raw(-1), Some(WaitPidFlag::WNOHANG)) {
				Ok(WaitStatus::StillAlive) => return,
				Ok(status) => {
					if let Some((pid, exit)) = ExitStatus::from_wait(status) {
						self.roster.on_child_exit(pid, exit);
					}
				}
				Err(Errno::EINTR) => continue,
				Err(Errno::ECHILD) => return,
				Err(e) => {
					tracing::warn!("waitpid failed: {}", e);
					return;
				}
			}
		}
	}
}

fn unique(names: &[String]) -> Vec<&str> {
	let mut seen = Vec::with_capacity(names.len());
	for name in names {
		if !seen.contains(&name.as_str()) {
			seen.push(name.as_str());
		}
	}
	seen
}
