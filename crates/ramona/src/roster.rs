use std::collections::HashSet;
use std::future::{poll_fn, Future};
use std::task::{Context, Poll};
use std::time::Instant;

use nix::unistd::Pid;
use tokio::sync::broadcast;

use crate::config::ProgramConfig;
use crate::error::{Error, Result};
use crate::program::Program;
use crate::types::*;

const EVENT_CAPACITY: usize = 256;

/// The fixed, ordered set of supervised programs.
pub struct Roster {
	programs: Vec<Program>,
	events: broadcast::Sender<ProgramEvent>,
}

impl Roster {
	pub fn new(configs: Vec<ProgramConfig>) -> Result<Self> {
		let mut names = HashSet::new();
		for config in &configs {
			if !names.insert(config.name.as_str()) {
				return Err(Error::DuplicateProgram(config.name.clone()));
			}
		}

		let (events, _) = broadcast::channel(EVENT_CAPACITY);
		let programs = configs
			.into_iter()
			.map(|config| Program::new(config, events.clone()))
			.collect();
		Ok(Self { programs, events })
	}

	pub fn subscribe(&self) -> broadcast::Receiver<ProgramEvent> {
		self.events.subscribe()
	}

	pub fn programs(&self) -> &[Program] {
		&self.programs
	}

	pub fn get(&self, name: &str) -> Option<&Program> {
		self.programs.iter().find(|p| p.name() == name)
	}

	fn get_mut(&mut self, name: &str) -> Result<&mut Program> {
		self.programs
			.iter_mut()
			.find(|p| p.name() == name)
			.ok_or_else(|| Error::UnknownProgram(name.to_string()))
	}

	/// Start every Stopped program. Launch failures are logged and leave the
	/// program Fatal; the rest still start.
	pub fn start_all(&mut self) {
		for program in &mut self.programs {
			if program.state() != ProgramState::Stopped {
				continue;
			}
			// Already logged by the program, which is now Fatal.
			let _ = program.start();
		}
	}

	/// Stop every Starting or Running program.
	pub fn stop_all(&mut self) {
		for program in &mut self.programs {
			if matches!(program.state(), ProgramState::Starting | ProgramState::Running) {
				program.stop();
			}
		}
	}

	/// Check that `start(name)` would be accepted, without starting anything.
	pub fn check_start(&self, name: &str) -> Result<()> {
		let program = self.get(name).ok_or_else(|| Error::UnknownProgram(name.to_string()))?;
		match program.state() {
			ProgramState::Stopped | ProgramState::Fatal => Ok(()),
			state => Err(Error::InvalidState {
				program: name.to_string(),
				action: "start",
				state,
			}),
		}
	}

	/// Check that `stop(name)` would be accepted, without stopping anything.
	pub fn check_stop(&self, name: &str) -> Result<()> {
		let program = self.get(name).ok_or_else(|| Error::UnknownProgram(name.to_string()))?;
		match program.state() {
			ProgramState::Starting | ProgramState::Running => Ok(()),
			state => Err(Error::InvalidState {
				program: name.to_string(),
				action: "stop",
				state,
			}),
		}
	}

	/// Operator start of one program; Fatal programs may be started again.
	pub fn start(&mut self, name: &str) -> Result<()> {
		self.check_start(name)?;
		self.get_mut(name)?.start()
	}

	pub fn stop(&mut self, name: &str) -> Result<()> {
		self.check_stop(name)?;
		self.get_mut(name)?.stop();
		Ok(())
	}

	pub fn on_tick(&mut self, now: Instant) {
		for program in &mut self.programs {
			program.on_tick(now);
		}
	}

	/// Route a reaped child to the program that owns it.
	pub fn on_child_exit(&mut self, pid: Pid, status: ExitStatus) {
		match self.programs.iter_mut().find(|p| p.pid() == Some(pid)) {
			Some(program) => program.on_exit(status),
			None => tracing::warn!(%pid, %status, "unknown program died"),
		}
	}

	/// Resolves to the index and stream of the first program with readable
	/// output. Never resolves while no pipe is open.
	pub fn readable(&self) -> impl Future<Output = (usize, Stream)> + '_ {
		poll_fn(move |cx| self.poll_readable(cx))
	}

	pub fn poll_readable(&self, cx: &mut Context<'_>) -> Poll<(usize, Stream)> {
		for (index, program) in self.programs.iter().enumerate() {
			if let Poll::Ready(stream) = program.poll_readable(cx) {
				return Poll::Ready((index, stream));
			}
		}
		Poll::Pending
	}

	pub fn on_readable(&mut self, index: usize, stream: Stream) {
		if let Some(program) = self.programs.get_mut(index) {
			program.on_readable(stream);
		}
	}

	/// True when no program has a live process.
	pub fn is_idle(&self) -> bool {
		self.programs.iter().all(|p| !p.state().is_live())
	}

	pub fn status(&self) -> Vec<ProgramStatus> {
		self.programs.iter().map(Program::status).collect()
	}
}
