use std::fmt;
use std::task::{Context, Poll};
use std::time::Instant;

use nix::unistd::Pid;
use tokio::sync::broadcast;

use crate::config::ProgramConfig;
use crate::error::Result;
use crate::handle::{ProcessHandle, ReadOutcome};
use crate::matcher::StreamMatcher;
use crate::output::LogSink;
use crate::signals::StopSequence;
use crate::types::*;

const READ_CHUNK: usize = 4096;

/// Per-stream capture state for one spawn.
struct Capture {
	sink: LogSink,
	matcher: StreamMatcher,
}

/// Everything that exists only while a process is tracked. Bundling it keeps
/// the pid and the open log sinks present or absent together.
struct Live {
	handle: ProcessHandle,
	stdout: Capture,
	stderr: Capture,
}

impl Live {
	fn capture(&mut self, stream: Stream) -> &mut Capture {
		match stream {
			Stream::Stdout => &mut self.stdout,
			Stream::Stderr => &mut self.stderr,
		}
	}
}

/// One supervised command and its lifecycle.
///
/// Transitions happen only through [`start`](Program::start),
/// [`stop`](Program::stop), [`on_tick`](Program::on_tick) and
/// [`on_exit`](Program::on_exit); none of them block.
pub struct Program {
	config: ProgramConfig,
	state: ProgramState,
	live: Option<Live>,
	launch_cnt: u32,
	start_time: Option<Instant>,
	stop_time: Option<Instant>,
	term_time: Option<Instant>,
	// Last escalation send; the stop timeout is measured from here.
	signal_time: Option<Instant>,
	stop_signals: StopSequence,
	events: broadcast::Sender<ProgramEvent>,
}

impl Program {
	pub fn new(config: ProgramConfig, events: broadcast::Sender<ProgramEvent>) -> Self {
		let stop_signals = StopSequence::new(config.stop_signals.clone());
		Self {
			config,
			state: ProgramState::Stopped,
			live: None,
			launch_cnt: 0,
			start_time: None,
			stop_time: None,
			term_time: None,
			signal_time: None,
			stop_signals,
			events,
		}
	}

	pub fn name(&self) -> &str {
		&self.config.name
	}

	pub fn config(&self) -> &ProgramConfig {
		&self.config
	}

	pub fn state(&self) -> ProgramState {
		self.state
	}

	pub fn pid(&self) -> Option<Pid> {
		self.live.as_ref().map(|live| live.handle.pid())
	}

	pub fn launch_cnt(&self) -> u32 {
		self.launch_cnt
	}

	pub fn start_time(&self) -> Option<Instant> {
		self.start_time
	}

	pub fn stop_time(&self) -> Option<Instant> {
		self.stop_time
	}

	pub fn term_time(&self) -> Option<Instant> {
		self.term_time
	}

	/// Whether the given output pipe of the current process is still open.
	pub fn is_stream_open(&self, stream: Stream) -> bool {
		self.live
			.as_ref()
			.is_some_and(|live| live.handle.is_open(stream))
	}

	pub fn status(&self) -> ProgramStatus {
		ProgramStatus {
			name: self.config.name.clone(),
			state: self.state,
			pid: self.pid().map(Pid::as_raw),
			launch_cnt: self.launch_cnt,
			start_time: self.start_time.map(unix_secs),
			stop_time: self.stop_time.map(unix_secs),
			term_time: self.term_time.map(unix_secs),
		}
	}

	/// Stopped/Fatal -> Starting.
	///
	/// Panics if a process is already tracked. On a spawn or log-open failure
	/// the program goes to Fatal and the error is returned.
	pub fn start(&mut self) -> Result<()> {
		assert!(
			matches!(self.state, ProgramState::Stopped | ProgramState::Fatal),
			"{}: start() called in state {}",
			self,
			self.state
		);

		tracing::debug!("{} -> STARTING", self);
		match self.launch() {
			Ok(live) => {
				self.live = Some(live);
				self.state = ProgramState::Starting;
				self.start_time = Some(Instant::now());
				self.stop_time = None;
				self.term_time = None;
				self.signal_time = None;
				self.launch_cnt += 1;
				Ok(())
			}
			Err(e) => {
				tracing::error!(program = %self.config.name, "launch failed: {} (-> FATAL)", e);
				self.state = ProgramState::Fatal;
				self.term_time = Some(Instant::now());
				self.notify(ProgramEvent::Fatal {
					program: self.config.name.clone(),
					pid: None,
					status: None,
				});
				Err(e)
			}
		}
	}

	fn launch(&self) -> Result<Live> {
		let stdout = LogSink::open(&self.config.stdout_log)?;
		let stderr = LogSink::open(&self.config.stderr_log)?;
		let handle = ProcessHandle::spawn(&self.config.command)?;
		Ok(Live {
			handle,
			stdout: Capture {
				sink: stdout,
				matcher: StreamMatcher::new(&self.config.error_pattern),
			},
			stderr: Capture {
				sink: stderr,
				matcher: StreamMatcher::new(&self.config.error_pattern),
			},
		})
	}

	/// Starting/Running -> Stopping, sending the first stop signal.
	///
	/// Panics unless a process is tracked and the state is Starting or Running.
	pub fn stop(&mut self) {
		assert!(self.live.is_some(), "{}: stop() without a tracked process", self);
		assert!(
			matches!(self.state, ProgramState::Starting | ProgramState::Running),
			"{}: stop() called in state {}",
			self,
			self.state
		);

		tracing::debug!("{} -> STOPPING", self);
		self.stop_signals.reset();
		self.send_stop_signal();
		let now = Instant::now();
		self.state = ProgramState::Stopping;
		self.stop_time = Some(now);
		self.signal_time = Some(now);
	}

	fn send_stop_signal(&mut self) {
		let signal = self.stop_signals.next_signal();
		if let Some(live) = &self.live {
			// Delivery failures are not state changes: the exit notification
			// or the next escalation step decides what happens.
			if let Err(e) = live.handle.signal(signal) {
				tracing::debug!(program = %self.config.name, %signal, "signal delivery failed: {}", e);
			}
		}
	}

	/// Periodic timeout check.
	pub fn on_tick(&mut self, now: Instant) {
		match self.state {
			ProgramState::Starting => {
				let elapsed = self.start_time.map(|t| now.saturating_duration_since(t));
				if elapsed.is_some_and(|e| e >= self.config.start_timeout) {
					tracing::debug!("{} -> RUNNING", self);
					self.state = ProgramState::Running;
				}
			}
			ProgramState::Stopping => {
				let elapsed = self.signal_time.map(|t| now.saturating_duration_since(t));
				if elapsed.is_some_and(|e| e >= self.config.stop_timeout) {
					tracing::warn!("{} is still terminating - sending another signal", self);
					self.send_stop_signal();
					self.signal_time = Some(now);
				}
			}
			ProgramState::Stopped | ProgramState::Running | ProgramState::Fatal => {}
		}
	}

	/// Poll the current process's pipes for readability.
	pub fn poll_readable(&self, cx: &mut Context<'_>) -> Poll<Stream> {
		match &self.live {
			Some(live) => live.handle.poll_readable(cx),
			None => Poll::Pending,
		}
	}

	/// Drain `stream` until it would block, appending to its log sink and
	/// scanning for the error pattern. End-of-stream closes the pipe.
	pub fn on_readable(&mut self, stream: Stream) {
		let Some(live) = self.live.as_mut() else {
			return;
		};
		drain(live, stream, pattern_hook(&self.config.name, &self.events, stream));
	}

	/// The tracked process terminated.
	pub fn on_exit(&mut self, status: ExitStatus) {
		let Some(mut live) = self.live.take() else {
			tracing::warn!("{} got an exit notification without a tracked process", self);
			return;
		};
		let pid = live.handle.pid();
		self.term_time = Some(Instant::now());

		// Output written just before exit may still sit in the pipes.
		for stream in Stream::ALL {
			drain(&mut live, stream, pattern_hook(&self.config.name, &self.events, stream));
		}

		let Live { handle, stdout, stderr } = live;
		handle.teardown();
		drop(stdout);
		drop(stderr);

		match self.state {
			ProgramState::Starting => {
				tracing::warn!(%pid, %status, "{} exited too quickly (-> FATAL)", self);
				self.enter_fatal(pid, status);
			}
			ProgramState::Stopping => {
				tracing::debug!(%pid, %status, "{} -> STOPPED", self);
				self.state = ProgramState::Stopped;
			}
			ProgramState::Running => {
				tracing::warn!(%pid, %status, "{} exited unexpectedly (-> FATAL)", self);
				self.enter_fatal(pid, status);
			}
			ProgramState::Stopped | ProgramState::Fatal => {
				unreachable!("{}: process tracked in state {}", self.config.name, self.state)
			}
		}
	}

	fn enter_fatal(&mut self, pid: Pid, status: ExitStatus) {
		self.state = ProgramState::Fatal;
		self.notify(ProgramEvent::Fatal {
			program: self.config.name.clone(),
			pid: Some(pid.as_raw()),
			status: Some(status),
		});
	}

	fn notify(&self, event: ProgramEvent) {
		// No subscribers is fine.
		let _ = self.events.send(event);
	}
}

/// Publishes a `PatternDetected` event for every match `drain` reports.
fn pattern_hook<'a>(
	name: &'a str,
	events: &'a broadcast::Sender<ProgramEvent>,
	stream: Stream,
) -> impl FnMut(usize) + 'a {
	move |offset| {
		tracing::debug!(program = %name, %stream, offset, "error pattern detected");
		let _ = events.send(ProgramEvent::PatternDetected {
			program: name.to_string(),
			stream,
			offset,
		});
	}
}

fn drain(live: &mut Live, stream: Stream, mut on_match: impl FnMut(usize)) {
	let mut buf = [0u8; READ_CHUNK];
	loop {
		match live.handle.read(stream, &mut buf) {
			ReadOutcome::Data(n) => {
				let capture = live.capture(stream);
				let chunk = &buf[..n];
				capture.sink.write(chunk);
				let mut base = 0;
				while let Some(offset) = capture.matcher.submit(&chunk[base..]) {
					on_match(base + offset);
					base += offset + 1;
				}
			}
			ReadOutcome::WouldBlock => return,
			ReadOutcome::Eof | ReadOutcome::Closed => {
				live.handle.close(stream);
				return;
			}
		}
	}
}

impl fmt::Display for Program {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self.pid() {
			Some(pid) => write!(f, "<program {} state={} pid={}>", self.config.name, self.state, pid),
			None => write!(f, "<program {} state={} pid=?>", self.config.name, self.state),
		}
	}
}

impl fmt::Debug for Program {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		fmt::Display::fmt(self, f)
	}
}
