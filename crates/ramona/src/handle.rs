use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::process::CommandExt;
use std::process::{Command, Stdio};
use std::task::{Context, Poll};

use nix::errno::Errno;
use nix::fcntl::{fcntl, FcntlArg, FdFlag, OFlag};
use nix::sys::resource::{getrlimit, Resource};
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::io::unix::AsyncFd;
use tokio::io::Interest;

use crate::error::{Error, Result};
use crate::types::Stream;

// Upper bound for the fallback descriptor scrub when RLIMIT_NOFILE is huge or
// unlimited.
const SCRUB_FD_CAP: u64 = 65536;

/// Result of one non-blocking read from an output pipe.
#[derive(Debug, PartialEq, Eq)]
pub enum ReadOutcome {
	Data(usize),
	/// Nothing more available right now.
	WouldBlock,
	/// The child closed its end of the pipe.
	Eof,
	/// The stream was already closed, or the read failed.
	Closed,
}

/// A spawned child together with the read ends of its stdout and stderr
/// pipes, each registered with the reactor for read readiness.
#[derive(Debug)]
pub struct ProcessHandle {
	pid: Pid,
	stdout: Option<AsyncFd<OwnedFd>>,
	stderr: Option<AsyncFd<OwnedFd>>,
}

impl ProcessHandle {
	/// Spawn `command` (argv form) with stdin from `/dev/null` and stdout and
	/// stderr connected to fresh non-blocking pipes.
	///
	/// Must be called inside a tokio runtime. The child is not waited on here;
	/// reaping is left to whoever collects SIGCHLD.
	pub fn spawn(command: &[String]) -> Result<Self> {
		let (program, args) = command.split_first().ok_or_else(|| Error::Spawn {
			command: String::new(),
			source: std::io::Error::new(std::io::ErrorKind::InvalidInput, "empty command"),
		})?;

		let max_fd = scrub_limit();
		let mut cmd = Command::new(program);
		cmd.args(args)
			.stdin(Stdio::null())
			.stdout(Stdio::piped())
			.stderr(Stdio::piped());

		// Runs in the child between fork and exec. Only async-signal-safe
		// calls are allowed here; a failure makes the child exit before exec.
		unsafe {
			cmd.pre_exec(move || {
				scrub_descriptors(max_fd);
				Ok(())
			});
		}

		let mut child = cmd.spawn().map_err(|source| Error::Spawn {
			command: program.clone(),
			source,
		})?;
		let pid = Pid::from_raw(child.id() as i32);

		let pipes = child
			.stdout
			.take()
			.map(OwnedFd::from)
			.zip(child.stderr.take().map(OwnedFd::from));
		let registered = match pipes {
			Some((out, err)) => register(out).and_then(|out| Ok((out, register(err)?))),
			None => Err(std::io::Error::new(std::io::ErrorKind::Other, "child pipes missing")),
		};

		match registered {
			Ok((stdout, stderr)) => Ok(Self {
				pid,
				stdout: Some(stdout),
				stderr: Some(stderr),
			}),
			Err(source) => {
				// Without pipes the child cannot be supervised; do not leave it behind.
				let _ = kill(pid, Signal::SIGKILL);
				Err(Error::Spawn {
					command: program.clone(),
					source,
				})
			}
		}
	}

	pub fn pid(&self) -> Pid {
		self.pid
	}

	pub fn signal(&self, signal: Signal) -> nix::Result<()> {
		kill(self.pid, signal)
	}

	pub fn is_open(&self, stream: Stream) -> bool {
		self.pipe(stream).is_some()
	}

	fn pipe(&self, stream: Stream) -> Option<&AsyncFd<OwnedFd>> {
		match stream {
			Stream::Stdout => self.stdout.as_ref(),
			Stream::Stderr => self.stderr.as_ref(),
		}
	}

	fn pipe_slot(&mut self, stream: Stream) -> &mut Option<AsyncFd<OwnedFd>> {
		match stream {
			Stream::Stdout => &mut self.stdout,
			Stream::Stderr => &mut self.stderr,
		}
	}

	/// Poll both pipes for read readiness. The readiness flag of the returned
	/// stream is cleared; the caller must then drain it until
	/// [`ReadOutcome::WouldBlock`].
	pub fn poll_readable(&self, cx: &mut Context<'_>) -> Poll<Stream> {
		for stream in Stream::ALL {
			let Some(pipe) = self.pipe(stream) else {
				continue;
			};
			match pipe.poll_read_ready(cx) {
				Poll::Ready(Ok(mut guard)) => {
					guard.clear_ready();
					return Poll::Ready(stream);
				}
				// Let the drain observe the error and close the stream.
				Poll::Ready(Err(_)) => return Poll::Ready(stream),
				Poll::Pending => {}
			}
		}
		Poll::Pending
	}

	pub fn read(&self, stream: Stream, buf: &mut [u8]) -> ReadOutcome {
		let Some(pipe) = self.pipe(stream) else {
			return ReadOutcome::Closed;
		};
		loop {
			match nix::unistd::read(pipe.as_raw_fd(), buf) {
				Ok(0) => return ReadOutcome::Eof,
				Ok(n) => return ReadOutcome::Data(n),
				Err(Errno::EINTR) => continue,
				Err(Errno::EAGAIN) => return ReadOutcome::WouldBlock,
				Err(e) => {
					tracing::warn!(pid = %self.pid, %stream, "pipe read failed: {}", e);
					return ReadOutcome::Closed;
				}
			}
		}
	}

	/// Deregister and close one stream after the child closed it.
	pub fn close(&mut self, stream: Stream) {
		if let Some(pipe) = self.pipe_slot(stream).take() {
			drop(pipe.into_inner());
		}
	}

	/// Deregister both pipes, then close both descriptors.
	pub fn teardown(mut self) {
		let stdout = self.stdout.take().map(AsyncFd::into_inner);
		let stderr = self.stderr.take().map(AsyncFd::into_inner);
		drop(stdout);
		drop(stderr);
	}
}

fn register(fd: OwnedFd) -> std::io::Result<AsyncFd<OwnedFd>> {
	set_nonblocking(fd.as_raw_fd())?;
	// SAFETY: the OwnedFd moves into the AsyncFd and stays open under the
	// same number until `into_inner` hands it back.
	let pipe = unsafe { AsyncFd::register_with_interest(fd, Interest::READABLE) }?;
	Ok(pipe)
}

fn set_nonblocking(fd: RawFd) -> std::io::Result<()> {
	let flags = OFlag::from_bits_truncate(fcntl(fd, FcntlArg::F_GETFL)?);
	fcntl(fd, FcntlArg::F_SETFL(flags | OFlag::O_NONBLOCK))?;
	Ok(())
}

fn scrub_limit() -> RawFd {
	let soft = getrlimit(Resource::RLIMIT_NOFILE)
		.map(|(soft, _)| soft)
		.unwrap_or(1024);
	soft.min(SCRUB_FD_CAP) as RawFd
}

// Every descriptor above the standard three gets close-on-exec, so the exec'd
// program starts with only stdin, stdout and stderr. Closing them outright
// would also close the pipe std uses to report exec failures back to us.
fn scrub_descriptors(max_fd: RawFd) {
	if mark_all_cloexec() {
		return;
	}
	for fd in 3..max_fd {
		let _ = fcntl(fd, FcntlArg::F_SETFD(FdFlag::FD_CLOEXEC));
	}
}

// close_range(2) covers the whole table in one call, including descriptors
// above the current RLIMIT_NOFILE. Needs Linux 5.11.
#[cfg(target_os = "linux")]
fn mark_all_cloexec() -> bool {
	let ret = unsafe {
		libc::syscall(
			libc::SYS_close_range,
			3 as libc::c_uint,
			libc::c_uint::MAX,
			libc::CLOSE_RANGE_CLOEXEC,
		)
	};
	ret == 0
}

#[cfg(not(target_os = "linux"))]
fn mark_all_cloexec() -> bool {
	false
}
