use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{Duration, Instant};

use nix::sys::signal::{kill, Signal};
use nix::sys::wait::waitpid;
use nix::unistd::Pid;

use ramona::{Error, ExitStatus, ProgramConfig, ProgramState, Roster, Stream};

static TEST_COUNTER: AtomicU32 = AtomicU32::new(0);

fn temp_dir(name: &str) -> PathBuf {
	let n = TEST_COUNTER.fetch_add(1, Ordering::SeqCst);
	let dir = std::env::temp_dir().join(format!("ramona-roster-{}-{}-{}", std::process::id(), n, name));
	let _ = std::fs::create_dir_all(&dir);
	dir
}

fn cfg(dir: &Path, name: &str, command: &[&str]) -> ProgramConfig {
	ProgramConfig::new(name, command.iter().map(|s| s.to_string()).collect(), dir)
}

fn state(roster: &Roster, name: &str) -> ProgramState {
	roster.get(name).unwrap().state()
}

/// Kill and reap every live program so no child outlives the test.
fn kill_all(roster: &mut Roster) {
	let pids: Vec<Pid> = roster.programs().iter().filter_map(|p| p.pid()).collect();
	for pid in pids {
		let _ = kill(pid, Signal::SIGKILL);
		let status = waitpid(pid, None).unwrap();
		let (pid, exit) = ExitStatus::from_wait(status).unwrap();
		roster.on_child_exit(pid, exit);
	}
	assert!(roster.is_idle());
}

#[test]
fn duplicate_names_are_rejected() {
	let dir = temp_dir("dup");
	let result = Roster::new(vec![cfg(&dir, "a", &["true"]), cfg(&dir, "a", &["true"])]);
	assert!(matches!(result, Err(Error::DuplicateProgram(name)) if name == "a"));
}

#[tokio::test]
async fn start_all_and_stop_all_fan_out_by_state() {
	let dir = temp_dir("fanout");
	let mut roster = Roster::new(vec![
		cfg(&dir, "web", &["sleep", "60"]),
		cfg(&dir, "broken", &["/nonexistent/ramona-binary"]),
		cfg(&dir, "worker", &["sleep", "60"]),
	])
	.unwrap();
	assert!(roster.is_idle());

	roster.start_all();
	assert_eq!(state(&roster, "web"), ProgramState::Starting);
	assert_eq!(state(&roster, "broken"), ProgramState::Fatal);
	assert_eq!(state(&roster, "worker"), ProgramState::Starting);

	// Fatal programs are left alone by start_all.
	roster.start_all();
	assert_eq!(state(&roster, "broken"), ProgramState::Fatal);

	roster.stop_all();
	assert_eq!(state(&roster, "web"), ProgramState::Stopping);
	assert_eq!(state(&roster, "worker"), ProgramState::Stopping);
	assert_eq!(state(&roster, "broken"), ProgramState::Fatal);

	kill_all(&mut roster);
	assert_eq!(state(&roster, "web"), ProgramState::Stopped);
	assert_eq!(state(&roster, "worker"), ProgramState::Stopped);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn single_program_commands_check_state() {
	let dir = temp_dir("single");
	let mut roster = Roster::new(vec![cfg(&dir, "web", &["sleep", "60"])]).unwrap();

	assert!(matches!(roster.stop("web"), Err(Error::InvalidState { action: "stop", .. })));
	assert!(matches!(roster.start("nope"), Err(Error::UnknownProgram(_))));

	assert!(roster.check_start("web").is_ok());
	assert!(matches!(roster.check_stop("web"), Err(Error::InvalidState { .. })));
	assert!(matches!(roster.check_start("nope"), Err(Error::UnknownProgram(_))));
	assert_eq!(state(&roster, "web"), ProgramState::Stopped);

	roster.start("web").unwrap();
	assert!(matches!(roster.check_start("web"), Err(Error::InvalidState { .. })));
	assert!(roster.check_stop("web").is_ok());
	assert!(matches!(
		roster.start("web"),
		Err(Error::InvalidState { state: ProgramState::Starting, .. })
	));

	roster.stop("web").unwrap();
	assert!(matches!(roster.stop("web"), Err(Error::InvalidState { .. })));

	kill_all(&mut roster);
	assert_eq!(state(&roster, "web"), ProgramState::Stopped);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn unknown_pid_exit_changes_nothing() {
	let dir = temp_dir("orphan");
	let mut roster = Roster::new(vec![cfg(&dir, "web", &["sleep", "60"]), cfg(&dir, "idle", &["true"])]).unwrap();
	roster.start("web").unwrap();
	let before = roster.status();

	roster.on_child_exit(Pid::from_raw(i32::MAX - 1), ExitStatus::Exited(0));

	let after = roster.status();
	for (b, a) in before.iter().zip(after.iter()) {
		assert_eq!(b.state, a.state);
		assert_eq!(b.pid, a.pid);
	}
	kill_all(&mut roster);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn tick_reaches_every_program() {
	let dir = temp_dir("tick");
	let mut a = cfg(&dir, "a", &["sleep", "60"]);
	a.start_timeout = Duration::ZERO;
	let mut b = cfg(&dir, "b", &["sleep", "60"]);
	b.start_timeout = Duration::ZERO;
	let mut roster = Roster::new(vec![a, b]).unwrap();

	roster.start_all();
	roster.on_tick(Instant::now());
	assert_eq!(state(&roster, "a"), ProgramState::Running);
	assert_eq!(state(&roster, "b"), ProgramState::Running);

	let status = roster.status();
	assert_eq!(status.len(), 2);
	assert!(status.iter().all(|s| s.pid.is_some() && s.launch_cnt == 1 && s.start_time.is_some()));

	kill_all(&mut roster);
	assert_eq!(state(&roster, "a"), ProgramState::Fatal);
	let _ = std::fs::remove_dir_all(&dir);
}

#[tokio::test]
async fn readable_resolves_for_pending_output() {
	let dir = temp_dir("readable");
	let mut roster = Roster::new(vec![
		cfg(&dir, "quiet", &["sleep", "60"]),
		cfg(&dir, "talker", &["sh", "-c", "echo hi; exec sleep 60"]),
	])
	.unwrap();
	roster.start_all();

	let (index, stream) = tokio::time::timeout(Duration::from_secs(5), roster.readable())
		.await
		.expect("no readiness reported");
	assert_eq!(index, 1);
	assert_eq!(stream, Stream::Stdout);
	roster.on_readable(index, stream);

	let log = std::fs::read_to_string(dir.join("talker-out.log")).unwrap();
	assert_eq!(log, "hi\n");

	// The first drain emptied the pipe.
	roster.on_readable(index, stream);
	let log = std::fs::read_to_string(dir.join("talker-out.log")).unwrap();
	assert_eq!(log, "hi\n");

	kill_all(&mut roster);
	let _ = std::fs::remove_dir_all(&dir);
}
