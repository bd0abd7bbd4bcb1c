// Kept as the only test in this binary: the reactor reaps with waitpid(-1),
// which would steal children from tests running alongside it.

use std::time::Duration;

use ramona::{
	Error, ProgramConfig, ProgramEvent, ProgramState, ProgramStatus, Reactor, ReactorHandle,
	ReactorOptions, Roster,
};

async fn wait_until(
	handle: &ReactorHandle,
	what: &str,
	check: impl Fn(&[ProgramStatus]) -> bool,
) -> Vec<ProgramStatus> {
	for _ in 0..100 {
		let status = handle.status().await.unwrap();
		if check(&status) {
			return status;
		}
		tokio::time::sleep(Duration::from_millis(50)).await;
	}
	panic!("timed out waiting for {}", what);
}

fn find<'a>(status: &'a [ProgramStatus], name: &str) -> &'a ProgramStatus {
	status.iter().find(|s| s.name == name).unwrap()
}

#[tokio::test]
async fn reactor_drives_programs_end_to_end() {
	let dir = std::env::temp_dir().join(format!("ramona-reactor-{}", std::process::id()));
	std::fs::create_dir_all(&dir).unwrap();

	let quick = ProgramConfig::new("quick", vec!["sh".into(), "-c".into(), "echo bye; exit 3".into()], &dir);
	let mut daemon = ProgramConfig::new("daemon", vec!["sleep".into(), "60".into()], &dir);
	daemon.start_timeout = Duration::ZERO;
	daemon.stop_timeout = Duration::from_secs(30);

	let roster = Roster::new(vec![quick, daemon]).unwrap();
	let mut events = roster.subscribe();
	let (reactor, handle) = Reactor::new(
		roster,
		ReactorOptions {
			tick: Duration::from_millis(50),
			autostart: true,
		},
	);
	let task = tokio::spawn(reactor.run());

	// Stopped -> Starting -> Fatal for the command that exits at once,
	// Stopped -> Starting -> Running for the long-running one.
	let status = wait_until(&handle, "initial states", |s| {
		find(s, "quick").state == ProgramState::Fatal && find(s, "daemon").state == ProgramState::Running
	})
	.await;
	assert_eq!(find(&status, "quick").launch_cnt, 1);
	assert_eq!(find(&status, "quick").pid, None);
	let first_pid = find(&status, "daemon").pid.unwrap();

	match events.recv().await.unwrap() {
		ProgramEvent::Fatal { program, .. } => assert_eq!(program, "quick"),
		other => panic!("unexpected event {:?}", other),
	}
	let quick_log = std::fs::read_to_string(dir.join("quick-out.log")).unwrap();
	assert_eq!(quick_log, "bye\n");

	// Running -> Stopping -> Stopped on the first signal.
	let messages = handle.stop(vec!["daemon".into()]).await.unwrap();
	assert_eq!(messages, vec!["daemon: stopping".to_string()]);
	wait_until(&handle, "daemon stopped", |s| find(s, "daemon").state == ProgramState::Stopped).await;

	// Operator requests that do not fit the current state are refused.
	assert!(matches!(
		handle.stop(vec!["daemon".into()]).await,
		Err(Error::InvalidState { .. })
	));
	assert!(matches!(
		handle.start(vec!["ghost".into()]).await,
		Err(Error::UnknownProgram(_))
	));

	// One bad name rejects the whole request before anything is started.
	assert!(matches!(
		handle.start(vec!["daemon".into(), "ghost".into()]).await,
		Err(Error::UnknownProgram(name)) if name == "ghost"
	));
	let status = handle.status().await.unwrap();
	assert_eq!(find(&status, "daemon").state, ProgramState::Stopped);
	assert_eq!(find(&status, "daemon").launch_cnt, 1);
	assert!(matches!(
		handle.start(vec!["quick".into(), "daemon".into(), "quick".into()]).await,
		Ok(messages) if messages == vec!["quick: starting".to_string(), "daemon: starting".to_string()]
	));
	let status = wait_until(&handle, "quick fatal again", |s| find(s, "quick").state == ProgramState::Fatal).await;
	assert_eq!(find(&status, "quick").launch_cnt, 2);
	handle.stop(vec!["daemon".into()]).await.unwrap();
	let status = wait_until(&handle, "daemon stopped again", |s| find(s, "daemon").state == ProgramState::Stopped).await;
	assert_eq!(find(&status, "daemon").launch_cnt, 2);

	// A Fatal program can be started again explicitly, a stopped one too.
	handle.start(vec!["daemon".into()]).await.unwrap();
	let status = wait_until(&handle, "daemon restarted", |s| find(s, "daemon").state == ProgramState::Running).await;
	let daemon = find(&status, "daemon");
	assert_eq!(daemon.launch_cnt, 3);
	assert_ne!(daemon.pid, Some(first_pid));

	handle.shutdown().await.unwrap();
	let roster = tokio::time::timeout(Duration::from_secs(10), task)
		.await
		.expect("reactor did not stop")
		.unwrap()
		.unwrap();
	assert!(roster.is_idle());
	assert_eq!(roster.get("daemon").unwrap().state(), ProgramState::Stopped);
	assert_eq!(roster.get("quick").unwrap().state(), ProgramState::Fatal);

	let _ = std::fs::remove_dir_all(&dir);
}
