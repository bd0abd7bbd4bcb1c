use std::path::Path;

use anyhow::{Context, Result};
use ramona::{Config, ProgramEvent, Reactor, ReactorHandle, ReactorOptions, Roster};
use ramona_ipc::PidFile;
use tokio::sync::broadcast::error::RecvError;

use crate::protocol::{self, Request, Response};

/// Run the supervisor in the foreground until it is shut down.
pub fn run(config_path: &Path, no_start: bool) -> Result<()> {
	let runtime = tokio::runtime::Builder::new_current_thread()
		.enable_all()
		.build()
		.context("failed to build runtime")?;
	runtime.block_on(serve(config_path, no_start))
}

async fn serve(config_path: &Path, no_start: bool) -> Result<()> {
	let config = Config::load(config_path).with_context(|| format!("cannot load {}", config_path.display()))?;
	std::fs::create_dir_all(&config.server.log_dir)
		.with_context(|| format!("cannot create log dir {}", config.server.log_dir.display()))?;

	let paths = protocol::control_paths(config.server.socket.clone());
	let socket_path = paths.socket_path();
	let listener = ramona_ipc::bind(&socket_path).with_context(|| format!("cannot bind {}", socket_path.display()))?;
	let pid_file = PidFile::create(&paths.pid_path()).context("cannot write pid file")?;

	let roster = Roster::new(config.programs)?;
	let events = roster.subscribe();
	let (reactor, handle) = Reactor::new(
		roster,
		ReactorOptions {
			tick: config.server.tick,
			autostart: !no_start,
		},
	);

	tokio::spawn(log_events(events));
	let control = tokio::spawn(ramona_ipc::serve(
		listener,
		move |req: Request| {
			let handle = handle.clone();
			async move { handle_request(&handle, req).await }
		},
		|message| Response::Error { message },
	));

	tracing::info!(pid = std::process::id(), config = %config_path.display(), "supervisor started");
	let result = reactor.run().await;

	control.abort();
	let _ = std::fs::remove_file(&socket_path);
	drop(pid_file);

	let roster = result?;
	tracing::info!(programs = roster.programs().len(), "supervisor stopped");
	Ok(())
}

async fn handle_request(handle: &ReactorHandle, req: Request) -> Response {
	let result = match req {
		Request::Ping => return Response::Pong,
		Request::Status => {
			return match handle.status().await {
				Ok(programs) => Response::Status { programs },
				Err(e) => Response::Error { message: e.to_string() },
			};
		}
		Request::Start { names } => handle.start(names).await,
		Request::Stop { names } => handle.stop(names).await,
		Request::Shutdown => handle.shutdown().await.map(|()| vec!["shutting down".to_string()]),
	};

	match result {
		Ok(messages) => Response::Ok {
			message: Some(messages.join("\n")),
		},
		Err(e) => Response::Error { message: e.to_string() },
	}
}

async fn log_events(mut events: tokio::sync::broadcast::Receiver<ProgramEvent>) {
	loop {
		match events.recv().await {
			Ok(ProgramEvent::Fatal { program, pid, status }) => {
				let status = status.map(|s| s.to_string()).unwrap_or_else(|| "never started".to_string());
				tracing::warn!(program = %program, pid = ?pid, "program is FATAL ({})", status);
			}
			Ok(ProgramEvent::PatternDetected { program, stream, offset }) => {
				tracing::info!(program = %program, stream = %stream, offset, "error pattern detected");
			}
			Err(RecvError::Lagged(missed)) => tracing::warn!("missed {} program events", missed),
			Err(RecvError::Closed) => return,
		}
	}
}
