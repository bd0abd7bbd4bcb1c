use std::future::Future;
use std::io;
use std::path::Path;
use std::sync::Arc;

use serde::{de::DeserializeOwned, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Bind the control socket, replacing a stale socket file left behind by a
/// supervisor that did not shut down cleanly.
pub fn bind(path: &Path) -> io::Result<UnixListener> {
	if let Some(parent) = path.parent() {
		std::fs::create_dir_all(parent)?;
	}
	if path.exists() {
		if std::os::unix::net::UnixStream::connect(path).is_ok() {
			return Err(io::Error::new(
				io::ErrorKind::AddrInUse,
				format!("{} is in use by a running supervisor", path.display()),
			));
		}
		tracing::debug!("removing stale socket {}", path.display());
		std::fs::remove_file(path)?;
	}
	let listener = UnixListener::bind(path)?;
	tracing::info!("listening on {}", path.display());
	Ok(listener)
}

/// Accept connections forever, answering each JSON line with one JSON line.
///
/// Lines that do not parse as `Req` are answered with `invalid(message)`
/// so the client is never left waiting.
pub async fn serve<Req, Resp, F, Fut, E>(listener: UnixListener, handler: F, invalid: E)
where
	Req: DeserializeOwned + Send + 'static,
	Resp: Serialize + Send + 'static,
	F: Fn(Req) -> Fut + Send + Sync + 'static,
	Fut: Future<Output = Resp> + Send,
	E: Fn(String) -> Resp + Send + Sync + 'static,
{
	let handler = Arc::new(handler);
	let invalid = Arc::new(invalid);

	loop {
		let stream = match listener.accept().await {
			Ok((stream, _)) => stream,
			Err(e) => {
				tracing::error!("accept error: {}", e);
				continue;
			}
		};

		let handler = Arc::clone(&handler);
		let invalid = Arc::clone(&invalid);
		tokio::spawn(async move {
			if let Err(e) = handle_connection(stream, handler, invalid).await {
				tracing::debug!("control connection closed: {}", e);
			}
		});
	}
}

async fn handle_connection<Req, Resp, F, Fut, E>(stream: UnixStream, handler: Arc<F>, invalid: Arc<E>) -> io::Result<()>
where
	Req: DeserializeOwned,
	Resp: Serialize,
	F: Fn(Req) -> Fut,
	Fut: Future<Output = Resp>,
	E: Fn(String) -> Resp,
{
	let (reader, mut writer) = stream.into_split();
	let mut lines = BufReader::new(reader).lines();

	while let Some(line) = lines.next_line().await? {
		if line.trim().is_empty() {
			continue;
		}
		let response = match serde_json::from_str::<Req>(&line) {
			Ok(request) => handler(request).await,
			Err(e) => {
				tracing::warn!("invalid request: {}", e);
				invalid(format!("invalid request: {}", e))
			}
		};

		let mut data = serde_json::to_vec(&response).map_err(io::Error::other)?;
		data.push(b'\n');
		writer.write_all(&data).await?;
	}
	Ok(())
}
