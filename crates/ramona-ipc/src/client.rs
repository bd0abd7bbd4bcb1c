use std::io::{self, BufRead, BufReader, Write};
use std::marker::PhantomData;
use std::os::unix::net::UnixStream;
use std::path::Path;

use serde::{de::DeserializeOwned, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ClientError {
	#[error("supervisor not running (no socket at {0})")]
	NotRunning(String),

	#[error("io error: {0}")]
	Io(#[from] io::Error),

	#[error("failed to encode request: {0}")]
	Encode(serde_json::Error),

	#[error("failed to decode response: {0}")]
	Decode(serde_json::Error),

	#[error("supervisor closed the connection")]
	Closed,
}

/// Blocking client for the control socket.
pub struct ControlClient<Req, Resp> {
	stream: UnixStream,
	reader: BufReader<UnixStream>,
	_phantom: PhantomData<(Req, Resp)>,
}

impl<Req, Resp> ControlClient<Req, Resp>
where
	Req: Serialize,
	Resp: DeserializeOwned,
{
	pub fn connect(socket: &Path) -> Result<Self, ClientError> {
		let stream =
			UnixStream::connect(socket).map_err(|_| ClientError::NotRunning(socket.display().to_string()))?;
		let reader = BufReader::new(stream.try_clone()?);
		Ok(Self {
			stream,
			reader,
			_phantom: PhantomData,
		})
	}

	/// Send one request and wait for its response.
	pub fn send(&mut self, request: &Req) -> Result<Resp, ClientError> {
		let mut data = serde_json::to_vec(request).map_err(ClientError::Encode)?;
		data.push(b'\n');
		self.stream.write_all(&data)?;

		let mut line = String::new();
		if self.reader.read_line(&mut line)? == 0 {
			return Err(ClientError::Closed);
		}
		serde_json::from_str(&line).map_err(ClientError::Decode)
	}
}

/// Whether something is accepting connections on `socket`.
pub fn is_running(socket: &Path) -> bool {
	UnixStream::connect(socket).is_ok()
}
