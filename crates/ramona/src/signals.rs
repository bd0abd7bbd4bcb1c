use std::str::FromStr;

use nix::sys::signal::Signal;

use crate::error::{Error, Result};

pub const DEFAULT_STOP_SIGNALS: &str = "INT,TERM,KILL";

/// Parse a comma separated signal list such as `"INT,TERM,KILL"`.
///
/// Names are case-insensitive with or without the `SIG` prefix; decimal
/// signal numbers are accepted too. An empty list yields `[SIGTERM]`.
pub fn parse_signals(list: &str) -> Result<Vec<Signal>> {
	let mut signals = Vec::new();
	for item in list.split(',') {
		let item = item.trim();
		if item.is_empty() {
			continue;
		}
		signals.push(parse_signal(item)?);
	}
	if signals.is_empty() {
		signals.push(Signal::SIGTERM);
	}
	Ok(signals)
}

pub fn parse_signal(name: &str) -> Result<Signal> {
	if let Ok(num) = name.parse::<i32>() {
		return Signal::try_from(num).map_err(|_| Error::UnknownSignal(name.to_string()));
	}
	let upper = name.to_ascii_uppercase();
	let full = if upper.starts_with("SIG") {
		upper
	} else {
		format!("SIG{}", upper)
	};
	Signal::from_str(&full).map_err(|_| Error::UnknownSignal(name.to_string()))
}

/// Escalation cursor over the configured stop signals.
///
/// Once the configured signals are used up every further step yields
/// `SIGKILL`.
#[derive(Debug, Clone)]
pub struct StopSequence {
	signals: Vec<Signal>,
	cursor: usize,
}

impl StopSequence {
	pub fn new(signals: Vec<Signal>) -> Self {
		Self { signals, cursor: 0 }
	}

	pub fn reset(&mut self) {
		self.cursor = 0;
	}

	pub fn next_signal(&mut self) -> Signal {
		match self.signals.get(self.cursor) {
			Some(&signal) => {
				self.cursor += 1;
				signal
			}
			None => Signal::SIGKILL,
		}
	}

	pub fn remaining(&self) -> &[Signal] {
		&self.signals[self.cursor.min(self.signals.len())..]
	}
}
