mod client;
mod logging;
mod protocol;
mod server;

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// Keep a fixed set of programs running and capture their output.
#[derive(Parser, Debug)]
#[command(name = "ramona", version, about)]
struct Cli {
	/// Configuration file
	#[arg(short, long, env = "RAMONA_CONFIG", default_value = "ramona.toml")]
	config: PathBuf,

	/// Log filter, overrides RAMONA_LOG (e.g. "debug", "ramona=trace")
	#[arg(long, global = true)]
	log_level: Option<String>,

	#[command(subcommand)]
	command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
	/// Run the supervisor in the foreground
	Server {
		/// Do not start programs automatically
		#[arg(long)]
		no_start: bool,
	},
	/// Start programs (all stopped programs when no name is given)
	Start { names: Vec<String> },
	/// Stop programs (all live programs when no name is given)
	Stop { names: Vec<String> },
	/// Show the state of every program
	#[command(alias = "st")]
	Status,
	/// Check that the supervisor is answering
	Ping,
	/// Stop every program, then the supervisor
	Shutdown,
}

fn main() -> Result<()> {
	let cli = Cli::parse();
	logging::init(cli.log_level.as_deref());

	let socket = || client::socket_path(&cli.config);
	match cli.command {
		Commands::Server { no_start } => server::run(&cli.config, no_start),
		Commands::Start { names } => client::cmd_start(&socket(), names),
		Commands::Stop { names } => client::cmd_stop(&socket(), names),
		Commands::Status => client::cmd_status(&socket()),
		Commands::Ping => client::cmd_ping(&socket()),
		Commands::Shutdown => client::cmd_shutdown(&socket()),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn cli_parses_commands() {
		let cli = Cli::try_parse_from(["ramona", "-c", "/etc/ramona.toml", "start", "web", "worker"]).unwrap();
		assert_eq!(cli.config, PathBuf::from("/etc/ramona.toml"));
		match cli.command {
			Commands::Start { names } => assert_eq!(names, vec!["web", "worker"]),
			other => panic!("unexpected command {:?}", other),
		}

		let cli = Cli::try_parse_from(["ramona", "server", "--no-start", "--log-level", "debug"]).unwrap();
		assert_eq!(cli.log_level.as_deref(), Some("debug"));
		assert!(matches!(cli.command, Commands::Server { no_start: true }));
	}

	#[test]
	fn cli_requires_a_command() {
		assert!(Cli::try_parse_from(["ramona"]).is_err());
	}
}
