use tracing_subscriber::EnvFilter;

pub const LOG_ENV: &str = "RAMONA_LOG";

/// Install the stderr subscriber. An explicit level wins over `RAMONA_LOG`.
pub fn init(level: Option<&str>) {
	let filter = match level {
		Some(level) => EnvFilter::new(level),
		None => EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info")),
	};

	tracing_subscriber::fmt()
		.with_env_filter(filter)
		.with_writer(std::io::stderr)
		.with_target(false)
		.init();
}
