//! Process-wide `tracing` subscriber.

use tracing_subscriber::EnvFilter;

/// Environment variable holding the log filter, e.g. `HBA_LOG=debug`.
pub const LOG_ENV: &str = "HBA_LOG";

/// Install the fmt subscriber on stderr so command output on stdout stays
/// clean. Safe to call more than once.
pub fn init() {
    let filter = EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
