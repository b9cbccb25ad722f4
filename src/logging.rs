//! Logging initialization
//!
//! Log output goes to stderr so it never mixes with command output. The
//! filter is picked in this order:
//!
//! 1. `RUST_LOG`
//! 2. the filter passed in (from `--verbose` or `log.filter` in the config)
//! 3. `warn`
//!
//! Colors are disabled when `NO_COLOR` is set.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub const DEFAULT_FILTER: &str = "warn";

/// Install the global subscriber. Calling it again is a no-op.
pub fn init_logging(filter: Option<&str>) {
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(_) => EnvFilter::from_default_env(),
        Err(_) => EnvFilter::new(filter.unwrap_or(DEFAULT_FILTER)),
    };

    let _ = tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .with_ansi(std::env::var_os("NO_COLOR").is_none()),
        )
        .with(env_filter)
        .try_init();
}
