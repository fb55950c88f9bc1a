//! Logging setup.
//!
//! Everything goes to stderr; stdout belongs to the guest program.

use std::io::IsTerminal;

use tracing_subscriber::EnvFilter;

/// Full filter directive, e.g. `script_jail=trace`.
pub const LOG_ENV: &str = "SCRIPT_JAIL_LOG";

/// Set to any value for debug output.
pub const DEBUG_ENV: &str = "SCRIPT_JAIL_DEBUG";

fn default_directive(debug_enabled: bool) -> &'static str {
    if debug_enabled {
        "script_jail=debug"
    } else {
        "script_jail=warn"
    }
}

/// Install the global subscriber. Later calls are no-ops.
pub fn init_logging() {
    let debug_enabled = std::env::var_os(DEBUG_ENV).is_some();

    let filter = EnvFilter::try_from_env(LOG_ENV)
        .unwrap_or_else(|_| EnvFilter::new(default_directive(debug_enabled)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(debug_enabled)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init()
        .ok();
}
