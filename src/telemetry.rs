//! Telemetry initialization (tracing/tracing-subscriber).
//!
//! LOG_LEVEL takes a full filter directive string; the default tunes the
//! `game` and `import` targets to debug. LOG_FORMAT switches the output
//! between "pretty" (default) and "json". Targets, files and line numbers
//! are kept in the output to disambiguate sources; the tower-http
//! TraceLayer adds per-request spans on top of this.

use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str =
    "info,game=debug,import=debug,chemroll_backend=debug,tower_http=info,axum=info";

pub fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(true)
        .with_line_number(true);

    // The two formats build distinct subscriber types, so init happens per
    // arm instead of through a stored layer.
    if matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json")) {
        builder.json().init();
    } else {
        builder.init();
    }
}
