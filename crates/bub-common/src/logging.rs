//! Logging setup for the `bub` binary.
//!
//! Library crates only emit `tracing` events; this module is the one place
//! that decides how they're rendered, mirroring the teacher's `init_log` in
//! spirit (single `init` call at the top of `main`, level controlled by an
//! environment variable) but built on `tracing-subscriber` instead of
//! `env_logger`.

use tracing_subscriber::EnvFilter;

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG` controls verbosity as usual (`RUST_LOG=bub_core=debug`). When
/// unset, `verbose` picks a reasonable default: `info` normally, `debug` under
/// `-v`/`--verbose`.
pub fn init(verbose: bool) {
    let default_directive = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .without_time()
        .init();
}
