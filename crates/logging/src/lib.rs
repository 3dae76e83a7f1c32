//! Log initialisation shared by the `dsync` and `dsyncd` binaries.
//!
//! Both processes narrate every decision they take (operation chosen, server
//! reply, byte counts, dropped events) as structured text on standard output.
//! The core crates emit through the `tracing` macros; this crate owns the one
//! place where a subscriber is installed and where a numeric `-v` count is
//! mapped onto a filter level.
//!
//! The mapping is deliberately small:
//!
//! | verbosity | filter  |
//! |-----------|---------|
//! | 0         | `info`  |
//! | 1         | `debug` |
//! | 2+        | `trace` |
//!
//! An explicit `RUST_LOG` in the environment always wins over the verbosity
//! flag so ad-hoc debugging does not require a rebuild.

use tracing_subscriber::EnvFilter;

/// Returns the default filter directive for a `-v` occurrence count.
#[must_use]
pub fn default_directive(verbosity: u8) -> &'static str {
    match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    }
}

/// Installs the process-wide subscriber.
///
/// Output goes to stdout without timestamps or module targets; the replicator
/// log is meant to be read as a transfer journal, not correlated with other
/// services. Calling this more than once is harmless: later calls leave the
/// first subscriber in place.
pub fn init(verbosity: u8) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbosity)));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .without_time()
        .with_writer(std::io::stdout)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_maps_to_expected_levels() {
        assert_eq!(default_directive(0), "info");
        assert_eq!(default_directive(1), "debug");
        assert_eq!(default_directive(2), "trace");
        assert_eq!(default_directive(200), "trace");
    }

    #[test]
    fn init_is_idempotent() {
        init(0);
        init(2);
    }
}
