//! Tracing setup
//!
//! The library only emits `tracing` events; hosts decide where they go.
//! [`init`] is a convenience for binaries and tests:
//!
//! ```ignore
//! relaysync_core::logging::init("relaysync_core=debug");
//! ```
//!
//! `RUST_LOG` overrides the default directive when set.

use tracing_subscriber::EnvFilter;

/// Filter from `RUST_LOG`, falling back to `default_directive`.
pub fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install a global fmt subscriber filtered by [`env_filter`].
///
/// Returns `false` if a global subscriber was already installed.
pub fn init(default_directive: &str) -> bool {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_target(true)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tracing::Level;

    #[test]
    fn test_default_directive_applies_without_rust_log() {
        if std::env::var_os("RUST_LOG").is_some() {
            return;
        }

        let subscriber = tracing_subscriber::fmt()
            .with_env_filter(env_filter("relaysync_core=debug"))
            .with_writer(std::io::sink)
            .finish();

        tracing::subscriber::with_default(subscriber, || {
            assert!(tracing::enabled!(target: "relaysync_core", Level::DEBUG));
            assert!(!tracing::enabled!(target: "relaysync_core", Level::TRACE));
        });
    }
}
