//! Structured logging setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once to install a subscriber.

use tracing_subscriber::EnvFilter;

/// Directive used when `RUST_LOG` is not set.
pub const DEFAULT_DIRECTIVE: &str = "uast_client=warn";

/// Initialize logging to stderr with `RUST_LOG` support.
///
/// Falls back to `default_directive` when `RUST_LOG` is unset or invalid.
/// Stdout stays reserved for command output. Later calls are ignored.
pub fn init_logging(default_directive: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive));

    // try_init so double-init in tests doesn't panic
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init();
}
