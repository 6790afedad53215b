//! Diagnostic logging through `tracing`.
//!
//! Library code logs with the `tracing` macros; the binary calls [`init`]
//! once at startup. `RUST_LOG` overrides the default filter:
//!
//! ```bash
//! RUST_LOG=abootimg=trace abootimg info boot.img
//! ```
//!
//! Log lines go to stderr so they never mix with extracted output on stdout.

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn default_filter() -> EnvFilter {
    if cfg!(debug_assertions) {
        EnvFilter::new("abootimg=debug")
    } else {
        EnvFilter::new("abootimg=warn")
    }
}

/// Install the global subscriber. Calling it again is a no-op.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let subscriber = tracing_subscriber::registry().with(filter).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_file(false)
            .with_line_number(false)
            .compact(),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
