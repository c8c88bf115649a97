//! Feature-gated tracing support.
//!
//! With the `tracing` feature enabled this re-exports the macros the
//! engine instruments itself with; every call site is itself gated on
//! the feature, so the default build carries zero overhead.

#[cfg(feature = "tracing")]
pub use tracing::{debug, info, trace, warn};

/// Install a stderr subscriber honoring env-filter directives
/// (`RUST_LOG`-style). Safe to call more than once.
#[cfg(feature = "tracing")]
pub fn init_subscriber() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_ansi(false),
        )
        .with(filter)
        .try_init()
        .ok();
}

#[cfg(not(feature = "tracing"))]
pub fn init_subscriber() {}
