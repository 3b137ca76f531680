//! Logging setup for library consumers and tools

/// Initialize env_logger with an `info` default filter.
///
/// The `RUST_LOG` environment variable overrides the default. Call once
/// at startup; binaries that want timestamps or a custom target build
/// their own `env_logger::Builder` instead.
///
/// # Example
/// ```no_run
/// brickvol::core::logging::init();
/// log::info!("bricking session started");
/// ```
pub fn init() {
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or("info"),
    )
    .init();
}
