use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Installs a stderr subscriber; stdout is left for command output.
///
/// An unparseable filter falls back to `warn`. Calling this twice is harmless.
pub fn init_logging(filter: &str) {
    let filter = EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new("warn"));

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init();
}
