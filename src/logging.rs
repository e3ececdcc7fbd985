use tracing_subscriber::{fmt, EnvFilter};

const DEFAULT_FILTER: &str = "homework_dashboard=info,warn";

/// Installs the global subscriber. `RUST_LOG` overrides the default
/// filter. Output goes to stderr so it never mixes with rendered frames.
pub fn init() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_line_number(true)
        .init();
}

#[cfg(test)]
pub fn init_test() {
    let _ = fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}
