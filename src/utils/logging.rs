use tracing_subscriber::EnvFilter;

/// Initialize tracing/logging for the application.
///
/// `RUST_LOG` takes precedence over `default_level`. `format` selects between
/// human readable lines (`text`) and JSON lines (`json`).
pub fn init(default_level: &str, format: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level.to_lowercase()));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false);

    // try_init so tests can call this repeatedly without panicking
    let _ = match format {
        "json" => builder.json().try_init(),
        _ => builder.try_init(),
    };
}
