use std::str::FromStr;
use tracing_subscriber::EnvFilter;

/// Initialize console logging. `RUST_LOG` takes precedence; otherwise the
/// debug flag selects between `debug` and `info`.
pub fn init(debug: bool) {
    let default_level = if debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::from_str(default_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
