//! Logging initialization

use tracing_subscriber::{fmt, prelude::*, EnvFilter, Registry};

/// Initialize the tracing subscriber.
///
/// `RUST_LOG` wins when set; otherwise the service logs at `info`. JSON
/// formatting is used in production deployments, pretty output in
/// development.
pub fn init_logging(json_format: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    if json_format {
        let fmt_layer = fmt::layer().json().with_current_span(true);
        Registry::default().with(filter).with(fmt_layer).init();
    } else {
        let fmt_layer = fmt::layer().with_target(true);
        Registry::default().with(filter).with(fmt_layer).init();
    }

    tracing::info!("Logging initialized");
}
