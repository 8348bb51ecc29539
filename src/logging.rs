use crate::constants::{DEFAULT_LOG_DIRECTIVE, LOG_DIR, LOG_FILE_PREFIX};
use std::fs;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Console output plus a daily-rotated JSON log under `logs/`. `RUST_LOG` overrides the
/// default `caching_proxy=info` filter.
pub fn init_logging() {
    let _ = fs::create_dir_all(LOG_DIR);

    let (json_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(LOG_DIR, LOG_FILE_PREFIX));

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_DIRECTIVE));

    // A second call (tests, embedding) keeps the first subscriber.
    let installed = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(json_writer))
        .with(fmt::layer().with_target(false).with_writer(std::io::stdout))
        .try_init()
        .is_ok();

    if installed {
        // Flushes the file writer on drop, so it lives as long as the process.
        std::mem::forget(guard);
    }
}
