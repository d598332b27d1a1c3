use relay_core::config::LoggingConfig;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Crate-scoped filter for a level shortcut like `debug` or `trace`.
fn scoped_filter(level: &str) -> EnvFilter {
    EnvFilter::new(format!("warn,relay_core={level},server={level},relay_broker={level},relay_worker={level}"))
}

/// Installs the global subscriber.
///
/// `RUST_LOG=debug` and `RUST_LOG=trace` are shortcuts that raise only this workspace's
/// crates; any other `RUST_LOG` value is used as a full filter directive. Without
/// `RUST_LOG` the configured level applies.
pub fn init_logging(config: &LoggingConfig) {
    let filter = match std::env::var("RUST_LOG") {
        Ok(level) if level == "debug" || level == "trace" => scoped_filter(&level),
        Ok(_) => EnvFilter::try_from_env("RUST_LOG").unwrap_or_else(|_| scoped_filter("debug")),
        Err(_) => scoped_filter(&config.level),
    };

    let registry = tracing_subscriber::registry().with(filter);

    if config.format.as_str() == "json" {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_file(true)
                    .with_line_number(true)
                    .with_target(false),
            )
            .init();
    }
}
