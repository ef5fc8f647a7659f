use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};

/// Install the global tracing subscriber.
///
/// `filter` uses `EnvFilter` directive syntax (`stocktake=debug,sqlx=warn`).
/// Records emitted through the `log` facade (sqlx uses it) are bridged in.
/// Calling this more than once is harmless; later calls keep the first
/// subscriber.
pub fn init(filter: &str, json: bool) {
    let _ = tracing_log::LogTracer::init();

    let env_filter = EnvFilter::try_new(filter).unwrap_or_else(|err| {
        eprintln!("invalid log filter {filter:?}: {err}; falling back to defaults");
        EnvFilter::new(crate::config::DEFAULT_LOG_FILTER)
    });

    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_timer(UtcTime::rfc_3339());

    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
