use tengwar_core::config::LoggingConfig;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// Install the global subscriber. `RUST_LOG` wins over the configured level.
///
/// Keep the returned guard alive for the life of the process or buffered
/// file output is lost.
pub fn init(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);

    match &config.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "tengwar.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            if config.json {
                builder.json().with_writer(writer).init();
            } else {
                builder.with_ansi(false).with_writer(writer).init();
            }
            Some(guard)
        }
        None => {
            if config.json {
                builder.json().with_writer(std::io::stderr).init();
            } else {
                builder.with_writer(std::io::stderr).init();
            }
            None
        }
    }
}
