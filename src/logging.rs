use crate::cli::LogLevel;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Install the stderr subscriber. Stdout is reserved for the report.
pub(crate) fn setup_logging(level: LogLevel) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(level)));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true),
        )
        .init();
}

fn default_directives(level: LogLevel) -> String {
    format!("warn,pg_probe={level}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directives() {
        assert_eq!(default_directives(LogLevel::Warn), "warn,pg_probe=warn");
        assert_eq!(default_directives(LogLevel::Debug), "warn,pg_probe=debug");
    }

    #[test]
    fn test_default_directives_parse() {
        for level in [LogLevel::Trace, LogLevel::Info, LogLevel::Error] {
            assert!(default_directives(level).parse::<EnvFilter>().is_ok());
        }
    }
}
