use anyhow::Result;
use calrissian_config::domains::logging::{LogFormat, LoggingConfig};
use tracing_subscriber::EnvFilter;

/// Build the filter for a configuration.
///
/// `RUST_LOG` wins when set, otherwise the configured level plus any extra
/// directives is used.
pub fn build_env_filter(config: &LoggingConfig) -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }

    let mut directives = config.level.as_str().to_string();
    if let Some(extra) = &config.filter {
        directives.push(',');
        directives.push_str(extra);
    }

    EnvFilter::try_new(&directives).unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize logging from configuration
pub fn init_logging_from_config(config: &LoggingConfig) -> Result<()> {
    let env_filter = build_env_filter(config);
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .with_target(config.include_target)
        .with_file(config.include_location)
        .with_line_number(config.include_location);

    // try_init so a second initialisation (tests, embedding) is not fatal
    let result = match config.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Text => builder.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Global tracing subscriber already initialized, skipping");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_double_initialisation_is_not_fatal() {
        let config = LoggingConfig::default();
        assert!(init_logging_from_config(&config).is_ok());
        assert!(init_logging_from_config(&config).is_ok());
    }
}
