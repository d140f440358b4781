use tracing_subscriber::filter::ParseError;
use tracing_subscriber::EnvFilter;

use crate::config::{LogFormat, TelemetryConfig};

#[derive(Debug, thiserror::Error)]
pub enum TelemetryError {
    #[error("invalid log filter '{directives}'")]
    Filter {
        directives: String,
        #[source]
        source: ParseError,
    },
    #[error("could not install the tracing subscriber: {0}")]
    Install(#[source] Box<dyn std::error::Error + Send + Sync>),
}

/// `RUST_LOG` wins over the configured directives when it is set and valid.
pub fn filter(config: &TelemetryConfig) -> Result<EnvFilter, TelemetryError> {
    if let Ok(from_env) = EnvFilter::try_from_default_env() {
        return Ok(from_env);
    }
    EnvFilter::try_new(&config.log_level).map_err(|source| TelemetryError::Filter {
        directives: config.log_level.clone(),
        source,
    })
}

pub fn init(config: &TelemetryConfig) -> Result<(), TelemetryError> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter(config)?)
        .with_ansi(false);

    match config.log_format {
        LogFormat::Compact => builder.with_target(false).compact().try_init(),
        LogFormat::Full => builder.with_thread_names(true).try_init(),
    }
    .map_err(TelemetryError::Install)
}
