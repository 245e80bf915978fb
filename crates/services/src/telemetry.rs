use callqi_config::LoggingSettings;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};

/// Builds the filter from `RUST_LOG`, falling back to the configured directive.
pub fn env_filter(settings: &LoggingSettings) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&settings.filter))
}

/// Installs the global subscriber. Fails if one is already installed.
pub fn init_tracing(settings: &LoggingSettings) -> Result<(), TryInitError> {
    let registry = tracing_subscriber::registry().with(env_filter(settings));
    if settings.json {
        registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init()
    } else {
        registry.with(tracing_subscriber::fmt::layer()).try_init()
    }
}
