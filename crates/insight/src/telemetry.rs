use sentir_config::TelemetryConfig;
use tracing_subscriber::EnvFilter;

/// Install the global fmt subscriber for a host application.
///
/// `RUST_LOG` wins over `log_level`.  Returns `false` when a global
/// subscriber was already installed.
pub fn init_tracing(config: &TelemetryConfig) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .try_init()
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_install_is_harmless() {
        let config = TelemetryConfig::default();
        init_tracing(&config);
        assert!(!init_tracing(&config));
    }
}
