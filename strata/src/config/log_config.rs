use serde::Deserialize;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Deserialize, PartialEq, Clone, serde::Serialize)]
pub struct LoggingConfig {
    pub log_level: String,
}

impl LoggingConfig {
    pub fn get_log_env(&self) -> EnvFilter {
        strata_api::core::utils::logging::get_log_env(self.log_level.clone())
    }

    /// Installs the global subscriber at the configured level
    pub fn init(&self) {
        strata_api::core::utils::logging::init_global_logger(self.log_level.clone())
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".to_string(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use tracing_subscriber::filter::LevelFilter;

    #[test]
    fn filter_follows_the_configured_level() {
        // RUST_LOG takes precedence over the configured level
        if std::env::var("RUST_LOG").is_ok() {
            return;
        }
        let config = LoggingConfig {
            log_level: "WARN".to_string(),
        };
        assert_eq!(config.get_log_env().max_level_hint(), Some(LevelFilter::WARN));
        assert_eq!(
            LoggingConfig::default().get_log_env().max_level_hint(),
            Some(LevelFilter::INFO)
        );
    }
}
