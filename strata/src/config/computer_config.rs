use crate::config::log_config::LoggingConfig;
use config::{Config, ConfigError, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub const DEFAULT_WRITE_BATCH_SIZE: usize = 10_000;

#[derive(Debug, Deserialize, PartialEq, Clone, Serialize)]
pub struct ComputerConfig {
    /// Number of worker threads per phase
    pub workers: usize,
    /// Maximum number of elements written per write-back transaction
    pub write_batch_size: usize,
    /// Number of vertices handed to a worker at once, ten times the write batch size if unset
    pub read_batch_size: Option<usize>,
    pub logging: LoggingConfig,
}

impl Default for ComputerConfig {
    fn default() -> Self {
        Self {
            workers: 1,
            write_batch_size: DEFAULT_WRITE_BATCH_SIZE,
            read_batch_size: None,
            logging: LoggingConfig::default(),
        }
    }
}

impl ComputerConfig {
    pub fn read_batch_size(&self) -> usize {
        self.read_batch_size
            .unwrap_or_else(|| self.write_batch_size.saturating_mul(10))
    }
}

pub struct ComputerConfigBuilder {
    workers: usize,
    write_batch_size: usize,
    read_batch_size: Option<usize>,
    logging: LoggingConfig,
}

impl From<ComputerConfig> for ComputerConfigBuilder {
    fn from(config: ComputerConfig) -> Self {
        Self {
            workers: config.workers,
            write_batch_size: config.write_batch_size,
            read_batch_size: config.read_batch_size,
            logging: config.logging,
        }
    }
}

impl Default for ComputerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ComputerConfigBuilder {
    pub fn new() -> Self {
        ComputerConfig::default().into()
    }

    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    pub fn with_write_batch_size(mut self, write_batch_size: usize) -> Self {
        self.write_batch_size = write_batch_size;
        self
    }

    pub fn with_read_batch_size(mut self, read_batch_size: usize) -> Self {
        self.read_batch_size = Some(read_batch_size);
        self
    }

    pub fn with_log_level(mut self, log_level: String) -> Self {
        self.logging.log_level = log_level;
        self
    }

    pub fn build(self) -> ComputerConfig {
        ComputerConfig {
            workers: self.workers,
            write_batch_size: self.write_batch_size,
            read_batch_size: self.read_batch_size,
            logging: self.logging,
        }
    }
}

// The supplied config (or the default one) is the base layer, values from the config file
// override it.
pub fn load_config(
    computer_config: Option<ComputerConfig>,
    config_path: Option<PathBuf>,
) -> Result<ComputerConfig, ConfigError> {
    let computer_config = computer_config.unwrap_or_default();
    let json =
        serde_json::to_string(&computer_config).map_err(|e| ConfigError::Foreign(Box::new(e)))?;
    let mut builder = Config::builder().add_source(File::from_str(&json, FileFormat::Json));
    if let Some(config_path) = config_path {
        builder = builder.add_source(File::from(config_path));
    }
    let config = builder.build()?.try_deserialize::<ComputerConfig>()?;
    if config.workers == 0 {
        return Err(ConfigError::Message("workers must be positive".to_string()));
    }
    if config.write_batch_size == 0 || config.read_batch_size == Some(0) {
        return Err(ConfigError::Message(
            "batch sizes must be positive".to_string(),
        ));
    }
    Ok(config)
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults() {
        let config = load_config(None, None).unwrap();
        assert_eq!(config, ComputerConfig::default());
        assert_eq!(config.read_batch_size(), 10 * DEFAULT_WRITE_BATCH_SIZE);
    }

    #[test]
    fn builder_values_survive_loading() {
        let config = ComputerConfigBuilder::new()
            .with_workers(4)
            .with_write_batch_size(10)
            .with_log_level("DEBUG".to_string())
            .build();
        let loaded = load_config(Some(config.clone()), None).unwrap();
        assert_eq!(loaded, config);
        assert_eq!(loaded.read_batch_size(), 100);
    }

    #[test]
    fn file_overrides_base_config() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "workers = 8\nread_batch_size = 7\n[logging]\nlog_level = \"WARN\""
        )
        .unwrap();
        let config = load_config(None, Some(file.path().to_path_buf())).unwrap();
        assert_eq!(config.workers, 8);
        assert_eq!(config.read_batch_size(), 7);
        assert_eq!(config.write_batch_size, DEFAULT_WRITE_BATCH_SIZE);
        assert_eq!(config.logging.log_level, "WARN");
    }

    #[test]
    fn zero_batch_size_is_rejected() {
        let config = ComputerConfigBuilder::new().with_write_batch_size(0).build();
        assert!(load_config(Some(config), None).is_err());
    }
}
