pub mod computer_config;
pub mod log_config;

pub use computer_config::{load_config, ComputerConfig, ComputerConfigBuilder};
pub use log_config::LoggingConfig;
