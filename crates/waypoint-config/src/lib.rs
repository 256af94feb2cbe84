mod service;

pub use service::{ConfigError, ServerConfig, ENV_PREFIX};
