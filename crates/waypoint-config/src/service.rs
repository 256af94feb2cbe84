use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use waypoint_query::{validate_table_name, ProviderLimits};

/// Environment variables `WAYPOINT_<FIELD>` override file values
pub const ENV_PREFIX: &str = "WAYPOINT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {details}")]
    InvalidConfiguration { details: String },
}

impl ConfigError {
    fn invalid(details: impl Into<String>) -> Self {
        ConfigError::InvalidConfiguration {
            details: details.into(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub address: String,

    // Hit stream source; a fixture wins over a database
    pub database_url: Option<String>,
    pub fixture_path: Option<PathBuf>,
    pub hits_table: String,

    // Provider limits
    pub max_rows_scanned: u64,
    pub query_timeout_secs: u64,
    pub row_width_bytes: u64,
    pub cost_per_tib_usd: f64,

    // Analysis
    pub session_chunk_size: usize,
    pub expose_sql: bool,
    pub max_journey_horizon: usize,
    pub max_journey_edge_cap: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            database_url: None,
            fixture_path: None,
            hits_table: "hits".to_string(),
            max_rows_scanned: 5_000_000,
            query_timeout_secs: 60,
            row_width_bytes: 256,
            cost_per_tib_usd: 6.25,
            session_chunk_size: 2048,
            expose_sql: true,
            max_journey_horizon: 15,
            max_journey_edge_cap: 100,
        }
    }
}

impl ServerConfig {
    /// Defaults, then the optional TOML file, then `WAYPOINT_*` variables
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(file, None)
    }

    /// Like [`ServerConfig::load`], reading the environment from `env`
    /// instead of the process when given.
    pub fn load_with_env(
        file: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let mut builder = Config::builder()
            .set_default("address", defaults.address)?
            .set_default("hits_table", defaults.hits_table)?
            .set_default("max_rows_scanned", defaults.max_rows_scanned)?
            .set_default("query_timeout_secs", defaults.query_timeout_secs)?
            .set_default("row_width_bytes", defaults.row_width_bytes)?
            .set_default("cost_per_tib_usd", defaults.cost_per_tib_usd)?
            .set_default("session_chunk_size", defaults.session_chunk_size as u64)?
            .set_default("expose_sql", defaults.expose_sql)?
            .set_default("max_journey_horizon", defaults.max_journey_horizon as u64)?
            .set_default("max_journey_edge_cap", defaults.max_journey_edge_cap as u64)?;

        if let Some(path) = file {
            debug!("Loading configuration file {}", path.display());
            builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .try_parsing(true)
                .source(env),
        );

        let config: ServerConfig = builder.build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.socket_addr()?;
        validate_table_name(&self.hits_table).map_err(|e| ConfigError::invalid(e.to_string()))?;

        let positive = [
            ("max_rows_scanned", self.max_rows_scanned),
            ("query_timeout_secs", self.query_timeout_secs),
            ("row_width_bytes", self.row_width_bytes),
            ("session_chunk_size", self.session_chunk_size as u64),
            ("max_journey_horizon", self.max_journey_horizon as u64),
            ("max_journey_edge_cap", self.max_journey_edge_cap as u64),
        ];
        if let Some((name, _)) = positive.iter().find(|(_, value)| *value == 0) {
            return Err(ConfigError::invalid(format!("{name} must be greater than zero")));
        }

        if !self.cost_per_tib_usd.is_finite() || self.cost_per_tib_usd < 0.0 {
            return Err(ConfigError::invalid(
                "cost_per_tib_usd must be a non-negative number",
            ));
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.address
            .parse()
            .map_err(|_| {
                ConfigError::invalid(format!("'{}' is not a socket address", self.address))
            })
    }

    pub fn provider_limits(&self) -> ProviderLimits {
        ProviderLimits {
            hits_table: self.hits_table.clone(),
            max_rows_scanned: self.max_rows_scanned,
            query_timeout: Duration::from_secs(self.query_timeout_secs),
            row_width_bytes: self.row_width_bytes,
            cost_per_tib_usd: self.cost_per_tib_usd,
        }
    }
}
