use thiserror::Error;

/// Unified error type for hit stream providers
#[derive(Error, Debug)]
pub enum DataError {
    /// Connection failed (authentication, network, etc.)
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Query timeout after {0}ms")]
    QueryTimeout(u64),

    /// Invalid query syntax or parameters
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    /// The provider refused to scan more rows than it is allowed to
    #[error("Resource limit exceeded: scanned more than {limit} rows ({scanned} seen)")]
    ResourceLimitExceeded { scanned: u64, limit: u64 },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl DataError {
    pub fn invalid_configuration(msg: impl Into<String>) -> Self {
        DataError::InvalidConfiguration(msg.into())
    }
}

impl From<sea_orm::DbErr> for DataError {
    fn from(err: sea_orm::DbErr) -> Self {
        match err {
            sea_orm::DbErr::Conn(e) => DataError::ConnectionFailed(e.to_string()),
            other => DataError::QueryFailed(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for DataError {
    fn from(err: serde_json::Error) -> Self {
        DataError::SerializationError(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, DataError>;
