use async_trait::async_trait;

use crate::error::Result;
use crate::sql::CompiledQuery;
use crate::types::{HitStreamRequest, ProviderLimits, QueryStats, SessionHits};

/// Source of session hit streams for one website and time window.
///
/// Implementations enforce their `ProviderLimits` on every fetch and surface
/// breaches as `DataError::ResourceLimitExceeded` or `DataError::QueryTimeout`.
#[async_trait]
pub trait HitStreamProvider: Send + Sync {
    /// Get the type name of this provider
    fn source_type(&self) -> &'static str;

    fn limits(&self) -> &ProviderLimits;

    /// Sessions with at least one in-window hit matching the request, each
    /// ordered by `(timestamp, seq)`. Zero sessions is not an error.
    async fn fetch_sessions(&self, request: &HitStreamRequest) -> Result<Vec<SessionHits>>;

    /// Dry run: expected bytes scanned by `query` and its cost
    async fn estimate(&self, query: &CompiledQuery) -> Result<QueryStats>;
}
