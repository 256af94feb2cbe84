//! Fixture-backed provider, used for local runs and tests

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::debug;

use crate::error::{DataError, Result};
use crate::sql::CompiledQuery;
use crate::traits::HitStreamProvider;
use crate::types::{
    HitStreamRequest, NormalizedHit, ProviderLimits, QueryStats, RawHit, SessionHits,
};

#[derive(Debug, Clone)]
struct StoredHit {
    website_id: String,
    hit: NormalizedHit,
}

/// Holds normalized hits in memory and answers requests by scanning them
#[derive(Debug, Clone)]
pub struct InMemoryHitStore {
    hits: Vec<StoredHit>,
    limits: ProviderLimits,
}

impl InMemoryHitStore {
    pub fn new(limits: ProviderLimits) -> Self {
        Self {
            hits: Vec::new(),
            limits,
        }
    }

    /// Adds already normalized hits for `website_id`
    pub fn with_hits(
        mut self,
        website_id: &str,
        hits: impl IntoIterator<Item = NormalizedHit>,
    ) -> Self {
        self.hits.extend(hits.into_iter().map(|hit| StoredHit {
            website_id: website_id.to_string(),
            hit,
        }));
        self
    }

    /// Normalizes raw tracker hits. Hits without an explicit `seq` get their
    /// position in `raw` so arrival order breaks timestamp ties.
    pub fn from_raw(raw: Vec<RawHit>, limits: ProviderLimits) -> Self {
        let total = raw.len();
        let hits: Vec<StoredHit> = raw
            .into_iter()
            .enumerate()
            .filter_map(|(position, raw)| {
                let website_id = raw.website_id.clone();
                raw.normalize(position as u64)
                    .map(|hit| StoredHit { website_id, hit })
            })
            .collect();

        if hits.len() < total {
            debug!("Dropped {} unnamed events while loading hits", total - hits.len());
        }

        Self { hits, limits }
    }

    /// Loads a JSON array of raw hits
    pub async fn from_json_file(path: impl AsRef<Path>, limits: ProviderLimits) -> Result<Self> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await.map_err(|e| {
            DataError::invalid_configuration(format!(
                "cannot read fixture {}: {}",
                path.display(),
                e
            ))
        })?;
        let raw: Vec<RawHit> = serde_json::from_slice(&bytes)?;
        debug!("Loaded {} hits from {}", raw.len(), path.display());
        Ok(Self::from_raw(raw, limits))
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }
}

#[async_trait]
impl HitStreamProvider for InMemoryHitStore {
    fn source_type(&self) -> &'static str {
        "memory"
    }

    fn limits(&self) -> &ProviderLimits {
        &self.limits
    }

    async fn fetch_sessions(&self, request: &HitStreamRequest) -> Result<Vec<SessionHits>> {
        let mut sessions: BTreeMap<&str, Vec<NormalizedHit>> = BTreeMap::new();
        let mut scanned = 0u64;

        for stored in &self.hits {
            if !request.admits(&stored.website_id, &stored.hit) {
                continue;
            }
            scanned += 1;
            if scanned > self.limits.max_rows_scanned {
                return Err(DataError::ResourceLimitExceeded {
                    scanned,
                    limit: self.limits.max_rows_scanned,
                });
            }
            sessions
                .entry(stored.hit.session_id.as_str())
                .or_default()
                .push(stored.hit.clone());
        }

        let sessions: Vec<SessionHits> = sessions
            .into_iter()
            .filter(|(_, hits)| match &request.anchor {
                Some(anchor) => hits.iter().any(|hit| anchor.matches(hit)),
                None => true,
            })
            .map(|(session_id, hits)| SessionHits::new(session_id, hits))
            .collect();

        debug!(
            "In-memory fetch for {}: {} rows, {} sessions",
            request.website_id,
            scanned,
            sessions.len()
        );
        Ok(sessions)
    }

    async fn estimate(&self, _query: &CompiledQuery) -> Result<QueryStats> {
        // A fixture has no planner; every query is a full scan.
        let bytes = self.hits.len() as u64 * self.limits.row_width_bytes;
        Ok(QueryStats::from_bytes(bytes, self.limits.cost_per_tib_usd))
    }
}
