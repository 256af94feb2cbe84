//! Warehouse provider reading a Postgres hits table through sea-orm

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, FromQueryResult, Statement};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, error};
use waypoint_core::UtcDateTime;

use crate::error::{DataError, Result};
use crate::sql::{validate_table_name, CompiledQuery, QueryBuilder};
use crate::traits::HitStreamProvider;
use crate::types::{
    stringify_params, HitFilter, HitKind, HitStreamRequest, NormalizedHit, ProviderLimits,
    QueryStats, SessionHits,
};

/// Reads hits from a table with the columns
/// `session_id, website_id, occurred_at, seq, hit_kind, url_path, event_name,
/// page_path, params`.
pub struct PostgresHitStream {
    db: Arc<DatabaseConnection>,
    limits: ProviderLimits,
}

#[derive(Debug, FromQueryResult)]
struct HitRow {
    session_id: String,
    occurred_at: UtcDateTime,
    seq: i64,
    hit_kind: String,
    url_path: Option<String>,
    event_name: Option<String>,
    page_path: Option<String>,
    params: Option<serde_json::Value>,
}

impl HitRow {
    fn into_hit(self) -> Option<NormalizedHit> {
        let seq = u64::try_from(self.seq).unwrap_or_default();
        let hit = match HitKind::parse(&self.hit_kind)? {
            HitKind::Pageview => NormalizedHit::pageview(
                self.session_id,
                self.occurred_at,
                seq,
                self.url_path.as_deref().unwrap_or("/"),
            ),
            HitKind::Event => NormalizedHit::event(
                self.session_id,
                self.occurred_at,
                seq,
                self.event_name.filter(|name| !name.is_empty())?,
                self.page_path.as_deref().unwrap_or("/"),
            ),
        };

        let params = match self.params {
            Some(serde_json::Value::Object(map)) => stringify_params(map.into_iter().collect()),
            _ => BTreeMap::new(),
        };

        Some(NormalizedHit { params, ..hit })
    }
}

impl PostgresHitStream {
    pub fn new(db: Arc<DatabaseConnection>, limits: ProviderLimits) -> Result<Self> {
        validate_table_name(&limits.hits_table)?;
        Ok(Self { db, limits })
    }

    /// The fetch statement for `request`, bounded to `max_rows_scanned + 1`
    /// rows so an overflow can be detected.
    pub fn compile_fetch(&self, request: &HitStreamRequest) -> CompiledQuery {
        let table = &self.limits.hits_table;
        let mut builder = QueryBuilder::new();
        let website = builder.bind(request.website_id.as_str());
        let start = builder.bind(request.window.start);
        let end = builder.bind(request.window.end);

        let scope = format!(
            "website_id = {website} AND occurred_at >= {start} AND occurred_at <= {end}"
        );
        let mut conditions = vec![scope.clone()];

        if let Some(kind) = request.kind {
            conditions.push(format!("hit_kind = {}", builder.bind(kind.as_str())));
        }

        if let Some(anchor) = &request.anchor {
            let anchor_condition = filter_condition(anchor, &mut builder);
            conditions.push(format!(
                "session_id IN (SELECT session_id FROM {table} WHERE {scope} AND {anchor_condition})"
            ));
        }

        let limit =
            i64::try_from(self.limits.max_rows_scanned.saturating_add(1)).unwrap_or(i64::MAX);
        let limit = builder.bind(limit);

        let sql = format!(
            "SELECT session_id, occurred_at, seq, hit_kind, url_path, event_name, page_path, params \
             FROM {table} WHERE {} ORDER BY session_id, occurred_at, seq LIMIT {limit}",
            conditions.join(" AND ")
        );
        builder.finish(sql)
    }

    fn statement(query: &CompiledQuery, prefix: &str) -> Statement {
        Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            format!("{prefix}{}", query.sql),
            query.params.iter().cloned().map(sea_orm::Value::from),
        )
    }
}

/// Predicate for a single hit: kind plus exact or `LIKE` match on the
/// path/name column.
pub fn filter_condition(filter: &HitFilter, builder: &mut QueryBuilder) -> String {
    let column = match filter.kind {
        HitKind::Pageview => "url_path",
        HitKind::Event => "event_name",
    };
    let kind = builder.bind(filter.kind.as_str());
    let value = match filter.pattern.like_pattern() {
        Some(like) => format!("{column} LIKE {}", builder.bind(like)),
        None => format!("{column} = {}", builder.bind(filter.pattern.to_string())),
    };
    format!("hit_kind = {kind} AND {value}")
}

#[async_trait]
impl HitStreamProvider for PostgresHitStream {
    fn source_type(&self) -> &'static str {
        "postgres"
    }

    fn limits(&self) -> &ProviderLimits {
        &self.limits
    }

    async fn fetch_sessions(&self, request: &HitStreamRequest) -> Result<Vec<SessionHits>> {
        let query = self.compile_fetch(request);
        debug!("Hit stream fetch: {}", query.sql);

        let timeout = self.limits.query_timeout;
        let rows = tokio::time::timeout(
            timeout,
            HitRow::find_by_statement(Self::statement(&query, "")).all(self.db.as_ref()),
        )
        .await
        .map_err(|_| DataError::QueryTimeout(timeout.as_millis() as u64))?
        .map_err(|e| {
            error!("Hit stream fetch failed: {}", e);
            DataError::from(e)
        })?;

        let scanned = rows.len() as u64;
        if scanned > self.limits.max_rows_scanned {
            return Err(DataError::ResourceLimitExceeded {
                scanned,
                limit: self.limits.max_rows_scanned,
            });
        }

        // Rows arrive ordered by session, so grouping is a single pass
        let mut sessions: Vec<SessionHits> = Vec::new();
        let mut current: Option<(String, Vec<NormalizedHit>)> = None;
        for hit in rows.into_iter().filter_map(HitRow::into_hit) {
            match &mut current {
                Some((session_id, hits)) if *session_id == hit.session_id => hits.push(hit),
                _ => {
                    if let Some((session_id, hits)) = current.take() {
                        sessions.push(SessionHits::new(session_id, hits));
                    }
                    current = Some((hit.session_id.clone(), vec![hit]));
                }
            }
        }
        if let Some((session_id, hits)) = current {
            sessions.push(SessionHits::new(session_id, hits));
        }

        debug!(
            "Postgres fetch for {}: {} rows, {} sessions",
            request.website_id,
            scanned,
            sessions.len()
        );
        Ok(sessions)
    }

    async fn estimate(&self, query: &CompiledQuery) -> Result<QueryStats> {
        let row = self
            .db
            .query_one(Self::statement(query, "EXPLAIN (FORMAT JSON) "))
            .await?
            .ok_or_else(|| DataError::QueryFailed("EXPLAIN returned no rows".to_string()))?;

        let plan: serde_json::Value = row.try_get("", "QUERY PLAN")?;
        let bytes = plan_bytes(&plan).ok_or_else(|| {
            DataError::SerializationError("EXPLAIN output has no Plan Rows/Plan Width".to_string())
        })?;

        Ok(QueryStats::from_bytes(bytes, self.limits.cost_per_tib_usd))
    }
}

/// `Plan Rows × Plan Width` of the top plan node
fn plan_bytes(plan: &serde_json::Value) -> Option<u64> {
    let node = plan.get(0)?.get("Plan")?;
    let rows = node.get("Plan Rows")?.as_f64()?;
    let width = node.get("Plan Width")?.as_f64()?;
    Some((rows.max(0.0) * width.max(0.0)) as u64)
}
