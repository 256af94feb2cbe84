use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use waypoint_config::ServerConfig;
use waypoint_core::{fan_out, UtcDateTime};
use waypoint_query::{
    normalize_path, CompiledQuery, HitFilter, HitKind, HitStreamProvider, HitStreamRequest,
    QueryStats, TimeWindow, ValuePattern,
};

use super::graph::{EdgeWeights, JourneyWalker};
use super::render::JourneySqlRenderer;
use crate::types::{JourneyDirection, JourneyError, JourneyGraph};

/// A validated journey request
#[derive(Debug, Clone)]
pub struct JourneyQuery {
    pub website_id: String,
    pub window: TimeWindow,
    /// Normalized start page
    pub start_page: String,
    pub horizon: usize,
    pub limit: usize,
    pub direction: JourneyDirection,
}

impl JourneyQuery {
    pub fn new(
        website_id: impl Into<String>,
        start: UtcDateTime,
        end: UtcDateTime,
        start_url: &str,
        horizon: usize,
        limit: usize,
        direction: JourneyDirection,
    ) -> Result<Self, JourneyError> {
        let window = TimeWindow::new(start, end).ok_or_else(|| {
            JourneyError::Validation(format!(
                "startDate ({}) must not be after endDate ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            ))
        })?;

        let start_url = start_url.trim();
        if start_url.is_empty() {
            return Err(JourneyError::Validation(
                "startUrl must not be empty".to_string(),
            ));
        }
        if horizon == 0 {
            return Err(JourneyError::Validation(
                "steps must be at least 1".to_string(),
            ));
        }
        if limit == 0 {
            return Err(JourneyError::Validation(
                "limit must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            website_id: website_id.into(),
            window,
            start_page: normalize_path(start_url),
            horizon,
            limit,
            direction,
        })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JourneyOutput {
    pub graph: JourneyGraph,
    pub query_stats: Option<QueryStats>,
    pub sql: Option<String>,
    pub sessions_scanned: usize,
}

pub struct JourneyService {
    provider: Option<Arc<dyn HitStreamProvider>>,
    config: Arc<ServerConfig>,
}

impl JourneyService {
    pub fn new(provider: Option<Arc<dyn HitStreamProvider>>, config: Arc<ServerConfig>) -> Self {
        Self { provider, config }
    }

    fn check_bounds(&self, query: &JourneyQuery) -> Result<(), JourneyError> {
        if query.horizon > self.config.max_journey_horizon {
            return Err(JourneyError::Validation(format!(
                "steps must be between 1 and {}, got {}",
                self.config.max_journey_horizon, query.horizon
            )));
        }
        if query.limit > self.config.max_journey_edge_cap {
            return Err(JourneyError::Validation(format!(
                "limit must be between 1 and {}, got {}",
                self.config.max_journey_edge_cap, query.limit
            )));
        }
        Ok(())
    }

    async fn estimate(
        provider: &Arc<dyn HitStreamProvider>,
        query: &CompiledQuery,
    ) -> Option<QueryStats> {
        match provider.estimate(query).await {
            Ok(stats) => Some(stats),
            Err(e) => {
                warn!("Dry run failed, continuing without query stats: {}", e);
                None
            }
        }
    }

    /// Builds the flow graph around `query.start_page`
    pub async fn journey(&self, query: &JourneyQuery) -> Result<JourneyOutput, JourneyError> {
        self.check_bounds(query)?;
        let provider = self
            .provider
            .as_ref()
            .ok_or(JourneyError::ProviderUnavailable)?;
        let started = Instant::now();

        let walker = Arc::new(JourneyWalker::new(
            &query.start_page,
            query.direction,
            query.horizon,
        ));
        let request = HitStreamRequest::new(query.website_id.clone(), query.window)
            .with_kind(HitKind::Pageview)
            .with_anchor(HitFilter::new(
                HitKind::Pageview,
                ValuePattern::Exact(walker.start_page().to_string()),
            ));
        let compiled = JourneySqlRenderer::new(&self.config.hits_table).render(&walker, &request);

        let (query_stats, sessions) = tokio::join!(
            Self::estimate(provider, &compiled),
            provider.fetch_sessions(&request)
        );
        let sessions = sessions?;
        let sessions_scanned = sessions.len();

        let worker_walker = Arc::clone(&walker);
        let partials = fan_out(sessions, self.config.session_chunk_size, move |chunk| {
            let mut weights = EdgeWeights::new();
            for session in &chunk {
                weights.record(worker_walker.walk(&session.hits));
            }
            weights
        })
        .await?;

        let mut weights = EdgeWeights::new();
        for partial in partials {
            weights.merge(partial);
        }
        debug!("Journey from {}: {} distinct transitions", query.start_page, weights.len());

        let graph = weights.into_graph(query.limit);
        info!(
            "Journey for {} from {} ({:?}, horizon {}, limit {}): {} sessions, {} nodes, {} links in {}ms",
            query.website_id,
            query.start_page,
            query.direction,
            query.horizon,
            query.limit,
            sessions_scanned,
            graph.nodes.len(),
            graph.edges.len(),
            started.elapsed().as_millis()
        );

        Ok(JourneyOutput {
            graph,
            query_stats,
            sql: self.config.expose_sql.then(|| compiled.render_inline()),
            sessions_scanned,
        })
    }

    pub fn source_type(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.source_type())
    }
}
