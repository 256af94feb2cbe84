use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use waypoint_config::ServerConfig;
use waypoint_core::{fan_out, UtcDateTime};
use waypoint_query::{
    CompiledQuery, HitKind, HitStreamProvider, HitStreamRequest, QueryStats, SessionHits,
    TimeWindow, ValuePattern,
};

use super::plan::FunnelPlan;
use super::render::{FunnelSqlRenderer, TimingSqlRenderer};
use super::timing::{aggregate, session_records, TimingRecord};
use crate::types::{
    EntryMode, FunnelError, FunnelStepResult, StepDefinition, StepPattern, TimingResult,
};

/// A validated funnel request
#[derive(Debug, Clone)]
pub struct FunnelQuery {
    pub website_id: String,
    pub window: TimeWindow,
    pub mode: EntryMode,
    pub pattern: StepPattern,
}

impl FunnelQuery {
    pub fn new(
        website_id: impl Into<String>,
        start: UtcDateTime,
        end: UtcDateTime,
        only_direct_entry: bool,
        steps: Vec<StepDefinition>,
    ) -> Result<Self, FunnelError> {
        let window = TimeWindow::new(start, end).ok_or_else(|| {
            FunnelError::Validation(format!(
                "startDate ({}) must not be after endDate ({})",
                start.to_rfc3339(),
                end.to_rfc3339()
            ))
        })?;

        Ok(Self {
            website_id: website_id.into(),
            window,
            mode: EntryMode::from_direct_entry(only_direct_entry),
            pattern: StepPattern::new(steps)?,
        })
    }

    fn stream_request(&self) -> HitStreamRequest {
        HitStreamRequest::new(self.website_id.clone(), self.window)
    }
}

/// Result of an analysis with its dry-run and SQL metadata
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisOutput<T> {
    pub data: T,
    pub query_stats: Option<QueryStats>,
    pub sql: Option<String>,
    pub sessions_scanned: usize,
}

pub struct FunnelService {
    provider: Option<Arc<dyn HitStreamProvider>>,
    config: Arc<ServerConfig>,
}

impl FunnelService {
    pub fn new(provider: Option<Arc<dyn HitStreamProvider>>, config: Arc<ServerConfig>) -> Self {
        Self { provider, config }
    }

    fn provider(&self) -> Result<&Arc<dyn HitStreamProvider>, FunnelError> {
        self.provider.as_ref().ok_or(FunnelError::ProviderUnavailable)
    }

    /// Dry run; a failure only costs the cost metadata
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

    fn exposed_sql(&self, query: &CompiledQuery) -> Option<String> {
        self.config.expose_sql.then(|| query.render_inline())
    }

    async fn fetch(
        &self,
        provider: &Arc<dyn HitStreamProvider>,
        request: &HitStreamRequest,
        query: &CompiledQuery,
    ) -> Result<(Vec<SessionHits>, Option<QueryStats>), FunnelError> {
        let (stats, sessions) = tokio::join!(
            Self::estimate(provider, query),
            provider.fetch_sessions(request)
        );
        Ok((sessions?, stats))
    }

    /// Distinct sessions reaching each step
    pub async fn funnel_counts(
        &self,
        query: &FunnelQuery,
    ) -> Result<AnalysisOutput<Vec<FunnelStepResult>>, FunnelError> {
        let started = Instant::now();
        let provider = self.provider()?;

        let plan = Arc::new(FunnelPlan::compile(&query.pattern, query.mode));
        let mut request = query.stream_request();
        request.anchor = plan.entry_filter();
        let compiled = FunnelSqlRenderer::new(&self.config.hits_table).render(&plan, &request);

        let (sessions, query_stats) = self.fetch(provider, &request, &compiled).await?;
        let sessions_scanned = sessions.len();

        let worker_plan = Arc::clone(&plan);
        let partials = fan_out(sessions, self.config.session_chunk_size, move |chunk| {
            worker_plan.count_sessions(chunk.iter().map(|session| session.hits.as_slice()))
        })
        .await?;

        let mut counts = vec![0u64; plan.len()];
        for partial in partials {
            for (total, count) in counts.iter_mut().zip(partial) {
                *total += count;
            }
        }

        let data = step_results(&query.pattern, &counts);
        for step in &data {
            debug!("Funnel step {} '{}': {} sessions", step.step_index, step.value, step.count);
        }
        info!(
            "Funnel counts for {} ({:?}, {} steps): {} sessions in {}ms",
            query.website_id,
            query.mode,
            plan.len(),
            sessions_scanned,
            started.elapsed().as_millis()
        );

        Ok(AnalysisOutput {
            data,
            query_stats,
            sql: self.exposed_sql(&compiled),
            sessions_scanned,
        })
    }

    /// Mean and median time between consecutive steps and overall.
    /// URL steps only.
    pub async fn funnel_timing(
        &self,
        query: &FunnelQuery,
    ) -> Result<AnalysisOutput<Vec<TimingResult>>, FunnelError> {
        if let Some(position) = query.pattern.first_event_step() {
            return Err(FunnelError::Validation(format!(
                "Funnel timing supports URL steps only; step {} is an event step",
                position + 1
            )));
        }

        let started = Instant::now();
        let provider = self.provider()?;

        let steps: Arc<Vec<ValuePattern>> = Arc::new(
            query
                .pattern
                .steps()
                .iter()
                .map(|step| step.pattern.clone())
                .collect(),
        );
        let request = query
            .stream_request()
            .with_kind(HitKind::Pageview)
            .with_anchor(query.pattern.steps()[0].hit_filter());
        let compiled = TimingSqlRenderer::new(&self.config.hits_table).render(&request);

        let (sessions, query_stats) = self.fetch(provider, &request, &compiled).await?;
        let sessions_scanned = sessions.len();

        let mode = query.mode;
        let partials = fan_out(sessions, self.config.session_chunk_size, move |chunk| {
            chunk
                .iter()
                .flat_map(|session| session_records(&session.hits, &steps, mode))
                .collect::<Vec<TimingRecord>>()
        })
        .await?;

        let data = aggregate(partials.into_iter().flatten());
        info!(
            "Funnel timing for {} ({:?}, {} steps): {} sessions, {} rows in {}ms",
            query.website_id,
            query.mode,
            query.pattern.len(),
            sessions_scanned,
            data.len(),
            started.elapsed().as_millis()
        );

        Ok(AnalysisOutput {
            data,
            query_stats,
            sql: self.exposed_sql(&compiled),
            sessions_scanned,
        })
    }

    pub fn source_type(&self) -> Option<&'static str> {
        self.provider.as_ref().map(|p| p.source_type())
    }
}

fn step_results(pattern: &StepPattern, counts: &[u64]) -> Vec<FunnelStepResult> {
    let mut previous: Option<u64> = None;
    pattern
        .steps()
        .iter()
        .zip(counts)
        .enumerate()
        .map(|(step_index, (step, &count))| {
            let conversion_rate = match previous {
                None if count > 0 => 100.0,
                Some(prev) if prev > 0 => count as f64 / prev as f64 * 100.0,
                _ => 0.0,
            };
            let drop_off_rate = if previous.is_some() {
                100.0 - conversion_rate
            } else {
                0.0
            };
            previous = Some(count);

            FunnelStepResult {
                step_index,
                value: step.value.clone(),
                kind: step.kind,
                count,
                conversion_rate,
                drop_off_rate,
            }
        })
        .collect()
}
