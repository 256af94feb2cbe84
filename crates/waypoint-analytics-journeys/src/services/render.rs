use waypoint_query::{CompiledQuery, HitStreamRequest, QueryBuilder};

use super::graph::JourneyWalker;
use crate::types::JourneyDirection;

/// Renders the journey walk as a window-function query returning
/// `(step_index, source_page, target_page, weight)`. Per-step pruning and
/// node ids are applied to the result by [`EdgeWeights`](super::EdgeWeights).
pub struct JourneySqlRenderer<'a> {
    table: &'a str,
}

impl<'a> JourneySqlRenderer<'a> {
    pub fn new(table: &'a str) -> Self {
        Self { table }
    }

    pub fn render(&self, walker: &JourneyWalker, request: &HitStreamRequest) -> CompiledQuery {
        let mut builder = QueryBuilder::new();
        let website = builder.bind(request.website_id.as_str());
        let start = builder.bind(request.window.start);
        let end = builder.bind(request.window.end);
        let pageview = builder.bind("pageview");
        let start_page = builder.bind(walker.start_page());
        let horizon = builder.bind(walker.horizon() as i64);

        let (step_index, neighbour) = match walker.direction() {
            JourneyDirection::Forward => ("o.position - a.anchor", "LEAD"),
            JourneyDirection::Backward => ("a.anchor - o.position", "LAG"),
        };

        let sql = format!(
            "WITH ordered AS (\n  \
             SELECT session_id, url_path AS page,\n    \
             ROW_NUMBER() OVER (PARTITION BY session_id ORDER BY occurred_at, seq) AS position\n  \
             FROM {table}\n  \
             WHERE website_id = {website} AND occurred_at >= {start} AND occurred_at <= {end}\n    \
             AND hit_kind = {pageview}\n\
             ),\n\
             anchors AS (\n  \
             SELECT session_id, MIN(position) AS anchor\n  \
             FROM ordered\n  \
             WHERE page = {start_page}\n  \
             GROUP BY session_id\n\
             ),\n\
             walked AS (\n  \
             SELECT o.session_id, {step_index} AS step_index, o.page AS source_page,\n    \
             {neighbour}(o.page) OVER (PARTITION BY o.session_id ORDER BY o.position) AS target_page\n  \
             FROM ordered o\n  \
             JOIN anchors a ON a.session_id = o.session_id\n\
             )\n\
             SELECT step_index, source_page, target_page, COUNT(*) AS weight\n\
             FROM walked\n\
             WHERE step_index >= 0 AND step_index < {horizon}\n  \
             AND target_page IS NOT NULL\n  \
             AND source_page <> target_page\n  \
             AND (step_index = 0 OR (source_page <> {start_page} AND target_page <> {start_page}))\n\
             GROUP BY step_index, source_page, target_page\n\
             ORDER BY step_index, weight DESC, source_page, target_page",
            table = self.table
        );

        builder.finish(sql)
    }
}
