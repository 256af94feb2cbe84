//! Rendering of funnel plans to Postgres SQL

use waypoint_query::{filter_condition, CompiledQuery, HitKind, HitStreamRequest, QueryBuilder};

use super::plan::{FunnelPlan, HitPredicate, PlanStage};
use crate::types::ParamOperator;

/// Column names a predicate is rendered against
struct Columns {
    kind: &'static str,
    url: &'static str,
    event: &'static str,
    params: &'static str,
}

const CURRENT: Columns = Columns {
    kind: "h.hit_kind",
    url: "h.url_path",
    event: "h.event_name",
    params: "h.params",
};

const PRECEDING: Columns = Columns {
    kind: "h.prev_kind",
    url: "h.prev_url",
    event: "h.prev_event",
    params: "h.prev_params",
};

fn render_predicate(
    predicate: &HitPredicate,
    columns: &Columns,
    builder: &mut QueryBuilder,
) -> String {
    let column = match predicate.kind {
        HitKind::Pageview => columns.url,
        HitKind::Event => columns.event,
    };

    let mut parts = vec![format!("{} = {}", columns.kind, builder.bind(predicate.kind.as_str()))];
    parts.push(match predicate.pattern.like_pattern() {
        Some(like) => format!("{column} LIKE {}", builder.bind(like)),
        None => format!("{column} = {}", builder.bind(predicate.pattern.to_string())),
    });

    for filter in &predicate.param_filters {
        let key = builder.bind(filter.key.as_str());
        let value = builder.bind(filter.value.as_str());
        parts.push(match filter.operator {
            ParamOperator::Equals => format!("{} ->> {key} = {value}", columns.params),
            ParamOperator::Contains => {
                format!("strpos({} ->> {key}, {value}) > 0", columns.params)
            }
        });
    }

    parts.join(" AND ")
}

/// Renders a [`FunnelPlan`] to one CTE per stage over a windowed scan of
/// the hits table, followed by a per-stage session count.
pub struct FunnelSqlRenderer<'a> {
    table: &'a str,
}

impl<'a> FunnelSqlRenderer<'a> {
    pub fn new(table: &'a str) -> Self {
        Self { table }
    }

    pub fn render(&self, plan: &FunnelPlan, request: &HitStreamRequest) -> CompiledQuery {
        let mut builder = QueryBuilder::new();
        let website = builder.bind(request.website_id.as_str());
        let start = builder.bind(request.window.start);
        let end = builder.bind(request.window.end);

        let mut ctes = vec![format!(
            "scoped AS (\n  SELECT session_id, occurred_at, seq, hit_kind, url_path, event_name, params,\n    \
             CASE WHEN hit_kind = 'pageview' THEN url_path ELSE page_path END AS page,\n    \
             LAG(hit_kind) OVER w AS prev_kind, LAG(url_path) OVER w AS prev_url,\n    \
             LAG(event_name) OVER w AS prev_event, LAG(params) OVER w AS prev_params,\n    \
             LAG(CASE WHEN hit_kind = 'pageview' THEN url_path ELSE page_path END) OVER w AS prev_page\n  \
             FROM {table}\n  \
             WHERE website_id = {website} AND occurred_at >= {start} AND occurred_at <= {end}\n  \
             WINDOW w AS (PARTITION BY session_id ORDER BY occurred_at, seq)\n)",
            table = self.table
        )];

        for stage in plan.stages() {
            ctes.push(self.render_stage(stage, &mut builder));
        }

        let counts: Vec<String> = plan
            .stages()
            .iter()
            .map(|stage| {
                format!(
                    "SELECT {} AS step_index, COUNT(*) AS sessions FROM {}",
                    stage.index, stage.name
                )
            })
            .collect();

        let sql = format!(
            "WITH {}\n{}\nORDER BY step_index",
            ctes.join(",\n"),
            counts.join("\nUNION ALL\n")
        );
        builder.finish(sql)
    }

    fn render_stage(&self, stage: &PlanStage, builder: &mut QueryBuilder) -> String {
        let mut conditions = vec![render_predicate(&stage.predicate, &CURRENT, builder)];

        let from = match &stage.follows {
            None => "scoped h".to_string(),
            Some(previous) => {
                conditions.push("h.occurred_at > p.occurred_at".to_string());
                if stage.same_page {
                    conditions.push("h.page = p.page".to_string());
                }
                if let Some(adjacency) = &stage.adjacency {
                    conditions.push(render_predicate(adjacency, &PRECEDING, builder));
                    if stage.same_page {
                        conditions.push("h.prev_page = p.page".to_string());
                    }
                }
                format!("scoped h JOIN {previous} p ON p.session_id = h.session_id")
            }
        };

        format!(
            "{name} AS (\n  SELECT DISTINCT ON (h.session_id) h.session_id, h.occurred_at, h.page\n  \
             FROM {from}\n  WHERE {conditions}\n  ORDER BY h.session_id, h.occurred_at, h.seq\n)",
            name = stage.name,
            conditions = conditions.join("\n    AND ")
        )
    }
}

/// Renders the per-session ordered path arrays the timing matcher consumes
pub struct TimingSqlRenderer<'a> {
    table: &'a str,
}

impl<'a> TimingSqlRenderer<'a> {
    pub fn new(table: &'a str) -> Self {
        Self { table }
    }

    pub fn render(&self, request: &HitStreamRequest) -> CompiledQuery {
        let mut builder = QueryBuilder::new();
        let website = builder.bind(request.website_id.as_str());
        let start = builder.bind(request.window.start);
        let end = builder.bind(request.window.end);
        let pageview = builder.bind("pageview");
        let scope = format!(
            "website_id = {website} AND occurred_at >= {start} AND occurred_at <= {end} AND hit_kind = {pageview}"
        );

        let anchor = request
            .anchor
            .as_ref()
            .map(|filter| {
                format!(
                    "\n  AND session_id IN (SELECT session_id FROM {} WHERE {scope} AND {})",
                    self.table,
                    filter_condition(filter, &mut builder)
                )
            })
            .unwrap_or_default();

        let sql = format!(
            "SELECT session_id,\n  \
             array_agg(url_path ORDER BY occurred_at, seq) AS paths,\n  \
             array_agg(occurred_at ORDER BY occurred_at, seq) AS times\n\
             FROM {table}\nWHERE {scope}{anchor}\nGROUP BY session_id",
            table = self.table
        );
        builder.finish(sql)
    }
}
