mod plan;
mod render;
mod service;
mod timing;

pub use plan::{stage_name, FunnelPlan, HitPredicate, PlanStage};
pub use render::{FunnelSqlRenderer, TimingSqlRenderer};
pub use service::{AnalysisOutput, FunnelQuery, FunnelService};
pub use timing::{aggregate, match_session, session_records, TimingRecord, TOTAL_STEP};
