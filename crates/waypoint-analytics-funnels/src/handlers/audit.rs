//! Audit types for funnel analyses

use anyhow::Result;
use serde::Serialize;
pub use waypoint_core::AuditContext;
use waypoint_core::AuditOperation;

/// Which funnel analysis ran
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FunnelAnalysisKind {
    Counts,
    Timing,
}

/// Audit event for a funnel counts or timing run
#[derive(Debug, Clone, Serialize)]
pub struct FunnelAnalysisAudit {
    pub context: AuditContext,
    pub analysis: FunnelAnalysisKind,
    pub website_id: String,
    pub start_date: String,
    pub end_date: String,
    pub only_direct_entry: bool,
    pub steps: Vec<String>,
    pub sessions_scanned: usize,
}

impl AuditOperation for FunnelAnalysisAudit {
    fn operation_type(&self) -> String {
        match self.analysis {
            FunnelAnalysisKind::Counts => "FUNNEL_COUNTS_RUN".to_string(),
            FunnelAnalysisKind::Timing => "FUNNEL_TIMING_RUN".to_string(),
        }
    }

    fn context(&self) -> &AuditContext {
        &self.context
    }

    fn serialize(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize audit operation: {}", e))
    }
}
