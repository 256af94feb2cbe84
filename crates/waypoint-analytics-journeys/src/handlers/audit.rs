use anyhow::Result;
use serde::Serialize;
pub use waypoint_core::AuditContext;
use waypoint_core::AuditOperation;

use crate::types::JourneyDirection;

/// Audit event for a journey run
#[derive(Debug, Clone, Serialize)]
pub struct JourneyAudit {
    pub context: AuditContext,
    pub website_id: String,
    pub start_date: String,
    pub end_date: String,
    pub start_page: String,
    pub direction: JourneyDirection,
    pub steps: usize,
    pub limit: usize,
    pub sessions_scanned: usize,
}

impl AuditOperation for JourneyAudit {
    fn operation_type(&self) -> String {
        "JOURNEY_RUN".to_string()
    }

    fn context(&self) -> &AuditContext {
        &self.context
    }

    fn serialize(&self) -> Result<String> {
        serde_json::to_string(self)
            .map_err(|e| anyhow::anyhow!("Failed to serialize audit operation: {}", e))
    }
}
