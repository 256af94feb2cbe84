use anyhow::Result;
use serde::Serialize;

/// Who ran an analysis and from where
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AuditContext {
    pub actor: String,
    pub ip_address: Option<String>,
    pub user_agent: String,
}

/// An auditable operation (e.g. "FUNNEL_COUNTS_RUN")
pub trait AuditOperation: Send + Sync {
    fn operation_type(&self) -> String;

    fn context(&self) -> &AuditContext;

    /// Serializes the operation payload to JSON
    fn serialize(&self) -> Result<String>;
}

/// Sink for audit records
#[async_trait::async_trait]
pub trait AuditLogger: Send + Sync {
    async fn create_audit_log(&self, operation: &dyn AuditOperation) -> Result<()>;
}
