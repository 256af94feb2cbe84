use anyhow::Context;
use async_trait::async_trait;
use chrono::Utc;
use sea_orm::{ConnectionTrait, DatabaseBackend, DatabaseConnection, Statement, Value};
use std::sync::Arc;
use tracing::{debug, info};
use waypoint_core::{AuditLogger, AuditOperation};

pub const AUDIT_TABLE: &str = "audit_logs";

/// Records who ran which analysis.
///
/// Every record goes to the `audit` tracing target. With a database attached
/// it is also inserted into `audit_logs`.
pub struct AuditService {
    db: Option<Arc<DatabaseConnection>>,
}

impl AuditService {
    pub fn new(db: Option<Arc<DatabaseConnection>>) -> Self {
        Self { db }
    }

    pub fn tracing_only() -> Self {
        Self::new(None)
    }

    pub fn is_persistent(&self) -> bool {
        self.db.is_some()
    }

    pub async fn create_audit_log_typed<T: AuditOperation + ?Sized>(
        &self,
        operation: &T,
    ) -> anyhow::Result<()> {
        let now = Utc::now();
        let context = operation.context();
        let operation_type = operation.operation_type();
        let data_json = operation.serialize()?;

        info!(
            target: "audit",
            operation = %operation_type,
            actor = %context.actor,
            ip_address = context.ip_address.as_deref().unwrap_or("-"),
            data = %data_json,
            "analysis executed"
        );

        let Some(db) = &self.db else {
            return Ok(());
        };

        let values: [Value; 6] = [
            operation_type.clone().into(),
            context.actor.clone().into(),
            context.ip_address.clone().into(),
            context.user_agent.clone().into(),
            data_json.into(),
            now.into(),
        ];
        let statement = Statement::from_sql_and_values(
            DatabaseBackend::Postgres,
            format!(
                "INSERT INTO {AUDIT_TABLE} (operation_type, actor, ip_address, user_agent, data, audit_date) \
                 VALUES ($1, $2, $3, $4, $5, $6)"
            ),
            values,
        );

        db.execute(statement)
            .await
            .with_context(|| format!("Failed to create audit log for {operation_type}"))?;

        debug!("Persisted audit log {}", operation_type);
        Ok(())
    }
}

#[async_trait]
impl AuditLogger for AuditService {
    async fn create_audit_log(&self, operation: &dyn AuditOperation) -> anyhow::Result<()> {
        self.create_audit_log_typed(operation).await
    }
}
