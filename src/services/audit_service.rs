use std::sync::Arc;

use chrono::Utc;
use serde_json::Value as JsonValue;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::models::audit_log::AuditLog;

const MAX_ENTRIES: usize = 10_000;

/// Audit trail kept in memory and mirrored to the `audit` tracing target.
#[derive(Clone, Default)]
pub struct AuditService {
    entries: Arc<RwLock<Vec<AuditLog>>>,
}

impl AuditService {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn log(
        &self,
        actor: Option<&str>,
        action: &str,
        entity_type: &str,
        entity_id: Uuid,
        changes: Option<JsonValue>,
    ) -> AuditLog {
        let entry = AuditLog {
            id: Uuid::new_v4(),
            actor: actor.map(str::to_string),
            action: action.to_string(),
            entity_type: entity_type.to_string(),
            entity_id,
            changes,
            created_at: Utc::now(),
        };
        tracing::info!(
            target: "audit",
            actor = entry.actor.as_deref().unwrap_or("system"),
            action = %entry.action,
            entity_type = %entry.entity_type,
            entity_id = %entry.entity_id,
            "audit event"
        );

        let mut entries = self.entries.write().await;
        if entries.len() >= MAX_ENTRIES {
            entries.remove(0);
        }
        entries.push(entry.clone());
        entry
    }

    /// Most recent entries first.
    pub async fn recent(&self, limit: usize) -> Vec<AuditLog> {
        self.entries
            .read()
            .await
            .iter()
            .rev()
            .take(limit)
            .cloned()
            .collect()
    }
}
