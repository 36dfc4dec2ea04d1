use crate::entities::{audit_logs, prelude::*};
use anyhow::Result;
use sea_orm::{ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, QuerySelect, Set};

#[derive(Debug, Clone)]
pub struct NewAuditEntry {
    pub entity_name: String,
    pub entity_id: Option<String>,
    pub action: String,
    pub user_id: Option<String>,
    pub details: String,
    pub ip_address: String,
    pub timestamp: String,
}

/// Optional filters for audit log reads. Timestamps compare as RFC 3339
/// strings, so bounds must use the same format.
#[derive(Debug, Clone, Default)]
pub struct AuditFilter {
    pub entity_name: Option<String>,
    pub action: Option<String>,
    pub user_id: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub limit: Option<u64>,
}

pub struct AuditRepository {
    conn: DatabaseConnection,
}

impl AuditRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    pub async fn append(&self, entry: NewAuditEntry) -> Result<i64> {
        let active_model = audit_logs::ActiveModel {
            entity_name: Set(entry.entity_name),
            entity_id: Set(entry.entity_id),
            action: Set(entry.action),
            user_id: Set(entry.user_id),
            details: Set(entry.details),
            ip_address: Set(entry.ip_address),
            timestamp: Set(entry.timestamp),
            ..Default::default()
        };

        let result = AuditLogs::insert(active_model).exec(&self.conn).await?;
        Ok(result.last_insert_id)
    }

    pub async fn list(&self, filter: AuditFilter) -> Result<Vec<audit_logs::Model>> {
        let mut query = AuditLogs::find()
            .order_by_desc(audit_logs::Column::Timestamp)
            .order_by_desc(audit_logs::Column::Id);

        if let Some(entity_name) = filter.entity_name {
            query = query.filter(audit_logs::Column::EntityName.eq(entity_name));
        }

        if let Some(action) = filter.action {
            query = query.filter(audit_logs::Column::Action.eq(action));
        }

        if let Some(user_id) = filter.user_id {
            query = query.filter(audit_logs::Column::UserId.eq(user_id));
        }

        if let Some(from) = filter.from {
            query = query.filter(audit_logs::Column::Timestamp.gte(from));
        }

        if let Some(to) = filter.to {
            query = query.filter(audit_logs::Column::Timestamp.lte(to));
        }

        if let Some(limit) = filter.limit {
            query = query.limit(limit);
        }

        Ok(query.all(&self.conn).await?)
    }
}
