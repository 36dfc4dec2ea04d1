//! Best-effort audit trail.
//!
//! Entries are appended through an [`AuditSink`]. The [`Auditor`] wrapper
//! stamps the server time and never lets a sink failure reach the caller.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use serde_json::Value;
use thiserror::Error;

use crate::db::{NewAuditEntry, Store};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("Failed to serialize audit details: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Failed to persist audit entry: {0}")]
    Storage(String),
}

impl From<anyhow::Error> for AuditError {
    fn from(err: anyhow::Error) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Where a request came from, as far as the audit trail cares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestContext {
    pub ip_address: String,
}

impl RequestContext {
    pub const UNKNOWN_IP: &'static str = "Unknown";

    #[must_use]
    pub fn new(ip_address: impl Into<String>) -> Self {
        Self {
            ip_address: ip_address.into(),
        }
    }

    #[must_use]
    pub fn unknown() -> Self {
        Self::new(Self::UNKNOWN_IP)
    }
}

/// One auditable event, before the timestamp is applied.
#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub entity_name: &'static str,
    pub action: &'static str,
    pub entity_id: Option<String>,
    pub actor: Option<String>,
    pub details: Value,
}

impl AuditEvent {
    #[must_use]
    pub const fn new(entity_name: &'static str, action: &'static str, details: Value) -> Self {
        Self {
            entity_name,
            action,
            entity_id: None,
            actor: None,
            details,
        }
    }

    #[must_use]
    pub fn entity(mut self, id: impl ToString) -> Self {
        self.entity_id = Some(id.to_string());
        self
    }

    #[must_use]
    pub fn actor(mut self, user_id: Option<&str>) -> Self {
        self.actor = user_id.map(str::to_string);
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, entry: NewAuditEntry) -> Result<i64, AuditError>;
}

pub struct SeaOrmAuditSink {
    store: Store,
}

impl SeaOrmAuditSink {
    #[must_use]
    pub const fn new(store: Store) -> Self {
        Self { store }
    }
}

#[async_trait]
impl AuditSink for SeaOrmAuditSink {
    async fn append(&self, entry: NewAuditEntry) -> Result<i64, AuditError> {
        Ok(self.store.append_audit(entry).await?)
    }
}

#[derive(Clone)]
pub struct Auditor {
    sink: Arc<dyn AuditSink>,
}

impl Auditor {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    #[must_use]
    pub fn from_store(store: Store) -> Self {
        Self::new(Arc::new(SeaOrmAuditSink::new(store)))
    }

    /// Appends the event. Failures are logged and counted, never returned.
    pub async fn record(&self, ctx: &RequestContext, event: AuditEvent) {
        let entity_name = event.entity_name;
        let action = event.action;

        if let Err(e) = self.try_record(ctx, event).await {
            metrics::counter!("audit_failures_total").increment(1);
            tracing::error!(entity_name, action, error = %e, "Failed to write audit entry");
        }
    }

    async fn try_record(&self, ctx: &RequestContext, event: AuditEvent) -> Result<i64, AuditError> {
        let details = serde_json::to_string(&event.details)?;

        let entry = NewAuditEntry {
            entity_name: event.entity_name.to_string(),
            entity_id: event.entity_id,
            action: event.action.to_string(),
            user_id: event.actor,
            details,
            ip_address: ctx.ip_address.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };

        self.sink.append(entry).await
    }
}
