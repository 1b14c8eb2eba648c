//! Append-only decision journal. Every event is redacted before write;
//! at the outermost cycle boundary writes are best-effort so a failing
//! journal can never take the loop down with it.

use crate::domain::audit::{AuditEntry, Severity, redact_secrets};
use crate::infrastructure::persistence::repositories::AuditRepository;
use anyhow::Result;
use chrono::Utc;
use serde_json::Value;
use sqlx::{SqliteConnection, SqlitePool};
use tracing::{error, info};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct AuditEvent {
    pub event_type: String,
    pub component: String,
    pub severity: Severity,
    pub symbol: Option<String>,
    pub decision_chain_id: Option<Uuid>,
    pub details: Value,
}

impl AuditEvent {
    pub fn new(event_type: &str, component: &str, details: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            component: component.to_string(),
            severity: Severity::Info,
            symbol: None,
            decision_chain_id: None,
            details,
        }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn symbol(mut self, symbol: &str) -> Self {
        self.symbol = Some(symbol.to_string());
        self
    }

    pub fn chain(mut self, chain_id: Uuid) -> Self {
        self.decision_chain_id = Some(chain_id);
        self
    }
}

pub struct AuditJournal;

impl AuditJournal {
    pub async fn append(conn: &mut SqliteConnection, event: AuditEvent) -> Result<AuditEntry> {
        let entry = AuditEntry {
            id: 0,
            timestamp: Utc::now(),
            event_type: event.event_type,
            severity: event.severity,
            component: event.component,
            symbol: event.symbol,
            details: redact_secrets(&event.details),
            decision_chain_id: event.decision_chain_id,
        };
        let id = AuditRepository::insert(conn, &entry).await?;

        info!(
            "[{}] {} | {} | {}",
            entry.severity.as_str(),
            entry.component,
            entry.event_type,
            entry.symbol.as_deref().unwrap_or("-"),
        );
        Ok(AuditEntry { id, ..entry })
    }

    /// Outermost-boundary write on a fresh connection. Failures are logged
    /// and dropped.
    pub async fn append_best_effort(pool: &SqlitePool, event: AuditEvent) {
        let event_type = event.event_type.clone();
        let result = async {
            let mut conn = pool.acquire().await?;
            Self::append(&mut conn, event).await
        }
        .await;
        if let Err(e) = result {
            error!("Audit write dropped for {}: {}", event_type, e);
            eprintln!("audit write dropped for {event_type}: {e}");
        }
    }
}
