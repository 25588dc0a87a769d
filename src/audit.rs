//! Best-effort audit trail.
//!
//! Entries go onto an unbounded queue drained by a detached task. Delivery is
//! at most once: a sink failure is logged and the entry is dropped, and
//! nothing about it ever reaches the booking result.
use crate::error::StoreError;
use crate::session::{ActorType, SessionContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditStatus {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub actor_id: String,
    pub actor_type: ActorType,
    pub action: String,
    pub details: serde_json::Value,
    pub resource_type: String,
    pub resource_id: Option<String>,
    pub status: AuditStatus,
}

impl AuditEntry {
    pub fn new(session: &SessionContext, action: &str, resource_type: &str) -> Self {
        Self {
            actor_id: session.actor_id.clone(),
            actor_type: session.actor_type,
            action: action.to_string(),
            details: serde_json::Value::Null,
            resource_type: resource_type.to_string(),
            resource_id: None,
            status: AuditStatus::Success,
        }
    }
    pub fn resource(mut self, id: &str) -> Self {
        self.resource_id = Some(id.to_string());
        self
    }
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
    pub fn failed(mut self) -> Self {
        self.status = AuditStatus::Failure;
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry) -> Result<(), StoreError>;
}

/// Writes entries to the `audit` tracing target only
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn record(&self, entry: &AuditEntry) -> Result<(), StoreError> {
        tracing::info!(
            target: "audit",
            actor_id = %entry.actor_id,
            action = %entry.action,
            resource_type = %entry.resource_type,
            resource_id = ?entry.resource_id,
            status = ?entry.status,
            details = %entry.details,
            "audit entry"
        );
        Ok(())
    }
}

#[derive(Clone)]
pub struct AuditLogger {
    sender: Option<mpsc::UnboundedSender<AuditEntry>>,
}

impl AuditLogger {
    /// Starts the drain task. It ends once every clone of the logger is dropped.
    pub fn spawn(sink: Arc<dyn AuditSink>) -> (Self, JoinHandle<()>) {
        let (sender, mut receiver) = mpsc::unbounded_channel::<AuditEntry>();
        let handle = tokio::spawn(async move {
            while let Some(entry) = receiver.recv().await {
                if let Err(err) = sink.record(&entry).await {
                    tracing::warn!(action = %entry.action, error = %err, "audit entry dropped");
                }
            }
        });

        (
            Self {
                sender: Some(sender),
            },
            handle,
        )
    }

    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Queues an entry; never blocks and never fails the caller
    pub fn log(&self, entry: AuditEntry) {
        let Some(sender) = &self.sender else {
            return;
        };
        if let Err(err) = sender.send(entry) {
            tracing::warn!(action = %err.0.action, "audit queue closed, entry dropped");
        }
    }
}
