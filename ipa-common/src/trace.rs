//! Per-request trace of one reconciliation.
//!
//! The reconciler records what it looked up, decided and sent. The trace is
//! emitted as one structured log event when the request fails, or on success
//! when verbose tracing is on.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::error::ReconcileError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Validate,
    Find,
    Plan,
    Call,
    /// A call that would have been issued under dry run.
    Skipped,
    Fault,
    Done,
}

#[derive(Debug, Clone, Serialize)]
pub struct TraceEvent {
    pub at: DateTime<Utc>,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    pub detail: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct RequestTrace {
    pub id: Uuid,
    pub object_type: String,
    pub started_at: DateTime<Utc>,
    events: Vec<TraceEvent>,
}

impl RequestTrace {
    pub fn new(object_type: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            object_type: object_type.to_string(),
            started_at: Utc::now(),
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, stage: Stage, method: Option<&str>, detail: impl Into<String>) {
        self.events.push(TraceEvent {
            at: Utc::now(),
            stage,
            method: method.map(str::to_string),
            detail: detail.into(),
        });
    }

    pub fn events(&self) -> &[TraceEvent] {
        &self.events
    }

    /// Methods of the recorded `Call` events, in order.
    pub fn called_methods(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter(|e| e.stage == Stage::Call)
            .filter_map(|e| e.method.as_deref())
            .collect()
    }

    fn elapsed_ms(&self) -> i64 {
        (Utc::now() - self.started_at).num_milliseconds()
    }

    fn events_json(&self) -> String {
        serde_json::to_string(&self.events).unwrap_or_else(|_| "[]".to_string())
    }

    /// Log the trace after a failure.
    pub fn emit_failure(&self, err: &ReconcileError) {
        warn!(
            trace_id = %self.id,
            object_type = %self.object_type,
            error_code = %err.code().code_string(),
            elapsed_ms = self.elapsed_ms(),
            events = %self.events_json(),
            "reconciliation failed: {err}"
        );
    }

    /// Log the trace after success.
    pub fn emit(&self) {
        info!(
            trace_id = %self.id,
            object_type = %self.object_type,
            elapsed_ms = self.elapsed_ms(),
            events = %self.events_json(),
            "reconciliation trace"
        );
    }
}
