use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use std::sync::Mutex;
use uuid::Uuid;

/// Record of a denied authorization decision. Carries enough detail to
/// reconstruct "who tried what and why it was denied" without exposing
/// anything in the response body.
#[derive(Debug, Clone, Serialize)]
pub struct UnauthorizedAttempt {
    pub user_id: Option<Uuid>,
    pub path: String,
    pub method: String,
    pub reason: String,
    pub details: Value,
}

/// Sink for authorization denials.
///
/// Every denial beyond plain missing-authentication is recorded here, across
/// all gates uniformly. Injected through `AppState` so tests can capture
/// attempts in memory.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn log_unauthorized_attempt(&self, attempt: UnauthorizedAttempt);
}

/// Default sink: a structured warning event.
pub struct TracingAudit;

#[async_trait]
impl AuditSink for TracingAudit {
    async fn log_unauthorized_attempt(&self, attempt: UnauthorizedAttempt) {
        tracing::warn!(
            user_id = ?attempt.user_id,
            path = %attempt.path,
            method = %attempt.method,
            reason = %attempt.reason,
            details = %attempt.details,
            "unauthorized attempt"
        );
    }
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemoryAudit {
    attempts: Mutex<Vec<UnauthorizedAttempt>>,
}

impl MemoryAudit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn attempts(&self) -> Vec<UnauthorizedAttempt> {
        self.attempts.lock().expect("audit lock poisoned").clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAudit {
    async fn log_unauthorized_attempt(&self, attempt: UnauthorizedAttempt) {
        self.attempts.lock().expect("audit lock poisoned").push(attempt);
    }
}
