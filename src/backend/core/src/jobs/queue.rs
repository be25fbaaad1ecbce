//! Host queue interface and an in-memory reference implementation.
//!
//! Envelopes are stored as serialized JSON so that every re-enqueue exercises
//! the same wire form a persistent queue would use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use super::job::{JobId, JobStatus};
use crate::cursor::CursorValue;
use crate::error::{ErrorCode, ResumableError, Result};

// ═══════════════════════════════════════════════════════════════════════════════
// Envelope
// ═══════════════════════════════════════════════════════════════════════════════

/// Failure recorded on a finalized envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub code: ErrorCode,
    pub message: String,
    pub retryable: bool,
}

impl From<&ResumableError> for FailureRecord {
    fn from(error: &ResumableError) -> Self {
        Self {
            code: error.code(),
            message: error.user_message().to_string(),
            retryable: error.is_retryable(),
        }
    }
}

/// A job as the host queue sees it: job type, params and resume cursor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResumeEnvelope {
    pub id: JobId,
    pub job_type: String,
    pub params: serde_json::Value,
    #[serde(default)]
    pub cursor: Option<CursorValue>,
    pub status: JobStatus,
    #[serde(default)]
    pub times_interrupted: u32,
    /// Accumulated slice run time (milliseconds)
    #[serde(default)]
    pub total_time_ms: u64,
    pub enqueued_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureRecord>,
}

impl ResumeEnvelope {
    /// Create a first-run envelope.
    pub fn new(job_type: impl Into<String>, params: impl Serialize) -> Result<Self> {
        Ok(Self {
            id: JobId::new(),
            job_type: job_type.into(),
            params: serde_json::to_value(params)?,
            cursor: None,
            status: JobStatus::Pending,
            times_interrupted: 0,
            total_time_ms: 0,
            enqueued_at: Utc::now(),
            finished_at: None,
            failure: None,
        })
    }

    /// Record an interrupted slice; the envelope is ready to re-enqueue.
    pub fn interrupted(&mut self, cursor: CursorValue, elapsed: Duration) {
        self.cursor = Some(cursor);
        self.status = JobStatus::Pending;
        self.times_interrupted += 1;
        self.total_time_ms += elapsed.as_millis() as u64;
        self.enqueued_at = Utc::now();
    }

    pub fn completed(&mut self, elapsed: Duration) {
        self.status = JobStatus::Completed;
        self.total_time_ms += elapsed.as_millis() as u64;
        self.finished_at = Some(Utc::now());
    }

    /// Record a failure. The cursor stays at the last recorded position.
    pub fn failed(&mut self, error: &ResumableError, cursor: Option<CursorValue>, elapsed: Duration) {
        self.status = JobStatus::Failed;
        self.cursor = cursor;
        self.total_time_ms += elapsed.as_millis() as u64;
        self.finished_at = Some(Utc::now());
        self.failure = Some(FailureRecord::from(error));
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Queue
// ═══════════════════════════════════════════════════════════════════════════════

/// Queue statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    /// Number of pending envelopes
    pub pending: usize,
    /// Envelopes enqueued, including re-enqueues
    pub enqueued: u64,
    /// Envelopes re-enqueued with a cursor
    pub resumed: u64,
    pub completed: u64,
    pub failed: u64,
}

/// The host queue the engine hands outcomes back to.
#[async_trait]
pub trait HostQueue: Send + Sync {
    /// Enqueue (or re-enqueue) an envelope.
    async fn enqueue(&self, envelope: ResumeEnvelope) -> Result<()>;

    /// Take the next envelope, oldest first.
    async fn dequeue(&self) -> Result<Option<ResumeEnvelope>>;

    /// Record a completed or failed envelope.
    async fn finalize(&self, envelope: ResumeEnvelope) -> Result<()>;

    /// Get queue statistics.
    async fn stats(&self) -> Result<QueueStats>;

    /// Get the current queue length.
    async fn len(&self) -> Result<usize>;

    /// Check if the queue is empty.
    async fn is_empty(&self) -> Result<bool> {
        Ok(self.len().await? == 0)
    }
}

/// FIFO queue kept in memory, for tests and the CLI.
#[derive(Clone, Default)]
pub struct InMemoryHostQueue {
    pending: Arc<RwLock<VecDeque<String>>>,
    finished: Arc<RwLock<Vec<String>>>,
    stats: Arc<RwLock<QueueStats>>,
}

impl InMemoryHostQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finalized envelopes, oldest first.
    pub async fn finished(&self) -> Result<Vec<ResumeEnvelope>> {
        self.finished
            .read()
            .await
            .iter()
            .map(|raw| decode(raw))
            .collect()
    }
}

fn encode(envelope: &ResumeEnvelope) -> Result<String> {
    serde_json::to_string(envelope).map_err(|e| {
        ResumableError::with_internal(
            ErrorCode::SerializationError,
            "Failed to serialize job envelope",
            e.to_string(),
        )
    })
}

fn decode(raw: &str) -> Result<ResumeEnvelope> {
    serde_json::from_str(raw).map_err(|e| {
        ResumableError::with_internal(
            ErrorCode::DeserializationError,
            "Failed to deserialize job envelope",
            e.to_string(),
        )
    })
}

#[async_trait]
impl HostQueue for InMemoryHostQueue {
    async fn enqueue(&self, envelope: ResumeEnvelope) -> Result<()> {
        let raw = encode(&envelope)?;
        let mut pending = self.pending.write().await;
        let mut stats = self.stats.write().await;
        pending.push_back(raw);
        stats.pending = pending.len();
        stats.enqueued += 1;
        if envelope.cursor.is_some() {
            stats.resumed += 1;
        }
        Ok(())
    }

    async fn dequeue(&self) -> Result<Option<ResumeEnvelope>> {
        let mut pending = self.pending.write().await;
        let mut stats = self.stats.write().await;
        let raw = pending.pop_front();
        stats.pending = pending.len();
        raw.as_deref().map(decode).transpose()
    }

    async fn finalize(&self, envelope: ResumeEnvelope) -> Result<()> {
        if !envelope.status.is_terminal() {
            return Err(ResumableError::argument(format!(
                "Only completed or failed jobs can be finalized, got {}",
                envelope.status
            )));
        }
        let raw = encode(&envelope)?;
        let mut stats = self.stats.write().await;
        match envelope.status {
            JobStatus::Completed => stats.completed += 1,
            _ => stats.failed += 1,
        }
        self.finished.write().await.push(raw);
        Ok(())
    }

    async fn stats(&self) -> Result<QueueStats> {
        Ok(self.stats.read().await.clone())
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.pending.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = InMemoryHostQueue::new();
        let first = ResumeEnvelope::new("A", json!({})).unwrap();
        let second = ResumeEnvelope::new("B", json!({})).unwrap();

        queue.enqueue(first.clone()).await.unwrap();
        queue.enqueue(second.clone()).await.unwrap();
        assert_eq!(queue.len().await.unwrap(), 2);

        assert_eq!(queue.dequeue().await.unwrap(), Some(first));
        assert_eq!(queue.dequeue().await.unwrap(), Some(second));
        assert_eq!(queue.dequeue().await.unwrap(), None);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_cursor_survives_wire_form() {
        let queue = InMemoryHostQueue::new();
        let mut envelope = ResumeEnvelope::new("Nested", json!({"shop": 3})).unwrap();
        let cursor = CursorValue::list([CursorValue::from(4i64), CursorValue::from("sku-9")]);
        envelope.interrupted(cursor.clone(), Duration::from_millis(40));

        queue.enqueue(envelope).await.unwrap();
        let back = queue.dequeue().await.unwrap().unwrap();

        assert_eq!(back.cursor, Some(cursor));
        assert_eq!(back.times_interrupted, 1);
        assert_eq!(back.total_time_ms, 40);
        assert_eq!(queue.stats().await.unwrap().resumed, 1);
    }

    #[tokio::test]
    async fn test_finalize_requires_terminal_status() {
        let queue = InMemoryHostQueue::new();
        let mut envelope = ResumeEnvelope::new("A", json!(null)).unwrap();
        assert!(queue.finalize(envelope.clone()).await.is_err());

        envelope.completed(Duration::from_millis(5));
        queue.finalize(envelope).await.unwrap();

        let finished = queue.finished().await.unwrap();
        assert_eq!(finished.len(), 1);
        assert_eq!(finished[0].status, JobStatus::Completed);
        assert!(finished[0].finished_at.is_some());
        assert_eq!(queue.stats().await.unwrap().completed, 1);
    }

    #[test]
    fn test_failure_record() {
        let mut envelope = ResumeEnvelope::new("A", json!([])).unwrap();
        let error = ResumableError::invalid_cursor("times", "an integer", "string");
        envelope.failed(&error, Some(CursorValue::from("x")), Duration::ZERO);

        let failure = envelope.failure.unwrap();
        assert_eq!(failure.code, ErrorCode::InvalidCursor);
        assert!(!failure.retryable);
    }
}
