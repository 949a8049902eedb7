//! Step handlers: the per-kind logic the Step Runner invokes, per §4.4–§4.6.

pub mod api;
pub mod bookend;
pub mod formatter;
pub mod script;
pub mod sql;

use std::sync::Arc;

use serde_json::Value;

use crate::bus::{progress_event, EventBus};
use crate::error::HandlerError;
use crate::models::{Artifact, ProgressType, Sample};

/// Bound to one running step; handlers call this instead of touching the bus directly.
#[derive(Clone)]
pub struct ProgressEmitter {
    bus: Arc<EventBus>,
    step_number: usize,
}

impl ProgressEmitter {
    pub fn new(bus: Arc<EventBus>, step_number: usize) -> Self {
        Self { bus, step_number }
    }

    pub async fn progress(
        &self,
        progress_type: ProgressType,
        current: Option<u64>,
        total: Option<u64>,
        message: impl Into<String>,
    ) {
        self.bus
            .publish(progress_event(
                self.step_number,
                progress_type,
                current,
                total,
                message,
                None,
            ))
            .await;
    }

    /// `progress_type=rate_limit`, emitted by the API handler on a 429 response (§4.5).
    pub async fn rate_limit(&self, wait_seconds: u64, message: impl Into<String>) {
        self.emit_wait(ProgressType::RateLimit, wait_seconds, message).await;
    }

    /// `progress_type=rate_limit_wait`, forwarded verbatim from a subprocess's structured
    /// progress line (§4.6).
    pub async fn rate_limit_wait(&self, wait_seconds: u64, message: impl Into<String>) {
        self.emit_wait(ProgressType::RateLimitWait, wait_seconds, message).await;
    }

    async fn emit_wait(&self, progress_type: ProgressType, wait_seconds: u64, message: impl Into<String>) {
        self.bus
            .publish(crate::models::ExecutionEvent::StepProgress {
                step_number: self.step_number,
                progress_type,
                current: None,
                total: None,
                percentage: None,
                message: message.into(),
                wait_seconds: Some(wait_seconds),
            })
            .await;
    }
}

/// Immutable snapshot of everything accumulated from prior steps, handed to the next
/// handler. Replaces any notion of a shared mutable aggregate (§9).
#[derive(Debug, Clone, Default)]
pub struct PriorSummary {
    pub samples: Vec<(usize, Sample)>,
}

impl PriorSummary {
    pub fn pushed(&self, step_index: usize, sample: Sample) -> Self {
        let mut samples = self.samples.clone();
        samples.push((step_index, sample));
        Self { samples }
    }
}

/// What a handler hands back to the Step Runner on success.
#[derive(Debug, Clone, Default)]
pub struct HandlerOutcome {
    pub record_count: u64,
    pub rows: Vec<Value>,
    pub artifact: Option<Artifact>,
}

impl HandlerOutcome {
    pub fn rows(rows: Vec<Value>) -> Self {
        let record_count = rows.len() as u64;
        Self {
            record_count,
            rows,
            artifact: None,
        }
    }

    pub fn artifact(artifact: Artifact) -> Self {
        Self {
            record_count: 0,
            rows: Vec::new(),
            artifact: Some(artifact),
        }
    }

    pub fn sample(&self) -> Sample {
        Sample::from_rows(&self.rows)
    }
}

pub type HandlerResult = Result<HandlerOutcome, HandlerError>;
