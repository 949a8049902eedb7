//! Step Result: the normalized outcome of running one step.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ErrorKind;

/// Compact error summary attached to a failed [`StepResult`], per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepError {
    pub kind: String,
    pub message: String,
    pub retry_possible: bool,
    pub technical_details: Option<String>,
}

impl StepError {
    pub fn from_handler_error(err: &crate::error::HandlerError) -> Self {
        Self {
            kind: err.kind.tag().to_string(),
            message: err.kind.to_string(),
            retry_possible: err.retry_possible,
            technical_details: err.technical_details.clone(),
        }
    }

    pub fn timeout(seconds: u64) -> Self {
        Self {
            kind: ErrorKind::Timeout(seconds).tag().to_string(),
            message: format!("step timed out after {}s", seconds),
            retry_possible: false,
            technical_details: None,
        }
    }

    pub fn cancelled() -> Self {
        Self {
            kind: ErrorKind::Cancelled.tag().to_string(),
            message: "cancelled".to_string(),
            retry_possible: false,
            technical_details: None,
        }
    }
}

/// The final artifact produced by the `results_formatter` step: content plus display hints.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub display_type: DisplayType,
    pub content: serde_json::Value,
    pub headers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayType {
    Table,
    Markdown,
    Text,
    Json,
}

/// A small, bounded projection of a step's output forwarded to the next step as context.
///
/// Capped per §4.3 (default ≤ 20 rows or ≤ 8 KiB) so downstream prompt/memory sizes stay
/// bounded; this is a snapshot, never an alias into the step's full output (§9).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sample {
    pub rows: Vec<serde_json::Value>,
    pub truncated: bool,
}

impl Sample {
    pub const MAX_ROWS: usize = 20;
    pub const MAX_BYTES: usize = 8 * 1024;

    /// Build a bounded sample from a full row set, truncating by row count or byte size,
    /// whichever is hit first.
    pub fn from_rows(rows: &[serde_json::Value]) -> Self {
        let mut sample = Vec::new();
        let mut bytes = 0usize;
        let mut truncated = rows.len() > Self::MAX_ROWS;

        for row in rows.iter().take(Self::MAX_ROWS) {
            let encoded = serde_json::to_string(row).unwrap_or_default();
            if bytes + encoded.len() > Self::MAX_BYTES {
                truncated = true;
                break;
            }
            bytes += encoded.len();
            sample.push(row.clone());
        }

        Self {
            rows: sample,
            truncated,
        }
    }
}

/// The normalized outcome of running one [`crate::models::Step`], per §3.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepResult {
    pub index: usize,
    pub success: bool,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
    pub record_count: u64,
    pub error: Option<StepError>,
    pub sample: Option<Sample>,
    pub artifact: Option<Artifact>,
}

impl StepResult {
    pub fn success(
        index: usize,
        started_at: DateTime<Utc>,
        duration: Duration,
        record_count: u64,
        sample: Option<Sample>,
    ) -> Self {
        Self {
            index,
            success: true,
            started_at,
            duration,
            record_count,
            error: None,
            sample,
            artifact: None,
        }
    }

    pub fn failure(
        index: usize,
        started_at: DateTime<Utc>,
        duration: Duration,
        error: StepError,
    ) -> Self {
        Self {
            index,
            success: false,
            started_at,
            duration,
            record_count: 0,
            error: Some(error),
            sample: None,
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Artifact) -> Self {
        self.artifact = Some(artifact);
        self
    }
}
