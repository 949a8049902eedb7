//! Execution Event: the tagged union carried by the Event Bus, per §3 and §6.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Plan, StepKind};

/// Sub-kind of a non-terminal `STEP-PROGRESS` event, per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressType {
    Generic,
    RateLimit,
    RateLimitWait,
}

fn now_formatted() -> String {
    Utc::now().to_rfc3339()
}

/// One event on a Process's Event Bus.
///
/// Serializes as the outer envelope `{type, content}` described in §6: `content` always
/// carries `process_id` and a monotonic `seq` in addition to the variant's own fields, via
/// [`ExecutionEvent::to_wire`].
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum ExecutionEvent {
    PlanGenerated {
        plan: Plan,
        step_count: usize,
        formatted_time: String,
    },
    PlanningPhase {
        phase: PlanningPhase,
        formatted_time: String,
    },
    StepStart {
        step_number: usize,
        step_type: StepKind,
        step_name: String,
        query_context: String,
        critical: bool,
        formatted_time: String,
    },
    StepEnd {
        step_number: usize,
        step_type: StepKind,
        success: bool,
        duration_seconds: f64,
        record_count: u64,
        formatted_time: String,
        error_message: Option<String>,
    },
    StepProgress {
        step_number: usize,
        progress_type: ProgressType,
        current: Option<u64>,
        total: Option<u64>,
        percentage: Option<f64>,
        message: String,
        wait_seconds: Option<u64>,
    },
    StepTokens {
        step_number: usize,
        input_tokens: u64,
        output_tokens: u64,
        agent_name: String,
        formatted_time: String,
    },
    StepCount {
        step_number: usize,
        record_count: u64,
        operation_type: String,
    },
    StepError {
        step_number: usize,
        error_type: String,
        error_message: String,
        retry_possible: bool,
        technical_details: String,
        formatted_time: String,
    },
    Metadata {
        display_type: String,
        total_records: u64,
        total_batches: u64,
        headers: Option<Vec<String>>,
        execution_plan: Option<Plan>,
    },
    Batch {
        batch_number: u64,
        total_batches: u64,
        results: Vec<serde_json::Value>,
        is_final: bool,
    },
    Complete {
        display_type: String,
        content: serde_json::Value,
        results: Option<Vec<serde_json::Value>>,
        headers: Option<Vec<String>>,
        count: Option<u64>,
        metadata: Option<serde_json::Value>,
    },
    Error {
        error: String,
        message: String,
    },
    Done,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanningPhase {
    PlanningStart,
    PlanningComplete,
}

impl ExecutionEvent {
    /// Short discriminant used as the wire `type` tag (`PLAN-GENERATED`, `STEP-START`, ...).
    pub fn wire_type(&self) -> &'static str {
        match self {
            ExecutionEvent::PlanGenerated { .. } => "PLAN-GENERATED",
            ExecutionEvent::PlanningPhase { .. } => "PLANNING-PHASE",
            ExecutionEvent::StepStart { .. } => "STEP-START",
            ExecutionEvent::StepEnd { .. } => "STEP-END",
            ExecutionEvent::StepProgress { .. } => "STEP-PROGRESS",
            ExecutionEvent::StepTokens { .. } => "STEP-TOKENS",
            ExecutionEvent::StepCount { .. } => "STEP-COUNT",
            ExecutionEvent::StepError { .. } => "STEP-ERROR",
            ExecutionEvent::Metadata { .. } => "METADATA",
            ExecutionEvent::Batch { .. } => "BATCH",
            ExecutionEvent::Complete { .. } => "COMPLETE",
            ExecutionEvent::Error { .. } => "ERROR",
            ExecutionEvent::Done => "DONE",
        }
    }

    /// Whether this variant must never be dropped by the Event Bus under back-pressure (§4.2).
    pub fn is_never_drop(&self) -> bool {
        !matches!(self, ExecutionEvent::StepProgress { .. })
    }

    /// Render the client-facing envelope `{type, content}` (§6), with `process_id` and
    /// `seq` merged into `content` alongside the variant's own fields.
    pub fn to_wire(&self, process_id: &str, seq: u64) -> serde_json::Value {
        let mut content = serde_json::to_value(self).unwrap_or(serde_json::Value::Null);
        if let serde_json::Value::Object(ref mut map) = content {
            map.remove("kind");
            map.insert(
                "process_id".to_string(),
                serde_json::Value::String(process_id.to_string()),
            );
            map.insert("seq".to_string(), serde_json::Value::from(seq));
        }
        serde_json::json!({ "type": self.wire_type(), "content": content })
    }
}

pub fn formatted_now() -> String {
    now_formatted()
}

pub fn rfc3339(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_envelope_has_type_and_process_id() {
        let event = ExecutionEvent::Done;
        let wire = event.to_wire("proc-1", 42);
        assert_eq!(wire["type"], "DONE");
        assert_eq!(wire["content"]["process_id"], "proc-1");
        assert_eq!(wire["content"]["seq"], 42);
    }

    #[test]
    fn progress_events_are_droppable_others_are_not() {
        let progress = ExecutionEvent::StepProgress {
            step_number: 0,
            progress_type: ProgressType::Generic,
            current: None,
            total: None,
            percentage: None,
            message: "working".into(),
            wait_seconds: None,
        };
        assert!(!progress.is_never_drop());
        assert!(ExecutionEvent::Done.is_never_drop());
        assert!(ExecutionEvent::Error {
            error: "x".into(),
            message: "y".into()
        }
        .is_never_drop());
    }
}
