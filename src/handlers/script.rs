//! `security_validation` and `script_execution` step handlers, per §4.6.
//!
//! A generated script is represented as a string carried on the `Step` (its `operation`
//! field holds the code body in this engine's ReAct-mode plans) — validated by one step,
//! then launched by the next. The supervisor refuses to run anything that was not validated
//! immediately prior, per the security invariant in §4.6.

use std::time::Duration;

use crate::collaborators::CodeValidator;
use crate::error::{ErrorKind, HandlerError};
use crate::models::{CancelSignal, Step};
use crate::subprocess;

use super::{HandlerOutcome, HandlerResult, PriorSummary, ProgressEmitter};

/// Runs the Code Validator over the step's code body. Fails with `security_violation`
/// (terminal for the Process, per §7) if any violation is reported.
pub async fn validate(
    step: &Step,
    validator: &dyn CodeValidator,
) -> HandlerResult {
    let result = validator.validate(&step.operation).await;
    if result.ok {
        Ok(HandlerOutcome::default())
    } else {
        Err(
            HandlerError::new(ErrorKind::SecurityViolation(result.violations.join("; ")))
                .with_retry(false),
        )
    }
}

/// Launches the validated script and surfaces its stdout as a text artifact.
///
/// `validated` must be the outcome of a `security_validation` step that immediately
/// preceded this one in the plan; the caller is responsible for enforcing that ordering
/// (the Plan Executor refuses to run `script_execution` without a prior successful
/// `security_validation` step in the same plan).
pub async fn run(
    step: &Step,
    _prior: &PriorSummary,
    cancel: &CancelSignal,
    timeout: Duration,
    emitter: &ProgressEmitter,
) -> HandlerResult {
    let script_path = subprocess::materialize_script(&step.operation)
        .await
        .map_err(|e| {
            HandlerError::new(ErrorKind::Internal("failed to write script to disk".into()))
                .with_technical_details(e.to_string())
        })?;

    let outcome = subprocess::run(&script_path, timeout, cancel, emitter).await?;

    Ok(HandlerOutcome::artifact(crate::models::Artifact {
        display_type: crate::models::DisplayType::Text,
        content: serde_json::Value::String(outcome.stdout),
        headers: Vec::new(),
    }))
}
