//! Step Runner, per §4.3: executes one step, enforcing its deadline and normalizing the
//! outcome to a [`StepResult`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde_json::Value;

use crate::bus::EventBus;
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::error::HandlerError;
use crate::handlers::{self, HandlerOutcome, HandlerResult, PriorSummary, ProgressEmitter};
use crate::models::{Artifact, CancelSignal, Sample, Step, StepError, StepKind, StepResult};
use crate::step_registry;

/// Everything the formatter step additionally needs beyond the usual prior-step summary:
/// the full row set accumulated by every critical data step so far, plus whichever prior
/// step (if any) already produced a terminal artifact of its own (e.g. `script_execution`'s
/// stdout capture in ReAct-mode plans).
#[derive(Clone, Default)]
pub struct StepContext {
    pub prior: PriorSummary,
    pub accumulated_rows: Vec<Value>,
    pub last_artifact: Option<Artifact>,
}

async fn dispatch(
    step: &Step,
    ctx: &StepContext,
    cancel: &CancelSignal,
    collaborators: &Collaborators,
    emitter: &ProgressEmitter,
    timeout: Option<Duration>,
) -> HandlerResult {
    match step.kind {
        StepKind::Sql => {
            handlers::sql::run(step, &ctx.prior, cancel, collaborators.sql.as_ref(), emitter)
                .await
        }
        StepKind::Api => {
            handlers::api::run(step, &ctx.prior, cancel, collaborators.okta.as_ref(), emitter)
                .await
        }
        StepKind::SystemLog | StepKind::ReactDiscovery => {
            handlers::bookend::run(step, &ctx.prior, cancel).await
        }
        StepKind::ResultsFormatter | StepKind::FinalizingResults => {
            // `finalizing_results` always does the formatting work itself (§9 Open
            // Question 3 treats it as the plan's one stateful bookend); a plan that also
            // contains an explicit `results_formatter` data step hits the same branch. If
            // a prior step (e.g. `script_execution`) already produced a terminal artifact,
            // that artifact wins over re-deriving one from accumulated rows.
            match &ctx.last_artifact {
                Some(artifact) => Ok(HandlerOutcome::artifact(artifact.clone())),
                None => handlers::formatter::run(ctx.accumulated_rows.clone()).await,
            }
        }
        StepKind::SecurityValidation => {
            handlers::script::validate(step, collaborators.validator.as_ref()).await
        }
        StepKind::ScriptExecution => {
            let timeout = timeout.unwrap_or(Duration::from_secs(180));
            handlers::script::run(step, &ctx.prior, cancel, timeout, emitter).await
        }
        StepKind::Thinking | StepKind::GeneratingSteps => {
            handlers::bookend::run(step, &ctx.prior, cancel).await
        }
    }
}

/// Run one step to completion, emitting `STEP-START`, optional `STEP-PROGRESS` (via the
/// handler), and `STEP-END`/`STEP-ERROR`.
pub async fn run_step(
    bus: &Arc<EventBus>,
    process_query: &str,
    step: &Step,
    ctx: &StepContext,
    cancel: &CancelSignal,
    collaborators: &Collaborators,
    config: &EngineConfig,
) -> (StepResult, Option<HandlerOutcome>) {
    let timeout = step_registry::default_timeout(step.kind, config);
    let started_at = chrono::Utc::now();
    let start_instant = Instant::now();

    bus.publish(crate::models::ExecutionEvent::StepStart {
        step_number: step.index,
        step_type: step.kind,
        step_name: step.entity.clone(),
        query_context: process_query.to_string(),
        critical: step.critical,
        formatted_time: crate::models::formatted_now(),
    })
    .await;

    let emitter = ProgressEmitter::new(bus.clone(), step.index);
    let handler_future = dispatch(step, ctx, cancel, collaborators, &emitter, timeout);

    let outcome = match timeout {
        Some(t) => match tokio::time::timeout(t, handler_future).await {
            Ok(result) => result,
            Err(_elapsed) => Err(HandlerError::timeout(t.as_secs())),
        },
        None => handler_future.await,
    };

    let duration = start_instant.elapsed();

    match outcome {
        Ok(outcome) => {
            let sample = Sample::from_rows(&outcome.rows);
            bus.publish(crate::models::ExecutionEvent::StepEnd {
                step_number: step.index,
                step_type: step.kind,
                success: true,
                duration_seconds: duration.as_secs_f64(),
                record_count: outcome.record_count,
                formatted_time: crate::models::formatted_now(),
                error_message: None,
            })
            .await;
            let mut result = StepResult::success(
                step.index,
                started_at,
                duration,
                outcome.record_count,
                Some(sample),
            );
            if let Some(artifact) = &outcome.artifact {
                result = result.with_artifact(artifact.clone());
            }
            (result, Some(outcome))
        }
        Err(handler_error) => {
            let handler_error = if cancel.is_cancelled() && handler_error.kind != crate::error::ErrorKind::Cancelled {
                HandlerError::cancelled()
            } else {
                handler_error
            };

            let step_error = StepError::from_handler_error(&handler_error);

            bus.publish(crate::models::ExecutionEvent::StepError {
                step_number: step.index,
                error_type: step_error.kind.clone(),
                error_message: step_error.message.clone(),
                retry_possible: step_error.retry_possible,
                technical_details: step_error.technical_details.clone().unwrap_or_default(),
                formatted_time: crate::models::formatted_now(),
            })
            .await;

            bus.publish(crate::models::ExecutionEvent::StepEnd {
                step_number: step.index,
                step_type: step.kind,
                success: false,
                duration_seconds: duration.as_secs_f64(),
                record_count: 0,
                formatted_time: crate::models::formatted_now(),
                error_message: Some(step_error.message.clone()),
            })
            .await;

            let result = StepResult::failure(step.index, started_at, duration, step_error);
            (result, None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{FixedRowsSqlClient, PagedOktaClient, PermissiveValidator};
    use crate::collaborators::Collaborators;
    use crate::models::StepKind;

    fn test_collaborators() -> Collaborators {
        Collaborators {
            planner: Box::new(crate::collaborators::mock::FixedPlanner::single_sql("users")),
            sql: Box::new(FixedRowsSqlClient::new(5)),
            okta: Box::new(PagedOktaClient::new(10, 5)),
            validator: Box::new(PermissiveValidator),
        }
    }

    #[tokio::test]
    async fn sql_step_succeeds_and_emits_start_and_end() {
        let bus = Arc::new(EventBus::new(16));
        let collaborators = test_collaborators();
        let config = EngineConfig::default();
        let cancel = CancelSignal::new();
        let step = Step::new(2, StepKind::Sql, "users");
        let ctx = StepContext::default();

        let mut sub = bus.subscribe();
        let (result, outcome) =
            run_step(&bus, "list users", &step, &ctx, &cancel, &collaborators, &config).await;

        assert!(result.success);
        assert_eq!(result.record_count, 5);
        assert_eq!(outcome.unwrap().rows.len(), 5);

        let start = sub.recv().await.unwrap();
        assert!(matches!(start, crate::models::ExecutionEvent::StepStart { .. }));
        let end = sub.recv().await.unwrap();
        assert!(matches!(end, crate::models::ExecutionEvent::StepEnd { success: true, .. }));
    }

    #[tokio::test]
    async fn timeout_produces_timeout_error() {
        let bus = Arc::new(EventBus::new(16));
        let mut collaborators = test_collaborators();
        collaborators.sql = Box::new(crate::collaborators::mock::FixedRowsSqlClient {
            row_count: 1,
            delay: Duration::from_secs(5),
        });
        let mut config = EngineConfig::default();
        config.sql_step_timeout_seconds = 0;
        let cancel = CancelSignal::new();
        let step = Step::new(0, StepKind::Sql, "users");
        let ctx = StepContext::default();

        let (result, _) =
            run_step(&bus, "q", &step, &ctx, &cancel, &collaborators, &config).await;
        assert!(!result.success);
        assert_eq!(result.error.unwrap().kind, "timeout");
    }
}
