//! Plan Executor, per §4.7: drives a Process's plan from planning through final delivery.

use std::sync::Arc;

use crate::chunked;
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::models::{ExecutionEvent, Plan, PlanningPhase, Process, ProcessStatus, StepResult};
use crate::step_runner::{self, StepContext};

/// Run the full lifecycle for one Process: planning, sequential step execution with
/// fail-stop on critical failure, and final result delivery.
pub async fn execute(process: &Arc<Process>, collaborators: &Collaborators, config: &EngineConfig) {
    process.set_status(ProcessStatus::Planning);

    process
        .bus
        .publish(ExecutionEvent::PlanningPhase {
            phase: PlanningPhase::PlanningStart,
            formatted_time: crate::models::formatted_now(),
        })
        .await;

    let planner_output = match collaborators.planner.plan(&process.query).await {
        Ok(output) => output,
        Err(err) => {
            fail_process(process, "planning failed", &err.to_string()).await;
            return;
        }
    };

    let plan = Plan::assemble(planner_output.steps);
    process.set_plan(plan.clone());

    process
        .bus
        .publish(ExecutionEvent::PlanningPhase {
            phase: PlanningPhase::PlanningComplete,
            formatted_time: crate::models::formatted_now(),
        })
        .await;

    process
        .bus
        .publish(ExecutionEvent::PlanGenerated {
            plan: plan.clone(),
            step_count: plan.step_count(),
            formatted_time: crate::models::formatted_now(),
        })
        .await;

    if planner_output.input_tokens > 0 || planner_output.output_tokens > 0 {
        process
            .bus
            .publish(ExecutionEvent::StepTokens {
                step_number: 1,
                input_tokens: planner_output.input_tokens,
                output_tokens: planner_output.output_tokens,
                agent_name: "planner".to_string(),
                formatted_time: crate::models::formatted_now(),
            })
            .await;
    }

    process.set_status(ProcessStatus::Executing);

    let mut ctx = StepContext::default();
    let mut results: Vec<StepResult> = Vec::with_capacity(plan.step_count());

    for step in &plan.steps {
        let (result, outcome) = step_runner::run_step(
            &process.bus,
            &process.query,
            step,
            &ctx,
            &process.cancel_signal,
            collaborators,
            config,
        )
        .await;

        let success = result.success;
        let sample = result.sample.clone();
        results.push(result);

        if let Some(outcome) = outcome {
            if !outcome.rows.is_empty() {
                ctx.accumulated_rows.extend(outcome.rows);
            }
            if outcome.artifact.is_some() {
                ctx.last_artifact = outcome.artifact;
            }
            if let Some(sample) = sample {
                ctx.prior = ctx.prior.pushed(step.index, sample);
            }
        }

        if !success {
            if process.cancel_signal.is_cancelled() {
                finish_cancelled(process).await;
            } else {
                finish_error(process, step.index).await;
            }
            return;
        }
    }

    if results.is_empty() {
        fail_process(process, "plan had no steps", "empty plan").await;
        return;
    }
    let Some(artifact) = ctx.last_artifact.clone() else {
        fail_process(process, "formatter produced no artifact", "missing artifact").await;
        return;
    };

    chunked::stream_result(
        &process.bus,
        &artifact,
        config.batch_size,
        config.batch_threshold,
        Some(&plan),
    )
    .await;

    process.set_status(ProcessStatus::Completed);
    process.bus.publish(ExecutionEvent::Done).await;
}

async fn fail_process(process: &Arc<Process>, error: &str, message: &str) {
    process.set_status(ProcessStatus::Error);
    process
        .bus
        .publish(ExecutionEvent::Error {
            error: error.to_string(),
            message: message.to_string(),
        })
        .await;
    process.bus.publish(ExecutionEvent::Done).await;
}

async fn finish_error(process: &Arc<Process>, failed_step: usize) {
    process.set_status(ProcessStatus::Error);
    process
        .bus
        .publish(ExecutionEvent::Error {
            error: format!("Step {} failed", failed_step),
            message: format!("Step {} failed", failed_step),
        })
        .await;
    process.bus.publish(ExecutionEvent::Done).await;
}

async fn finish_cancelled(process: &Arc<Process>) {
    process.set_status(ProcessStatus::Cancelled);
    process
        .bus
        .publish(ExecutionEvent::Error {
            error: "cancelled".to_string(),
            message: "cancelled".to_string(),
        })
        .await;
    process.bus.publish(ExecutionEvent::Done).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{FixedPlanner, FixedRowsSqlClient, PagedOktaClient, PermissiveValidator};
    use crate::collaborators::Collaborators;
    use crate::models::ExecutionEvent;

    fn collaborators_with(row_count: usize) -> Collaborators {
        Collaborators {
            planner: Box::new(FixedPlanner::single_sql("users")),
            sql: Box::new(FixedRowsSqlClient::new(row_count)),
            okta: Box::new(PagedOktaClient::new(10, 5)),
            validator: Box::new(PermissiveValidator),
        }
    }

    #[tokio::test]
    async fn small_sql_plan_completes_with_inline_results() {
        let process = Arc::new(Process::new(
            "p1".to_string(),
            "list all users".to_string(),
            "owner1".to_string(),
            64,
        ));
        let collaborators = collaborators_with(37);
        let config = EngineConfig::default();

        let mut sub = process.bus.subscribe();
        execute(&process, &collaborators, &config).await;

        let mut saw_plan_generated = false;
        let mut saw_complete = false;
        let mut saw_done = false;
        while let Some(event) = sub.recv().await {
            match event {
                ExecutionEvent::PlanGenerated { step_count, .. } => {
                    saw_plan_generated = true;
                    assert_eq!(step_count, 4);
                }
                ExecutionEvent::Complete { count, .. } => {
                    saw_complete = true;
                    assert_eq!(count, Some(37));
                }
                ExecutionEvent::Done => {
                    saw_done = true;
                    break;
                }
                _ => {}
            }
        }

        assert!(saw_plan_generated);
        assert!(saw_complete);
        assert!(saw_done);
        assert_eq!(process.status(), ProcessStatus::Completed);
    }
}
