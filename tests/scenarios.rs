//! Black-box scenarios driving the Orchestrator Facade end to end against deterministic
//! mock collaborators, matching the end-to-end traces the query engine is expected to
//! produce for a natural-language query: plan, execute, stream, complete.

use std::time::Duration;

use query_engine::collaborators::mock::{
    DenylistValidator, FailingOktaClient, FixedPlanner, FixedRowsSqlClient, PagedOktaClient,
    PermissiveValidator,
};
use query_engine::collaborators::Collaborators;
use query_engine::config::EngineConfig;
use query_engine::error::{ErrorKind, FacadeError};
use query_engine::models::{ExecutionEvent, ProcessStatus, StepKind};
use query_engine::orchestrator::Orchestrator;

fn collaborators(
    planner: FixedPlanner,
    sql: FixedRowsSqlClient,
    okta: PagedOktaClient,
) -> Collaborators {
    Collaborators {
        planner: Box::new(planner),
        sql: Box::new(sql),
        okta: Box::new(okta),
        validator: Box::new(PermissiveValidator),
    }
}

async fn drain(sub: &mut query_engine::bus::Subscription) -> Vec<ExecutionEvent> {
    let mut events = Vec::new();
    while let Some(event) = sub.recv().await {
        let is_terminal = matches!(event, ExecutionEvent::Done);
        events.push(event);
        if is_terminal {
            break;
        }
    }
    events
}

/// A simple SQL-only query runs thinking/generating_steps/sql/finalizing_results in order
/// and resolves to a single inline `COMPLETE` carrying every accumulated row.
#[tokio::test]
async fn sql_only_query_completes_with_inline_results() {
    let engine = Orchestrator::new(
        collaborators(
            FixedPlanner::single_sql("users"),
            FixedRowsSqlClient::new(12),
            PagedOktaClient::new(0, 10),
        ),
        EngineConfig::default(),
    );

    let process_id = engine.start_process("list all users", "alice").await.unwrap();
    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    let step_types: Vec<StepKind> = events
        .iter()
        .filter_map(|e| match e {
            ExecutionEvent::StepStart { step_type, .. } => Some(*step_type),
            _ => None,
        })
        .collect();
    assert_eq!(
        step_types,
        vec![
            StepKind::Thinking,
            StepKind::GeneratingSteps,
            StepKind::Sql,
            StepKind::FinalizingResults,
        ]
    );

    let complete = events
        .iter()
        .find_map(|e| match e {
            ExecutionEvent::Complete { count, .. } => Some(*count),
            _ => None,
        })
        .expect("expected a COMPLETE event");
    assert_eq!(complete, Some(12));
    assert_eq!(engine.status(&process_id, "alice").await.unwrap(), ProcessStatus::Completed);
}

/// A result set at or past the batch threshold streams as `METADATA` + batches + a
/// terminal chunked `COMPLETE`, rather than one inline `COMPLETE`.
#[tokio::test]
async fn large_result_set_streams_in_chunks() {
    let mut config = EngineConfig::default();
    config.batch_size = 100;
    config.batch_threshold = 100;

    let engine = Orchestrator::new(
        collaborators(
            FixedPlanner::single_sql("users"),
            FixedRowsSqlClient::new(250),
            PagedOktaClient::new(0, 10),
        ),
        config,
    );

    let process_id = engine.start_process("list every user", "alice").await.unwrap();
    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    let metadata = events
        .iter()
        .find(|e| matches!(e, ExecutionEvent::Metadata { .. }))
        .expect("expected a METADATA event");
    assert!(matches!(metadata, ExecutionEvent::Metadata { total_batches: 3, total_records: 250, .. }));

    let batch_count = events
        .iter()
        .filter(|e| matches!(e, ExecutionEvent::Batch { .. }))
        .count();
    assert_eq!(batch_count, 3);

    assert!(matches!(events.last(), Some(ExecutionEvent::Done)));
}

/// An Okta-backed step that gets rate-limited on its first page waits out the
/// `rate_limit` progress event, then resumes and completes normally.
#[tokio::test]
async fn rate_limited_api_step_retries_and_completes() {
    let okta = PagedOktaClient::new(30, 10).with_rate_limit(0, 0);
    let engine = Orchestrator::new(
        collaborators(FixedPlanner::single_api("users"), FixedRowsSqlClient::new(0), okta),
        EngineConfig::default(),
    );

    let process_id = engine.start_process("list active users", "alice").await.unwrap();
    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    let saw_rate_limit = events.iter().any(|e| {
        matches!(
            e,
            ExecutionEvent::StepProgress {
                progress_type: query_engine::models::ProgressType::RateLimit,
                ..
            }
        )
    });
    assert!(saw_rate_limit, "expected a rate_limit progress event before completion");
    assert_eq!(engine.status(&process_id, "alice").await.unwrap(), ProcessStatus::Completed);
}

/// An Okta collaborator that always fails with an unrecoverable error surfaces a
/// `STEP-ERROR`, halts the plan, and leaves the Process in `Error`.
#[tokio::test]
async fn unrecoverable_api_failure_halts_the_process() {
    let okta = FailingOktaClient {
        kind: ErrorKind::Auth("token revoked".to_string()),
    };
    let engine = Orchestrator::new(
        Collaborators {
            planner: Box::new(FixedPlanner::single_api("users")),
            sql: Box::new(FixedRowsSqlClient::new(0)),
            okta: Box::new(okta),
            validator: Box::new(PermissiveValidator),
        },
        EngineConfig::default(),
    );

    let process_id = engine.start_process("list users", "alice").await.unwrap();
    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    assert!(events.iter().any(|e| matches!(e, ExecutionEvent::StepError { .. })));
    assert!(events.iter().any(|e| matches!(e, ExecutionEvent::Error { .. })));
    assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::Complete { .. })));
    assert_eq!(engine.status(&process_id, "alice").await.unwrap(), ProcessStatus::Error);
}

/// Cancelling mid-execution stops the Process without a `COMPLETE`, and a second cancel
/// is a harmless no-op.
#[tokio::test]
async fn cancel_mid_execution_stops_without_completing() {
    let sql = FixedRowsSqlClient {
        row_count: 5,
        delay: Duration::from_millis(200),
    };
    let engine = Orchestrator::new(
        collaborators(FixedPlanner::single_sql("users"), sql, PagedOktaClient::new(0, 10)),
        EngineConfig::default(),
    );

    let process_id = engine.start_process("list users", "alice").await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    engine.cancel(&process_id, "alice").await.unwrap();
    engine.cancel(&process_id, "alice").await.unwrap();

    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    assert!(!events.iter().any(|e| matches!(e, ExecutionEvent::Complete { .. })));
    assert_eq!(engine.status(&process_id, "alice").await.unwrap(), ProcessStatus::Cancelled);
}

/// A generated script containing a banned token is rejected by `security_validation`
/// before `script_execution` ever runs, and the Process ends in `Error`.
#[tokio::test]
async fn security_violation_blocks_script_execution() {
    let script = "#!/bin/sh\nrm -rf /\n".to_string();
    let planner = FixedPlanner {
        steps: vec![
            (
                StepKind::SecurityValidation,
                "script".to_string(),
                script.clone(),
                "generated script needs approval".to_string(),
            ),
            (
                StepKind::ScriptExecution,
                "script".to_string(),
                script,
                "run the approved script".to_string(),
            ),
        ],
        delay: Duration::ZERO,
    };

    let engine = Orchestrator::new(
        Collaborators {
            planner: Box::new(planner),
            sql: Box::new(FixedRowsSqlClient::new(0)),
            okta: Box::new(PagedOktaClient::new(0, 10)),
            validator: Box::new(DenylistValidator {
                banned: vec!["rm -rf".to_string()],
            }),
        },
        EngineConfig::default(),
    );

    let process_id = engine.start_process("delete everything", "alice").await.unwrap();
    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    let security_error = events.iter().find_map(|e| match e {
        ExecutionEvent::StepError { error_type, .. } => Some(error_type.clone()),
        _ => None,
    });
    assert_eq!(security_error.as_deref(), Some("security_violation"));

    let script_ran = events
        .iter()
        .any(|e| matches!(e, ExecutionEvent::StepStart { step_type: StepKind::ScriptExecution, .. }));
    assert!(!script_ran, "script_execution must not start after a failed security_validation");
    assert_eq!(engine.status(&process_id, "alice").await.unwrap(), ProcessStatus::Error);
}

/// A validated script that actually runs produces a text artifact that survives through
/// to `finalizing_results` unmodified, rather than being replaced by an empty tabular
/// formatter result.
#[tokio::test]
async fn validated_script_execution_delivers_its_own_artifact() {
    let script = "#!/bin/sh\necho 'hello from the sandbox'\n".to_string();
    let planner = FixedPlanner {
        steps: vec![
            (
                StepKind::SecurityValidation,
                "script".to_string(),
                script.clone(),
                "generated script needs approval".to_string(),
            ),
            (StepKind::ScriptExecution, "script".to_string(), script, "run the approved script".to_string()),
        ],
        delay: Duration::ZERO,
    };

    let engine = Orchestrator::new(
        Collaborators {
            planner: Box::new(planner),
            sql: Box::new(FixedRowsSqlClient::new(0)),
            okta: Box::new(PagedOktaClient::new(0, 10)),
            validator: Box::new(PermissiveValidator),
        },
        EngineConfig::default(),
    );

    let process_id = engine.start_process("run the report script", "alice").await.unwrap();
    let mut sub = engine.subscribe(&process_id, "alice").await.unwrap();
    let events = drain(&mut sub).await;

    let complete = events.iter().find_map(|e| match e {
        ExecutionEvent::Complete { display_type, content, .. } => Some((display_type.clone(), content.clone())),
        _ => None,
    });
    let (display_type, content) = complete.expect("expected a COMPLETE event");
    assert_eq!(display_type, "text");
    assert_eq!(content, serde_json::Value::String("hello from the sandbox".to_string()));
    assert_eq!(engine.status(&process_id, "alice").await.unwrap(), ProcessStatus::Completed);
}

/// `Subscribe` enforces ownership and `StartProcess` rejects an empty query, exercised
/// through the facade rather than the registry directly.
#[tokio::test]
async fn facade_enforces_ownership_and_query_validation() {
    let engine = Orchestrator::new(
        collaborators(
            FixedPlanner::single_sql("users"),
            FixedRowsSqlClient::new(1),
            PagedOktaClient::new(0, 10),
        ),
        EngineConfig::default(),
    );

    assert!(matches!(
        engine.start_process("\t  \n", "alice").await,
        Err(FacadeError::InvalidQuery)
    ));

    let process_id = engine.start_process("list users", "alice").await.unwrap();
    assert!(matches!(
        engine.subscribe(&process_id, "mallory").await,
        Err(FacadeError::Forbidden)
    ));
}
