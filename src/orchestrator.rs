//! Orchestrator Facade, per §4.1: the engine's public surface — `StartProcess`,
//! `Subscribe`, `Cancel` — coordinating the Process Registry, the Plan Executor, and the
//! Event Bus on behalf of a caller (the HTTP/SSE surface or a CLI smoke test).

use std::sync::Arc;

use uuid::Uuid;

use crate::bus::Subscription;
use crate::collaborators::Collaborators;
use crate::config::EngineConfig;
use crate::error::FacadeError;
use crate::models::{sanitize_query, Process, ProcessStatus};
use crate::registry::ProcessRegistry;

/// Owns the Process Registry and the collaborator bundle every Process's Plan Executor
/// runs against. One `Orchestrator` is constructed at engine startup and shared (behind
/// `Arc`) across every request the HTTP surface serves.
pub struct Orchestrator {
    registry: Arc<ProcessRegistry>,
    collaborators: Arc<Collaborators>,
    config: EngineConfig,
}

impl Orchestrator {
    pub fn new(collaborators: Collaborators, config: EngineConfig) -> Self {
        Self {
            registry: Arc::new(ProcessRegistry::new(
                config.owner_quota,
                std::time::Duration::from_secs(config.process_grace_seconds),
            )),
            collaborators: Arc::new(collaborators),
            config,
        }
    }

    /// Spawn the reaper task that evicts terminal Processes past their grace window.
    /// Returns the task handle so callers can abort it on shutdown.
    pub fn spawn_reaper(&self, interval: std::time::Duration) -> tokio::task::JoinHandle<()> {
        crate::registry::spawn_reaper(self.registry.clone(), interval)
    }

    /// `StartProcess(query, owner) -> process_id`, per §4.1.
    ///
    /// Registers the Process and returns immediately; plan generation and execution run
    /// on a spawned task rather than blocking the caller.
    pub async fn start_process(&self, query: &str, owner: &str) -> Result<String, FacadeError> {
        let sanitized = sanitize_query(query).ok_or(FacadeError::InvalidQuery)?;

        let id = Uuid::new_v4().to_string();
        let process = Arc::new(Process::new(
            id.clone(),
            sanitized,
            owner.to_string(),
            self.config.event_bus_capacity,
        ));

        self.registry.create(process.clone()).await?;

        let collaborators = self.collaborators.clone();
        let config = self.config.clone();
        tokio::spawn(async move {
            crate::plan_executor::execute(&process, &collaborators, &config).await;
        });

        Ok(id)
    }

    /// `Subscribe(process_id, owner) -> event stream`, per §4.1.
    ///
    /// Attaching detaches any prior subscriber (§4.2's sole-active-consumer rule, enforced
    /// by [`crate::bus::EventBus::subscribe`] itself).
    pub async fn subscribe(
        &self,
        process_id: &str,
        owner: &str,
    ) -> Result<Subscription, FacadeError> {
        let process = self.registry.get(process_id, owner).await?;
        Ok(process.bus.subscribe())
    }

    /// `Cancel(process_id, owner) -> ack`, per §4.1. Idempotent: cancelling an
    /// already-terminal or already-cancelled Process is a no-op that still succeeds.
    pub async fn cancel(&self, process_id: &str, owner: &str) -> Result<(), FacadeError> {
        let process = self.registry.get(process_id, owner).await?;
        if !process.status().is_terminal() {
            process.cancel_signal.cancel();
        }
        Ok(())
    }

    /// Current lifecycle status of a Process, for a lightweight polling endpoint.
    pub async fn status(&self, process_id: &str, owner: &str) -> Result<ProcessStatus, FacadeError> {
        let process = self.registry.get(process_id, owner).await?;
        Ok(process.status())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collaborators::mock::{FixedPlanner, FixedRowsSqlClient, PagedOktaClient, PermissiveValidator};
    use crate::models::ExecutionEvent;

    fn engine() -> Orchestrator {
        let collaborators = Collaborators {
            planner: Box::new(FixedPlanner::single_sql("users")),
            sql: Box::new(FixedRowsSqlClient::new(10)),
            okta: Box::new(PagedOktaClient::new(10, 5)),
            validator: Box::new(PermissiveValidator),
        };
        Orchestrator::new(collaborators, EngineConfig::default())
    }

    #[tokio::test]
    async fn start_process_rejects_empty_query() {
        let engine = engine();
        let result = engine.start_process("   ", "alice").await;
        assert!(matches!(result, Err(FacadeError::InvalidQuery)));
    }

    #[tokio::test]
    async fn subscribe_enforces_ownership() {
        let engine = engine();
        let id = engine.start_process("list users", "alice").await.unwrap();
        let result = engine.subscribe(&id, "mallory").await;
        assert!(matches!(result, Err(FacadeError::Forbidden)));
        assert!(engine.subscribe(&id, "alice").await.is_ok());
    }

    #[tokio::test]
    async fn subscribe_then_drain_reaches_done() {
        let engine = engine();
        let id = engine.start_process("list users", "alice").await.unwrap();
        let mut sub = engine.subscribe(&id, "alice").await.unwrap();

        let mut saw_done = false;
        while let Some(event) = sub.recv().await {
            if matches!(event, ExecutionEvent::Done) {
                saw_done = true;
                break;
            }
        }
        assert!(saw_done);
        assert_eq!(engine.status(&id, "alice").await.unwrap(), ProcessStatus::Completed);
    }

    #[tokio::test]
    async fn cancel_unknown_process_is_not_found() {
        let engine = engine();
        let result = engine.cancel("missing", "alice").await;
        assert!(matches!(result, Err(FacadeError::NotFound)));
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let engine = engine();
        let id = engine.start_process("list users", "alice").await.unwrap();
        assert!(engine.cancel(&id, "alice").await.is_ok());
        assert!(engine.cancel(&id, "alice").await.is_ok());
    }
}
