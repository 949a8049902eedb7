//! The Process: one end-to-end query execution.

use chrono::{DateTime, Utc};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use super::Plan;
use crate::bus::EventBus;

/// Lifecycle status of a [`Process`], per §3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessStatus {
    Initializing,
    Planning,
    Executing,
    Completed,
    Error,
    Cancelled,
}

impl ProcessStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ProcessStatus::Completed | ProcessStatus::Error | ProcessStatus::Cancelled
        )
    }
}

/// A cooperative cancellation flag shared between the facade and the running step.
///
/// Cheap to clone and check; `cancel()` is idempotent (§5, "repeated cancels are no-ops").
#[derive(Clone, Default)]
pub struct CancelSignal(Arc<AtomicBool>);

impl CancelSignal {
    pub fn new() -> Self {
        Self(Arc::new(AtomicBool::new(false)))
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// One end-to-end query execution, per §3.
///
/// The bus endpoint and event sequencing live on [`crate::bus::EventBus`]; the `Process`
/// struct itself is the registry-visible handle: identity, status, plan, cancel signal.
pub struct Process {
    pub id: String,
    pub query: String,
    pub owner: String,
    pub status: std::sync::RwLock<ProcessStatus>,
    pub created_at: DateTime<Utc>,
    pub plan: std::sync::RwLock<Option<Plan>>,
    pub cancel_signal: CancelSignal,
    pub bus: Arc<EventBus>,
}

impl Process {
    pub fn new(id: String, query: String, owner: String, bus_capacity: usize) -> Self {
        Self {
            id,
            query,
            owner,
            status: std::sync::RwLock::new(ProcessStatus::Initializing),
            created_at: Utc::now(),
            plan: std::sync::RwLock::new(None),
            cancel_signal: CancelSignal::new(),
            bus: Arc::new(EventBus::new(bus_capacity)),
        }
    }

    pub fn status(&self) -> ProcessStatus {
        *self.status.read().expect("process status lock poisoned")
    }

    pub fn set_status(&self, status: ProcessStatus) {
        *self.status.write().expect("process status lock poisoned") = status;
    }

    pub fn set_plan(&self, plan: Plan) {
        *self.plan.write().expect("process plan lock poisoned") = Some(plan);
    }

    pub fn owned_by(&self, owner: &str) -> bool {
        self.owner == owner
    }
}
