//! External collaborators, per §6: the planner, SQL mirror, Okta HTTP client, and code
//! validator. Treated as typed data sources with bounded operations; this crate owns only
//! the trait boundary plus a set of deterministic in-memory implementations used to run
//! the engine standalone and to drive the integration tests.

pub mod mock;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::HandlerError;
use crate::models::{CancelSignal, StepKind};

/// Data steps a planner produced for a query, plus any token usage to report on the
/// `generating_steps` bookend.
#[derive(Debug, Clone)]
pub struct PlannerOutput {
    pub steps: Vec<(StepKind, String, String, String)>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// Produces a Plan's data steps for a sanitized query. Bookend insertion and the
/// `PLANNING-PHASE`/`PLAN-GENERATED` events are the Plan Executor's responsibility (§9,
/// Open Question 3) — the planner only returns the data steps themselves.
#[async_trait]
pub trait Planner: Send + Sync {
    async fn plan(&self, query: &str) -> Result<PlannerOutput, HandlerError>;
}

/// One page of rows from the local mirror database.
#[derive(Debug, Clone, Default)]
pub struct QueryRows {
    pub rows: Vec<Value>,
    pub record_count: u64,
}

/// `Query(ctx, text, params) -> Rows`, per §6. Implementations must honor `cancel` between
/// page fetches and perform no writes.
#[async_trait]
pub trait SqlClient: Send + Sync {
    async fn query(
        &self,
        entity: &str,
        operation: &str,
        cancel: &CancelSignal,
    ) -> Result<QueryRows, HandlerError>;
}

/// Rate-limit metadata surfaced by the Okta collaborator on a 429 response.
#[derive(Debug, Clone)]
pub struct RateLimitInfo {
    pub wait_seconds: u64,
}

/// One page of an Okta GET call.
#[derive(Debug, Clone)]
pub struct OktaPage {
    pub records: Vec<Value>,
    pub next_cursor: Option<String>,
    pub total: Option<u64>,
    pub rate_limited: Option<RateLimitInfo>,
}

/// `Get(ctx, endpoint, params) -> Response`, per §6. The client enforces its own per-call
/// timeout; the Step Runner's deadline dominates it.
#[async_trait]
pub trait OktaClient: Send + Sync {
    async fn get_page(
        &self,
        entity: &str,
        operation: &str,
        cursor: Option<String>,
    ) -> Result<OktaPage, HandlerError>;
}

/// `Validate(code) -> {ok, violations[]}`, per §6.
#[derive(Debug, Clone, Default)]
pub struct ValidationResult {
    pub ok: bool,
    pub violations: Vec<String>,
}

#[async_trait]
pub trait CodeValidator: Send + Sync {
    async fn validate(&self, code: &str) -> ValidationResult;
}

/// The bundle of collaborators an Orchestrator Facade needs. Held behind `Arc` in
/// `AppState` and handed to the Plan Executor per Process.
pub struct Collaborators {
    pub planner: Box<dyn Planner>,
    pub sql: Box<dyn SqlClient>,
    pub okta: Box<dyn OktaClient>,
    pub validator: Box<dyn CodeValidator>,
}
