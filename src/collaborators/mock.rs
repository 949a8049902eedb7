//! Deterministic in-memory collaborators, per SPEC_FULL §10.5: used to run the engine
//! standalone (the `query` CLI subcommand) and to drive integration tests without real
//! network or database I/O. Delay, failure injection, and page counts are all configurable
//! so timeout/cancellation/retry properties can be exercised with millisecond sleeps.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use super::{
    CodeValidator, OktaClient, OktaPage, Planner, PlannerOutput, QueryRows, RateLimitInfo,
    SqlClient, ValidationResult,
};
use crate::error::{ErrorKind, HandlerError};
use crate::models::{CancelSignal, StepKind};

/// Sleeps for `delay`, returning early (as a cancellation error) if `cancel` fires first.
async fn sleep_cancellable(delay: Duration, cancel: &CancelSignal) -> Result<(), HandlerError> {
    if delay.is_zero() {
        if cancel.is_cancelled() {
            return Err(HandlerError::cancelled());
        }
        return Ok(());
    }
    let deadline = tokio::time::Instant::now() + delay;
    loop {
        if cancel.is_cancelled() {
            return Err(HandlerError::cancelled());
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(5).min(delay)).await;
    }
}

/// A planner that always produces the same fixed data-step list, optionally after a delay.
pub struct FixedPlanner {
    pub steps: Vec<(StepKind, String, String, String)>,
    pub delay: Duration,
}

impl FixedPlanner {
    pub fn single_sql(entity: impl Into<String>) -> Self {
        Self {
            steps: vec![(
                StepKind::Sql,
                entity.into(),
                "select".to_string(),
                "user asked for a listing".to_string(),
            )],
            delay: Duration::ZERO,
        }
    }

    pub fn single_api(entity: impl Into<String>) -> Self {
        Self {
            steps: vec![(
                StepKind::Api,
                entity.into(),
                "list".to_string(),
                "user asked for live data".to_string(),
            )],
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl Planner for FixedPlanner {
    async fn plan(&self, _query: &str) -> Result<PlannerOutput, HandlerError> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(PlannerOutput {
            steps: self.steps.clone(),
            input_tokens: 64,
            output_tokens: 32,
        })
    }
}

/// An in-memory "mirror" that returns a fixed row count of synthetic records.
pub struct FixedRowsSqlClient {
    pub row_count: usize,
    pub delay: Duration,
}

impl FixedRowsSqlClient {
    pub fn new(row_count: usize) -> Self {
        Self {
            row_count,
            delay: Duration::ZERO,
        }
    }
}

#[async_trait]
impl SqlClient for FixedRowsSqlClient {
    async fn query(
        &self,
        entity: &str,
        _operation: &str,
        cancel: &CancelSignal,
    ) -> Result<QueryRows, HandlerError> {
        sleep_cancellable(self.delay, cancel).await?;
        let rows: Vec<Value> = (0..self.row_count)
            .map(|i| json!({ "id": i, "entity": entity }))
            .collect();
        Ok(QueryRows {
            record_count: rows.len() as u64,
            rows,
        })
    }
}

/// An Okta client stub that pages through a fixed total, optionally rate-limiting once.
pub struct PagedOktaClient {
    pub total: u64,
    pub page_size: u64,
    pub rate_limit_on_page: Option<u64>,
    pub rate_limit_wait_seconds: u64,
    calls: AtomicUsize,
}

impl PagedOktaClient {
    pub fn new(total: u64, page_size: u64) -> Self {
        Self {
            total,
            page_size,
            rate_limit_on_page: None,
            rate_limit_wait_seconds: 1,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn with_rate_limit(mut self, on_page: u64, wait_seconds: u64) -> Self {
        self.rate_limit_on_page = Some(on_page);
        self.rate_limit_wait_seconds = wait_seconds;
        self
    }
}

#[async_trait]
impl OktaClient for PagedOktaClient {
    async fn get_page(
        &self,
        entity: &str,
        _operation: &str,
        cursor: Option<String>,
    ) -> Result<OktaPage, HandlerError> {
        let page_index: u64 = cursor.as_deref().and_then(|c| c.parse().ok()).unwrap_or(0);
        let call_number = self.calls.fetch_add(1, Ordering::SeqCst) as u64;

        if self.rate_limit_on_page == Some(page_index) && call_number == page_index {
            return Ok(OktaPage {
                records: Vec::new(),
                next_cursor: Some(page_index.to_string()),
                total: Some(self.total),
                rate_limited: Some(RateLimitInfo {
                    wait_seconds: self.rate_limit_wait_seconds,
                }),
            });
        }

        let start = page_index * self.page_size;
        let end = (start + self.page_size).min(self.total);
        let records: Vec<Value> = (start..end)
            .map(|i| json!({ "id": i, "entity": entity }))
            .collect();
        let next_cursor = if end < self.total {
            Some((page_index + 1).to_string())
        } else {
            None
        };

        Ok(OktaPage {
            records,
            next_cursor,
            total: Some(self.total),
            rate_limited: None,
        })
    }
}

/// Always-failing Okta client, for exercising the failure-mapping paths.
pub struct FailingOktaClient {
    pub kind: ErrorKind,
}

#[async_trait]
impl OktaClient for FailingOktaClient {
    async fn get_page(
        &self,
        _entity: &str,
        _operation: &str,
        _cursor: Option<String>,
    ) -> Result<OktaPage, HandlerError> {
        Err(HandlerError::new(self.kind.clone()))
    }
}

/// A validator that always approves, used by default; tests can substitute a rejecting one.
pub struct PermissiveValidator;

#[async_trait]
impl CodeValidator for PermissiveValidator {
    async fn validate(&self, _code: &str) -> ValidationResult {
        ValidationResult {
            ok: true,
            violations: Vec::new(),
        }
    }
}

/// A validator that rejects any code containing one of a configured set of banned tokens.
pub struct DenylistValidator {
    pub banned: Vec<String>,
}

#[async_trait]
impl CodeValidator for DenylistValidator {
    async fn validate(&self, code: &str) -> ValidationResult {
        let violations: Vec<String> = self
            .banned
            .iter()
            .filter(|needle| code.contains(needle.as_str()))
            .map(|needle| format!("forbidden token: {}", needle))
            .collect();
        ValidationResult {
            ok: violations.is_empty(),
            violations,
        }
    }
}
