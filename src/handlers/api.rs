//! API Step Handler, per §4.5.

use std::time::Duration;

use crate::collaborators::OktaClient;
use crate::error::{ErrorKind, HandlerError};
use crate::models::{CancelSignal, ProgressType, Step};

use super::{HandlerOutcome, HandlerResult, PriorSummary, ProgressEmitter};

/// Bounded local retry budget for transient upstream failures and exhausted rate-limit
/// waits, per §7's propagation policy.
const MAX_RETRY_ATTEMPTS: u32 = 3;

async fn sleep_cancellable(duration: Duration, cancel: &CancelSignal) -> Result<(), HandlerError> {
    let deadline = tokio::time::Instant::now() + duration;
    loop {
        if cancel.is_cancelled() {
            return Err(HandlerError::cancelled());
        }
        let now = tokio::time::Instant::now();
        if now >= deadline {
            return Ok(());
        }
        tokio::time::sleep(Duration::from_millis(20).min(deadline - now)).await;
    }
}

/// Translates the step into a sequence of Okta GET calls, paging until exhausted.
/// Emits `STEP-PROGRESS` per page with `current`/`total`, and handles 429s and transient
/// upstream errors with bounded, cancellation-aware retries before surfacing a failure.
pub async fn run(
    step: &Step,
    _prior: &PriorSummary,
    cancel: &CancelSignal,
    okta: &dyn OktaClient,
    emitter: &ProgressEmitter,
) -> HandlerResult {
    let mut rows = Vec::new();
    let mut cursor: Option<String> = None;
    let mut rate_limit_attempts = 0u32;
    let mut upstream_attempts = 0u32;
    let mut fetched: u64 = 0;

    loop {
        if cancel.is_cancelled() {
            return Err(HandlerError::cancelled());
        }

        let page = match okta.get_page(&step.entity, &step.operation, cursor.clone()).await {
            Ok(page) => page,
            Err(err) => {
                if matches!(err.kind, ErrorKind::UpstreamUnavailable(_)) {
                    upstream_attempts += 1;
                    if upstream_attempts > MAX_RETRY_ATTEMPTS {
                        return Err(err);
                    }
                    let backoff = Duration::from_secs(1u64 << (upstream_attempts - 1));
                    sleep_cancellable(backoff, cancel).await?;
                    continue;
                }
                return Err(err);
            }
        };

        if let Some(rate_limited) = page.rate_limited {
            rate_limit_attempts += 1;
            if rate_limit_attempts > MAX_RETRY_ATTEMPTS {
                return Err(HandlerError::new(ErrorKind::RateLimited(format!(
                    "exhausted {} retry attempts",
                    MAX_RETRY_ATTEMPTS
                ))));
            }
            emitter
                .rate_limit(rate_limited.wait_seconds, "rate limited by Okta, waiting")
                .await;
            sleep_cancellable(Duration::from_secs(rate_limited.wait_seconds), cancel).await?;
            continue;
        }

        upstream_attempts = 0;
        fetched += page.records.len() as u64;
        rows.extend(page.records);

        emitter
            .progress(
                ProgressType::Generic,
                Some(fetched),
                page.total,
                format!("fetched {} records", fetched),
            )
            .await;

        match page.next_cursor {
            Some(next) => cursor = Some(next),
            None => break,
        }
    }

    Ok(HandlerOutcome::rows(rows))
}
