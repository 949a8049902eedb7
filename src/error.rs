//! Error taxonomy for the execution engine.

use thiserror::Error;

/// The stable error classification surfaced on `STEP-ERROR` and `ERROR` events.
///
/// Matches the taxonomy a handler or the runner itself can report; each variant
/// carries enough information for the client to decide whether retrying makes sense.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("step timed out after {0}s")]
    Timeout(u64),

    #[error("cancelled")]
    Cancelled,

    #[error("rate limited: {0}")]
    RateLimited(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("security violation: {0}")]
    SecurityViolation(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ErrorKind {
    /// The short tag used in wire events (`error_type`).
    pub fn tag(&self) -> &'static str {
        match self {
            ErrorKind::InvalidInput(_) => "invalid_input",
            ErrorKind::Auth(_) => "auth",
            ErrorKind::Timeout(_) => "timeout",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::RateLimited(_) => "rate_limited",
            ErrorKind::UpstreamUnavailable(_) => "upstream_unavailable",
            ErrorKind::SecurityViolation(_) => "security_violation",
            ErrorKind::Internal(_) => "internal",
        }
    }

    /// Whether a retry of the same step is plausible, per §7's propagation policy.
    ///
    /// `Internal` defaults to non-retryable; handlers that know better pass their
    /// own hint through [`HandlerError::retry_possible`] instead of relying on this.
    pub fn default_retry_possible(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited(_) | ErrorKind::UpstreamUnavailable(_)
        )
    }
}

/// The error a step handler returns on failure, en route to a [`crate::models::StepError`].
#[derive(Debug, Clone)]
pub struct HandlerError {
    pub kind: ErrorKind,
    pub retry_possible: bool,
    pub technical_details: Option<String>,
}

impl HandlerError {
    pub fn new(kind: ErrorKind) -> Self {
        let retry_possible = kind.default_retry_possible();
        Self {
            kind,
            retry_possible,
            technical_details: None,
        }
    }

    pub fn with_retry(mut self, retry_possible: bool) -> Self {
        self.retry_possible = retry_possible;
        self
    }

    pub fn with_technical_details(mut self, details: impl Into<String>) -> Self {
        self.technical_details = Some(details.into());
        self
    }

    pub fn timeout(seconds: u64) -> Self {
        Self::new(ErrorKind::Timeout(seconds)).with_retry(false)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled).with_retry(false)
    }
}

impl std::fmt::Display for HandlerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.kind)
    }
}

impl std::error::Error for HandlerError {}

/// Errors returned directly by the Orchestrator Facade, distinct from per-step errors
/// because they never reach a Step Result — they reject the call outright.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FacadeError {
    #[error("query is empty or exceeds the length limit")]
    InvalidQuery,

    #[error("owner has too many concurrent processes")]
    TooManyProcesses,

    #[error("not authorized")]
    Unauthorized,

    #[error("process not found")]
    NotFound,

    #[error("owner does not match process owner")]
    Forbidden,
}
