//! Bookend step handler: `thinking`, `generating_steps`. Structures the timeline the client
//! sees but does no collaborator work itself — per §9 Open Question 3, this implementation
//! consolidates the planner's own lifecycle into the `STEP-START`/`STEP-END` pair the Plan
//! Executor emits on its behalf, rather than a separate planning event stream.

use super::{HandlerOutcome, HandlerResult, PriorSummary};
use crate::models::{CancelSignal, Step};

pub async fn run(_step: &Step, _prior: &PriorSummary, cancel: &CancelSignal) -> HandlerResult {
    if cancel.is_cancelled() {
        return Err(crate::error::HandlerError::cancelled());
    }
    Ok(HandlerOutcome::default())
}
