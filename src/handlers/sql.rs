//! SQL Step Handler, per §4.4.

use crate::collaborators::SqlClient;
use crate::error::HandlerError;
use crate::models::{CancelSignal, Step};

use super::{HandlerOutcome, HandlerResult, PriorSummary, ProgressEmitter};

/// Runs a read-only query against the local mirror database. No progress is emitted
/// (§4.3's table: `sql` does not emit progress) — the handler either returns the full row
/// set or fails.
pub async fn run(
    step: &Step,
    _prior: &PriorSummary,
    cancel: &CancelSignal,
    sql: &dyn SqlClient,
    _emitter: &ProgressEmitter,
) -> HandlerResult {
    let rows = sql.query(&step.entity, &step.operation, cancel).await?;
    if cancel.is_cancelled() {
        return Err(HandlerError::cancelled());
    }
    Ok(HandlerOutcome::rows(rows.rows))
}
