//! Data model for the execution engine: processes, plans, steps, results, and events.

mod event;
mod plan;
mod process;
mod step_result;

pub use event::{formatted_now, rfc3339, ExecutionEvent, PlanningPhase, ProgressType};
pub use plan::{Plan, Step, StepKind};
pub use process::{CancelSignal, Process, ProcessStatus};
pub use step_result::{Artifact, DisplayType, Sample, StepError, StepResult};

/// Maximum length of a sanitized query string, per §4.1.
pub const MAX_QUERY_LEN: usize = 2000;

/// Sanitize and validate a raw query string: strip control characters, trim, bound length.
pub fn sanitize_query(raw: &str) -> Option<String> {
    let stripped: String = raw.chars().filter(|c| !c.is_control()).collect();
    let trimmed = stripped.trim();
    if trimmed.is_empty() || trimmed.chars().count() > MAX_QUERY_LEN {
        return None;
    }
    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_empty_query() {
        assert!(sanitize_query("   ").is_none());
        assert!(sanitize_query("").is_none());
    }

    #[test]
    fn rejects_oversize_query() {
        let huge = "a".repeat(MAX_QUERY_LEN + 1);
        assert!(sanitize_query(&huge).is_none());
    }

    #[test]
    fn strips_control_characters_and_trims() {
        let raw = "  list \x07all users\t\n";
        let cleaned = sanitize_query(raw).unwrap();
        assert_eq!(cleaned, "list all users");
    }
}
