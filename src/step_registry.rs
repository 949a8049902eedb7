//! Step Registry: static metadata per step kind, per §4.3.

use std::time::Duration;

use crate::config::EngineConfig;
use crate::models::StepKind;

/// Declared capabilities of a step kind, independent of any one Process.
#[derive(Debug, Clone, Copy)]
pub struct StepMeta {
    pub critical: bool,
    pub emits_progress: bool,
}

impl StepMeta {
    const fn new(critical: bool, emits_progress: bool) -> Self {
        Self {
            critical,
            emits_progress,
        }
    }
}

/// Look up the declared metadata for a step kind (§4.3's table).
pub fn meta(kind: StepKind) -> StepMeta {
    match kind {
        StepKind::Sql => StepMeta::new(true, false),
        StepKind::Api => StepMeta::new(true, true),
        StepKind::SystemLog => StepMeta::new(true, true),
        StepKind::ResultsFormatter => StepMeta::new(true, false),
        StepKind::ScriptExecution => StepMeta::new(true, true),
        StepKind::SecurityValidation => StepMeta::new(true, false),
        StepKind::ReactDiscovery => StepMeta::new(true, true),
        StepKind::Thinking | StepKind::GeneratingSteps | StepKind::FinalizingResults => {
            StepMeta::new(false, false)
        }
    }
}

/// Default per-step deadline, resolved against the engine's configured timeouts.
/// `None` means no deadline is enforced (bookends: §4.3's table lists them `n/a`).
pub fn default_timeout(kind: StepKind, config: &EngineConfig) -> Option<Duration> {
    let seconds = match kind {
        StepKind::Sql => config.sql_step_timeout_seconds,
        StepKind::Api | StepKind::SystemLog | StepKind::ReactDiscovery => {
            config.api_step_timeout_seconds
        }
        StepKind::ScriptExecution | StepKind::SecurityValidation => {
            config.script_timeout_seconds
        }
        StepKind::ResultsFormatter => config.sql_step_timeout_seconds,
        StepKind::Thinking | StepKind::GeneratingSteps | StepKind::FinalizingResults => {
            return None;
        }
    };
    Some(Duration::from_secs(seconds))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bookends_are_non_critical_and_silent() {
        let m = meta(StepKind::Thinking);
        assert!(!m.critical);
        assert!(!m.emits_progress);
    }

    #[test]
    fn api_step_is_critical_and_emits_progress() {
        let m = meta(StepKind::Api);
        assert!(m.critical);
        assert!(m.emits_progress);
    }

    #[test]
    fn default_timeout_uses_configured_seconds() {
        let config = EngineConfig::default();
        assert_eq!(
            default_timeout(StepKind::Api, &config),
            Some(Duration::from_secs(config.api_step_timeout_seconds))
        );
        assert_eq!(
            default_timeout(StepKind::Sql, &config),
            Some(Duration::from_secs(config.sql_step_timeout_seconds))
        );
    }

    #[test]
    fn bookends_have_no_enforced_deadline() {
        let config = EngineConfig::default();
        assert_eq!(default_timeout(StepKind::Thinking, &config), None);
    }
}
