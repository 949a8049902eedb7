//! Plan and Step: the ordered, immutable sequence of work a Process executes.

use serde::{Deserialize, Serialize};

/// The kind of a [`Step`], per §3. Drives Step Registry lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepKind {
    Sql,
    Api,
    SystemLog,
    ResultsFormatter,
    Thinking,
    GeneratingSteps,
    FinalizingResults,
    ReactDiscovery,
    SecurityValidation,
    ScriptExecution,
}

impl StepKind {
    /// Bookend steps structure the timeline but never fail-stop the Process.
    pub fn is_bookend(self) -> bool {
        matches!(
            self,
            StepKind::Thinking | StepKind::GeneratingSteps | StepKind::FinalizingResults
        )
    }

    /// Invariant from §3: all data-producing/synthesis steps are critical, bookends are not.
    pub fn is_critical(self) -> bool {
        !self.is_bookend()
    }
}

/// A single executable unit within a [`Plan`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Step {
    pub index: usize,
    pub kind: StepKind,
    pub entity: String,
    pub operation: String,
    pub reasoning: String,
    pub critical: bool,
}

impl Step {
    pub fn new(index: usize, kind: StepKind, entity: impl Into<String>) -> Self {
        Self {
            index,
            kind,
            entity: entity.into(),
            operation: String::new(),
            reasoning: String::new(),
            critical: kind.is_critical(),
        }
    }

    pub fn with_operation(mut self, operation: impl Into<String>) -> Self {
        self.operation = operation.into();
        self
    }

    pub fn with_reasoning(mut self, reasoning: impl Into<String>) -> Self {
        self.reasoning = reasoning.into();
        self
    }
}

/// Ordered sequence of steps plus the fixed bookends, per §3.
///
/// Constructed once by [`crate::plan_executor::PlanExecutor`] from the data steps a planner
/// produces; immutable thereafter. `thinking` and `generating_steps` occupy indices 0 and 1;
/// `finalizing_results` is always the last index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub steps: Vec<Step>,
}

impl Plan {
    /// Build a full plan from the data steps a planner produced, inserting the bookends
    /// at their reserved positions and re-indexing everything to stay contiguous.
    pub fn assemble(data_steps: Vec<(StepKind, String, String, String)>) -> Self {
        let mut steps = Vec::with_capacity(data_steps.len() + 3);

        steps.push(
            Step::new(0, StepKind::Thinking, "plan")
                .with_operation("reason about the query")
                .with_reasoning("bookend: planning start"),
        );
        steps.push(
            Step::new(1, StepKind::GeneratingSteps, "plan")
                .with_operation("produce execution steps")
                .with_reasoning("bookend: plan assembled"),
        );

        for (kind, entity, operation, reasoning) in data_steps {
            let index = steps.len();
            steps.push(
                Step::new(index, kind, entity)
                    .with_operation(operation)
                    .with_reasoning(reasoning),
            );
        }

        let final_index = steps.len();
        steps.push(
            Step::new(final_index, StepKind::FinalizingResults, "results")
                .with_operation("assemble final output")
                .with_reasoning("bookend: formatter"),
        );

        Self { steps }
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    /// Invariant check used in tests and by defensive callers: indices are contiguous,
    /// unique, and the bookend positions hold the expected kinds.
    pub fn is_well_formed(&self) -> bool {
        if self.steps.len() < 3 {
            return false;
        }
        for (i, step) in self.steps.iter().enumerate() {
            if step.index != i {
                return false;
            }
        }
        self.steps[0].kind == StepKind::Thinking
            && self.steps[1].kind == StepKind::GeneratingSteps
            && self.steps.last().unwrap().kind == StepKind::FinalizingResults
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn assemble_places_bookends_correctly() {
        let plan = Plan::assemble(vec![(
            StepKind::Sql,
            "users".into(),
            "select users".into(),
            "user asked for users".into(),
        )]);
        assert!(plan.is_well_formed());
        assert_eq!(plan.step_count(), 4);
        assert_eq!(plan.get(2).unwrap().kind, StepKind::Sql);
        assert!(!plan.get(0).unwrap().critical);
        assert!(plan.get(2).unwrap().critical);
    }
}
