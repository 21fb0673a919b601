use crate::sse::{AnalysisStep, StepStatus};
use serde::Serialize;
use tracing::warn;

/// UI-facing status of one analysis step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum StepState {
    Pending,
    Processing,
    Completed,
}

/// Ordered progress of the server-side analysis pipeline. Statuses are
/// monotonic: a step moves pending → processing → completed and never
/// backward within one attempt; a regressive server event is ignored.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisProgress {
    steps: Vec<(AnalysisStep, StepState)>,
}

impl AnalysisProgress {
    pub fn new() -> Self {
        Self {
            steps: AnalysisStep::ALL
                .iter()
                .map(|&step| (step, StepState::Pending))
                .collect(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn apply(&mut self, step: AnalysisStep, status: StepStatus) {
        let next = match status {
            StepStatus::Start => StepState::Processing,
            StepStatus::Completed => StepState::Completed,
        };

        let Some(entry) = self.steps.iter_mut().find(|(s, _)| *s == step) else {
            return;
        };

        if next < entry.1 {
            warn!(
                "Ignoring regressive step update: {:?} {:?} -> {:?}",
                step, entry.1, next
            );
            return;
        }
        entry.1 = next;
    }

    pub fn state_of(&self, step: AnalysisStep) -> StepState {
        self.steps
            .iter()
            .find(|(s, _)| *s == step)
            .map(|(_, state)| *state)
            .unwrap_or(StepState::Pending)
    }

    pub fn all_completed(&self) -> bool {
        self.steps
            .iter()
            .all(|(_, state)| *state == StepState::Completed)
    }

    pub fn steps(&self) -> &[(AnalysisStep, StepState)] {
        &self.steps
    }
}

impl Default for AnalysisProgress {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_all_pending_in_pipeline_order() {
        let progress = AnalysisProgress::new();
        assert_eq!(progress.steps().len(), 4);
        assert_eq!(progress.steps()[0].0, AnalysisStep::Uploading);
        assert_eq!(progress.steps()[3].0, AnalysisStep::Generating);
        assert!(progress
            .steps()
            .iter()
            .all(|(_, state)| *state == StepState::Pending));
    }

    #[test]
    fn wire_statuses_map_to_ui_states() {
        let mut progress = AnalysisProgress::new();
        progress.apply(AnalysisStep::Uploading, StepStatus::Start);
        assert_eq!(
            progress.state_of(AnalysisStep::Uploading),
            StepState::Processing
        );

        progress.apply(AnalysisStep::Uploading, StepStatus::Completed);
        assert_eq!(
            progress.state_of(AnalysisStep::Uploading),
            StepState::Completed
        );
    }

    #[test]
    fn completed_step_never_reverts() {
        let mut progress = AnalysisProgress::new();
        progress.apply(AnalysisStep::Transcribing, StepStatus::Completed);
        progress.apply(AnalysisStep::Transcribing, StepStatus::Start);
        assert_eq!(
            progress.state_of(AnalysisStep::Transcribing),
            StepState::Completed
        );
    }

    #[test]
    fn all_completed_only_after_every_step() {
        let mut progress = AnalysisProgress::new();
        for step in AnalysisStep::ALL {
            assert!(!progress.all_completed());
            progress.apply(step, StepStatus::Completed);
        }
        assert!(progress.all_completed());
    }

    #[test]
    fn reset_returns_to_all_pending() {
        let mut progress = AnalysisProgress::new();
        progress.apply(AnalysisStep::Uploading, StepStatus::Completed);
        progress.reset();
        assert_eq!(
            progress.state_of(AnalysisStep::Uploading),
            StepState::Pending
        );
    }
}
