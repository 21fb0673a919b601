use serde::Serialize;

/// Practice-session phases. Exactly one is active; `transition` is the only
/// way the controller moves between them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Listening,
    Preparing,
    Recording,
    Confirmation,
    Analyzing,
    Report,
}

/// Everything that can move the session between phases. Each variant is a
/// single documented trigger; anything not in the table below is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PhaseTrigger {
    /// Session started by the user.
    Start,
    /// Question audio finished (or was skipped/stopped).
    QuestionAudioEnded,
    /// Microphone permission refused at the preparation boundary.
    PermissionRefused,
    /// The running countdown reached zero.
    CountdownFinished,
    /// User ended the recording before the countdown ran out.
    FinishRequested,
    /// User discarded the take to re-record.
    DiscardRequested,
    /// User submitted the take for analysis.
    SubmitRequested,
    /// Terminal `completed` event arrived on the analysis stream.
    AnalysisCompleted,
    /// Terminal `error` event (or stream loss) during analysis.
    AnalysisFailed,
    /// "Practice again" from the report.
    PracticeAgain,
    /// Full restart from any phase.
    Restart,
}

/// Pure transition table. Returns the next phase, or None when the trigger
/// is not valid in the current phase.
pub fn transition(phase: SessionPhase, trigger: PhaseTrigger) -> Option<SessionPhase> {
    use PhaseTrigger::*;
    use SessionPhase::*;

    match (phase, trigger) {
        (_, Restart) => Some(Listening),

        (Idle, Start) => Some(Listening),

        (Listening, QuestionAudioEnded) => Some(Preparing),

        (Preparing, PermissionRefused) => Some(Listening),
        (Preparing, CountdownFinished) => Some(Recording),

        (Recording, CountdownFinished) => Some(Confirmation),
        (Recording, FinishRequested) => Some(Confirmation),

        (Confirmation, DiscardRequested) => Some(Recording),
        (Confirmation, SubmitRequested) => Some(Analyzing),

        (Analyzing, AnalysisCompleted) => Some(Report),
        (Analyzing, AnalysisFailed) => Some(Confirmation),

        (Report, PracticeAgain) => Some(Listening),

        _ => None,
    }
}
