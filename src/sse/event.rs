use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Analysis pipeline steps, in the order the server works through them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStep {
    Uploading,
    Transcribing,
    Analyzing,
    Generating,
}

impl AnalysisStep {
    pub const ALL: [AnalysisStep; 4] = [
        AnalysisStep::Uploading,
        AnalysisStep::Transcribing,
        AnalysisStep::Analyzing,
        AnalysisStep::Generating,
    ];
}

/// Wire status of a step event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Start,
    Completed,
}

/// One event from the analysis stream. Exactly one `Completed` or `Error`
/// terminates a stream; any number of `Step` events may precede it.
#[derive(Debug, Clone, PartialEq)]
pub enum SseEvent {
    Step {
        step: AnalysisStep,
        status: StepStatus,
    },
    Completed {
        report: serde_json::Value,
        recording_id: Option<String>,
        audio_url: Option<String>,
    },
    Error {
        message: String,
        step: Option<AnalysisStep>,
    },
}

impl SseEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SseEvent::Completed { .. } | SseEvent::Error { .. })
    }
}

#[derive(Debug, Error)]
pub enum EventParseError {
    #[error("Malformed event payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Unknown event type: {0}")]
    UnknownType(String),

    #[error("Event missing field: {0}")]
    MissingField(&'static str),
}

/// Raw wire shape; converted to the typed union after the `type` tag is
/// inspected.
#[derive(Debug, Deserialize)]
struct WireEvent {
    #[serde(rename = "type")]
    kind: String,
    status: Option<StepStatus>,
    report: Option<serde_json::Value>,
    recording_id: Option<String>,
    audio_url: Option<String>,
    message: Option<String>,
    step: Option<AnalysisStep>,
}

/// Parse the JSON payload of a single `data:` line.
pub fn parse_event_payload(payload: &str) -> Result<SseEvent, EventParseError> {
    let wire: WireEvent = serde_json::from_str(payload)?;

    match wire.kind.as_str() {
        "completed" => Ok(SseEvent::Completed {
            report: wire.report.ok_or(EventParseError::MissingField("report"))?,
            recording_id: wire.recording_id,
            audio_url: wire.audio_url,
        }),
        "error" => Ok(SseEvent::Error {
            message: wire
                .message
                .ok_or(EventParseError::MissingField("message"))?,
            step: wire.step,
        }),
        step_name => {
            let step: AnalysisStep =
                serde_json::from_value(serde_json::Value::String(step_name.to_string()))
                    .map_err(|_| EventParseError::UnknownType(step_name.to_string()))?;
            let status = wire.status.ok_or(EventParseError::MissingField("status"))?;
            Ok(SseEvent::Step { step, status })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_step_event() {
        let event = parse_event_payload(r#"{"type":"uploading","status":"start"}"#).unwrap();
        assert_eq!(
            event,
            SseEvent::Step {
                step: AnalysisStep::Uploading,
                status: StepStatus::Start,
            }
        );
    }

    #[test]
    fn parses_completed_event_with_recording_identity() {
        let event = parse_event_payload(
            r#"{"type":"completed","report":{"chunks":[]},"recording_id":"recording_01ABC","audio_url":"https://cdn/r.mp3"}"#,
        )
        .unwrap();
        match event {
            SseEvent::Completed {
                report,
                recording_id,
                audio_url,
            } => {
                assert!(report.get("chunks").is_some());
                assert_eq!(recording_id.as_deref(), Some("recording_01ABC"));
                assert_eq!(audio_url.as_deref(), Some("https://cdn/r.mp3"));
            }
            other => panic!("expected completed, got {:?}", other),
        }
    }

    #[test]
    fn parses_error_event_with_optional_step() {
        let event =
            parse_event_payload(r#"{"type":"error","message":"boom","step":"transcribing"}"#)
                .unwrap();
        assert_eq!(
            event,
            SseEvent::Error {
                message: "boom".to_string(),
                step: Some(AnalysisStep::Transcribing),
            }
        );
        assert!(event.is_terminal());
    }

    #[test]
    fn rejects_unknown_type() {
        assert!(matches!(
            parse_event_payload(r#"{"type":"reticulating","status":"start"}"#),
            Err(EventParseError::UnknownType(_))
        ));
    }

    #[test]
    fn rejects_step_without_status() {
        assert!(matches!(
            parse_event_payload(r#"{"type":"analyzing"}"#),
            Err(EventParseError::MissingField("status"))
        ));
    }

    #[test]
    fn rejects_invalid_json() {
        assert!(matches!(
            parse_event_payload("{not json"),
            Err(EventParseError::Json(_))
        ));
    }
}
