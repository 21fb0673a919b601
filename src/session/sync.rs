use serde::Serialize;
use tracing::debug;

/// A server-identified span of the user's speech, in seconds from the start
/// of the recording. Read from `report.chunks[].time_range`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SegmentSpan {
    pub start_secs: f32,
    pub end_secs: f32,
}

impl SegmentSpan {
    pub fn contains(&self, position: f32) -> bool {
        position >= self.start_secs && position < self.end_secs
    }

    /// Extract segment spans from a report payload. Chunks without a valid
    /// `[start, end]` pair are skipped.
    pub fn from_report(report: &serde_json::Value) -> Vec<SegmentSpan> {
        let Some(chunks) = report.get("chunks").and_then(|c| c.as_array()) else {
            return Vec::new();
        };

        chunks
            .iter()
            .filter_map(|chunk| {
                let range = chunk.get("time_range")?.as_array()?;
                let start_secs = range.first()?.as_f64()? as f32;
                let end_secs = range.get(1)?.as_f64()? as f32;
                (end_secs > start_secs).then_some(SegmentSpan {
                    start_secs,
                    end_secs,
                })
            })
            .collect()
    }
}

/// Whether the cursor is driven by real playback time updates or by a
/// manually advanced virtual cursor (degraded preview before the audio URL
/// is available).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum CursorMode {
    Playback,
    Virtual,
}

/// What the player driving the sync should do after a position update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SyncAction {
    Continue,
    /// Single-segment preview reached the segment end: stop playback there.
    StopAt(f32),
}

/// Synchronizes a recording's time cursor with report segment highlighting.
#[derive(Debug, Clone)]
pub struct RecordingPlaybackSync {
    segments: Vec<SegmentSpan>,
    position: f32,
    mode: CursorMode,
    preview_end: Option<f32>,
}

impl RecordingPlaybackSync {
    pub fn new(mode: CursorMode) -> Self {
        Self {
            segments: Vec::new(),
            position: 0.0,
            mode,
            preview_end: None,
        }
    }

    pub fn from_report(report: &serde_json::Value, mode: CursorMode) -> Self {
        let mut sync = Self::new(mode);
        sync.segments = SegmentSpan::from_report(report);
        debug!("Playback sync over {} segments", sync.segments.len());
        sync
    }

    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    /// Switch to real playback once audio becomes available.
    pub fn set_mode(&mut self, mode: CursorMode) {
        self.mode = mode;
    }

    pub fn position(&self) -> f32 {
        self.position
    }

    pub fn segments(&self) -> &[SegmentSpan] {
        &self.segments
    }

    /// Index of the segment containing the current position, if any.
    pub fn active_segment(&self) -> Option<usize> {
        self.segments.iter().position(|s| s.contains(self.position))
    }

    /// Real playback reported a new time. Returns whether a single-segment
    /// preview should stop here.
    pub fn on_time_update(&mut self, position: f32) -> SyncAction {
        self.position = position.max(0.0);
        match self.preview_end {
            Some(end) if self.position >= end => {
                self.preview_end = None;
                SyncAction::StopAt(end)
            }
            _ => SyncAction::Continue,
        }
    }

    /// Advance the virtual cursor (degraded mode with no playable audio).
    pub fn advance_virtual(&mut self, delta_secs: f32) -> SyncAction {
        if self.mode != CursorMode::Virtual {
            return SyncAction::Continue;
        }
        let next = self.position + delta_secs.max(0.0);
        self.on_time_update(next)
    }

    /// Seek to an arbitrary time, leaving any preview constraint behind.
    pub fn seek_to(&mut self, position: f32) {
        self.preview_end = None;
        self.position = position.max(0.0);
    }

    /// Seek to a segment's start. In preview mode the cursor auto-stops at
    /// that segment's end. Returns the target time for the caller's player.
    pub fn seek_to_segment(&mut self, index: usize, preview: bool) -> Option<f32> {
        let segment = self.segments.get(index)?;
        self.position = segment.start_secs;
        self.preview_end = preview.then_some(segment.end_secs);
        Some(segment.start_secs)
    }

    pub fn clear_preview(&mut self) {
        self.preview_end = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn report_fixture() -> serde_json::Value {
        json!({
            "chunks": [
                {"chunk_id": 0, "chunk_type": "opening_statement", "time_range": [0.0, 5.2]},
                {"chunk_id": 1, "chunk_type": "viewpoint", "time_range": [5.2, 22.1]},
                {"chunk_id": 2, "chunk_type": "conclusion", "time_range": [22.1, 30.0]}
            ]
        })
    }

    #[test]
    fn extracts_segments_from_report_chunks() {
        let segments = SegmentSpan::from_report(&report_fixture());
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[1].start_secs, 5.2);
        assert_eq!(segments[1].end_secs, 22.1);
    }

    #[test]
    fn skips_chunks_with_invalid_ranges() {
        let report = json!({
            "chunks": [
                {"time_range": [3.0, 1.0]},
                {"time_range": [0.0]},
                {"time_range": [1.0, 2.0]},
                {}
            ]
        });
        let segments = SegmentSpan::from_report(&report);
        assert_eq!(segments.len(), 1);
    }

    #[test]
    fn active_segment_follows_the_cursor() {
        let mut sync = RecordingPlaybackSync::from_report(&report_fixture(), CursorMode::Playback);
        assert_eq!(sync.active_segment(), Some(0));

        sync.on_time_update(10.0);
        assert_eq!(sync.active_segment(), Some(1));

        sync.on_time_update(45.0);
        assert_eq!(sync.active_segment(), None);
    }

    #[test]
    fn segment_preview_stops_at_segment_end() {
        let mut sync = RecordingPlaybackSync::from_report(&report_fixture(), CursorMode::Playback);
        let target = sync.seek_to_segment(1, true).unwrap();
        assert_eq!(target, 5.2);

        assert_eq!(sync.on_time_update(12.0), SyncAction::Continue);
        assert_eq!(sync.on_time_update(22.2), SyncAction::StopAt(22.1));
        // Preview constraint is consumed after firing.
        assert_eq!(sync.on_time_update(25.0), SyncAction::Continue);
    }

    #[test]
    fn plain_segment_seek_does_not_constrain_playback() {
        let mut sync = RecordingPlaybackSync::from_report(&report_fixture(), CursorMode::Playback);
        sync.seek_to_segment(0, false);
        assert_eq!(sync.on_time_update(29.0), SyncAction::Continue);
    }

    #[test]
    fn virtual_cursor_drives_highlighting_without_audio() {
        let mut sync = RecordingPlaybackSync::from_report(&report_fixture(), CursorMode::Virtual);
        sync.advance_virtual(6.0);
        assert_eq!(sync.active_segment(), Some(1));
        assert_eq!(sync.position(), 6.0);
    }

    #[test]
    fn virtual_advance_is_inert_in_playback_mode() {
        let mut sync = RecordingPlaybackSync::from_report(&report_fixture(), CursorMode::Playback);
        sync.advance_virtual(6.0);
        assert_eq!(sync.position(), 0.0);
    }

    #[test]
    fn seek_clamps_to_zero_and_clears_preview() {
        let mut sync = RecordingPlaybackSync::from_report(&report_fixture(), CursorMode::Playback);
        sync.seek_to_segment(2, true);
        sync.seek_to(-5.0);
        assert_eq!(sync.position(), 0.0);
        assert_eq!(sync.on_time_update(29.0), SyncAction::Continue);
    }
}
