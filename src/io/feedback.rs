//! Operator feedback cues
//!
//! Fire-and-forget: the store never looks at what a cue did.

use crate::domain::types::FeedbackCue;
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use tracing::debug;

pub trait Feedback: Send {
    fn cue(&self, cue: FeedbackCue);
}

/// Records cues in the log only
pub struct LogFeedback;

impl Feedback for LogFeedback {
    fn cue(&self, cue: FeedbackCue) {
        debug!(cue = %cue.as_str(), "feedback_cue");
    }
}

/// Rings the terminal bell: once for errors, twice for warnings
pub struct TerminalBell;

impl TerminalBell {
    fn bells(cue: FeedbackCue) -> &'static [u8] {
        match cue {
            FeedbackCue::Success => b"",
            FeedbackCue::Error => b"\x07",
            FeedbackCue::Warning => b"\x07\x07",
        }
    }
}

impl Feedback for TerminalBell {
    fn cue(&self, cue: FeedbackCue) {
        let bells = Self::bells(cue);
        if bells.is_empty() {
            return;
        }
        let mut stderr = std::io::stderr();
        // Nothing useful to do if the terminal is gone
        let _ = stderr.write_all(bells).and_then(|_| stderr.flush());
    }
}

/// Keeps every cue; cloned handles share the same list
#[derive(Clone, Default)]
pub struct RecordingFeedback {
    cues: Arc<Mutex<Vec<FeedbackCue>>>,
}

impl RecordingFeedback {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cues(&self) -> Vec<FeedbackCue> {
        self.cues.lock().clone()
    }
}

impl Feedback for RecordingFeedback {
    fn cue(&self, cue: FeedbackCue) {
        self.cues.lock().push(cue);
    }
}
