//! A shared, ordered event-log entry type: both the ReAct loop and the
//! Planner/Executor append to a `Vec<TimelineEvent>` as they run, so callers
//! get one consistent shape for "what happened, in what order" regardless of
//! which execution mode produced it.

use serde::{Deserialize, Serialize};

/// One entry of an execution timeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEvent {
    pub timestamp_millis: u64,
    pub event_type: String,
    pub description: String,
}

impl TimelineEvent {
    pub fn new(timestamp_millis: u64, event_type: impl Into<String>, description: impl Into<String>) -> Self {
        TimelineEvent {
            timestamp_millis,
            event_type: event_type.into(),
            description: description.into(),
        }
    }
}
