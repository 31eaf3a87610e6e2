//! Task SLA classification

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::task::Task;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SlaStatus {
    OnTrack,
    Warning,
    Breached,
}

impl SlaStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OnTrack => "ON_TRACK",
            Self::Warning => "WARNING",
            Self::Breached => "BREACHED",
        }
    }
}

impl fmt::Display for SlaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Classifies a task against its due date.
///
/// Open tasks are measured at `now`, completed tasks at their completion
/// time. `BREACHED` strictly after the due instant, `WARNING` within
/// `warning_window` before it. Tasks without a due date are always on track.
pub fn classify(task: &Task, now: DateTime<Utc>, warning_window: Duration) -> SlaStatus {
    let Some(due) = task.sla_due_at else {
        return SlaStatus::OnTrack;
    };

    let at = if task.is_done() {
        task.completed_at.unwrap_or(now)
    } else {
        now
    };

    if at > due {
        SlaStatus::Breached
    } else if !task.is_done() && at >= due - warning_window {
        SlaStatus::Warning
    } else {
        SlaStatus::OnTrack
    }
}
