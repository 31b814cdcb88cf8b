//! Focus session records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Manually planned, not started yet.
    Scheduled,
    Active,
    Paused,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Active or paused: the timer is counting (or holding) real time.
    pub fn is_running(self) -> bool {
        matches!(self, SessionStatus::Active | SessionStatus::Paused)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Active => "active",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One pause. `end_time` is `None` while the pause is still open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PauseInterval {
    pub start_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_time: Option<DateTime<Utc>>,
}

impl PauseInterval {
    pub fn open(at: DateTime<Utc>) -> Self {
        Self {
            start_time: at,
            end_time: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.end_time.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FocusSession {
    pub id: String,
    pub start_time: DateTime<Utc>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    /// Planned minutes. `0` means open-ended.
    pub target_duration: u32,
    /// Actual minutes, set on completion or cancellation.
    #[serde(default)]
    pub duration: u32,
    pub status: SessionStatus,
    #[serde(default, alias = "categoryId")]
    pub tag_id: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub pause_history: Vec<PauseInterval>,
    #[serde(default)]
    pub fruits_earned: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl FocusSession {
    pub fn new(
        status: SessionStatus,
        start_time: DateTime<Utc>,
        target_duration: u32,
        tag_id: Option<String>,
        description: Option<String>,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            start_time,
            end_time: None,
            target_duration,
            duration: 0,
            status,
            tag_id,
            description,
            pause_history: Vec::new(),
            fruits_earned: 0,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open_ended(&self) -> bool {
        self.target_duration == 0
    }

    pub fn open_pause(&self) -> Option<&PauseInterval> {
        self.pause_history.last().filter(|p| p.is_open())
    }

    /// Close the trailing open pause, if any. Returns whether one was closed.
    pub(crate) fn close_open_pause(&mut self, at: DateTime<Utc>) -> bool {
        match self.pause_history.last_mut() {
            Some(pause) if pause.is_open() => {
                pause.end_time = Some(at.max(pause.start_time));
                true
            }
            _ => false,
        }
    }

    /// Every invariant violation of this record, empty when consistent.
    pub fn invariant_violations(&self) -> Vec<String> {
        let mut problems = Vec::new();

        if self.status.is_terminal() != self.end_time.is_some() {
            problems.push(format!(
                "endTime {} but status is {}",
                if self.end_time.is_some() { "set" } else { "missing" },
                self.status
            ));
        }
        if let Some(end) = self.end_time {
            if end < self.start_time {
                problems.push("endTime precedes startTime".to_string());
            }
        }

        let open = self.pause_history.iter().filter(|p| p.is_open()).count();
        if open > 1 {
            problems.push(format!("{open} open pause intervals"));
        }
        if open == 1 && self.status != SessionStatus::Paused {
            problems.push(format!("open pause interval while {}", self.status));
        }
        if open == 1 && self.open_pause().is_none() {
            problems.push("open pause interval is not the last entry".to_string());
        }
        if self.status == SessionStatus::Paused && open == 0 {
            problems.push("paused without an open pause interval".to_string());
        }
        for (i, pause) in self.pause_history.iter().enumerate() {
            if let Some(end) = pause.end_time {
                if end < pause.start_time {
                    problems.push(format!("pause interval {i} ends before it starts"));
                }
            }
        }

        problems
    }
}
