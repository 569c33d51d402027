use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::settings::TimerSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum TimerStatus {
    #[default]
    Idle,
    Running,
    Paused,
    Finished,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum Phase {
    #[default]
    Study,
    ShortBreak,
    LongBreak,
}

impl Phase {
    pub fn is_break(self) -> bool {
        matches!(self, Phase::ShortBreak | Phase::LongBreak)
    }

    pub fn duration_secs(self, settings: &TimerSettings) -> u64 {
        let minutes = match self {
            Phase::Study => settings.study_time,
            Phase::ShortBreak => settings.short_break_time,
            Phase::LongBreak => settings.long_break_time,
        };
        minutes.saturating_mul(60)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Phase::Study => "Study",
            Phase::ShortBreak => "Short break",
            Phase::LongBreak => "Long break",
        }
    }
}

/// In-memory view of the session currently owned by the controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerSession {
    pub status: TimerStatus,
    pub phase: Phase,
    pub session_id: Option<String>,
    pub total_secs: u64,
    pub remaining_secs: u64,
    pub started_at: Option<DateTime<Utc>>,
    pub paused_at: Option<DateTime<Utc>>,
}

impl TimerSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, TimerStatus::Running | TimerStatus::Paused)
    }

    pub fn begin(&mut self, session_id: String, phase: Phase, total_secs: u64, now: DateTime<Utc>) {
        *self = Self {
            status: TimerStatus::Running,
            phase,
            session_id: Some(session_id),
            total_secs,
            remaining_secs: total_secs,
            started_at: Some(now),
            paused_at: None,
        };
    }

    pub fn mark_paused(&mut self, now: DateTime<Utc>) {
        self.status = TimerStatus::Paused;
        self.paused_at = Some(now);
    }

    pub fn mark_resumed(&mut self) {
        self.status = TimerStatus::Running;
        self.paused_at = None;
    }

    pub fn finish(&mut self) {
        self.status = TimerStatus::Finished;
        self.remaining_secs = 0;
        self.paused_at = None;
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
