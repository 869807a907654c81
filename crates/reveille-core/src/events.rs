use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::alarm::Alarm;

/// Why a ringing session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Dismissed by the user (challenge passed, if strict).
    Dismissed,
    Snoozed,
    /// The backing alarm was deleted while ringing.
    Deleted,
    /// Halted by the host, e.g. on shutdown.
    Stopped,
}

/// Every observable state change in the engine produces an Event.
/// The view layer renders the alarm overlay from these; persistence and
/// notifications subscribe to them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A session opened. `challenge` is the problem text for strict alarms;
    /// the answer is never exposed.
    AlarmTriggered {
        alarm: Alarm,
        challenge: Option<String>,
        /// False while the audio output is still autoplay-suspended.
        audible: bool,
        at: DateTime<Utc>,
    },
    /// A new challenge replaced the current one.
    ChallengeUpdated {
        alarm_id: String,
        problem_text: String,
        at: DateTime<Utc>,
    },
    /// Wrong (or missing) answer; the alarm keeps ringing.
    DismissRejected {
        alarm_id: String,
        failed_attempts: u32,
        at: DateTime<Utc>,
    },
    SessionEnded {
        alarm_id: String,
        reason: EndReason,
        at: DateTime<Utc>,
    },
    Snoozed {
        alarm_id: String,
        due_at_epoch_ms: i64,
        at: DateTime<Utc>,
    },
    /// The alarm list changed and was handed to the store.
    AlarmsChanged {
        alarms: Vec<Alarm>,
        at: DateTime<Utc>,
    },
    /// Persisting failed; in-memory state stays authoritative until reload.
    StorageWarning {
        message: String,
        at: DateTime<Utc>,
    },
    /// Ticks come from the in-context fallback; background accuracy is reduced.
    TickDegraded {
        at: DateTime<Utc>,
    },
    /// A user intent could not be applied (validation, nothing ringing).
    RequestFailed {
        message: String,
        at: DateTime<Utc>,
    },
    /// Desktop notification request.
    Notification {
        title: String,
        at: DateTime<Utc>,
    },
}

impl Event {
    /// Stable snake_case name of the variant, for logs and filters.
    pub fn kind(&self) -> &'static str {
        match self {
            Event::AlarmTriggered { .. } => "alarm_triggered",
            Event::ChallengeUpdated { .. } => "challenge_updated",
            Event::DismissRejected { .. } => "dismiss_rejected",
            Event::SessionEnded { .. } => "session_ended",
            Event::Snoozed { .. } => "snoozed",
            Event::AlarmsChanged { .. } => "alarms_changed",
            Event::StorageWarning { .. } => "storage_warning",
            Event::TickDegraded { .. } => "tick_degraded",
            Event::RequestFailed { .. } => "request_failed",
            Event::Notification { .. } => "notification",
        }
    }
}
