//! Alarm data model.
//!
//! An [`Alarm`] is always well-formed: its time is an [`AlarmTime`] that
//! only exists as a valid 24h `HH:MM`, and its difficulty is one of the
//! three [`Difficulty`] tiers. Unvalidated editor input travels as an
//! [`AlarmDraft`] until the registry accepts it.

mod registry;

pub use registry::{AlarmRegistry, SnoozeEntry, SNOOZE_DURATION_MS, SNOOZE_TOLERANCE_MS};

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Longest label the editor accepts.
pub const MAX_LABEL_LEN: usize = 100;

/// Wall-clock time of day at minute precision, serialized as `"HH:MM"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AlarmTime {
    hour: u8,
    minute: u8,
}

impl AlarmTime {
    pub fn new(hour: u8, minute: u8) -> Result<Self, ValidationError> {
        if hour > 23 || minute > 59 {
            return Err(ValidationError::InvalidTime(format!("{hour}:{minute}")));
        }
        Ok(Self { hour, minute })
    }

    pub fn hour(&self) -> u8 {
        self.hour
    }

    pub fn minute(&self) -> u8 {
        self.minute
    }

    /// The `HH:MM` a wall-clock instant truncates to.
    pub fn of<Tz: TimeZone>(now: &DateTime<Tz>) -> Self {
        Self {
            hour: now.hour() as u8,
            minute: now.minute() as u8,
        }
    }

    /// Render for display, honouring the 12/24h preference.
    pub fn display(&self, clock24: bool) -> String {
        if clock24 {
            return self.to_string();
        }
        let suffix = if self.hour < 12 { "AM" } else { "PM" };
        let hour = match self.hour % 12 {
            0 => 12,
            h => h,
        };
        format!("{hour}:{:02} {suffix}", self.minute)
    }
}

impl FromStr for AlarmTime {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ValidationError::InvalidTime(s.to_string());
        let bytes = s.as_bytes();
        if !s.is_ascii() || bytes.len() != 5 || bytes[2] != b':' {
            return Err(invalid());
        }
        let digits = |range: std::ops::Range<usize>| -> Result<u8, ValidationError> {
            let part = &s[range];
            if !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse::<u8>().map_err(|_| invalid())
        };
        let hour = digits(0..2)?;
        let minute = digits(3..5)?;
        Self::new(hour, minute).map_err(|_| invalid())
    }
}

impl TryFrom<String> for AlarmTime {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<AlarmTime> for String {
    fn from(value: AlarmTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for AlarmTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour, self.minute)
    }
}

/// Challenge difficulty tier for strict alarms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "easy",
            Difficulty::Medium => "medium",
            Difficulty::Hard => "hard",
        }
    }
}

impl FromStr for Difficulty {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(ValidationError::InvalidDifficulty(other.to_string())),
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A configured alarm.
///
/// `days` holds weekday indices with 0 = Sunday. An empty set makes the
/// alarm one-shot: it disables itself after firing once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Alarm {
    pub id: String,
    pub time: AlarmTime,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub days: BTreeSet<u8>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default)]
    pub difficulty: Difficulty,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl Alarm {
    pub fn is_one_shot(&self) -> bool {
        self.days.is_empty()
    }

    /// Whether the alarm is scheduled on `weekday` (0 = Sunday).
    pub fn fires_on(&self, weekday: u8) -> bool {
        self.days.is_empty() || self.days.contains(&weekday)
    }

    /// Enabled, same minute, and scheduled for today.
    pub fn matches<Tz: TimeZone>(&self, now: &DateTime<Tz>) -> bool {
        self.enabled && self.time == AlarmTime::of(now) && self.fires_on(weekday_index(now))
    }

    /// Check invariants that deserialization alone cannot enforce.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if let Some(&day) = self.days.iter().find(|&&d| d > 6) {
            return Err(ValidationError::InvalidWeekday(day));
        }
        if self.label.chars().count() > MAX_LABEL_LEN {
            return Err(ValidationError::InvalidValue {
                field: "label".into(),
                message: format!("must be at most {MAX_LABEL_LEN} characters"),
            });
        }
        Ok(())
    }

    /// Short repeat summary, e.g. `Once`, `Daily`, `Mon Wed Fri`.
    pub fn days_summary(&self) -> String {
        const NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];
        match self.days.len() {
            0 => "Once".into(),
            7 => "Daily".into(),
            _ => self
                .days
                .iter()
                .filter_map(|&d| NAMES.get(d as usize).copied())
                .collect::<Vec<_>>()
                .join(" "),
        }
    }
}

/// Weekday index of `now` with 0 = Sunday.
pub fn weekday_index<Tz: TimeZone>(now: &DateTime<Tz>) -> u8 {
    now.weekday().num_days_from_sunday() as u8
}

/// Unvalidated alarm editor input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlarmDraft {
    /// `None` creates a new alarm; `Some` edits (or inserts under) that id.
    #[serde(default)]
    pub id: Option<String>,
    pub time: String,
    #[serde(default)]
    pub label: String,
    #[serde(default)]
    pub days: Vec<u8>,
    #[serde(default)]
    pub strict: bool,
    #[serde(default = "default_difficulty")]
    pub difficulty: String,
}

fn default_difficulty() -> String {
    Difficulty::Medium.as_str().into()
}

impl Default for AlarmDraft {
    fn default() -> Self {
        Self {
            id: None,
            time: "08:00".into(),
            label: "Wake Up".into(),
            days: Vec::new(),
            strict: false,
            difficulty: default_difficulty(),
        }
    }
}

impl AlarmDraft {
    /// Validate and build an alarm with the given identity and enabled flag.
    pub fn build(&self, id: String, enabled: bool) -> Result<Alarm, ValidationError> {
        let time: AlarmTime = self.time.trim().parse()?;
        let difficulty: Difficulty = self.difficulty.trim().parse()?;
        let alarm = Alarm {
            id,
            time,
            label: self.label.clone(),
            days: self.days.iter().copied().collect(),
            strict: self.strict,
            difficulty,
            enabled,
        };
        alarm.validate()?;
        Ok(alarm)
    }
}

impl From<&Alarm> for AlarmDraft {
    fn from(alarm: &Alarm) -> Self {
        Self {
            id: Some(alarm.id.clone()),
            time: alarm.time.to_string(),
            label: alarm.label.clone(),
            days: alarm.days.iter().copied().collect(),
            strict: alarm.strict,
            difficulty: alarm.difficulty.as_str().into(),
        }
    }
}
