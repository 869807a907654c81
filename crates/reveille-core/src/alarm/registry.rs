//! Alarm registry and per-tick matcher.
//!
//! Holds the configured alarms (in insertion order, which is also the
//! persisted order) and the pending in-memory snoozes. Matching is split in
//! two so the coordinator can apply the one-active-session rule:
//!
//! - [`AlarmRegistry::due_alarms`] runs only on the zero-second tick of a
//!   minute and disables one-shot alarms as it returns them.
//! - [`AlarmRegistry::take_due_snoozes`] runs on every tick and removes the
//!   entries it returns, so a snooze can never fire twice.

use chrono::{DateTime, TimeZone, Timelike};
use serde::{Deserialize, Serialize};

use super::{Alarm, AlarmDraft};
use crate::error::ValidationError;

/// Fixed snooze offset: 5 minutes.
pub const SNOOZE_DURATION_MS: i64 = 5 * 60 * 1000;

/// A snooze fires once it is due within this window.
///
/// Overdue entries (due in the past, e.g. after the host slept) also fire
/// on the next tick rather than being dropped.
pub const SNOOZE_TOLERANCE_MS: i64 = 2_000;

/// A pending snooze. Lives only in memory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnoozeEntry {
    pub due_at_epoch_ms: i64,
    /// Snapshot of the alarm as it was when snoozed.
    pub alarm: Alarm,
}

impl SnoozeEntry {
    pub fn new(alarm: Alarm, snoozed_at_ms: i64) -> Self {
        Self {
            due_at_epoch_ms: snoozed_at_ms + SNOOZE_DURATION_MS,
            alarm,
        }
    }

    pub fn is_due(&self, now_ms: i64) -> bool {
        self.due_at_epoch_ms - now_ms <= SNOOZE_TOLERANCE_MS
    }
}

#[derive(Debug, Clone, Default)]
pub struct AlarmRegistry {
    alarms: Vec<Alarm>,
    snoozed: Vec<SnoozeEntry>,
}

impl AlarmRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from already-validated alarms (e.g. loaded at boot).
    ///
    /// Later duplicates of an id replace earlier ones.
    pub fn from_alarms(alarms: Vec<Alarm>) -> Self {
        let mut registry = Self::new();
        for alarm in alarms {
            registry.insert(alarm);
        }
        registry
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn alarms(&self) -> &[Alarm] {
        &self.alarms
    }

    pub fn get(&self, id: &str) -> Option<&Alarm> {
        self.alarms.iter().find(|a| a.id == id)
    }

    pub fn len(&self) -> usize {
        self.alarms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.alarms.is_empty()
    }

    pub fn pending_snoozes(&self) -> &[SnoozeEntry] {
        &self.snoozed
    }

    // ── Mutations ────────────────────────────────────────────────────

    /// Validate editor input and insert or replace by id.
    ///
    /// Editing keeps the existing `enabled` flag; new alarms start enabled.
    /// On error the registry is left untouched.
    pub fn upsert(&mut self, draft: &AlarmDraft) -> Result<Alarm, ValidationError> {
        let (id, enabled) = match draft.id.as_deref() {
            Some(id) => {
                let enabled = self.get(id).map(|a| a.enabled).unwrap_or(true);
                (id.to_string(), enabled)
            }
            None => (uuid::Uuid::new_v4().to_string(), true),
        };
        let alarm = draft.build(id, enabled)?;
        self.insert(alarm.clone());
        Ok(alarm)
    }

    /// Insert or replace an already-validated alarm, keeping its position.
    pub fn insert(&mut self, alarm: Alarm) {
        match self.alarms.iter_mut().find(|a| a.id == alarm.id) {
            Some(slot) => *slot = alarm,
            None => self.alarms.push(alarm),
        }
    }

    /// Swap in a freshly loaded list, keeping snoozes only for alarms that
    /// still exist.
    pub fn replace_alarms(&mut self, alarms: Vec<Alarm>) {
        self.alarms.clear();
        for alarm in alarms {
            self.insert(alarm);
        }
        let alarms = &self.alarms;
        self.snoozed
            .retain(|s| alarms.iter().any(|a| a.id == s.alarm.id));
    }

    /// Delete an alarm along with any of its pending snoozes.
    pub fn remove(&mut self, id: &str) -> Option<Alarm> {
        let idx = self.alarms.iter().position(|a| a.id == id)?;
        self.cancel_snoozes(id);
        Some(self.alarms.remove(idx))
    }

    pub fn set_enabled(&mut self, id: &str, enabled: bool) -> Result<&Alarm, ValidationError> {
        let alarm = self
            .alarms
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| ValidationError::UnknownAlarm(id.to_string()))?;
        alarm.enabled = enabled;
        Ok(&*alarm)
    }

    /// Flip `enabled`; returns the new value.
    pub fn toggle(&mut self, id: &str) -> Result<bool, ValidationError> {
        let current = self
            .get(id)
            .map(|a| a.enabled)
            .ok_or_else(|| ValidationError::UnknownAlarm(id.to_string()))?;
        Ok(self.set_enabled(id, !current)?.enabled)
    }

    // ── Matching ─────────────────────────────────────────────────────

    /// Alarms due at `now`, in registry order.
    ///
    /// Evaluates only when `now` sits on second 0; any other tick returns
    /// nothing. One-shot alarms are disabled as they are returned so they
    /// cannot match again within the same minute. A skipped zero-second
    /// tick means that minute's alarms are missed.
    pub fn due_alarms<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Vec<Alarm> {
        if now.second() != 0 {
            return Vec::new();
        }
        let mut due = Vec::new();
        for alarm in self.alarms.iter_mut().filter(|a| a.matches(now)) {
            due.push(alarm.clone());
            if alarm.is_one_shot() {
                alarm.enabled = false;
            }
        }
        due
    }

    /// Queue a snooze, superseding any pending one for the same alarm.
    pub fn push_snooze(&mut self, entry: SnoozeEntry) {
        self.cancel_snoozes(&entry.alarm.id);
        self.snoozed.push(entry);
    }

    /// Remove and return every snooze that is due at `now_ms`.
    pub fn take_due_snoozes(&mut self, now_ms: i64) -> Vec<SnoozeEntry> {
        let (due, pending): (Vec<_>, Vec<_>) = std::mem::take(&mut self.snoozed)
            .into_iter()
            .partition(|s| s.is_due(now_ms));
        self.snoozed = pending;
        due
    }

    /// Drop pending snoozes for `id`; returns how many were dropped.
    pub fn cancel_snoozes(&mut self, id: &str) -> usize {
        let before = self.snoozed.len();
        self.snoozed.retain(|s| s.alarm.id != id);
        before - self.snoozed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{FixedOffset, TimeZone};

    fn at(d: u32, h: u32, mi: u32, s: u32) -> DateTime<FixedOffset> {
        // October 2026: the 11th is a Sunday, the 12th a Monday.
        FixedOffset::east_opt(0)
            .unwrap()
            .with_ymd_and_hms(2026, 10, d, h, mi, s)
            .unwrap()
    }

    fn draft(time: &str, days: &[u8]) -> AlarmDraft {
        AlarmDraft {
            time: time.into(),
            days: days.to_vec(),
            ..AlarmDraft::default()
        }
    }

    #[test]
    fn upsert_creates_enabled_alarm_with_fresh_id() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("06:45", &[])).unwrap();
        let b = reg.upsert(&draft("06:45", &[])).unwrap();
        assert!(a.enabled);
        assert_ne!(a.id, b.id);
        assert_eq!(reg.len(), 2);
    }

    #[test]
    fn upsert_edit_preserves_enabled_and_position() {
        let mut reg = AlarmRegistry::new();
        let first = reg.upsert(&draft("06:00", &[])).unwrap();
        reg.upsert(&draft("07:00", &[])).unwrap();
        reg.set_enabled(&first.id, false).unwrap();

        let edited = reg
            .upsert(&AlarmDraft {
                id: Some(first.id.clone()),
                label: "Gym".into(),
                ..draft("06:30", &[6])
            })
            .unwrap();
        assert!(!edited.enabled);
        assert_eq!(reg.alarms()[0].id, first.id);
        assert_eq!(reg.alarms()[0].label, "Gym");
        assert_eq!(reg.alarms()[0].time.to_string(), "06:30");
    }

    #[test]
    fn upsert_rejection_leaves_registry_unchanged() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("06:00", &[])).unwrap();
        let err = reg.upsert(&AlarmDraft {
            id: Some(a.id.clone()),
            ..draft("6 am", &[])
        });
        assert!(err.is_err());
        assert_eq!(reg.get(&a.id), Some(&a));
    }

    #[test]
    fn toggle_and_unknown_ids() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("06:00", &[])).unwrap();
        assert_eq!(reg.toggle(&a.id), Ok(false));
        assert_eq!(reg.toggle(&a.id), Ok(true));
        assert_eq!(
            reg.toggle("nope"),
            Err(ValidationError::UnknownAlarm("nope".into()))
        );
        assert!(reg.remove("nope").is_none());
    }

    #[test]
    fn one_shot_fires_once_and_disables() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("08:00", &[])).unwrap();

        let due = reg.due_alarms(&at(12, 8, 0, 0));
        assert_eq!(due.len(), 1);
        assert!(due[0].enabled, "snapshot is taken before disabling");
        assert!(!reg.get(&a.id).unwrap().enabled);
        assert!(reg.due_alarms(&at(12, 8, 0, 0)).is_empty());
    }

    #[test]
    fn repeating_alarm_stays_enabled() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("07:30", &[1, 2, 3, 4, 5])).unwrap();
        assert_eq!(reg.due_alarms(&at(12, 7, 30, 0)).len(), 1);
        assert!(reg.get(&a.id).unwrap().enabled);
        // Sunday is not in the set.
        assert!(reg.due_alarms(&at(11, 7, 30, 0)).is_empty());
    }

    #[test]
    fn only_zero_second_tick_matches() {
        let mut reg = AlarmRegistry::new();
        reg.upsert(&draft("08:00", &[])).unwrap();
        for s in 1..60 {
            assert!(reg.due_alarms(&at(12, 8, 0, s)).is_empty());
        }
        assert_eq!(reg.due_alarms(&at(12, 8, 0, 0)).len(), 1);
    }

    #[test]
    fn snooze_is_taken_exactly_once() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("08:00", &[])).unwrap();
        let t0 = 1_000_000;
        reg.push_snooze(SnoozeEntry::new(a.clone(), t0));
        assert_eq!(reg.pending_snoozes()[0].due_at_epoch_ms, t0 + 300_000);

        assert!(reg.take_due_snoozes(t0 + 297_000).is_empty());
        let fired = reg.take_due_snoozes(t0 + 298_500);
        assert_eq!(fired.len(), 1);
        assert!(reg.take_due_snoozes(t0 + 299_500).is_empty());
        assert!(reg.pending_snoozes().is_empty());
    }

    #[test]
    fn overdue_snooze_still_fires() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("08:00", &[])).unwrap();
        reg.push_snooze(SnoozeEntry::new(a, 0));
        assert_eq!(reg.take_due_snoozes(SNOOZE_DURATION_MS + 60_000).len(), 1);
    }

    #[test]
    fn new_snooze_supersedes_pending_one() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("08:00", &[])).unwrap();
        reg.push_snooze(SnoozeEntry::new(a.clone(), 0));
        reg.push_snooze(SnoozeEntry::new(a, 60_000));
        assert_eq!(reg.pending_snoozes().len(), 1);
        assert_eq!(reg.pending_snoozes()[0].due_at_epoch_ms, 360_000);
    }

    #[test]
    fn remove_drops_pending_snoozes() {
        let mut reg = AlarmRegistry::new();
        let a = reg.upsert(&draft("08:00", &[])).unwrap();
        reg.push_snooze(SnoozeEntry::new(a.clone(), 0));
        assert!(reg.remove(&a.id).is_some());
        assert!(reg.pending_snoozes().is_empty());
    }

    #[test]
    fn replace_alarms_keeps_only_live_snoozes() {
        let mut reg = AlarmRegistry::new();
        let kept = reg.upsert(&draft("07:00", &[])).unwrap();
        let gone = reg.upsert(&draft("08:00", &[])).unwrap();
        reg.push_snooze(SnoozeEntry::new(kept.clone(), 0));
        reg.push_snooze(SnoozeEntry::new(gone, 0));

        let fresh = reg.upsert(&draft("09:00", &[1])).unwrap();
        reg.replace_alarms(vec![kept.clone(), fresh]);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.alarms()[0], kept);
        assert_eq!(reg.pending_snoozes().len(), 1);
        assert_eq!(reg.pending_snoozes()[0].alarm.id, kept.id);
    }
}
