//! Alarm clock coordinator.
//!
//! [`AlarmClock`] is the single mutator of alarm state. It wires the
//! registry, the session machine and the store together, turns user intents
//! and heartbeats into [`Event`]s for the view layer, and persists the alarm
//! list synchronously after every registry mutation. A failed write is
//! reported as [`Event::StorageWarning`]; the in-memory list stays
//! authoritative for the rest of the process.
//!
//! Other processes may write the same store (a second CLI invocation editing
//! alarms while the engine runs). Before each heartbeat and each mutation the
//! clock compares [`AlarmStore::external_revision`] with the value it last saw
//! and reloads the list when it moved, so a persist never overwrites a
//! concurrent edit with a stale copy.
//!
//! ## Usage
//!
//! ```ignore
//! let (mut clock, boot_events) = AlarmClock::load(db, SessionMachine::default(), policy);
//! let ticks = TickSource::start(TICK_PERIOD, true)?;
//! clock.run(ticks, intents_rx, |event| render(event)).await;
//! ```

use std::time::Duration;

use chrono::{DateTime, Local, TimeZone, Utc};
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;

use crate::alarm::{Alarm, AlarmDraft, AlarmRegistry};
use crate::audio::{AudioSink, HeadlessOutput, OutputContext};
use crate::error::{SessionError, ValidationError};
use crate::events::{EndReason, Event};
use crate::session::{DismissOutcome, SessionMachine, SessionState};
use crate::storage::{AlarmStore, Config};
use crate::tick::TickSource;

/// Length of each block rendered into an attached [`AudioSink`].
pub const AUDIO_BLOCK: Duration = Duration::from_millis(100);

/// Behaviour switches taken from [`Config`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockPolicy {
    /// Issue a new challenge after each wrong answer.
    pub regenerate_on_failure: bool,
    /// Emit [`Event::Notification`] alongside each trigger.
    pub notifications: bool,
}

impl Default for ClockPolicy {
    fn default() -> Self {
        Self {
            regenerate_on_failure: false,
            notifications: true,
        }
    }
}

impl From<&Config> for ClockPolicy {
    fn from(config: &Config) -> Self {
        Self {
            regenerate_on_failure: config.challenge.regenerate_on_failure,
            notifications: config.notifications.enabled,
        }
    }
}

/// A user request, as delivered to [`AlarmClock::run`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Save(AlarmDraft),
    Delete(String),
    Toggle(String),
    SetEnabled(String, bool),
    Dismiss(Option<i64>),
    Snooze,
    /// Benign notification beep (timer/pomodoro completion).
    Cue,
    Shutdown,
}

pub struct AlarmClock<S: AlarmStore, O: OutputContext = HeadlessOutput> {
    registry: AlarmRegistry,
    machine: SessionMachine<O>,
    store: S,
    policy: ClockPolicy,
    /// Last seen [`AlarmStore::external_revision`].
    revision: Option<u64>,
    sink: Option<Box<dyn AudioSink>>,
    audio_buf: Vec<f32>,
}

impl<S: AlarmStore, O: OutputContext> AlarmClock<S, O> {
    /// Boot: load alarms from `store`. A load failure starts empty and is
    /// reported in the returned events.
    pub fn load(store: S, machine: SessionMachine<O>, policy: ClockPolicy) -> (Self, Vec<Event>) {
        let mut events = Vec::new();
        let alarms = match store.load_alarms() {
            Ok(alarms) => alarms,
            Err(e) => {
                tracing::warn!(error = %e, "could not load alarms, starting empty");
                events.push(Event::StorageWarning {
                    message: e.to_string(),
                    at: Utc::now(),
                });
                Vec::new()
            }
        };
        tracing::debug!(count = alarms.len(), "alarms loaded");
        let revision = store.external_revision().ok().flatten();
        let clock = Self {
            registry: AlarmRegistry::from_alarms(alarms),
            machine,
            store,
            policy,
            revision,
            sink: None,
            audio_buf: Vec::new(),
        };
        (clock, events)
    }

    /// Attach a device; [`AlarmClock::run`] then feeds it rendered blocks.
    pub fn with_sink(mut self, sink: Box<dyn AudioSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn alarms(&self) -> &[Alarm] {
        self.registry.alarms()
    }

    pub fn registry(&self) -> &AlarmRegistry {
        &self.registry
    }

    pub fn machine(&self) -> &SessionMachine<O> {
        &self.machine
    }

    pub fn state(&self) -> SessionState {
        self.machine.state()
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    // ── Heartbeat ────────────────────────────────────────────────────

    /// Match alarms and snoozes against `now` and trigger the first hit.
    pub fn on_tick<Tz: TimeZone>(&mut self, now: &DateTime<Tz>) -> Vec<Event> {
        let now_ms = now.timestamp_millis();
        let mut events = Vec::new();
        self.refresh(&mut events);

        let due = self.registry.due_alarms(now);
        let disabled_one_shot = due.iter().any(Alarm::is_one_shot);
        for alarm in due {
            self.trigger(alarm, now_ms, &mut events);
        }
        if disabled_one_shot {
            self.persist(&mut events);
        }

        for entry in self.registry.take_due_snoozes(now_ms) {
            self.trigger(entry.alarm, now_ms, &mut events);
        }
        events
    }

    fn trigger(&mut self, alarm: Alarm, now_ms: i64, events: &mut Vec<Event>) {
        let title = format!("ALARM: {}", alarm.label);
        if let Some(event) = self.machine.trigger(alarm, now_ms) {
            events.push(event);
            if self.policy.notifications {
                events.push(Event::Notification {
                    title,
                    at: Utc::now(),
                });
            }
        }
    }

    // ── User intents ─────────────────────────────────────────────────

    /// Create or edit an alarm.
    pub fn request_save(&mut self, draft: &AlarmDraft) -> Result<(Alarm, Vec<Event>), ValidationError> {
        self.machine.audio_mut().unlock();
        let mut events = Vec::new();
        self.refresh(&mut events);
        let alarm = self.registry.upsert(draft)?;
        self.persist(&mut events);
        Ok((alarm, events))
    }

    /// Delete an alarm; if it is ringing, the session is force-stopped.
    pub fn request_delete(&mut self, id: &str) -> Result<Vec<Event>, ValidationError> {
        self.machine.audio_mut().unlock();
        let mut events = Vec::new();
        self.refresh(&mut events);
        self.registry
            .remove(id)
            .ok_or_else(|| ValidationError::UnknownAlarm(id.to_string()))?;
        events.extend(self.machine.force_stop_if(id));
        self.persist(&mut events);
        Ok(events)
    }

    pub fn request_toggle(&mut self, id: &str) -> Result<Vec<Event>, ValidationError> {
        self.machine.audio_mut().unlock();
        let mut events = Vec::new();
        self.refresh(&mut events);
        self.registry.toggle(id)?;
        self.persist(&mut events);
        Ok(events)
    }

    pub fn request_set_enabled(&mut self, id: &str, enabled: bool) -> Result<Vec<Event>, ValidationError> {
        self.machine.audio_mut().unlock();
        let mut events = Vec::new();
        self.refresh(&mut events);
        self.registry.set_enabled(id, enabled)?;
        self.persist(&mut events);
        Ok(events)
    }

    /// Try to dismiss the ringing alarm with an optional answer.
    pub fn request_dismiss(&mut self, answer: Option<i64>) -> Result<Vec<Event>, SessionError> {
        self.machine.audio_mut().unlock();
        let alarm_id = self
            .machine
            .active_alarm_id()
            .map(str::to_string)
            .ok_or(SessionError::NoActiveSession)?;

        let mut events = Vec::new();
        match self.machine.attempt_dismiss(answer)? {
            DismissOutcome::Dismissed => events.push(Event::SessionEnded {
                alarm_id,
                reason: EndReason::Dismissed,
                at: Utc::now(),
            }),
            DismissOutcome::Rejected { failed_attempts } => {
                events.push(Event::DismissRejected {
                    alarm_id,
                    failed_attempts,
                    at: Utc::now(),
                });
                if self.policy.regenerate_on_failure {
                    events.extend(self.machine.regenerate_challenge());
                }
            }
        }
        Ok(events)
    }

    /// Snooze the ringing alarm for five minutes from `now_ms`.
    pub fn request_snooze(&mut self, now_ms: i64) -> Result<Vec<Event>, SessionError> {
        self.machine.audio_mut().unlock();
        let entry = self.machine.snooze(now_ms)?;
        let alarm_id = entry.alarm.id.clone();
        let due_at_epoch_ms = entry.due_at_epoch_ms;
        self.registry.push_snooze(entry);
        tracing::info!(alarm = %alarm_id, due_at_epoch_ms, "alarm snoozed");
        Ok(vec![
            Event::SessionEnded {
                alarm_id: alarm_id.clone(),
                reason: EndReason::Snoozed,
                at: Utc::now(),
            },
            Event::Snoozed {
                alarm_id,
                due_at_epoch_ms,
                at: Utc::now(),
            },
        ])
    }

    /// Short notification beep; independent of any ringing alarm.
    pub fn play_cue(&mut self, now_ms: i64) -> bool {
        self.machine.audio_mut().play_cue(now_ms)
    }

    /// Render one [`AUDIO_BLOCK`] starting at `now_ms` into the attached
    /// sink. A sink that fails is detached; alarms keep ringing silently.
    pub fn pump_audio(&mut self, now_ms: i64) {
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        let sample_rate = sink.sample_rate();
        let frames = (u128::from(sample_rate) * AUDIO_BLOCK.as_millis() / 1000) as usize;
        self.audio_buf.resize(frames, 0.0);
        self.machine
            .audio_mut()
            .render(&mut self.audio_buf, sample_rate, now_ms);
        if let Err(e) = sink.play(&self.audio_buf) {
            tracing::warn!(error = %e, "audio sink failed, continuing silently");
            self.sink = None;
        }
    }

    /// Stop any ringing session (host shutdown).
    pub fn shutdown(&mut self) -> Vec<Event> {
        self.machine.stop(EndReason::Stopped).into_iter().collect()
    }

    /// Apply one intent at `now_ms`, reporting failures as events.
    pub fn handle_intent(&mut self, intent: Intent, now_ms: i64) -> Vec<Event> {
        let result = match intent {
            Intent::Save(draft) => self
                .request_save(&draft)
                .map(|(_, events)| events)
                .map_err(|e| e.to_string()),
            Intent::Delete(id) => self.request_delete(&id).map_err(|e| e.to_string()),
            Intent::Toggle(id) => self.request_toggle(&id).map_err(|e| e.to_string()),
            Intent::SetEnabled(id, enabled) => self
                .request_set_enabled(&id, enabled)
                .map_err(|e| e.to_string()),
            Intent::Dismiss(answer) => self.request_dismiss(answer).map_err(|e| e.to_string()),
            Intent::Snooze => self.request_snooze(now_ms).map_err(|e| e.to_string()),
            Intent::Cue => {
                self.machine.audio_mut().unlock();
                self.play_cue(now_ms);
                Ok(Vec::new())
            }
            Intent::Shutdown => Ok(self.shutdown()),
        };
        result.unwrap_or_else(|message| {
            vec![Event::RequestFailed {
                message,
                at: Utc::now(),
            }]
        })
    }

    /// Drive the clock until the intent channel closes or a
    /// [`Intent::Shutdown`] arrives, handing every event to `emit`.
    pub async fn run<F>(
        &mut self,
        mut ticks: TickSource,
        mut intents: mpsc::UnboundedReceiver<Intent>,
        mut emit: F,
    ) where
        F: FnMut(Event),
    {
        if ticks.is_degraded() {
            emit(Event::TickDegraded { at: Utc::now() });
        }
        let mut audio_clock = tokio::time::interval(AUDIO_BLOCK);
        audio_clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = audio_clock.tick(), if self.sink.is_some() => {
                    self.pump_audio(Utc::now().timestamp_millis());
                }
                tick = ticks.recv() => {
                    if tick.is_none() {
                        tracing::warn!("tick source closed");
                        break;
                    }
                    for event in self.on_tick(&Local::now()) {
                        emit(event);
                    }
                }
                intent = intents.recv() => match intent {
                    None | Some(Intent::Shutdown) => break,
                    Some(intent) => {
                        for event in self.handle_intent(intent, Utc::now().timestamp_millis()) {
                            emit(event);
                        }
                    }
                },
            }
        }
        for event in self.shutdown() {
            emit(event);
        }
    }

    /// Pick up alarm edits committed by another writer since we last looked.
    fn refresh(&mut self, events: &mut Vec<Event>) {
        let revision = match self.store.external_revision() {
            Ok(Some(revision)) => revision,
            Ok(None) => return,
            Err(e) => {
                tracing::warn!(error = %e, "store revision unavailable");
                return;
            }
        };
        if self.revision == Some(revision) {
            return;
        }
        self.revision = Some(revision);
        match self.store.load_alarms() {
            Ok(alarms) => {
                tracing::info!(count = alarms.len(), "alarm list reloaded");
                self.registry.replace_alarms(alarms);
                if let Some(id) = self.machine.active_alarm_id().map(str::to_string) {
                    if self.registry.get(&id).is_none() {
                        events.extend(self.machine.force_stop_if(&id));
                    }
                }
                events.push(Event::AlarmsChanged {
                    alarms: self.registry.alarms().to_vec(),
                    at: Utc::now(),
                });
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not reload alarms, keeping current list");
                events.push(Event::StorageWarning {
                    message: e.to_string(),
                    at: Utc::now(),
                });
            }
        }
    }

    /// Hand the list to the store and report the change.
    fn persist(&mut self, events: &mut Vec<Event>) {
        if let Err(e) = self.store.save_alarms(self.registry.alarms()) {
            tracing::warn!(error = %e, "alarm list not persisted");
            events.push(Event::StorageWarning {
                message: e.to_string(),
                at: Utc::now(),
            });
        }
        events.push(Event::AlarmsChanged {
            alarms: self.registry.alarms().to_vec(),
            at: Utc::now(),
        });
    }
}
