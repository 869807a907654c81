//! Trigger / dismiss state machine.
//!
//! Owns the single ringing-session slot together with the audio engine and
//! the challenge randomness, so the "at most one alarm ringing" rule and the
//! "ringing implies audio running" rule are enforced in one place.
//!
//! ## State Transitions
//!
//! ```text
//! Idle -> Ringing ----------------------------------> Idle  (dismiss, snooze, stop)
//!         Ringing(awaiting answer) -- wrong answer --> Ringing(awaiting answer)
//! ```

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::alarm::{Alarm, SnoozeEntry};
use crate::audio::{EscalationAudio, HeadlessOutput, OutputContext};
use crate::challenge::{self, Challenge, RandomSource, ThreadRandom};
use crate::error::SessionError;
use crate::events::{EndReason, Event};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Idle,
    /// Non-strict: dismissable immediately.
    Ringing,
    /// Strict: dismissable only with the challenge answer.
    AwaitingAnswer,
}

/// The one alarm currently ringing.
#[derive(Debug, Clone)]
pub struct ActiveSession {
    pub alarm: Alarm,
    pub challenge: Option<Challenge>,
    pub ring_started_at_ms: i64,
    pub failed_attempts: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DismissOutcome {
    Dismissed,
    /// Session keeps ringing; the challenge is unchanged.
    Rejected { failed_attempts: u32 },
}

pub struct SessionMachine<O: OutputContext = HeadlessOutput> {
    session: Option<ActiveSession>,
    audio: EscalationAudio<O>,
    rng: Box<dyn RandomSource>,
}

impl Default for SessionMachine<HeadlessOutput> {
    fn default() -> Self {
        Self::new(EscalationAudio::default(), Box::new(ThreadRandom))
    }
}

impl<O: OutputContext> SessionMachine<O> {
    pub fn new(audio: EscalationAudio<O>, rng: Box<dyn RandomSource>) -> Self {
        Self {
            session: None,
            audio,
            rng,
        }
    }

    // ── Queries ──────────────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        match &self.session {
            None => SessionState::Idle,
            Some(s) if s.alarm.strict => SessionState::AwaitingAnswer,
            Some(_) => SessionState::Ringing,
        }
    }

    pub fn is_ringing(&self) -> bool {
        self.session.is_some()
    }

    pub fn session(&self) -> Option<&ActiveSession> {
        self.session.as_ref()
    }

    pub fn active_alarm_id(&self) -> Option<&str> {
        self.session.as_ref().map(|s| s.alarm.id.as_str())
    }

    pub fn audio(&self) -> &EscalationAudio<O> {
        &self.audio
    }

    pub fn audio_mut(&mut self) -> &mut EscalationAudio<O> {
        &mut self.audio
    }

    // ── Commands ─────────────────────────────────────────────────────

    /// Open a session for `alarm`. Returns `None` when one is already
    /// active: the first trigger wins, later ones are dropped.
    pub fn trigger(&mut self, alarm: Alarm, now_ms: i64) -> Option<Event> {
        if let Some(active) = &self.session {
            tracing::debug!(
                dropped = %alarm.id,
                active = %active.alarm.id,
                "trigger ignored, a session is already ringing"
            );
            return None;
        }

        let challenge = alarm
            .strict
            .then(|| challenge::generate(alarm.difficulty, self.rng.as_mut()));
        let audible = self.audio.start(now_ms);
        tracing::info!(alarm = %alarm.id, time = %alarm.time, strict = alarm.strict, "alarm triggered");

        let event = Event::AlarmTriggered {
            alarm: alarm.clone(),
            challenge: challenge.as_ref().map(|c| c.problem_text.clone()),
            audible,
            at: Utc::now(),
        };
        self.session = Some(ActiveSession {
            alarm,
            challenge,
            ring_started_at_ms: now_ms,
            failed_attempts: 0,
        });
        Some(event)
    }

    /// Try to dismiss the ringing alarm.
    ///
    /// Non-strict sessions stop regardless of `answer`. Strict sessions
    /// stop only on the exact expected answer; anything else is rejected
    /// and the session keeps ringing with the same challenge.
    pub fn attempt_dismiss(&mut self, answer: Option<i64>) -> Result<DismissOutcome, SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoActiveSession)?;

        let accepted = match (&session.challenge, answer) {
            (None, _) => true,
            (Some(challenge), Some(value)) => challenge.verify(value),
            (Some(_), None) => false,
        };

        if accepted {
            self.stop(EndReason::Dismissed);
            return Ok(DismissOutcome::Dismissed);
        }

        session.failed_attempts += 1;
        tracing::info!(
            alarm = %session.alarm.id,
            failed_attempts = session.failed_attempts,
            "dismiss rejected"
        );
        Ok(DismissOutcome::Rejected {
            failed_attempts: session.failed_attempts,
        })
    }

    /// Replace the current challenge with a fresh one of the same tier.
    pub fn regenerate_challenge(&mut self) -> Option<Event> {
        let session = self.session.as_mut()?;
        if !session.alarm.strict {
            return None;
        }
        let next = challenge::generate(session.alarm.difficulty, self.rng.as_mut());
        let event = Event::ChallengeUpdated {
            alarm_id: session.alarm.id.clone(),
            problem_text: next.problem_text.clone(),
            at: Utc::now(),
        };
        session.challenge = Some(next);
        Some(event)
    }

    /// Stop ringing and hand back a snooze due five minutes from `now_ms`.
    ///
    /// Always permitted while ringing, strict or not.
    pub fn snooze(&mut self, now_ms: i64) -> Result<SnoozeEntry, SessionError> {
        let alarm = self
            .session
            .as_ref()
            .map(|s| s.alarm.clone())
            .ok_or(SessionError::NoActiveSession)?;
        self.stop(EndReason::Snoozed);
        Ok(SnoozeEntry::new(alarm, now_ms))
    }

    /// Halt audio and clear the session. Returns `None` if already idle.
    pub fn stop(&mut self, reason: EndReason) -> Option<Event> {
        self.audio.stop();
        let ended = self.session.take()?;
        tracing::info!(alarm = %ended.alarm.id, ?reason, "alarm session ended");
        Some(Event::SessionEnded {
            alarm_id: ended.alarm.id,
            reason,
            at: Utc::now(),
        })
    }

    /// Force-stop when the ringing alarm is `alarm_id` (it is being deleted).
    pub fn force_stop_if(&mut self, alarm_id: &str) -> Option<Event> {
        if self.active_alarm_id() == Some(alarm_id) {
            self.stop(EndReason::Deleted)
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alarm::{AlarmDraft, SNOOZE_DURATION_MS};
    use crate::challenge::SequenceRandom;

    fn alarm(id: &str, strict: bool, difficulty: &str) -> Alarm {
        AlarmDraft {
            time: "07:30".into(),
            strict,
            difficulty: difficulty.into(),
            ..AlarmDraft::default()
        }
        .build(id.into(), true)
        .unwrap()
    }

    fn machine(script: Vec<f64>) -> SessionMachine {
        SessionMachine::new(EscalationAudio::default(), Box::new(SequenceRandom::new(script)))
    }

    fn expected_answer(m: &SessionMachine) -> i64 {
        m.session()
            .and_then(|s| s.challenge.as_ref())
            .map(|c| c.expected_answer)
            .unwrap()
    }

    #[test]
    fn non_strict_dismisses_immediately() {
        let mut m = machine(vec![0.5]);
        assert!(m.trigger(alarm("a", false, "easy"), 0).is_some());
        assert_eq!(m.state(), SessionState::Ringing);
        assert!(m.audio().is_ringing());
        assert!(m.session().unwrap().challenge.is_none());

        assert_eq!(m.attempt_dismiss(None), Ok(DismissOutcome::Dismissed));
        assert_eq!(m.state(), SessionState::Idle);
        assert!(!m.audio().is_ringing());
    }

    #[test]
    fn second_trigger_is_dropped() {
        let mut m = machine(vec![0.5]);
        assert!(m.trigger(alarm("a", false, "easy"), 0).is_some());
        assert!(m.trigger(alarm("b", false, "easy"), 0).is_none());
        assert_eq!(m.active_alarm_id(), Some("a"));
    }

    #[test]
    fn strict_requires_exact_answer() {
        let mut m = machine(vec![0.9, 0.0, 0.0, 0.0, 0.5, 0.0, 0.99, 0.9]);
        let event = m.trigger(alarm("a", true, "hard"), 0).unwrap();
        match event {
            Event::AlarmTriggered { challenge, .. } => {
                assert_eq!(challenge.as_deref(), Some("12 << 3 (Base 10)"));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert_eq!(m.state(), SessionState::AwaitingAnswer);

        assert_eq!(
            m.attempt_dismiss(Some(95)),
            Ok(DismissOutcome::Rejected { failed_attempts: 1 })
        );
        assert_eq!(
            m.attempt_dismiss(None),
            Ok(DismissOutcome::Rejected { failed_attempts: 2 })
        );
        assert!(m.audio().is_ringing());
        assert_eq!(expected_answer(&m), 96, "challenge not regenerated");

        assert_eq!(m.attempt_dismiss(Some(96)), Ok(DismissOutcome::Dismissed));
        assert!(!m.is_ringing());
    }

    #[test]
    fn snooze_skips_challenge_and_schedules_five_minutes_out() {
        let mut m = machine(vec![0.3]);
        m.trigger(alarm("a", true, "hard"), 0);
        let entry = m.snooze(1_234_567).unwrap();
        assert_eq!(entry.due_at_epoch_ms, 1_234_567 + SNOOZE_DURATION_MS);
        assert_eq!(entry.alarm.id, "a");
        assert!(!m.is_ringing());
        assert!(!m.audio().is_ringing());
    }

    #[test]
    fn dismiss_and_snooze_need_a_session() {
        let mut m = machine(vec![0.3]);
        assert_eq!(m.attempt_dismiss(Some(1)), Err(SessionError::NoActiveSession));
        assert_eq!(m.snooze(0).unwrap_err(), SessionError::NoActiveSession);
        assert!(m.stop(EndReason::Stopped).is_none());
    }

    #[test]
    fn force_stop_only_matches_ringing_alarm() {
        let mut m = machine(vec![0.3]);
        m.trigger(alarm("a", true, "medium"), 0);
        assert!(m.force_stop_if("b").is_none());
        assert!(m.is_ringing());
        match m.force_stop_if("a") {
            Some(Event::SessionEnded { reason, .. }) => assert_eq!(reason, EndReason::Deleted),
            other => panic!("unexpected {other:?}"),
        }
        assert!(!m.audio().is_ringing());
    }

    #[test]
    fn regenerate_replaces_challenge_for_strict_only() {
        let mut m = machine(vec![0.0, 0.0, 0.0, 0.0, 0.0, 0.6, 0.5, 0.5, 0.5]);
        m.trigger(alarm("a", true, "easy"), 0);
        let first = expected_answer(&m);
        assert!(m.regenerate_challenge().is_some());
        assert_ne!(expected_answer(&m), first);

        let mut plain = machine(vec![0.0]);
        plain.trigger(alarm("b", false, "easy"), 0);
        assert!(plain.regenerate_challenge().is_none());
    }
}
