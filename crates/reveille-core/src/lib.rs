//! # Reveille Core Library
//!
//! This library provides the alarm trigger and escalation engine behind the
//! Reveille alarm clock. The CLI binary is a thin front end over it; any
//! other host (desktop shell, web view) drives the same [`AlarmClock`].
//!
//! ## Architecture
//!
//! - **Tick Source**: a dedicated thread emitting one heartbeat per second
//!   over a channel, with an in-runtime fallback
//! - **Alarm Registry**: configured alarms plus in-memory snoozes; matches
//!   the wall clock once per minute
//! - **Session Machine**: at most one ringing alarm, gated by a math
//!   challenge when strict
//! - **Escalation Audio**: dissonant sawtooth pair ramping to full volume
//!   over 30 seconds, plus a short notification cue
//! - **Storage**: SQLite key-value persistence and TOML configuration
//!
//! ## Key Components
//!
//! - [`AlarmClock`]: coordinator and single mutator of alarm state
//! - [`SessionMachine`]: trigger/dismiss/snooze state machine
//! - [`TickSource`]: heartbeat producer
//! - [`Database`]: alarm persistence and backup
//! - [`Config`]: application configuration management

pub mod alarm;
pub mod audio;
pub mod challenge;
pub mod clock;
pub mod error;
pub mod events;
pub mod session;
pub mod storage;
pub mod tick;

pub use alarm::{Alarm, AlarmDraft, AlarmRegistry, AlarmTime, Difficulty, SnoozeEntry};
pub use audio::{AudioSink, EscalationAudio, HeadlessOutput, OutputContext, OutputState};
pub use challenge::{Challenge, RandomSource, SeededRandom, SequenceRandom, ThreadRandom};
pub use clock::{AlarmClock, ClockPolicy, Intent, AUDIO_BLOCK};
pub use error::{AudioError, ConfigError, CoreError, SessionError, StorageError, ValidationError};
pub use events::{EndReason, Event};
pub use session::{DismissOutcome, SessionMachine, SessionState};
pub use storage::{AlarmStore, Config, Database, MemoryStore};
pub use tick::{Tick, TickMode, TickSource, TICK_PERIOD};
