//! Escalation audio engine.
//!
//! Synthesizes two alert sounds into mono `f32` sample buffers:
//!
//! - **Alarm**: two sawtooth oscillators at 500 Hz and 504 Hz whose 4 Hz
//!   beat produces a dissonant wobble. Master gain ramps linearly from 0.01
//!   to 1.0 over 30 seconds. Runs until [`EscalationAudio::stop`].
//! - **Cue**: a 300 ms 880 Hz sine beep decaying exponentially from 0.1 to
//!   0.001, for benign notifications. Cues never touch the alarm voice.
//!
//! Envelopes are evaluated against absolute epoch-millisecond timestamps,
//! so a host that stalls for ten seconds resumes at the gain it would have
//! reached anyway.
//!
//! The device is abstracted as an [`OutputContext`] which may start out
//! suspended (browser-style autoplay policies). Only a user-initiated
//! [`EscalationAudio::unlock`] is guaranteed to resume it; until then
//! [`EscalationAudio::render`] produces silence.

use std::f64::consts::TAU;

use crate::error::AudioError;

pub const ALARM_FREQUENCIES_HZ: [f64; 2] = [500.0, 504.0];
pub const ESCALATION_RAMP_MS: i64 = 30_000;
pub const ESCALATION_START_GAIN: f32 = 0.01;
pub const ESCALATION_PEAK_GAIN: f32 = 1.0;

pub const CUE_FREQUENCY_HZ: f64 = 880.0;
pub const CUE_DURATION_MS: i64 = 300;
const CUE_START_GAIN: f32 = 0.1;
const CUE_END_GAIN: f32 = 0.001;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Waveform {
    Sine,
    /// Rich in harmonics; harsher than sine at the same gain.
    Sawtooth,
}

#[derive(Debug, Clone)]
struct Oscillator {
    waveform: Waveform,
    frequency_hz: f64,
    /// Normalised phase in `[0, 1)`.
    phase: f64,
}

impl Oscillator {
    fn new(waveform: Waveform, frequency_hz: f64) -> Self {
        Self {
            waveform,
            frequency_hz,
            phase: 0.0,
        }
    }

    fn next_sample(&mut self, sample_rate: u32) -> f32 {
        let value = match self.waveform {
            Waveform::Sine => (self.phase * TAU).sin(),
            Waveform::Sawtooth => 2.0 * self.phase - 1.0,
        };
        self.phase = (self.phase + self.frequency_hz / f64::from(sample_rate)).fract();
        value as f32
    }
}

/// Gain over time relative to a voice's start.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Envelope {
    /// Linear ramp, then holds at `to`.
    Linear { from: f32, to: f32, duration_ms: i64 },
    /// Exponential decay; silent after `duration_ms`.
    Exponential { from: f32, to: f32, duration_ms: i64 },
}

impl Envelope {
    pub fn gain_at(&self, elapsed_ms: f64) -> f32 {
        let elapsed = elapsed_ms.max(0.0);
        match *self {
            Envelope::Linear {
                from,
                to,
                duration_ms,
            } => {
                let t = if duration_ms <= 0 {
                    1.0
                } else {
                    (elapsed / duration_ms as f64).min(1.0)
                };
                from + (to - from) * t as f32
            }
            Envelope::Exponential {
                from,
                to,
                duration_ms,
            } => {
                if elapsed >= duration_ms as f64 {
                    return 0.0;
                }
                let t = elapsed / duration_ms as f64;
                (f64::from(from) * (f64::from(to) / f64::from(from)).powf(t)) as f32
            }
        }
    }
}

#[derive(Debug, Clone)]
struct Voice {
    oscillators: Vec<Oscillator>,
    envelope: Envelope,
    started_at_ms: i64,
    /// `None` runs until stopped.
    ends_at_ms: Option<i64>,
}

impl Voice {
    fn escalation(now_ms: i64) -> Self {
        Self {
            oscillators: ALARM_FREQUENCIES_HZ
                .iter()
                .map(|&f| Oscillator::new(Waveform::Sawtooth, f))
                .collect(),
            envelope: Envelope::Linear {
                from: ESCALATION_START_GAIN,
                to: ESCALATION_PEAK_GAIN,
                duration_ms: ESCALATION_RAMP_MS,
            },
            started_at_ms: now_ms,
            ends_at_ms: None,
        }
    }

    fn cue(now_ms: i64) -> Self {
        Self {
            oscillators: vec![Oscillator::new(Waveform::Sine, CUE_FREQUENCY_HZ)],
            envelope: Envelope::Exponential {
                from: CUE_START_GAIN,
                to: CUE_END_GAIN,
                duration_ms: CUE_DURATION_MS,
            },
            started_at_ms: now_ms,
            ends_at_ms: Some(now_ms + CUE_DURATION_MS),
        }
    }

    fn gain_at(&self, at_ms: f64) -> f32 {
        self.envelope.gain_at(at_ms - self.started_at_ms as f64)
    }

    fn finished_by(&self, at_ms: i64) -> bool {
        self.ends_at_ms.is_some_and(|end| end <= at_ms)
    }

    fn next_sample(&mut self, sample_rate: u32, at_ms: f64) -> f32 {
        if at_ms < self.started_at_ms as f64 {
            return 0.0;
        }
        if let Some(end) = self.ends_at_ms {
            if at_ms >= end as f64 {
                return 0.0;
            }
        }
        let gain = self.gain_at(at_ms);
        self.oscillators
            .iter_mut()
            .map(|o| o.next_sample(sample_rate))
            .sum::<f32>()
            * gain
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputState {
    Running,
    Suspended,
}

/// Host audio output.
pub trait OutputContext: Send {
    fn state(&self) -> OutputState;

    /// Try to resume a suspended output. Restrictive hosts only honour
    /// resumes that come from a user gesture.
    fn resume(&mut self, user_initiated: bool) -> Result<(), AudioError>;
}

/// Device end of the pipeline: receives rendered mono blocks, in order.
pub trait AudioSink: Send {
    fn sample_rate(&self) -> u32;

    fn play(&mut self, block: &[f32]) -> Result<(), AudioError>;
}

/// Output with no device attached; the host pulls samples via `render`.
#[derive(Debug, Clone)]
pub struct HeadlessOutput {
    state: OutputState,
    restrictive: bool,
    muted: bool,
}

impl HeadlessOutput {
    /// Already running.
    pub fn running() -> Self {
        Self {
            state: OutputState::Running,
            restrictive: false,
            muted: false,
        }
    }

    /// Suspended until a user-initiated resume.
    pub fn restrictive() -> Self {
        Self {
            state: OutputState::Suspended,
            restrictive: true,
            muted: false,
        }
    }

    /// Never resumes. Voices still run, so ramps and timing are unchanged.
    pub fn muted() -> Self {
        Self {
            state: OutputState::Suspended,
            restrictive: true,
            muted: true,
        }
    }
}

impl Default for HeadlessOutput {
    fn default() -> Self {
        Self::running()
    }
}

impl OutputContext for HeadlessOutput {
    fn state(&self) -> OutputState {
        self.state
    }

    fn resume(&mut self, user_initiated: bool) -> Result<(), AudioError> {
        if self.state == OutputState::Running {
            return Ok(());
        }
        if self.muted {
            return Err(AudioError::Output("output muted".into()));
        }
        if self.restrictive && !user_initiated {
            return Err(AudioError::AutoplayBlocked);
        }
        self.state = OutputState::Running;
        Ok(())
    }
}

/// Alarm escalation and cue synthesizer.
pub struct EscalationAudio<O: OutputContext = HeadlessOutput> {
    output: O,
    alarm: Option<Voice>,
    cues: Vec<Voice>,
}

impl<O: OutputContext> EscalationAudio<O> {
    pub fn new(output: O) -> Self {
        Self {
            output,
            alarm: None,
            cues: Vec::new(),
        }
    }

    pub fn output(&self) -> &O {
        &self.output
    }

    pub fn is_ringing(&self) -> bool {
        self.alarm.is_some()
    }

    pub fn is_audible(&self) -> bool {
        self.output.state() == OutputState::Running
    }

    /// Resume the output on behalf of a user gesture. Returns audibility.
    pub fn unlock(&mut self) -> bool {
        self.ensure_output(true)
    }

    fn ensure_output(&mut self, user_initiated: bool) -> bool {
        if self.output.state() == OutputState::Suspended {
            if let Err(e) = self.output.resume(user_initiated) {
                tracing::debug!(error = %e, user_initiated, "audio output stayed suspended");
            }
        }
        self.is_audible()
    }

    /// Begin the escalating alarm. No-op if already ringing.
    ///
    /// Returns whether the output is currently audible; the voice is armed
    /// either way and becomes audible as soon as the output resumes.
    pub fn start(&mut self, now_ms: i64) -> bool {
        self.reap_cues(now_ms);
        let audible = self.ensure_output(false);
        if self.alarm.is_none() {
            self.alarm = Some(Voice::escalation(now_ms));
        }
        audible
    }

    /// Halt and release the alarm oscillators. Returns whether it was ringing.
    pub fn stop(&mut self) -> bool {
        self.alarm.take().is_some()
    }

    /// Fire a short notification beep alongside whatever else is playing.
    pub fn play_cue(&mut self, now_ms: i64) -> bool {
        self.reap_cues(now_ms);
        let audible = self.ensure_output(false);
        self.cues.push(Voice::cue(now_ms));
        audible
    }

    fn reap_cues(&mut self, now_ms: i64) {
        self.cues.retain(|c| !c.finished_by(now_ms));
    }

    /// Current master gain of the alarm voice, if ringing.
    pub fn escalation_gain(&self, now_ms: i64) -> Option<f32> {
        self.alarm.as_ref().map(|v| v.gain_at(now_ms as f64))
    }

    /// Cues still sounding at `now_ms`.
    pub fn active_cues(&self, now_ms: i64) -> usize {
        self.cues.iter().filter(|c| !c.finished_by(now_ms)).count()
    }

    /// Mix every voice into `out`, the first sample landing at `now_ms`.
    ///
    /// Writes silence while the output is suspended. Finished cues are
    /// released once the buffer has passed their end.
    pub fn render(&mut self, out: &mut [f32], sample_rate: u32, now_ms: i64) {
        let ms_per_sample = 1000.0 / f64::from(sample_rate.max(1));
        let audible = self.is_audible();

        for (i, sample) in out.iter_mut().enumerate() {
            let at_ms = now_ms as f64 + i as f64 * ms_per_sample;
            let mut mix = 0.0f32;
            if let Some(alarm) = self.alarm.as_mut() {
                mix += alarm.next_sample(sample_rate, at_ms);
            }
            for cue in &mut self.cues {
                mix += cue.next_sample(sample_rate, at_ms);
            }
            *sample = if audible { mix.clamp(-1.0, 1.0) } else { 0.0 };
        }

        let buffer_end_ms = now_ms + (out.len() as f64 * ms_per_sample).ceil() as i64;
        self.reap_cues(buffer_end_ms);
    }
}

impl Default for EscalationAudio<HeadlessOutput> {
    fn default() -> Self {
        Self::new(HeadlessOutput::running())
    }
}
