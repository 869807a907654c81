//! Heartbeat source.
//!
//! Emits a payload-free [`Tick`] once per period over an unbounded channel.
//! Consumers read the wall clock themselves on every tick, so a late or
//! dropped heartbeat never accumulates drift.
//!
//! The preferred source is a dedicated OS thread that the async runtime's
//! scheduling cannot starve. Both sources recompute every sleep from the wall
//! clock: whole-second periods land just past a second boundary, so the
//! zero-second tick of each minute is observed even after the host slept or
//! the clock was stepped. If the thread cannot be
//! spawned (or isolation is disabled), ticks come from a Tokio task on
//! the consumer's runtime instead and the source reports
//! [`TickMode::Degraded`].

use std::io;
use std::thread;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;

pub const TICK_PERIOD: Duration = Duration::from_secs(1);

/// Ticks land this far after the wall-clock second boundary.
const ALIGN_MARGIN: Duration = Duration::from_millis(20);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tick;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickMode {
    /// Dedicated thread; unaffected by runtime load.
    Isolated,
    /// In-runtime task; may be delayed when the runtime is busy.
    Degraded,
}

pub struct TickSource {
    mode: TickMode,
    rx: mpsc::UnboundedReceiver<Tick>,
}

impl TickSource {
    /// Start ticking, preferring an isolated thread when `isolated` is set.
    ///
    /// Must be called from within a Tokio runtime, which hosts the fallback.
    pub fn start(period: Duration, isolated: bool) -> io::Result<Self> {
        if !isolated {
            tracing::warn!("isolated tick thread disabled by configuration");
            return Self::degraded(period);
        }
        match Self::isolated(period) {
            Ok(source) => Ok(source),
            Err(e) => Self::fallback(e, period),
        }
    }

    /// Spawn the dedicated tick thread.
    pub fn isolated(period: Duration) -> io::Result<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        thread::Builder::new()
            .name("reveille-tick".into())
            .spawn(move || {
                loop {
                    thread::sleep(next_delay(period));
                    if tx.send(Tick).is_err() {
                        break;
                    }
                }
                tracing::debug!("tick receiver dropped, tick thread exiting");
            })?;
        Ok(Self {
            mode: TickMode::Isolated,
            rx,
        })
    }

    /// In-runtime tick task.
    pub fn degraded(period: Duration) -> io::Result<Self> {
        let handle = tokio::runtime::Handle::try_current().map_err(io::Error::other)?;
        let (tx, rx) = mpsc::unbounded_channel();
        handle.spawn(async move {
            loop {
                tokio::time::sleep(next_delay(period)).await;
                if tx.send(Tick).is_err() {
                    break;
                }
            }
        });
        Ok(Self {
            mode: TickMode::Degraded,
            rx,
        })
    }

    /// Fall back to the in-runtime source after the thread failed to spawn.
    pub fn fallback(cause: io::Error, period: Duration) -> io::Result<Self> {
        tracing::warn!(error = %cause, "tick thread unavailable, background accuracy reduced");
        Self::degraded(period)
    }

    pub fn mode(&self) -> TickMode {
        self.mode
    }

    pub fn is_degraded(&self) -> bool {
        self.mode == TickMode::Degraded
    }

    /// Next heartbeat; `None` once the producer is gone.
    pub async fn recv(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }

    pub fn into_receiver(self) -> mpsc::UnboundedReceiver<Tick> {
        self.rx
    }
}

/// Sleep until the next tick, read fresh from the wall clock.
fn next_delay(period: Duration) -> Duration {
    let since_epoch = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    delay_from(period, since_epoch)
}

/// Whole-second periods end `ALIGN_MARGIN` past a second boundary at least
/// `period - 1s` away; other periods are slept as-is.
fn delay_from(period: Duration, since_epoch: Duration) -> Duration {
    if period.subsec_nanos() != 0 || period.is_zero() {
        return period;
    }
    let into_second = Duration::from_nanos(u64::from(since_epoch.subsec_nanos()));
    let mut delay = Duration::from_secs(1) - into_second + ALIGN_MARGIN;
    if delay > Duration::from_secs(1) {
        // Already inside the margin of this second; aim for the next one.
        delay -= Duration::from_secs(1);
    }
    delay + (period - Duration::from_secs(1))
}
