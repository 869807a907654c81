//! Terminal bell output.
//!
//! Rendered blocks are reduced to their peak level. Above [`THRESHOLD`] the
//! sink writes BEL, and rings more often as the level rises: a quiet start
//! rings every two seconds, a full-volume alarm five times a second.

use std::io::{self, Write};

use reveille_core::{AudioError, AudioSink};

/// Rate the engine renders at; only the block envelope matters here.
const SAMPLE_RATE: u32 = 8_000;
/// Peak level below which a block is treated as silence.
const THRESHOLD: f32 = 0.05;
const SLOWEST_MS: u64 = 2_000;
const FASTEST_MS: u64 = 200;

pub struct TerminalBell<W> {
    out: W,
    /// Audio time consumed so far.
    played_ms: u64,
    last_ring_ms: Option<u64>,
}

impl TerminalBell<io::Stderr> {
    /// Stdout carries the event stream, so the bell goes to stderr.
    pub fn stderr() -> Self {
        Self::new(io::stderr())
    }
}

impl<W: Write + Send> TerminalBell<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            played_ms: 0,
            last_ring_ms: None,
        }
    }

    #[cfg(test)]
    fn into_inner(self) -> W {
        self.out
    }
}

fn ring_interval_ms(peak: f32) -> u64 {
    let level = peak.clamp(0.0, 1.0);
    SLOWEST_MS - ((SLOWEST_MS - FASTEST_MS) as f32 * level) as u64
}

impl<W: Write + Send> AudioSink for TerminalBell<W> {
    fn sample_rate(&self) -> u32 {
        SAMPLE_RATE
    }

    fn play(&mut self, block: &[f32]) -> Result<(), AudioError> {
        let now = self.played_ms;
        self.played_ms += block.len() as u64 * 1000 / u64::from(SAMPLE_RATE);

        let peak = block.iter().fold(0.0f32, |m, s| m.max(s.abs()));
        if peak < THRESHOLD {
            return Ok(());
        }
        let due = match self.last_ring_ms {
            Some(last) => now.saturating_sub(last) >= ring_interval_ms(peak),
            None => true,
        };
        if due {
            self.out
                .write_all(b"\x07")
                .and_then(|()| self.out.flush())
                .map_err(|e| AudioError::Output(e.to_string()))?;
            self.last_ring_ms = Some(now);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One 100 ms block at a constant level.
    fn block(level: f32) -> Vec<f32> {
        vec![level; (SAMPLE_RATE / 10) as usize]
    }

    fn rings(level: f32, blocks: usize) -> usize {
        let mut bell = TerminalBell::new(Vec::new());
        for _ in 0..blocks {
            bell.play(&block(level)).unwrap();
        }
        bell.into_inner().len()
    }

    #[test]
    fn silence_never_rings() {
        assert_eq!(rings(0.0, 50), 0);
        assert_eq!(rings(0.01, 50), 0);
    }

    #[test]
    fn louder_rings_faster() {
        // 1 s of audio.
        assert_eq!(rings(1.0, 10), 5);
        assert_eq!(rings(0.1, 10), 1);
        assert!(rings(0.5, 40) > rings(0.1, 40));
    }

    #[test]
    fn writes_bel_bytes() {
        let mut bell = TerminalBell::new(Vec::new());
        bell.play(&block(-0.8)).unwrap();
        assert_eq!(bell.into_inner(), b"\x07");
    }

    #[test]
    fn interval_spans_slowest_to_fastest() {
        assert_eq!(ring_interval_ms(0.0), SLOWEST_MS);
        assert_eq!(ring_interval_ms(1.0), FASTEST_MS);
        assert_eq!(ring_interval_ms(3.0), FASTEST_MS);
    }
}
