//! Gapless scheduling of synthesized audio against a running end-time cursor.

use std::collections::VecDeque;

/// Sample rate of the audio the live model speaks (mono PCM16 LE).
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

#[derive(Clone, Debug, PartialEq)]
pub struct ScheduledChunk {
  pub seq: u64,
  /// Seconds on the session clock.
  pub start_at: f64,
  pub duration: f64,
}

impl ScheduledChunk {
  pub fn end(&self) -> f64 {
    self.start_at + self.duration
  }
}

#[derive(Debug)]
pub struct PlaybackScheduler {
  sample_rate: u32,
  cursor: f64,
  next_seq: u64,
  queued: VecDeque<ScheduledChunk>,
}

impl PlaybackScheduler {
  pub fn new(sample_rate: u32) -> Self {
    Self { sample_rate, cursor: 0.0, next_seq: 0, queued: VecDeque::new() }
  }

  pub fn duration_of(&self, pcm_bytes: usize) -> f64 {
    (pcm_bytes / 2) as f64 / f64::from(self.sample_rate)
  }

  /// Place a chunk right after the previous one, or at `now` if playback has drained.
  pub fn schedule(&mut self, now: f64, pcm_bytes: usize) -> ScheduledChunk {
    self.prune(now);
    let start_at = now.max(self.cursor);
    let duration = self.duration_of(pcm_bytes);
    self.cursor = start_at + duration;
    let chunk = ScheduledChunk { seq: self.next_seq, start_at, duration };
    self.next_seq += 1;
    self.queued.push_back(chunk.clone());
    chunk
  }

  /// Drop everything not yet finished and reset the cursor. Returns the dropped seqs.
  pub fn interrupt(&mut self) -> Vec<u64> {
    self.cursor = 0.0;
    self.queued.drain(..).map(|c| c.seq).collect()
  }

  #[cfg(test)]
  pub fn cursor(&self) -> f64 {
    self.cursor
  }

  #[cfg(test)]
  pub fn queued(&self) -> usize {
    self.queued.len()
  }

  fn prune(&mut self, now: f64) {
    while self.queued.front().is_some_and(|c| c.end() <= now) {
      self.queued.pop_front();
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  // 0.5s of 24 kHz PCM16
  const HALF_SECOND: usize = 24_000;

  #[test]
  fn chunks_play_back_to_back() {
    let mut s = PlaybackScheduler::new(OUTPUT_SAMPLE_RATE);
    let a = s.schedule(1.0, HALF_SECOND);
    let b = s.schedule(1.1, HALF_SECOND);
    assert_eq!(a.start_at, 1.0);
    assert_eq!(a.duration, 0.5);
    assert_eq!(b.start_at, 1.5);
    assert_eq!(s.cursor(), 2.0);
    assert_eq!((a.seq, b.seq), (0, 1));
  }

  #[test]
  fn late_chunk_starts_now() {
    let mut s = PlaybackScheduler::new(OUTPUT_SAMPLE_RATE);
    s.schedule(0.0, HALF_SECOND);
    let late = s.schedule(3.0, HALF_SECOND);
    assert_eq!(late.start_at, 3.0);
    assert_eq!(s.queued(), 1);
  }

  #[test]
  fn interrupt_flushes_queue_and_resets_cursor() {
    let mut s = PlaybackScheduler::new(OUTPUT_SAMPLE_RATE);
    s.schedule(0.0, HALF_SECOND);
    s.schedule(0.0, HALF_SECOND);
    s.schedule(0.0, HALF_SECOND);
    assert_eq!(s.interrupt(), vec![0, 1, 2]);
    assert_eq!(s.cursor(), 0.0);
    assert_eq!(s.queued(), 0);
    let next = s.schedule(0.2, HALF_SECOND);
    assert_eq!(next.start_at, 0.2);
    assert_eq!(next.seq, 3);
  }
}
