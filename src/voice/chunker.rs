//! Re-chunking of microphone PCM into fixed-size frames for the live stream.

/// Microphone sample rate expected from the client (mono PCM16 LE).
pub const INPUT_SAMPLE_RATE: u32 = 16_000;
pub const CHUNK_SAMPLES: usize = 4096;
pub const CHUNK_BYTES: usize = CHUNK_SAMPLES * 2;

/// Buffers arbitrary-sized client frames and yields exact `CHUNK_BYTES` chunks.
#[derive(Debug, Default)]
pub struct PcmChunker {
  pending: Vec<u8>,
}

impl PcmChunker {
  pub fn new() -> Self {
    Self::default()
  }

  /// Append client bytes; returns every complete chunk now available.
  pub fn push(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
    self.pending.extend_from_slice(bytes);
    let full = self.pending.len() / CHUNK_BYTES;
    if full == 0 {
      return Vec::new();
    }
    let rest = self.pending.split_off(full * CHUNK_BYTES);
    let ready = std::mem::replace(&mut self.pending, rest);
    ready.chunks_exact(CHUNK_BYTES).map(<[u8]>::to_vec).collect()
  }

  /// Remaining bytes zero-padded to a full chunk, if any are buffered.
  pub fn flush(&mut self) -> Option<Vec<u8>> {
    if self.pending.is_empty() {
      return None;
    }
    let mut tail = std::mem::take(&mut self.pending);
    tail.resize(CHUNK_BYTES, 0);
    Some(tail)
  }

  #[cfg(test)]
  pub fn pending_bytes(&self) -> usize {
    self.pending.len()
  }

  pub fn clear(&mut self) {
    self.pending.clear();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn emits_exact_chunks_and_keeps_remainder() {
    let mut c = PcmChunker::new();
    assert!(c.push(&[1u8; 5000]).is_empty());
    let out = c.push(&[2u8; 12_000]);
    assert_eq!(out.len(), 2);
    assert!(out.iter().all(|ch| ch.len() == CHUNK_BYTES));
    assert_eq!(out[0][4999], 1);
    assert_eq!(out[0][5000], 2);
    assert_eq!(c.pending_bytes(), 17_000 - 2 * CHUNK_BYTES);
  }

  #[test]
  fn flush_pads_tail_with_silence() {
    let mut c = PcmChunker::new();
    assert!(c.flush().is_none());
    c.push(&[7u8; 10]);
    let tail = c.flush().unwrap();
    assert_eq!(tail.len(), CHUNK_BYTES);
    assert_eq!(&tail[..10], &[7u8; 10]);
    assert!(tail[10..].iter().all(|b| *b == 0));
    assert_eq!(c.pending_bytes(), 0);
  }
}
