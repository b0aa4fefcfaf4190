//! Exponential backoff with jitter around remote generative calls.
//!
//! Only rate-limit-class failures are retried; anything else is returned as-is.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use serde::Deserialize;
use tracing::warn;

use crate::error::GenAiError;

#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total number of attempts, including the first one.
  pub max_attempts: u32,
  pub base_delay_ms: u64,
  pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, base_delay_ms: 1000, max_jitter_ms: 1000 }
  }
}

impl RetryPolicy {
  /// Delay before the attempt following `attempt` (0-based), without jitter.
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 1u64 << attempt.min(16);
    Duration::from_millis(self.base_delay_ms.saturating_mul(factor))
  }
}

fn jitter_ms(max: u64) -> u64 {
  if max == 0 {
    0
  } else {
    rand::thread_rng().gen_range(0..=max)
  }
}

pub async fn with_backoff<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, GenAiError>
where
  F: FnMut() -> Fut,
  Fut: Future<Output = Result<T, GenAiError>>,
{
  let attempts = policy.max_attempts.max(1);
  for attempt in 0..attempts {
    match op().await {
      Ok(v) => return Ok(v),
      Err(e) if e.is_rate_limited() => {
        if attempt + 1 == attempts {
          warn!(target: "worldview_quiz", %label, attempt = attempt + 1, error = %e, "Rate limited on final attempt");
          break;
        }
        let delay = policy.backoff(attempt) + Duration::from_millis(jitter_ms(policy.max_jitter_ms));
        warn!(target: "worldview_quiz", %label, attempt = attempt + 1, ?delay, error = %e, "Rate limited; backing off");
        tokio::time::sleep(delay).await;
      }
      Err(e) => return Err(e),
    }
  }
  Err(GenAiError::RetriesExhausted { attempts })
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicU32, Ordering};
  use std::sync::Arc;

  fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy { max_attempts, base_delay_ms: 1, max_jitter_ms: 0 }
  }

  #[tokio::test]
  async fn succeeds_after_two_rate_limits() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let out = with_backoff(&fast_policy(3), "test", move || {
      let c = c.clone();
      async move {
        let n = c.fetch_add(1, Ordering::SeqCst);
        if n < 2 { Err(GenAiError::RateLimited("429".into())) } else { Ok(n) }
      }
    })
    .await;
    assert_eq!(out.unwrap(), 2);
    assert_eq!(calls.load(Ordering::SeqCst), 3);
  }

  #[tokio::test]
  async fn never_exceeds_max_attempts() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let out: Result<(), _> = with_backoff(&fast_policy(4), "test", move || {
      let c = c.clone();
      async move {
        c.fetch_add(1, Ordering::SeqCst);
        Err(GenAiError::RateLimited("quota".into()))
      }
    })
    .await;
    assert!(matches!(out, Err(GenAiError::RetriesExhausted { attempts: 4 })));
    assert_eq!(calls.load(Ordering::SeqCst), 4);
  }

  #[tokio::test]
  async fn other_failures_are_not_retried() {
    let calls = Arc::new(AtomicU32::new(0));
    let c = calls.clone();
    let out: Result<(), _> = with_backoff(&fast_policy(3), "test", move || {
      let c = c.clone();
      async move {
        c.fetch_add(1, Ordering::SeqCst);
        Err(GenAiError::Http { status: 500, message: "internal".into() })
      }
    })
    .await;
    assert!(matches!(out, Err(GenAiError::Http { status: 500, .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn backoff_doubles() {
    let p = RetryPolicy { max_attempts: 3, base_delay_ms: 100, max_jitter_ms: 0 };
    assert_eq!(p.backoff(0), Duration::from_millis(100));
    assert_eq!(p.backoff(2), Duration::from_millis(400));
  }
}
