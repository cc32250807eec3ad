use crate::context::Context;
use crate::error::JobError;

use std::fmt;
use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{error, trace};

/// Counting admission gate bounding how many jobs run at once.
///
/// A permit is handed out per admitted job and returned to the gate when the
/// permit is dropped, so release never blocks and cannot happen twice.
pub(crate) struct CapacityLimiter {
  semaphore: Arc<Semaphore>,
  capacity: usize,
}

impl fmt::Debug for CapacityLimiter {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("CapacityLimiter")
      .field("capacity", &self.capacity)
      .field("available", &self.available())
      .finish()
  }
}

impl CapacityLimiter {
  pub(crate) fn new(capacity: usize) -> Result<Self, JobError> {
    if capacity > Semaphore::MAX_PERMITS {
      return Err(JobError::InvalidConfiguration(format!(
        "capacity {} exceeds the maximum of {}",
        capacity,
        Semaphore::MAX_PERMITS
      )));
    }
    Ok(Self {
      semaphore: Arc::new(Semaphore::new(capacity)),
      capacity,
    })
  }

  pub(crate) fn capacity(&self) -> usize {
    self.capacity
  }

  pub(crate) fn available(&self) -> usize {
    self.semaphore.available_permits()
  }

  /// Waits for a permit.
  ///
  /// Readiness is checked in a fixed order: the shutdown latch first, then the
  /// caller's context, then the permit. A caller that finds a free permit at the
  /// same instant shutdown begins still gets `ShuttingDown`.
  pub(crate) async fn acquire(
    &self,
    shutdown_token: &CancellationToken,
    ctx: &Context,
  ) -> Result<OwnedSemaphorePermit, JobError> {
    let permit = tokio::select! {
      biased;
      _ = shutdown_token.cancelled() => return Err(JobError::ShuttingDown),
      reason = ctx.done() => return Err(reason.into()),
      acquired = self.semaphore.clone().acquire_owned() => acquired,
    };

    match permit {
      Ok(permit) => {
        trace!(available = self.available(), "Acquired capacity permit.");
        Ok(permit)
      }
      Err(_) => {
        // The semaphore is never closed by this crate.
        error!("Capacity semaphore closed unexpectedly.");
        Err(JobError::SemaphoreClosed)
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::time::Duration;

  #[tokio::test]
  async fn test_acquire_and_release_by_drop() {
    let limiter = CapacityLimiter::new(2).unwrap();
    let shutdown_token = CancellationToken::new();
    let ctx = Context::background();

    assert_eq!(limiter.available(), 2);
    let first = limiter.acquire(&shutdown_token, &ctx).await.unwrap();
    let second = limiter.acquire(&shutdown_token, &ctx).await.unwrap();
    assert_eq!(limiter.available(), 0);

    drop(first);
    assert_eq!(limiter.available(), 1);
    drop(second);
    assert_eq!(limiter.available(), 2);
  }

  #[tokio::test]
  async fn test_acquire_blocks_when_exhausted() {
    let limiter = CapacityLimiter::new(1).unwrap();
    let shutdown_token = CancellationToken::new();
    let ctx = Context::background();

    let held = limiter.acquire(&shutdown_token, &ctx).await.unwrap();

    let waiting = limiter.acquire(&shutdown_token, &ctx);
    tokio::pin!(waiting);

    tokio::select! {
        _ = &mut waiting => {
            panic!("Acquire should have blocked because no permits are free.");
        },
        _ = tokio::time::sleep(Duration::from_millis(50)) => {}
    }

    drop(held);
    let permit = tokio::time::timeout(Duration::from_millis(50), waiting)
      .await
      .expect("Acquire did not complete after a permit was released.")
      .unwrap();
    assert_eq!(limiter.available(), 0);
    drop(permit);
  }

  #[tokio::test]
  async fn test_shutdown_takes_priority_over_free_permit() {
    let limiter = CapacityLimiter::new(3).unwrap();
    let shutdown_token = CancellationToken::new();
    shutdown_token.cancel();

    let result = limiter.acquire(&shutdown_token, &Context::background()).await;
    assert!(matches!(result, Err(JobError::ShuttingDown)));
    assert_eq!(limiter.available(), 3);
  }

  #[tokio::test]
  async fn test_shutdown_takes_priority_over_expired_context() {
    let limiter = CapacityLimiter::new(1).unwrap();
    let shutdown_token = CancellationToken::new();
    shutdown_token.cancel();

    let ctx = Context::with_timeout(Duration::ZERO);
    let result = limiter.acquire(&shutdown_token, &ctx).await;
    assert!(matches!(result, Err(JobError::ShuttingDown)));
  }

  #[tokio::test]
  async fn test_caller_deadline_ends_wait() {
    let limiter = CapacityLimiter::new(0).unwrap();
    let shutdown_token = CancellationToken::new();

    let ctx = Context::with_timeout(Duration::from_millis(30));
    let result = limiter.acquire(&shutdown_token, &ctx).await;
    assert!(matches!(result, Err(JobError::DeadlineExceeded)));
  }

  #[tokio::test]
  async fn test_caller_cancellation_ends_wait() {
    let limiter = CapacityLimiter::new(0).unwrap();
    let shutdown_token = CancellationToken::new();
    let caller_token = CancellationToken::new();
    let ctx = Context::from_token(caller_token.clone());

    let canceller = tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      caller_token.cancel();
    });

    let result = limiter.acquire(&shutdown_token, &ctx).await;
    assert!(matches!(result, Err(JobError::Cancelled)));
    canceller.await.unwrap();
  }

  #[tokio::test]
  async fn test_closed_semaphore_is_reported_distinctly() {
    let limiter = CapacityLimiter::new(1).unwrap();
    limiter.semaphore.close();

    let result = limiter.acquire(&CancellationToken::new(), &Context::background()).await;
    assert!(matches!(result, Err(JobError::SemaphoreClosed)));
  }

  #[test]
  fn test_oversized_capacity_is_rejected() {
    let result = CapacityLimiter::new(usize::MAX);
    assert!(matches!(result, Err(JobError::InvalidConfiguration(_))));
  }
}
