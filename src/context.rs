use crate::error::ContextError;

use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;

// Roughly 30 years; stands in for timeouts too large to add to `Instant::now()`.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// `now + timeout`, saturating to a far-future instant instead of overflowing.
pub(crate) fn deadline_after(timeout: Duration) -> Instant {
  let now = Instant::now();
  now
    .checked_add(timeout)
    .unwrap_or_else(|| now + FAR_FUTURE)
}

/// A cancellation signal with an optional deadline.
///
/// Callers pass a `Context` to [`JobManager::start`](crate::JobManager::start) and
/// [`JobManager::shutdown`](crate::JobManager::shutdown) to bound how long those calls
/// may wait. Jobs receive their own detached `Context` which they are expected to
/// observe cooperatively.
#[derive(Debug, Clone)]
pub struct Context {
  token: CancellationToken,
  deadline: Option<Instant>,
}

impl Default for Context {
  fn default() -> Self {
    Self::background()
  }
}

impl Context {
  /// A context that is never cancelled and has no deadline.
  pub fn background() -> Self {
    Self {
      token: CancellationToken::new(),
      deadline: None,
    }
  }

  /// A context that ends at `deadline`.
  pub fn with_deadline(deadline: Instant) -> Self {
    Self {
      token: CancellationToken::new(),
      deadline: Some(deadline),
    }
  }

  /// A context that ends `timeout` from now.
  pub fn with_timeout(timeout: Duration) -> Self {
    Self::with_deadline(deadline_after(timeout))
  }

  /// A context that ends when `token` is cancelled.
  pub fn from_token(token: CancellationToken) -> Self {
    Self { token, deadline: None }
  }

  pub(crate) fn new(token: CancellationToken, deadline: Option<Instant>) -> Self {
    Self { token, deadline }
  }

  /// Returns a copy of this context that also ends at `deadline`, keeping the
  /// earlier of the two deadlines.
  pub fn and_deadline(mut self, deadline: Instant) -> Self {
    self.deadline = Some(match self.deadline {
      Some(existing) => existing.min(deadline),
      None => deadline,
    });
    self
  }

  pub fn deadline(&self) -> Option<Instant> {
    self.deadline
  }

  /// The token backing this context. Cancelling it cancels the context.
  pub fn cancellation_token(&self) -> &CancellationToken {
    &self.token
  }

  /// Returns why the context is done, or `None` while it is still live.
  ///
  /// Explicit cancellation is reported over an elapsed deadline when both hold.
  pub fn err(&self) -> Option<ContextError> {
    if self.token.is_cancelled() {
      return Some(ContextError::Cancelled);
    }
    match self.deadline {
      Some(deadline) if Instant::now() >= deadline => Some(ContextError::DeadlineExceeded),
      _ => None,
    }
  }

  pub fn is_done(&self) -> bool {
    self.err().is_some()
  }

  /// Waits until the context is cancelled or its deadline passes.
  pub async fn done(&self) -> ContextError {
    // A timer registered for an instant already reached still waits for the next tick.
    if let Some(reason) = self.err() {
      return reason;
    }
    match self.deadline {
      Some(deadline) => {
        tokio::select! {
          biased;
          _ = self.token.cancelled() => ContextError::Cancelled,
          _ = sleep_until(deadline) => ContextError::DeadlineExceeded,
        }
      }
      None => {
        self.token.cancelled().await;
        ContextError::Cancelled
      }
    }
  }

  /// Alias for [`done`](Self::done) that discards the reason.
  pub async fn cancelled(&self) {
    self.done().await;
  }
}
