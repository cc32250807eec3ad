use crate::config::ManagerConfig;
use crate::context::{deadline_after, Context};
use crate::error::JobError;
use crate::job::{JobFuture, JobId};
use crate::limiter::CapacityLimiter;
use crate::registry::JobRegistry;

use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;

use futures::FutureExt;
use tokio::runtime::Handle as TokioHandle;
use tokio::sync::OwnedSemaphorePermit;
use tokio_util::sync::CancellationToken;
use tokio_util::task::task_tracker::TaskTrackerToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, info_span, trace, warn, Instrument};

/// Lifecycle stage of a [`JobManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
  /// New jobs are admitted.
  Accepting,
  /// Shutdown has begun; running jobs have been cancelled and are finishing.
  Draining,
  /// Shutdown has begun and every job has finished.
  Terminated,
}

/// Launches jobs concurrently up to a fixed capacity and tracks them until they
/// finish.
pub struct JobManager {
  manager_name: Arc<String>,
  limiter: CapacityLimiter,
  registry: Arc<JobRegistry>,
  shutdown_token: CancellationToken,
  tracker: TaskTracker,
  default_timeout: Duration,
  tokio_handle: Option<TokioHandle>,
}

impl fmt::Debug for JobManager {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("JobManager")
      .field("name", &self.manager_name)
      .field("limiter", &self.limiter)
      .field("running", &self.registry.count())
      .field("state", &self.state())
      .field("default_timeout", &self.default_timeout)
      .finish_non_exhaustive()
  }
}

impl JobManager {
  /// Creates a manager admitting at most `capacity` concurrent jobs.
  ///
  /// # Errors
  /// Returns `JobError::InvalidConfiguration` if `capacity` is negative or too large.
  pub fn new<C>(capacity: C) -> Result<Arc<Self>, JobError>
  where
    C: TryInto<usize>,
  {
    let capacity = capacity
      .try_into()
      .map_err(|_| JobError::InvalidConfiguration("capacity must be a non-negative integer".to_string()))?;
    Self::with_config(ManagerConfig::new(capacity))
  }

  pub fn with_config(config: ManagerConfig) -> Result<Arc<Self>, JobError> {
    let limiter = CapacityLimiter::new(config.capacity)?;
    info!(
      manager = %config.name,
      capacity = config.capacity,
      default_timeout = ?config.default_timeout,
      "Job manager created."
    );

    Ok(Arc::new(Self {
      manager_name: Arc::new(config.name),
      limiter,
      registry: Arc::new(JobRegistry::new()),
      shutdown_token: CancellationToken::new(),
      tracker: TaskTracker::new(),
      default_timeout: config.default_timeout,
      tokio_handle: config.tokio_handle,
    }))
  }

  pub fn name(&self) -> &str {
    &self.manager_name
  }

  pub fn capacity(&self) -> usize {
    self.limiter.capacity()
  }

  /// Returns the number of capacity permits currently free.
  pub fn available(&self) -> usize {
    self.limiter.available()
  }

  /// Returns the number of running jobs. The value may be stale as soon as it is read.
  pub fn running(&self) -> usize {
    self.registry.count()
  }

  /// Returns the ids of the running jobs at the time of the call.
  pub fn running_jobs(&self) -> Vec<JobId> {
    self.registry.job_ids()
  }

  pub fn state(&self) -> ManagerState {
    if !self.shutdown_token.is_cancelled() {
      ManagerState::Accepting
    } else if self.tracker.is_empty() {
      ManagerState::Terminated
    } else {
      ManagerState::Draining
    }
  }

  /// Waits for a free slot and launches `job` on it.
  ///
  /// The job receives its own context, detached from `ctx`, whose deadline is the
  /// caller's deadline or, if `ctx` has none, the configured default timeout from
  /// now. The returned id can be passed to [`stop`](Self::stop). This call does not
  /// wait for the job to finish.
  ///
  /// # Errors
  /// Returns `JobError::ShuttingDown` once shutdown has begun, even if a slot is free.
  /// Returns `JobError::Cancelled` or `JobError::DeadlineExceeded` if `ctx` ends
  /// while waiting for a slot.
  pub async fn start<F, Fut>(&self, ctx: &Context, job: F) -> Result<JobId, JobError>
  where
    F: FnOnce(Context) -> Fut + Send + 'static,
    Fut: Future<Output = ()> + Send + 'static,
  {
    let permit = match self.limiter.acquire(&self.shutdown_token, ctx).await {
      Ok(permit) => permit,
      Err(err) => {
        debug!(manager = %self.manager_name, error = %err, "Start: job not admitted.");
        return Err(err);
      }
    };

    let job_id = JobId::new();
    let deadline = ctx
      .deadline()
      .unwrap_or_else(|| deadline_after(self.default_timeout));
    let job_token = CancellationToken::new();
    let job_ctx = Context::new(job_token.clone(), Some(deadline));

    // Taken before registering so a concurrent shutdown cannot finish draining
    // between registration and spawn.
    let tracker_token = self.tracker.token();
    if let Err(err) = self.registry.register(job_id, job_token.clone()) {
      warn!(manager = %self.manager_name, %job_id, "Start: shutdown began while admitting job; releasing permit.");
      return Err(err);
    }

    let guard = JobGuard {
      job_id,
      token: job_token,
      registry: self.registry.clone(),
      manager_name: self.manager_name.clone(),
      _permit: permit,
      _tracker_token: tracker_token,
    };

    let future: JobFuture = Box::pin(
      async move {
        let _guard = guard;
        match AssertUnwindSafe(async move { job(job_ctx).await }).catch_unwind().await {
          Ok(()) => trace!("Job returned."),
          Err(_panic_payload) => error!("Job panicked during execution."),
        }
      }
      .instrument(info_span!("managed_job", manager = %*self.manager_name, %job_id)),
    );

    let _join_handle = match &self.tokio_handle {
      Some(handle) => handle.spawn(future),
      None => tokio::spawn(future),
    };

    debug!(manager = %self.manager_name, %job_id, ?deadline, "Job started.");
    Ok(job_id)
  }

  /// Requests cancellation of a running job.
  ///
  /// The job is only signalled through its context; it stops when it observes it.
  ///
  /// # Errors
  /// Returns `JobError::NotFound` if no job with this id is running.
  pub fn stop(&self, job_id: &JobId) -> Result<(), JobError> {
    match self.registry.stop(job_id) {
      Ok(()) => {
        info!(manager = %self.manager_name, %job_id, "Stop requested for job.");
        Ok(())
      }
      Err(err) => {
        debug!(manager = %self.manager_name, %job_id, "Stop: job is not running.");
        Err(err)
      }
    }
  }

  /// Stops admitting jobs, cancels every running job and waits for them to finish.
  ///
  /// `ctx` is checked before the drain, so an already expired context returns
  /// immediately. When `ctx` ends first its error is returned and the remaining jobs
  /// finish in the background.
  pub async fn shutdown(&self, ctx: &Context) -> Result<(), JobError> {
    if self.shutdown_token.is_cancelled() {
      info!(manager = %self.manager_name, "Shutdown already initiated; waiting for running jobs to drain.");
    } else {
      info!(manager = %self.manager_name, "Initiating shutdown.");
      self.shutdown_token.cancel();
    }

    let signalled = self.registry.cancel_all();
    self.tracker.close();
    debug!(manager = %self.manager_name, jobs = signalled, "Waiting for running jobs to drain.");

    tokio::select! {
      biased;
      reason = ctx.done() => {
        warn!(
          manager = %self.manager_name,
          remaining = self.registry.count(),
          "Shutdown stopped waiting before all jobs finished: {}",
          reason
        );
        Err(reason.into())
      }
      _ = self.tracker.wait() => {
        info!(manager = %self.manager_name, "All jobs finished. Shutdown complete.");
        Ok(())
      }
    }
  }
}

impl Drop for JobManager {
  fn drop(&mut self) {
    if !self.shutdown_token.is_cancelled() {
      info!(
        manager = %*self.manager_name,
        "JobManager dropped without shutdown. Cancelling running jobs without waiting."
      );
      self.shutdown_token.cancel();
      self.registry.cancel_all();
      self.tracker.close();
    } else {
      trace!(manager = %*self.manager_name, "Drop: shutdown already initiated.");
    }
  }
}

/// Cleanup owned by each spawned job. Runs on every exit path of the job, in order:
/// cancel the job's context, deregister it, return its capacity permit, and release
/// its hold on the shutdown drain.
struct JobGuard {
  job_id: JobId,
  token: CancellationToken,
  registry: Arc<JobRegistry>,
  manager_name: Arc<String>,
  _permit: OwnedSemaphorePermit,
  _tracker_token: TaskTrackerToken,
}

impl Drop for JobGuard {
  fn drop(&mut self) {
    self.token.cancel();
    let removed = self.registry.deregister(&self.job_id);
    if !removed && !std::thread::panicking() {
      panic!(
        "job {} of manager {} finished without being registered",
        self.job_id, self.manager_name
      );
    }
    debug!(manager = %*self.manager_name, job_id = %self.job_id, "Job finished and deregistered.");
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use tokio::time::Instant;
  use crate::config::DEFAULT_JOB_TIMEOUT;

  #[tokio::test]
  async fn test_job_context_inherits_caller_deadline() {
    let manager = JobManager::new(1).unwrap();
    let caller_deadline = Instant::now() + Duration::from_secs(30);
    let (tx, rx) = tokio::sync::oneshot::channel();

    manager
      .start(&Context::with_deadline(caller_deadline), move |ctx| async move {
        let _ = tx.send(ctx.deadline());
      })
      .await
      .unwrap();

    assert_eq!(rx.await.unwrap(), Some(caller_deadline));
    manager.shutdown(&Context::with_timeout(Duration::from_secs(1))).await.unwrap();
  }

  #[tokio::test]
  async fn test_job_context_is_detached_from_caller() {
    let manager = JobManager::new(1).unwrap();
    let caller_token = CancellationToken::new();
    let (tx, rx) = tokio::sync::oneshot::channel();

    let before = Instant::now();
    manager
      .start(&Context::from_token(caller_token.clone()), move |ctx| async move {
        let _ = tx.send(ctx.clone());
        ctx.cancelled().await;
      })
      .await
      .unwrap();

    let job_ctx = rx.await.unwrap();
    caller_token.cancel();
    assert!(!job_ctx.is_done(), "cancelling the caller must not cancel the job");

    let deadline = job_ctx.deadline().expect("job context always has a deadline");
    assert!(deadline >= before + DEFAULT_JOB_TIMEOUT);
    manager.shutdown(&Context::with_timeout(Duration::from_secs(1))).await.unwrap();
  }

  #[tokio::test]
  async fn test_state_transitions() {
    let manager = JobManager::new(1).unwrap();
    assert_eq!(manager.state(), ManagerState::Accepting);

    let release = CancellationToken::new();
    let job_release = release.clone();
    manager
      .start(&Context::background(), move |_ctx| async move {
        // Ignores its own context until released.
        job_release.cancelled().await;
      })
      .await
      .unwrap();

    let result = manager.shutdown(&Context::with_timeout(Duration::from_millis(30))).await;
    assert_eq!(result, Err(JobError::DeadlineExceeded));
    assert_eq!(manager.state(), ManagerState::Draining);

    release.cancel();
    manager.shutdown(&Context::with_timeout(Duration::from_secs(1))).await.unwrap();
    assert_eq!(manager.state(), ManagerState::Terminated);
    assert_eq!(manager.running(), 0);
  }
}
