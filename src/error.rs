use crate::job::JobId;

use thiserror::Error;

/// Errors returned by the `job_orchestra` manager.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum JobError {
  #[error("Invalid manager configuration: {0}")]
  InvalidConfiguration(String),

  #[error("Manager is shutting down or already shut down, cannot accept new jobs")]
  ShuttingDown,

  #[error("Context deadline exceeded")]
  DeadlineExceeded,

  #[error("Context cancelled")]
  Cancelled,

  #[error("Manager's capacity semaphore was closed unexpectedly")]
  SemaphoreClosed,

  #[error("Job {0} is not running")]
  NotFound(JobId),
}

/// The reason a [`Context`](crate::Context) is done.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextError {
  #[error("context cancelled")]
  Cancelled,

  #[error("context deadline exceeded")]
  DeadlineExceeded,
}

impl From<ContextError> for JobError {
  fn from(err: ContextError) -> Self {
    match err {
      ContextError::Cancelled => JobError::Cancelled,
      ContextError::DeadlineExceeded => JobError::DeadlineExceeded,
    }
  }
}
