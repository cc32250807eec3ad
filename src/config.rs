use std::fmt;
use std::time::Duration;

use tokio::runtime::Handle as TokioHandle;

/// Deadline given to jobs whose caller did not supply one.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(1);

/// Construction parameters for a [`JobManager`](crate::JobManager).
#[derive(Clone)]
pub struct ManagerConfig {
  pub(crate) name: String,
  pub(crate) capacity: usize,
  pub(crate) default_timeout: Duration,
  pub(crate) tokio_handle: Option<TokioHandle>,
}

impl fmt::Debug for ManagerConfig {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("ManagerConfig")
      .field("name", &self.name)
      .field("capacity", &self.capacity)
      .field("default_timeout", &self.default_timeout)
      .field("tokio_handle_is_some", &self.tokio_handle.is_some())
      .finish()
  }
}

impl Default for ManagerConfig {
  fn default() -> Self {
    Self::new(1)
  }
}

impl ManagerConfig {
  pub fn new(capacity: usize) -> Self {
    Self {
      name: "job_manager".to_string(),
      capacity,
      default_timeout: DEFAULT_JOB_TIMEOUT,
      tokio_handle: None,
    }
  }

  /// Name used in log output.
  pub fn with_name(mut self, name: impl Into<String>) -> Self {
    self.name = name.into();
    self
  }

  /// Sets the deadline applied to jobs started without one.
  pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
    self.default_timeout = timeout;
    self
  }

  /// Spawns jobs on `handle` instead of the runtime `start` is called from.
  pub fn with_tokio_handle(mut self, handle: TokioHandle) -> Self {
    self.tokio_handle = Some(handle);
    self
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  pub fn default_timeout(&self) -> Duration {
    self.default_timeout
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_default_config() {
    let config = ManagerConfig::default();
    assert_eq!(config.capacity(), 1);
    assert_eq!(config.default_timeout(), DEFAULT_JOB_TIMEOUT);
    assert_eq!(config.name, "job_manager");
    assert!(config.tokio_handle.is_none());
  }

  #[test]
  fn test_setters_override_defaults() {
    let config = ManagerConfig::default()
      .with_name("reports")
      .with_default_timeout(Duration::from_millis(250));
    assert_eq!(config.name, "reports");
    assert_eq!(config.default_timeout(), Duration::from_millis(250));
  }
}
