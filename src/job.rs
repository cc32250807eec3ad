use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::str::FromStr;

use uuid::Uuid;

/// The type of future a job runs once it has been admitted.
pub type JobFuture = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// Unique identifier of an admitted job.
///
/// Backed by a random (v4) UUID and rendered as its hyphenated string form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct JobId(Uuid);

impl JobId {
  pub(crate) fn new() -> Self {
    Self(Uuid::new_v4())
  }
}

impl fmt::Display for JobId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "{}", self.0.hyphenated())
  }
}

impl FromStr for JobId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    Uuid::parse_str(s).map(Self)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use std::collections::HashSet;

  #[test]
  fn test_job_ids_are_unique() {
    let ids: HashSet<JobId> = (0..1000).map(|_| JobId::new()).collect();
    assert_eq!(ids.len(), 1000);
  }

  #[test]
  fn test_job_id_parses_its_display_form() {
    let id = JobId::new();
    let text = id.to_string();
    assert_eq!(text.len(), 36);
    assert_eq!(text.parse::<JobId>().unwrap(), id);
    assert!("not-a-job".parse::<JobId>().is_err());
  }
}
