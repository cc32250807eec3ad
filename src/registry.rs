use crate::error::JobError;
use crate::job::JobId;

use std::collections::HashMap;

use parking_lot::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct RegistryState {
  running: HashMap<JobId, CancellationToken>,
  // Set by `cancel_all`; no registration succeeds afterwards.
  sealed: bool,
}

/// Map of running jobs to their cancellation handles.
///
/// Every mutation takes the write lock, so `cancel_all` never races a
/// registration: a job is either seen and cancelled by it, or refused.
#[derive(Debug, Default)]
pub(crate) struct JobRegistry {
  state: RwLock<RegistryState>,
}

impl JobRegistry {
  pub(crate) fn new() -> Self {
    Self::default()
  }

  pub(crate) fn register(&self, job_id: JobId, token: CancellationToken) -> Result<(), JobError> {
    let mut state = self.state.write();
    if state.sealed {
      return Err(JobError::ShuttingDown);
    }
    state.running.insert(job_id, token);
    Ok(())
  }

  /// Removes a job, returning whether it was registered.
  pub(crate) fn deregister(&self, job_id: &JobId) -> bool {
    self.state.write().running.remove(job_id).is_some()
  }

  /// Signals a single running job.
  pub(crate) fn stop(&self, job_id: &JobId) -> Result<(), JobError> {
    let state = self.state.write();
    match state.running.get(job_id) {
      Some(token) => {
        debug!(%job_id, "Signalling cancellation for running job.");
        token.cancel();
        Ok(())
      }
      None => Err(JobError::NotFound(*job_id)),
    }
  }

  /// Seals the registry and cancels every registered job. Returns how many
  /// jobs were signalled.
  pub(crate) fn cancel_all(&self) -> usize {
    let mut state = self.state.write();
    state.sealed = true;
    for (job_id, token) in state.running.iter() {
      debug!(%job_id, "Cancelling running job.");
      token.cancel();
    }
    let signalled = state.running.len();
    if signalled > 0 {
      info!(jobs = signalled, "Cancelled all running jobs.");
    }
    signalled
  }

  pub(crate) fn count(&self) -> usize {
    self.state.read().running.len()
  }

  pub(crate) fn job_ids(&self) -> Vec<JobId> {
    self.state.read().running.keys().copied().collect()
  }

  #[cfg(test)]
  pub(crate) fn is_sealed(&self) -> bool {
    self.state.read().sealed
  }
}
