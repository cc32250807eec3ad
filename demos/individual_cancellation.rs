use job_orchestra::{Context, JobError, JobManager};
use std::time::Duration;
use tracing::{info, warn};

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Individual Cancellation Example ---");

  let manager = JobManager::new(2).expect("valid capacity");
  let ctx = Context::with_timeout(Duration::from_secs(30));

  let to_cancel = manager
    .start(&ctx, |job_ctx| async move {
      info!("Long job waiting for its context.");
      let reason = job_ctx.done().await;
      info!("Long job observed: {}", reason);
    })
    .await
    .expect("Failed to start job to be cancelled");

  let to_complete = manager
    .start(&ctx, |_job_ctx| async move {
      tokio::time::sleep(Duration::from_millis(300)).await;
      info!("Short job finished normally.");
    })
    .await
    .expect("Failed to start job to complete");

  info!("Started {} (to cancel) and {} (to complete).", to_cancel, to_complete);
  tokio::time::sleep(Duration::from_millis(100)).await;

  manager.stop(&to_cancel).expect("job is running");
  tokio::time::sleep(Duration::from_millis(400)).await;

  // Both jobs have finished and deregistered by now.
  for job_id in [to_cancel, to_complete] {
    match manager.stop(&job_id) {
      Err(JobError::NotFound(id)) => info!("Job {} is no longer running.", id),
      other => warn!("Unexpected stop outcome for {}: {:?}", job_id, other),
    }
  }

  manager
    .shutdown(&Context::with_timeout(Duration::from_secs(1)))
    .await
    .expect("nothing left to drain");
  info!("--- Individual Cancellation Example End ---");
}
