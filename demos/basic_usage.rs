use job_orchestra::{Context, JobManager};
use std::time::Duration;
use tracing::info;

async fn work(id: usize, ctx: Context, duration_ms: u64) {
  info!("Job {} starting (will run for {}ms)", id, duration_ms);
  tokio::select! {
    reason = ctx.done() => info!("Job {} stopped early: {}", id, reason),
    _ = tokio::time::sleep(Duration::from_millis(duration_ms)) => info!("Job {} finished", id),
  }
}

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Basic Usage Example ---");

  let manager = JobManager::new(2).expect("valid capacity");

  for i in 0..3 {
    // Each job gets five seconds; without a deadline it would default to one second.
    let ctx = Context::with_timeout(Duration::from_secs(5));
    match manager.start(&ctx, move |job_ctx| work(i, job_ctx, 200 + i as u64 * 100)).await {
      Ok(job_id) => info!("Started job {} as {}", i, job_id),
      Err(e) => tracing::error!("Failed to start job {}: {}", i, e),
    }
    info!("Running jobs: {}", manager.running());
  }

  manager
    .shutdown(&Context::with_timeout(Duration::from_secs(2)))
    .await
    .expect("jobs observe their context, so shutdown drains in time");
  info!("Manager state after shutdown: {:?}", manager.state());
  info!("--- Basic Usage Example End ---");
}
