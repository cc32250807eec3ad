use job_orchestra::{Context, JobError, JobManager};
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::DEBUG)
    .with_target(false)
    .init();
  info!("--- Shutdown Timeout Example ---");

  let manager = JobManager::new(4).expect("valid capacity");
  let ctx = Context::with_timeout(Duration::from_secs(10));

  // Cooperative job: ends as soon as shutdown cancels it.
  manager
    .start(&ctx, |job_ctx| async move {
      job_ctx.cancelled().await;
      info!("Cooperative job saw cancellation.");
    })
    .await
    .expect("manager is accepting");

  // Stubborn job: ignores its context for two seconds.
  manager
    .start(&ctx, |_job_ctx| async move {
      tokio::time::sleep(Duration::from_secs(2)).await;
      info!("Stubborn job finally returned.");
    })
    .await
    .expect("manager is accepting");

  info!("Running: {}. Shutting down with a 500ms budget.", manager.running());
  match manager.shutdown(&Context::with_timeout(Duration::from_millis(500))).await {
    Err(JobError::DeadlineExceeded) => info!(
      "Shutdown gave up waiting; {} job(s) still finishing in the background ({:?}).",
      manager.running(),
      manager.state()
    ),
    other => info!("Shutdown returned {:?}", other),
  }

  match manager.start(&ctx, |_job_ctx| async {}).await {
    Err(JobError::ShuttingDown) => info!("Late start rejected as expected."),
    other => info!("Late start returned {:?}", other),
  }

  // A second call keeps waiting for the drain.
  manager
    .shutdown(&Context::with_timeout(Duration::from_secs(5)))
    .await
    .expect("stubborn job returns within the budget");
  info!("Final state: {:?}", manager.state());
}
