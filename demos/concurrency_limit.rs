use job_orchestra::{Context, JobManager, ManagerConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::info;

#[tokio::main]
async fn main() {
  tracing_subscriber::fmt()
    .with_max_level(tracing::Level::INFO)
    .with_target(false)
    .init();
  info!("--- Concurrency Limit Example ---");

  let manager = JobManager::with_config(
    ManagerConfig::new(3)
      .with_name("limited")
      .with_default_timeout(Duration::from_secs(10)),
  )
  .expect("valid configuration");

  let concurrent = Arc::new(AtomicUsize::new(0));
  let max_seen = Arc::new(AtomicUsize::new(0));
  let start = Instant::now();

  for i in 0..10 {
    let concurrent = concurrent.clone();
    let max_seen = max_seen.clone();
    // `start` waits here whenever three jobs are already running.
    manager
      .start(&Context::background(), move |_ctx| async move {
        let now = concurrent.fetch_add(1, Ordering::SeqCst) + 1;
        max_seen.fetch_max(now, Ordering::SeqCst);
        info!("[{:>4}ms] job {:>2} started (concurrent: {})", start.elapsed().as_millis(), i, now);
        tokio::time::sleep(Duration::from_millis(200)).await;
        concurrent.fetch_sub(1, Ordering::SeqCst);
      })
      .await
      .expect("manager is accepting");
  }

  manager
    .shutdown(&Context::with_timeout(Duration::from_secs(5)))
    .await
    .expect("shutdown drained");

  info!(
    "Done in {}ms; max concurrency observed: {}",
    start.elapsed().as_millis(),
    max_seen.load(Ordering::SeqCst)
  );
}
