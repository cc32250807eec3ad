//! A Tokio-based launcher that runs jobs concurrently up to a fixed capacity,
//! lets each running job be cancelled by id, and shuts down by cancelling every
//! job and waiting, within a caller-supplied deadline, for them to finish.

mod config;
mod context;
mod error;
mod job;
mod limiter;
mod manager;
mod registry;

pub use config::{ManagerConfig, DEFAULT_JOB_TIMEOUT};
pub use context::Context;
pub use error::{ContextError, JobError};
pub use job::{JobFuture, JobId};
pub use manager::{JobManager, ManagerState};
