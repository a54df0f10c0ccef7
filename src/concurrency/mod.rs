//! Concurrency Module
//!
//! Run-wide coordination primitives shared by the planner, the pipeline and
//! the restore controller.
//!
//! ## Responsibilities
//! - Cancellation token observed by every blocking wait
//! - Running/Paused gate checked before every encoded row
//! - Write-preferring disk quota lock (many deliverers vs one quota pass)
//! - Bounded worker pools limiting table, region and I/O concurrency

mod cancel;
mod pause;
mod quota;
mod worker;

pub use cancel::CancelToken;
pub use pause::Pauser;
pub use quota::{DiskQuotaLock, QuotaReadGuard, QuotaWriteGuard};
pub use worker::{Worker, WorkerPool};
