//! Tree download pipeline -- walk a remote directory, fetch every file with
//! bounded concurrency and retries, and write the results into an archive.
//!
//! Split into focused submodules:
//! - [`context`] - Pipeline collaborators, run parameters and per-run state
//! - [`orchestration`] - Top-level run entry point and directory recursion
//! - [`batching`] - Batch splitting and the settle-all batch scheduler
//! - [`fetch`] - Per-file fetch with timeout and retry/backoff
//! - [`recovery`] - Extra passes over files whose retries ran out
//! - [`finalization`] - Result assembly and summary logging

mod batching;
mod context;
mod fetch;
mod finalization;
mod orchestration;
mod recovery;


pub use batching::for_each_batched;
pub use context::{RunParams, SelectionParams, TreeDownloadPipeline};
