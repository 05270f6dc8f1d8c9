//! Incremental sync: mailbox filtering, planning, fetching and the
//! per-account driver.

pub mod archiver;
pub mod fetcher;
pub mod filter;
pub mod planner;

pub use archiver::{Archiver, FailurePolicy, Progress};
