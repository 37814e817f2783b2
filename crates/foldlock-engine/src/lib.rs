//! foldlock-engine: turns a directory into a lock or unlock job
//!
//! ```text
//! Start ──▶ ValidateOtp (unlock only) ──▶ Scanning ──▶ ProcessingFile(i) ──▶ Done
//!                                                          │    │
//!                                                          │    └──▶ Cancelled
//!                                                          └──▶ Failed
//! ```
//!
//! Lock state is never recorded anywhere: every scan derives it from file
//! names, so an interrupted job leaves a directory that the next scan
//! describes correctly.

pub mod orchestrator;
pub mod scan;
pub mod setup;

pub use orchestrator::{CancellationHandle, LockJob, LockOrchestrator, ProgressFn};
pub use scan::{count_files, preview, scan, Entry, Preview};
pub use setup::{existing_provisioning, reset, setup, SetupOutcome};
