pub mod config;
pub mod error;
pub mod types;

pub use error::{LockerError, LockerResult};
pub use types::{FileState, JobKind, JobReport, Progress, LOCKED_EXTENSION};
