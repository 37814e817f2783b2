//! Lock/unlock job state machine.
//!
//! A job runs strictly sequentially on the calling thread. Cancellation is
//! honoured between files only, so every file is either fully in its old
//! state or fully in its new one.

use foldlock_core::{JobKind, JobReport, LockerError, LockerResult, Progress};
use foldlock_crypto::{lock_file, unlock_file, KdfParams, KeyRing};
use foldlock_secrets::{totp, OwnerConfig, SecretStore};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use tokio_util::sync::CancellationToken;

use crate::scan::{self, Entry};

/// Progress callback, invoked after each processed file
pub type ProgressFn = Box<dyn Fn(&Progress) + Send + Sync>;

/// Cooperative cancellation for a running job.
///
/// Cloning shares the flag; any clone may request cancellation from any
/// thread.
#[derive(Debug, Clone, Default)]
pub struct CancellationHandle {
    token: CancellationToken,
}

impl CancellationHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the job to stop before its next file. Idempotent.
    pub fn request_cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once cancellation has been requested.
    pub async fn cancelled(&self) {
        self.token.cancelled().await
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }
}

/// One lock or unlock request against a directory
pub struct LockJob {
    pub directory: PathBuf,
    pub kind: JobKind,
    /// Required for unlock, ignored for lock
    pub otp_code: Option<String>,
    pub progress: Option<ProgressFn>,
    pub cancel: CancellationHandle,
}

impl LockJob {
    pub fn lock(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
            kind: JobKind::Lock,
            otp_code: None,
            progress: None,
            cancel: CancellationHandle::new(),
        }
    }

    pub fn unlock(directory: impl Into<PathBuf>, otp_code: impl Into<String>) -> Self {
        Self {
            directory: directory.into(),
            kind: JobKind::Unlock,
            otp_code: Some(otp_code.into()),
            progress: None,
            cancel: CancellationHandle::new(),
        }
    }

    pub fn with_progress(mut self, progress: ProgressFn) -> Self {
        self.progress = Some(progress);
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationHandle) -> Self {
        self.cancel = cancel;
        self
    }
}

impl std::fmt::Debug for LockJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockJob")
            .field("directory", &self.directory)
            .field("kind", &self.kind)
            .field("otp_code", &self.otp_code.as_ref().map(|_| "[REDACTED]"))
            .field("progress", &self.progress.is_some())
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

/// Where a job is. `drive` advances one phase at a time until a terminal one.
#[derive(Debug)]
enum JobPhase {
    Start,
    ValidateOtp,
    Scanning,
    /// About to process `work[i]`
    ProcessingFile(usize),
    Done,
    /// Stopped before `work[i]`
    Cancelled(usize),
    Failed(LockerError),
}

/// Working state shared by the phases of one job
struct JobRun<'a> {
    job: &'a LockJob,
    owner: OwnerConfig,
    work: Vec<Entry>,
    skipped: usize,
    keys: Option<KeyRing>,
}

/// Drives lock and unlock jobs against an owner record.
pub struct LockOrchestrator<S: SecretStore> {
    store: S,
    kdf: KdfParams,
}

impl<S: SecretStore> LockOrchestrator<S> {
    /// `kdf` applies to newly locked files; unlocking reads each artifact's own.
    pub fn new(store: S, kdf: KdfParams) -> Self {
        Self { store, kdf }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Side-effect-free `(normal, locked)` count of `directory`.
    pub fn count_files(&self, directory: &Path) -> LockerResult<(u32, u32)> {
        scan::count_files(directory)
    }

    /// Run `job` to completion, cancellation or the first per-file failure.
    ///
    /// `NotConfigured` and `Unauthorized` are returned before the directory
    /// is even read. A per-file failure aborts the job; files processed
    /// before it stay in their new state.
    pub fn run(&self, job: LockJob) -> LockerResult<JobReport> {
        let dir = job.directory.as_path();
        tracing::info!(dir = %dir.display(), kind = ?job.kind, "job started");

        let result = self.drive(&job);
        match &result {
            Ok(report) => tracing::info!(dir = %dir.display(), ?report, "job finished"),
            Err(e) => tracing::warn!(dir = %dir.display(), "job failed: {e}"),
        }
        result
    }

    fn drive(&self, job: &LockJob) -> LockerResult<JobReport> {
        let mut run = JobRun {
            job,
            owner: self.store.load(),
            work: Vec::new(),
            skipped: 0,
            keys: None,
        };
        let mut phase = JobPhase::Start;
        loop {
            phase = match phase {
                JobPhase::Done => {
                    return Ok(JobReport::Done {
                        processed: run.work.len(),
                        skipped: run.skipped,
                    })
                }
                JobPhase::Cancelled(completed) => {
                    return Ok(JobReport::Cancelled {
                        completed,
                        remaining: run.work.len() - completed,
                    })
                }
                JobPhase::Failed(e) => return Err(e),
                active => self.step(&mut run, active),
            };
            tracing::debug!(?phase, "job phase");
        }
    }

    /// Advance a non-terminal phase by one step.
    fn step(&self, run: &mut JobRun<'_>, phase: JobPhase) -> JobPhase {
        match phase {
            JobPhase::Start if !run.owner.is_configured() => JobPhase::Failed(LockerError::NotConfigured),
            JobPhase::Start => match run.job.kind {
                JobKind::Unlock => JobPhase::ValidateOtp,
                JobKind::Lock => JobPhase::Scanning,
            },
            JobPhase::ValidateOtp => {
                let code = run.job.otp_code.as_deref().unwrap_or_default();
                if totp::validate(&run.owner.totp_secret, code, totp::unix_now()) {
                    JobPhase::Scanning
                } else {
                    JobPhase::Failed(LockerError::Unauthorized)
                }
            }
            JobPhase::Scanning => {
                let entries = match scan::scan(&run.job.directory) {
                    Ok(entries) => entries,
                    Err(e) => return JobPhase::Failed(e),
                };
                let target = run.job.kind.target_state();
                let (work, skipped): (Vec<Entry>, Vec<Entry>) =
                    entries.into_iter().partition(|entry| entry.state != target);
                tracing::debug!(eligible = work.len(), skipped = skipped.len(), "scan complete");
                run.work = work;
                run.skipped = skipped.len();
                JobPhase::ProcessingFile(0)
            }
            JobPhase::ProcessingFile(i) => {
                let Some(entry) = run.work.get(i) else {
                    return JobPhase::Done;
                };
                if run.job.cancel.is_cancelled() {
                    return JobPhase::Cancelled(i);
                }

                let keys = run
                    .keys
                    .get_or_insert_with(|| KeyRing::new(SecretString::from(run.owner.password.clone()), self.kdf));
                let outcome = match run.job.kind {
                    JobKind::Lock => lock_file(&entry.path, keys),
                    JobKind::Unlock => unlock_file(&entry.path, keys),
                };
                if let Err(e) = outcome {
                    return JobPhase::Failed(e);
                }

                if let Some(progress) = &run.job.progress {
                    progress(&Progress::new(i + 1, run.work.len(), entry.name.as_str()));
                }
                JobPhase::ProcessingFile(i + 1)
            }
            terminal => terminal,
        }
    }
}
