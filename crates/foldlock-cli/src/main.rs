//! foldlock: lock every file in a folder behind a password and a one-time code
//!
//! Commands:
//!   setup                   - create the owner record and enrol an authenticator app
//!   uri                     - print the provisioning URI again
//!   reset --yes             - forget the owner (locked files stay locked)
//!   status <dir>            - count and list normal / locked files
//!   lock <dir>              - encrypt every normal file directly inside <dir>
//!   unlock <dir> [--code]   - decrypt every locked file directly inside <dir>
//!   config show             - display the active configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use zeroize::Zeroizing;

use foldlock_core::config::{expand_tilde, LockerConfig};
use foldlock_core::{FileState, JobKind, JobReport, LockerError, Progress};
use foldlock_crypto::KdfParams;
use foldlock_engine::{LockJob, LockOrchestrator};
use foldlock_secrets::{code_at, unix_now, ConfigurationStore, SecretStore};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "foldlock",
    version,
    about = "Folder locker",
    long_about = "foldlock: encrypt a folder's files in place; unlocking needs an authenticator code"
)]
struct Cli {
    /// Path to foldlock.toml configuration file
    #[arg(
        long,
        short = 'c',
        env = "FOLDLOCK_CONFIG",
        default_value = "~/.config/foldlock/foldlock.toml"
    )]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); overrides [log] level
    #[arg(long, env = "FOLDLOCK_LOG")]
    log: Option<String>,

    /// Log format (json, text); overrides [log] format
    #[arg(long, env = "FOLDLOCK_LOG_FORMAT")]
    log_format: Option<LogFormat>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Debug, ValueEnum, PartialEq)]
enum LogFormat {
    Json,
    Text,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Create the owner record and print the authenticator enrolment URI
    ///
    /// The password is prompted twice, or read from FOLDLOCK_PASSWORD.
    Setup,

    /// Print the provisioning URI of the configured owner
    Uri,

    /// Delete the owner record
    ///
    /// Locked files stay locked; running setup again with the same password
    /// makes them readable again.
    Reset {
        /// Confirm the reset
        #[arg(long)]
        yes: bool,
    },

    /// Show how many files in a folder are normal and locked
    Status {
        dir: PathBuf,
        /// Number of entries to list
        #[arg(long, default_value_t = 20)]
        limit: usize,
    },

    /// Encrypt every normal file directly inside a folder
    Lock { dir: PathBuf },

    /// Decrypt every locked file directly inside a folder
    Unlock {
        dir: PathBuf,
        /// Current authenticator code (prompted when omitted)
        #[arg(long, env = "FOLDLOCK_CODE")]
        code: Option<String>,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },

    /// Print the current one-time code
    #[command(hide = true)]
    Code,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);
    let config = LockerConfig::load(&config_path)?;

    let level = cli.log.clone().unwrap_or_else(|| config.log.level.clone());
    let format = match cli.log_format.clone() {
        Some(format) => format,
        None => LogFormat::from_str(&config.log.format, true)
            .map_err(|e| anyhow::anyhow!("[log] format {:?}: {e}", config.log.format))?,
    };
    init_logging(&level, &format);

    debug!(
        version = env!("CARGO_PKG_VERSION"),
        config = %config_path.display(),
        exists = config_path.exists(),
        "foldlock starting"
    );

    let store = ConfigurationStore::new(config.owner_file());

    match cli.command {
        Commands::Setup => cmd_setup(&config, &store),
        Commands::Uri => cmd_uri(&config, &store),
        Commands::Reset { yes } => cmd_reset(&store, yes),
        Commands::Status { dir, limit } => cmd_status(&dir, limit),
        Commands::Lock { dir } => cmd_lock(&config, store, dir).await,
        Commands::Unlock { dir, code } => cmd_unlock(&config, store, dir, code).await,
        Commands::Config {
            action: ConfigAction::Show,
        } => cmd_config_show(&config, &config_path),
        Commands::Code => cmd_code(&store),
    }
}

fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // stderr keeps stdout clean for URIs and codes
    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

// ── Prompts ───────────────────────────────────────────────────────────────────

/// Password and confirmation, from FOLDLOCK_PASSWORD or two prompts.
fn prompt_new_password() -> Result<(Zeroizing<String>, Zeroizing<String>)> {
    if let Ok(pw) = std::env::var("FOLDLOCK_PASSWORD") {
        if !pw.is_empty() {
            let pw = Zeroizing::new(pw);
            return Ok((pw.clone(), pw));
        }
    }
    let first = Zeroizing::new(
        rpassword::prompt_password("New password: ").context("password prompt")?,
    );
    let second = Zeroizing::new(
        rpassword::prompt_password("Confirm password: ").context("password prompt")?,
    );
    Ok((first, second))
}

fn prompt_code() -> Result<String> {
    rpassword::prompt_password("One-time code: ").context("code prompt")
}

// ── Progress bar helpers ──────────────────────────────────────────────────────

fn make_progress_bar(prefix: &str) -> Result<ProgressBar> {
    let pb = ProgressBar::new(0);
    pb.set_style(
        ProgressStyle::with_template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .context("progress bar template")?
            .progress_chars("=>-"),
    );
    pb.set_prefix(prefix.to_string());
    Ok(pb)
}

// ── `foldlock setup` / `uri` / `reset` / `code` ───────────────────────────────

fn cmd_setup(config: &LockerConfig, store: &ConfigurationStore) -> Result<()> {
    // Refuse before prompting
    if store.load().is_configured() {
        return Err(LockerError::AlreadyConfigured.into());
    }

    let (password, confirmation) = prompt_new_password()?;
    let outcome = foldlock_engine::setup(
        store,
        &password,
        &confirmation,
        &config.totp.account,
        &config.totp.issuer,
    )?;

    println!("Owner configured ({})", store.path().display());
    println!();
    println!("Add this account to your authenticator app:");
    println!("  secret: {}", outcome.secret.as_str());
    println!("  uri:    {}", outcome.provisioning_uri.as_str());
    println!();
    println!("Locked files open only with this password. It cannot be recovered.");
    Ok(())
}

fn cmd_uri(config: &LockerConfig, store: &ConfigurationStore) -> Result<()> {
    let uri = foldlock_engine::existing_provisioning(store, &config.totp.account, &config.totp.issuer)
        .ok_or(LockerError::NotConfigured)?;
    println!("{}", uri.as_str());
    Ok(())
}

fn cmd_reset(store: &ConfigurationStore, yes: bool) -> Result<()> {
    if !yes {
        anyhow::bail!(
            "reset deletes the owner record at {}; re-run with --yes to confirm",
            store.path().display()
        );
    }
    foldlock_engine::reset(store)?;
    println!("Owner record deleted. Run `foldlock setup` to configure again.");
    Ok(())
}

fn cmd_code(store: &ConfigurationStore) -> Result<()> {
    let owner = store.load();
    if !owner.is_configured() {
        return Err(LockerError::NotConfigured.into());
    }
    println!("{}", code_at(&owner.totp_secret, unix_now())?);
    Ok(())
}

// ── `foldlock status` ─────────────────────────────────────────────────────────

fn cmd_status(dir: &Path, limit: usize) -> Result<()> {
    let (normal, locked) = foldlock_engine::count_files(dir)?;
    println!("{}: {normal} normal, {locked} locked", dir.display());

    let preview = foldlock_engine::preview(dir, limit)?;
    for entry in &preview.entries {
        let tag = match entry.state {
            FileState::Locked => "locked",
            FileState::Unlocked => "      ",
        };
        println!("  [{tag}] {}", entry.name);
    }
    if preview.remaining > 0 {
        println!("  ... and {} more", preview.remaining);
    }
    Ok(())
}

// ── `foldlock lock` / `unlock` ────────────────────────────────────────────────

async fn cmd_lock(config: &LockerConfig, store: ConfigurationStore, dir: PathBuf) -> Result<()> {
    let orch = orchestrator(config, store)?;
    run_job(orch, LockJob::lock(dir)).await
}

async fn cmd_unlock(
    config: &LockerConfig,
    store: ConfigurationStore,
    dir: PathBuf,
    code: Option<String>,
) -> Result<()> {
    // No point asking for a code nobody can check
    if !store.load().is_configured() {
        return Err(LockerError::NotConfigured.into());
    }
    let code = match code {
        Some(code) => code,
        None => prompt_code()?,
    };
    let orch = orchestrator(config, store)?;
    run_job(orch, LockJob::unlock(dir, code)).await
}

fn orchestrator(
    config: &LockerConfig,
    store: ConfigurationStore,
) -> Result<LockOrchestrator<ConfigurationStore>> {
    let kdf = KdfParams::from(&config.kdf);
    kdf.check().context("invalid [kdf] settings")?;
    Ok(LockOrchestrator::new(store, kdf))
}

/// Run a job off the async runtime; Ctrl-C stops it after the current file.
async fn run_job(orch: LockOrchestrator<ConfigurationStore>, job: LockJob) -> Result<()> {
    let kind = job.kind;
    let dir = job.directory.clone();
    let cancel = job.cancel.clone();

    let pb = make_progress_bar(match kind {
        JobKind::Lock => "lock",
        JobKind::Unlock => "unlock",
    })?;
    let pb_clone = pb.clone();
    let job = job.with_progress(Box::new(move |p: &Progress| {
        pb_clone.set_length(p.total as u64);
        pb_clone.set_position(p.done as u64);
        pb_clone.set_message(p.file_name.clone());
    }));

    let mut handle = tokio::task::spawn_blocking(move || orch.run(job));
    let joined = tokio::select! {
        joined = &mut handle => joined,
        _ = tokio::signal::ctrl_c() => {
            pb.println("interrupt: stopping after the current file");
            cancel.request_cancel();
            handle.await
        }
    };

    let report = match joined.context("job task panicked")? {
        Ok(report) => report,
        Err(e) => {
            pb.abandon();
            // Partial progress is real; show where the folder stands now
            if !e.is_preflight() {
                if let Ok((normal, locked)) = foldlock_engine::count_files(&dir) {
                    eprintln!("{}: {normal} normal, {locked} locked", dir.display());
                }
            }
            return Err(e.into());
        }
    };

    let done_word = match kind {
        JobKind::Lock => "locked",
        JobKind::Unlock => "unlocked",
    };
    match report {
        JobReport::Done { processed, skipped } => {
            pb.finish_with_message("done");
            println!("{processed} files {done_word}, {skipped} already {done_word}");
        }
        JobReport::Cancelled {
            completed,
            remaining,
        } => {
            pb.abandon_with_message("cancelled");
            println!("cancelled: {completed} files {done_word}, {remaining} left as they were");
        }
    }
    info!(dir = %dir.display(), "job complete");
    Ok(())
}

// ── `foldlock config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &LockerConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!(
            "# Configuration: defaults (no file at {})",
            config_path.display()
        );
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
