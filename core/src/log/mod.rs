//! Logging bootstrap for the shelf.
//!
//! Events go to two sinks: a rolling plain-text file under `<data_dir>/logs` and a compact stderr
//! layer for the terminal. `COMIC_SHELF_LOG` (or `RUST_LOG`) narrows both with an `EnvFilter`
//! directive. [`init`] runs once per process; later calls return the installed handle.

use std::ffi::OsStr;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use std::time::SystemTime;

use anyhow::{Context, Result, anyhow};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, filter::LevelFilter, util::SubscriberInitExt};

const FILTER_ENV_VARS: [&str; 2] = ["COMIC_SHELF_LOG", "RUST_LOG"];

static LOG_HANDLE: OnceLock<LogHandle> = OnceLock::new();

pub use tracing_subscriber::filter::LevelFilter as LogLevel;

/// How often the file sink starts a new file.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum LogRolling {
    Hourly,
    Daily,
    /// One append-only file.
    Never,
}

impl LogRolling {
    fn rotation(self) -> Rotation {
        match self {
            LogRolling::Hourly => Rotation::HOURLY,
            LogRolling::Daily => Rotation::DAILY,
            LogRolling::Never => Rotation::NEVER,
        }
    }
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    pub directory: PathBuf,
    /// Log files are named `<file_prefix>.<date>.log`.
    pub file_prefix: String,
    /// Number of log files kept on startup; `None` keeps everything.
    pub retention: Option<usize>,
    pub file_level: LevelFilter,
    pub console_level: LevelFilter,
    /// Forward records emitted through the `log` facade.
    pub capture_log: bool,
    /// `EnvFilter` directive such as `shelf_core::store=debug`. Read from the environment when
    /// unset.
    pub filter: Option<String>,
    pub rolling: LogRolling,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            directory: crate::ShelfConfig::default().log_dir(),
            file_prefix: "shelf".to_string(),
            retention: Some(14),
            file_level: LevelFilter::DEBUG,
            console_level: LevelFilter::WARN,
            capture_log: true,
            filter: None,
            rolling: LogRolling::Daily,
        }
    }
}

impl LogConfig {
    /// Log into the `logs` directory of the configured data directory.
    pub fn for_shelf(config: &crate::ShelfConfig) -> Self {
        Self::default().with_directory(config.log_dir())
    }

    pub fn with_directory<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.directory = path.into();
        self
    }

    pub fn with_prefix<S: Into<String>>(mut self, prefix: S) -> Self {
        self.file_prefix = prefix.into();
        self
    }

    pub fn with_console_level(mut self, level: LevelFilter) -> Self {
        self.console_level = level;
        self
    }

    fn directive(&self) -> String {
        self.filter
            .clone()
            .or_else(|| FILTER_ENV_VARS.iter().find_map(|var| std::env::var(var).ok()))
            .filter(|directive| !directive.trim().is_empty())
            .unwrap_or_else(|| "debug".to_string())
    }
}

/// Keeps the non-blocking file writer alive for the life of the process.
#[derive(Debug)]
pub struct LogHandle {
    _guard: WorkerGuard,
    directory: PathBuf,
    file_prefix: String,
}

impl LogHandle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn file_prefix(&self) -> &str {
        &self.file_prefix
    }
}

/// Install the global subscriber. The first call wins; later calls ignore `config`.
pub fn init(config: LogConfig) -> Result<&'static LogHandle> {
    if let Some(handle) = LOG_HANDLE.get() {
        return Ok(handle);
    }
    let handle = install(config)?;
    Ok(LOG_HANDLE.get_or_init(|| handle))
}

fn install(config: LogConfig) -> Result<LogHandle> {
    if config.capture_log {
        let max = to_log_level(config.file_level.max(config.console_level));
        // Errors only when a `log` logger is already installed.
        let _ = tracing_log::LogTracer::builder().with_max_level(max).init();
    }

    fs::create_dir_all(&config.directory)
        .with_context(|| format!("creating log directory {}", config.directory.display()))?;
    if let Some(keep) = config.retention.filter(|keep| *keep > 0) {
        prune_old_logs(&config.directory, &config.file_prefix, keep)?;
    }

    let appender = tracing_appender::rolling::Builder::new()
        .rotation(config.rolling.rotation())
        .filename_prefix(&config.file_prefix)
        .filename_suffix("log")
        .build(&config.directory)
        .context("creating rolling log appender")?;
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter =
        EnvFilter::try_new(config.directive()).context("parsing log filter directive")?;

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer)
        .with_thread_names(true)
        .with_filter(config.file_level);
    let console_layer = tracing_subscriber::fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(config.console_level);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    Ok(LogHandle { _guard: guard, directory: config.directory, file_prefix: config.file_prefix })
}

fn to_log_level(level: LevelFilter) -> log::LevelFilter {
    match level {
        LevelFilter::OFF => log::LevelFilter::Off,
        LevelFilter::ERROR => log::LevelFilter::Error,
        LevelFilter::WARN => log::LevelFilter::Warn,
        LevelFilter::INFO => log::LevelFilter::Info,
        LevelFilter::DEBUG => log::LevelFilter::Debug,
        LevelFilter::TRACE => log::LevelFilter::Trace,
    }
}

/// Delete the oldest `<prefix>*` files in `dir` until at most `keep` remain.
fn prune_old_logs(dir: &Path, prefix: &str, keep: usize) -> Result<()> {
    let mut logs = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("listing {}", dir.display()))? {
        let Ok(entry) = entry else { continue };
        let path = entry.path();
        let has_prefix = path
            .file_name()
            .and_then(OsStr::to_str)
            .is_some_and(|name| name.starts_with(prefix));
        let Ok(meta) = entry.metadata() else { continue };
        if has_prefix && meta.is_file() {
            logs.push((meta.modified().unwrap_or(SystemTime::UNIX_EPOCH), path));
        }
    }

    // Newest first; everything past `keep` goes.
    logs.sort_by(|a, b| b.0.cmp(&a.0));
    for (_, path) in logs.into_iter().skip(keep) {
        if let Err(err) = fs::remove_file(&path) {
            eprintln!("could not remove old log {}: {err}", path.display());
        }
    }
    Ok(())
}
