//! Tracing setup.
//!
//! Stdout carries the MCP protocol, so logs never go there:
//!
//! - `LOG_LEVEL` unset or unrecognised: warnings and errors to stderr.
//! - `LOG_LEVEL` set: everything at that level to `LOG_FILE`, rotated by
//!   size (`LOG_FILE_SIZE` MiB, `LOG_FILE_COUNT` backups).
//!
//! `RUST_LOG`, when set, replaces the filter directive in either mode.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::Level;

// ─── Constants ───────────────────────────────────────────────────────────────

const DEFAULT_FILE_SIZE_MIB: u64 = 5;
const DEFAULT_FILE_COUNT: u32 = 2;
const MIB: u64 = 1024 * 1024;

// ─── Settings ────────────────────────────────────────────────────────────────

/// Logging configuration read from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    /// File logging level; `None` means stderr, warnings only.
    pub level: Option<Level>,
    pub file: PathBuf,
    pub max_bytes: u64,
    pub backups: u32,
}

impl LogSettings {
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    pub fn from_vars<I>(vars: I) -> Self
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut level = None;
        let mut file = None;
        let mut size = None;
        let mut count = None;

        for (key, value) in vars {
            match key.as_str() {
                "LOG_LEVEL" => level = parse_level(&value),
                "LOG_FILE" if !value.trim().is_empty() => file = Some(PathBuf::from(value.trim())),
                "LOG_FILE_SIZE" => size = value.trim().parse::<u64>().ok(),
                "LOG_FILE_COUNT" => count = value.trim().parse::<u32>().ok(),
                _ => {}
            }
        }

        Self {
            level,
            file: file.unwrap_or_else(default_log_path),
            max_bytes: size.unwrap_or(DEFAULT_FILE_SIZE_MIB) * MIB,
            backups: count.unwrap_or(DEFAULT_FILE_COUNT),
        }
    }

    /// Filter directive used when `RUST_LOG` is not set.
    fn directive(&self) -> String {
        match self.level {
            Some(level) => format!("ask_another={},warn", level.as_str().to_lowercase()),
            None => "warn".to_string(),
        }
    }
}

fn parse_level(value: &str) -> Option<Level> {
    match value.trim().to_ascii_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" | "warning" => Some(Level::WARN),
        "error" | "critical" => Some(Level::ERROR),
        _ => None,
    }
}

/// `<data dir>/ask-another/ask-another.log`, or `./ask-another.log` when no
/// data directory can be resolved.
fn default_log_path() -> PathBuf {
    dirs::data_dir()
        .map(|dir| dir.join("ask-another"))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("ask-another.log")
}

// ─── Init ────────────────────────────────────────────────────────────────────

/// Install the global subscriber. Safe to call more than once; later calls
/// are no-ops.
pub fn init(settings: &LogSettings) {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(settings.directive()));

    if settings.level.is_none() {
        let _ = fmt::fmt()
            .with_env_filter(filter)
            .with_writer(io::stderr)
            .with_ansi(false)
            .try_init();
        return;
    }

    match RotatingWriter::open(&settings.file, settings.max_bytes, settings.backups) {
        Ok(writer) => {
            let _ = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .with_thread_ids(false)
                .try_init();
        }
        Err(e) => {
            let _ = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(io::stderr)
                .with_ansi(false)
                .try_init();
            tracing::warn!(
                log_file = %settings.file.display(),
                error = %e,
                "cannot open log file, logging to stderr"
            );
        }
    }

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = %settings.file.display(),
        pid = std::process::id(),
        "=== ask-another starting ==="
    );
}

// ─── Rotating writer ─────────────────────────────────────────────────────────

/// Shift backups: `x.log` → `x.log.1` → … → `x.log.{keep}`.
///
/// The oldest file beyond `keep` is deleted; gaps in the chain are skipped.
/// With `keep == 0` the current file is simply removed.
fn rotate_log_file(base_path: &Path, keep: u32) {
    if keep == 0 {
        let _ = std::fs::remove_file(base_path);
        return;
    }

    let oldest = format!("{}.{keep}", base_path.display());
    let _ = std::fs::remove_file(&oldest);

    for i in (1..keep).rev() {
        let from = format!("{}.{i}", base_path.display());
        let to = format!("{}.{}", base_path.display(), i + 1);
        let _ = std::fs::rename(&from, &to);
    }

    if base_path.exists() {
        let to = format!("{}.1", base_path.display());
        let _ = std::fs::rename(base_path, &to);
    }
}

struct RotatingFile {
    path: PathBuf,
    file: File,
    written: u64,
    max_bytes: u64,
    backups: u32,
}

impl RotatingFile {
    fn rotate(&mut self) -> io::Result<()> {
        self.file.flush()?;
        rotate_log_file(&self.path, self.backups);
        self.file = open_append(&self.path)?;
        self.written = 0;
        Ok(())
    }
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// A log writer that flushes after every write and rotates the file once it
/// would grow past `max_bytes`.
#[derive(Clone)]
pub struct RotatingWriter {
    inner: Arc<Mutex<RotatingFile>>,
}

impl RotatingWriter {
    pub fn open(path: &Path, max_bytes: u64, backups: u32) -> io::Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = open_append(path)?;
        let written = file.metadata()?.len();
        Ok(Self {
            inner: Arc::new(Mutex::new(RotatingFile {
                path: path.to_path_buf(),
                file,
                written,
                max_bytes,
                backups,
            })),
        })
    }
}

impl Write for RotatingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut f = self
            .inner
            .lock()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))?;
        if f.max_bytes > 0 && f.written > 0 && f.written + buf.len() as u64 > f.max_bytes {
            f.rotate()?;
        }
        let n = f.file.write(buf)?;
        f.file.flush()?;
        f.written += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut f = self
            .inner
            .lock()
            .map_err(|e| io::Error::other(format!("lock poisoned: {e}")))?;
        f.file.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for RotatingWriter {
    type Writer = RotatingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
