use crate::config::LoggingConfig;
use std::fs::{self, OpenOptions};
use std::io;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::{SubscriberInitExt, TryInitError};
use tracing_subscriber::{EnvFilter, Layer};

const SECONDS_PER_DAY: u64 = 24 * 60 * 60;

#[derive(thiserror::Error, Debug)]
pub enum LoggingError {
    #[error("could not open log file: {0}")]
    Io(#[from] io::Error),
    #[error("could not install tracing subscriber: {0}")]
    Init(#[from] TryInitError),
}

#[derive(Clone, Copy, Debug, PartialEq)]
enum LogFormat {
    Pretty,
    Json,
}

/// `local` gets readable output, everything else is JSON. Only `local` and
/// `dev` log at debug level.
fn format_for_env(env: &str) -> (LogFormat, &'static str) {
    match env {
        "local" => (LogFormat::Pretty, "debug"),
        "dev" => (LogFormat::Json, "debug"),
        _ => (LogFormat::Json, "info"),
    }
}

/// Install the global subscriber writing to stdout and the configured log
/// file. The returned guard flushes Sentry events on drop.
pub fn init(env: &str, config: &LoggingConfig) -> Result<Option<sentry::ClientInitGuard>, LoggingError> {
    fs::create_dir_all(&config.dir)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(config.dir.join(&config.file_name))?;

    let (format, default_level) = format_for_env(env);
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout.and(Arc::new(file)))
        .with_ansi(false)
        .with_target(true);
    let fmt_layer = match format {
        LogFormat::Pretty => fmt_layer.pretty().boxed(),
        LogFormat::Json => fmt_layer.json().boxed(),
    };

    let sentry_guard = config.sentry_dsn.as_deref().map(|dsn| {
        sentry::init((
            dsn,
            sentry::ClientOptions {
                release: sentry::release_name!(),
                environment: Some(env.to_owned().into()),
                ..Default::default()
            },
        ))
    });
    let sentry_layer = sentry_guard
        .as_ref()
        .map(|_| sentry::integrations::tracing::layer());

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(sentry_layer)
        .with(filter)
        .try_init()?;

    Ok(sentry_guard)
}

/// Delete regular files in `dir` last modified more than `max_age_days` ago.
/// `active_file` is the log currently being written and is never removed.
/// Files that cannot be inspected or removed are logged and skipped.
/// Returns the number of removed files.
pub fn cleanup_old_logs(dir: &Path, active_file: &str, max_age_days: u64) -> io::Result<usize> {
    fs::create_dir_all(dir)?;
    tracing::info!(dir = %dir.display(), max_age_days, "starting log cleanup");

    let max_age = Duration::from_secs(max_age_days.saturating_mul(SECONDS_PER_DAY));
    let now = SystemTime::now();
    let mut removed = 0;

    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if entry.file_name() == active_file {
            continue;
        }
        let path = entry.path();

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                tracing::warn!(file = %path.display(), error = %e, "failed to read log file metadata");
                continue;
            }
        };
        if metadata.is_dir() {
            continue;
        }

        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        if !age.is_some_and(|age| age > max_age) {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(file = %path.display(), "removed old log file");
                removed += 1;
            }
            Err(e) => {
                tracing::error!(file = %path.display(), error = %e, "failed to remove log file");
            }
        }
    }

    tracing::info!(removed, dir = %dir.display(), "log cleanup finished");
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;

    fn touch(path: &Path, age_days: u64) {
        let file = File::create(path).unwrap();
        let modified = SystemTime::now() - Duration::from_secs(age_days * SECONDS_PER_DAY);
        file.set_modified(modified).unwrap();
    }

    #[test]
    fn test_format_for_env() {
        assert_eq!(format_for_env("local"), (LogFormat::Pretty, "debug"));
        assert_eq!(format_for_env("dev"), (LogFormat::Json, "debug"));
        assert_eq!(format_for_env("prod"), (LogFormat::Json, "info"));
    }

    #[test]
    fn test_cleanup_removes_only_stale_files() {
        let dir = tempfile::tempdir().unwrap();
        touch(&dir.path().join("old.log"), 10);
        touch(&dir.path().join("recent.log"), 2);
        touch(&dir.path().join("segmentation_import.log"), 0);

        let nested = dir.path().join("archive");
        fs::create_dir(&nested).unwrap();
        touch(&nested.join("nested_old.log"), 30);

        let removed = cleanup_old_logs(dir.path(), "segmentation_import.log", 7).unwrap();
        assert_eq!(removed, 1);

        assert!(!dir.path().join("old.log").exists());
        assert!(dir.path().join("recent.log").exists());
        assert!(dir.path().join("segmentation_import.log").exists());
        // Sub-directories are not descended into
        assert!(nested.join("nested_old.log").exists());
    }

    #[test]
    fn test_cleanup_keeps_active_log_file() {
        let dir = tempfile::tempdir().unwrap();
        let active = dir.path().join("segmentation_import.log");
        touch(&active, 10);
        touch(&dir.path().join("rotated.log"), 10);

        // Held open for append, as the subscriber does
        let mut writer = OpenOptions::new().append(true).open(&active).unwrap();

        let removed = cleanup_old_logs(dir.path(), "segmentation_import.log", 7).unwrap();
        assert_eq!(removed, 1);
        assert!(active.exists());
        assert!(!dir.path().join("rotated.log").exists());

        io::Write::write_all(&mut writer, b"still here\n").unwrap();
        assert_eq!(fs::read_to_string(&active).unwrap(), "still here\n");
    }

    #[test]
    fn test_cleanup_creates_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let logs = dir.path().join("log");

        assert_eq!(cleanup_old_logs(&logs, "segmentation_import.log", 7).unwrap(), 0);
        assert!(logs.is_dir());
    }
}
