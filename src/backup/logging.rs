use crate::backup::result_error::error::Error;
use crate::backup::result_error::result::Result;
use crate::backup::result_error::WithMsg;
use crate::backup::run::RunTimestamp;
use std::fs::OpenOptions;
use std::path::Path;
use std::sync::Mutex;
use tracing::Subscriber;
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::fmt::format::Writer;
use tracing_subscriber::fmt::time::FormatTime;
use tracing_subscriber::prelude::*;

/// Stamps every event with the run's timestamp instead of the current time.
#[derive(Clone, Debug)]
pub struct RunTimer {
    timestamp: RunTimestamp,
}

impl RunTimer {
    pub fn new(timestamp: RunTimestamp) -> Self {
        Self { timestamp }
    }
}

impl FormatTime for RunTimer {
    fn format_time(&self, w: &mut Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", self.timestamp)
    }
}

/// Logs to stderr (INFO and up) and appends to `log_file` (DEBUG and up).
pub fn build_subscriber(
    log_file: &Path,
    timestamp: &RunTimestamp,
) -> Result<impl Subscriber + Send + Sync> {
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .map_err(Error::from)
        .with_msg(format!("Opening log file {:?} failed", log_file))?;

    Ok(tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(RunTimer::new(timestamp.clone()))
                .with_writer(std::io::stderr)
                .with_filter(LevelFilter::INFO),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_timer(RunTimer::new(timestamp.clone()))
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .with_filter(LevelFilter::DEBUG),
        ))
}

/// Used before a client profile (and so its log file) is known.
pub fn stderr_subscriber(timestamp: &RunTimestamp) -> impl Subscriber + Send + Sync {
    tracing_subscriber::fmt()
        .with_timer(RunTimer::new(timestamp.clone()))
        .with_writer(std::io::stderr)
        .with_max_level(LevelFilter::INFO)
        .finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Local, TimeZone};
    use tempfile::TempDir;

    fn fixed_timestamp() -> RunTimestamp {
        RunTimestamp::from_date_time(Local.with_ymd_and_hms(2023, 11, 2, 8, 30, 0).unwrap())
    }

    #[test]
    fn test_run_timer_writes_fixed_timestamp() {
        let mut buf = String::new();
        RunTimer::new(fixed_timestamp())
            .format_time(&mut Writer::new(&mut buf))
            .unwrap();
        assert_eq!(buf, "2023-11-02-08h30m00s");
    }

    #[test]
    fn test_build_subscriber_appends_to_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("acme.log");
        std::fs::write(&log_file, "previous line\n").unwrap();

        let subscriber = build_subscriber(&log_file, &fixed_timestamp()).unwrap();
        tracing::subscriber::with_default(subscriber, || {
            tracing::info!("SQL Backup [START]");
            tracing::debug!("detail line");
            tracing::trace!("hidden line");
        });

        let content = std::fs::read_to_string(&log_file).unwrap();
        assert!(content.starts_with("previous line\n"));
        assert!(content.contains("2023-11-02-08h30m00s"));
        assert!(content.contains("SQL Backup [START]"));
        assert!(content.contains("detail line"));
        assert!(!content.contains("hidden line"));
        assert!(!content.contains('\u{1b}'));
    }

    #[test]
    fn test_build_subscriber_unwritable_log_file() {
        let temp_dir = TempDir::new().unwrap();
        let log_file = temp_dir.path().join("missing/acme.log");

        assert!(build_subscriber(&log_file, &fixed_timestamp()).is_err());
    }
}
