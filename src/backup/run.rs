//! One backup execution for one client.
//!
//! `BackupRun` owns the staging directory and sequences dump, tree copy and compression.
//! The first failing stage aborts the run and leaves the staging directory on disk.

use crate::backup::client_config::ClientProfile;
use crate::backup::compress::compress;
use crate::backup::dump::dump;
use crate::backup::lock::RunLock;
use crate::backup::result_error::error::{Error, Stage};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithMsg, WithStage};
use crate::backup::tree::archive;
use chrono::{DateTime, Local};
use derive_more::Display;
use getset::Getters;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, info_span, warn};

static TIME_FORMAT: &str = "%Y-%m-%d-%Hh%Mm%Ss";

/// Wall-clock instant captured once when a run starts.
///
/// Every artifact name and every log line of the run uses this value.
#[derive(Clone, Debug, Display, PartialEq, Eq)]
#[display("{formatted}")]
pub struct RunTimestamp {
    captured: DateTime<Local>,
    formatted: Arc<str>,
}

impl RunTimestamp {
    pub fn now() -> Self {
        Self::from_date_time(Local::now())
    }

    pub fn from_date_time(captured: DateTime<Local>) -> Self {
        Self {
            captured,
            formatted: captured.format(TIME_FORMAT).to_string().into(),
        }
    }

    pub fn date_time(&self) -> &DateTime<Local> {
        &self.captured
    }

    pub fn as_str(&self) -> &str {
        &self.formatted
    }
}

#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ArtifactKind {
    #[display("database")]
    Database,
    #[display("projectTree")]
    ProjectTree,
}

#[derive(Debug, Getters)]
#[getset(get = "pub")]
pub struct BackupRun<'a> {
    profile: &'a ClientProfile,
    timestamp: RunTimestamp,
    staging_dir: PathBuf,
    collected_artifacts: BTreeMap<ArtifactKind, PathBuf>,
    final_archive_path: Option<PathBuf>,
}

impl<'a> BackupRun<'a> {
    pub fn new(profile: &'a ClientProfile, timestamp: RunTimestamp) -> Self {
        let staging_dir = profile
            .backup_dir()
            .root()
            .join(format!("{}_{}", profile.name(), timestamp));
        Self {
            profile,
            timestamp,
            staging_dir,
            collected_artifacts: BTreeMap::new(),
            final_archive_path: None,
        }
    }

    /// `{client}_{timestamp}`, shared by the staging dir, the dump and the archive.
    pub fn base_name(&self) -> String {
        format!("{}_{}", self.profile.name(), self.timestamp)
    }

    pub fn dump_path(&self) -> PathBuf {
        self.staging_dir.join(format!("{}.sql", self.base_name()))
    }

    pub fn tree_dir(&self) -> PathBuf {
        self.staging_dir.join(self.profile.name())
    }

    pub fn archive_path(&self) -> PathBuf {
        self.profile
            .backup_dir()
            .root()
            .join(format!("{}.zip", self.base_name()))
    }

    pub(crate) fn register(&mut self, kind: ArtifactKind, path: PathBuf) {
        tracing::debug!("Registered {kind} artifact {:?}", path);
        self.collected_artifacts.insert(kind, path);
    }

    pub(crate) fn set_final_archive_path(&mut self, path: PathBuf) {
        self.final_archive_path = Some(path);
    }

    /// Runs dump, tree copy and compression in order, stopping at the first failure.
    ///
    /// Returns the final archive path. Holds the client's run lock for the whole call.
    pub fn execute(mut self) -> Result<PathBuf> {
        let span = info_span!(
            "backup_run",
            client = %self.profile.name(),
            timestamp = %self.timestamp
        );
        let _entered = span.enter();

        let _lock = RunLock::acquire(self.profile.backup_dir().root(), self.profile.name())
            .inspect_err(|e| warn!("Run lock [ERROR]: {e}"))
            .with_stage(Stage::Staging)?;
        ensure_staging_dir(&self.staging_dir)?;

        let profile = self.profile;
        dump(profile, &mut self)?;
        archive(profile, &mut self)?;
        let archive_path = compress(profile, &mut self)?;

        info!("Backup [SUCCESS] {:?}", archive_path);
        Ok(archive_path)
    }
}

/// Creates the staging directory, or returns it untouched when it already exists.
pub fn ensure_staging_dir<P: AsRef<Path>>(path: P) -> Result<PathBuf> {
    let path = path.as_ref();
    if path.is_dir() {
        tracing::debug!("Reusing staging directory {:?}", path);
        return Ok(path.to_path_buf());
    }

    std::fs::create_dir(path)
        .map_err(Error::from)
        .with_msg(format!("Failed creating staging directory {:?}", path))
        .inspect_err(|e| warn!("{e}"))
        .with_stage(Stage::Staging)?;
    info!("Created staging directory {:?}", path);

    Ok(path.to_path_buf())
}
