//! Zip packaging of the staging directory.
//!
//! Zip stores entry times as DOS date/time, which cannot go below 1980-01-01. Every staged
//! file therefore gets its access and modification times reset to that instant before it is
//! appended, and every entry header carries the same value.

use crate::backup::client_config::ClientProfile;
use crate::backup::result_error::error::{Error, Stage};
use crate::backup::result_error::result::{chain_cleanup, Result};
use crate::backup::result_error::{WithMsg, WithStage};
use crate::backup::run::BackupRun;
use chrono::{Local, NaiveDate, TimeZone};
use filetime::FileTime;
use itertools::Itertools;
use std::fs::File;
use std::io::{BufWriter, ErrorKind, IntoInnerError};
use std::path::{Component, Path, PathBuf};
use walkdir::WalkDir;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter, ZIP64_BYTES_THR};

/// 1980-01-01T00:00:00 in local time.
pub fn reference_instant() -> FileTime {
    let naive = NaiveDate::from_ymd_opt(1980, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .unwrap_or_default();
    let seconds = Local
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.timestamp())
        .unwrap_or_else(|| naive.and_utc().timestamp());
    FileTime::from_unix_time(seconds, 0)
}

/// Packs the staging directory into `{backup_root}/{client}_{timestamp}.zip` and removes it.
///
/// Refuses to run when no artifact was collected. The archive is written under a `.tmp`
/// name and only renamed once complete; on failure the staging directory is left alone.
pub fn compress(profile: &ClientProfile, run: &mut BackupRun) -> Result<PathBuf> {
    if run.collected_artifacts().is_empty() {
        tracing::warn!(
            "ZIP Compression [ERROR] for client {:?}: nothing to compress in {:?}",
            profile.name(),
            run.staging_dir()
        );
        return Err(Error::NothingToCompress).with_stage(Stage::Compression);
    }

    tracing::info!("ZIP Compression [START]");
    let archive_path = run.archive_path();
    let tmp_path = profile
        .backup_dir()
        .root()
        .join(format!("{}.zip.tmp", run.base_name()));

    write_archive(run.staging_dir(), &tmp_path, reference_instant())
        .and_then(|count| {
            std::fs::rename(&tmp_path, &archive_path)
                .map(|_| count)
                .map_err(Error::from)
        })
        .map_err(|e| chain_cleanup(e, remove_if_exists(&tmp_path)))
        .inspect(|count| tracing::info!("ZIP Compression [SUCCESS] {count} entries"))
        .inspect_err(|e| {
            tracing::warn!(
                "ZIP Compression [ERROR] for client {:?} in {:?}: {e}",
                profile.name(),
                run.staging_dir()
            )
        })
        .with_msg("Compression task failed")
        .with_stage(Stage::Compression)?;

    std::fs::remove_dir_all(run.staging_dir())
        .map_err(Error::from)
        .with_msg(format!("Removing staging directory {:?} failed", run.staging_dir()))
        .with_stage(Stage::Compression)?;
    tracing::debug!("Removed staging directory {:?}", run.staging_dir());

    run.set_final_archive_path(archive_path.clone());
    Ok(archive_path)
}

/// Writes every non-directory entry under `src_dir` into a deflate zip at `out`.
///
/// Entry names are paths relative to `src_dir` joined with `/`. Symlinks are stored as zip
/// symlink entries pointing at their original target. Returns the number of entries.
pub fn write_archive<P1: AsRef<Path>, P2: AsRef<Path>>(
    src_dir: P1,
    out: P2,
    reference: FileTime,
) -> Result<usize> {
    let src_dir = src_dir.as_ref();
    let mut writer = ZipWriter::new(BufWriter::new(File::create(out.as_ref())?));
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(zip::DateTime::default());

    let mut entry_count = 0usize;
    for entry in WalkDir::new(src_dir).follow_links(false).sort_by_file_name() {
        let entry = entry?;
        let file_type = entry.file_type();
        if file_type.is_dir() {
            continue;
        }

        let path = entry.path();
        let name = entry_name(path.strip_prefix(src_dir)?)?;
        normalize_times(path, file_type.is_symlink(), reference)
            .map_err(Error::from)
            .with_msg(format!("Resetting timestamps of {:?} failed", path))?;

        if file_type.is_symlink() {
            let target = std::fs::read_link(path)?;
            let target = target
                .to_str()
                .ok_or_else(|| Error::NonUtf8Path(target.clone()))?;
            writer.add_symlink(name.clone(), target, options)?;
        } else {
            let large_file = entry.metadata()?.len() >= ZIP64_BYTES_THR;
            writer.start_file(name.clone(), options.large_file(large_file))?;
            let mut file = File::open(path)
                .map_err(Error::from)
                .with_msg(format!("Opening {:?} failed", path))?;
            std::io::copy(&mut file, &mut writer)?;
        }
        tracing::trace!("Added {:?} as {}", path, name);
        entry_count += 1;
    }

    writer
        .finish()?
        .into_inner()
        .map_err(IntoInnerError::into_error)?
        .sync_all()?;

    Ok(entry_count)
}

fn entry_name(relative: &Path) -> Result<String> {
    let parts = relative
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_str()),
            _ => None,
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| Error::NonUtf8Path(relative.to_path_buf()))?;
    Ok(parts.iter().join("/"))
}

fn normalize_times(path: &Path, is_symlink: bool, reference: FileTime) -> std::io::Result<()> {
    if is_symlink {
        filetime::set_symlink_file_times(path, reference, reference)
    } else {
        filetime::set_file_times(path, reference, reference)
    }
}

fn remove_if_exists(path: &Path) -> std::io::Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        res => res,
    }
}
