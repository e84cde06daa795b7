use crate::backup::client_config::ClientProfile;
use crate::backup::result_error::error::{Error, Stage};
use crate::backup::result_error::result::Result;
use crate::backup::result_error::{WithMsg, WithStage};
use crate::backup::run::{ArtifactKind, BackupRun};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Copies the client's working directory to `{staging}/{client}/`.
pub fn archive(profile: &ClientProfile, run: &mut BackupRun) -> Result<PathBuf> {
    let dest = run.tree_dir();
    tracing::info!("Project backup [START] on {:?}", dest);

    let copied = copy_tree(profile.working_dir(), &dest)
        .inspect_err(|e| {
            tracing::warn!(
                "Project backup [ERROR] for client {:?} in {:?}: {e}",
                profile.name(),
                run.staging_dir()
            )
        })
        .with_msg("Error occurred on project backup action")
        .with_stage(Stage::Archive)?;

    tracing::info!("Project backup [SUCCESS] in {:?}", copied);
    run.register(ArtifactKind::ProjectTree, copied.clone());
    Ok(copied)
}

/// Recursively copies `src` to `dst`, recreating symlinks instead of following them.
///
/// `dst` must not exist yet. Returns the directory that was written.
pub fn copy_tree<P1: AsRef<Path>, P2: AsRef<Path>>(src: P1, dst: P2) -> Result<PathBuf> {
    let src = src.as_ref();
    let dst = dst.as_ref();
    if !src.is_dir() {
        return Err(Error::from(std::io::Error::new(
            ErrorKind::NotFound,
            format!("working directory {:?} does not exist or is not a directory", src),
        )));
    }
    if dst.symlink_metadata().is_ok() {
        return Err(Error::from(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("destination {:?} already exists", dst),
        )));
    }

    let mut file_count = 0usize;
    for entry in WalkDir::new(src).follow_links(false) {
        let entry = entry?;
        let relative = entry.path().strip_prefix(src)?;
        let target = if relative.as_os_str().is_empty() {
            dst.to_path_buf()
        } else {
            dst.join(relative)
        };
        let file_type = entry.file_type();

        if file_type.is_dir() {
            fs::create_dir(&target)
                .map_err(Error::from)
                .with_msg(format!("Creating directory {:?} failed", target))?;
        } else if file_type.is_symlink() {
            copy_symlink(entry.path(), &target)
                .map_err(Error::from)
                .with_msg(format!("Copying symlink {:?} failed", entry.path()))?;
            file_count += 1;
        } else if file_type.is_file() {
            fs::copy(entry.path(), &target)
                .map_err(Error::from)
                .with_msg(format!("Copying {:?} failed", entry.path()))?;
            file_count += 1;
        } else {
            return Err(Error::UnsupportedFileType(entry.path().to_path_buf()));
        }
        tracing::trace!("Copied {:?} -> {:?}", entry.path(), target);
    }
    tracing::debug!("Copied {} files from {:?}", file_count, src);

    Ok(dst.to_path_buf())
}

#[cfg(unix)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(src)?, dst)
}

#[cfg(windows)]
fn copy_symlink(src: &Path, dst: &Path) -> std::io::Result<()> {
    let link_target = fs::read_link(src)?;
    if fs::metadata(src).map(|m| m.is_dir()).unwrap_or(false) {
        std::os::windows::fs::symlink_dir(link_target, dst)
    } else {
        std::os::windows::fs::symlink_file(link_target, dst)
    }
}
