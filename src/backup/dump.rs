use crate::backup::client_config::ClientProfile;
use crate::backup::result_error::error::{Error, Stage};
use crate::backup::result_error::result::{chain_cleanup, Result};
use crate::backup::result_error::{WithMsg, WithStage};
use crate::backup::run::{ArtifactKind, BackupRun};
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tempfile::Builder;
use wait_timeout::ChildExt;

static PASSWORD_ENV: &str = "MYSQL_PWD";
static STDERR_TAIL_LEN: usize = 2048;

/// Dumps the client's database to `{staging}/{client}_{timestamp}.sql`.
///
/// The artifact is registered on the run only after the dump tool exited with status 0.
pub fn dump(profile: &ClientProfile, run: &mut BackupRun) -> Result<PathBuf> {
    let dest = run.dump_path();
    tracing::info!("SQL Backup [START] on {:?}", run.staging_dir());

    dump_to(profile, run.staging_dir(), &dest)
        .inspect_err(|e| {
            tracing::warn!(
                "SQL Backup [ERROR] for client {:?} in {:?}: {e}",
                profile.name(),
                run.staging_dir()
            )
        })
        .with_msg("Error occurred on SQL backup action")
        .with_stage(Stage::Dump)?;

    tracing::info!("SQL Backup [SUCCESS] {:?}", dest);
    run.register(ArtifactKind::Database, dest.clone());
    Ok(dest)
}

pub fn build_command(profile: &ClientProfile) -> Command {
    let config = profile.dump();
    let database = profile.database();

    let mut command = Command::new(config.program());
    command.args(config.args()).arg("-h").arg(database.host());
    if let Some(port) = database.port() {
        command.arg("-P").arg(port.to_string());
    }
    command
        .arg("-u")
        .arg(database.username())
        .arg(database.database())
        .env(PASSWORD_ENV, database.password().inner());

    command
}

/// Writes into a temp file beside `dest` and moves it into place after a clean exit, so a
/// failed or timed out dump never leaves a `.sql` file behind.
fn dump_to(profile: &ClientProfile, staging_dir: &Path, dest: &Path) -> Result<()> {
    let timeout = *profile.dump().timeout();
    let out = Builder::new()
        .prefix(".dump-")
        .suffix(".sql.tmp")
        .tempfile_in(staging_dir)?;
    let mut stderr = tempfile::tempfile()?;

    let mut command = build_command(profile);
    command
        .stdin(Stdio::null())
        .stdout(Stdio::from(out.as_file().try_clone()?))
        .stderr(Stdio::from(stderr.try_clone()?));

    tracing::debug!("Running {:?} with timeout {:?}", profile.dump().program(), timeout);
    let mut child = command
        .spawn()
        .map_err(Error::from)
        .with_msg(format!("Failed to launch {:?}", profile.dump().program()))?;

    let status = match child.wait_timeout(timeout)? {
        Some(status) => status,
        None => {
            let killed = child.kill().and_then(|_| child.wait());
            return Err(chain_cleanup(Error::DumpTimeout(timeout), killed));
        }
    };

    if !status.success() {
        let error = Error::DumpExit(status);
        return match stderr_tail(&mut stderr) {
            Some(tail) => Err(error.with_msg(format!("Dump tool stderr: {tail}"))),
            None => Err(error),
        };
    }

    out.persist(dest).map_err(|e| Error::from(e.error))?;
    Ok(())
}

fn stderr_tail(stderr: &mut File) -> Option<String> {
    let mut buf = String::new();
    stderr.seek(SeekFrom::Start(0)).ok()?;
    stderr.read_to_string(&mut buf).ok()?;
    let trimmed = buf.trim();
    if trimmed.is_empty() {
        return None;
    }

    let start = trimmed
        .char_indices()
        .rev()
        .nth(STDERR_TAIL_LEN - 1)
        .map(|(i, _)| i)
        .unwrap_or(0);
    Some(trimmed[start..].to_string())
}
