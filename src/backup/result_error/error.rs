use crate::backup::result_error::{WithMsg, WithStage};
use derive_more::Display;
use itertools::Itertools;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::time::Duration;
use thiserror::Error;

/// The pipeline stage a failure belongs to.
#[derive(Clone, Copy, Debug, Display, PartialEq, Eq, Hash)]
pub enum Stage {
    #[display("ConfigurationError")]
    Configuration,
    #[display("StagingError")]
    Staging,
    #[display("DumpError")]
    Dump,
    #[display("ArchiveError")]
    Archive,
    #[display("CompressionError")]
    Compression,
}

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    ValidationError(#[from] validator::ValidationErrors),
    #[error(transparent)]
    SerdeYml(#[from] serde_yml::Error),
    #[error(transparent)]
    WalkDir(#[from] walkdir::Error),
    #[error(transparent)]
    Zip(#[from] zip::result::ZipError),
    #[error(transparent)]
    Dotenv(#[from] dotenvy::Error),
    #[error(transparent)]
    StripPrefix(#[from] std::path::StripPrefixError),
    #[error("client {0:?} is not present in the configuration")]
    UnknownClient(String),
    #[error("dump command failed with {0}")]
    DumpExit(ExitStatus),
    #[error("dump command did not finish within {0:?}")]
    DumpTimeout(Duration),
    #[error("nothing to compress")]
    NothingToCompress,
    #[error("another run holds lock file {0:?}")]
    RunLocked(PathBuf),
    #[error("path {0:?} is not valid UTF-8 and cannot be stored in the archive")]
    NonUtf8Path(PathBuf),
    #[error("unsupported file type at {0:?}")]
    UnsupportedFileType(PathBuf),
    #[error("{}:\n{}", msg, indent::indent_all_with("  ", error.to_string()))]
    WithMsg { msg: String, error: Box<Error> },
    #[error("{}:\n{}", stage, indent::indent_all_with("  ", error.to_string()))]
    Stage { stage: Stage, error: Box<Error> },
    #[error("{}", itertools::join(.0, "\n\n"))]
    LotsOfError(Vec<Error>),
}

impl<S: Into<String>> WithMsg<S> for Error {
    fn with_msg(self, msg: S) -> Self {
        Self::WithMsg {
            msg: msg.into(),
            error: Box::new(self),
        }
    }
}

impl WithStage for Error {
    fn with_stage(self, stage: Stage) -> Self {
        Self::Stage {
            stage,
            error: Box::new(self),
        }
    }
}

impl Error {
    pub fn into_iter(self) -> Box<dyn Iterator<Item = Error>> {
        match self {
            Error::LotsOfError(v) => Box::new(v.into_iter().flat_map(|e| e.into_iter())),
            e => Box::new(std::iter::once(e)),
        }
    }

    pub fn chain(self, other: Error) -> Error {
        Error::LotsOfError(self.into_iter().chain(other.into_iter()).collect_vec())
    }

    /// Outermost stage attached to this error, looking through message wrappers.
    pub fn stage(&self) -> Option<Stage> {
        match self {
            Error::Stage { stage, .. } => Some(*stage),
            Error::WithMsg { error, .. } => error.stage(),
            Error::LotsOfError(errors) => errors.iter().find_map(Error::stage),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn not_found() -> Error {
        Error::from(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "file not found",
        ))
    }

    #[test]
    fn test_error_from_io_error() {
        match not_found() {
            Error::Io(_) => (),
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_error_with_msg() {
        match not_found().with_msg("Custom message") {
            Error::WithMsg { msg, .. } => assert_eq!(msg, "Custom message"),
            _ => panic!("Expected WithMsg error"),
        }
    }

    #[test]
    fn test_error_stage_looks_through_msg() {
        let error = not_found()
            .with_stage(Stage::Archive)
            .with_msg("Project backup failed");
        assert_eq!(error.stage(), Some(Stage::Archive));
        assert_eq!(not_found().stage(), None);
    }

    #[test]
    fn test_error_outermost_stage_wins() {
        let error = Error::NothingToCompress
            .with_stage(Stage::Compression)
            .with_stage(Stage::Staging);
        assert_eq!(error.stage(), Some(Stage::Staging));
    }

    #[test]
    fn test_error_chain() {
        let chained = not_found().chain(Error::NothingToCompress);
        match chained {
            Error::LotsOfError(errors) => assert_eq!(errors.len(), 2),
            _ => panic!("Expected LotsOfError"),
        }
    }

    #[test]
    fn test_error_chain_flattens() {
        let chained = not_found()
            .chain(Error::NothingToCompress)
            .chain(Error::UnknownClient("acme".into()));
        assert_eq!(chained.into_iter().count(), 3);
    }

    #[test]
    fn test_error_stage_display() {
        let error_str = Error::NothingToCompress
            .with_stage(Stage::Compression)
            .to_string();

        assert!(error_str.starts_with("CompressionError:"));
        assert!(error_str.contains("  nothing to compress"));
    }

    #[test]
    fn test_error_dump_timeout_display() {
        let error_str = Error::DumpTimeout(Duration::from_secs(90)).to_string();
        assert!(error_str.contains("90s"));
    }
}
