use crate::backup::result_error::error::{Error, Stage};
use crate::backup::result_error::{WithMsg, WithStage};

pub type Result<T> = std::result::Result<T, Error>;

impl<R, S: Into<String>> WithMsg<S> for Result<R> {
    fn with_msg(self, msg: S) -> Self {
        self.map_err(|e| e.with_msg(msg))
    }
}

impl<R> WithStage for Result<R> {
    fn with_stage(self, stage: Stage) -> Self {
        self.map_err(|e| e.with_stage(stage))
    }
}

/// Keeps `primary` and appends `cleanup` when the cleanup step failed as well.
pub fn chain_cleanup<T>(primary: Error, cleanup: std::io::Result<T>) -> Error {
    match cleanup {
        Ok(_) => primary,
        Err(e) => primary.chain(e.into()),
    }
}
