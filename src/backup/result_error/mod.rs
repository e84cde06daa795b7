use crate::backup::result_error::error::Stage;

pub mod error;
pub mod result;

pub trait WithMsg<S: Into<String>> {
    fn with_msg(self, msg: S) -> Self;
}

/// Tags an error with the pipeline stage it aborted.
pub trait WithStage {
    fn with_stage(self, stage: Stage) -> Self;
}
