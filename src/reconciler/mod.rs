pub mod gate;
pub mod report;

pub use gate::{Decision, RecognitionEvent, Reconciler};
pub use report::{build_report, ReportRow, ReportWindow};

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ReconcilerError {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}
