//! Analysis pipeline: submission, simulated progress, normalization and
//! history.

pub mod history;
pub mod normalizer;
pub mod orchestrator;
pub mod progress;

pub use history::{HistoryAggregator, ReportRecord};
pub use orchestrator::{AnalysisState, UploadOrchestrator};
pub use progress::{ProgressPhase, ProgressSimulator, ProgressSnapshot, ANALYSIS_STAGES};

use thiserror::Error;

use crate::client::ServiceError;

/// Problems caught locally, before anything is sent.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("No report file was provided")]
    MissingFile,

    #[error("Report file is empty: {0}")]
    EmptyFile(String),

    #[error("Unsupported file type: {0} (expected an image or PDF)")]
    UnsupportedFileType(String),

    #[error("An analysis is already in progress")]
    AlreadyInFlight,

    #[error("The current analysis has not finished")]
    NotTerminal,

    #[error("Missing required field: {0}")]
    MissingCredentials(&'static str),
}

#[derive(Error, Debug)]
pub enum AnalysisError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Transport(#[from] ServiceError),

    #[error("Analysis was cancelled")]
    Cancelled,

    #[error("Could not read report: {0}")]
    Io(#[from] std::io::Error),
}
