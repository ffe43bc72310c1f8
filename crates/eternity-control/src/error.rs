use eternity_core::{ExhaustedRangeError, PlanError, UploadRejected};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ControlError {
    #[error("controller request failed: {0}")]
    Transport(#[source] reqwest::Error),
    #[error("controller rejected request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("unexpected controller response: {0}")]
    Decode(String),
    #[error("invalid controller url: {0}")]
    Url(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl ControlError {
    pub fn rejected(status: u16, message: impl Into<String>) -> Self {
        Self::Rejected {
            status,
            message: message.into(),
        }
    }

    /// Network failures and controller-side refusals are expected per item;
    /// anything else means the command itself is broken and should stop.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Transport(_) | Self::Rejected { .. })
    }
}

impl From<reqwest::Error> for ControlError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            Self::Decode(e.to_string())
        } else {
            Self::Transport(e)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationStep {
    Stop,
    ListSaves,
    Download,
    Assign,
    Upload,
    Start,
}

impl fmt::Display for MigrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Stop => "stop",
            Self::ListSaves => "list saves",
            Self::Download => "download",
            Self::Assign => "assign",
            Self::Upload => "upload",
            Self::Start => "start",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("no save of {instance} is marked to load by default")]
    MissingDefaultSave { instance: String },
    #[error("{step} step failed: {source}")]
    Step {
        step: MigrationStep,
        #[source]
        source: ControlError,
    },
    #[error(transparent)]
    UploadRejected(#[from] UploadRejected),
}

impl MigrationError {
    pub fn step(step: MigrationStep) -> impl Fn(ControlError) -> Self {
        move |source| Self::Step { step, source }
    }

    /// Recoverable errors skip the instance; the rest abort the batch.
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::MissingDefaultSave { .. } | Self::UploadRejected(_) => true,
            Self::Step { source, .. } => source.is_recoverable(),
        }
    }

    pub fn failed_step(&self) -> Option<MigrationStep> {
        match self {
            Self::MissingDefaultSave { .. } => Some(MigrationStep::ListSaves),
            Self::Step { step, .. } => Some(*step),
            Self::UploadRejected(_) => Some(MigrationStep::Upload),
        }
    }
}

#[derive(Debug, Error)]
pub enum BenchmarkError {
    #[error(transparent)]
    Ids(#[from] ExhaustedRangeError),
    #[error(transparent)]
    Control(#[from] ControlError),
    #[error(transparent)]
    Plan(#[from] PlanError),
    #[error("unknown host id {0}")]
    UnknownHost(i64),
}
