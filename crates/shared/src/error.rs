use std::fmt;

use chrono::{NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{domain::Format, protocol::WorkflowState};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Local validation, raised before anything is committed; never retried.
    Precondition,
    /// Raised by the control plane after bounded retries.
    Remote,
    Aborted,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Precondition => f.write_str("precondition"),
            Self::Remote => f.write_str("remote"),
            Self::Aborted => f.write_str("aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "snake_case")]
pub enum WorkflowError {
    #[error("no QFC or FR film available for import")]
    NoImportAvailable,
    #[error("cannot infer scope/flat format from '{label}'")]
    UnrecognizedFormat { label: String },
    #[error("no block tagged for {format} projection")]
    NoMatchingBlock { format: Format },
    #[error("film name must not be empty")]
    InvalidFilmName,
    #[error("minute offset selection {value} is not one of 0, 1, 2")]
    InvalidOffsetSelection { value: u8 },
    #[error("scheduling week must start on a Friday, {date} is a {weekday}")]
    InvalidWeekStart { date: NaiveDate, weekday: Weekday },
    #[error("authentication failed after {attempts} attempt(s): {message}")]
    AuthenticationError { attempts: u32, message: String },
    #[error("listing {resource} failed after {attempts} attempt(s): {message}")]
    DiscoveryFailed {
        resource: String,
        attempts: u32,
        message: String,
    },
    #[error("import commit failed after {attempts} attempt(s): {message}")]
    ImportCommitFailed { attempts: u32, message: String },
    #[error("feature replacement failed after {attempts} attempt(s): {message}")]
    FeatureReplaceFailed { attempts: u32, message: String },
    #[error("block rename failed after {attempts} attempt(s): {message}")]
    RenameCommitFailed { attempts: u32, message: String },
    #[error("{weekday} slot commit failed after {attempts} attempt(s): {message}")]
    SlotCommitFailed {
        weekday: Weekday,
        attempts: u32,
        message: String,
    },
    #[error("run aborted by caller after reaching {state:?}")]
    Aborted { state: WorkflowState },
}

impl WorkflowError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoImportAvailable
            | Self::UnrecognizedFormat { .. }
            | Self::NoMatchingBlock { .. }
            | Self::InvalidFilmName
            | Self::InvalidOffsetSelection { .. }
            | Self::InvalidWeekStart { .. } => ErrorKind::Precondition,
            Self::AuthenticationError { .. }
            | Self::DiscoveryFailed { .. }
            | Self::ImportCommitFailed { .. }
            | Self::FeatureReplaceFailed { .. }
            | Self::RenameCommitFailed { .. }
            | Self::SlotCommitFailed { .. } => ErrorKind::Remote,
            Self::Aborted { .. } => ErrorKind::Aborted,
        }
    }

    pub fn is_precondition(&self) -> bool {
        self.kind() == ErrorKind::Precondition
    }
}
