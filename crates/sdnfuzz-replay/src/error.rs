//! Error types for replay, superlog I/O and pruning.

use std::path::PathBuf;
use std::time::Duration;

use sdnfuzz_events::{CodecError, EventError};
use sdnfuzz_types::{Label, TaggedFingerprint};
use thiserror::Error;

/// Process exit status for a run stopped by a correctness violation.
pub const EXIT_INVARIANT_VIOLATION: u8 = 5;

/// Why a replay run stopped before the end of the superlog.
#[derive(Error, Debug)]
pub enum ReplayError {
    /// `proceed` failed. Nothing after this event was attempted.
    #[error(
        "{class} {label}{} failed on attempt {attempts}: {source}",
        describe_fingerprint(.fingerprint.as_ref())
    )]
    EventFailed {
        label: Label,
        class: &'static str,
        fingerprint: Option<TaggedFingerprint>,
        attempts: u32,
        source: EventError,
    },

    /// The event stayed pending past the retry budget.
    #[error(
        "{class} {label}{} still pending after {attempts} attempt(s) over {elapsed:?}",
        describe_fingerprint(.fingerprint.as_ref())
    )]
    RetryBudgetExhausted {
        label: Label,
        class: &'static str,
        fingerprint: Option<TaggedFingerprint>,
        attempts: u32,
        elapsed: Duration,
    },

    /// The abort handle was tripped.
    #[error("replay aborted at event {cursor} ({label}) after {attempts} attempt(s)")]
    Aborted {
        label: Label,
        cursor: usize,
        attempts: u32,
    },

    #[error(transparent)]
    Superlog(#[from] SuperlogError),
}

impl ReplayError {
    /// Label of the event the run stopped at, if it stopped at one.
    pub fn label(&self) -> Option<&Label> {
        match self {
            ReplayError::EventFailed { label, .. }
            | ReplayError::RetryBudgetExhausted { label, .. }
            | ReplayError::Aborted { label, .. } => Some(label),
            ReplayError::Superlog(_) => None,
        }
    }

    pub fn is_correctness_violation(&self) -> bool {
        matches!(
            self,
            ReplayError::EventFailed {
                source: EventError::CorrectnessViolation { .. },
                ..
            }
        )
    }

    /// Exit status a binary should report for this error.
    pub fn exit_code(&self) -> u8 {
        if self.is_correctness_violation() {
            EXIT_INVARIANT_VIOLATION
        } else {
            1
        }
    }
}

fn describe_fingerprint(fingerprint: Option<&TaggedFingerprint>) -> String {
    fingerprint.map_or_else(String::new, |fp| format!(" {fp}"))
}

/// Superlog reading and writing errors.
#[derive(Error, Debug)]
pub enum SuperlogError {
    #[error("failed to open superlog {path}: {source}")]
    Open {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("superlog I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// `line` is 1-based.
    #[error("superlog line {line}: {source}")]
    Decode { line: usize, source: CodecError },

    #[error("failed to encode {label}: {source}")]
    Encode { label: Label, source: CodecError },
}

impl SuperlogError {
    /// Line of the offending record, for decode errors.
    pub fn line(&self) -> Option<usize> {
        match self {
            SuperlogError::Decode { line, .. } => Some(*line),
            _ => None,
        }
    }
}

/// Reasons a pruning request is refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PruneError {
    #[error("no event labelled {0} in the superlog")]
    UnknownLabel(Label),

    #[error("{label} is a {class}; only input events can be pruned")]
    NotAnInput { label: Label, class: &'static str },

    #[error("cannot drop {label}: {dependent} depends on it")]
    StillDependedOn { label: Label, dependent: Label },
}
