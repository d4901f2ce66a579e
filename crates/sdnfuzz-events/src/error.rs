//! Error types for the event model.

use sdnfuzz_types::{ControllerId, Dpid, Label, PortNo};
use thiserror::Error;

use crate::invariant::Invariant;

/// Failures reported by a simulation collaborator.
///
/// These are propagated unchanged: a logged event that references a switch
/// or controller that does not exist is a broken trace, not a timing issue.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("no switch with dpid {0}")]
    NoSuchSwitch(Dpid),

    #[error("switch {dpid} has no port {port}")]
    NoSuchPort { dpid: Dpid, port: PortNo },

    #[error("no link {start_dpid}:{start_port} -> {end_dpid}:{end_port}")]
    NoSuchLink {
        start_dpid: Dpid,
        start_port: PortNo,
        end_dpid: Dpid,
        end_port: PortNo,
    },

    #[error("no controller at {0}")]
    NoSuchController(ControllerId),

    #[error("switch {dpid} has no connection to controller {controller}")]
    NoSuchChannel { dpid: Dpid, controller: ControllerId },

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("{0}")]
    Failed(String),
}

/// Fatal outcome of [`crate::Replayable::proceed`].
///
/// A precondition that is merely not true *yet* is never an error; it is
/// reported as [`crate::Progress::Pending`].
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EventError {
    /// A simulation collaborator rejected the action.
    #[error(transparent)]
    Collaborator(#[from] CollaboratorError),

    /// Live state contradicts what the trace says must hold.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),

    /// The event needs a collaborator that was not configured for this run.
    #[error("no {0} configured for this simulation")]
    MissingCollaborator(&'static str),

    /// An invariant check with `fail_on_error` found violations.
    #[error("{invariant} found {} correctness violation(s): {violations:?}", .violations.len())]
    CorrectnessViolation {
        invariant: Invariant,
        violations: Vec<String>,
    },
}

/// Label registry errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LabelError {
    #[error("label `{0}` has no numeric suffix")]
    MalformedLabel(Label),
}

/// Errors raised while converting between events and superlog records.
#[derive(Error, Debug)]
pub enum CodecError {
    #[error("record is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("record is not a JSON object: {0}")]
    NotAnObject(String),

    #[error("field `{field}` missing from record {record}")]
    MissingField { field: &'static str, record: String },

    #[error("unknown event class `{class}` in record {record}")]
    UnknownClass { class: String, record: String },

    #[error("malformed {class} record {record}: {source}")]
    Malformed {
        class: &'static str,
        record: String,
        source: serde_json::Error,
    },

    #[error("invalid `{field}` in {class} record {record}: {reason}")]
    InvalidField {
        class: &'static str,
        field: &'static str,
        reason: String,
        record: String,
    },

    #[error("unknown invariant `{name}` (invariant registry v{version})")]
    UnknownInvariant { name: String, version: u32 },

    #[error(transparent)]
    Label(#[from] LabelError),
}
