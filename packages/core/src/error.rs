//! Validation errors for broadcast input.

use thiserror::Error;

/// Rejected input. A broadcast is never created when one of these is returned.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("recipient list is empty")]
    EmptyRecipients,
    #[error("missing required message field: {0}")]
    MissingField(&'static str),
    #[error("invalid broadcast id: {0}")]
    InvalidBroadcastId(String),
    #[error("invalid recipient id: {0}")]
    InvalidRecipient(String),
    #[error("invalid notification id format: {0}")]
    InvalidTrackingRef(String),
    #[error("invalid broadcast state: {0}")]
    InvalidState(String),
    #[error("invalid export type: {0}")]
    InvalidExportKind(String),
}
