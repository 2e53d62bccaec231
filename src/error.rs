//! Failure taxonomy for publish operations.
//!
//! Ordinary "nothing to do" branches (already published, nothing due, still
//! processing) are result variants on the operations themselves; only genuinely
//! exceptional conditions end up here.
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PublishError {
    /// Missing slot, missing file, already-published or malformed input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Non-success HTTP status from a protocol step.
    #[error("{phase} failed ({status}): {body}")]
    RemoteProtocol {
        phase: &'static str,
        status: u16,
        body: String,
    },

    /// A success response that lacks a field the protocol needs.
    #[error("{phase} response is missing '{field}'")]
    MissingField {
        phase: &'static str,
        field: &'static str,
    },

    /// A chunk was rejected during APPEND.
    #[error("APPEND failed at segment {segment} ({status}): {body}")]
    Upload {
        segment: usize,
        status: u16,
        body: String,
    },

    /// The remote side gave up processing the uploaded media.
    #[error("media processing failed: {0}")]
    ProcessingFailed(String),

    /// Transport or collaborator fault (store, blob, video platform).
    #[error(transparent)]
    Remote(#[from] anyhow::Error),
}

impl PublishError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PublishError::Validation(msg.into())
    }
}
