//! Error types for feed operations.

use crate::subscriptions::DropReason;
use crate::types::PostId;
use thiserror::Error;

/// Main error type for feed operations.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error("Document source unavailable: {0}")]
    Unavailable(String),

    #[error("Document source is closed")]
    Closed,

    #[error("Live subscription dropped: {0:?}")]
    SubscriptionDropped(DropReason),

    #[error("No pagination cursor established yet")]
    NoCursor,

    #[error("A page request is already in flight")]
    LoadInFlight,

    #[error("Invalid page size: {0}")]
    InvalidPageSize(usize),

    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid post: {0}")]
    InvalidPost(String),

    #[error("Post not found: {0}")]
    PostNotFound(PostId),

    #[error("Invalid feed state: expected {expected}, got {got}")]
    InvalidState { expected: String, got: String },

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for FeedError {
    fn from(e: serde_json::Error) -> Self {
        FeedError::Serialization(e.to_string())
    }
}

/// Result type for feed operations.
pub type Result<T> = std::result::Result<T, FeedError>;
