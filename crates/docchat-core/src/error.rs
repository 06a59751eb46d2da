//! Error taxonomy shared by the retrieval core and the application.
//!
//! [`DocChatError`] is what request handlers see. Each variant maps to one
//! HTTP class in the server layer:
//!
//! | Variant | Class |
//! |---------|-------|
//! | `Validation` | 400, specific message |
//! | `Conflict` | 400, "already uploaded" |
//! | `Unauthenticated` | 401 |
//! | `Unauthorized` | 403, generic message |
//! | `Provider` / `Storage` | 500, generic message |
//!
//! [`ProviderError`] covers every failure of an external service (embedding
//! model, vector store, chat model). The answer composer downgrades it to
//! apology text instead of propagating it.

use thiserror::Error;

/// Failure of an external managed service.
#[derive(Debug, Error)]
pub enum ProviderError {
    /// Transport-level failure (connect, timeout, TLS).
    #[error("{service} request failed: {message}")]
    Http { service: String, message: String },

    /// The service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: String,
        status: u16,
        body: String,
    },

    /// The response body did not have the expected shape.
    #[error("{service} returned an unexpected response: {message}")]
    Decode { service: String, message: String },

    /// A batch call returned a different number of items than it was given.
    #[error("{service} returned {got} results for {expected} inputs")]
    CountMismatch {
        service: String,
        expected: usize,
        got: usize,
    },

    /// A returned vector does not have the model's dimensionality.
    #[error("{service} returned a {got}-dimensional vector, expected {expected}")]
    DimensionMismatch {
        service: String,
        expected: usize,
        got: usize,
    },

    #[error("{0} provider is disabled")]
    Disabled(String),

    /// Missing API key or similar setup problem detected at call time.
    #[error("{service} is misconfigured: {message}")]
    Config { service: String, message: String },
}

impl ProviderError {
    pub fn http(service: &str, err: impl std::fmt::Display) -> Self {
        ProviderError::Http {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    pub fn decode(service: &str, err: impl std::fmt::Display) -> Self {
        ProviderError::Decode {
            service: service.to_string(),
            message: err.to_string(),
        }
    }

    /// True for failures worth retrying: transport errors, 429 and 5xx.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Http { .. } => true,
            ProviderError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Invalid chunker parameters.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChunkError {
    #[error("chunk size must be > 0")]
    ZeroSize,
    #[error("overlap ({overlap}) must be smaller than chunk size ({chunk_size})")]
    OverlapTooLarge { chunk_size: usize, overlap: usize },
}

/// Failure of the relational metadata store.
#[derive(Debug, Error)]
pub enum FileStoreError {
    /// A record with the same identifier already exists.
    #[error("file {0} already exists")]
    Duplicate(String),
    #[error("metadata store error: {0}")]
    Backend(String),
}

/// Request-level error returned by the upload, list and delete operations.
#[derive(Debug, Error)]
pub enum DocChatError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Unauthenticated(String),

    /// Never distinguishes "not yours" from "does not exist".
    #[error("Unauthorized or file not found")]
    Unauthorized,

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("{0}")]
    Storage(String),
}

impl From<FileStoreError> for DocChatError {
    fn from(err: FileStoreError) -> Self {
        DocChatError::Storage(err.to_string())
    }
}

impl From<ChunkError> for DocChatError {
    fn from(err: ChunkError) -> Self {
        DocChatError::Validation(err.to_string())
    }
}
