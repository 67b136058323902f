//! Type definitions for the proxy module

use nutype::nutype;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Maximum size for buffered HTTP request bodies in bytes
#[nutype(
    derive(Clone, Copy, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |size: &usize| *size > 0),
)]
pub struct RequestSizeLimit(usize);

/// Base URL of the backend the proxy relays to
#[nutype(
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| s.starts_with("http://") || s.starts_with("https://")),
)]
pub struct TargetUrl(String);

/// Name of an inference model as the backend knows it
#[nutype(
    derive(Clone, Debug, Display, Deserialize, Serialize, TryFrom, AsRef),
    validate(predicate = |s: &str| !s.is_empty()),
)]
pub struct ModelName(String);

/// Opaque per-request identifier linking request, admission, and response
/// audit records.
///
/// Generated from a UUIDv7 so concurrent requests never collide and ids sort
/// by observation time. The empty string is the "not logged" sentinel: a
/// sink that records nothing returns it, and every downstream record call
/// carrying it is a no-op.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Mint a fresh id for a newly observed request.
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// The sentinel meaning "this request was never recorded".
    pub fn unlogged() -> Self {
        Self(String::new())
    }

    pub fn is_unlogged(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Which backend API a request or response stream belongs to.
///
/// Drives response reassembly: chat streams are recombined from their
/// per-chunk message fragments, everything else is logged as raw bytes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ApiKind {
    Chat,
    Generate,
    Other,
}

impl ApiKind {
    pub fn from_path(path: &str) -> Self {
        if path.contains("/api/chat") {
            Self::Chat
        } else if path.contains("/api/generate") {
            Self::Generate
        } else {
            Self::Other
        }
    }
}

/// Errors that can occur in the proxy
#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Failed to read request body: {0}")]
    RequestBodyRead(String),

    #[error("Request too large: max {max_size} bytes")]
    RequestTooLarge { max_size: RequestSizeLimit },

    #[error("Request timeout after {0:?}")]
    RequestTimeout(Duration),

    #[error("Invalid target URL: {0}")]
    InvalidTargetUrl(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("HTTP error: {0}")]
    HttpError(#[from] http::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type for proxy operations
pub type ProxyResult<T> = Result<T, ProxyError>;
