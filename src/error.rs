//! Domain error taxonomy.
//!
//! Each subsystem carries a typed error so callers can branch on the
//! failure mode without string-matching:
//!
//! * [`FetchError`] splits failures into transient (worth retrying with
//!   backoff) and permanent (not worth retrying).
//! * [`ParseError`] classifies malformed workflow documents; its
//!   [`reason`](ParseError::reason) maps each variant to a stable slug
//!   recorded alongside failed records.
//! * [`StoreError`] covers catalog transaction failures and missing rows.
//!
//! All three implement [`std::error::Error`] via `thiserror`, so they
//! propagate cleanly into `anyhow` at the CLI boundary.

use thiserror::Error;

/// Failure fetching a source listing or document.
#[derive(Debug, Error)]
pub enum FetchError {
    /// A failure worth retrying (rate limits, server errors, network resets).
    #[error("transient fetch failure: {0}")]
    Transient(String),
    /// A failure not worth retrying (missing paths, bad references, auth).
    #[error("permanent fetch failure: {0}")]
    Permanent(String),
}

impl FetchError {
    /// Whether the failure should be retried with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, FetchError::Transient(_))
    }
}

/// Failure parsing a workflow document into a node graph.
#[derive(Debug, Error)]
pub enum ParseError {
    /// The bytes were not valid JSON.
    #[error("malformed json: {0}")]
    MalformedJson(String),
    /// A required top-level field was absent.
    #[error("missing required field: {0}")]
    MissingRequiredField(String),
    /// The node graph was structurally invalid.
    #[error("invalid node graph: {0}")]
    InvalidNodeGraph(String),
}

impl ParseError {
    /// Stable slug identifying the failure mode, recorded with failed
    /// records for later inspection.
    pub fn reason(&self) -> &'static str {
        match self {
            ParseError::MalformedJson(_) => "malformed_json",
            ParseError::MissingRequiredField(_) => "missing_required_field",
            ParseError::InvalidNodeGraph(_) => "invalid_node_graph",
        }
    }
}

/// Failure reading from or writing to the catalog store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A database transaction failed.
    #[error("transaction failed: {0}")]
    TransactionFailed(String),
    /// The requested record was not found.
    #[error("not found: {0}")]
    NotFound(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::TransactionFailed(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::TransactionFailed(e.to_string())
    }
}
