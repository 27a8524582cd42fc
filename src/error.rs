//! Error types for hdfs-link.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// A structured field carried a value the paired side could never have
    /// produced. This is a local fault and is never surfaced across the link.
    #[error("malformed `{field}` field: {reason}")]
    MalformedField { field: &'static str, reason: String },

    #[error("failed to resolve address {address}: {reason}")]
    Resolve { address: String, reason: String },

    #[error("{role} units cannot {operation}")]
    Unsupported {
        role: &'static str,
        operation: &'static str,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn malformed(field: &'static str, reason: impl ToString) -> Self {
        Error::MalformedField {
            field,
            reason: reason.to_string(),
        }
    }
}
