//! Error and Result types for airspace.
//!
//! Absence is not an error: a missing dataset, a deleted dataset or a page
//! beyond the stored range all surface as `None` / empty results.

use crate::client::ClientError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    /// A constructor or operation was given a value it cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The key-value client failed at the transport level.
    #[error("store error: {0}")]
    Store(#[from] ClientError),

    /// A stored payload could not be parsed into the expected form.
    #[error("failed to deserialize {what}: {reason}")]
    Deserialize { what: &'static str, reason: String },

    /// A value could not be encoded for storage.
    #[error("failed to serialize {what}: {reason}")]
    Serialize { what: &'static str, reason: String },
}

impl Error {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Error::InvalidArgument(msg.into())
    }

    pub(crate) fn deserialize(what: &'static str, reason: impl ToString) -> Self {
        Error::Deserialize {
            what,
            reason: reason.to_string(),
        }
    }

    pub(crate) fn serialize(what: &'static str, reason: impl ToString) -> Self {
        Error::Serialize {
            what,
            reason: reason.to_string(),
        }
    }
}
