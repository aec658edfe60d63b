//! Error taxonomy shared across the crate.
//!
//! Every fallible operation resolves to one of five categories: a malformed
//! model, a semantically invalid argument, an unsupported datatype or
//! operator, memory exhaustion, or an internal invariant failure.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Status {
    #[error("invalid model: {0}")]
    InvalidModel(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("unsupported type: {0}")]
    UnsupportedType(String),
    #[error("out of memory: {0}")]
    OutOfMemory(String),
    #[error("unknown error: {0}")]
    UnknownError(String),
}

impl Status {
    pub fn invalid_model(detail: impl Into<String>) -> Status {
        Status::InvalidModel(detail.into())
    }

    pub fn invalid_argument(detail: impl Into<String>) -> Status {
        Status::InvalidArgument(detail.into())
    }

    pub fn unsupported_type(detail: impl Into<String>) -> Status {
        Status::UnsupportedType(detail.into())
    }

    pub fn out_of_memory(detail: impl Into<String>) -> Status {
        Status::OutOfMemory(detail.into())
    }

    pub fn unknown(detail: impl Into<String>) -> Status {
        Status::UnknownError(detail.into())
    }
}

pub type Result<T> = std::result::Result<T, Status>;
