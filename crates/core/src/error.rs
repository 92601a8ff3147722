//! Error types for Modvote Core

use std::fmt;

use thiserror::Error;

/// A malformed or missing field in a single externally-sourced record
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Invalid field `{field}`: {reason}")]
pub struct ValidationError {
    pub field: String,
    pub reason: String,
}

impl ValidationError {
    pub fn new(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            reason: reason.into(),
        }
    }

    pub fn missing(field: impl Into<String>) -> Self {
        Self::new(field, "missing")
    }
}

/// Failure kinds reported by the backend service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    NetworkRequestFailed,
    Timeout,
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Internal,
    Aborted,
    Cancelled,
    PermissionDenied,
    NotFound,
    AlreadyExists,
    Unauthenticated,
    InvalidArgument,
    FailedPrecondition,
    Unknown,
}

impl ErrorKind {
    /// Parse a backend error code (e.g. `"unavailable"`, `"auth/network-request-failed"`)
    pub fn from_code(code: &str) -> Self {
        let code = code.rsplit('/').next().unwrap_or(code);
        match code.to_ascii_lowercase().replace('_', "-").as_str() {
            "network-request-failed" | "network-error" => ErrorKind::NetworkRequestFailed,
            "timeout" => ErrorKind::Timeout,
            "unavailable" => ErrorKind::Unavailable,
            "deadline-exceeded" => ErrorKind::DeadlineExceeded,
            "resource-exhausted" | "quota-exceeded" => ErrorKind::ResourceExhausted,
            "internal" | "internal-error" => ErrorKind::Internal,
            "aborted" => ErrorKind::Aborted,
            "cancelled" => ErrorKind::Cancelled,
            "permission-denied" => ErrorKind::PermissionDenied,
            "not-found" => ErrorKind::NotFound,
            "already-exists" => ErrorKind::AlreadyExists,
            "unauthenticated" => ErrorKind::Unauthenticated,
            "invalid-argument" => ErrorKind::InvalidArgument,
            "failed-precondition" => ErrorKind::FailedPrecondition,
            _ => ErrorKind::Unknown,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::NetworkRequestFailed => "network-request-failed",
            ErrorKind::Timeout => "timeout",
            ErrorKind::Unavailable => "unavailable",
            ErrorKind::DeadlineExceeded => "deadline-exceeded",
            ErrorKind::ResourceExhausted => "resource-exhausted",
            ErrorKind::Internal => "internal",
            ErrorKind::Aborted => "aborted",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::PermissionDenied => "permission-denied",
            ErrorKind::NotFound => "not-found",
            ErrorKind::AlreadyExists => "already-exists",
            ErrorKind::Unauthenticated => "unauthenticated",
            ErrorKind::InvalidArgument => "invalid-argument",
            ErrorKind::FailedPrecondition => "failed-precondition",
            ErrorKind::Unknown => "unknown",
        }
    }

    /// Human-readable sentence shown to the user for this failure kind
    pub fn user_message(&self) -> &'static str {
        match self {
            ErrorKind::NetworkRequestFailed => {
                "Could not reach the server. Check your internet connection and try again."
            }
            ErrorKind::Timeout | ErrorKind::DeadlineExceeded => {
                "The request took too long. Please try again."
            }
            ErrorKind::Unavailable => {
                "The service is temporarily unavailable. Please try again in a moment."
            }
            ErrorKind::ResourceExhausted => {
                "Too many requests right now. Please wait a moment and try again."
            }
            ErrorKind::Internal => "The server hit an internal error. Please try again.",
            ErrorKind::Aborted => "The operation was interrupted. Please try again.",
            ErrorKind::Cancelled => "The operation was cancelled.",
            ErrorKind::PermissionDenied => "Access denied. You are not allowed to do that.",
            ErrorKind::NotFound => "Room not found. Please check the room code.",
            ErrorKind::AlreadyExists => "That already exists.",
            ErrorKind::Unauthenticated => "Your session has expired. Please sign in again.",
            ErrorKind::InvalidArgument => "Some of the submitted data is invalid.",
            ErrorKind::FailedPrecondition => "That action is not available right now.",
            ErrorKind::Unknown => "Something went wrong. Please try again.",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// An error raised by the backend service
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {message}")]
pub struct InfraError {
    pub kind: ErrorKind,
    pub message: String,
}

impl InfraError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Backend error: {0}")]
    Infrastructure(#[from] InfraError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn infra(kind: ErrorKind, message: impl Into<String>) -> Self {
        Error::Infrastructure(InfraError::new(kind, message))
    }

    /// Backend failure kind, if this is a backend error
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            Error::Infrastructure(e) => Some(e.kind),
            _ => None,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Error::Validation(_))
    }

    pub fn user_message(&self) -> &'static str {
        match self {
            Error::Validation(_) => "Please check your input and try again.",
            Error::Infrastructure(e) => e.kind.user_message(),
            _ => ErrorKind::Unknown.user_message(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
