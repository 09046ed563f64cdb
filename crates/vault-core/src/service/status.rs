//! Service response status

use std::fmt;

use thiserror::Error;

/// Message shown for any internal failure. Details go to the log only.
pub const INTERNAL_MESSAGE: &str = "Oops! Something went wrong. Please try again later.";

/// Message shown when a long-lived token does not verify.
pub const SESSION_MESSAGE: &str =
    "Your session has expired or the token is invalid. Please log in again to generate a new token.";

/// Message shown when a payload cannot be decoded or decrypted.
pub const CONTENT_MESSAGE: &str = "Invalid content format.";

/// Status codes, mirroring RPC status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Code {
    /// Request is missing fields or carries an unusable payload
    InvalidArgument,
    /// Caller could not be identified
    Unauthenticated,
    /// Record already exists
    AlreadyExists,
    /// Record does not exist
    NotFound,
    /// Platform is not supported
    Unimplemented,
    /// Server-side failure
    Internal,
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::InvalidArgument => "INVALID_ARGUMENT",
            Self::Unauthenticated => "UNAUTHENTICATED",
            Self::AlreadyExists => "ALREADY_EXISTS",
            Self::NotFound => "NOT_FOUND",
            Self::Unimplemented => "UNIMPLEMENTED",
            Self::Internal => "INTERNAL",
        };
        f.write_str(name)
    }
}

/// Error returned by every service operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message}")]
pub struct Status {
    /// Status code
    pub code: Code,
    /// Caller-facing message
    pub message: String,
}

impl Status {
    /// Build a status.
    pub fn new(code: Code, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    /// `InvalidArgument` with `message`.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::new(Code::InvalidArgument, message)
    }

    /// `InvalidArgument` for a bad payload.
    pub fn invalid_content() -> Self {
        Self::new(Code::InvalidArgument, CONTENT_MESSAGE)
    }

    /// `Unauthenticated` with `message`.
    pub fn unauthenticated(message: impl Into<String>) -> Self {
        Self::new(Code::Unauthenticated, message)
    }

    /// `Unauthenticated` for a token that did not verify.
    pub fn session_expired() -> Self {
        Self::new(Code::Unauthenticated, SESSION_MESSAGE)
    }

    /// `AlreadyExists` with `message`.
    pub fn already_exists(message: impl Into<String>) -> Self {
        Self::new(Code::AlreadyExists, message)
    }

    /// `NotFound` with `message`.
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Code::NotFound, message)
    }

    /// `Unimplemented` for a platform outside the configured set.
    pub fn unsupported_platform(platform: &str) -> Self {
        Self::new(
            Code::Unimplemented,
            format!(
                "The platform '{platform}' is currently not supported. Please contact the developers \
                 for more information on when this platform will be implemented."
            ),
        )
    }

    /// `Internal` with the generic message.
    pub fn internal() -> Self {
        Self::new(Code::Internal, INTERNAL_MESSAGE)
    }
}
