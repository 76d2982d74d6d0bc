//! Error types and the fixed boundary error table.
//!
//! Every failure the engine can surface to a caller is a [`CoreError`]. The
//! request-handling boundary never builds its own codes: it looks the error's
//! [`ErrorCategory`] up in [`ERROR_TABLE`] and serializes an [`ErrorPayload`].

use crate::model::EntityKind;
use crate::validation::Violation;
use serde::Serialize;
use thiserror::Error;

/// Errors produced by the state engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// One or more validation rules rejected the candidate entity.
    #[error("constraint violation: {} rule(s) failed", violations.len())]
    Validation { violations: Vec<Violation> },

    /// Insert-only operation on a key that already exists.
    #[error("{kind} '{key}' already exists")]
    DuplicateKey { kind: EntityKind, key: String },

    /// Update or delete of a key that does not exist.
    #[error("{kind} '{key}' not found")]
    NotFound { kind: EntityKind, key: String },

    /// The proposal did not gather a majority, or the node is degraded.
    #[error("no quorum: {acknowledged} of {required} required acknowledgements")]
    NoQuorum { acknowledged: usize, required: usize },

    /// Initial synchronization found no peer and `enforce_startup` is off.
    #[error("no quorum at startup: no peer answered within {waited_ms} ms")]
    NoQuorumAtStartup { waited_ms: u64 },

    /// Snapshot write or read failure.
    #[error("persistence error: {message}")]
    Persistence { message: String },

    /// Create or update without a payload.
    #[error("command carries no payload")]
    EmptyBody,

    /// Malformed command (for example, key and payload disagree).
    #[error("bad request: {message}")]
    BadRequest { message: String },

    /// The node is not in a state that accepts proposals.
    #[error("service unavailable: node is {state}")]
    Unavailable { state: String },

    /// Internal error.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl CoreError {
    /// Create a NoQuorum error.
    pub fn no_quorum(acknowledged: usize, required: usize) -> Self {
        Self::NoQuorum {
            acknowledged,
            required,
        }
    }

    /// Create a Persistence error.
    pub fn persistence(message: impl Into<String>) -> Self {
        Self::Persistence {
            message: message.into(),
        }
    }

    /// Create an Internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Create a BadRequest error.
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    /// Check if the caller may retry the same command later.
    pub fn is_retriable(&self) -> bool {
        matches!(self, Self::NoQuorum { .. } | Self::Unavailable { .. })
    }

    /// Repository contract errors raised after quorum are internal faults.
    pub fn escalate_contract_violation(self) -> Self {
        match self {
            Self::DuplicateKey { .. } | Self::NotFound { .. } => Self::Internal {
                message: self.to_string(),
            },
            other => other,
        }
    }

    /// The boundary category of this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Validation { .. } => ErrorCategory::Validation,
            Self::DuplicateKey { .. } => ErrorCategory::DuplicateKey,
            Self::NotFound { .. } => ErrorCategory::NotFound,
            Self::NoQuorum { .. } => ErrorCategory::NoQuorum,
            Self::NoQuorumAtStartup { .. } | Self::Unavailable { .. } => {
                ErrorCategory::ServiceUnavailable
            }
            Self::EmptyBody => ErrorCategory::EmptyBody,
            Self::BadRequest { .. } => ErrorCategory::BadRequest,
            Self::Persistence { .. } | Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// Look up the fixed descriptor for this error.
    pub fn descriptor(&self) -> &'static ErrorDescriptor {
        self.category().descriptor()
    }

    /// Build the uniform payload handed to the request-handling boundary.
    pub fn to_payload(&self) -> ErrorPayload {
        let descriptor = self.descriptor();
        let violations = match self {
            Self::Validation { violations } => violations.clone(),
            _ => Vec::new(),
        };
        ErrorPayload {
            code: descriptor.code,
            name: descriptor.name,
            message: descriptor.message,
            violations,
        }
    }
}

/// Result type using CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// ============================================================================
// Boundary error table
// ============================================================================

/// Error category as seen by the request-handling boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    BadRequest,
    Validation,
    EmptyBody,
    NotFound,
    DuplicateKey,
    Internal,
    UnknownInternal,
    ServiceUnavailable,
    NoQuorum,
}

impl ErrorCategory {
    /// Fixed descriptor for this category.
    pub fn descriptor(self) -> &'static ErrorDescriptor {
        ERROR_TABLE
            .iter()
            .find(|descriptor| descriptor.category == self)
            .unwrap_or(&UNKNOWN_INTERNAL)
    }
}

/// One row of the category → code → message table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ErrorDescriptor {
    pub category: ErrorCategory,
    pub code: u16,
    pub name: &'static str,
    pub message: &'static str,
}

impl ErrorDescriptor {
    /// HTTP status derived from the code.
    pub const fn http_status(&self) -> u16 {
        self.code / 10
    }
}

const UNKNOWN_INTERNAL: ErrorDescriptor = ErrorDescriptor {
    category: ErrorCategory::UnknownInternal,
    code: 5001,
    name: "Unknown Internal Error",
    message: "An unexpected error occurred",
};

/// The fixed mapping used at the boundary.
pub const ERROR_TABLE: [ErrorDescriptor; 9] = [
    ErrorDescriptor {
        category: ErrorCategory::BadRequest,
        code: 4000,
        name: "Bad Request",
        message: "The request could not be understood",
    },
    ErrorDescriptor {
        category: ErrorCategory::Validation,
        code: 4001,
        name: "Constraint Violation",
        message: "Missing fields or invalid values",
    },
    ErrorDescriptor {
        category: ErrorCategory::EmptyBody,
        code: 4002,
        name: "Empty Body",
        message: "The request body is missing",
    },
    ErrorDescriptor {
        category: ErrorCategory::NotFound,
        code: 4040,
        name: "Not Found",
        message: "The requested object does not exist",
    },
    ErrorDescriptor {
        category: ErrorCategory::DuplicateKey,
        code: 4090,
        name: "Conflict",
        message: "An object with this name already exists",
    },
    ErrorDescriptor {
        category: ErrorCategory::Internal,
        code: 5000,
        name: "Internal Server Error",
        message: "The server failed to process the request",
    },
    UNKNOWN_INTERNAL,
    ErrorDescriptor {
        category: ErrorCategory::ServiceUnavailable,
        code: 5030,
        name: "Service Unavailable",
        message: "The node is not ready to accept changes",
    },
    ErrorDescriptor {
        category: ErrorCategory::NoQuorum,
        code: 5031,
        name: "No Quorum",
        message: "Method temporarily not available, because only a minority of nodes could be contacted",
    },
];

/// Serializable error body for the request-handling boundary.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorPayload {
    pub code: u16,
    pub name: &'static str,
    pub message: &'static str,
    pub violations: Vec<Violation>,
}
