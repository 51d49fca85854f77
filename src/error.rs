//! Error types for the schema registry and the hot-swap validator

use thiserror::Error;

/// Result type for schema operations
pub type Result<T> = std::result::Result<T, SchemaError>;

/// Coarse error classification shared by the registry, the consumer and the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    AlreadyExists,
    NotFound,
    FailedPrecondition,
    Internal,
}

impl ErrorKind {
    /// Stable snake_case code used in HTTP error bodies
    pub fn code(&self) -> &'static str {
        match self {
            ErrorKind::InvalidArgument => "invalid_argument",
            ErrorKind::AlreadyExists => "already_exists",
            ErrorKind::NotFound => "not_found",
            ErrorKind::FailedPrecondition => "failed_precondition",
            ErrorKind::Internal => "internal",
        }
    }

    /// Inverse of [`ErrorKind::code`]; unknown codes are treated as internal
    pub fn from_code(code: &str) -> Self {
        match code {
            "invalid_argument" => ErrorKind::InvalidArgument,
            "already_exists" => ErrorKind::AlreadyExists,
            "not_found" => ErrorKind::NotFound,
            "failed_precondition" => ErrorKind::FailedPrecondition,
            _ => ErrorKind::Internal,
        }
    }
}

/// Schema registry errors
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Invalid version '{version}': {reason}")]
    InvalidVersion { version: String, reason: String },

    #[error("Invalid schema target '{target}': {reason}")]
    InvalidTarget { target: String, reason: String },

    #[error("Schema payload is empty")]
    EmptyPayload,

    #[error("Schema payload is {size} bytes, maximum is {max}")]
    PayloadTooLarge { size: usize, max: usize },

    #[error("Version component '{field}' must be non-negative, got {value}")]
    NegativeComponent { field: &'static str, value: i64 },

    #[error("Invalid descriptor: {0}")]
    Descriptor(String),

    #[error("Descriptor set contains no message definitions")]
    NoMessages,

    #[error("Rule engine rejected schema: {0}")]
    Engine(String),

    #[error("Registry returned version {version} for target {target}")]
    TargetMismatch { target: String, version: String },

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Schema version {version} already exists")]
    AlreadyExists { version: String },

    #[error("Schema not found: version {version}")]
    NotFound { version: String },

    #[error("No schema found for {major}.{minor}")]
    NoPatch { major: u32, minor: u32 },

    #[error("Cannot {operation} while manager is {state}")]
    Lifecycle { operation: &'static str, state: String },

    #[error("Checksum mismatch for {version}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        version: String,
        expected: String,
        actual: String,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Background task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("Internal error: {0}")]
    Internal(String),

    /// An error reported by a remote registry
    #[error("{message}")]
    Remote { kind: ErrorKind, message: String },
}

impl SchemaError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SchemaError::InvalidVersion { .. }
            | SchemaError::InvalidTarget { .. }
            | SchemaError::EmptyPayload
            | SchemaError::PayloadTooLarge { .. }
            | SchemaError::NegativeComponent { .. }
            | SchemaError::Descriptor(_)
            | SchemaError::NoMessages
            | SchemaError::Engine(_)
            | SchemaError::TargetMismatch { .. }
            | SchemaError::InvalidArgument(_) => ErrorKind::InvalidArgument,
            SchemaError::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            SchemaError::NotFound { .. } | SchemaError::NoPatch { .. } => ErrorKind::NotFound,
            SchemaError::Lifecycle { .. } => ErrorKind::FailedPrecondition,
            SchemaError::ChecksumMismatch { .. }
            | SchemaError::Io(_)
            | SchemaError::Json(_)
            | SchemaError::Git(_)
            | SchemaError::Http(_)
            | SchemaError::Task(_)
            | SchemaError::Internal(_) => ErrorKind::Internal,
            SchemaError::Remote { kind, .. } => *kind,
        }
    }

    /// Rebuild an error received over the wire from its code and message
    pub fn from_remote(kind: ErrorKind, message: String) -> Self {
        SchemaError::Remote { kind, message }
    }
}
