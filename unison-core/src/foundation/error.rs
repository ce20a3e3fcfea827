use std::io;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NoValidProposals,
    FetchTimeout,
    PinFailure,
    UnpinFailure,
    ManifestPublishFailure,
    SequenceRegressionDetected,
    InvalidStateTransition,
    ProposalValidationFailed,
    CatalogError,
    StorageError,
    SerializationError,
    StoreError,
    TransportError,
    MessageTooLarge,
    EncodingError,
    ConfigError,
    Message,
}

#[derive(Debug, Error)]
pub enum UnisonError {
    // === Round lifecycle (recovered inside the coordinator) ===
    #[error("no valid proposals for round {round_id}")]
    NoValidProposals { round_id: u64 },

    #[error("fetch timed out round_id={round_id} content_id={content_id}")]
    FetchTimeout { round_id: u64, content_id: String },

    #[error("pin failed content_id={content_id}: {details}")]
    PinFailure { content_id: String, details: String },

    #[error("unpin failed content_id={content_id}: {details}")]
    UnpinFailure { content_id: String, details: String },

    // === Stream composer ===
    #[error("manifest publish failed: {details}")]
    ManifestPublishFailure { details: String },

    /// Fatal: publishing would move the live sequence backwards for every client.
    #[error("sequence regression detected: persisted={persisted} attempted={attempted}")]
    SequenceRegressionDetected { persisted: u64, attempted: u64 },

    #[error("invalid state transition: {from} -> {to}")]
    InvalidStateTransition { from: String, to: String },

    #[error("proposal validation failed: {details}")]
    ProposalValidationFailed { details: String },

    #[error("catalog error: {0}")]
    CatalogError(String),

    // === Infrastructure ===
    #[error("storage error during {operation}: {details}")]
    StorageError { operation: String, details: String },

    #[error("{format} serialization error: {details}")]
    SerializationError { format: String, details: String },

    #[error("content store error during {operation}: {details}")]
    StoreError { operation: String, details: String },

    #[error("transport error during {operation}: {details}")]
    TransportError { operation: String, details: String },

    #[error("message too large: {size} exceeds max {max}")]
    MessageTooLarge { size: usize, max: usize },

    #[error("encoding error: {0}")]
    EncodingError(String),

    #[error("configuration error: {0}")]
    ConfigError(String),

    #[error("{0}")]
    Message(String),
}

#[macro_export]
macro_rules! storage_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::UnisonError::StorageError { operation: $op.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! serde_err {
    ($fmt:expr, $err:expr) => {
        $crate::foundation::UnisonError::SerializationError { format: $fmt.into(), details: $err.to_string() }
    };
}

#[macro_export]
macro_rules! store_err {
    ($op:expr, $err:expr) => {
        $crate::foundation::UnisonError::StoreError { operation: $op.into(), details: $err.to_string() }
    };
}

impl From<io::Error> for UnisonError {
    fn from(err: io::Error) -> Self {
        UnisonError::StorageError { operation: "io".to_string(), details: err.to_string() }
    }
}

impl From<serde_json::Error> for UnisonError {
    fn from(err: serde_json::Error) -> Self {
        UnisonError::SerializationError { format: "json".to_string(), details: err.to_string() }
    }
}

impl From<reqwest::Error> for UnisonError {
    fn from(err: reqwest::Error) -> Self {
        let operation = if err.is_timeout() { "http_timeout" } else { "http" };
        UnisonError::StoreError { operation: operation.to_string(), details: err.to_string() }
    }
}

impl UnisonError {
    pub fn code(&self) -> ErrorCode {
        match self {
            UnisonError::NoValidProposals { .. } => ErrorCode::NoValidProposals,
            UnisonError::FetchTimeout { .. } => ErrorCode::FetchTimeout,
            UnisonError::PinFailure { .. } => ErrorCode::PinFailure,
            UnisonError::UnpinFailure { .. } => ErrorCode::UnpinFailure,
            UnisonError::ManifestPublishFailure { .. } => ErrorCode::ManifestPublishFailure,
            UnisonError::SequenceRegressionDetected { .. } => ErrorCode::SequenceRegressionDetected,
            UnisonError::InvalidStateTransition { .. } => ErrorCode::InvalidStateTransition,
            UnisonError::ProposalValidationFailed { .. } => ErrorCode::ProposalValidationFailed,
            UnisonError::CatalogError(_) => ErrorCode::CatalogError,
            UnisonError::StorageError { .. } => ErrorCode::StorageError,
            UnisonError::SerializationError { .. } => ErrorCode::SerializationError,
            UnisonError::StoreError { .. } => ErrorCode::StoreError,
            UnisonError::TransportError { .. } => ErrorCode::TransportError,
            UnisonError::MessageTooLarge { .. } => ErrorCode::MessageTooLarge,
            UnisonError::EncodingError(_) => ErrorCode::EncodingError,
            UnisonError::ConfigError(_) => ErrorCode::ConfigError,
            UnisonError::Message(_) => ErrorCode::Message,
        }
    }

    /// Only a sequence regression stops a component; everything else degrades to fallback
    /// content or is retried on the next tick/cleanup pass.
    pub fn is_fatal(&self) -> bool {
        matches!(self, UnisonError::SequenceRegressionDetected { .. })
    }
}

pub type Result<T> = std::result::Result<T, UnisonError>;
