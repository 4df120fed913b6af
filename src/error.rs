use crate::catalog::types::Rid;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceType {
    RecordType,
    Property,
    Index,
    Record,
}

impl std::fmt::Display for ResourceType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceType::RecordType => write!(f, "record type"),
            ResourceType::Property => write!(f, "property"),
            ResourceType::Index => write!(f, "index"),
            ResourceType::Record => write!(f, "record"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineErrorCode {
    ConcurrentModification,
    UniquenessViolation,
    DefinitionMismatch,
    SchemaChanged,
    RecordTypeNotFound,
    PropertyNotFound,
    IndexNotFound,
    RecordNotFound,
    RecordTypeAlreadyExists,
    PropertyAlreadyExists,
    IndexAlreadyExists,
    RecordAlreadyExists,
    Validation,
    InvalidState,
    LockTimeout,
    LockPoisoned,
    InvalidConfig,
}

impl EngineErrorCode {
    pub fn as_str(self) -> &'static str {
        match self {
            EngineErrorCode::ConcurrentModification => "concurrent_modification",
            EngineErrorCode::UniquenessViolation => "uniqueness_violation",
            EngineErrorCode::DefinitionMismatch => "definition_mismatch",
            EngineErrorCode::SchemaChanged => "schema_changed",
            EngineErrorCode::RecordTypeNotFound => "record_type_not_found",
            EngineErrorCode::PropertyNotFound => "property_not_found",
            EngineErrorCode::IndexNotFound => "index_not_found",
            EngineErrorCode::RecordNotFound => "record_not_found",
            EngineErrorCode::RecordTypeAlreadyExists => "record_type_already_exists",
            EngineErrorCode::PropertyAlreadyExists => "property_already_exists",
            EngineErrorCode::IndexAlreadyExists => "index_already_exists",
            EngineErrorCode::RecordAlreadyExists => "record_already_exists",
            EngineErrorCode::Validation => "validation",
            EngineErrorCode::InvalidState => "invalid_state",
            EngineErrorCode::LockTimeout => "lock_timeout",
            EngineErrorCode::LockPoisoned => "lock_poisoned",
            EngineErrorCode::InvalidConfig => "invalid_config",
        }
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EngineError {
    #[error(
        "concurrent modification of record {rid}: observed version {expected}, committed version {actual}"
    )]
    ConcurrentModification { rid: Rid, expected: u64, actual: u64 },
    #[error("uniqueness violation on index '{index}': key {key} already maps to {existing}, cannot add {incoming}")]
    UniquenessViolation {
        index: String,
        key: String,
        existing: Rid,
        incoming: Rid,
    },
    #[error("definition mismatch on index '{index}' field '{field}': {reason}")]
    DefinitionMismatch {
        index: String,
        field: String,
        reason: String,
    },
    #[error("schema changed since the transaction began")]
    SchemaChanged,
    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("{resource_type} '{resource_id}' already exists")]
    AlreadyExists {
        resource_type: ResourceType,
        resource_id: String,
    },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("cannot {operation} a transaction in state {state}")]
    InvalidState {
        state: &'static str,
        operation: &'static str,
    },
    #[error("commit lock timeout")]
    LockTimeout,
    /// A thread panicked while holding commit locks; commits stay refused afterwards.
    #[error("commit lock table poisoned while {during}")]
    LockPoisoned { during: &'static str },
    #[error("invalid config: {message}")]
    InvalidConfig { message: String },
}

/// Outcome of `Transaction::commit`.
pub type CommitError = EngineError;

impl EngineError {
    pub fn code(&self) -> EngineErrorCode {
        match self {
            EngineError::ConcurrentModification { .. } => EngineErrorCode::ConcurrentModification,
            EngineError::UniquenessViolation { .. } => EngineErrorCode::UniquenessViolation,
            EngineError::DefinitionMismatch { .. } => EngineErrorCode::DefinitionMismatch,
            EngineError::SchemaChanged => EngineErrorCode::SchemaChanged,
            EngineError::NotFound { resource_type, .. } => match resource_type {
                ResourceType::RecordType => EngineErrorCode::RecordTypeNotFound,
                ResourceType::Property => EngineErrorCode::PropertyNotFound,
                ResourceType::Index => EngineErrorCode::IndexNotFound,
                ResourceType::Record => EngineErrorCode::RecordNotFound,
            },
            EngineError::AlreadyExists { resource_type, .. } => match resource_type {
                ResourceType::RecordType => EngineErrorCode::RecordTypeAlreadyExists,
                ResourceType::Property => EngineErrorCode::PropertyAlreadyExists,
                ResourceType::Index => EngineErrorCode::IndexAlreadyExists,
                ResourceType::Record => EngineErrorCode::RecordAlreadyExists,
            },
            EngineError::Validation(_) => EngineErrorCode::Validation,
            EngineError::InvalidState { .. } => EngineErrorCode::InvalidState,
            EngineError::LockTimeout => EngineErrorCode::LockTimeout,
            EngineError::LockPoisoned { .. } => EngineErrorCode::LockPoisoned,
            EngineError::InvalidConfig { .. } => EngineErrorCode::InvalidConfig,
        }
    }

    pub fn code_str(&self) -> &'static str {
        self.code().as_str()
    }

    /// Conflicts that a fresh transaction over the same input may resolve.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            EngineError::ConcurrentModification { .. }
                | EngineError::SchemaChanged
                | EngineError::LockTimeout
        )
    }
}
