use crate::error::EngineError;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum QueryError {
    UnknownRecordType {
        record_type: String,
    },
    TypeMismatch {
        field: String,
        expected: String,
        got: String,
    },
    ScanBoundExceeded {
        rows_examined: usize,
        max_scan_rows: usize,
    },
    InvalidQuery {
        reason: String,
    },
    Engine(EngineError),
}

impl fmt::Display for QueryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryError::UnknownRecordType { record_type } => {
                write!(f, "record type '{record_type}' not found")
            }
            QueryError::TypeMismatch {
                field,
                expected,
                got,
            } => write!(
                f,
                "type mismatch on field '{field}': expected {expected}, got {got}"
            ),
            QueryError::ScanBoundExceeded {
                rows_examined,
                max_scan_rows,
            } => write!(
                f,
                "scan bound exceeded: rows_examined={rows_examined}, max_scan_rows={max_scan_rows}"
            ),
            QueryError::InvalidQuery { reason } => write!(f, "invalid query: {reason}"),
            QueryError::Engine(err) => write!(f, "engine error: {err}"),
        }
    }
}

impl std::error::Error for QueryError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            QueryError::Engine(err) => Some(err),
            _ => None,
        }
    }
}

impl From<EngineError> for QueryError {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Validation(reason) => QueryError::InvalidQuery { reason },
            EngineError::InvalidConfig { message } => QueryError::InvalidQuery { reason: message },
            other => QueryError::Engine(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::QueryError;
    use crate::error::{EngineError, ResourceType};

    #[test]
    fn query_error_display_is_human_readable() {
        let err = QueryError::TypeMismatch {
            field: "age".into(),
            expected: "INTEGER".into(),
            got: "STRING".into(),
        };
        assert_eq!(
            err.to_string(),
            "type mismatch on field 'age': expected INTEGER, got STRING"
        );
    }

    #[test]
    fn engine_errors_convert() {
        let err: QueryError = EngineError::Validation("bad".into()).into();
        assert_eq!(
            err,
            QueryError::InvalidQuery {
                reason: "bad".into()
            }
        );
        let err: QueryError = EngineError::NotFound {
            resource_type: ResourceType::Index,
            resource_id: "x".into(),
        }
        .into();
        assert!(matches!(err, QueryError::Engine(_)));
    }
}
