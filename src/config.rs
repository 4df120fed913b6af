use crate::error::EngineError;

/// Runtime configuration for a [`crate::Database`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    pub commit_lock_timeout_ms: u64,
    pub max_expr_depth: usize,
    pub max_in_list_len: usize,
    /// Upper bound on records examined by one query; 0 disables the bound.
    pub max_scan_rows: usize,
    pub default_ignore_nulls: bool,
    pub max_commit_retries: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commit_lock_timeout_ms: 5_000,
            max_expr_depth: 32,
            max_in_list_len: 1_024,
            max_scan_rows: 0,
            default_ignore_nulls: false,
            max_commit_retries: 8,
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<(), EngineError> {
        if self.commit_lock_timeout_ms == 0 {
            return Err(EngineError::InvalidConfig {
                message: "commit_lock_timeout_ms must be > 0".into(),
            });
        }
        if self.max_expr_depth == 0 {
            return Err(EngineError::InvalidConfig {
                message: "max_expr_depth must be > 0".into(),
            });
        }
        if self.max_in_list_len == 0 {
            return Err(EngineError::InvalidConfig {
                message: "max_in_list_len must be > 0".into(),
            });
        }
        Ok(())
    }
}
