pub mod catalog;
pub mod commit;
pub mod config;
pub mod error;
#[cfg(test)]
mod lib_tests;
pub mod query;
pub mod snapshot;
pub mod storage;

pub use crate::catalog::IndexCatalog;
pub use crate::catalog::schema::{
    ClassSchema, FieldRole, FieldSpec, IndexDefinition, IndexSpec, PropertyDef, Uniqueness,
};
pub use crate::catalog::types::{Properties, Rid, Value, ValueType};
pub use crate::commit::delta::{DeltaOp, IndexDelta, compute_delta};
pub use crate::commit::tx::{Transaction, TransactionState};
pub use crate::config::EngineConfig;
pub use crate::error::{CommitError, EngineError, EngineErrorCode, ResourceType};
pub use crate::query::error::QueryError;
pub use crate::query::executor::QueryResult;
pub use crate::query::plan::{CmpOp, Expr, Operand, ScanPlan, field};
pub use crate::query::planner::plan;
pub use crate::snapshot::SnapshotReadView;
pub use crate::storage::RecordStorage;
pub use crate::storage::index::Direction;
pub use crate::storage::key::IndexKey;
pub use crate::storage::record::Record;

use crate::commit::SharedEngine;
use crate::commit::apply::build_index;
use crate::storage::index::IndexStructure;
use crate::storage::state::CommittedState;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// In-memory record store with transactional secondary indexes.
///
/// Cloning yields another handle to the same database.
#[derive(Debug, Clone)]
pub struct Database {
    shared: Arc<SharedEngine>,
}

impl Default for Database {
    fn default() -> Self {
        Self {
            shared: Arc::new(SharedEngine::new(EngineConfig::default())),
        }
    }
}

impl Database {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        config.validate()?;
        info!(
            commit_lock_timeout_ms = config.commit_lock_timeout_ms,
            max_scan_rows = config.max_scan_rows,
            default_ignore_nulls = config.default_ignore_nulls,
            "database opened"
        );
        Ok(Self {
            shared: Arc::new(SharedEngine::new(config)),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.shared.config
    }

    pub fn begin(&self) -> Transaction {
        Transaction::begin(Arc::clone(&self.shared))
    }

    /// Runs `f` in a fresh transaction and commits it. Any error from `f` or the commit
    /// rolls the transaction back; retryable errors start over, at most `max_retries` times.
    pub fn run_in_transaction<T, F>(&self, max_retries: usize, mut f: F) -> Result<T, EngineError>
    where
        F: FnMut(&mut Transaction) -> Result<T, EngineError>,
    {
        let mut attempt = 0usize;
        loop {
            let mut tx = self.begin();
            let outcome = f(&mut tx).and_then(|value| tx.commit().map(|()| value));
            let err = match outcome {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if let Err(rollback_err) = tx.rollback() {
                warn!(error = ?rollback_err, "rollback after failed transaction attempt failed");
            }
            if !err.is_retryable() || attempt >= max_retries {
                return Err(err);
            }
            attempt += 1;
            debug!(attempt, error = %err, code = err.code_str(), "retrying transaction");
        }
    }

    /// [`Database::run_in_transaction`] with the configured retry budget.
    pub fn transact<T, F>(&self, f: F) -> Result<T, EngineError>
    where
        F: FnMut(&mut Transaction) -> Result<T, EngineError>,
    {
        self.run_in_transaction(self.shared.config.max_commit_retries, f)
    }

    /// Publishes a schema change built from the latest committed state.
    fn publish<R>(
        &self,
        change: impl FnOnce(&mut CommittedState) -> Result<R, EngineError>,
    ) -> Result<R, EngineError> {
        let mut state = self.shared.state.write();
        let mut next = CommittedState::clone(&state);
        let out = change(&mut next)?;
        next.seq += 1;
        *state = Arc::new(next);
        Ok(out)
    }

    pub fn create_class(
        &self,
        name: &str,
        superclass: Option<&str>,
        properties: Vec<PropertyDef>,
    ) -> Result<ClassSchema, EngineError> {
        let class = self.publish(|next| {
            next.catalog
                .create_class(name, superclass, properties)
                .cloned()
        })?;
        info!(record_type = name, segment = class.segment, "record type created");
        Ok(class)
    }

    /// Registers an index and builds it from the committed records it covers. Transactions
    /// that began earlier fail their commit with `SchemaChanged`.
    pub fn create_index(&self, spec: IndexSpec) -> Result<IndexDefinition, EngineError> {
        let default_ignore_nulls = self.shared.config.default_ignore_nulls;
        let (definition, entries) = self.publish(|next| {
            let definition = next.catalog.create_index(spec, default_ignore_nulls)?;
            let structure = build_index(&definition, next)?;
            let entries = structure.len();
            next.indexes.insert(definition.name.clone(), structure);
            Ok((definition, entries))
        })?;
        info!(
            index = %definition.name,
            record_type = %definition.record_type,
            unique = definition.is_unique(),
            entries,
            "index created"
        );
        Ok(definition)
    }

    pub fn drop_index(&self, name: &str) -> Result<IndexDefinition, EngineError> {
        let definition = self.publish(|next| {
            let definition = next.catalog.drop_index(name)?;
            next.indexes.remove(name);
            Ok(definition)
        })?;
        info!(index = name, "index dropped");
        Ok(definition)
    }

    pub fn index(&self, name: &str) -> Result<Index, EngineError> {
        if self.shared.snapshot().index(name).is_none() {
            return Err(index_not_found(name));
        }
        Ok(Index {
            shared: Arc::clone(&self.shared),
            name: name.to_string(),
        })
    }

    /// Copy of the catalog as of the latest commit.
    pub fn catalog(&self) -> IndexCatalog {
        self.shared.snapshot().catalog.clone()
    }

    pub fn snapshot(&self) -> SnapshotReadView {
        SnapshotReadView::new(self.shared.snapshot())
    }

    /// Committed state of `rid`.
    pub fn read(&self, rid: Rid) -> Option<Record> {
        self.shared.snapshot().read_record(rid)
    }

    /// Committed records of `record_type` (and its subtypes) matching `filter`.
    pub fn query(&self, record_type: &str, filter: &Expr) -> Result<QueryResult, QueryError> {
        query::executor::execute(
            &self.snapshot(),
            record_type,
            Some(filter),
            &self.shared.config,
        )
    }

    pub fn scan(&self, record_type: &str) -> Result<QueryResult, QueryError> {
        query::executor::execute(&self.snapshot(), record_type, None, &self.shared.config)
    }

    pub fn explain(&self, record_type: &str, filter: &Expr) -> Result<ScanPlan, QueryError> {
        query::executor::explain(
            &self.snapshot(),
            record_type,
            Some(filter),
            &self.shared.config,
        )
    }
}

fn index_not_found(name: &str) -> EngineError {
    EngineError::NotFound {
        resource_type: ResourceType::Index,
        resource_id: name.to_string(),
    }
}

/// Handle to a named index. Every call reads the latest committed structure, so results
/// never include uncommitted changes and repeated calls observe later commits.
#[derive(Debug, Clone)]
pub struct Index {
    shared: Arc<SharedEngine>,
    name: String,
}

impl Index {
    pub fn name(&self) -> &str {
        &self.name
    }

    fn read<R>(&self, f: impl FnOnce(&IndexStructure) -> R) -> Result<R, EngineError> {
        let state = self.shared.snapshot();
        let structure = state
            .index(&self.name)
            .ok_or_else(|| index_not_found(&self.name))?;
        Ok(f(structure))
    }

    pub fn definition(&self) -> Result<IndexDefinition, EngineError> {
        self.shared
            .snapshot()
            .catalog
            .index(&self.name)
            .cloned()
            .ok_or_else(|| index_not_found(&self.name))
    }

    pub fn lookup(&self, key: &IndexKey) -> Result<Vec<Rid>, EngineError> {
        self.read(|s| s.lookup(key))
    }

    pub fn range_scan(
        &self,
        lower: Option<&IndexKey>,
        upper: Option<&IndexKey>,
        lower_inclusive: bool,
        upper_inclusive: bool,
        direction: Direction,
    ) -> Result<Vec<(IndexKey, Rid)>, EngineError> {
        self.read(|s| s.range_scan(lower, upper, lower_inclusive, upper_inclusive, direction))
    }

    pub fn scan_prefix(&self, prefix: &IndexKey) -> Result<Vec<(IndexKey, Rid)>, EngineError> {
        self.read(|s| s.scan_prefix(prefix))
    }

    pub fn entries(&self) -> Result<Vec<(IndexKey, Rid)>, EngineError> {
        self.read(IndexStructure::entries)
    }

    pub fn keys(&self) -> Result<Vec<IndexKey>, EngineError> {
        self.read(IndexStructure::keys)
    }

    /// Number of `(key, rid)` entries.
    pub fn len(&self) -> Result<usize, EngineError> {
        self.read(IndexStructure::len)
    }

    pub fn is_empty(&self) -> Result<bool, EngineError> {
        self.read(IndexStructure::is_empty)
    }
}
