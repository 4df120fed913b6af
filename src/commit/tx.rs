use crate::catalog::IndexCatalog;
use crate::catalog::types::{Properties, Rid};
use crate::commit::SharedEngine;
use crate::commit::apply::{CommitRequest, commit_transaction};
use crate::commit::delta::{DeltaOp, IndexDelta, StagedDeltas, compute_delta};
use crate::error::{CommitError, EngineError, ResourceType};
use crate::storage::RecordStorage;
use crate::storage::index::{Direction, IndexStructure};
use crate::storage::key::IndexKey;
use crate::storage::record::Record;
use crate::storage::state::CommittedState;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committing,
    Committed,
    RolledBack,
    /// Commit was attempted and rejected; only rollback remains.
    Failed,
}

impl TransactionState {
    pub fn as_str(self) -> &'static str {
        match self {
            TransactionState::Active => "active",
            TransactionState::Committing => "committing",
            TransactionState::Committed => "committed",
            TransactionState::RolledBack => "rolled_back",
            TransactionState::Failed => "failed",
        }
    }
}

/// Unit of isolated work. Writes and their index deltas stay private until `commit`;
/// dropping an unresolved transaction rolls it back.
#[derive(Debug)]
pub struct Transaction {
    engine: Arc<SharedEngine>,
    /// Committed state when the transaction began; index definitions are taken from here.
    begin_state: Arc<CommittedState>,
    state: TransactionState,
    base_versions: BTreeMap<Rid, u64>,
    staged_writes: BTreeMap<Rid, Option<Record>>,
    staged_deltas: StagedDeltas,
}

impl Transaction {
    pub(crate) fn begin(engine: Arc<SharedEngine>) -> Self {
        let begin_state = engine.snapshot();
        Self {
            engine,
            begin_state,
            state: TransactionState::Active,
            base_versions: BTreeMap::new(),
            staged_writes: BTreeMap::new(),
            staged_deltas: StagedDeltas::default(),
        }
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.begin_state.catalog
    }

    /// Number of records touched so far.
    pub fn touched(&self) -> usize {
        self.staged_writes.len()
    }

    /// Net index entries this transaction would add or remove.
    pub fn pending_index_changes(&self) -> usize {
        self.staged_deltas.len()
    }

    fn ensure_active(&self, operation: &'static str) -> Result<(), EngineError> {
        if self.state != TransactionState::Active {
            return Err(EngineError::InvalidState {
                state: self.state.as_str(),
                operation,
            });
        }
        Ok(())
    }

    /// Latest state of `rid` as this transaction sees it: staged if touched, else committed.
    fn current(&self, rid: Rid) -> Option<Record> {
        match self.staged_writes.get(&rid) {
            Some(staged) => staged.clone(),
            None => self.engine.snapshot().read_record(rid),
        }
    }

    fn deltas_for(
        &self,
        record_type: &str,
        before: Option<&Record>,
        after: Option<&Record>,
    ) -> Result<Vec<IndexDelta>, EngineError> {
        let mut out = Vec::new();
        for definition in self.begin_state.catalog.indexes_for_type(record_type) {
            out.extend(compute_delta(definition, before, after)?);
        }
        Ok(out)
    }

    fn stage(&mut self, rid: Rid, base: u64, write: Option<Record>, deltas: Vec<IndexDelta>) {
        self.base_versions.entry(rid).or_insert(base);
        self.staged_deltas.merge_all(deltas);
        self.staged_writes.insert(rid, write);
    }

    /// Stages a new state for `record`. Its `version` is the version the caller observed and
    /// is checked against the committed version at commit time.
    pub fn write(&mut self, record: Record) -> Result<(), EngineError> {
        self.ensure_active("write")?;
        let class = self
            .begin_state
            .catalog
            .class(&record.record_type)
            .ok_or_else(|| EngineError::NotFound {
                resource_type: ResourceType::RecordType,
                resource_id: record.record_type.clone(),
            })?;
        if class.segment != record.rid.segment {
            return Err(EngineError::Validation(format!(
                "record {} does not belong to record type '{}'",
                record.rid, record.record_type
            )));
        }
        let before = self.current(record.rid);
        if let Some(previous) = &before
            && previous.record_type != record.record_type
        {
            return Err(EngineError::Validation(format!(
                "record {} cannot change type from '{}' to '{}'",
                record.rid, previous.record_type, record.record_type
            )));
        }
        let deltas = self.deltas_for(&record.record_type, before.as_ref(), Some(&record))?;
        self.stage(record.rid, record.version, Some(record), deltas);
        Ok(())
    }

    /// Allocates a RID in `record_type`'s segment and stages a new record there.
    pub fn create(&mut self, record_type: &str, properties: Properties) -> Result<Rid, EngineError> {
        self.ensure_active("create")?;
        let segment = self
            .begin_state
            .catalog
            .class(record_type)
            .map(|c| c.segment)
            .ok_or_else(|| EngineError::NotFound {
                resource_type: ResourceType::RecordType,
                resource_id: record_type.to_string(),
            })?;
        let rid = self.engine.allocator.allocate(segment);
        let record = Record {
            rid,
            record_type: record_type.to_string(),
            version: 0,
            properties,
        };
        self.write(record)?;
        Ok(rid)
    }

    /// Stages removal of `record`. As with `write`, its `version` is the version the caller
    /// observed; a newer committed version fails the commit.
    pub fn delete(&mut self, record: &Record) -> Result<(), EngineError> {
        self.ensure_active("delete")?;
        let rid = record.rid;
        let before = self.current(rid).ok_or_else(|| EngineError::NotFound {
            resource_type: ResourceType::Record,
            resource_id: rid.to_string(),
        })?;
        let deltas = self.deltas_for(&before.record_type, Some(&before), None)?;
        self.stage(rid, record.version, None, deltas);
        Ok(())
    }

    /// Staged state of `rid` if this transaction touched it, otherwise the committed record.
    pub fn read(&self, rid: Rid) -> Option<Record> {
        self.current(rid)
    }

    /// Committed index `name` with this transaction's staged changes applied.
    fn overlaid_index(&self, name: &str) -> Result<IndexStructure, EngineError> {
        let mut structure = self
            .engine
            .snapshot()
            .index(name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                resource_type: ResourceType::Index,
                resource_id: name.to_string(),
            })?;
        if let Some(ops) = self.staged_deltas.ops(name) {
            for ((key, rid), op) in ops {
                if *op == DeltaOp::Remove {
                    structure.remove(key, rid);
                }
            }
            for ((key, rid), op) in ops {
                if *op == DeltaOp::Add {
                    structure.insert_unchecked(key.clone(), *rid);
                }
            }
        }
        Ok(structure)
    }

    pub fn index_lookup(&self, index: &str, key: &IndexKey) -> Result<Vec<Rid>, EngineError> {
        Ok(self.overlaid_index(index)?.lookup(key))
    }

    pub fn index_range(
        &self,
        index: &str,
        lower: Option<&IndexKey>,
        upper: Option<&IndexKey>,
        lower_inclusive: bool,
        upper_inclusive: bool,
        direction: Direction,
    ) -> Result<Vec<(IndexKey, Rid)>, EngineError> {
        Ok(self.overlaid_index(index)?.range_scan(
            lower,
            upper,
            lower_inclusive,
            upper_inclusive,
            direction,
        ))
    }

    /// Publishes every staged write and index change atomically, or nothing.
    pub fn commit(&mut self) -> Result<(), CommitError> {
        self.ensure_active("commit")?;
        self.state = TransactionState::Committing;
        let result = commit_transaction(
            &self.engine,
            CommitRequest {
                catalog_version: self.begin_state.catalog.version(),
                base_versions: &self.base_versions,
                staged_writes: &self.staged_writes,
                staged_deltas: &self.staged_deltas,
            },
        );
        match result {
            Ok(seq) => {
                debug!(
                    seq,
                    records = self.staged_writes.len(),
                    index_changes = self.staged_deltas.len(),
                    "transaction committed"
                );
                self.state = TransactionState::Committed;
                self.discard();
                Ok(())
            }
            Err(err) => {
                debug!(error = %err, code = err.code_str(), "transaction commit failed");
                self.state = TransactionState::Failed;
                Err(err)
            }
        }
    }

    /// Discards staged work. Repeating it is a no-op; rolling back a committed transaction
    /// is an error.
    pub fn rollback(&mut self) -> Result<(), EngineError> {
        match self.state {
            TransactionState::RolledBack => Ok(()),
            TransactionState::Committed | TransactionState::Committing => {
                Err(EngineError::InvalidState {
                    state: self.state.as_str(),
                    operation: "roll back",
                })
            }
            TransactionState::Active | TransactionState::Failed => {
                self.discard();
                self.state = TransactionState::RolledBack;
                Ok(())
            }
        }
    }

    fn discard(&mut self) {
        self.base_versions.clear();
        self.staged_writes.clear();
        self.staged_deltas.clear();
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if matches!(
            self.state,
            TransactionState::Active | TransactionState::Failed
        ) {
            debug!(
                state = self.state.as_str(),
                records = self.staged_writes.len(),
                "rolling back unresolved transaction on drop"
            );
            self.discard();
            self.state = TransactionState::RolledBack;
        }
    }
}
