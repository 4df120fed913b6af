use crate::catalog::IndexCatalog;
use crate::catalog::types::Rid;
use crate::storage::RecordStorage;
use crate::storage::index::IndexStructure;
use crate::storage::record::Record;
use crate::storage::state::CommittedState;
use std::sync::Arc;

/// Immutable view of the committed state at one commit sequence number.
#[derive(Debug, Clone)]
pub struct SnapshotReadView {
    state: Arc<CommittedState>,
}

impl SnapshotReadView {
    pub fn new(state: Arc<CommittedState>) -> Self {
        Self { state }
    }

    pub fn seq(&self) -> u64 {
        self.state.seq
    }

    pub fn catalog(&self) -> &IndexCatalog {
        &self.state.catalog
    }

    pub fn record(&self, rid: Rid) -> Option<&Record> {
        self.state.record(rid)
    }

    pub fn index(&self, name: &str) -> Option<&IndexStructure> {
        self.state.index(name)
    }

    pub fn records_of_type(&self, record_type: &str) -> Vec<&Record> {
        self.state.records_of_type(record_type)
    }

    pub fn state(&self) -> &CommittedState {
        &self.state
    }
}

impl RecordStorage for SnapshotReadView {
    fn current_version(&self, rid: Rid) -> u64 {
        self.state.current_version(rid)
    }

    fn read_record(&self, rid: Rid) -> Option<Record> {
        self.state.read_record(rid)
    }
}
