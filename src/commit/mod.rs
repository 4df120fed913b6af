pub mod apply;
pub mod coordinator;
pub mod delta;
pub mod tx;

use crate::commit::coordinator::CommitLockTable;
use crate::config::EngineConfig;
use crate::storage::state::{CommittedState, RidAllocator};
use parking_lot::RwLock;
use std::sync::Arc;

/// State shared by a database handle and every transaction it begins.
#[derive(Debug)]
pub(crate) struct SharedEngine {
    pub(crate) state: RwLock<Arc<CommittedState>>,
    pub(crate) commit_locks: CommitLockTable,
    pub(crate) allocator: RidAllocator,
    pub(crate) config: EngineConfig,
}

impl SharedEngine {
    pub(crate) fn new(config: EngineConfig) -> Self {
        Self {
            state: RwLock::new(Arc::new(CommittedState::default())),
            commit_locks: CommitLockTable::default(),
            allocator: RidAllocator::default(),
            config,
        }
    }

    /// Current committed state. The returned value never changes; later commits publish a
    /// new one.
    pub(crate) fn snapshot(&self) -> Arc<CommittedState> {
        self.state.read().clone()
    }
}
