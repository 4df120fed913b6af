pub mod index;
pub mod key;
pub mod record;
pub mod state;

use crate::catalog::types::Rid;
use crate::storage::record::Record;

/// Authoritative record versions as seen by the commit path.
pub trait RecordStorage {
    /// Committed version of `rid`, or 0 when no committed record exists.
    fn current_version(&self, rid: Rid) -> u64;

    fn read_record(&self, rid: Rid) -> Option<Record>;
}
