use crate::catalog::IndexCatalog;
use crate::catalog::types::Rid;
use crate::storage::RecordStorage;
use crate::storage::index::IndexStructure;
use crate::storage::record::Record;
use im::{HashMap, OrdMap};
use parking_lot::Mutex;

/// Everything a reader can observe: the catalog, committed records and their indexes.
/// Cloning is cheap; commits build a new value and swap it in.
#[derive(Debug, Clone, Default)]
pub struct CommittedState {
    pub catalog: IndexCatalog,
    pub records: OrdMap<Rid, Record>,
    pub indexes: HashMap<String, IndexStructure>,
    /// Number of commits published so far.
    pub seq: u64,
}

impl CommittedState {
    pub fn record(&self, rid: Rid) -> Option<&Record> {
        self.records.get(&rid)
    }

    pub fn index(&self, name: &str) -> Option<&IndexStructure> {
        self.indexes.get(name)
    }

    /// Committed records of `record_type` and its subtypes, in RID order.
    pub fn records_of_type(&self, record_type: &str) -> Vec<&Record> {
        let mut segments: Vec<i32> = self
            .catalog
            .subclasses_of(record_type)
            .iter()
            .filter_map(|name| self.catalog.class(name).map(|c| c.segment))
            .collect();
        segments.sort_unstable();
        segments
            .into_iter()
            .flat_map(|segment| {
                self.records
                    .range(Rid::new(segment, i64::MIN)..=Rid::new(segment, i64::MAX))
                    .map(|(_, record)| record)
            })
            .collect()
    }
}

impl RecordStorage for CommittedState {
    fn current_version(&self, rid: Rid) -> u64 {
        self.records.get(&rid).map(|r| r.version).unwrap_or(0)
    }

    fn read_record(&self, rid: Rid) -> Option<Record> {
        self.records.get(&rid).cloned()
    }
}

/// Hands out record positions per segment. Positions are never reused.
#[derive(Debug, Default)]
pub struct RidAllocator {
    next: Mutex<std::collections::HashMap<i32, i64>>,
}

impl RidAllocator {
    pub fn allocate(&self, segment: i32) -> Rid {
        let mut next = self.next.lock();
        let position = next.entry(segment).or_insert(0);
        let rid = Rid::new(segment, *position);
        *position += 1;
        rid
    }
}
