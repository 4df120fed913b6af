use crate::catalog::schema::IndexDefinition;
use crate::catalog::types::Rid;
use crate::error::EngineError;
use crate::storage::key::IndexKey;
use im::{OrdMap, OrdSet};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Bound;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    #[default]
    Ascending,
    Descending,
}

/// Ordered `key -> {rid}` map backing one index definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStructure {
    name: String,
    unique: bool,
    entries: OrdMap<IndexKey, OrdSet<Rid>>,
    size: usize,
}

impl IndexStructure {
    pub fn new(name: &str, unique: bool) -> Self {
        Self {
            name: name.to_string(),
            unique,
            entries: OrdMap::new(),
            size: 0,
        }
    }

    pub fn for_definition(definition: &IndexDefinition) -> Self {
        Self::new(&definition.name, definition.is_unique())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_unique(&self) -> bool {
        self.unique
    }

    /// Adds `(key, rid)`. Returns `false` when the pair was already present.
    pub fn insert(&mut self, key: IndexKey, rid: Rid) -> Result<bool, EngineError> {
        let mut rids = self.entries.get(&key).cloned().unwrap_or_default();
        if rids.contains(&rid) {
            return Ok(false);
        }
        if self.unique
            && let Some(existing) = rids.get_min().copied()
        {
            return Err(EngineError::UniquenessViolation {
                index: self.name.clone(),
                key: key.to_string(),
                existing,
                incoming: rid,
            });
        }
        rids.insert(rid);
        self.entries.insert(key, rids);
        self.size += 1;
        Ok(true)
    }

    /// Adds `(key, rid)` without the uniqueness check. Used for uncommitted overlays.
    pub(crate) fn insert_unchecked(&mut self, key: IndexKey, rid: Rid) {
        let mut rids = self.entries.get(&key).cloned().unwrap_or_default();
        if rids.insert(rid).is_none() {
            self.size += 1;
        }
        self.entries.insert(key, rids);
    }

    /// Removes `(key, rid)`. Returns `false` when the pair was absent.
    pub fn remove(&mut self, key: &IndexKey, rid: &Rid) -> bool {
        let Some(mut rids) = self.entries.get(key).cloned() else {
            return false;
        };
        if rids.remove(rid).is_none() {
            return false;
        }
        if rids.is_empty() {
            self.entries.remove(key);
        } else {
            self.entries.insert(key.clone(), rids);
        }
        self.size -= 1;
        true
    }

    pub fn lookup(&self, key: &IndexKey) -> Vec<Rid> {
        self.entries
            .get(key)
            .map(|rids| rids.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn contains(&self, key: &IndexKey, rid: &Rid) -> bool {
        self.entries
            .get(key)
            .is_some_and(|rids| rids.contains(rid))
    }

    /// Ordered scan between two bounds. A bound with fewer components than the stored keys
    /// constrains only the leading components, which is how composite prefixes are ranged.
    pub fn range_scan(
        &self,
        lower: Option<&IndexKey>,
        upper: Option<&IndexKey>,
        lower_inclusive: bool,
        upper_inclusive: bool,
        direction: Direction,
    ) -> Vec<(IndexKey, Rid)> {
        let start = match lower {
            Some(bound) => Bound::Included(bound.clone()),
            None => Bound::Unbounded,
        };
        let mut out = Vec::new();
        for (key, rids) in self.entries.range((start, Bound::Unbounded)) {
            if let Some(bound) = lower
                && !lower_inclusive
                && key.prefix_cmp(bound) == Ordering::Equal
            {
                continue;
            }
            if let Some(bound) = upper {
                match key.prefix_cmp(bound) {
                    Ordering::Less => {}
                    Ordering::Equal if upper_inclusive => {}
                    _ => break,
                }
            }
            out.extend(rids.iter().map(|rid| (key.clone(), *rid)));
        }
        if direction == Direction::Descending {
            out.reverse();
        }
        out
    }

    pub fn scan_prefix(&self, prefix: &IndexKey) -> Vec<(IndexKey, Rid)> {
        self.range_scan(Some(prefix), Some(prefix), true, true, Direction::Ascending)
    }

    pub fn entries(&self) -> Vec<(IndexKey, Rid)> {
        self.range_scan(None, None, true, true, Direction::Ascending)
    }

    pub fn keys(&self) -> Vec<IndexKey> {
        self.entries.keys().cloned().collect()
    }

    /// Number of `(key, rid)` entries.
    pub fn len(&self) -> usize {
        self.size
    }

    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    pub fn key_count(&self) -> usize {
        self.entries.len()
    }
}
