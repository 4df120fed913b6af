use crate::catalog::schema::{FieldRole, FieldSpec, IndexDefinition};
use crate::catalog::types::{Rid, Value, ValueType};
use crate::error::EngineError;
use crate::storage::key::IndexKey;
use crate::storage::record::Record;
use std::collections::{BTreeMap, BTreeSet};

/// `Remove` sorts before `Add`; applying deltas in order frees unique keys before reuse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum DeltaOp {
    Remove,
    Add,
}

impl DeltaOp {
    fn inverse(self) -> Self {
        match self {
            DeltaOp::Remove => DeltaOp::Add,
            DeltaOp::Add => DeltaOp::Remove,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDelta {
    pub index: String,
    pub op: DeltaOp,
    pub key: IndexKey,
    pub rid: Rid,
}

/// Index entries to add and remove so that `definition` reflects `after` instead of `before`.
///
/// `None` on either side means the record is absent (creation or deletion). Unchanged keys
/// produce nothing; removes come first, each group in key order.
pub fn compute_delta(
    definition: &IndexDefinition,
    before: Option<&Record>,
    after: Option<&Record>,
) -> Result<Vec<IndexDelta>, EngineError> {
    let Some(rid) = after.or(before).map(|r| r.rid) else {
        return Ok(Vec::new());
    };
    let before_keys = match before {
        Some(record) => index_keys(definition, record)?,
        None => BTreeSet::new(),
    };
    let after_keys = match after {
        Some(record) => index_keys(definition, record)?,
        None => BTreeSet::new(),
    };

    let removed = before_keys.difference(&after_keys).map(|key| IndexDelta {
        index: definition.name.clone(),
        op: DeltaOp::Remove,
        key: key.clone(),
        rid,
    });
    let added = after_keys.difference(&before_keys).map(|key| IndexDelta {
        index: definition.name.clone(),
        op: DeltaOp::Add,
        key: key.clone(),
        rid,
    });
    Ok(removed.chain(added).collect())
}

/// Every key `record` contributes to `definition`.
pub fn index_keys(
    definition: &IndexDefinition,
    record: &Record,
) -> Result<BTreeSet<IndexKey>, EngineError> {
    let mut keys = vec![IndexKey::default()];
    for (position, field) in definition.fields.iter().enumerate() {
        let key_type = definition
            .key_types
            .get(position)
            .copied()
            .unwrap_or(ValueType::Any);
        let contributions = field_contributions(definition, field, key_type, record)?;
        if contributions.is_empty() {
            return Ok(BTreeSet::new());
        }
        keys = keys
            .into_iter()
            .flat_map(|prefix| {
                contributions.iter().map(move |value| {
                    let mut key = prefix.clone();
                    key.push(value.clone());
                    key
                })
            })
            .collect();
    }
    Ok(keys
        .into_iter()
        .filter(|key| !(definition.ignore_nulls && key.has_null()))
        .collect())
}

fn field_contributions(
    definition: &IndexDefinition,
    field: &FieldSpec,
    key_type: ValueType,
    record: &Record,
) -> Result<Vec<Value>, EngineError> {
    let mismatch = |reason: String| EngineError::DefinitionMismatch {
        index: definition.name.clone(),
        field: field.property_path.clone(),
        reason,
    };
    let value = record.get_or_null(&field.property_path);
    let raw = match (field.role, value) {
        (_, Value::Null) => vec![Value::Null],
        (FieldRole::Scalar, value) => vec![value.clone()],
        (FieldRole::CollectionElement, value) => match value.collection_elements() {
            Some(elements) => elements,
            None => {
                return Err(mismatch(format!(
                    "collection element role applied to {} value",
                    value.type_name()
                )));
            }
        },
        (FieldRole::MapKey, Value::Map(entries)) => {
            entries.keys().map(|k| Value::string(k.as_str())).collect()
        }
        (FieldRole::MapValue, Value::Map(entries)) => entries.values().cloned().collect(),
        (FieldRole::MapKey | FieldRole::MapValue, value) => {
            return Err(mismatch(format!(
                "map role applied to {} value",
                value.type_name()
            )));
        }
    };

    // An empty collection still places the record in a composite index, under a null
    // component; a single-field index simply gets no entry.
    if raw.is_empty() {
        return Ok(if definition.is_composite() {
            vec![Value::Null]
        } else {
            Vec::new()
        });
    }

    let mut out = BTreeSet::new();
    for contribution in raw {
        let coerced = contribution.coerce_to(key_type).ok_or_else(|| {
            mismatch(format!(
                "{} value {contribution} does not match key type {key_type}",
                contribution.type_name()
            ))
        })?;
        out.insert(coerced);
    }
    Ok(out.into_iter().collect())
}

/// Net index changes staged by one transaction. Opposite operations on the same
/// `(key, rid)` cancel, so the map always describes the difference from committed state.
#[derive(Debug, Clone, Default)]
pub struct StagedDeltas {
    by_index: BTreeMap<String, BTreeMap<(IndexKey, Rid), DeltaOp>>,
}

impl StagedDeltas {
    pub fn merge(&mut self, delta: IndexDelta) {
        let ops = self.by_index.entry(delta.index).or_default();
        let entry = (delta.key, delta.rid);
        match ops.get(&entry) {
            Some(existing) if *existing == delta.op.inverse() => {
                ops.remove(&entry);
            }
            _ => {
                ops.insert(entry, delta.op);
            }
        }
    }

    pub fn merge_all<I: IntoIterator<Item = IndexDelta>>(&mut self, deltas: I) {
        for delta in deltas {
            self.merge(delta);
        }
    }

    pub fn ops(&self, index: &str) -> Option<&BTreeMap<(IndexKey, Rid), DeltaOp>> {
        self.by_index.get(index).filter(|ops| !ops.is_empty())
    }

    /// Names of indexes with at least one pending change, sorted.
    pub fn touched_indexes(&self) -> Vec<String> {
        self.by_index
            .iter()
            .filter(|(_, ops)| !ops.is_empty())
            .map(|(name, _)| name.clone())
            .collect()
    }

    /// All pending changes for `index` with removes ahead of adds.
    pub fn ordered(&self, index: &str) -> Vec<IndexDelta> {
        let Some(ops) = self.by_index.get(index) else {
            return Vec::new();
        };
        let mut out: Vec<IndexDelta> = ops
            .iter()
            .map(|((key, rid), op)| IndexDelta {
                index: index.to_string(),
                op: *op,
                key: key.clone(),
                rid: *rid,
            })
            .collect();
        out.sort_by(|a, b| a.op.cmp(&b.op));
        out
    }

    pub fn len(&self) -> usize {
        self.by_index.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&mut self) {
        self.by_index.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::{DeltaOp, IndexDelta, StagedDeltas, compute_delta, index_keys};
    use crate::catalog::schema::{FieldSpec, IndexDefinition, Uniqueness};
    use crate::catalog::types::{Rid, Value, ValueType};
    use crate::error::EngineErrorCode;
    use crate::storage::key::IndexKey;
    use crate::storage::record::Record;

    fn definition(fields: Vec<FieldSpec>, key_types: Vec<ValueType>) -> IndexDefinition {
        IndexDefinition {
            name: "idx".into(),
            record_type: "Doc".into(),
            uniqueness: Uniqueness::NotUnique,
            fields,
            key_types,
            ignore_nulls: false,
            ordinal: 0,
        }
    }

    fn doc() -> Record {
        Record::new(Rid::new(1, 0), "Doc")
    }

    fn ops(deltas: &[IndexDelta]) -> Vec<(DeltaOp, IndexKey)> {
        deltas.iter().map(|d| (d.op, d.key.clone())).collect()
    }

    #[test]
    fn identical_records_produce_no_delta() {
        let def = definition(vec![FieldSpec::element("tags")], vec![ValueType::String]);
        let record = doc().with("tags", Value::list(["a", "b"]));
        let deltas = compute_delta(&def, Some(&record), Some(&record)).expect("delta");
        assert!(deltas.is_empty());
    }

    #[test]
    fn collection_fan_out_and_partial_edit() {
        let def = definition(vec![FieldSpec::element("tags")], vec![ValueType::String]);
        let created = doc().with("tags", Value::list(["a", "b", "c"]));
        let deltas = compute_delta(&def, None, Some(&created)).expect("create");
        assert_eq!(deltas.len(), 3);
        assert!(deltas.iter().all(|d| d.op == DeltaOp::Add));

        let edited = doc().with("tags", Value::list(["a", "c", "d"]));
        let deltas = compute_delta(&def, Some(&created), Some(&edited)).expect("edit");
        assert_eq!(
            ops(&deltas),
            vec![
                (DeltaOp::Remove, IndexKey::single("b")),
                (DeltaOp::Add, IndexKey::single("d")),
            ]
        );
    }

    #[test]
    fn deletion_removes_every_contributed_key() {
        let def = definition(vec![FieldSpec::map_key("scores")], vec![ValueType::String]);
        let record = doc().with("scores", Value::map([("x", 1i64), ("y", 2i64)]));
        let deltas = compute_delta(&def, Some(&record), None).expect("delete");
        assert_eq!(
            ops(&deltas),
            vec![
                (DeltaOp::Remove, IndexKey::single("x")),
                (DeltaOp::Remove, IndexKey::single("y")),
            ]
        );
    }

    #[test]
    fn duplicate_map_values_collapse() {
        let def = definition(vec![FieldSpec::map_value("scores")], vec![ValueType::Integer]);
        let record = doc().with("scores", Value::map([("x", 7i64), ("y", 7i64)]));
        let keys = index_keys(&def, &record).expect("keys");
        assert_eq!(keys.len(), 1);
    }

    #[test]
    fn composite_is_cartesian_product() {
        let def = definition(
            vec![FieldSpec::scalar("owner"), FieldSpec::element("tags")],
            vec![ValueType::String, ValueType::String],
        );
        let record = doc()
            .with("owner", "ann")
            .with("tags", Value::list(["a", "b"]));
        let keys: Vec<IndexKey> = index_keys(&def, &record).expect("keys").into_iter().collect();
        assert_eq!(
            keys,
            vec![
                IndexKey::new([Value::string("ann"), Value::string("a")]),
                IndexKey::new([Value::string("ann"), Value::string("b")]),
            ]
        );
    }

    #[test]
    fn null_components_follow_ignore_nulls() {
        let mut def = definition(
            vec![FieldSpec::scalar("a"), FieldSpec::scalar("b")],
            vec![ValueType::Integer, ValueType::Integer],
        );
        let record = doc().with("a", 1i64);
        let keys = index_keys(&def, &record).expect("keys");
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec![IndexKey::new([Value::Integer(1), Value::Null])]
        );
        def.ignore_nulls = true;
        assert!(index_keys(&def, &record).expect("keys").is_empty());
    }

    #[test]
    fn empty_collection_yields_null_only_in_composites() {
        let single = definition(vec![FieldSpec::element("tags")], vec![ValueType::String]);
        let record = doc().with("owner", "ann").with("tags", Value::List(Vec::new()));
        assert!(index_keys(&single, &record).expect("keys").is_empty());

        let composite = definition(
            vec![FieldSpec::scalar("owner"), FieldSpec::element("tags")],
            vec![ValueType::String, ValueType::String],
        );
        let keys = index_keys(&composite, &record).expect("keys");
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec![IndexKey::new([Value::string("ann"), Value::Null])]
        );
    }

    #[test]
    fn role_and_type_mismatches_are_reported() {
        let def = definition(vec![FieldSpec::element("tags")], vec![ValueType::String]);
        let scalar = doc().with("tags", "not-a-list");
        let err = compute_delta(&def, None, Some(&scalar)).expect_err("role");
        assert_eq!(err.code(), EngineErrorCode::DefinitionMismatch);

        let wrong_type = doc().with("tags", Value::list([1i64]));
        let err = compute_delta(&def, None, Some(&wrong_type)).expect_err("type");
        assert_eq!(err.code(), EngineErrorCode::DefinitionMismatch);

        let map_def = definition(vec![FieldSpec::map_key("m")], vec![ValueType::String]);
        let err = compute_delta(&map_def, None, Some(&doc().with("m", Value::list(["a"]))))
            .expect_err("map role");
        assert_eq!(err.code(), EngineErrorCode::DefinitionMismatch);
    }

    #[test]
    fn integers_widen_into_float_keys() {
        let def = definition(vec![FieldSpec::scalar("score")], vec![ValueType::Float]);
        let keys = index_keys(&def, &doc().with("score", 3i64)).expect("keys");
        assert_eq!(
            keys.into_iter().collect::<Vec<_>>(),
            vec![IndexKey::single(3.0f64)]
        );
    }

    #[test]
    fn staged_opposites_cancel() {
        let mut staged = StagedDeltas::default();
        let add = IndexDelta {
            index: "idx".into(),
            op: DeltaOp::Add,
            key: IndexKey::single("a"),
            rid: Rid::new(1, 0),
        };
        let remove = IndexDelta {
            op: DeltaOp::Remove,
            ..add.clone()
        };
        staged.merge(add.clone());
        staged.merge(remove);
        assert!(staged.is_empty());
        assert!(staged.touched_indexes().is_empty());

        staged.merge(add);
        staged.merge(IndexDelta {
            index: "idx".into(),
            op: DeltaOp::Remove,
            key: IndexKey::single("z"),
            rid: Rid::new(1, 1),
        });
        let ordered = staged.ordered("idx");
        assert_eq!(ordered[0].op, DeltaOp::Remove);
        assert_eq!(ordered[1].op, DeltaOp::Add);
        assert_eq!(staged.len(), 2);
    }
}
