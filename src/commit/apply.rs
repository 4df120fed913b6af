use crate::catalog::schema::IndexDefinition;
use crate::catalog::types::Rid;
use crate::commit::SharedEngine;
use crate::commit::coordinator::LockToken;
use crate::commit::delta::{DeltaOp, IndexDelta, StagedDeltas, compute_delta};
use crate::error::{EngineError, ResourceType};
use crate::storage::RecordStorage;
use crate::storage::index::IndexStructure;
use crate::storage::record::Record;
use crate::storage::state::CommittedState;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Everything a transaction hands to the commit path.
pub(crate) struct CommitRequest<'a> {
    pub catalog_version: u64,
    pub base_versions: &'a BTreeMap<Rid, u64>,
    pub staged_writes: &'a BTreeMap<Rid, Option<Record>>,
    pub staged_deltas: &'a StagedDeltas,
}

/// Applies `deltas` to `structure`: every remove, then every add.
pub fn apply_deltas(
    structure: &mut IndexStructure,
    deltas: &[IndexDelta],
) -> Result<(), EngineError> {
    for delta in deltas.iter().filter(|d| d.op == DeltaOp::Remove) {
        structure.remove(&delta.key, &delta.rid);
    }
    for delta in deltas.iter().filter(|d| d.op == DeltaOp::Add) {
        structure.insert(delta.key.clone(), delta.rid)?;
    }
    Ok(())
}

/// Builds a fresh structure for `definition` from every committed record it covers.
pub fn build_index(
    definition: &IndexDefinition,
    state: &CommittedState,
) -> Result<IndexStructure, EngineError> {
    let mut structure = IndexStructure::for_definition(definition);
    for record in state.records_of_type(&definition.record_type) {
        let deltas = compute_delta(definition, None, Some(record))?;
        apply_deltas(&mut structure, &deltas)?;
    }
    Ok(structure)
}

/// Validates and publishes a transaction's staged work. On error nothing is published.
/// Returns the commit sequence number.
pub(crate) fn commit_transaction(
    engine: &SharedEngine,
    request: CommitRequest<'_>,
) -> Result<u64, EngineError> {
    let touched_indexes = request.staged_deltas.touched_indexes();
    let tokens: Vec<LockToken> = touched_indexes
        .iter()
        .cloned()
        .map(LockToken::Index)
        .chain(request.base_versions.keys().copied().map(LockToken::Record))
        .collect();
    let _locks = engine.commit_locks.lock_all(
        &tokens,
        Duration::from_millis(engine.config.commit_lock_timeout_ms),
    )?;

    let snapshot = engine.snapshot();
    for (rid, expected) in request.base_versions {
        let actual = snapshot.current_version(*rid);
        if actual != *expected {
            debug!(%rid, expected, actual, "commit rejected: concurrent modification");
            return Err(EngineError::ConcurrentModification {
                rid: *rid,
                expected: *expected,
                actual,
            });
        }
    }
    if snapshot.catalog.version() != request.catalog_version {
        debug!(
            begin_version = request.catalog_version,
            current_version = snapshot.catalog.version(),
            "commit rejected: schema changed"
        );
        return Err(EngineError::SchemaChanged);
    }

    let mut rebuilt = Vec::with_capacity(touched_indexes.len());
    for name in touched_indexes {
        let mut structure = snapshot
            .index(&name)
            .cloned()
            .ok_or_else(|| EngineError::NotFound {
                resource_type: ResourceType::Index,
                resource_id: name.clone(),
            })?;
        apply_deltas(&mut structure, &request.staged_deltas.ordered(&name))?;
        rebuilt.push((name, structure));
    }

    let mut written = Vec::with_capacity(request.staged_writes.len());
    for (rid, write) in request.staged_writes {
        let base = request.base_versions.get(rid).copied().unwrap_or(0);
        let published = write.as_ref().map(|record| {
            let mut record = record.clone();
            record.version = base + 1;
            record
        });
        written.push((*rid, published));
    }

    let mut state = engine.state.write();
    // A schema change published since validation would leave the new index stale.
    if state.catalog.version() != request.catalog_version {
        return Err(EngineError::SchemaChanged);
    }
    let mut next = CommittedState::clone(&state);
    for (name, structure) in rebuilt {
        next.indexes.insert(name, structure);
    }
    for (rid, published) in written {
        match published {
            Some(record) => {
                next.records.insert(rid, record);
            }
            None => {
                next.records.remove(&rid);
            }
        }
    }
    next.seq += 1;
    let seq = next.seq;
    *state = Arc::new(next);
    Ok(seq)
}

#[cfg(test)]
mod tests {
    use super::{apply_deltas, build_index};
    use crate::catalog::schema::{FieldSpec, IndexSpec, PropertyDef, Uniqueness};
    use crate::catalog::types::{Rid, Value, ValueType};
    use crate::commit::delta::{DeltaOp, IndexDelta};
    use crate::error::EngineErrorCode;
    use crate::storage::index::IndexStructure;
    use crate::storage::key::IndexKey;
    use crate::storage::record::Record;
    use crate::storage::state::CommittedState;

    fn delta(op: DeltaOp, key: &str, rid: Rid) -> IndexDelta {
        IndexDelta {
            index: "email".into(),
            op,
            key: IndexKey::single(key),
            rid,
        }
    }

    #[test]
    fn unique_key_can_move_between_records() {
        let a = Rid::new(1, 0);
        let b = Rid::new(1, 1);
        let mut idx = IndexStructure::new("email", true);
        idx.insert(IndexKey::single("x"), a).expect("seed");
        idx.insert(IndexKey::single("y"), b).expect("seed");

        // adds listed first on purpose; removes must still run before them
        let swap = vec![
            delta(DeltaOp::Add, "y", a),
            delta(DeltaOp::Add, "x", b),
            delta(DeltaOp::Remove, "x", a),
            delta(DeltaOp::Remove, "y", b),
        ];
        apply_deltas(&mut idx, &swap).expect("swap");
        assert_eq!(idx.lookup(&IndexKey::single("x")), vec![b]);
        assert_eq!(idx.lookup(&IndexKey::single("y")), vec![a]);
    }

    #[test]
    fn conflicting_add_is_a_uniqueness_violation() {
        let mut idx = IndexStructure::new("email", true);
        idx.insert(IndexKey::single("x"), Rid::new(1, 0))
            .expect("seed");
        let err = apply_deltas(&mut idx, &[delta(DeltaOp::Add, "x", Rid::new(1, 1))])
            .expect_err("duplicate");
        assert_eq!(err.code(), EngineErrorCode::UniquenessViolation);
    }

    #[test]
    fn build_covers_existing_records() {
        let mut state = CommittedState::default();
        let segment = state
            .catalog
            .create_class(
                "Person",
                None,
                vec![
                    PropertyDef::new("tags", ValueType::EmbeddedList)
                        .with_linked_type(ValueType::String),
                ],
            )
            .expect("class")
            .segment;
        for (pos, tags) in [vec!["a", "b"], vec!["b"]].into_iter().enumerate() {
            let mut record =
                Record::new(Rid::new(segment, pos as i64), "Person").with("tags", Value::list(tags));
            record.version = 1;
            state.records.insert(record.rid, record);
        }
        let definition = state
            .catalog
            .create_index(
                IndexSpec::new("Person.tags", "Person", Uniqueness::NotUnique)
                    .field(FieldSpec::element("tags")),
                false,
            )
            .expect("definition");
        let built = build_index(&definition, &state).expect("build");
        assert_eq!(built.len(), 3);
        assert_eq!(built.lookup(&IndexKey::single("b")).len(), 2);
    }
}
