use crate::catalog::types::{Rid, Value};
use crate::config::EngineConfig;
use crate::error::{EngineError, ResourceType};
use crate::query::error::QueryError;
use crate::query::operators::{FilterOperator, Operator, ScanOperator};
use crate::query::plan::{Expr, ScanPlan};
use crate::query::planner::{PlannerLimits, plan_with_limits};
use crate::snapshot::SnapshotReadView;
use crate::storage::index::{Direction, IndexStructure};
use crate::storage::key::IndexKey;
use crate::storage::record::Record;
use std::collections::BTreeSet;
use tracing::trace;

#[derive(Debug, Clone)]
pub struct QueryResult {
    pub records: Vec<Record>,
    pub plan: ScanPlan,
    /// Candidate records fetched before residual filtering.
    pub rows_examined: usize,
    pub snapshot_seq: u64,
}

/// Plans `filter` against the indexes visible to `record_type` without running it.
pub fn explain(
    view: &SnapshotReadView,
    record_type: &str,
    filter: Option<&Expr>,
    config: &EngineConfig,
) -> Result<ScanPlan, QueryError> {
    let catalog = view.catalog();
    if catalog.class(record_type).is_none() {
        return Err(QueryError::UnknownRecordType {
            record_type: record_type.to_string(),
        });
    }
    match filter {
        Some(filter) => {
            let indexes = catalog.indexes_for_type(record_type);
            plan_with_limits(filter, &indexes, PlannerLimits::from(config))
        }
        None => Ok(ScanPlan::FullScan { residual: None }),
    }
}

/// Runs a filter over the committed records of `record_type` and its subtypes.
pub fn execute(
    view: &SnapshotReadView,
    record_type: &str,
    filter: Option<&Expr>,
    config: &EngineConfig,
) -> Result<QueryResult, QueryError> {
    let plan = explain(view, record_type, filter, config)?;
    let mut run = Execution {
        view,
        record_type,
        max_scan_rows: config.max_scan_rows,
        seen: BTreeSet::new(),
        records: Vec::new(),
        rows_examined: 0,
    };
    run.run(&plan)?;
    trace!(
        record_type,
        rows_examined = run.rows_examined,
        matched = run.records.len(),
        "query executed"
    );
    Ok(QueryResult {
        records: run.records,
        rows_examined: run.rows_examined,
        snapshot_seq: view.seq(),
        plan,
    })
}

struct Execution<'a> {
    view: &'a SnapshotReadView,
    record_type: &'a str,
    max_scan_rows: usize,
    seen: BTreeSet<Rid>,
    records: Vec<Record>,
    rows_examined: usize,
}

impl Execution<'_> {
    fn run(&mut self, plan: &ScanPlan) -> Result<(), QueryError> {
        match plan {
            ScanPlan::Empty => Ok(()),
            ScanPlan::Union(plans) => {
                for plan in plans {
                    self.run(plan)?;
                }
                Ok(())
            }
            ScanPlan::FullScan { residual } => {
                let rids: Vec<Rid> = self
                    .view
                    .records_of_type(self.record_type)
                    .into_iter()
                    .map(|r| r.rid)
                    .collect();
                self.consume(rids, residual.as_ref())
            }
            ScanPlan::IndexScan {
                index,
                prefix,
                lower,
                upper,
                lower_inclusive,
                upper_inclusive,
                residual,
            } => {
                let structure = self.index(index)?;
                let prefix = IndexKey::new(prefix.iter().cloned());
                let (lower, lower_inclusive) = scan_bound(&prefix, lower, *lower_inclusive);
                let (upper, upper_inclusive) = scan_bound(&prefix, upper, *upper_inclusive);
                let rids = structure
                    .range_scan(
                        lower.as_ref(),
                        upper.as_ref(),
                        lower_inclusive,
                        upper_inclusive,
                        Direction::Ascending,
                    )
                    .into_iter()
                    .map(|(_, rid)| rid)
                    .collect();
                self.consume(rids, residual.as_ref())
            }
            ScanPlan::PointLookups {
                index,
                keys,
                residual,
            } => {
                let structure = self.index(index)?;
                let rids = keys
                    .iter()
                    .flat_map(|key| structure.scan_prefix(key))
                    .map(|(_, rid)| rid)
                    .collect();
                self.consume(rids, residual.as_ref())
            }
        }
    }

    fn index(&self, name: &str) -> Result<&IndexStructure, QueryError> {
        self.view.index(name).ok_or_else(|| {
            QueryError::from(EngineError::NotFound {
                resource_type: ResourceType::Index,
                resource_id: name.to_string(),
            })
        })
    }

    /// Fetches each not-yet-emitted candidate once and keeps those of the queried type that
    /// pass `residual`.
    fn consume(&mut self, rids: Vec<Rid>, residual: Option<&Expr>) -> Result<(), QueryError> {
        let view = self.view;
        let catalog = view.catalog();
        let mut fresh = Vec::new();
        let mut rid_seen = BTreeSet::new();
        for rid in rids {
            if self.seen.contains(&rid) || !rid_seen.insert(rid) {
                continue;
            }
            let Some(record) = view.record(rid) else {
                continue;
            };
            if !catalog.is_subclass_of(&record.record_type, self.record_type) {
                continue;
            }
            fresh.push(record.clone());
        }

        let scan: Box<dyn Operator + Send> = Box::new(ScanOperator::new(fresh));
        let mut operator: Box<dyn Operator + Send> = match residual {
            Some(expr) => Box::new(FilterOperator::new(scan, expr.clone())),
            None => scan,
        };
        while let Some(record) = operator.next() {
            self.seen.insert(record.rid);
            self.records.push(record);
        }
        self.rows_examined += operator.rows_examined();
        if self.max_scan_rows > 0 && self.rows_examined > self.max_scan_rows {
            return Err(QueryError::ScanBoundExceeded {
                rows_examined: self.rows_examined,
                max_scan_rows: self.max_scan_rows,
            });
        }
        Ok(())
    }
}

/// Index key bound for one side of a scan: the prefix extended by `value`, or the prefix
/// alone when that side is open.
fn scan_bound(prefix: &IndexKey, value: &Option<Value>, inclusive: bool) -> (Option<IndexKey>, bool) {
    match value {
        Some(value) => {
            let mut key = prefix.clone();
            key.push(value.clone());
            (Some(key), inclusive)
        }
        None if !prefix.is_empty() => (Some(prefix.clone()), true),
        None => (None, true),
    }
}
