use crate::catalog::schema::{FieldRole, IndexDefinition};
use crate::catalog::types::{Value, ValueType};
use crate::config::EngineConfig;
use crate::query::error::QueryError;
use crate::query::plan::{CmpOp, Expr, Operand, ScanPlan};
use crate::query::range::{FieldRange, MergedRange, RangeBound};
use crate::storage::key::IndexKey;
use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PlannerLimits {
    pub max_expr_depth: usize,
    pub max_in_list_len: usize,
}

impl Default for PlannerLimits {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for PlannerLimits {
    fn from(config: &EngineConfig) -> Self {
        Self {
            max_expr_depth: config.max_expr_depth,
            max_in_list_len: config.max_in_list_len,
        }
    }
}

/// Index-relevant reading of one conjunct.
#[derive(Debug)]
enum Constraint<'a> {
    Compare {
        path: &'a str,
        op: CmpOp,
        value: &'a Value,
    },
    Between {
        path: &'a str,
        low: &'a Value,
        high: &'a Value,
    },
    In {
        path: &'a str,
        values: &'a [Value],
    },
    IsNull {
        path: &'a str,
    },
    Member {
        path: &'a str,
        role: FieldRole,
        value: Value,
    },
}

impl Constraint<'_> {
    fn path(&self) -> &str {
        match self {
            Constraint::Compare { path, .. }
            | Constraint::Between { path, .. }
            | Constraint::In { path, .. }
            | Constraint::IsNull { path }
            | Constraint::Member { path, .. } => path,
        }
    }

    fn literals(&self) -> Vec<&Value> {
        match self {
            Constraint::Compare { value, .. } => vec![*value],
            Constraint::Between { low, high, .. } => vec![*low, *high],
            Constraint::In { values, .. } => values.iter().collect(),
            Constraint::IsNull { .. } => Vec::new(),
            Constraint::Member { value, .. } => vec![value],
        }
    }
}

fn classify(expr: &Expr) -> Option<Constraint<'_>> {
    match expr {
        Expr::Compare(Operand::Field(path), op, Operand::Literal(value))
            if *op != CmpOp::Ne && !value.is_null() =>
        {
            Some(Constraint::Compare {
                path,
                op: *op,
                value,
            })
        }
        Expr::Compare(Operand::Literal(value), op, Operand::Field(path))
            if *op != CmpOp::Ne && !value.is_null() =>
        {
            Some(Constraint::Compare {
                path,
                op: op.flip(),
                value,
            })
        }
        Expr::Between(path, low, high) if !low.is_null() && !high.is_null() => {
            Some(Constraint::Between { path, low, high })
        }
        Expr::In(path, values) => Some(Constraint::In { path, values }),
        Expr::IsNull(path) => Some(Constraint::IsNull { path }),
        Expr::Contains(path, value) if !value.is_null() => Some(Constraint::Member {
            path,
            role: FieldRole::CollectionElement,
            value: value.clone(),
        }),
        Expr::ContainsKey(path, key) => Some(Constraint::Member {
            path,
            role: FieldRole::MapKey,
            value: Value::string(key.as_str()),
        }),
        Expr::ContainsValue(path, value) if !value.is_null() => Some(Constraint::Member {
            path,
            role: FieldRole::MapValue,
            value: value.clone(),
        }),
        _ => None,
    }
}

fn flatten_or<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::Or(left, right) => {
            flatten_or(left, out);
            flatten_or(right, out);
        }
        other => out.push(other),
    }
}

fn flatten_and<'a>(expr: &'a Expr, out: &mut Vec<&'a Expr>) {
    match expr {
        Expr::And(left, right) => {
            flatten_and(left, out);
            flatten_and(right, out);
        }
        other => out.push(other),
    }
}

fn validate_literals(expr: &Expr) -> Result<(), QueryError> {
    match expr {
        Expr::Between(path, low, high)
            if !low.is_null() && !high.is_null() && low.compare_loose(high).is_none() =>
        {
            Err(QueryError::TypeMismatch {
                field: path.clone(),
                expected: low.type_name().to_string(),
                got: high.type_name().to_string(),
            })
        }
        Expr::Not(inner) => validate_literals(inner),
        Expr::And(left, right) | Expr::Or(left, right) => {
            validate_literals(left)?;
            validate_literals(right)
        }
        _ => Ok(()),
    }
}

/// Plans `filter` against `indexes` with the default limits.
pub fn plan(filter: &Expr, indexes: &[&IndexDefinition]) -> Result<ScanPlan, QueryError> {
    plan_with_limits(filter, indexes, PlannerLimits::default())
}

pub fn plan_with_limits(
    filter: &Expr,
    indexes: &[&IndexDefinition],
    limits: PlannerLimits,
) -> Result<ScanPlan, QueryError> {
    filter.validate_depth(limits.max_expr_depth)?;
    let longest = filter.max_in_list_len();
    if longest > limits.max_in_list_len {
        return Err(QueryError::InvalidQuery {
            reason: format!(
                "IN list of {longest} values exceeds maximum of {}",
                limits.max_in_list_len
            ),
        });
    }
    validate_literals(filter)?;

    let mut disjuncts = Vec::new();
    flatten_or(filter, &mut disjuncts);
    if disjuncts.len() == 1 {
        return Ok(plan_conjunction(filter, indexes, limits));
    }

    let mut plans = Vec::with_capacity(disjuncts.len());
    for disjunct in disjuncts {
        match plan_conjunction(disjunct, indexes, limits) {
            ScanPlan::FullScan { .. } => {
                return Ok(ScanPlan::FullScan {
                    residual: Some(filter.clone()),
                });
            }
            ScanPlan::Empty => {}
            other => plans.push(other),
        }
    }
    Ok(match plans.len() {
        0 => ScanPlan::Empty,
        1 => plans.swap_remove(0),
        _ => ScanPlan::Union(plans),
    })
}

fn plan_conjunction(expr: &Expr, indexes: &[&IndexDefinition], limits: PlannerLimits) -> ScanPlan {
    let mut conjuncts = Vec::new();
    flatten_and(expr, &mut conjuncts);
    let constraints: Vec<Option<Constraint<'_>>> = conjuncts.iter().map(|c| classify(c)).collect();

    if contradicts(&constraints) {
        return ScanPlan::Empty;
    }

    let mut best: Option<Candidate<'_>> = None;
    for definition in indexes {
        let Some(candidate) = match_index(definition, &constraints, limits) else {
            continue;
        };
        if candidate.empty {
            return ScanPlan::Empty;
        }
        let better = best
            .as_ref()
            .is_none_or(|current| candidate.score() > current.score());
        if better {
            best = Some(candidate);
        }
    }

    let Some(best) = best else {
        return ScanPlan::FullScan {
            residual: Some(expr.clone()),
        };
    };
    let residual = Expr::all(
        conjuncts
            .iter()
            .enumerate()
            .filter(|(i, _)| !best.consumed.contains(i))
            .map(|(_, c)| (*c).clone()),
    );
    best.into_plan(residual)
}

/// Detects conjunctions that no record can satisfy, using the raw literals.
fn contradicts(constraints: &[Option<Constraint<'_>>]) -> bool {
    let mut by_field: BTreeMap<&str, FieldRange> = BTreeMap::new();
    for constraint in constraints.iter().flatten() {
        let range = by_field.entry(constraint.path()).or_default();
        match constraint {
            Constraint::Compare { op, value, .. } => {
                range.apply(*op, (*value).clone());
            }
            Constraint::Between { low, high, .. } => {
                range.tighten_lower((*low).clone(), true);
                range.tighten_upper((*high).clone(), true);
            }
            Constraint::In { values, .. } => {
                range.restrict_to(values.iter().filter(|v| !v.is_null()).cloned().collect());
            }
            Constraint::IsNull { .. } => range.restrict_to(vec![Value::Null]),
            Constraint::Member { .. } => {}
        }
    }
    by_field
        .iter()
        .filter(|(path, _)| !mixes_inexact_numbers(constraints, path))
        .any(|(_, range)| range.resolve() == MergedRange::Empty)
}

/// Whether the literals on `path` pair a float with a decimal or a huge integer, whose
/// loose comparison rounds and so cannot prove two bounds disjoint.
fn mixes_inexact_numbers(constraints: &[Option<Constraint<'_>>], path: &str) -> bool {
    let mut has_float = false;
    let mut has_partner = false;
    for constraint in constraints.iter().flatten() {
        if constraint.path() != path {
            continue;
        }
        for value in constraint.literals() {
            match value {
                Value::Float(_) => has_float = true,
                Value::Decimal(_) => has_partner = true,
                Value::Integer(i) if i.unsigned_abs() > MAX_EXACT_FLOAT_INT => has_partner = true,
                _ => {}
            }
        }
    }
    has_float && has_partner
}

/// Largest integer magnitude below which every integer has its own `f64`.
const MAX_EXACT_FLOAT_INT: u64 = 1 << 53;

/// Literal converted to an index key type, or `None` when key order would disagree with
/// filter comparison for it. Untyped positions only take non-numeric literals; NaN matches
/// nothing; integers past 2^53 collide with their neighbours once widened to float.
fn coerce_literal(value: &Value, key_type: ValueType) -> Option<Value> {
    match (value, key_type) {
        (v, ValueType::Any) if v.is_numeric() => None,
        (Value::Float(f), _) if f.is_nan() => None,
        (Value::Integer(i), ValueType::Float) if i.unsigned_abs() > MAX_EXACT_FLOAT_INT => None,
        _ => value.coerce_to(key_type),
    }
}

struct Candidate<'a> {
    definition: &'a IndexDefinition,
    /// Admissible values for each leading position bound by equality or membership.
    points: Vec<Vec<Value>>,
    /// Bounds on the position after `points`, when the match ends in a range.
    range: Option<(Option<RangeBound>, Option<RangeBound>)>,
    consumed: BTreeSet<usize>,
    empty: bool,
}

impl<'a> Candidate<'a> {
    fn matched_len(&self) -> usize {
        self.points.len() + usize::from(self.range.is_some())
    }

    fn score(&self) -> (usize, bool, Reverse<u64>) {
        (
            self.matched_len(),
            self.range.is_none(),
            Reverse(self.definition.ordinal),
        )
    }

    fn combinations(&self) -> Vec<Vec<Value>> {
        let mut combos: Vec<Vec<Value>> = vec![Vec::new()];
        for values in &self.points {
            combos = combos
                .into_iter()
                .flat_map(|prefix| {
                    values.iter().map(move |value| {
                        let mut next = prefix.clone();
                        next.push(value.clone());
                        next
                    })
                })
                .collect();
        }
        combos
    }

    fn into_plan(self, residual: Option<Expr>) -> ScanPlan {
        let index = self.definition.name.clone();
        let combos = self.combinations();
        let range_type = self
            .definition
            .key_types
            .get(self.points.len())
            .copied()
            .unwrap_or(ValueType::Any);
        match self.range {
            Some((lower, upper)) => {
                // Null keys sort first; an open lower end must still skip them.
                let lower = lower.unwrap_or(RangeBound {
                    value: Value::Null,
                    inclusive: false,
                });
                // NaN keys sort last and satisfy no comparison.
                let upper = match upper {
                    None if range_type == ValueType::Float => Some(RangeBound {
                        value: Value::Float(f64::NAN),
                        inclusive: false,
                    }),
                    other => other,
                };
                let upper_inclusive = upper.as_ref().is_some_and(|b| b.inclusive);
                let upper = upper.map(|b| b.value);
                let mut scans: Vec<ScanPlan> = combos
                    .into_iter()
                    .map(|prefix| ScanPlan::IndexScan {
                        index: index.clone(),
                        prefix,
                        lower: Some(lower.value.clone()),
                        upper: upper.clone(),
                        lower_inclusive: lower.inclusive,
                        upper_inclusive,
                        residual: residual.clone(),
                    })
                    .collect();
                if scans.len() == 1 {
                    scans.swap_remove(0)
                } else {
                    ScanPlan::Union(scans)
                }
            }
            None if combos.len() == 1 => ScanPlan::IndexScan {
                index,
                prefix: combos.into_iter().next().unwrap_or_default(),
                lower: None,
                upper: None,
                lower_inclusive: true,
                upper_inclusive: true,
                residual,
            },
            None => ScanPlan::PointLookups {
                index,
                keys: combos.into_iter().map(IndexKey::new).collect(),
                residual,
            },
        }
    }
}

fn match_index<'a>(
    definition: &'a IndexDefinition,
    constraints: &[Option<Constraint<'_>>],
    limits: PlannerLimits,
) -> Option<Candidate<'a>> {
    let mut candidate = Candidate {
        definition,
        points: Vec::new(),
        range: None,
        consumed: BTreeSet::new(),
        empty: false,
    };
    let mut combinations = 1usize;

    for (position, field) in definition.fields.iter().enumerate() {
        let key_type = definition
            .key_types
            .get(position)
            .copied()
            .unwrap_or(ValueType::Any);
        let path = field.property_path.as_str();

        if field.role != FieldRole::Scalar {
            let member = constraints.iter().enumerate().find_map(|(i, c)| match c {
                Some(Constraint::Member {
                    path: p,
                    role,
                    value,
                }) if *p == path && *role == field.role => {
                    coerce_literal(value, key_type).map(|v| (i, v))
                }
                _ => None,
            });
            let Some((i, value)) = member else {
                break;
            };
            candidate.points.push(vec![value]);
            candidate.consumed.insert(i);
            continue;
        }

        let mut range = FieldRange::default();
        let mut used = Vec::new();
        for (i, constraint) in constraints.iter().enumerate() {
            let Some(constraint) = constraint else {
                continue;
            };
            if constraint.path() != path {
                continue;
            }
            match constraint {
                Constraint::Compare { op, value, .. } => {
                    if key_type == ValueType::Any && *op != CmpOp::Eq {
                        continue;
                    }
                    if let Some(v) = coerce_literal(value, key_type) {
                        range.apply(*op, v);
                        used.push(i);
                    }
                }
                Constraint::Between { low, high, .. } => {
                    if key_type == ValueType::Any {
                        continue;
                    }
                    if let (Some(low), Some(high)) = (
                        coerce_literal(low, key_type),
                        coerce_literal(high, key_type),
                    ) {
                        range.tighten_lower(low, true);
                        range.tighten_upper(high, true);
                        used.push(i);
                    }
                }
                Constraint::In { values, .. } => {
                    let coerced: Option<Vec<Value>> = values
                        .iter()
                        .filter(|v| !v.is_null())
                        .map(|v| coerce_literal(v, key_type))
                        .collect();
                    if let Some(coerced) = coerced {
                        range.restrict_to(coerced);
                        used.push(i);
                    }
                }
                Constraint::IsNull { .. } => {
                    if !definition.ignore_nulls {
                        range.restrict_to(vec![Value::Null]);
                        used.push(i);
                    }
                }
                Constraint::Member { .. } => {}
            }
        }

        match range.resolve() {
            MergedRange::Unconstrained => break,
            MergedRange::Empty => {
                candidate.empty = true;
                candidate.consumed.extend(used);
                return Some(candidate);
            }
            MergedRange::Points(points) => {
                let next = combinations.saturating_mul(points.len());
                if next > limits.max_in_list_len {
                    break;
                }
                combinations = next;
                candidate.points.push(points);
                candidate.consumed.extend(used);
            }
            MergedRange::Range { lower, upper } => {
                candidate.range = Some((lower, upper));
                candidate.consumed.extend(used);
                break;
            }
        }
    }

    if candidate.matched_len() == 0 {
        return None;
    }
    // Records with a null component are absent from such an index, so a partial prefix
    // would miss them.
    if definition.ignore_nulls && candidate.matched_len() < definition.fields.len() {
        return None;
    }
    Some(candidate)
}
