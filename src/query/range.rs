use crate::catalog::types::Value;
use crate::query::plan::CmpOp;
use std::cmp::Ordering;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBound {
    pub value: Value,
    pub inclusive: bool,
}

/// Outcome of merging every constraint on one field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MergedRange {
    Unconstrained,
    /// The constraints contradict each other.
    Empty,
    /// Sorted, distinct point values.
    Points(Vec<Value>),
    Range {
        lower: Option<RangeBound>,
        upper: Option<RangeBound>,
    },
}

/// Numeric kinds compare by magnitude; everything else falls back to the total order.
pub fn cmp_values(a: &Value, b: &Value) -> Ordering {
    a.compare_loose(b).unwrap_or_else(|| a.cmp(b))
}

/// Accumulates comparisons against a single field; the result does not depend on the order
/// in which they are applied.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldRange {
    lower: Option<RangeBound>,
    upper: Option<RangeBound>,
    points: Option<Vec<Value>>,
}

impl FieldRange {
    /// Folds `field <op> value` in. Returns `false` for operators that do not bound a range.
    pub fn apply(&mut self, op: CmpOp, value: Value) -> bool {
        match op {
            CmpOp::Eq => self.restrict_to(vec![value]),
            CmpOp::Gt => self.tighten_lower(value, false),
            CmpOp::Gte => self.tighten_lower(value, true),
            CmpOp::Lt => self.tighten_upper(value, false),
            CmpOp::Lte => self.tighten_upper(value, true),
            CmpOp::Ne => return false,
        }
        true
    }

    /// Intersects the admissible point set with `values` (equality or IN-list).
    pub fn restrict_to(&mut self, values: Vec<Value>) {
        let mut incoming: Vec<Value> = Vec::with_capacity(values.len());
        for value in values {
            if !incoming.iter().any(|v| cmp_values(v, &value) == Ordering::Equal) {
                incoming.push(value);
            }
        }
        self.points = Some(match self.points.take() {
            None => incoming,
            Some(existing) => existing
                .into_iter()
                .filter(|p| incoming.iter().any(|v| cmp_values(p, v) == Ordering::Equal))
                .collect(),
        });
    }

    pub fn tighten_lower(&mut self, value: Value, inclusive: bool) {
        match &mut self.lower {
            None => self.lower = Some(RangeBound { value, inclusive }),
            Some(bound) => match cmp_values(&value, &bound.value) {
                Ordering::Greater => *bound = RangeBound { value, inclusive },
                Ordering::Equal => bound.inclusive &= inclusive,
                Ordering::Less => {}
            },
        }
    }

    pub fn tighten_upper(&mut self, value: Value, inclusive: bool) {
        match &mut self.upper {
            None => self.upper = Some(RangeBound { value, inclusive }),
            Some(bound) => match cmp_values(&value, &bound.value) {
                Ordering::Less => *bound = RangeBound { value, inclusive },
                Ordering::Equal => bound.inclusive &= inclusive,
                Ordering::Greater => {}
            },
        }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.lower.is_none() && self.upper.is_none() && self.points.is_none()
    }

    pub fn admits(&self, value: &Value) -> bool {
        let above_lower = self.lower.as_ref().is_none_or(|b| {
            match cmp_values(value, &b.value) {
                Ordering::Greater => true,
                Ordering::Equal => b.inclusive,
                Ordering::Less => false,
            }
        });
        let below_upper = self.upper.as_ref().is_none_or(|b| {
            match cmp_values(value, &b.value) {
                Ordering::Less => true,
                Ordering::Equal => b.inclusive,
                Ordering::Greater => false,
            }
        });
        above_lower && below_upper
    }

    pub fn resolve(&self) -> MergedRange {
        if let Some(points) = &self.points {
            let mut admitted: Vec<Value> =
                points.iter().filter(|p| self.admits(p)).cloned().collect();
            if admitted.is_empty() {
                return MergedRange::Empty;
            }
            admitted.sort();
            admitted.dedup();
            return MergedRange::Points(admitted);
        }
        if let (Some(lower), Some(upper)) = (&self.lower, &self.upper) {
            match cmp_values(&lower.value, &upper.value) {
                Ordering::Greater => return MergedRange::Empty,
                Ordering::Equal if lower.inclusive && upper.inclusive => {
                    return MergedRange::Points(vec![lower.value.clone()]);
                }
                Ordering::Equal => return MergedRange::Empty,
                Ordering::Less => {}
            }
        }
        if self.lower.is_none() && self.upper.is_none() {
            return MergedRange::Unconstrained;
        }
        MergedRange::Range {
            lower: self.lower.clone(),
            upper: self.upper.clone(),
        }
    }
}
