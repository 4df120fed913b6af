use crate::catalog::types::Value;
use crate::query::error::QueryError;
use crate::storage::key::IndexKey;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CmpOp {
    Eq,
    Ne,
    Lt,
    Lte,
    Gt,
    Gte,
}

impl CmpOp {
    /// Operator with its operands swapped: `a < b` is `b > a`.
    pub fn flip(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::Eq,
            CmpOp::Ne => CmpOp::Ne,
            CmpOp::Lt => CmpOp::Gt,
            CmpOp::Lte => CmpOp::Gte,
            CmpOp::Gt => CmpOp::Lt,
            CmpOp::Gte => CmpOp::Lte,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            CmpOp::Eq => "=",
            CmpOp::Ne => "<>",
            CmpOp::Lt => "<",
            CmpOp::Lte => "<=",
            CmpOp::Gt => ">",
            CmpOp::Gte => ">=",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operand {
    /// Property path, possibly dotted.
    Field(String),
    Literal(Value),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Expr {
    Compare(Operand, CmpOp, Operand),
    In(String, Vec<Value>),
    Between(String, Value, Value),
    IsNull(String),
    IsNotNull(String),
    Like(String, String),
    /// Collection (list, set, link bag) holds an element equal to the value.
    Contains(String, Value),
    ContainsKey(String, String),
    ContainsValue(String, Value),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

/// Starts a predicate on `path`: `field("age").gt(30)`.
pub fn field(path: &str) -> FieldRef {
    FieldRef(path.to_string())
}

#[derive(Debug, Clone)]
pub struct FieldRef(String);

impl FieldRef {
    fn compare(self, op: CmpOp, value: impl Into<Value>) -> Expr {
        Expr::Compare(Operand::Field(self.0), op, Operand::Literal(value.into()))
    }

    pub fn eq(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Eq, value)
    }

    pub fn ne(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Ne, value)
    }

    pub fn lt(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Lt, value)
    }

    pub fn lte(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Lte, value)
    }

    pub fn gt(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Gt, value)
    }

    pub fn gte(self, value: impl Into<Value>) -> Expr {
        self.compare(CmpOp::Gte, value)
    }

    pub fn in_list<I, V>(self, values: I) -> Expr
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Expr::In(self.0, values.into_iter().map(Into::into).collect())
    }

    pub fn between(self, low: impl Into<Value>, high: impl Into<Value>) -> Expr {
        Expr::Between(self.0, low.into(), high.into())
    }

    pub fn is_null(self) -> Expr {
        Expr::IsNull(self.0)
    }

    pub fn is_not_null(self) -> Expr {
        Expr::IsNotNull(self.0)
    }

    pub fn like(self, pattern: &str) -> Expr {
        Expr::Like(self.0, pattern.to_string())
    }

    pub fn contains(self, value: impl Into<Value>) -> Expr {
        Expr::Contains(self.0, value.into())
    }

    pub fn contains_key(self, key: &str) -> Expr {
        Expr::ContainsKey(self.0, key.to_string())
    }

    pub fn contains_value(self, value: impl Into<Value>) -> Expr {
        Expr::ContainsValue(self.0, value.into())
    }
}

impl Expr {
    pub fn compare(left: Operand, op: CmpOp, right: Operand) -> Expr {
        Expr::Compare(left, op, right)
    }

    pub fn and(self, rhs: Expr) -> Expr {
        Expr::And(Box::new(self), Box::new(rhs))
    }

    pub fn or(self, rhs: Expr) -> Expr {
        Expr::Or(Box::new(self), Box::new(rhs))
    }

    #[allow(clippy::should_implement_trait)]
    pub fn not(self) -> Expr {
        Expr::Not(Box::new(self))
    }

    /// Folds `exprs` into a left-deep conjunction; `None` when empty.
    pub fn all<I: IntoIterator<Item = Expr>>(exprs: I) -> Option<Expr> {
        exprs.into_iter().reduce(Expr::and)
    }

    pub fn depth(&self) -> usize {
        match self {
            Expr::Compare(..)
            | Expr::In(..)
            | Expr::Between(..)
            | Expr::IsNull(_)
            | Expr::IsNotNull(_)
            | Expr::Like(..)
            | Expr::Contains(..)
            | Expr::ContainsKey(..)
            | Expr::ContainsValue(..) => 1,
            Expr::Not(inner) => 1 + inner.depth(),
            Expr::And(left, right) | Expr::Or(left, right) => 1 + left.depth().max(right.depth()),
        }
    }

    pub fn validate_depth(&self, max_depth: usize) -> Result<(), QueryError> {
        let depth = self.depth();
        if depth > max_depth {
            return Err(QueryError::InvalidQuery {
                reason: format!(
                    "expression depth {depth} exceeds maximum allowed depth of {max_depth}"
                ),
            });
        }
        Ok(())
    }

    /// Longest IN-list anywhere in the tree.
    pub fn max_in_list_len(&self) -> usize {
        match self {
            Expr::In(_, values) => values.len(),
            Expr::Not(inner) => inner.max_in_list_len(),
            Expr::And(left, right) | Expr::Or(left, right) => {
                left.max_in_list_len().max(right.max_in_list_len())
            }
            _ => 0,
        }
    }
}

/// How the reference executor should find candidate records.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanPlan {
    /// Ordered scan over `index`: keys whose leading components equal `prefix`, further
    /// bounded on the next component by `lower`/`upper` when present.
    IndexScan {
        index: String,
        prefix: Vec<Value>,
        lower: Option<Value>,
        upper: Option<Value>,
        lower_inclusive: bool,
        upper_inclusive: bool,
        residual: Option<Expr>,
    },
    /// One prefix lookup per key.
    PointLookups {
        index: String,
        keys: Vec<IndexKey>,
        residual: Option<Expr>,
    },
    Union(Vec<ScanPlan>),
    /// The filter can match nothing.
    Empty,
    FullScan {
        residual: Option<Expr>,
    },
}

impl ScanPlan {
    /// Indexes the plan reads, in plan order without duplicates.
    pub fn indexes_used(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_indexes(&mut out);
        out
    }

    fn collect_indexes<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            ScanPlan::IndexScan { index, .. } | ScanPlan::PointLookups { index, .. } => {
                if !out.contains(&index.as_str()) {
                    out.push(index);
                }
            }
            ScanPlan::Union(plans) => {
                for plan in plans {
                    plan.collect_indexes(out);
                }
            }
            ScanPlan::Empty | ScanPlan::FullScan { .. } => {}
        }
    }

    pub fn has_residual_filter(&self) -> bool {
        match self {
            ScanPlan::IndexScan { residual, .. }
            | ScanPlan::PointLookups { residual, .. }
            | ScanPlan::FullScan { residual } => residual.is_some(),
            ScanPlan::Union(plans) => plans.iter().any(ScanPlan::has_residual_filter),
            ScanPlan::Empty => false,
        }
    }

    pub fn is_full_scan(&self) -> bool {
        matches!(self, ScanPlan::FullScan { .. })
    }
}
