use crate::catalog::types::Value;
use crate::query::plan::{CmpOp, Expr, Operand};
use crate::storage::record::Record;
use std::cmp::Ordering;

pub trait Operator {
    fn next(&mut self) -> Option<Record>;
    fn rows_examined(&self) -> usize {
        0
    }
}

pub struct ScanOperator {
    rows: Box<dyn Iterator<Item = Record> + Send>,
    examined: usize,
}

impl ScanOperator {
    pub fn new<I>(rows: I) -> Self
    where
        I: IntoIterator<Item = Record>,
        I::IntoIter: Iterator<Item = Record> + Send + 'static,
    {
        Self {
            rows: Box::new(rows.into_iter()),
            examined: 0,
        }
    }
}

impl Operator for ScanOperator {
    fn next(&mut self) -> Option<Record> {
        let row = self.rows.next()?;
        self.examined += 1;
        Some(row)
    }

    fn rows_examined(&self) -> usize {
        self.examined
    }
}

pub struct FilterOperator {
    child: Box<dyn Operator + Send>,
    predicate: Expr,
}

impl FilterOperator {
    pub fn new(child: Box<dyn Operator + Send>, predicate: Expr) -> Self {
        Self { child, predicate }
    }
}

impl Operator for FilterOperator {
    fn next(&mut self) -> Option<Record> {
        loop {
            let row = self.child.next()?;
            if eval_expr(&self.predicate, &row) {
                return Some(row);
            }
        }
    }

    fn rows_examined(&self) -> usize {
        self.child.rows_examined()
    }
}

fn operand<'a>(operand: &'a Operand, record: &'a Record) -> &'a Value {
    match operand {
        Operand::Field(path) => record.get_or_null(path),
        Operand::Literal(value) => value,
    }
}

fn matches_op(ordering: Option<Ordering>, op: CmpOp) -> bool {
    ordering.is_some_and(|o| match op {
        CmpOp::Eq => o.is_eq(),
        CmpOp::Ne => o.is_ne(),
        CmpOp::Lt => o.is_lt(),
        CmpOp::Lte => o.is_le(),
        CmpOp::Gt => o.is_gt(),
        CmpOp::Gte => o.is_ge(),
    })
}

fn loose_eq(left: &Value, right: &Value) -> bool {
    left.compare_loose(right).is_some_and(Ordering::is_eq)
}

/// Evaluates `expr` against `record`. Comparisons involving null or mismatched kinds are false.
pub fn eval_expr(expr: &Expr, record: &Record) -> bool {
    match expr {
        Expr::Compare(left, op, right) => {
            let left = operand(left, record);
            let right = operand(right, record);
            matches_op(left.compare_loose(right), *op)
        }
        Expr::In(path, values) => {
            let value = record.get_or_null(path);
            values.iter().any(|v| loose_eq(value, v))
        }
        Expr::Between(path, low, high) => {
            let value = record.get_or_null(path);
            matches_op(value.compare_loose(low), CmpOp::Gte)
                && matches_op(value.compare_loose(high), CmpOp::Lte)
        }
        Expr::IsNull(path) => record.get_or_null(path).is_null(),
        Expr::IsNotNull(path) => !record.get_or_null(path).is_null(),
        Expr::Like(path, pattern) => match record.get_or_null(path) {
            Value::String(s) => like_match(s, pattern),
            _ => false,
        },
        Expr::Contains(path, needle) => record
            .get_or_null(path)
            .collection_elements()
            .is_some_and(|items| items.iter().any(|item| loose_eq(item, needle))),
        Expr::ContainsKey(path, key) => match record.get_or_null(path) {
            Value::Map(entries) => entries.contains_key(key.as_str()),
            _ => false,
        },
        Expr::ContainsValue(path, needle) => match record.get_or_null(path) {
            Value::Map(entries) => entries.values().any(|v| loose_eq(v, needle)),
            _ => false,
        },
        Expr::And(a, b) => eval_expr(a, record) && eval_expr(b, record),
        Expr::Or(a, b) => eval_expr(a, record) || eval_expr(b, record),
        Expr::Not(inner) => !eval_expr(inner, record),
    }
}

/// SQL `LIKE`: `%` matches any run of characters, `_` exactly one.
pub fn like_match(value: &str, pattern: &str) -> bool {
    let text: Vec<char> = value.chars().collect();
    let pat: Vec<char> = pattern.chars().collect();
    let mut ti = 0usize;
    let mut pi = 0usize;
    let mut star_pi: Option<usize> = None;
    let mut star_ti = 0usize;

    while ti < text.len() {
        if pi < pat.len() && (pat[pi] == '_' || pat[pi] == text[ti]) {
            ti += 1;
            pi += 1;
            continue;
        }
        if pi < pat.len() && pat[pi] == '%' {
            star_pi = Some(pi);
            pi += 1;
            star_ti = ti;
            continue;
        }
        if let Some(saved_pi) = star_pi {
            pi = saved_pi + 1;
            star_ti += 1;
            ti = star_ti;
            continue;
        }
        return false;
    }

    while pi < pat.len() && pat[pi] == '%' {
        pi += 1;
    }

    pi == pat.len()
}
