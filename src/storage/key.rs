use crate::catalog::types::Value;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::cmp::Ordering;
use std::fmt;

/// Ordered tuple of values; compared lexicographically, so a key that is a prefix of a
/// longer one sorts first.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    values: SmallVec<[Value; 2]>,
}

impl IndexKey {
    pub fn new<I: IntoIterator<Item = Value>>(values: I) -> Self {
        Self {
            values: values.into_iter().collect(),
        }
    }

    pub fn single(value: impl Into<Value>) -> Self {
        let mut values = SmallVec::new();
        values.push(value.into());
        Self { values }
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn has_null(&self) -> bool {
        self.values.iter().any(Value::is_null)
    }

    pub fn push(&mut self, value: Value) {
        self.values.push(value);
    }

    /// Compares only the leading `prefix.len()` components of `self` against `prefix`.
    pub fn prefix_cmp(&self, prefix: &IndexKey) -> Ordering {
        self.values
            .iter()
            .take(prefix.len())
            .cmp(prefix.values.iter())
    }

    pub fn starts_with(&self, prefix: &IndexKey) -> bool {
        self.values.starts_with(&prefix.values)
    }
}

impl From<Value> for IndexKey {
    fn from(value: Value) -> Self {
        IndexKey::single(value)
    }
}

impl From<Vec<Value>> for IndexKey {
    fn from(values: Vec<Value>) -> Self {
        IndexKey::new(values)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[")?;
        for (i, value) in self.values.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{value}")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::IndexKey;
    use crate::catalog::types::Value;
    use std::cmp::Ordering;

    #[test]
    fn shorter_prefix_sorts_first() {
        let short = IndexKey::single(1i64);
        let long = IndexKey::new([Value::Integer(1), Value::string("a")]);
        assert!(short < long);
        assert!(long.starts_with(&short));
    }

    #[test]
    fn prefix_cmp_ignores_trailing_components() {
        let key = IndexKey::new([Value::string("x"), Value::Integer(10)]);
        assert_eq!(key.prefix_cmp(&IndexKey::single("x")), Ordering::Equal);
        assert_eq!(key.prefix_cmp(&IndexKey::single("y")), Ordering::Less);
        assert_eq!(
            key.prefix_cmp(&IndexKey::new([Value::string("x"), Value::Integer(5)])),
            Ordering::Greater
        );
    }

    #[test]
    fn display_lists_components() {
        let key = IndexKey::new([Value::string("a"), Value::Null]);
        assert_eq!(key.to_string(), "[\"a\", null]");
        assert!(key.has_null());
    }
}
