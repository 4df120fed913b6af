use compact_str::CompactString;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Record identifier: the segment owning the record plus its position inside it.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct Rid {
    pub segment: i32,
    pub position: i64,
}

impl Rid {
    pub const fn new(segment: i32, position: i64) -> Self {
        Self { segment, position }
    }
}

impl fmt::Display for Rid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.segment, self.position)
    }
}

pub type Properties = BTreeMap<String, Value>;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ValueType {
    Boolean,
    Integer,
    Float,
    Decimal,
    String,
    Date,
    DateTime,
    Binary,
    Link,
    Embedded,
    EmbeddedList,
    EmbeddedSet,
    EmbeddedMap,
    LinkList,
    LinkSet,
    LinkMap,
    LinkBag,
    Any,
}

impl ValueType {
    pub fn is_collection(self) -> bool {
        matches!(
            self,
            ValueType::EmbeddedList
                | ValueType::EmbeddedSet
                | ValueType::LinkList
                | ValueType::LinkSet
                | ValueType::LinkBag
        )
    }

    pub fn is_map(self) -> bool {
        matches!(self, ValueType::EmbeddedMap | ValueType::LinkMap)
    }

    pub fn is_link_container(self) -> bool {
        matches!(
            self,
            ValueType::LinkList | ValueType::LinkSet | ValueType::LinkMap | ValueType::LinkBag
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ValueType::Boolean => "BOOLEAN",
            ValueType::Integer => "INTEGER",
            ValueType::Float => "FLOAT",
            ValueType::Decimal => "DECIMAL",
            ValueType::String => "STRING",
            ValueType::Date => "DATE",
            ValueType::DateTime => "DATETIME",
            ValueType::Binary => "BINARY",
            ValueType::Link => "LINK",
            ValueType::Embedded => "EMBEDDED",
            ValueType::EmbeddedList => "EMBEDDEDLIST",
            ValueType::EmbeddedSet => "EMBEDDEDSET",
            ValueType::EmbeddedMap => "EMBEDDEDMAP",
            ValueType::LinkList => "LINKLIST",
            ValueType::LinkSet => "LINKSET",
            ValueType::LinkMap => "LINKMAP",
            ValueType::LinkBag => "LINKBAG",
            ValueType::Any => "ANY",
        }
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub enum Value {
    #[default]
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(Decimal),
    String(CompactString),
    /// Days since the Unix epoch.
    Date(i32),
    /// Milliseconds since the Unix epoch.
    DateTime(i64),
    Binary(Vec<u8>),
    Link(Rid),
    Embedded(Properties),
    List(Vec<Value>),
    Set(BTreeSet<Value>),
    Map(BTreeMap<String, Value>),
    LinkBag(Vec<Rid>),
}

impl Value {
    fn kind_rank(&self) -> u8 {
        match self {
            Value::Null => 0,
            Value::Boolean(_) => 1,
            Value::Integer(_) => 2,
            Value::Float(_) => 3,
            Value::Decimal(_) => 4,
            Value::Date(_) => 5,
            Value::DateTime(_) => 6,
            Value::String(_) => 7,
            Value::Binary(_) => 8,
            Value::Link(_) => 9,
            Value::Embedded(_) => 10,
            Value::List(_) => 11,
            Value::Set(_) => 12,
            Value::Map(_) => 13,
            Value::LinkBag(_) => 14,
        }
    }

    pub fn string(s: impl Into<CompactString>) -> Self {
        Value::String(s.into())
    }

    pub fn list<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::List(items.into_iter().map(Into::into).collect())
    }

    pub fn set<I, V>(items: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Value::Set(items.into_iter().map(Into::into).collect())
    }

    pub fn map<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<Value>,
    {
        Value::Map(
            entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn link_bag<I: IntoIterator<Item = Rid>>(rids: I) -> Self {
        Value::LinkBag(rids.into_iter().collect())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Float(_) | Value::Decimal(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::Boolean(_) => "BOOLEAN",
            Value::Integer(_) => "INTEGER",
            Value::Float(_) => "FLOAT",
            Value::Decimal(_) => "DECIMAL",
            Value::String(_) => "STRING",
            Value::Date(_) => "DATE",
            Value::DateTime(_) => "DATETIME",
            Value::Binary(_) => "BINARY",
            Value::Link(_) => "LINK",
            Value::Embedded(_) => "EMBEDDED",
            Value::List(_) => "LIST",
            Value::Set(_) => "SET",
            Value::Map(_) => "MAP",
            Value::LinkBag(_) => "LINKBAG",
        }
    }

    /// Elements of a list, set or link bag; `None` for anything else.
    pub fn collection_elements(&self) -> Option<Vec<Value>> {
        match self {
            Value::List(items) => Some(items.clone()),
            Value::Set(items) => Some(items.iter().cloned().collect()),
            Value::LinkBag(rids) => Some(rids.iter().copied().map(Value::Link).collect()),
            _ => None,
        }
    }

    /// Converts the value to `target` when it already has that shape or widens into it the
    /// way filter comparison does (integers into floats and decimals). Nulls pass through
    /// unchanged; floats come out canonical, with one zero and one NaN.
    pub fn coerce_to(&self, target: ValueType) -> Option<Value> {
        match (self, target) {
            (Value::Null, _) | (_, ValueType::Any) => Some(self.clone()),
            (Value::Float(f), ValueType::Float) => Some(Value::Float(canonical_float(*f))),
            (Value::Boolean(_), ValueType::Boolean)
            | (Value::Integer(_), ValueType::Integer)
            | (Value::Decimal(_), ValueType::Decimal)
            | (Value::String(_), ValueType::String)
            | (Value::Date(_), ValueType::Date)
            | (Value::DateTime(_), ValueType::DateTime)
            | (Value::Binary(_), ValueType::Binary)
            | (Value::Link(_), ValueType::Link)
            | (Value::Embedded(_), ValueType::Embedded)
            | (Value::LinkBag(_), ValueType::LinkBag)
            | (Value::List(_), ValueType::EmbeddedList)
            | (Value::Set(_), ValueType::EmbeddedSet)
            | (Value::Map(_), ValueType::EmbeddedMap) => Some(self.clone()),
            (Value::List(items), ValueType::LinkList) => items
                .iter()
                .all(|v| matches!(v, Value::Link(_)))
                .then(|| self.clone()),
            (Value::Set(items), ValueType::LinkSet) => items
                .iter()
                .all(|v| matches!(v, Value::Link(_)))
                .then(|| self.clone()),
            (Value::Map(entries), ValueType::LinkMap) => entries
                .values()
                .all(|v| matches!(v, Value::Link(_)))
                .then(|| self.clone()),
            (Value::Integer(i), ValueType::Float) => Some(Value::Float(*i as f64)),
            (Value::Integer(i), ValueType::Decimal) => Some(Value::Decimal(Decimal::from(*i))),
            _ => None,
        }
    }

    /// Comparison used when evaluating filters: numeric kinds compare by magnitude, other
    /// kinds only compare with themselves.
    pub fn compare_loose(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Null, _) | (_, Value::Null) => None,
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Some(a.cmp(b)),
            (Value::Integer(a), Value::Decimal(b)) => Some(Decimal::from(*a).cmp(b)),
            (Value::Decimal(a), Value::Integer(b)) => Some(a.cmp(&Decimal::from(*b))),
            (a, b) if a.is_numeric() && b.is_numeric() => {
                let lhs = a.as_f64()?;
                let rhs = b.as_f64()?;
                lhs.partial_cmp(&rhs)
            }
            (a, b) if a.kind_rank() == b.kind_rank() => Some(a.cmp(b)),
            _ => None,
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Value {}

impl PartialOrd for Value {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Value {
    fn cmp(&self, other: &Self) -> Ordering {
        let rank_cmp = self.kind_rank().cmp(&other.kind_rank());
        if rank_cmp != Ordering::Equal {
            return rank_cmp;
        }

        match (self, other) {
            (Value::Null, Value::Null) => Ordering::Equal,
            (Value::Boolean(a), Value::Boolean(b)) => a.cmp(b),
            (Value::Integer(a), Value::Integer(b)) => a.cmp(b),
            (Value::Float(a), Value::Float(b)) => a.total_cmp(b),
            (Value::Decimal(a), Value::Decimal(b)) => a.cmp(b),
            (Value::Date(a), Value::Date(b)) => a.cmp(b),
            (Value::DateTime(a), Value::DateTime(b)) => a.cmp(b),
            (Value::String(a), Value::String(b)) => a.cmp(b),
            (Value::Binary(a), Value::Binary(b)) => a.cmp(b),
            (Value::Link(a), Value::Link(b)) => a.cmp(b),
            (Value::Embedded(a), Value::Embedded(b)) => a.cmp(b),
            (Value::List(a), Value::List(b)) => a.cmp(b),
            (Value::Set(a), Value::Set(b)) => a.cmp(b),
            (Value::Map(a), Value::Map(b)) => a.cmp(b),
            (Value::LinkBag(a), Value::LinkBag(b)) => {
                let mut a = a.clone();
                let mut b = b.clone();
                a.sort_unstable();
                b.sort_unstable();
                a.cmp(&b)
            }
            _ => Ordering::Equal,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::String(s) => write!(f, "{s:?}"),
            Value::Date(d) => write!(f, "date({d})"),
            Value::DateTime(ms) => write!(f, "datetime({ms})"),
            Value::Binary(b) => write!(f, "binary[{}]", b.len()),
            Value::Link(rid) => write!(f, "{rid}"),
            Value::Embedded(props) => {
                write!(f, "{{")?;
                for (i, (k, v)) in props.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::List(items) => write_seq(f, "[", items.iter(), "]"),
            Value::Set(items) => write_seq(f, "<", items.iter(), ">"),
            Value::Map(entries) => {
                write!(f, "{{")?;
                for (i, (k, v)) in entries.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{k:?}: {v}")?;
                }
                write!(f, "}}")
            }
            Value::LinkBag(rids) => {
                write!(f, "bag[")?;
                for (i, rid) in rids.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{rid}")?;
                }
                write!(f, "]")
            }
        }
    }
}

/// Folds `-0.0` into `0.0` and every NaN payload into `f64::NAN`, so that key order agrees
/// with IEEE equality on zeros and all NaNs land at one spot above `+inf`.
pub fn canonical_float(value: f64) -> f64 {
    if value.is_nan() {
        f64::NAN
    } else if value == 0.0 {
        0.0
    } else {
        value
    }
}

fn write_seq<'a>(
    f: &mut fmt::Formatter<'_>,
    open: &str,
    items: impl Iterator<Item = &'a Value>,
    close: &str,
) -> fmt::Result {
    f.write_str(open)?;
    for (i, item) in items.enumerate() {
        if i > 0 {
            write!(f, ", ")?;
        }
        write!(f, "{item}")?;
    }
    f.write_str(close)
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Boolean(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Integer(value)
    }
}

impl From<i32> for Value {
    fn from(value: i32) -> Self {
        Value::Integer(i64::from(value))
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<Decimal> for Value {
    fn from(value: Decimal) -> Self {
        Value::Decimal(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value.into())
    }
}

impl From<Rid> for Value {
    fn from(value: Rid) -> Self {
        Value::Link(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{Rid, Value, ValueType};
    use proptest::prelude::*;
    use rust_decimal::Decimal;
    use std::cmp::Ordering;

    fn arb_scalar() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Boolean),
            any::<i64>().prop_map(Value::Integer),
            any::<f64>()
                .prop_filter("finite float only", |v| v.is_finite())
                .prop_map(Value::Float),
            "\\PC{0,16}".prop_map(|s| Value::String(s.into())),
            (any::<i32>(), any::<i64>()).prop_map(|(s, p)| Value::Link(Rid::new(s, p))),
            Just(Value::Null),
        ]
    }

    proptest! {
        #[test]
        fn ordering_is_antisymmetric(a in arb_scalar(), b in arb_scalar()) {
            prop_assert_eq!(a.cmp(&b), b.cmp(&a).reverse());
        }

        #[test]
        fn ordering_is_transitive(a in arb_scalar(), b in arb_scalar(), c in arb_scalar()) {
            let mut sorted = vec![a, b, c];
            sorted.sort();
            prop_assert!(sorted[0] <= sorted[1]);
            prop_assert!(sorted[1] <= sorted[2]);
            prop_assert!(sorted[0] <= sorted[2]);
        }
    }

    #[test]
    fn null_sorts_first_and_kinds_do_not_interleave() {
        assert!(Value::Null < Value::Boolean(false));
        assert!(Value::Integer(i64::MAX) < Value::Float(f64::MIN));
        assert!(Value::Integer(5) < Value::string("0"));
    }

    #[test]
    fn rid_orders_by_segment_then_position() {
        assert!(Rid::new(1, 99) < Rid::new(2, 0));
        assert!(Rid::new(3, 1) < Rid::new(3, 2));
        assert_eq!(Rid::new(12, 7).to_string(), "#12:7");
    }

    #[test]
    fn integer_widens_into_float_and_decimal() {
        assert_eq!(
            Value::Integer(3).coerce_to(ValueType::Float),
            Some(Value::Float(3.0))
        );
        assert_eq!(
            Value::Integer(3).coerce_to(ValueType::Decimal),
            Some(Value::Decimal(Decimal::from(3)))
        );
        assert_eq!(Value::Float(1.5).coerce_to(ValueType::Integer), None);
        assert_eq!(Value::string("x").coerce_to(ValueType::Integer), None);
    }

    #[test]
    fn conversions_the_filter_would_not_make_are_refused() {
        assert_eq!(Value::Float(0.1).coerce_to(ValueType::Decimal), None);
        assert_eq!(Value::Integer(5).coerce_to(ValueType::DateTime), None);
        assert_eq!(
            Value::DateTime(5).coerce_to(ValueType::DateTime),
            Some(Value::DateTime(5))
        );
    }

    #[test]
    fn float_keys_are_canonical() {
        let zero = Value::Float(-0.0).coerce_to(ValueType::Float).expect("float");
        assert!(matches!(zero, Value::Float(z) if z.is_sign_positive() && z == 0.0));
        assert_eq!(zero.cmp(&Value::Float(0.0)), Ordering::Equal);

        let odd_nan = f64::from_bits(0xfff8_0000_0000_0001);
        let nan = Value::Float(odd_nan).coerce_to(ValueType::Float).expect("float");
        assert!(matches!(nan, Value::Float(n) if n.to_bits() == f64::NAN.to_bits()));
        assert!(nan > Value::Float(f64::INFINITY));
    }

    #[test]
    fn link_collections_require_link_elements() {
        let links = Value::list([Rid::new(1, 1), Rid::new(1, 2)]);
        assert!(links.coerce_to(ValueType::LinkList).is_some());
        let mixed = Value::List(vec![Value::Link(Rid::new(1, 1)), Value::Integer(2)]);
        assert!(mixed.coerce_to(ValueType::LinkList).is_none());
        assert!(mixed.coerce_to(ValueType::EmbeddedList).is_some());
    }

    #[test]
    fn loose_comparison_mixes_numeric_kinds() {
        assert_eq!(
            Value::Float(1.5).compare_loose(&Value::Integer(1)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::Integer(2).compare_loose(&Value::Decimal(Decimal::from(2))),
            Some(Ordering::Equal)
        );
        assert_eq!(Value::Integer(2).compare_loose(&Value::string("2")), None);
        assert_eq!(Value::Null.compare_loose(&Value::Null), None);
    }

    #[test]
    fn link_bag_equality_ignores_order() {
        let a = Value::link_bag([Rid::new(1, 1), Rid::new(1, 2)]);
        let b = Value::link_bag([Rid::new(1, 2), Rid::new(1, 1)]);
        assert_eq!(a, b);
    }
}
