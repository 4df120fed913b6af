use crate::catalog::types::{Properties, Rid, Value};
use serde::{Deserialize, Serialize};

static NULL: Value = Value::Null;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub rid: Rid,
    pub record_type: String,
    /// 0 until first committed; bumped by exactly one on each committed mutation.
    pub version: u64,
    pub properties: Properties,
}

impl Record {
    pub fn new(rid: Rid, record_type: &str) -> Self {
        Self {
            rid,
            record_type: record_type.to_string(),
            version: 0,
            properties: Properties::new(),
        }
    }

    pub fn with(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Option<Value> {
        self.properties.insert(name.to_string(), value.into())
    }

    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.properties.remove(name)
    }

    /// Resolves a possibly dotted path through embedded objects and maps.
    pub fn get(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.properties.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Embedded(props) => props.get(segment)?,
                Value::Map(entries) => entries.get(segment)?,
                _ => return None,
            };
        }
        Some(current)
    }

    pub fn get_or_null(&self, path: &str) -> &Value {
        self.get(path).unwrap_or(&NULL)
    }
}
