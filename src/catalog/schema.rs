use crate::catalog::types::ValueType;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PropertyDef {
    pub name: String,
    pub value_type: ValueType,
    /// Element type for embedded collections and maps, or the value type an embedded
    /// object's sub-property is declared with.
    #[serde(default)]
    pub linked_type: Option<ValueType>,
}

impl PropertyDef {
    pub fn new(name: &str, value_type: ValueType) -> Self {
        Self {
            name: name.to_string(),
            value_type,
            linked_type: None,
        }
    }

    pub fn with_linked_type(mut self, linked_type: ValueType) -> Self {
        self.linked_type = Some(linked_type);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ClassSchema {
    pub name: String,
    #[serde(default)]
    pub superclass: Option<String>,
    pub properties: Vec<PropertyDef>,
    pub segment: i32,
}

impl ClassSchema {
    pub fn property(&self, name: &str) -> Option<&PropertyDef> {
        self.properties.iter().find(|p| p.name == name)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Uniqueness {
    Unique,
    NotUnique,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum FieldRole {
    Scalar,
    CollectionElement,
    MapKey,
    MapValue,
}

impl FieldRole {
    pub fn is_multi_valued(self) -> bool {
        !matches!(self, FieldRole::Scalar)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FieldSpec {
    pub property_path: String,
    pub role: FieldRole,
}

impl FieldSpec {
    pub fn scalar(path: &str) -> Self {
        Self {
            property_path: path.to_string(),
            role: FieldRole::Scalar,
        }
    }

    pub fn element(path: &str) -> Self {
        Self {
            property_path: path.to_string(),
            role: FieldRole::CollectionElement,
        }
    }

    pub fn map_key(path: &str) -> Self {
        Self {
            property_path: path.to_string(),
            role: FieldRole::MapKey,
        }
    }

    pub fn map_value(path: &str) -> Self {
        Self {
            property_path: path.to_string(),
            role: FieldRole::MapValue,
        }
    }
}

/// Index request as supplied by a caller; the catalog resolves key types when it registers it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexSpec {
    pub name: String,
    pub record_type: String,
    pub uniqueness: Uniqueness,
    pub fields: Vec<FieldSpec>,
    #[serde(default)]
    pub ignore_nulls: Option<bool>,
}

impl IndexSpec {
    pub fn new(name: &str, record_type: &str, uniqueness: Uniqueness) -> Self {
        Self {
            name: name.to_string(),
            record_type: record_type.to_string(),
            uniqueness,
            fields: Vec::new(),
            ignore_nulls: None,
        }
    }

    pub fn field(mut self, field: FieldSpec) -> Self {
        self.fields.push(field);
        self
    }

    pub fn ignore_nulls(mut self, ignore: bool) -> Self {
        self.ignore_nulls = Some(ignore);
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct IndexDefinition {
    pub name: String,
    pub record_type: String,
    pub uniqueness: Uniqueness,
    pub fields: Vec<FieldSpec>,
    pub key_types: Vec<ValueType>,
    pub ignore_nulls: bool,
    /// Position in declaration order; used as the planner's final tie-break.
    pub ordinal: u64,
}

impl IndexDefinition {
    pub fn is_unique(&self) -> bool {
        self.uniqueness == Uniqueness::Unique
    }

    pub fn is_composite(&self) -> bool {
        self.fields.len() > 1
    }

    pub fn field_position(&self, path: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.property_path == path)
    }
}
