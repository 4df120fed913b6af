pub mod schema;
pub mod types;

use crate::catalog::schema::{
    ClassSchema, FieldRole, FieldSpec, IndexDefinition, IndexSpec, PropertyDef,
};
use crate::catalog::types::ValueType;
use crate::error::{EngineError, ResourceType};
use im::HashMap;
use serde::{Deserialize, Serialize};

const MAX_IDENTIFIER_LEN: usize = 128;

/// Registry of record types and the index definitions declared on them.
///
/// One catalog is owned by each [`crate::Database`]; tests may build isolated instances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexCatalog {
    classes: HashMap<String, ClassSchema>,
    indexes: HashMap<String, IndexDefinition>,
    next_ordinal: u64,
    next_segment: i32,
    /// Bumped whenever the set of index definitions changes.
    version: u64,
}

impl Default for IndexCatalog {
    fn default() -> Self {
        Self {
            classes: HashMap::new(),
            indexes: HashMap::new(),
            next_ordinal: 0,
            next_segment: 1,
            version: 0,
        }
    }
}

fn validate_identifier(value: &str, what: &str) -> Result<(), EngineError> {
    if value.is_empty() {
        return Err(EngineError::Validation(format!("{what} must not be empty")));
    }
    if value.len() > MAX_IDENTIFIER_LEN {
        return Err(EngineError::Validation(format!(
            "{what} exceeds {MAX_IDENTIFIER_LEN} bytes"
        )));
    }
    if value
        .chars()
        .any(|c| !(c.is_alphanumeric() || c == '_' || c == '.' || c == '-'))
    {
        return Err(EngineError::Validation(format!(
            "{what} contains invalid characters: {value}"
        )));
    }
    Ok(())
}

impl IndexCatalog {
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn create_class(
        &mut self,
        name: &str,
        superclass: Option<&str>,
        properties: Vec<PropertyDef>,
    ) -> Result<&ClassSchema, EngineError> {
        validate_identifier(name, "record type name")?;
        if name.contains('.') {
            return Err(EngineError::Validation(format!(
                "record type name must not contain '.': {name}"
            )));
        }
        if self.classes.contains_key(name) {
            return Err(EngineError::AlreadyExists {
                resource_type: ResourceType::RecordType,
                resource_id: name.to_string(),
            });
        }
        if let Some(parent) = superclass
            && !self.classes.contains_key(parent)
        {
            return Err(EngineError::NotFound {
                resource_type: ResourceType::RecordType,
                resource_id: parent.to_string(),
            });
        }
        for (i, prop) in properties.iter().enumerate() {
            validate_identifier(&prop.name, "property name")?;
            if prop.name.contains('.') {
                return Err(EngineError::Validation(format!(
                    "property name must not contain '.': {}",
                    prop.name
                )));
            }
            if properties[..i].iter().any(|p| p.name == prop.name) {
                return Err(EngineError::AlreadyExists {
                    resource_type: ResourceType::Property,
                    resource_id: format!("{name}.{}", prop.name),
                });
            }
        }
        let segment = self.next_segment;
        self.next_segment += 1;
        self.classes.insert(
            name.to_string(),
            ClassSchema {
                name: name.to_string(),
                superclass: superclass.map(str::to_string),
                properties,
                segment,
            },
        );
        self.classes.get(name).ok_or_else(|| EngineError::NotFound {
            resource_type: ResourceType::RecordType,
            resource_id: name.to_string(),
        })
    }

    pub fn class(&self, name: &str) -> Option<&ClassSchema> {
        self.classes.get(name)
    }

    /// Walks the superclass chain of `name`, starting with `name` itself.
    pub fn lineage(&self, name: &str) -> Vec<&ClassSchema> {
        let mut out = Vec::new();
        let mut current = self.classes.get(name);
        while let Some(class) = current {
            if out.iter().any(|c: &&ClassSchema| c.name == class.name) {
                break;
            }
            out.push(class);
            current = class
                .superclass
                .as_deref()
                .and_then(|parent| self.classes.get(parent));
        }
        out
    }

    pub fn is_subclass_of(&self, name: &str, ancestor: &str) -> bool {
        self.lineage(name).iter().any(|c| c.name == ancestor)
    }

    /// Names of `name` and every class that inherits from it.
    pub fn subclasses_of(&self, name: &str) -> Vec<String> {
        let mut out: Vec<String> = self
            .classes
            .keys()
            .filter(|candidate| self.is_subclass_of(candidate, name))
            .cloned()
            .collect();
        out.sort();
        out
    }

    /// Declared type of a property, searching the class and its supertypes. Dotted paths
    /// descend into embedded properties, whose sub-properties take the embedded property's
    /// linked type (or `Any` when undeclared).
    pub fn property_type(
        &self,
        record_type: &str,
        path: &str,
    ) -> Result<(ValueType, Option<ValueType>), EngineError> {
        let mut segments = path.split('.');
        let head = segments.next().unwrap_or_default();
        let prop = self
            .lineage(record_type)
            .into_iter()
            .find_map(|class| class.property(head))
            .ok_or_else(|| EngineError::NotFound {
                resource_type: ResourceType::Property,
                resource_id: format!("{record_type}.{path}"),
            })?;
        let rest: Vec<&str> = segments.collect();
        if rest.is_empty() {
            return Ok((prop.value_type, prop.linked_type));
        }
        if !matches!(prop.value_type, ValueType::Embedded | ValueType::Any) {
            return Err(EngineError::Validation(format!(
                "property path '{path}' descends into non-embedded property '{head}' of type {}",
                prop.value_type
            )));
        }
        Ok((prop.linked_type.unwrap_or(ValueType::Any), None))
    }

    pub fn create_index(
        &mut self,
        spec: IndexSpec,
        default_ignore_nulls: bool,
    ) -> Result<IndexDefinition, EngineError> {
        validate_identifier(&spec.name, "index name")?;
        if self.indexes.contains_key(&spec.name) {
            return Err(EngineError::AlreadyExists {
                resource_type: ResourceType::Index,
                resource_id: spec.name,
            });
        }
        if !self.classes.contains_key(&spec.record_type) {
            return Err(EngineError::NotFound {
                resource_type: ResourceType::RecordType,
                resource_id: spec.record_type,
            });
        }
        if spec.fields.is_empty() {
            return Err(EngineError::Validation(format!(
                "index '{}' declares no fields",
                spec.name
            )));
        }
        let multi_valued = spec.fields.iter().filter(|f| f.role.is_multi_valued()).count();
        if multi_valued > 1 {
            return Err(EngineError::Validation(format!(
                "index '{}' declares {multi_valued} collection-valued fields; at most one is supported",
                spec.name
            )));
        }
        for (i, field) in spec.fields.iter().enumerate() {
            if spec.fields[..i]
                .iter()
                .any(|f| f.property_path == field.property_path && f.role == field.role)
            {
                return Err(EngineError::Validation(format!(
                    "index '{}' lists field '{}' twice",
                    spec.name, field.property_path
                )));
            }
        }

        let mut key_types = Vec::with_capacity(spec.fields.len());
        for field in &spec.fields {
            key_types.push(self.key_type_for(&spec.name, &spec.record_type, field)?);
        }

        let definition = IndexDefinition {
            name: spec.name.clone(),
            record_type: spec.record_type,
            uniqueness: spec.uniqueness,
            fields: spec.fields,
            key_types,
            ignore_nulls: spec.ignore_nulls.unwrap_or(default_ignore_nulls),
            ordinal: self.next_ordinal,
        };
        self.next_ordinal += 1;
        self.version += 1;
        self.indexes.insert(spec.name, definition.clone());
        Ok(definition)
    }

    fn key_type_for(
        &self,
        index_name: &str,
        record_type: &str,
        field: &FieldSpec,
    ) -> Result<ValueType, EngineError> {
        let (declared, linked) = self.property_type(record_type, &field.property_path)?;
        let mismatch = |reason: String| EngineError::DefinitionMismatch {
            index: index_name.to_string(),
            field: field.property_path.clone(),
            reason,
        };
        match field.role {
            FieldRole::Scalar => Ok(declared),
            FieldRole::CollectionElement => match declared {
                t if t.is_collection() && t.is_link_container() => Ok(ValueType::Link),
                t if t.is_collection() => Ok(linked.unwrap_or(ValueType::Any)),
                ValueType::Any => Ok(ValueType::Any),
                other => Err(mismatch(format!(
                    "collection element role requires a collection property, found {other}"
                ))),
            },
            FieldRole::MapKey => match declared {
                t if t.is_map() => Ok(ValueType::String),
                ValueType::Any => Ok(ValueType::String),
                other => Err(mismatch(format!(
                    "map key role requires a map property, found {other}"
                ))),
            },
            FieldRole::MapValue => match declared {
                t if t.is_map() && t.is_link_container() => Ok(ValueType::Link),
                t if t.is_map() => Ok(linked.unwrap_or(ValueType::Any)),
                ValueType::Any => Ok(ValueType::Any),
                other => Err(mismatch(format!(
                    "map value role requires a map property, found {other}"
                ))),
            },
        }
    }

    pub fn drop_index(&mut self, name: &str) -> Result<IndexDefinition, EngineError> {
        let removed = self
            .indexes
            .remove(name)
            .ok_or_else(|| EngineError::NotFound {
                resource_type: ResourceType::Index,
                resource_id: name.to_string(),
            })?;
        self.version += 1;
        Ok(removed)
    }

    pub fn index(&self, name: &str) -> Option<&IndexDefinition> {
        self.indexes.get(name)
    }

    /// All definitions in declaration order.
    pub fn indexes(&self) -> Vec<&IndexDefinition> {
        let mut out: Vec<&IndexDefinition> = self.indexes.values().collect();
        out.sort_by_key(|d| d.ordinal);
        out
    }

    /// Definitions covering records of `record_type`, including those declared on its
    /// supertypes, in declaration order.
    pub fn indexes_for_type(&self, record_type: &str) -> Vec<&IndexDefinition> {
        let lineage: Vec<&str> = self
            .lineage(record_type)
            .into_iter()
            .map(|c| c.name.as_str())
            .collect();
        let mut out: Vec<&IndexDefinition> = self
            .indexes
            .values()
            .filter(|d| lineage.contains(&d.record_type.as_str()))
            .collect();
        out.sort_by_key(|d| d.ordinal);
        out
    }
}
