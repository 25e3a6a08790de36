//! Normalized entity descriptor derived from OData metadata

use std::collections::HashSet;

use serde::Serialize;

use crate::edm::{EdmType, WarehouseType};
use crate::error::IngestError;
use crate::sql::validate_identifier;

/// A single visible OData property
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub source_type: EdmType,
    pub warehouse_type: WarehouseType,
    pub nullable: bool,
    /// `"{label}."` or `"{label}. PickList: {picklist}."`
    pub description: String,
}

impl FieldDescriptor {
    pub fn new(name: &str, source_type: EdmType, nullable: bool, description: String) -> Self {
        Self {
            name: name.to_string(),
            source_type,
            warehouse_type: source_type.warehouse_type(),
            nullable,
            description,
        }
    }

    /// Column type in the staging table (everything is a string except booleans)
    pub fn staging_type(&self) -> WarehouseType {
        self.warehouse_type.staging_type()
    }
}

/// Build a column description from a property label and optional pick-list name.
pub fn column_description(label: &str, picklist: Option<&str>) -> String {
    match picklist.filter(|p| !p.is_empty()) {
        Some(picklist) => format!("{}. PickList: {}.", label, picklist),
        None => format!("{}.", label),
    }
}

/// Entity schema as described by the remote `$metadata` document
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EntityDescriptor {
    pub name: String,
    /// Module tag, e.g. "Employee Central (EC)"
    pub module: String,
    pub description: String,
    pub keys: Vec<String>,
    pub fields: Vec<FieldDescriptor>,
}

impl EntityDescriptor {
    /// Build a descriptor, rejecting anything that would produce invalid SQL.
    pub fn new(
        name: String,
        module: String,
        description: String,
        keys: Vec<String>,
        fields: Vec<FieldDescriptor>,
    ) -> Result<Self, IngestError> {
        let descriptor = Self {
            name,
            module,
            description,
            keys,
            fields,
        };
        descriptor.validate()?;
        Ok(descriptor)
    }

    pub fn validate(&self) -> Result<(), IngestError> {
        validate_identifier(&self.name)?;

        let mut seen = HashSet::with_capacity(self.fields.len());
        for field in &self.fields {
            validate_identifier(&field.name)?;
            if !seen.insert(field.name.as_str()) {
                return Err(IngestError::DuplicateFieldError {
                    entity: self.name.clone(),
                    field: field.name.clone(),
                });
            }
        }

        if self.keys.is_empty() {
            return Err(IngestError::EmptyKeysError {
                entity: self.name.clone(),
            });
        }
        for key in &self.keys {
            if !seen.contains(key.as_str()) {
                return Err(IngestError::UnknownKeyError {
                    entity: self.name.clone(),
                    key: key.clone(),
                });
            }
        }

        self.module_code()?;
        Ok(())
    }

    /// Short lowercase module code, e.g. "ec" for "Employee Central (EC)".
    ///
    /// Taken from between the first `(` and the next `)`; a tag without
    /// parentheses is used whole. Characters that cannot appear in a dataset
    /// name become `_`.
    pub fn module_code(&self) -> Result<String, IngestError> {
        let inner = match self.module.find('(') {
            Some(open) => {
                let rest = &self.module[open + 1..];
                match rest.find(')') {
                    Some(close) => &rest[..close],
                    None => rest,
                }
            }
            None => self.module.as_str(),
        };

        let code: String = inner
            .trim()
            .to_lowercase()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();

        if code.is_empty() {
            return Err(IngestError::ModuleNotFoundError {
                entity: self.name.clone(),
            });
        }
        Ok(code)
    }

    /// Dataset that namespaces this entity's tables, e.g. `ds_sfsf_ec`.
    pub fn dataset_name(&self, prefix: &str) -> Result<String, IngestError> {
        Ok(format!("{}_{}", prefix, self.module_code()?))
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn is_key(&self, name: &str) -> bool {
        self.keys.iter().any(|k| k == name)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn non_key_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !self.is_key(&f.name))
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.field(name).is_some()
    }
}
