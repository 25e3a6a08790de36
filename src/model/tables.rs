//! Destination dataset and table references

use std::fmt;

use super::EntityDescriptor;
use crate::error::IngestError;

/// Prefix of the staging table name, e.g. `temp_EmpJob`
pub const STAGING_TABLE_PREFIX: &str = "temp_";

/// A warehouse dataset, `project.dataset`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DatasetRef {
    pub project: String,
    pub dataset: String,
}

impl DatasetRef {
    pub fn table(&self, table: &str) -> TableRef {
        TableRef {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
            table: table.to_string(),
        }
    }
}

impl fmt::Display for DatasetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.project, self.dataset)
    }
}

/// A fully qualified warehouse table, `project.dataset.table`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TableRef {
    pub project: String,
    pub dataset: String,
    pub table: String,
}

impl TableRef {
    pub fn dataset_ref(&self) -> DatasetRef {
        DatasetRef {
            project: self.project.clone(),
            dataset: self.dataset.clone(),
        }
    }

    /// Backtick-quoted form for use in SQL text
    pub fn sql(&self) -> String {
        format!("`{}.{}.{}`", self.project, self.dataset, self.table)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.project, self.dataset, self.table)
    }
}

/// The three tables an entity lands in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTables {
    /// All-string load target, dropped after every run
    pub staging: TableRef,
    /// Typed, ingestion-time partitioned append log
    pub final_table: TableRef,
    /// Merge target in the refined project
    pub refined: TableRef,
}

impl EntityTables {
    /// Derive table references for an entity.
    ///
    /// Staging and final tables live in `project`, the refined table in
    /// `refined_project`; all share the entity's module dataset name.
    pub fn for_entity(
        entity: &EntityDescriptor,
        project: &str,
        refined_project: &str,
        dataset_prefix: &str,
    ) -> Result<Self, IngestError> {
        let dataset = entity.dataset_name(dataset_prefix)?;
        let raw = DatasetRef {
            project: project.to_string(),
            dataset: dataset.clone(),
        };
        let refined = DatasetRef {
            project: refined_project.to_string(),
            dataset,
        };

        Ok(Self {
            staging: raw.table(&format!("{}{}", STAGING_TABLE_PREFIX, entity.name)),
            final_table: raw.table(&entity.name),
            refined: refined.table(&entity.name),
        })
    }
}
