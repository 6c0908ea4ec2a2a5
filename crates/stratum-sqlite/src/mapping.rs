//! Convention-based automapping: entity type names are turned into table
//! mappings, producing a serializable engine configuration.

use serde::{Deserialize, Serialize};
use stratum_persistence::repository::Entity;

/// An error building the mapping model.
#[derive(Debug, thiserror::Error)]
pub enum MappingError {
    /// The entity was added to the model twice.
    #[error("The entity {0} is already part of the model")]
    DuplicateEntity(String),

    /// Two entities derived the same table name.
    #[error("The table name {0} is derived by more than one entity")]
    DuplicateTable(String),

    /// A derived identifier is not usable in SQL.
    #[error("The derived identifier {0} is not a valid SQL identifier")]
    InvalidIdentifier(String),
}

/// A single entity-to-table mapping produced by the automapper.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EntityMapping {
    /// The registered entity type name.
    pub entity: String,
    /// The table the entity is stored in.
    pub table: String,
}

/// Naming conventions applied when deriving table names from entity names.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct NamingConventions {
    /// Prefix prepended verbatim to every derived table name.
    pub table_prefix: Option<String>,
}

/// The fully resolved engine configuration. This is what gets built from an
/// [AutomapModel], cached by the configuration file cache and consumed by the
/// session factory.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfiguration {
    /// The conventions the mappings were derived with.
    pub conventions: NamingConventions,
    /// One mapping per registered entity.
    pub mappings: Vec<EntityMapping>,
}

/// Collects entity types and derives their table mappings by convention.
#[derive(Default)]
pub struct AutomapModel {
    conventions: NamingConventions,
    entities: Vec<String>,
}

impl AutomapModel {
    /// Creates an empty model with default conventions.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the naming conventions.
    pub fn conventions(mut self, conventions: NamingConventions) -> Self {
        self.conventions = conventions;
        self
    }

    /// Adds an entity type to the model.
    pub fn entity<T: Entity>(mut self) -> Self {
        self.entities.push(T::NAME.to_string());
        self
    }

    /// Derives the engine configuration for the collected entities.
    pub fn build(&self) -> Result<EngineConfiguration, MappingError> {
        let mut mappings: Vec<EntityMapping> = Vec::with_capacity(self.entities.len());

        for entity in &self.entities {
            if mappings.iter().any(|m| m.entity == *entity) {
                return Err(MappingError::DuplicateEntity(entity.clone()));
            }

            let table = derive_table_name(&self.conventions, entity);
            validate_identifier(&table)?;
            if mappings.iter().any(|m| m.table == table) {
                return Err(MappingError::DuplicateTable(table));
            }

            mappings.push(EntityMapping {
                entity: entity.clone(),
                table,
            });
        }

        Ok(EngineConfiguration {
            conventions: self.conventions.clone(),
            mappings,
        })
    }
}

/// Snake-cases the entity name and prepends the configured prefix.
fn derive_table_name(conventions: &NamingConventions, entity: &str) -> String {
    let mut table = conventions.table_prefix.clone().unwrap_or_default();

    let mut prev_lower = false;
    for c in entity.chars() {
        if c.is_ascii_uppercase() {
            if prev_lower {
                table.push('_');
            }
            table.push(c.to_ascii_lowercase());
            prev_lower = false;
        } else {
            table.push(c);
            prev_lower = c.is_ascii_lowercase() || c.is_ascii_digit();
        }
    }
    table
}

/// Table names end up interpolated into SQL and must stay plain identifiers.
fn validate_identifier(name: &str) -> Result<(), MappingError> {
    let mut chars = name.chars();
    let valid_start = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if valid_start && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(())
    } else {
        Err(MappingError::InvalidIdentifier(name.to_string()))
    }
}
