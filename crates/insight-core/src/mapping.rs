//! The graph mapping model: the editable bridge between inference and
//! construction.
//!
//! A `GraphMappingModel` is a plain value. Edits consume a snapshot and return
//! a new one, so the model a caller reviewed is exactly the model that gets
//! built. Construction only accepts a [`ValidatedModel`], which can only be
//! obtained from a model with no schema violations.

use std::collections::HashSet;
use std::ops::Deref;

use serde::{Deserialize, Serialize};

use crate::error::InsightError;
use crate::types::{EntityType, RelationshipType};
use crate::value::Table;

/// Entities and relationships proposed by inference and confirmed by a caller.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct GraphMappingModel {
    #[serde(default)]
    pub entity_types: Vec<EntityType>,
    #[serde(default)]
    pub relationship_types: Vec<RelationshipType>,
}

/// A broken invariant of the mapping model, returned by validation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SchemaViolation {
    #[error("entity type has an empty name (source table '{source_table}')")]
    EmptyEntityName { source_table: String },

    #[error("entity type '{entity}' is declared more than once")]
    DuplicateEntity { entity: String },

    #[error("entity type '{entity}' has no identifier column")]
    MissingIdentifier { entity: String },

    #[error("entity type '{entity}' lists its identifier '{column}' as an attribute")]
    IdentifierIsAttribute { entity: String, column: String },

    #[error("entity type '{entity}' lists attribute '{column}' more than once")]
    DuplicateAttribute { entity: String, column: String },

    #[error("relationship type has an empty name ({source_entity} -> {target_entity})")]
    EmptyRelationshipName {
        source_entity: String,
        target_entity: String,
    },

    #[error("relationship type '{relationship}' is declared more than once")]
    DuplicateRelationship { relationship: String },

    #[error("relationship '{relationship}' references unknown entity type '{entity}'")]
    UnknownEntity {
        relationship: String,
        entity: String,
    },

    #[error("relationship '{relationship}' has no source key column")]
    MissingSourceKey { relationship: String },

    #[error(
        "relationship '{relationship}' targets column '{column}' but '{entity}' is identified by '{identifier}'"
    )]
    TargetKeyNotIdentifier {
        relationship: String,
        entity: String,
        column: String,
        identifier: String,
    },

    #[error("entity type '{entity}' reads from table '{table}', which was not supplied")]
    MissingTable { entity: String, table: String },

    #[error("'{owner}' uses column '{column}', which table '{table}' does not have")]
    MissingColumn {
        owner: String,
        table: String,
        column: String,
    },
}

impl GraphMappingModel {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entity(&self, name: &str) -> Option<&EntityType> {
        self.entity_types.iter().find(|e| e.name == name)
    }

    pub fn relationship(&self, name: &str) -> Option<&RelationshipType> {
        self.relationship_types.iter().find(|r| r.name == name)
    }

    pub fn is_empty(&self) -> bool {
        self.entity_types.is_empty() && self.relationship_types.is_empty()
    }

    // ── Snapshot Edits ───────────────────────────────────────────

    /// Add an entity type, replacing any existing one with the same name.
    pub fn with_entity_type(mut self, entity: EntityType) -> Self {
        match self.entity_types.iter_mut().find(|e| e.name == entity.name) {
            Some(existing) => *existing = entity,
            None => self.entity_types.push(entity),
        }
        self
    }

    /// Remove an entity type together with every relationship touching it.
    pub fn without_entity_type(mut self, name: &str) -> Self {
        self.entity_types.retain(|e| e.name != name);
        self.relationship_types
            .retain(|r| r.source_entity != name && r.target_entity != name);
        self
    }

    /// Add a relationship type, replacing any existing one with the same name.
    pub fn with_relationship_type(mut self, relationship: RelationshipType) -> Self {
        match self
            .relationship_types
            .iter_mut()
            .find(|r| r.name == relationship.name)
        {
            Some(existing) => *existing = relationship,
            None => self.relationship_types.push(relationship),
        }
        self
    }

    pub fn without_relationship_type(mut self, name: &str) -> Self {
        self.relationship_types.retain(|r| r.name != name);
        self
    }

    pub fn rename_relationship_type(mut self, from: &str, to: impl Into<String>) -> Self {
        let to = to.into();
        if let Some(rel) = self.relationship_types.iter_mut().find(|r| r.name == from) {
            rel.name = to;
        }
        self
    }

    /// Drop one attribute column from an entity type.
    pub fn without_attribute(mut self, entity: &str, column: &str) -> Self {
        if let Some(e) = self.entity_types.iter_mut().find(|e| e.name == entity) {
            e.attribute_columns.retain(|c| c != column);
        }
        self
    }

    // ── Validation ───────────────────────────────────────────────

    /// Check the model's structural invariants.
    ///
    /// Violations are returned, never raised, so callers can show all of them
    /// at once and fix the model before construction.
    pub fn validate(&self) -> Vec<SchemaViolation> {
        let mut violations = Vec::new();
        let mut seen_entities = HashSet::new();

        for entity in &self.entity_types {
            if entity.name.trim().is_empty() {
                violations.push(SchemaViolation::EmptyEntityName {
                    source_table: entity.source_table.clone(),
                });
            }
            if !seen_entities.insert(entity.name.as_str()) {
                violations.push(SchemaViolation::DuplicateEntity {
                    entity: entity.name.clone(),
                });
            }
            if entity.identifier_column.trim().is_empty() {
                violations.push(SchemaViolation::MissingIdentifier {
                    entity: entity.name.clone(),
                });
            }

            let mut seen_attributes = HashSet::new();
            for column in &entity.attribute_columns {
                if *column == entity.identifier_column {
                    violations.push(SchemaViolation::IdentifierIsAttribute {
                        entity: entity.name.clone(),
                        column: column.clone(),
                    });
                }
                if !seen_attributes.insert(column.as_str()) {
                    violations.push(SchemaViolation::DuplicateAttribute {
                        entity: entity.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        let mut seen_relationships = HashSet::new();
        for rel in &self.relationship_types {
            if rel.name.trim().is_empty() {
                violations.push(SchemaViolation::EmptyRelationshipName {
                    source_entity: rel.source_entity.clone(),
                    target_entity: rel.target_entity.clone(),
                });
            }
            if !seen_relationships.insert(rel.name.as_str()) {
                violations.push(SchemaViolation::DuplicateRelationship {
                    relationship: rel.name.clone(),
                });
            }
            if rel.source_key_column.trim().is_empty() {
                violations.push(SchemaViolation::MissingSourceKey {
                    relationship: rel.name.clone(),
                });
            }

            if self.entity(&rel.source_entity).is_none() {
                violations.push(SchemaViolation::UnknownEntity {
                    relationship: rel.name.clone(),
                    entity: rel.source_entity.clone(),
                });
            }
            match self.entity(&rel.target_entity) {
                None => violations.push(SchemaViolation::UnknownEntity {
                    relationship: rel.name.clone(),
                    entity: rel.target_entity.clone(),
                }),
                Some(target) if target.identifier_column != rel.target_key_column => {
                    violations.push(SchemaViolation::TargetKeyNotIdentifier {
                        relationship: rel.name.clone(),
                        entity: target.name.clone(),
                        column: rel.target_key_column.clone(),
                        identifier: target.identifier_column.clone(),
                    });
                }
                Some(_) => {}
            }
        }

        violations
    }

    /// Structural validation plus a check that every table and column the
    /// model reads actually exists in `tables`.
    pub fn validate_against(&self, tables: &[Table]) -> Vec<SchemaViolation> {
        let mut violations = self.validate();

        for entity in &self.entity_types {
            let Some(table) = tables.iter().find(|t| t.name == entity.source_table) else {
                violations.push(SchemaViolation::MissingTable {
                    entity: entity.name.clone(),
                    table: entity.source_table.clone(),
                });
                continue;
            };
            for column in
                std::iter::once(&entity.identifier_column).chain(&entity.attribute_columns)
            {
                if !table.has_column(column) {
                    violations.push(SchemaViolation::MissingColumn {
                        owner: entity.name.clone(),
                        table: table.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        for rel in &self.relationship_types {
            let Some(source) = self.entity(&rel.source_entity) else {
                continue;
            };
            let Some(table) = tables.iter().find(|t| t.name == source.source_table) else {
                continue;
            };
            for column in std::iter::once(&rel.source_key_column).chain(&rel.attribute_columns) {
                if !table.has_column(column) {
                    violations.push(SchemaViolation::MissingColumn {
                        owner: rel.name.clone(),
                        table: table.name.clone(),
                        column: column.clone(),
                    });
                }
            }
        }

        violations
    }

    /// Freeze the model for construction, or return every violation found.
    pub fn into_validated(self) -> Result<ValidatedModel, Vec<SchemaViolation>> {
        let violations = self.validate();
        if !violations.is_empty() {
            return Err(violations);
        }
        let fingerprint = self.fingerprint();
        Ok(ValidatedModel {
            model: self,
            fingerprint,
        })
    }

    // ── Fingerprint & Serialization ──────────────────────────────

    /// BLAKE3 hash (hex) of the model's canonical JSON form.
    ///
    /// Two models with the same fingerprint build the same graph; the
    /// construction report records it so a run can be traced to its snapshot.
    pub fn fingerprint(&self) -> String {
        let json = serde_json::to_vec(self).expect("Mapping model serialization should not fail");
        blake3::hash(&json).to_hex().to_string()
    }

    pub fn to_json(&self) -> Result<String, InsightError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, InsightError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_yaml(&self) -> Result<String, InsightError> {
        Ok(serde_yaml::to_string(self)?)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self, InsightError> {
        Ok(serde_yaml::from_str(yaml)?)
    }
}

/// An immutable mapping snapshot that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedModel {
    model: GraphMappingModel,
    fingerprint: String,
}

impl ValidatedModel {
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn model(&self) -> &GraphMappingModel {
        &self.model
    }

    /// Give the snapshot back for further editing.
    pub fn into_inner(self) -> GraphMappingModel {
        self.model
    }
}

impl Deref for ValidatedModel {
    type Target = GraphMappingModel;

    fn deref(&self) -> &Self::Target {
        &self.model
    }
}

impl TryFrom<GraphMappingModel> for ValidatedModel {
    type Error = InsightError;

    fn try_from(model: GraphMappingModel) -> Result<Self, Self::Error> {
        model.into_validated().map_err(InsightError::Schema)
    }
}
