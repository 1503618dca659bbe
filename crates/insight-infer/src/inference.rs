//! Schema inference: classified columns to a proposed graph mapping.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use insight_core::config as core_config;
use insight_core::value::DEFAULT_DATETIME_FORMATS;
use insight_core::{
    ColumnRole, ColumnType, EntityType, GraphMappingModel, InsightError, RelationshipType, Table,
};

use crate::classifier::{Classification, ColumnAssignment, RoleClassifier};
use crate::config::{NamingPolicy, ProfileConfig, RoleConfig};
use crate::naming::OVERLAP_VERB;
use crate::profiler::{ColumnProfiler, TableProfile};
use crate::rules::VALUE_OVERLAP;

/// A table that produced no entity type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnmappedTable {
    pub table: String,
    pub reason: String,
}

/// A relationship key that points at no mapped entity. The column is kept
/// as an attribute of its table's entity instead.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UnresolvedKey {
    pub table: String,
    pub column: String,
    pub reason: String,
}

/// Proposed mapping plus what could not be mapped.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct InferenceOutcome {
    pub model: GraphMappingModel,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmapped_tables: Vec<UnmappedTable>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unresolved_keys: Vec<UnresolvedKey>,
}

/// Why a relationship key has no target, or `None` when it has one.
fn unresolved_reason(key: &ColumnAssignment, mapped: &HashSet<&str>) -> Option<String> {
    match key.references.as_deref() {
        None => Some("matches no table identifier".to_string()),
        Some(target) if !mapped.contains(target) => {
            Some(format!("references unmapped table '{target}'"))
        }
        Some(_) => None,
    }
}

/// Build entity and relationship types from profiles and column roles.
///
/// Pure: the same inputs always give a structurally equal model.
pub fn infer_schema(
    profiles: &[TableProfile],
    classification: &Classification,
    policy: &NamingPolicy,
) -> InferenceOutcome {
    let mut outcome = InferenceOutcome::default();
    let mut entity_by_table: BTreeMap<&str, EntityType> = BTreeMap::new();
    let mut taken_names = HashSet::new();
    let mapped: HashSet<&str> = classification
        .tables
        .iter()
        .filter(|t| t.identifier.is_some())
        .map(|t| t.table.as_str())
        .collect();

    // ── Entities ─────────────────────────────────────────────────
    for roles in &classification.tables {
        let Some(identifier) = roles.identifier.as_deref() else {
            outcome.unmapped_tables.push(UnmappedTable {
                table: roles.table.clone(),
                reason: "no column qualifies as an entity identifier".to_string(),
            });
            continue;
        };

        let mut attributes = Vec::new();
        for a in &roles.columns {
            match a.role {
                ColumnRole::EntityAttribute => attributes.push(a.column.clone()),
                ColumnRole::RelationshipKey => {
                    if let Some(reason) = unresolved_reason(a, &mapped) {
                        tracing::warn!(
                            table = %roles.table,
                            column = %a.column,
                            reason = %reason,
                            "Relationship key kept as attribute"
                        );
                        outcome.unresolved_keys.push(UnresolvedKey {
                            table: roles.table.clone(),
                            column: a.column.clone(),
                            reason,
                        });
                        attributes.push(a.column.clone());
                    }
                }
                ColumnRole::EntityIdentifier | ColumnRole::Ignored => {}
            }
        }

        let name = unique_name(policy.entity_name(&roles.table), &mut taken_names);
        let mut entity =
            EntityType::new(name, roles.table.clone(), identifier).with_attributes(attributes);

        if let Some(profile) = profiles.iter().find(|p| p.table == roles.table) {
            let typed_columns: Vec<String> = std::iter::once(identifier.to_string())
                .chain(entity.attribute_columns.iter().cloned())
                .collect();
            for column in typed_columns {
                if let Some(p) = profile.column(&column) {
                    entity = entity.with_column_type(column, p.inferred_type);
                }
            }
        }

        entity_by_table.insert(roles.table.as_str(), entity);
    }

    // ── Relationships ────────────────────────────────────────────
    for roles in &classification.tables {
        let Some(source) = entity_by_table.get(roles.table.as_str()) else {
            continue;
        };

        // Keys, plus an identifier that also points at another table.
        let keys: Vec<(&ColumnAssignment, &EntityType)> = roles
            .columns
            .iter()
            .filter(|a| {
                matches!(
                    a.role,
                    ColumnRole::RelationshipKey | ColumnRole::EntityIdentifier
                )
            })
            .filter_map(|a| {
                let target = entity_by_table.get(a.references.as_deref()?)?;
                Some((a, target))
            })
            .collect();

        let bases: Vec<String> = keys
            .iter()
            .map(|(a, target)| {
                let verb = if a.rule == VALUE_OVERLAP {
                    OVERLAP_VERB
                } else {
                    policy.relationship_verb(&a.column)
                };
                policy.relationship_name(&source.name, verb, &target.name)
            })
            .collect();

        for ((a, target), base) in keys.iter().zip(&bases) {
            let name = if bases.iter().filter(|b| *b == base).count() > 1 {
                format!("{base}_{}", a.column)
            } else {
                base.clone()
            };
            outcome.model = outcome.model.with_relationship_type(RelationshipType::new(
                name,
                source.name.clone(),
                target.name.clone(),
                a.column.clone(),
                target.identifier_column.clone(),
            ));
        }
    }

    // Entities keep classification order.
    for roles in &classification.tables {
        if let Some(entity) = entity_by_table.remove(roles.table.as_str()) {
            outcome.model.entity_types.push(entity);
        }
    }

    tracing::info!(
        entities = outcome.model.entity_types.len(),
        relationships = outcome.model.relationship_types.len(),
        unmapped = outcome.unmapped_tables.len(),
        unresolved = outcome.unresolved_keys.len(),
        "Schema inferred"
    );
    outcome
}

fn unique_name(name: String, taken: &mut HashSet<String>) -> String {
    let mut candidate = name.clone();
    let mut n = 2;
    while !taken.insert(candidate.clone()) {
        candidate = format!("{name}{n}");
        n += 1;
    }
    candidate
}

/// Profiling, classification and inference bundled behind one configuration.
#[derive(Default)]
pub struct SchemaInference {
    profiler: ColumnProfiler,
    classifier: RoleClassifier,
}

impl SchemaInference {
    pub fn new(profile: ProfileConfig, roles: RoleConfig) -> Self {
        Self {
            profiler: ColumnProfiler::new(profile),
            classifier: RoleClassifier::new(roles),
        }
    }

    /// Read the `[profile]` and `[roles]` sections.
    pub fn from_config(cfg: &::config::Config) -> Result<Self, InsightError> {
        let profile = core_config::section::<ProfileConfig>(cfg, "profile")?;
        let roles = core_config::section::<RoleConfig>(cfg, "roles")?;
        Ok(Self::new(profile, roles))
    }

    pub fn profile(&self, tables: &[Table]) -> Vec<TableProfile> {
        tables
            .iter()
            .map(|t| self.profiler.profile_table(t))
            .collect()
    }

    /// Classify by column names only.
    pub fn classify(&self, profiles: &[TableProfile]) -> Classification {
        self.classifier.classify(profiles)
    }

    /// Classify with the tables at hand, so value overlap can be used when
    /// configured.
    pub fn classify_tables(&self, profiles: &[TableProfile], tables: &[Table]) -> Classification {
        self.classifier.classify_tables(profiles, tables)
    }

    /// Infer the model. Entities with datetime columns carry the configured
    /// datetime formats when they differ from the defaults, so construction
    /// parses values the way profiling did.
    pub fn infer(
        &self,
        profiles: &[TableProfile],
        classification: &Classification,
    ) -> InferenceOutcome {
        let mut outcome = infer_schema(profiles, classification, &self.classifier.config().naming);

        let formats = &self.profiler.config().datetime_formats;
        let default_formats = formats
            .iter()
            .map(String::as_str)
            .eq(DEFAULT_DATETIME_FORMATS.iter().copied());
        if !default_formats {
            for entity in &mut outcome.model.entity_types {
                if entity.column_types.values().any(|t| *t == ColumnType::Datetime) {
                    entity.datetime_formats = formats.clone();
                }
            }
        }
        outcome
    }

    /// Profile, classify and infer in one go.
    pub fn run(&self, tables: &[Table]) -> InferenceOutcome {
        let profiles = self.profile(tables);
        let classification = self.classify_tables(&profiles, tables);
        self.infer(&profiles, &classification)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::{ColumnType, Value};

    fn customer() -> Table {
        Table::with_columns("customer", &["id", "name", "city"])
            .row(vec!["1", "Ada", "London"])
            .row(vec!["2", "Grace", "Paris"])
    }

    fn order() -> Table {
        Table::with_columns("order", &["order_id", "customer_id", "amount"])
            .row(vec!["10", "1", "25.5"])
            .row(vec!["11", "2", "10"])
            .row(vec!["12", "1", "7"])
    }

    #[test]
    fn customer_order_example() {
        let outcome = SchemaInference::default().run(&[customer(), order()]);
        let model = outcome.model;

        let customer = model.entity("Customer").unwrap();
        assert_eq!(customer.identifier_column, "id");
        assert_eq!(customer.attribute_columns, vec!["name", "city"]);
        assert_eq!(customer.column_type("id"), Some(ColumnType::IdentifierLike));

        let order = model.entity("Order").unwrap();
        assert_eq!(order.identifier_column, "order_id");
        assert_eq!(order.attribute_columns, vec!["amount"]);

        let rel = model.relationship("Order_TO_Customer").unwrap();
        assert_eq!(rel.source_entity, "Order");
        assert_eq!(rel.target_entity, "Customer");
        assert_eq!(rel.source_key_column, "customer_id");
        assert_eq!(rel.target_key_column, "id");

        assert!(outcome.unmapped_tables.is_empty());
        assert!(model.validate().is_empty());
    }

    #[test]
    fn several_keys_to_one_target_get_column_suffix() {
        let order = Table::with_columns(
            "order",
            &["order_id", "billing_customer_id", "shipping_customer_id"],
        )
        .row(vec!["10", "1", "2"])
        .row(vec!["11", "2", "2"]);

        let model = SchemaInference::default().run(&[customer(), order]).model;
        let mut names: Vec<_> = model
            .relationship_types
            .iter()
            .map(|r| r.name.as_str())
            .collect();
        names.sort_unstable();
        assert_eq!(
            names,
            [
                "Order_TO_Customer_billing_customer_id",
                "Order_TO_Customer_shipping_customer_id"
            ]
        );
    }

    #[test]
    fn table_without_identifier_is_reported() {
        let log = Table::with_columns("log", &["level", "message"])
            .row(vec!["info", "started"])
            .row(vec!["info", "started"]);
        let outcome = SchemaInference::default().run(&[customer(), log]);

        assert_eq!(outcome.model.entity_types.len(), 1);
        assert_eq!(outcome.unmapped_tables[0].table, "log");
    }

    #[test]
    fn reclassified_roles_flow_into_the_model() {
        let inference = SchemaInference::default();
        let tables = [customer(), order()];
        let profiles = inference.profile(&tables);
        let classification = inference
            .classify(&profiles)
            .with_role("order", "customer_id", ColumnRole::Ignored);

        let outcome = inference.infer(&profiles, &classification);
        assert!(outcome.model.relationship_types.is_empty());
        assert_eq!(
            outcome.model.entity("Order").unwrap().attribute_columns,
            vec!["amount"]
        );
    }

    #[test]
    fn join_table_links_both_sides() {
        let orders = Table::with_columns("orders", &["order_id"]).row(vec!["1"]).row(vec!["2"]);
        let items = Table::with_columns("items", &["item_id"]).row(vec!["7"]).row(vec!["8"]);
        let order_items =
            Table::with_columns("order_items", &["order_item_id", "order_id", "item_id", "qty"])
                .row(vec!["100", "1", "7", "2"])
                .row(vec!["101", "1", "8", "1"])
                .row(vec!["102", "2", "7", "5"]);
        let outcome = SchemaInference::default().run(&[orders, items, order_items]);

        assert!(outcome.unmapped_tables.is_empty());
        let line = outcome.model.entity("OrderItem").unwrap();
        assert_eq!(line.identifier_column, "order_item_id");
        assert_eq!(line.attribute_columns, vec!["qty"]);
        assert_eq!(
            outcome.model.relationship("OrderItem_TO_Order").unwrap().source_key_column,
            "order_id"
        );
        assert_eq!(
            outcome.model.relationship("OrderItem_TO_Item").unwrap().target_key_column,
            "item_id"
        );
        assert!(outcome.model.validate().is_empty());
    }

    #[test]
    fn key_named_like_another_identifier_links_entities() {
        let clients = Table::with_columns("clients", &["customer_id", "name"])
            .row(vec!["1", "Ada"])
            .row(vec!["2", "Grace"]);
        let model = SchemaInference::default().run(&[clients, order()]).model;

        let rel = model.relationship("Order_TO_Client").unwrap();
        assert_eq!(rel.source_key_column, "customer_id");
        assert_eq!(rel.target_key_column, "customer_id");
        assert_eq!(model.entity("Order").unwrap().attribute_columns, vec!["amount"]);
    }

    #[test]
    fn extension_table_is_mapped_and_linked() {
        let profiles = Table::with_columns("customer_profiles", &["customer_id", "bio"])
            .row(vec!["1", "Mathematician"])
            .row(vec!["2", "Admiral"]);
        let outcome = SchemaInference::default().run(&[customer(), profiles]);

        assert!(outcome.unmapped_tables.is_empty());
        let profile = outcome.model.entity("CustomerProfile").unwrap();
        assert_eq!(profile.identifier_column, "customer_id");
        assert_eq!(profile.attribute_columns, vec!["bio"]);

        let rel = outcome.model.relationship("CustomerProfile_TO_Customer").unwrap();
        assert_eq!(rel.source_key_column, "customer_id");
        assert_eq!(rel.target_key_column, "id");
        assert!(outcome.model.validate().is_empty());
    }

    #[test]
    fn unresolved_key_is_reported_and_kept() {
        let order = Table::with_columns("order", &["order_id", "buyer", "amount"])
            .row(vec!["10", "1", "5"])
            .row(vec!["11", "2", "6"]);
        let inference = SchemaInference::default();
        let tables = [customer(), order];
        let profiles = inference.profile(&tables);
        let classification = inference
            .classify(&profiles)
            .with_role("order", "buyer", ColumnRole::RelationshipKey);

        let outcome = inference.infer(&profiles, &classification);
        assert!(outcome.model.relationship_types.is_empty());
        assert_eq!(
            outcome.model.entity("Order").unwrap().attribute_columns,
            vec!["buyer", "amount"]
        );
        assert_eq!(outcome.unresolved_keys.len(), 1);
        assert_eq!(outcome.unresolved_keys[0].table, "order");
        assert_eq!(outcome.unresolved_keys[0].column, "buyer");
    }

    #[test]
    fn restored_relationship_key_links_again() {
        let inference = SchemaInference::default();
        let tables = [customer(), order()];
        let profiles = inference.profile(&tables);
        let classification = inference
            .classify(&profiles)
            .with_role("order", "customer_id", ColumnRole::Ignored)
            .with_role("order", "customer_id", ColumnRole::RelationshipKey);

        let outcome = inference.infer(&profiles, &classification);
        assert!(outcome.model.relationship("Order_TO_Customer").is_some());
        assert!(outcome.unresolved_keys.is_empty());
    }

    #[test]
    fn semantic_verbs_name_relationships() {
        let owners = Table::with_columns("owners", &["owner_id", "name"])
            .row(vec!["1", "Ada"])
            .row(vec!["2", "Grace"]);
        let pets = Table::with_columns("pets", &["pet_id", "owner_id"])
            .row(vec!["5", "1"])
            .row(vec!["6", "1"]);
        let tables = [owners, pets];

        let model = SchemaInference::default().run(&tables).model;
        assert!(model.relationship("Pet_TO_Owner").is_some());

        let mut roles = RoleConfig::default();
        roles.naming.semantic_relationships = true;
        let model = SchemaInference::new(ProfileConfig::default(), roles).run(&tables).model;
        assert!(model.relationship("Pet_BELONGS_TO_Owner").is_some());
    }

    #[test]
    fn value_overlap_proposes_references() {
        let order = Table::with_columns("order", &["order_id", "buyer_id", "amount"])
            .row(vec!["10", "1", "5"])
            .row(vec!["11", "2", "6"])
            .row(vec!["12", "2", "7"]);
        let tables = [customer(), order];

        let outcome = SchemaInference::default().run(&tables);
        assert!(outcome.model.relationship_types.is_empty());

        let roles = RoleConfig {
            value_overlap: true,
            ..RoleConfig::default()
        };
        let model = SchemaInference::new(ProfileConfig::default(), roles).run(&tables).model;
        let rel = model.relationship("Order_REFERENCES_Customer").unwrap();
        assert_eq!(rel.source_key_column, "buyer_id");
        assert_eq!(rel.target_key_column, "id");
    }

    #[test]
    fn custom_datetime_formats_travel_with_entities() {
        let visits = Table::with_columns("visits", &["visit_id", "day"])
            .row(vec!["1", "03.02.2024"])
            .row(vec!["2", "04.02.2024"]);
        let profile = ProfileConfig {
            datetime_formats: vec!["%d.%m.%Y".to_string()],
            ..ProfileConfig::default()
        };
        let model = SchemaInference::new(profile, RoleConfig::default())
            .run(&[visits.clone()])
            .model;
        let visit = model.entity("Visit").unwrap();
        assert_eq!(visit.column_type("day"), Some(ColumnType::Datetime));
        assert_eq!(visit.datetime_formats, vec!["%d.%m.%Y"]);

        let model = SchemaInference::default().run(&[visits]).model;
        assert!(model.entity("Visit").unwrap().datetime_formats.is_empty());
    }

    #[test]
    fn colliding_entity_names_are_made_unique() {
        let a = Table::with_columns("orders", &["id"]).row(vec![Value::from("1")]);
        let b = Table::with_columns("order", &["id"]).row(vec![Value::from("1")]);
        let model = SchemaInference::default().run(&[a, b]).model;

        let names: Vec<_> = model.entity_types.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["Order", "Order2"]);
    }
}
