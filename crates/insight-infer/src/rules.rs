//! Column role rules.
//!
//! Each rule looks at one column and either assigns a role or has no opinion.
//! The classifier runs rules in order and the first opinion wins, so every
//! rule can be tested on its own.

use insight_core::{ColumnProfile, ColumnRole};

use crate::classifier::{IdentifierRegistry, KeyValues};
use crate::config::RoleConfig;

/// Name of the [`ValueOverlap`] rule, recorded on the columns it decides.
pub const VALUE_OVERLAP: &str = "value_overlap";

/// Everything a rule may look at for one column.
#[derive(Debug, Clone, Copy)]
pub struct RuleContext<'a> {
    pub table: &'a str,
    pub column: &'a str,
    pub profile: &'a ColumnProfile,
    /// Identifier chosen for this column's table in the first pass.
    pub own_identifier: Option<&'a str>,
    /// Identifiers chosen for every table profiled together.
    pub registry: &'a IdentifierRegistry,
    /// Key column values, present when classifying with value overlap.
    pub values: Option<&'a KeyValues>,
    pub config: &'a RoleConfig,
}

/// A single classification rule.
pub trait RoleRule: Send + Sync {
    /// Get the name of this rule.
    fn name(&self) -> &'static str;

    /// Get a description of what this rule does.
    fn description(&self) -> &'static str {
        "No description available"
    }

    /// Return a role, or `None` to defer to the next rule.
    fn classify(&self, ctx: &RuleContext<'_>) -> Option<ColumnRole>;
}

/// The standard rule order.
pub fn default_rules() -> Vec<Box<dyn RoleRule>> {
    vec![
        Box::new(IgnoredByConfig),
        Box::new(DeclaredRole),
        Box::new(OwnIdentifier),
        Box::new(ForeignKeyReference),
        Box::new(ValueOverlap),
        Box::new(Attribute),
    ]
}

/// Columns listed in `roles.ignored_columns`.
pub struct IgnoredByConfig;

impl RoleRule for IgnoredByConfig {
    fn name(&self) -> &'static str {
        "ignored_by_config"
    }

    fn description(&self) -> &'static str {
        "Columns the configuration says to ignore"
    }

    fn classify(&self, ctx: &RuleContext<'_>) -> Option<ColumnRole> {
        ctx.config
            .is_ignored(ctx.table, ctx.column)
            .then_some(ColumnRole::Ignored)
    }
}

/// Roles fixed in `roles.declared_roles`.
pub struct DeclaredRole;

impl RoleRule for DeclaredRole {
    fn name(&self) -> &'static str {
        "declared_role"
    }

    fn description(&self) -> &'static str {
        "Roles declared in configuration"
    }

    fn classify(&self, ctx: &RuleContext<'_>) -> Option<ColumnRole> {
        ctx.config.declared_role(ctx.table, ctx.column)
    }
}

/// The identifier selected for the table in the first pass.
pub struct OwnIdentifier;

impl RoleRule for OwnIdentifier {
    fn name(&self) -> &'static str {
        "own_identifier"
    }

    fn description(&self) -> &'static str {
        "The table's selected identifier column"
    }

    fn classify(&self, ctx: &RuleContext<'_>) -> Option<ColumnRole> {
        (ctx.own_identifier == Some(ctx.column)).then_some(ColumnRole::EntityIdentifier)
    }
}

/// Columns whose name references another table's identifier.
pub struct ForeignKeyReference;

impl RoleRule for ForeignKeyReference {
    fn name(&self) -> &'static str {
        "foreign_key_reference"
    }

    fn description(&self) -> &'static str {
        "Identifier-like names that reference another table"
    }

    fn classify(&self, ctx: &RuleContext<'_>) -> Option<ColumnRole> {
        if ctx.profile.is_empty() {
            return None;
        }
        ctx.registry
            .resolve_reference(ctx.table, ctx.column, &ctx.config.naming)
            .map(|_| ColumnRole::RelationshipKey)
    }
}

/// Identifier-named columns whose values mostly appear among another
/// table's identifier values. Off unless `roles.value_overlap` is set.
pub struct ValueOverlap;

impl RoleRule for ValueOverlap {
    fn name(&self) -> &'static str {
        VALUE_OVERLAP
    }

    fn description(&self) -> &'static str {
        "Key columns whose values match another table's identifiers"
    }

    fn classify(&self, ctx: &RuleContext<'_>) -> Option<ColumnRole> {
        if !ctx.config.value_overlap || !ctx.config.naming.is_identifier_name(ctx.column) {
            return None;
        }
        ctx.values?
            .overlap_target(
                ctx.table,
                ctx.column,
                ctx.registry,
                ctx.config.min_value_overlap,
            )
            .map(|_| ColumnRole::RelationshipKey)
    }
}

/// Fallback: everything else describes its row's entity.
pub struct Attribute;

impl RoleRule for Attribute {
    fn name(&self) -> &'static str {
        "attribute"
    }

    fn classify(&self, _ctx: &RuleContext<'_>) -> Option<ColumnRole> {
        Some(ColumnRole::EntityAttribute)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use insight_core::{ColumnType, Table};

    fn profile(name: &str) -> ColumnProfile {
        ColumnProfile {
            name: name.to_string(),
            inferred_type: ColumnType::IdentifierLike,
            null_fraction: 0.0,
            distinct_ratio: 1.0,
            sample_values: vec![],
            row_count: 3,
            non_null_count: 3,
            distinct_count: 3,
            anomalies: vec![],
        }
    }

    fn registry() -> IdentifierRegistry {
        let mut registry = IdentifierRegistry::default();
        registry.insert("customers", "id");
        registry.insert("orders", "order_id");
        registry
    }

    fn classify(
        rule: &dyn RoleRule,
        table: &str,
        column: &str,
        config: &RoleConfig,
    ) -> Option<ColumnRole> {
        let registry = registry();
        let profile = profile(column);
        let ctx = RuleContext {
            table,
            column,
            profile: &profile,
            own_identifier: registry.identifier(table),
            registry: &registry,
            values: None,
            config,
        };
        rule.classify(&ctx)
    }

    #[test]
    fn ignored_by_config_only_fires_for_listed_columns() {
        let config = RoleConfig {
            ignored_columns: vec!["orders.notes".to_string()],
            ..RoleConfig::default()
        };
        assert_eq!(
            classify(&IgnoredByConfig, "orders", "notes", &config),
            Some(ColumnRole::Ignored)
        );
        assert_eq!(classify(&IgnoredByConfig, "customers", "notes", &config), None);
    }

    #[test]
    fn own_identifier_matches_registry() {
        let config = RoleConfig::default();
        assert_eq!(
            classify(&OwnIdentifier, "orders", "order_id", &config),
            Some(ColumnRole::EntityIdentifier)
        );
        assert_eq!(classify(&OwnIdentifier, "orders", "customer_id", &config), None);
    }

    #[test]
    fn foreign_key_reference_needs_a_known_target() {
        let config = RoleConfig::default();
        assert_eq!(
            classify(&ForeignKeyReference, "orders", "customer_id", &config),
            Some(ColumnRole::RelationshipKey)
        );
        assert_eq!(
            classify(&ForeignKeyReference, "orders", "billing_customer_id", &config),
            Some(ColumnRole::RelationshipKey)
        );
        assert_eq!(classify(&ForeignKeyReference, "orders", "store_id", &config), None);
        assert_eq!(classify(&ForeignKeyReference, "orders", "amount", &config), None);
    }

    #[test]
    fn value_overlap_needs_config_and_values() {
        let config = RoleConfig {
            value_overlap: true,
            ..RoleConfig::default()
        };
        assert_eq!(classify(&ValueOverlap, "orders", "buyer_id", &config), None);

        let customers = Table::with_columns("customers", &["id"]).row(vec!["1"]).row(vec!["2"]);
        let orders = Table::with_columns("orders", &["order_id", "buyer_id"])
            .row(vec!["10", "1"])
            .row(vec!["11", "2"]);
        let registry = registry();
        let values = KeyValues::collect(&[customers, orders], &registry, &config.naming);
        let profile = profile("buyer_id");
        let mut ctx = RuleContext {
            table: "orders",
            column: "buyer_id",
            profile: &profile,
            own_identifier: Some("order_id"),
            registry: &registry,
            values: Some(&values),
            config: &config,
        };
        assert_eq!(ValueOverlap.classify(&ctx), Some(ColumnRole::RelationshipKey));

        let off = RoleConfig::default();
        ctx.config = &off;
        assert_eq!(ValueOverlap.classify(&ctx), None);
    }

    #[test]
    fn default_rule_order() {
        let names: Vec<_> = default_rules().iter().map(|r| r.name()).collect();
        assert_eq!(
            names,
            [
                "ignored_by_config",
                "declared_role",
                "own_identifier",
                "foreign_key_reference",
                "value_overlap",
                "attribute"
            ]
        );
    }
}
