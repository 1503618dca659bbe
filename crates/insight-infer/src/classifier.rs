//! Role classifier.
//!
//! Pass one picks at most one identifier per table and records it in an
//! [`IdentifierRegistry`]. Pass two runs the ordered [`RoleRule`]s over every
//! column, with the registry available so foreign-key-like columns can be
//! matched against identifiers of other tables.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use insight_core::{ColumnRole, ColumnType, Table, ValueKey};

use crate::config::{NamingPolicy, RoleConfig};
use crate::profiler::TableProfile;
use crate::rules::{default_rules, RoleRule, RuleContext};

// ── Identifier Registry ──────────────────────────────────────────

/// Table name to selected identifier column.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentifierRegistry {
    identifiers: BTreeMap<String, String>,
}

impl IdentifierRegistry {
    pub fn insert(&mut self, table: impl Into<String>, column: impl Into<String>) {
        self.identifiers.insert(table.into(), column.into());
    }

    pub fn identifier(&self, table: &str) -> Option<&str> {
        self.identifiers.get(table).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.identifiers
            .iter()
            .map(|(t, c)| (t.as_str(), c.as_str()))
    }

    pub fn len(&self) -> usize {
        self.identifiers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identifiers.is_empty()
    }

    /// The table whose identifier `column` of `table` refers to, if any.
    ///
    /// Tried in order: the stem names a table (`customer_id` to
    /// `customers`), the column has the same name as another table's
    /// identifier (`customer_id` to `clients(customer_id)`), then a
    /// qualified stem (`billing_customer_id`) where the longest table name
    /// wins. A table only references itself through a qualifier, as in
    /// `manager_employee_id`.
    pub fn resolve_reference(
        &self,
        table: &str,
        column: &str,
        policy: &NamingPolicy,
    ) -> Option<&str> {
        if self.identifier(table) == Some(column) {
            return None;
        }
        let stem = policy.identifier_stem(column)?;
        if stem.is_empty() {
            return None;
        }

        self.named_target(table, &stem, policy)
            .or_else(|| self.same_identifier_target(table, column, policy))
            .or_else(|| self.qualified_target(&stem, policy, None))
    }

    /// The other table an identifier column also points at, as in the 1:1
    /// extension table `customer_profiles(customer_id, bio)`. Identifiers
    /// named after their own table, or bare `id`, point nowhere.
    pub fn resolve_identifier_reference(
        &self,
        table: &str,
        column: &str,
        policy: &NamingPolicy,
    ) -> Option<&str> {
        let stem = policy.identifier_stem(column)?;
        if stem.is_empty() || policy.stem_names_table(&stem, table) {
            return None;
        }
        self.named_target(table, &stem, policy)
            .or_else(|| self.qualified_target(&stem, policy, Some(table)))
    }

    fn named_target(&self, table: &str, stem: &[String], policy: &NamingPolicy) -> Option<&str> {
        self.identifiers
            .keys()
            .find(|t| t.as_str() != table && policy.stem_names_table(stem, t))
            .map(String::as_str)
    }

    // Callers only get here with a non-empty stem, so a bare `id` never matches.
    fn same_identifier_target(
        &self,
        table: &str,
        column: &str,
        policy: &NamingPolicy,
    ) -> Option<&str> {
        self.identifiers
            .iter()
            .find(|(t, identifier)| t.as_str() != table && policy.same_name(identifier, column))
            .map(|(t, _)| t.as_str())
    }

    fn qualified_target(
        &self,
        stem: &[String],
        policy: &NamingPolicy,
        skip: Option<&str>,
    ) -> Option<&str> {
        self.identifiers
            .keys()
            .filter(|t| Some(t.as_str()) != skip)
            .filter(|t| {
                policy.stem_references_table(stem, t) && !policy.stem_names_table(stem, t)
            })
            .max_by_key(|t| policy.tokens(t).len())
            .map(String::as_str)
    }
}

// ── Key Values ───────────────────────────────────────────────────

/// Distinct values of key-like columns, for matching references by value
/// when names do not line up.
#[derive(Debug, Clone, Default)]
pub struct KeyValues {
    columns: HashMap<(String, String), HashSet<ValueKey>>,
}

impl KeyValues {
    /// Collect every identifier-named column and every selected identifier.
    /// Values are compared as keys, so `"7"` and `7` are the same.
    pub fn collect(tables: &[Table], registry: &IdentifierRegistry, policy: &NamingPolicy) -> Self {
        let mut columns = HashMap::new();
        for table in tables {
            let identifier = registry.identifier(&table.name);
            for column in &table.columns {
                if identifier != Some(column.as_str()) && !policy.is_identifier_name(column) {
                    continue;
                }
                let values = table
                    .column_values(column)
                    .filter_map(|v| v.coerce(ColumnType::IdentifierLike).key())
                    .collect();
                columns.insert((table.name.clone(), column.clone()), values);
            }
        }
        Self { columns }
    }

    pub fn values(&self, table: &str, column: &str) -> Option<&HashSet<ValueKey>> {
        self.columns.get(&(table.to_string(), column.to_string()))
    }

    /// Share of the distinct values of `table.column` also found in
    /// `other_table.other_column`. Zero when either is unknown or empty.
    pub fn overlap(&self, table: &str, column: &str, other_table: &str, other_column: &str) -> f64 {
        let (Some(values), Some(other)) = (
            self.values(table, column),
            self.values(other_table, other_column),
        ) else {
            return 0.0;
        };
        if values.is_empty() {
            return 0.0;
        }
        let shared = values.iter().filter(|v| other.contains(*v)).count();
        shared as f64 / values.len() as f64
    }

    /// Another table whose identifier holds more than `min_overlap` of the
    /// column's distinct values. The highest share wins, ties go to the
    /// first table by name.
    pub fn overlap_target<'r>(
        &self,
        table: &str,
        column: &str,
        registry: &'r IdentifierRegistry,
        min_overlap: f64,
    ) -> Option<&'r str> {
        let mut best: Option<(f64, &'r str)> = None;
        for (other, identifier) in registry.iter() {
            if other == table {
                continue;
            }
            let share = self.overlap(table, column, other, identifier);
            if share > min_overlap && best.map_or(true, |(top, _)| share > top) {
                best = Some((share, other));
            }
        }
        best.map(|(_, other)| other)
    }
}

// ── Classification Result ────────────────────────────────────────

/// The role of one column and the rule that decided it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ColumnAssignment {
    pub column: String,
    pub role: ColumnRole,
    /// Name of the deciding rule, or `caller` after a manual edit.
    pub rule: String,
    /// Referenced table, for relationship keys and for identifiers that
    /// also point at another table.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub references: Option<String>,
}

/// Roles of every column of one table, in column order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TableRoles {
    pub table: String,
    pub identifier: Option<String>,
    pub columns: Vec<ColumnAssignment>,
}

impl TableRoles {
    pub fn role(&self, column: &str) -> Option<ColumnRole> {
        self.assignment(column).map(|a| a.role)
    }

    pub fn assignment(&self, column: &str) -> Option<&ColumnAssignment> {
        self.columns.iter().find(|a| a.column == column)
    }

    /// Columns with the given role, in column order.
    pub fn columns_with(&self, role: ColumnRole) -> impl Iterator<Item = &ColumnAssignment> {
        self.columns.iter().filter(move |a| a.role == role)
    }
}

/// Roles for every table profiled together.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Classification {
    pub tables: Vec<TableRoles>,
    /// Policy the roles were decided under, reused to resolve references
    /// after a manual edit.
    #[serde(skip)]
    pub naming: NamingPolicy,
}

impl Classification {
    pub fn table(&self, name: &str) -> Option<&TableRoles> {
        self.tables.iter().find(|t| t.table == name)
    }

    pub fn role_of(&self, table: &str, column: &str) -> Option<ColumnRole> {
        self.table(table)?.role(column)
    }

    /// Current identifier of every table that has one.
    pub fn registry(&self) -> IdentifierRegistry {
        let mut registry = IdentifierRegistry::default();
        for roles in &self.tables {
            if let Some(identifier) = &roles.identifier {
                registry.insert(roles.table.clone(), identifier.clone());
            }
        }
        registry
    }

    /// Reclassify one column. Choosing a new identifier demotes the previous
    /// one to an attribute so each table keeps at most one identifier. A new
    /// relationship key is resolved against the current identifiers; one that
    /// matches nothing keeps `references` unset and is reported by inference.
    pub fn with_role(mut self, table: &str, column: &str, role: ColumnRole) -> Self {
        let Some(index) = self.tables.iter().position(|t| t.table == table) else {
            return self;
        };
        let roles = &mut self.tables[index];
        if !roles.columns.iter().any(|a| a.column == column) {
            return self;
        }

        if role == ColumnRole::EntityIdentifier {
            if let Some(previous) = roles.identifier.replace(column.to_string()) {
                if let Some(a) = roles.columns.iter_mut().find(|a| a.column == previous) {
                    a.role = ColumnRole::EntityAttribute;
                    a.rule = "caller".to_string();
                    a.references = None;
                }
            }
        } else if roles.identifier.as_deref() == Some(column) {
            roles.identifier = None;
        }

        let registry = self.registry();
        let references = match role {
            ColumnRole::RelationshipKey => registry.resolve_reference(table, column, &self.naming),
            ColumnRole::EntityIdentifier => {
                registry.resolve_identifier_reference(table, column, &self.naming)
            }
            _ => None,
        }
        .map(str::to_string);
        if role == ColumnRole::RelationshipKey && references.is_none() {
            tracing::warn!(table, column, "Relationship key matches no identifier");
        }

        if let Some(a) = self.tables[index]
            .columns
            .iter_mut()
            .find(|a| a.column == column)
        {
            a.role = role;
            a.rule = "caller".to_string();
            a.references = references;
        }
        self
    }

    /// Mark a column as a relationship key pointing at `target_table`.
    pub fn with_reference(self, table: &str, column: &str, target_table: &str) -> Self {
        let mut this = self.with_role(table, column, ColumnRole::RelationshipKey);
        if let Some(a) = this
            .tables
            .iter_mut()
            .find(|t| t.table == table)
            .and_then(|t| t.columns.iter_mut().find(|a| a.column == column))
        {
            a.references = Some(target_table.to_string());
        }
        this
    }
}

// ── Classifier ───────────────────────────────────────────────────

/// Assigns exactly one [`ColumnRole`] per column.
pub struct RoleClassifier {
    config: RoleConfig,
    rules: Vec<Box<dyn RoleRule>>,
}

impl Default for RoleClassifier {
    fn default() -> Self {
        Self::new(RoleConfig::default())
    }
}

impl RoleClassifier {
    pub fn new(config: RoleConfig) -> Self {
        Self::with_rules(config, default_rules())
    }

    /// Use a custom rule list. Rules run in the given order.
    pub fn with_rules(config: RoleConfig, rules: Vec<Box<dyn RoleRule>>) -> Self {
        Self { config, rules }
    }

    pub fn config(&self) -> &RoleConfig {
        &self.config
    }

    pub fn rule_names(&self) -> Vec<&'static str> {
        self.rules.iter().map(|r| r.name()).collect()
    }

    /// First pass: choose each table's identifier.
    pub fn select_identifiers(&self, profiles: &[TableProfile]) -> IdentifierRegistry {
        let mut registry = IdentifierRegistry::default();
        for profile in profiles {
            if let Some(column) = self.select_identifier(profile, profiles) {
                tracing::debug!(table = %profile.table, column = %column, "Selected identifier");
                registry.insert(profile.table.clone(), column);
            }
        }
        registry
    }

    fn select_identifier(&self, profile: &TableProfile, all: &[TableProfile]) -> Option<String> {
        let table = profile.table.as_str();
        let policy = &self.config.naming;

        let declared = profile.columns.iter().find(|c| {
            !self.config.is_ignored(table, &c.name)
                && self.config.declared_role(table, &c.name) == Some(ColumnRole::EntityIdentifier)
        });
        if let Some(column) = declared {
            return Some(column.name.clone());
        }

        let references_other_table = |stem: &[String]| {
            all.iter()
                .filter(|t| t.table != table)
                .any(|t| policy.stem_references_table(stem, &t.table))
        };

        profile
            .columns
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                !self.config.is_ignored(table, &c.name)
                    && self.config.declared_role(table, &c.name).is_none()
                    && c.is_unique_and_complete(self.config.identifier_tolerance)
            })
            .filter_map(|(index, c)| {
                // A key pointing at another table is only a last resort, for
                // 1:1 extension tables such as `customer_profiles(customer_id)`.
                let rank = match policy.identifier_stem(&c.name) {
                    Some(stem) if stem.is_empty() || policy.stem_names_table(&stem, table) => 0,
                    Some(stem) if references_other_table(&stem) => 3,
                    Some(_) => 1,
                    None if index == 0 => 2,
                    None => return None,
                };
                Some((rank, index, c.name.clone()))
            })
            .min()
            .map(|(_, _, name)| name)
    }

    /// Both passes over every table profiled together, matching by name only.
    pub fn classify(&self, profiles: &[TableProfile]) -> Classification {
        let registry = self.select_identifiers(profiles);
        self.classify_against(profiles, &registry, None)
    }

    /// Like [`RoleClassifier::classify`], and with `roles.value_overlap` on
    /// also matches key columns to identifiers by their values in `tables`.
    pub fn classify_tables(&self, profiles: &[TableProfile], tables: &[Table]) -> Classification {
        let registry = self.select_identifiers(profiles);
        let values = self
            .config
            .value_overlap
            .then(|| KeyValues::collect(tables, &registry, &self.config.naming));
        self.classify_against(profiles, &registry, values.as_ref())
    }

    fn classify_against(
        &self,
        profiles: &[TableProfile],
        registry: &IdentifierRegistry,
        values: Option<&KeyValues>,
    ) -> Classification {
        let tables = profiles
            .iter()
            .map(|profile| self.classify_table(profile, registry, values))
            .collect();
        Classification {
            tables,
            naming: self.config.naming.clone(),
        }
    }

    fn classify_table(
        &self,
        profile: &TableProfile,
        registry: &IdentifierRegistry,
        values: Option<&KeyValues>,
    ) -> TableRoles {
        let table = profile.table.as_str();
        let own_identifier = registry.identifier(table);

        let columns = profile
            .columns
            .iter()
            .map(|column_profile| {
                let ctx = RuleContext {
                    table,
                    column: &column_profile.name,
                    profile: column_profile,
                    own_identifier,
                    registry,
                    values,
                    config: &self.config,
                };
                let (mut role, mut rule) = self
                    .rules
                    .iter()
                    .find_map(|r| r.classify(&ctx).map(|role| (role, r.name())))
                    .unwrap_or((ColumnRole::EntityAttribute, "attribute"));

                if role == ColumnRole::EntityIdentifier && own_identifier != Some(ctx.column) {
                    tracing::warn!(
                        table,
                        column = ctx.column,
                        "Second identifier for table, classified as attribute"
                    );
                    role = ColumnRole::EntityAttribute;
                    rule = "attribute";
                }

                let naming = &self.config.naming;
                let references = match role {
                    ColumnRole::RelationshipKey => registry
                        .resolve_reference(table, ctx.column, naming)
                        .or_else(|| {
                            values.filter(|_| self.config.value_overlap).and_then(|v| {
                                v.overlap_target(
                                    table,
                                    ctx.column,
                                    registry,
                                    self.config.min_value_overlap,
                                )
                            })
                        }),
                    ColumnRole::EntityIdentifier => {
                        registry.resolve_identifier_reference(table, ctx.column, naming)
                    }
                    _ => None,
                }
                .map(str::to_string);

                tracing::debug!(
                    table,
                    column = ctx.column,
                    role = %role,
                    rule,
                    "Classified column"
                );
                ColumnAssignment {
                    column: column_profile.name.clone(),
                    role,
                    rule: rule.to_string(),
                    references,
                }
            })
            .collect();

        TableRoles {
            table: table.to_string(),
            identifier: own_identifier.map(str::to_string),
            columns,
        }
    }
}
