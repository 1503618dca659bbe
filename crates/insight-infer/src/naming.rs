//! Name matching between columns, tables and graph labels.

use crate::config::NamingPolicy;

/// Verb of `<Source>_TO_<Target>`.
pub const DEFAULT_VERB: &str = "TO";

/// Verb for references found by shared values rather than by name.
pub const OVERLAP_VERB: &str = "REFERENCES";

impl NamingPolicy {
    /// Split a name into normalized tokens. CamelCase is not split.
    pub fn tokens(&self, name: &str) -> Vec<String> {
        name.split(|c: char| self.separators.contains(c))
            .filter(|t| !t.is_empty())
            .map(|t| self.normalize_token(t))
            .collect()
    }

    pub fn is_identifier_token(&self, token: &str) -> bool {
        self.identifier_tokens.iter().any(|id| {
            if self.case_sensitive {
                id == token
            } else {
                id.eq_ignore_ascii_case(token)
            }
        })
    }

    /// Names equal once case and separators are normalized:
    /// `Customer-ID` and `customer_id`.
    pub fn same_name(&self, a: &str, b: &str) -> bool {
        self.tokens(a) == self.tokens(b)
    }

    /// Whether the column name starts or ends with an identifier token.
    pub fn is_identifier_name(&self, column: &str) -> bool {
        self.identifier_stem(column).is_some()
    }

    /// Tokens left after removing the identifier token from either end:
    /// `billing_customer_id` gives `["billing", "customer"]`, `id` gives `[]`.
    /// `None` when the name has no identifier token at either end.
    pub fn identifier_stem(&self, column: &str) -> Option<Vec<String>> {
        let tokens = self.tokens(column);
        let (first, last) = (tokens.first()?, tokens.last()?);
        if self.is_identifier_token(last) {
            Some(tokens[..tokens.len() - 1].to_vec())
        } else if self.is_identifier_token(first) {
            Some(tokens[1..].to_vec())
        } else {
            None
        }
    }

    /// Reduce a plural token to its singular form, when enabled.
    pub fn singular(&self, word: &str) -> String {
        if !self.singularize {
            return word.to_string();
        }
        let lower = word.to_lowercase();
        let strip = |n: usize| word[..word.len() - n].to_string();

        if lower.len() > 3 && lower.ends_with("ies") {
            format!("{}y", strip(3))
        } else if lower.ends_with("sses")
            || lower.ends_with("xes")
            || lower.ends_with("ches")
            || lower.ends_with("shes")
        {
            strip(2)
        } else if lower.len() > 1
            && lower.ends_with('s')
            && !lower.ends_with("ss")
            && !lower.ends_with("us")
            && !lower.ends_with("is")
        {
            strip(1)
        } else {
            word.to_string()
        }
    }

    fn singular_tokens(&self, name: &str) -> Vec<String> {
        let mut tokens = self.tokens(name);
        if let Some(last) = tokens.last_mut() {
            *last = self.singular(last);
        }
        tokens
    }

    /// The stem is exactly the table's name: `customer` for `customers`.
    pub fn stem_names_table(&self, stem: &[String], table: &str) -> bool {
        !stem.is_empty() && self.normalize_stem(stem) == self.singular_tokens(table)
    }

    /// The stem names the table, possibly behind a qualifier: with qualified
    /// prefixes on, `billing_customer` references `customers`.
    pub fn stem_references_table(&self, stem: &[String], table: &str) -> bool {
        if self.stem_names_table(stem, table) {
            return true;
        }
        if !self.qualified_prefixes || stem.is_empty() {
            return false;
        }
        let stem = self.normalize_stem(stem);
        let table = self.singular_tokens(table);
        !table.is_empty() && stem.len() > table.len() && stem.ends_with(&table)
    }

    fn normalize_stem(&self, stem: &[String]) -> Vec<String> {
        let mut stem = stem.to_vec();
        if let Some(last) = stem.last_mut() {
            *last = self.singular(last);
        }
        stem
    }

    /// Node label for a table: PascalCase, last word singularized.
    /// `order_items` becomes `OrderItem`.
    pub fn entity_name(&self, table: &str) -> String {
        self.singular_tokens(table)
            .iter()
            .map(|t| capitalize(t))
            .collect()
    }

    /// Verb for a relationship keyed by `column`. [`DEFAULT_VERB`] unless
    /// semantic relationships are on and a column token is in the
    /// vocabulary, so `owner_id` gives `BELONGS_TO`.
    pub fn relationship_verb(&self, column: &str) -> &str {
        if !self.semantic_relationships {
            return DEFAULT_VERB;
        }
        let tokens: Vec<String> = self
            .tokens(column)
            .iter()
            .map(|t| self.singular(t))
            .collect();
        self.relationship_verbs
            .iter()
            .find(|(keyword, _)| {
                let keyword = self.singular(&self.normalize_token(keyword));
                tokens.contains(&keyword)
            })
            .map(|(_, verb)| verb.as_str())
            .unwrap_or(DEFAULT_VERB)
    }

    /// `<Source>_<VERB>_<Target>`.
    pub fn relationship_name(&self, source: &str, verb: &str, target: &str) -> String {
        format!("{source}_{verb}_{target}")
    }

    fn normalize_token(&self, token: &str) -> String {
        if self.case_sensitive {
            token.to_string()
        } else {
            token.to_lowercase()
        }
    }
}

fn capitalize(token: &str) -> String {
    let mut chars = token.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> NamingPolicy {
        NamingPolicy::default()
    }

    fn stem(column: &str) -> Vec<String> {
        policy().identifier_stem(column).unwrap()
    }

    #[test]
    fn identifier_stems() {
        assert!(stem("id").is_empty());
        assert_eq!(stem("customer_id"), vec!["customer"]);
        assert_eq!(stem("ID_Customer"), vec!["customer"]);
        assert_eq!(stem("product-code"), vec!["product"]);
        assert_eq!(policy().identifier_stem("amount"), None);
        assert_eq!(policy().identifier_stem("identity"), None);
    }

    #[test]
    fn singular_forms() {
        let p = policy();
        assert_eq!(p.singular("customers"), "customer");
        assert_eq!(p.singular("categories"), "category");
        assert_eq!(p.singular("addresses"), "address");
        assert_eq!(p.singular("boxes"), "box");
        assert_eq!(p.singular("status"), "status");
        assert_eq!(p.singular("order"), "order");
    }

    #[test]
    fn singularize_can_be_disabled() {
        let p = NamingPolicy {
            singularize: false,
            ..NamingPolicy::default()
        };
        assert_eq!(p.singular("customers"), "customers");
        assert!(!p.stem_names_table(&stem("customer_id"), "customers"));
    }

    #[test]
    fn stems_reference_tables() {
        let p = policy();
        assert!(p.stem_names_table(&stem("customer_id"), "customers"));
        assert!(!p.stem_names_table(&stem("billing_customer_id"), "customers"));
        assert!(p.stem_references_table(&stem("billing_customer_id"), "customers"));
        assert!(!p.stem_references_table(&stem("id"), "customers"));
        assert!(p.stem_references_table(&stem("order_item_id"), "order_items"));
    }

    #[test]
    fn qualified_prefixes_can_be_disabled() {
        let p = NamingPolicy {
            qualified_prefixes: false,
            ..NamingPolicy::default()
        };
        assert!(!p.stem_references_table(&stem("billing_customer_id"), "customers"));
    }

    #[test]
    fn entity_names_are_pascal_case_singular() {
        let p = policy();
        assert_eq!(p.entity_name("customers"), "Customer");
        assert_eq!(p.entity_name("order_items"), "OrderItem");
        assert_eq!(p.entity_name("Order"), "Order");
        assert_eq!(
            p.relationship_name("Order", DEFAULT_VERB, "Customer"),
            "Order_TO_Customer"
        );
    }

    #[test]
    fn names_compare_without_case_or_separators() {
        let p = policy();
        assert!(p.same_name("Customer-ID", "customer_id"));
        assert!(!p.same_name("customer_id", "client_id"));
    }

    #[test]
    fn relationship_verbs_come_from_column_keywords() {
        let p = policy();
        assert_eq!(p.relationship_verb("owner_id"), DEFAULT_VERB);

        let p = NamingPolicy {
            semantic_relationships: true,
            ..NamingPolicy::default()
        };
        assert_eq!(p.relationship_verb("owner_id"), "BELONGS_TO");
        assert_eq!(p.relationship_verb("Location_ID"), "LOCATED_IN");
        assert_eq!(p.relationship_verb("employee_id"), "WORKS_FOR");
        assert_eq!(p.relationship_verb("department_id"), DEFAULT_VERB);
        assert_eq!(p.relationship_verb("customer_id"), DEFAULT_VERB);
    }
}
