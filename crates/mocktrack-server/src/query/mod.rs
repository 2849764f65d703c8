//! Query-language subset: a constrained filter/sort grammar.
//!
//! Supported: `field = value`, `field IN (v1, v2)`, date comparisons against
//! `created`/`updated`, conjunction via `AND`, and a trailing
//! `ORDER BY field [ASC|DESC][, field ...]`. No `OR`, no parentheses around
//! clauses, no nesting. The parser produces a structured [`QueryPlan`] so
//! filter application never re-parses strings.

mod parser;

pub use parser::{parse, parse_lenient, QueryError};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A filter value; `currentUser()` stays unresolved until search time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldValue {
    Literal(String),
    CurrentUser,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EqualityFilter {
    pub field: String,
    pub value: FieldValue,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetFilter {
    pub field: String,
    pub values: Vec<FieldValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateOp {
    Ge,
    Gt,
    Le,
    Lt,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DateFilter {
    pub field: String,
    pub op: DateOp,
    pub value: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

/// Structured filter/sort plan. An empty plan matches everything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryPlan {
    pub equality: Vec<EqualityFilter>,
    pub sets: Vec<SetFilter>,
    pub dates: Vec<DateFilter>,
    pub order: Vec<SortKey>,
}

impl QueryPlan {
    pub fn is_empty(&self) -> bool {
        self.equality.is_empty()
            && self.sets.is_empty()
            && self.dates.is_empty()
            && self.order.is_empty()
    }

    /// Replace every `currentUser()` placeholder with the caller's identity.
    pub fn resolve_current_user(&mut self, account_id: &str) {
        for filter in &mut self.equality {
            if filter.value == FieldValue::CurrentUser {
                filter.value = FieldValue::Literal(account_id.to_string());
            }
        }
        for filter in &mut self.sets {
            for value in &mut filter.values {
                if *value == FieldValue::CurrentUser {
                    *value = FieldValue::Literal(account_id.to_string());
                }
            }
        }
    }

    /// Apply equality and set filters against a flattened field map.
    ///
    /// Multi-valued fields (labels) match when any element matches.
    /// Unresolved `currentUser()` placeholders never match. Date filters are
    /// not applied here; callers with real timestamps handle them directly.
    pub fn matches_flat(&self, fields: &HashMap<String, Vec<String>>) -> bool {
        for filter in &self.equality {
            let FieldValue::Literal(expected) = &filter.value else {
                return false;
            };
            match fields.get(&filter.field) {
                Some(actual) if actual.iter().any(|v| v == expected) => {}
                _ => return false,
            }
        }
        for filter in &self.sets {
            let Some(actual) = fields.get(&filter.field) else {
                return false;
            };
            let any_match = filter.values.iter().any(|value| match value {
                FieldValue::Literal(expected) => actual.iter().any(|v| v == expected),
                FieldValue::CurrentUser => false,
            });
            if !any_match {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat(pairs: &[(&str, &[&str])]) -> HashMap<String, Vec<String>> {
        pairs
            .iter()
            .map(|(k, vs)| (k.to_string(), vs.iter().map(|v| v.to_string()).collect()))
            .collect()
    }

    #[test]
    fn test_empty_plan_matches_everything() {
        let plan = QueryPlan::default();
        assert!(plan.matches_flat(&flat(&[("project", &["DEV"])])));
        assert!(plan.matches_flat(&HashMap::new()));
    }

    #[test]
    fn test_equality_filter_match() {
        let plan = parse("project = DEV").unwrap();
        assert!(plan.matches_flat(&flat(&[("project", &["DEV"])])));
        assert!(!plan.matches_flat(&flat(&[("project", &["SUP"])])));
        assert!(!plan.matches_flat(&HashMap::new()));
    }

    #[test]
    fn test_set_filter_matches_any_overlap() {
        let plan = parse("labels IN (backend, urgent)").unwrap();
        assert!(plan.matches_flat(&flat(&[("labels", &["frontend", "urgent"])])));
        assert!(!plan.matches_flat(&flat(&[("labels", &["frontend"])])));
    }

    #[test]
    fn test_unresolved_current_user_never_matches() {
        let plan = parse("assignee = currentUser()").unwrap();
        assert!(!plan.matches_flat(&flat(&[("assignee", &["alice"])])));

        let mut resolved = plan.clone();
        resolved.resolve_current_user("alice");
        assert!(resolved.matches_flat(&flat(&[("assignee", &["alice"])])));
        assert!(!resolved.matches_flat(&flat(&[("assignee", &["bob"])])));
    }
}
