//! Where-clause tree shared by the SQL builder and the in-memory evaluator.
//!
//! ```
//! use bounty_store::query::Filter;
//! use bounty_store_api::TaskStatus;
//!
//! let open_audits = Filter::and([
//!     Filter::field("status").equals(TaskStatus::Open),
//!     Filter::field("title").insensitive().contains("audit"),
//!     Filter::relation("developer").is_none(),
//! ]);
//! assert!(matches!(open_audits, Filter::And(ref parts) if parts.len() == 3));
//! ```

use super::value::Value;
use bounty_store_api::QueryMode;

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// Every sub-filter matches. `And([])` matches everything.
    And(Vec<Filter>),
    /// At least one sub-filter matches. `Or([])` matches nothing.
    Or(Vec<Filter>),
    Not(Box<Filter>),
    Field {
        field: String,
        condition: Condition,
        mode: QueryMode,
    },
    Relation {
        relation: String,
        condition: RelationCondition,
    },
}

/// Scalar comparison applied to one column.
///
/// Comparisons against a NULL column are false, except `Not(v)` with a
/// non-null `v` which also matches NULL. `Equals(Null)` is `IS NULL` and
/// `Not(Null)` is `IS NOT NULL`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Equals(Value),
    Not(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

impl Condition {
    pub fn name(&self) -> &'static str {
        match self {
            Condition::Equals(_) => "equals",
            Condition::Not(_) => "not",
            Condition::In(_) => "in",
            Condition::NotIn(_) => "notIn",
            Condition::Lt(_) => "lt",
            Condition::Lte(_) => "lte",
            Condition::Gt(_) => "gt",
            Condition::Gte(_) => "gte",
            Condition::Contains(_) => "contains",
            Condition::StartsWith(_) => "startsWith",
            Condition::EndsWith(_) => "endsWith",
        }
    }

    pub fn is_range(&self) -> bool {
        matches!(
            self,
            Condition::Lt(_) | Condition::Lte(_) | Condition::Gt(_) | Condition::Gte(_)
        )
    }

    pub fn is_pattern(&self) -> bool {
        matches!(
            self,
            Condition::Contains(_) | Condition::StartsWith(_) | Condition::EndsWith(_)
        )
    }
}

/// Condition on the rows reached through a relation.
#[derive(Debug, Clone, PartialEq)]
pub enum RelationCondition {
    /// To-many: at least one related row matches.
    Some(Box<Filter>),
    /// To-many: every related row matches (vacuously true when empty).
    Every(Box<Filter>),
    /// To-many: no related row matches.
    None(Box<Filter>),
    /// To-one: the related row exists and matches. `Is(None)` means there
    /// is no related row.
    Is(Option<Box<Filter>>),
    /// To-one: negation of `Is`.
    IsNot(Option<Box<Filter>>),
}

impl RelationCondition {
    pub fn name(&self) -> &'static str {
        match self {
            RelationCondition::Some(_) => "some",
            RelationCondition::Every(_) => "every",
            RelationCondition::None(_) => "none",
            RelationCondition::Is(_) => "is",
            RelationCondition::IsNot(_) => "isNot",
        }
    }

    pub fn is_to_many(&self) -> bool {
        matches!(
            self,
            RelationCondition::Some(_) | RelationCondition::Every(_) | RelationCondition::None(_)
        )
    }
}

impl Default for Filter {
    fn default() -> Self {
        Filter::And(Vec::new())
    }
}

impl Filter {
    /// Matches every row.
    pub fn all() -> Self {
        Filter::default()
    }

    pub fn field(name: impl Into<String>) -> FieldFilter {
        FieldFilter {
            field: name.into(),
            mode: QueryMode::Default,
        }
    }

    pub fn relation(name: impl Into<String>) -> RelationFilter {
        RelationFilter {
            relation: name.into(),
        }
    }

    pub fn and(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::And(filters.into_iter().collect())
    }

    pub fn or(filters: impl IntoIterator<Item = Filter>) -> Self {
        Filter::Or(filters.into_iter().collect())
    }

    pub fn not(filter: Filter) -> Self {
        Filter::Not(Box::new(filter))
    }

    /// Combines two filters, flattening an existing `And`.
    #[must_use]
    pub fn and_also(self, other: Filter) -> Self {
        match self {
            Filter::And(mut parts) => {
                parts.push(other);
                Filter::And(parts)
            }
            first => Filter::And(vec![first, other]),
        }
    }

    pub fn is_match_all(&self) -> bool {
        matches!(self, Filter::And(parts) if parts.is_empty())
    }
}

/// Builder returned by [`Filter::field`].
#[derive(Debug, Clone)]
pub struct FieldFilter {
    field: String,
    mode: QueryMode,
}

impl FieldFilter {
    /// Case-insensitive comparison (string columns only).
    #[must_use]
    pub fn insensitive(mut self) -> Self {
        self.mode = QueryMode::Insensitive;
        self
    }

    #[must_use]
    pub fn mode(mut self, mode: QueryMode) -> Self {
        self.mode = mode;
        self
    }

    fn build(self, condition: Condition) -> Filter {
        Filter::Field {
            field: self.field,
            condition,
            mode: self.mode,
        }
    }

    pub fn equals(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Equals(value.into()))
    }

    pub fn not(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Not(value.into()))
    }

    pub fn is_null(self) -> Filter {
        self.build(Condition::Equals(Value::Null))
    }

    pub fn is_not_null(self) -> Filter {
        self.build(Condition::Not(Value::Null))
    }

    pub fn in_<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        self.build(Condition::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn not_in<V: Into<Value>>(self, values: impl IntoIterator<Item = V>) -> Filter {
        self.build(Condition::NotIn(values.into_iter().map(Into::into).collect()))
    }

    pub fn lt(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Lt(value.into()))
    }

    pub fn lte(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Lte(value.into()))
    }

    pub fn gt(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Gt(value.into()))
    }

    pub fn gte(self, value: impl Into<Value>) -> Filter {
        self.build(Condition::Gte(value.into()))
    }

    pub fn contains(self, needle: impl Into<String>) -> Filter {
        self.build(Condition::Contains(needle.into()))
    }

    pub fn starts_with(self, prefix: impl Into<String>) -> Filter {
        self.build(Condition::StartsWith(prefix.into()))
    }

    pub fn ends_with(self, suffix: impl Into<String>) -> Filter {
        self.build(Condition::EndsWith(suffix.into()))
    }
}

/// Builder returned by [`Filter::relation`].
#[derive(Debug, Clone)]
pub struct RelationFilter {
    relation: String,
}

impl RelationFilter {
    fn build(self, condition: RelationCondition) -> Filter {
        Filter::Relation {
            relation: self.relation,
            condition,
        }
    }

    pub fn some(self, filter: Filter) -> Filter {
        self.build(RelationCondition::Some(Box::new(filter)))
    }

    pub fn every(self, filter: Filter) -> Filter {
        self.build(RelationCondition::Every(Box::new(filter)))
    }

    pub fn none(self, filter: Filter) -> Filter {
        self.build(RelationCondition::None(Box::new(filter)))
    }

    pub fn is(self, filter: Filter) -> Filter {
        self.build(RelationCondition::Is(Some(Box::new(filter))))
    }

    pub fn is_not(self, filter: Filter) -> Filter {
        self.build(RelationCondition::IsNot(Some(Box::new(filter))))
    }

    /// No related row.
    pub fn is_none(self) -> Filter {
        self.build(RelationCondition::Is(None))
    }

    /// A related row exists.
    pub fn exists(self) -> Filter {
        self.build(RelationCondition::IsNot(None))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn and_also_flattens() {
        let filter = Filter::field("a")
            .equals(1)
            .and_also(Filter::field("b").equals(2))
            .and_also(Filter::field("c").equals(3));
        let Filter::And(parts) = filter else {
            panic!("expected And");
        };
        assert_eq!(parts.len(), 3);
    }

    #[test]
    fn default_filter_matches_all() {
        assert!(Filter::default().is_match_all());
        assert!(!Filter::or([]).is_match_all());
    }

    #[test]
    fn builder_keeps_mode() {
        let filter = Filter::field("email").insensitive().equals("A@B.IO");
        assert_eq!(
            filter,
            Filter::Field {
                field: "email".to_string(),
                condition: Condition::Equals(Value::from("A@B.IO")),
                mode: QueryMode::Insensitive,
            }
        );
    }

    #[test]
    fn relation_builders() {
        let filter = Filter::relation("developer").is_none();
        assert_eq!(
            filter,
            Filter::Relation {
                relation: "developer".to_string(),
                condition: RelationCondition::Is(None),
            }
        );
        assert!(RelationCondition::Every(Box::new(Filter::all())).is_to_many());
        assert!(!RelationCondition::IsNot(None).is_to_many());
    }
}
