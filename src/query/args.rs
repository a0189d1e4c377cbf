//! Argument shapes for reads and writes: ordering, unique selectors,
//! pagination windows, projections and write payloads.

use super::filter::Filter;
use super::value::{Record, Value, ValueError};
use crate::schema::{FieldMeta, ModelMeta};
use bounty_store_api::{NullsOrder, SortOrder};
use serde::Serialize;
use std::collections::BTreeMap;

// ============================================
// ORDER BY
// ============================================

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub field: String,
    pub order: SortOrder,
    pub nulls: Option<NullsOrder>,
}

impl OrderBy {
    pub fn asc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Asc,
            nulls: None,
        }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            order: SortOrder::Desc,
            nulls: None,
        }
    }

    #[must_use]
    pub fn nulls_first(mut self) -> Self {
        self.nulls = Some(NullsOrder::First);
        self
    }

    #[must_use]
    pub fn nulls_last(mut self) -> Self {
        self.nulls = Some(NullsOrder::Last);
        self
    }

    /// Ascending puts nulls last, descending puts them first.
    pub fn effective_nulls(&self) -> NullsOrder {
        self.nulls.unwrap_or(match self.order {
            SortOrder::Asc => NullsOrder::Last,
            SortOrder::Desc => NullsOrder::First,
        })
    }

    /// Same key walked in the opposite direction (nulls placement flips too).
    #[must_use]
    pub fn reversed(&self) -> Self {
        let nulls = match self.effective_nulls() {
            NullsOrder::First => NullsOrder::Last,
            NullsOrder::Last => NullsOrder::First,
        };
        Self {
            field: self.field.clone(),
            order: match self.order {
                SortOrder::Asc => SortOrder::Desc,
                SortOrder::Desc => SortOrder::Asc,
            },
            nulls: Some(nulls),
        }
    }
}

// ============================================
// UNIQUE WHERE
// ============================================

/// Selects at most one row through the primary key or a unique column.
#[derive(Debug, Clone, PartialEq)]
pub struct UniqueWhere {
    pub field: String,
    pub value: Value,
    /// Additional non-unique conditions.
    pub extra: Option<Filter>,
}

impl UniqueWhere {
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            extra: None,
        }
    }

    pub fn id(value: impl Into<Value>) -> Self {
        Self::new("id", value)
    }

    #[must_use]
    pub fn and(mut self, filter: Filter) -> Self {
        self.extra = Some(match self.extra.take() {
            Some(existing) => existing.and_also(filter),
            None => filter,
        });
        self
    }

    pub fn to_filter(&self) -> Filter {
        let unique = Filter::field(&self.field).equals(self.value.clone());
        match &self.extra {
            Some(extra) => Filter::and([unique, extra.clone()]),
            None => unique,
        }
    }
}

// ============================================
// FIND MANY
// ============================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FindMany {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<UniqueWhere>,
    /// Negative values take from the end of the ordered set.
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub distinct: Vec<String>,
}

impl FindMany {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub fn cursor(mut self, cursor: UniqueWhere) -> Self {
        self.cursor = Some(cursor);
        self
    }

    #[must_use]
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    #[must_use]
    pub fn distinct<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.distinct = fields.into_iter().map(Into::into).collect();
        self
    }
}

// ============================================
// PROJECTION
// ============================================

/// Shape of the returned records: which scalar fields, which relations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Projection {
    /// Only these scalar fields (all when `None`).
    pub select: Option<Vec<String>>,
    pub omit: Vec<String>,
    pub include: Vec<Include>,
    /// Relations whose row counts are returned under `_count`.
    pub count: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Include {
    pub relation: String,
    pub args: FindMany,
    pub projection: Projection,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn select<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.select = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    #[must_use]
    pub fn omit<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.omit = fields.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn include(self, relation: impl Into<String>) -> Self {
        self.include_with(relation, FindMany::default(), Projection::default())
    }

    #[must_use]
    pub fn include_with(
        mut self,
        relation: impl Into<String>,
        args: FindMany,
        projection: Projection,
    ) -> Self {
        self.include.push(Include {
            relation: relation.into(),
            args,
            projection,
        });
        self
    }

    #[must_use]
    pub fn count<S: Into<String>>(mut self, relations: impl IntoIterator<Item = S>) -> Self {
        self.count = relations.into_iter().map(Into::into).collect();
        self
    }

    pub fn is_identity(&self) -> bool {
        self.select.is_none() && self.omit.is_empty() && self.include.is_empty() && self.count.is_empty()
    }

    /// Whether a scalar field survives select/omit.
    pub fn keeps(&self, field: &str) -> bool {
        let selected = self
            .select
            .as_ref()
            .is_none_or(|fields| fields.iter().any(|f| f == field));
        selected && !self.omit.iter().any(|f| f == field)
    }
}

// ============================================
// WRITE PAYLOADS
// ============================================

/// Write applied to one field of an update (or create) payload.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    Set(Value),
    /// Atomic numeric operations, Int fields only.
    Increment(i64),
    Decrement(i64),
    Multiply(i64),
}

impl FieldOp {
    pub fn name(&self) -> &'static str {
        match self {
            FieldOp::Set(_) => "set",
            FieldOp::Increment(_) => "increment",
            FieldOp::Decrement(_) => "decrement",
            FieldOp::Multiply(_) => "multiply",
        }
    }

    pub fn is_atomic(&self) -> bool {
        !matches!(self, FieldOp::Set(_))
    }

    /// Applies the operation to the current value of `field`.
    /// Arithmetic on NULL yields NULL, as in SQL; results must fit the column.
    pub fn apply(&self, field: &FieldMeta, current: &Value) -> Result<Value, ValueError> {
        let (n, op): (i64, fn(i64, i64) -> Option<i64>) = match self {
            FieldOp::Set(value) => return Ok(value.clone()),
            FieldOp::Increment(n) => (*n, i64::checked_add),
            FieldOp::Decrement(n) => (*n, i64::checked_sub),
            FieldOp::Multiply(n) => (*n, i64::checked_mul),
        };
        match current {
            Value::Null => Ok(Value::Null),
            Value::Int(v) => op(*v, n)
                .filter(|result| field.int_range().contains(result))
                .map(Value::Int)
                .ok_or_else(|| {
                    ValueError(format!("integer out of range in {} of {}", self.name(), field.name))
                }),
            other => Err(ValueError(format!(
                "cannot {} a {} value",
                self.name(),
                other.kind_name()
            ))),
        }
    }
}

/// Field-level create/update payload.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Data(BTreeMap<String, FieldOp>);

impl Data {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.0.insert(field.into(), FieldOp::Set(value.into()));
        self
    }

    #[must_use]
    pub fn increment(mut self, field: impl Into<String>, by: i64) -> Self {
        self.0.insert(field.into(), FieldOp::Increment(by));
        self
    }

    #[must_use]
    pub fn decrement(mut self, field: impl Into<String>, by: i64) -> Self {
        self.0.insert(field.into(), FieldOp::Decrement(by));
        self
    }

    #[must_use]
    pub fn multiply(mut self, field: impl Into<String>, by: i64) -> Self {
        self.0.insert(field.into(), FieldOp::Multiply(by));
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, op: FieldOp) {
        self.0.insert(field.into(), op);
    }

    pub fn get(&self, field: &str) -> Option<&FieldOp> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &FieldOp)> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn has_atomic_ops(&self) -> bool {
        self.0.values().any(FieldOp::is_atomic)
    }

    /// Plain assignments only, e.g. a fully resolved create payload.
    pub fn from_record(record: Record) -> Self {
        Data(
            record
                .into_iter()
                .map(|(field, value)| (field, FieldOp::Set(value)))
                .collect(),
        )
    }

    /// Serializes a typed create/update struct into assignments, decoding
    /// every key against the model.
    pub fn from_serializable<T: Serialize>(meta: &ModelMeta, payload: &T) -> Result<Self, ValueError> {
        Record::from_serializable(meta, payload).map(Data::from_record)
    }

    /// The assigned values when the payload has no atomic operations.
    pub fn to_record(&self) -> Option<Record> {
        self.0
            .iter()
            .map(|(field, op)| match op {
                FieldOp::Set(value) => Some((field.clone(), value.clone())),
                _ => None,
            })
            .collect()
    }
}

impl IntoIterator for Data {
    type Item = (String, FieldOp);
    type IntoIter = std::collections::btree_map::IntoIter<String, FieldOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

// ============================================
// COUNT
// ============================================

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CountArgs {
    pub filter: Filter,
    pub cursor: Option<UniqueWhere>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
}

impl CountArgs {
    pub fn filtered(filter: Filter) -> Self {
        Self {
            filter,
            ..Self::default()
        }
    }

    /// Equivalent read window, ordered by primary key.
    pub fn to_find_many(&self) -> FindMany {
        FindMany {
            filter: self.filter.clone(),
            order_by: Vec::new(),
            cursor: self.cursor.clone(),
            take: self.take,
            skip: self.skip,
            distinct: Vec::new(),
        }
    }
}

impl From<Filter> for CountArgs {
    fn from(filter: Filter) -> Self {
        CountArgs::filtered(filter)
    }
}
