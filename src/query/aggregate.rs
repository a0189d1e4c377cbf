//! Aggregate and group-by argument shapes, their results, and the
//! in-memory computation used by the memory engine.

use super::args::{FindMany, OrderBy, UniqueWhere};
use super::eval;
use super::filter::{Condition, Filter};
use super::value::{Record, Value, ValueError};
use crate::schema::{ModelMeta, ScalarKind};
use bounty_store_api::{NullsOrder, QueryMode, SortOrder};
use serde_json::Value as Json;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum AggregateFn {
    Count,
    Avg,
    Sum,
    Min,
    Max,
}

impl AggregateFn {
    pub fn name(self) -> &'static str {
        match self {
            AggregateFn::Count => "_count",
            AggregateFn::Avg => "_avg",
            AggregateFn::Sum => "_sum",
            AggregateFn::Min => "_min",
            AggregateFn::Max => "_max",
        }
    }
}

/// Result key of an aggregate: `_count._all`, `_avg.network_id`, ...
pub fn result_key(func: AggregateFn, field: Option<&str>) -> String {
    format!("{}.{}", func.name(), field.unwrap_or("_all"))
}

/// Which aggregates to compute.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateSelection {
    pub count_all: bool,
    pub count: Vec<String>,
    pub avg: Vec<String>,
    pub sum: Vec<String>,
    pub min: Vec<String>,
    pub max: Vec<String>,
}

fn strings<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Vec<String> {
    fields.into_iter().map(Into::into).collect()
}

impl AggregateSelection {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn count_all(mut self) -> Self {
        self.count_all = true;
        self
    }

    #[must_use]
    pub fn count<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.count = strings(fields);
        self
    }

    #[must_use]
    pub fn avg<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.avg = strings(fields);
        self
    }

    #[must_use]
    pub fn sum<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.sum = strings(fields);
        self
    }

    #[must_use]
    pub fn min<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.min = strings(fields);
        self
    }

    #[must_use]
    pub fn max<S: Into<String>>(mut self, fields: impl IntoIterator<Item = S>) -> Self {
        self.max = strings(fields);
        self
    }

    pub fn is_empty(&self) -> bool {
        !self.count_all
            && self.count.is_empty()
            && self.avg.is_empty()
            && self.sum.is_empty()
            && self.min.is_empty()
            && self.max.is_empty()
    }

    /// Adds one (function, field) pair unless it is already requested.
    pub fn push(&mut self, func: AggregateFn, field: Option<&str>) {
        let Some(field) = field else {
            self.count_all = self.count_all || func == AggregateFn::Count;
            return;
        };
        let fields = match func {
            AggregateFn::Count => &mut self.count,
            AggregateFn::Avg => &mut self.avg,
            AggregateFn::Sum => &mut self.sum,
            AggregateFn::Min => &mut self.min,
            AggregateFn::Max => &mut self.max,
        };
        if !fields.iter().any(|f| f == field) {
            fields.push(field.to_string());
        }
    }

    /// Every requested (function, field) pair; `None` is `_count._all`.
    pub fn entries(&self) -> Vec<(AggregateFn, Option<&str>)> {
        let mut entries = Vec::new();
        if self.count_all {
            entries.push((AggregateFn::Count, None));
        }
        let groups = [
            (AggregateFn::Count, &self.count),
            (AggregateFn::Avg, &self.avg),
            (AggregateFn::Sum, &self.sum),
            (AggregateFn::Min, &self.min),
            (AggregateFn::Max, &self.max),
        ];
        for (func, fields) in groups {
            entries.extend(fields.iter().map(|f| (func, Some(f.as_str()))));
        }
        entries
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateArgs {
    pub filter: Filter,
    pub order_by: Vec<OrderBy>,
    pub cursor: Option<UniqueWhere>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub select: AggregateSelection,
}

impl AggregateArgs {
    pub fn new(select: AggregateSelection) -> Self {
        Self {
            select,
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
    pub fn take(mut self, take: i64) -> Self {
        self.take = Some(take);
        self
    }

    #[must_use]
    pub fn skip(mut self, skip: i64) -> Self {
        self.skip = Some(skip);
        self
    }

    /// Rows the aggregates are computed over.
    pub fn to_find_many(&self) -> FindMany {
        FindMany {
            filter: self.filter.clone(),
            order_by: self.order_by.clone(),
            cursor: self.cursor.clone(),
            take: self.take,
            skip: self.skip,
            distinct: Vec::new(),
        }
    }
}

/// Computed aggregates keyed by [`result_key`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregateResult(BTreeMap<String, Value>);

impl AggregateResult {
    pub fn get(&self, func: AggregateFn, field: Option<&str>) -> &Value {
        self.0.get(&result_key(func, field)).unwrap_or(&Value::Null)
    }

    pub fn count_all(&self) -> Option<u64> {
        self.get(AggregateFn::Count, None).as_i64().and_then(|n| u64::try_from(n).ok())
    }

    pub fn count(&self, field: &str) -> Option<u64> {
        self.get(AggregateFn::Count, Some(field))
            .as_i64()
            .and_then(|n| u64::try_from(n).ok())
    }

    pub fn avg(&self, field: &str) -> Option<f64> {
        match self.get(AggregateFn::Avg, Some(field)) {
            Value::Float(f) => Some(*f),
            #[allow(clippy::cast_precision_loss)]
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    pub fn sum(&self, field: &str) -> Option<i64> {
        self.get(AggregateFn::Sum, Some(field)).as_i64()
    }

    pub fn min(&self, field: &str) -> &Value {
        self.get(AggregateFn::Min, Some(field))
    }

    pub fn max(&self, field: &str) -> &Value {
        self.get(AggregateFn::Max, Some(field))
    }

    pub fn insert(&mut self, func: AggregateFn, field: Option<&str>, value: Value) {
        self.0.insert(result_key(func, field), value);
    }

    /// Keeps only the aggregates of `selection`.
    #[must_use]
    pub fn restricted_to(mut self, selection: &AggregateSelection) -> Self {
        let keys: Vec<String> = selection
            .entries()
            .into_iter()
            .map(|(func, field)| result_key(func, field))
            .collect();
        self.0.retain(|key, _| keys.contains(key));
        self
    }

    pub fn to_json(&self) -> Json {
        Json::Object(self.0.iter().map(|(k, v)| (k.clone(), v.to_json())).collect())
    }

    /// Decodes the aggregate part of a JSON row produced by the SQL
    /// builder (keys as in [`result_key`]).
    pub fn from_json(
        meta: &ModelMeta,
        selection: &AggregateSelection,
        row: &Json,
    ) -> Result<Self, ValueError> {
        let mut result = AggregateResult::default();
        for (func, field) in selection.entries() {
            let key = result_key(func, field);
            let raw = row.get(&key).unwrap_or(&Json::Null);
            let value = match func {
                AggregateFn::Count | AggregateFn::Sum => Value::from_json(ScalarKind::Int, raw)?,
                AggregateFn::Avg => raw.as_f64().map_or(Value::Null, Value::Float),
                AggregateFn::Min | AggregateFn::Max => {
                    let kind = field
                        .and_then(|f| meta.field(f))
                        .map(|f| f.kind)
                        .ok_or_else(|| ValueError(format!("unknown aggregate column {key}")))?;
                    Value::from_json(kind, raw)?
                }
            };
            result.0.insert(key, value);
        }
        Ok(result)
    }
}

// ============================================
// GROUP BY
// ============================================

/// Post-grouping condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Having {
    And(Vec<Having>),
    Or(Vec<Having>),
    Not(Box<Having>),
    /// Condition on an aggregate of the group (`field: None` is `_count._all`).
    Aggregate {
        func: AggregateFn,
        field: Option<String>,
        condition: Condition,
    },
    /// Condition on one of the `by` fields.
    Field { field: String, condition: Condition },
}

impl Having {
    pub fn count_all(condition: Condition) -> Self {
        Having::Aggregate {
            func: AggregateFn::Count,
            field: None,
            condition,
        }
    }

    pub fn aggregate(func: AggregateFn, field: impl Into<String>, condition: Condition) -> Self {
        Having::Aggregate {
            func,
            field: Some(field.into()),
            condition,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum GroupOrder {
    /// Order by a `by` field.
    Field(OrderBy),
    Aggregate {
        func: AggregateFn,
        field: Option<String>,
        order: SortOrder,
    },
}

impl GroupOrder {
    pub fn nulls(&self) -> NullsOrder {
        match self {
            GroupOrder::Field(order) => order.effective_nulls(),
            GroupOrder::Aggregate { order, .. } => OrderBy {
                field: String::new(),
                order: *order,
                nulls: None,
            }
            .effective_nulls(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GroupByArgs {
    pub by: Vec<String>,
    pub filter: Filter,
    pub having: Option<Having>,
    pub order_by: Vec<GroupOrder>,
    pub take: Option<i64>,
    pub skip: Option<i64>,
    pub select: AggregateSelection,
}

impl GroupByArgs {
    pub fn by<S: Into<String>>(fields: impl IntoIterator<Item = S>) -> Self {
        Self {
            by: strings(fields),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = filter;
        self
    }

    #[must_use]
    pub fn having(mut self, having: Having) -> Self {
        self.having = Some(having);
        self
    }

    #[must_use]
    pub fn order_by(mut self, order: GroupOrder) -> Self {
        self.order_by.push(order);
        self
    }

    #[must_use]
    pub fn select(mut self, select: AggregateSelection) -> Self {
        self.select = select;
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

    /// Explicit ordering, or the `by` fields ascending.
    pub fn effective_order(&self) -> Vec<GroupOrder> {
        if self.order_by.is_empty() {
            self.by
                .iter()
                .map(|f| GroupOrder::Field(OrderBy::asc(f)))
                .collect()
        } else {
            self.order_by.clone()
        }
    }
}

/// One group: its `by` values and the requested aggregates.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRow {
    pub keys: Record,
    pub aggregates: AggregateResult,
}

impl GroupRow {
    pub fn key(&self, field: &str) -> &Value {
        self.keys.value(field)
    }

    pub fn to_json(&self) -> Json {
        let mut object = match self.keys.to_json() {
            Json::Object(map) => map,
            _ => serde_json::Map::new(),
        };
        if let Json::Object(aggregates) = self.aggregates.to_json() {
            object.extend(aggregates);
        }
        Json::Object(object)
    }

    /// Decodes a JSON group row produced by the SQL builder.
    pub fn from_json(meta: &ModelMeta, args: &GroupByArgs, row: &Json) -> Result<Self, ValueError> {
        let mut keys = Record::new();
        for field in &args.by {
            let kind = meta
                .field(field)
                .map(|f| f.kind)
                .ok_or_else(|| ValueError(format!("unknown group field {field}")))?;
            let raw = row.get(field).unwrap_or(&Json::Null);
            keys.insert(field.clone(), Value::from_json(kind, raw)?);
        }
        let aggregates = AggregateResult::from_json(meta, &args.select, row)?;
        Ok(GroupRow { keys, aggregates })
    }
}

// ============================================
// IN-MEMORY COMPUTATION
// ============================================

fn non_null<'a>(rows: &'a [&Record], field: &'a str) -> impl Iterator<Item = &'a Value> + 'a {
    rows.iter().map(move |r| r.value(field)).filter(|v| !v.is_null())
}

fn extreme(rows: &[&Record], field: &str, wanted: Ordering) -> Value {
    non_null(rows, field)
        .fold(None::<&Value>, |best, v| match best {
            Some(b) if v.compare(b) != Some(wanted) => Some(b),
            _ => Some(v),
        })
        .cloned()
        .unwrap_or(Value::Null)
}

/// BIGINT sum; overflow is an error as in PostgreSQL.
fn checked_sum(values: &[i64]) -> Result<i64, ValueError> {
    values
        .iter()
        .try_fold(0_i64, |acc, &v| acc.checked_add(v))
        .ok_or_else(|| ValueError("bigint out of range in _sum".to_string()))
}

/// Computes the selected aggregates over `rows`.
pub fn compute(rows: &[&Record], selection: &AggregateSelection) -> Result<AggregateResult, ValueError> {
    let mut result = AggregateResult::default();
    for (func, field) in selection.entries() {
        let value = match (func, field) {
            (AggregateFn::Count, None) => Value::Int(i64::try_from(rows.len()).unwrap_or(i64::MAX)),
            (_, None) => Value::Null,
            (AggregateFn::Count, Some(f)) => {
                Value::Int(i64::try_from(non_null(rows, f).count()).unwrap_or(i64::MAX))
            }
            (AggregateFn::Sum, Some(f)) => {
                let ints: Vec<i64> = non_null(rows, f).filter_map(Value::as_i64).collect();
                if ints.is_empty() {
                    Value::Null
                } else {
                    Value::Int(checked_sum(&ints)?)
                }
            }
            (AggregateFn::Avg, Some(f)) => {
                let ints: Vec<i64> = non_null(rows, f).filter_map(Value::as_i64).collect();
                if ints.is_empty() {
                    Value::Null
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let avg = ints.iter().map(|&i| i as f64).sum::<f64>() / ints.len() as f64;
                    Value::Float(avg)
                }
            }
            (AggregateFn::Min, Some(f)) => extreme(rows, f, Ordering::Less),
            (AggregateFn::Max, Some(f)) => extreme(rows, f, Ordering::Greater),
        };
        result.insert(func, field, value);
    }
    Ok(result)
}

fn having_matches(having: &Having, row: &GroupRow) -> bool {
    match having {
        Having::And(parts) => parts.iter().all(|h| having_matches(h, row)),
        Having::Or(parts) => parts.iter().any(|h| having_matches(h, row)),
        Having::Not(inner) => !having_matches(inner, row),
        Having::Aggregate {
            func,
            field,
            condition,
        } => eval::condition_matches(
            row.aggregates.get(*func, field.as_deref()),
            condition,
            QueryMode::Default,
        ),
        Having::Field { field, condition } => {
            eval::condition_matches(row.key(field), condition, QueryMode::Default)
        }
    }
}

fn compare_groups(a: &GroupRow, b: &GroupRow, orders: &[GroupOrder]) -> Ordering {
    for order in orders {
        let ordering = match order {
            GroupOrder::Field(order_by) => {
                eval::compare_values(a.key(&order_by.field), b.key(&order_by.field), order_by)
            }
            GroupOrder::Aggregate { func, field, order } => {
                let order_by = OrderBy {
                    field: String::new(),
                    order: *order,
                    nulls: None,
                };
                eval::compare_values(
                    a.aggregates.get(*func, field.as_deref()),
                    b.aggregates.get(*func, field.as_deref()),
                    &order_by,
                )
            }
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

fn having_aggregates(having: &Having, selection: &mut AggregateSelection) {
    match having {
        Having::And(parts) | Having::Or(parts) => {
            for part in parts {
                having_aggregates(part, selection);
            }
        }
        Having::Not(inner) => having_aggregates(inner, selection),
        Having::Aggregate { func, field, .. } => selection.push(*func, field.as_deref()),
        Having::Field { .. } => {}
    }
}

/// The selection plus every aggregate `having` or the ordering refers to.
fn working_selection(args: &GroupByArgs) -> AggregateSelection {
    let mut selection = args.select.clone();
    if let Some(having) = &args.having {
        having_aggregates(having, &mut selection);
    }
    for order in &args.order_by {
        if let GroupOrder::Aggregate { func, field, .. } = order {
            selection.push(*func, field.as_deref());
        }
    }
    selection
}

/// Groups already-filtered rows, applies having, ordering and the
/// skip/take window.
pub fn group(rows: &[&Record], args: &GroupByArgs) -> Result<Vec<GroupRow>, ValueError> {
    let selection = working_selection(args);
    let mut buckets: Vec<(Vec<Value>, Vec<&Record>)> = Vec::new();
    for row in rows {
        let key: Vec<Value> = args.by.iter().map(|f| row.value(f).clone()).collect();
        match buckets.iter_mut().find(|(k, _)| *k == key) {
            Some((_, members)) => members.push(row),
            None => buckets.push((key, vec![row])),
        }
    }

    let mut groups = Vec::with_capacity(buckets.len());
    for (key, members) in buckets {
        let group = GroupRow {
            keys: args.by.iter().cloned().zip(key).collect(),
            aggregates: compute(&members, &selection)?,
        };
        if args.having.as_ref().is_none_or(|h| having_matches(h, &group)) {
            groups.push(group);
        }
    }

    let orders = args.effective_order();
    groups.sort_by(|a, b| compare_groups(a, b, &orders));

    let skip = args.skip.and_then(|s| usize::try_from(s).ok()).unwrap_or(0);
    let take = args
        .take
        .and_then(|t| usize::try_from(t).ok())
        .unwrap_or(usize::MAX);
    Ok(groups
        .into_iter()
        .skip(skip)
        .take(take)
        .map(|group| GroupRow {
            aggregates: group.aggregates.restricted_to(&args.select),
            ..group
        })
        .collect())
}
