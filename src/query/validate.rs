//! Checks every query argument against the registry before it reaches an
//! engine. Validated arguments come back with their values coerced to the
//! column kinds (e.g. RFC 3339 strings become `DateTime`).

use super::aggregate::{AggregateArgs, AggregateFn, AggregateSelection, GroupByArgs, GroupOrder, Having};
use super::args::{CountArgs, Data, FieldOp, FindMany, Include, OrderBy, Projection, UniqueWhere};
use super::filter::{Condition, Filter, RelationCondition};
use super::value::{Record, Value};
use crate::error::{ClientError, ClientResult};
use crate::schema::{Cardinality, DefaultValue, FieldMeta, ModelMeta, RelationMeta, ScalarKind};
use bounty_store_api::QueryMode;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;

fn field(meta: &ModelMeta, name: &str) -> ClientResult<&'static FieldMeta> {
    meta.field(name)
        .ok_or_else(|| ClientError::validation(format!("Unknown field {}.{name}", meta.name)))
}

fn relation(meta: &ModelMeta, name: &str) -> ClientResult<(&'static RelationMeta, &'static ModelMeta)> {
    let relation = meta
        .relation(name)
        .ok_or_else(|| ClientError::validation(format!("Unknown relation {}.{name}", meta.name)))?;
    let target = relation.target_meta().ok_or_else(|| {
        ClientError::validation(format!(
            "Relation {}.{name} targets unknown model {}",
            meta.name, relation.target
        ))
    })?;
    Ok((relation, target))
}

fn coerce(meta: &ModelMeta, field: &FieldMeta, value: Value) -> ClientResult<Value> {
    value
        .coerce(field.kind)
        .map_err(|e| ClientError::validation(format!("{}.{}: {e}", meta.name, field.name)))
}

/// Written Int values must fit the column (INTEGER or BIGINT).
fn within_width(meta: &ModelMeta, field: &FieldMeta, value: &Value) -> ClientResult<()> {
    match value.as_i64() {
        Some(n) if !field.int_range().contains(&n) => Err(ClientError::validation(format!(
            "{}.{}: {n} is out of range for an integer column",
            meta.name, field.name
        ))),
        _ => Ok(()),
    }
}

// ============================================
// FILTERS
// ============================================

pub fn filter(meta: &ModelMeta, filter: Filter) -> ClientResult<Filter> {
    match filter {
        Filter::And(parts) => parts
            .into_iter()
            .map(|f| self::filter(meta, f))
            .collect::<ClientResult<_>>()
            .map(Filter::And),
        Filter::Or(parts) => parts
            .into_iter()
            .map(|f| self::filter(meta, f))
            .collect::<ClientResult<_>>()
            .map(Filter::Or),
        Filter::Not(inner) => Ok(Filter::Not(Box::new(self::filter(meta, *inner)?))),
        Filter::Field {
            field: name,
            condition,
            mode,
        } => {
            let field = field(meta, &name)?;
            let condition = condition_for_kind(meta, field.name, field.kind, condition, mode)?;
            Ok(Filter::Field {
                field: name,
                condition,
                mode,
            })
        }
        Filter::Relation {
            relation: name,
            condition,
        } => {
            let (relation, target) = relation(meta, &name)?;
            let to_many = relation.cardinality == Cardinality::ToMany;
            if condition.is_to_many() != to_many {
                return Err(ClientError::validation(format!(
                    "'{}' cannot be used on {} relation {}.{name}",
                    condition.name(),
                    if to_many { "to-many" } else { "to-one" },
                    meta.name
                )));
            }
            let nested = |f: Box<Filter>| self::filter(target, *f).map(Box::new);
            let condition = match condition {
                RelationCondition::Some(f) => RelationCondition::Some(nested(f)?),
                RelationCondition::Every(f) => RelationCondition::Every(nested(f)?),
                RelationCondition::None(f) => RelationCondition::None(nested(f)?),
                RelationCondition::Is(f) => RelationCondition::Is(f.map(nested).transpose()?),
                RelationCondition::IsNot(f) => RelationCondition::IsNot(f.map(nested).transpose()?),
            };
            Ok(Filter::Relation {
                relation: name,
                condition,
            })
        }
    }
}

/// Validates a condition against a column kind and coerces its operands.
fn condition_for_kind(
    meta: &ModelMeta,
    name: &str,
    kind: ScalarKind,
    condition: Condition,
    mode: QueryMode,
) -> ClientResult<Condition> {
    let invalid = |why: &str| {
        ClientError::validation(format!(
            "'{}' is not valid on {}.{name} ({}): {why}",
            condition.name(),
            meta.name,
            kind.name()
        ))
    };

    if mode == QueryMode::Insensitive && !kind.is_textual() {
        return Err(invalid("insensitive mode needs a string column"));
    }
    if condition.is_pattern() && kind != ScalarKind::String {
        return Err(invalid("pattern matching needs a string column"));
    }
    if condition.is_range() && !kind.is_orderable() {
        return Err(invalid("column is not orderable"));
    }
    if kind == ScalarKind::Json && matches!(condition, Condition::In(_) | Condition::NotIn(_)) {
        return Err(invalid("list membership is not supported on Json"));
    }

    let one = |value: Value| {
        value
            .coerce(kind)
            .map_err(|e| ClientError::validation(format!("{}.{name}: {e}", meta.name)))
    };
    let ranged = |value: Value| {
        if value.is_null() {
            Err(ClientError::validation(format!(
                "{}.{name}: range comparison against null",
                meta.name
            )))
        } else {
            one(value)
        }
    };
    let many = |values: Vec<Value>| values.into_iter().map(&one).collect::<ClientResult<Vec<_>>>();

    Ok(match condition {
        Condition::Equals(v) => Condition::Equals(one(v)?),
        Condition::Not(v) => Condition::Not(one(v)?),
        Condition::In(vs) => Condition::In(many(vs)?),
        Condition::NotIn(vs) => Condition::NotIn(many(vs)?),
        Condition::Lt(v) => Condition::Lt(ranged(v)?),
        Condition::Lte(v) => Condition::Lte(ranged(v)?),
        Condition::Gt(v) => Condition::Gt(ranged(v)?),
        Condition::Gte(v) => Condition::Gte(ranged(v)?),
        pattern @ (Condition::Contains(_) | Condition::StartsWith(_) | Condition::EndsWith(_)) => {
            pattern
        }
    })
}

// ============================================
// READS
// ============================================

pub fn unique_where(meta: &ModelMeta, unique: UniqueWhere) -> ClientResult<UniqueWhere> {
    let field = field(meta, &unique.field)?;
    if !field.unique {
        return Err(ClientError::validation(format!(
            "{}.{} is not a unique field",
            meta.name, field.name
        )));
    }
    if unique.value.is_null() {
        return Err(ClientError::validation(format!(
            "{}.{} cannot be null in a unique selector",
            meta.name, field.name
        )));
    }
    Ok(UniqueWhere {
        value: coerce(meta, field, unique.value)?,
        extra: unique.extra.map(|f| filter(meta, f)).transpose()?,
        field: unique.field,
    })
}

pub fn order_by(meta: &ModelMeta, orders: &[OrderBy]) -> ClientResult<()> {
    for order in orders {
        let field = field(meta, &order.field)?;
        if field.kind == ScalarKind::Json {
            return Err(ClientError::validation(format!(
                "Cannot order by Json field {}.{}",
                meta.name, field.name
            )));
        }
    }
    Ok(())
}

fn skip(skip: Option<i64>) -> ClientResult<()> {
    match skip {
        Some(s) if s < 0 => Err(ClientError::validation(format!(
            "skip must be a non-negative integer, got {s}"
        ))),
        _ => Ok(()),
    }
}

pub fn find_many(meta: &ModelMeta, args: FindMany) -> ClientResult<FindMany> {
    order_by(meta, &args.order_by)?;
    skip(args.skip)?;
    for name in &args.distinct {
        let field = field(meta, name)?;
        if field.kind == ScalarKind::Json {
            return Err(ClientError::validation(format!(
                "Cannot use Json field {}.{name} in distinct",
                meta.name
            )));
        }
    }
    Ok(FindMany {
        filter: filter(meta, args.filter)?,
        cursor: args.cursor.map(|c| unique_where(meta, c)).transpose()?,
        ..args
    })
}

pub fn count(meta: &ModelMeta, args: CountArgs) -> ClientResult<CountArgs> {
    skip(args.skip)?;
    Ok(CountArgs {
        filter: filter(meta, args.filter)?,
        cursor: args.cursor.map(|c| unique_where(meta, c)).transpose()?,
        ..args
    })
}

pub fn projection(meta: &ModelMeta, projection: Projection) -> ClientResult<Projection> {
    let selected = projection.select.iter().flatten();
    for name in selected.clone().chain(&projection.omit) {
        field(meta, name)?;
    }
    if let Some(both) = selected.clone().find(|f| projection.omit.contains(f)) {
        return Err(ClientError::validation(format!(
            "{}.{both} is both selected and omitted",
            meta.name
        )));
    }

    let mut seen = BTreeSet::new();
    let mut include = Vec::with_capacity(projection.include.len());
    for inc in projection.include {
        if !seen.insert(inc.relation.clone()) {
            return Err(ClientError::validation(format!(
                "Relation {}.{} is included twice",
                meta.name, inc.relation
            )));
        }
        let (relation, target) = relation(meta, &inc.relation)?;
        if inc.args.cursor.is_some() {
            return Err(ClientError::unsupported(format!(
                "cursor is not supported inside include {}.{}",
                meta.name, relation.name
            )));
        }
        if relation.cardinality == Cardinality::ToOne && inc.args != FindMany::default() {
            return Err(ClientError::validation(format!(
                "to-one include {}.{} does not take read arguments",
                meta.name, relation.name
            )));
        }
        include.push(Include {
            args: find_many(target, inc.args)?,
            projection: self::projection(target, inc.projection)?,
            relation: inc.relation,
        });
    }

    for name in &projection.count {
        let (relation, _) = relation(meta, name)?;
        if relation.cardinality != Cardinality::ToMany {
            return Err(ClientError::validation(format!(
                "_count needs a to-many relation, {}.{name} is to-one",
                meta.name
            )));
        }
    }

    Ok(Projection {
        include,
        ..projection
    })
}

// ============================================
// WRITES
// ============================================

fn default_value(default: DefaultValue, now: DateTime<Utc>) -> Value {
    match default {
        DefaultValue::GeneratedId => Value::String(uuid::Uuid::new_v4().to_string()),
        DefaultValue::Now => Value::DateTime(now),
        DefaultValue::Bool(b) => Value::Bool(b),
        DefaultValue::Literal(s) => Value::String(s.to_string()),
    }
}

fn assigned(meta: &ModelMeta, field: &FieldMeta, value: Value) -> ClientResult<Value> {
    let value = coerce(meta, field, value)?;
    within_width(meta, field, &value)?;
    if value.is_null() && !field.nullable {
        return Err(ClientError::validation(format!(
            "{}.{} cannot be null",
            meta.name, field.name
        )));
    }
    Ok(value)
}

/// Resolves a create payload into a full row: every column present,
/// defaults applied, required fields checked.
pub fn create_record(meta: &ModelMeta, data: Data, now: DateTime<Utc>) -> ClientResult<Record> {
    let mut record = Record::new();
    for (name, op) in data {
        let field = field(meta, &name)?;
        let value = match op {
            FieldOp::Set(value) => value,
            atomic => {
                return Err(ClientError::validation(format!(
                    "'{}' is not allowed in a create payload ({}.{name})",
                    atomic.name(),
                    meta.name
                )));
            }
        };
        record.insert(name, assigned(meta, field, value)?);
    }

    for field in meta.fields {
        if record.contains_key(field.name) {
            continue;
        }
        let value = match field.default {
            Some(default) => default_value(default, now),
            None if field.nullable => Value::Null,
            None => return Err(ClientError::missing_field(meta.name, field.name)),
        };
        record.insert(field.name, value);
    }
    Ok(record)
}

/// Validates an update payload and stamps `updated_at` fields.
pub fn update_data(meta: &ModelMeta, data: Data, now: DateTime<Utc>) -> ClientResult<Data> {
    let mut validated = Data::new();
    for (name, op) in data {
        let field = field(meta, &name)?;
        let op = match op {
            FieldOp::Set(value) => FieldOp::Set(assigned(meta, field, value)?),
            atomic => {
                if field.primary_key {
                    return Err(ClientError::validation(format!(
                        "'{}' cannot be applied to the primary key {}.{name}",
                        atomic.name(),
                        meta.name
                    )));
                }
                if field.kind != ScalarKind::Int {
                    return Err(ClientError::validation(format!(
                        "'{}' needs an Int field, {}.{name} is {}",
                        atomic.name(),
                        meta.name,
                        field.kind.name()
                    )));
                }
                atomic
            }
        };
        validated.insert(name, op);
    }

    for field in meta.fields.iter().filter(|f| f.updated_at) {
        if !validated.contains(field.name) {
            validated.insert(field.name, FieldOp::Set(Value::DateTime(now)));
        }
    }
    Ok(validated)
}

// ============================================
// AGGREGATES
// ============================================

fn aggregate_field(meta: &ModelMeta, func: AggregateFn, name: &str) -> ClientResult<&'static FieldMeta> {
    let field = field(meta, name)?;
    let allowed = match func {
        AggregateFn::Count => true,
        AggregateFn::Avg | AggregateFn::Sum => field.kind == ScalarKind::Int,
        AggregateFn::Min | AggregateFn::Max => field.kind.is_orderable(),
    };
    if allowed {
        Ok(field)
    } else {
        Err(ClientError::validation(format!(
            "{} is not available on {}.{name} ({})",
            func.name(),
            meta.name,
            field.kind.name()
        )))
    }
}

fn selection(meta: &ModelMeta, selection: &AggregateSelection) -> ClientResult<()> {
    for (func, name) in selection.entries() {
        if let Some(name) = name {
            aggregate_field(meta, func, name)?;
        }
    }
    Ok(())
}

pub fn aggregate(meta: &ModelMeta, args: AggregateArgs) -> ClientResult<AggregateArgs> {
    selection(meta, &args.select)?;
    order_by(meta, &args.order_by)?;
    skip(args.skip)?;
    Ok(AggregateArgs {
        filter: filter(meta, args.filter)?,
        cursor: args.cursor.map(|c| unique_where(meta, c)).transpose()?,
        ..args
    })
}

fn having(meta: &ModelMeta, by: &[String], having: Having) -> ClientResult<Having> {
    let many = |parts: Vec<Having>| {
        parts
            .into_iter()
            .map(|h| self::having(meta, by, h))
            .collect::<ClientResult<Vec<_>>>()
    };
    match having {
        Having::And(parts) => many(parts).map(Having::And),
        Having::Or(parts) => many(parts).map(Having::Or),
        Having::Not(inner) => Ok(Having::Not(Box::new(self::having(meta, by, *inner)?))),
        Having::Field { field: name, condition } => {
            if !by.contains(&name) {
                return Err(ClientError::validation(format!(
                    "having on {}.{name} needs the field in `by`",
                    meta.name
                )));
            }
            let kind = field(meta, &name)?.kind;
            let condition = condition_for_kind(meta, &name, kind, condition, QueryMode::Default)?;
            Ok(Having::Field { field: name, condition })
        }
        Having::Aggregate { func, field: None, condition } => {
            if func != AggregateFn::Count {
                return Err(ClientError::validation(format!(
                    "{} needs a field",
                    func.name()
                )));
            }
            let condition = condition_for_kind(meta, "_all", ScalarKind::Int, condition, QueryMode::Default)?;
            Ok(Having::Aggregate { func, field: None, condition })
        }
        Having::Aggregate { func, field: Some(name), condition } => {
            let field = aggregate_field(meta, func, &name)?;
            let condition = match func {
                AggregateFn::Count | AggregateFn::Sum => {
                    condition_for_kind(meta, &name, ScalarKind::Int, condition, QueryMode::Default)?
                }
                // Moyenne : opérandes numériques laissés tels quels
                AggregateFn::Avg => {
                    if condition.is_pattern() {
                        return Err(ClientError::validation("pattern matching on _avg"));
                    }
                    condition
                }
                AggregateFn::Min | AggregateFn::Max => {
                    condition_for_kind(meta, &name, field.kind, condition, QueryMode::Default)?
                }
            };
            Ok(Having::Aggregate { func, field: Some(name), condition })
        }
    }
}

pub fn group_by(meta: &ModelMeta, args: GroupByArgs) -> ClientResult<GroupByArgs> {
    if args.by.is_empty() {
        return Err(ClientError::validation(format!(
            "groupBy on {} needs at least one field in `by`",
            meta.name
        )));
    }
    for name in &args.by {
        if field(meta, name)?.kind == ScalarKind::Json {
            return Err(ClientError::validation(format!(
                "Cannot group by Json field {}.{name}",
                meta.name
            )));
        }
    }
    selection(meta, &args.select)?;
    skip(args.skip)?;
    if let Some(take) = args.take.filter(|t| *t < 0) {
        return Err(ClientError::validation(format!(
            "groupBy take must be non-negative, got {take}"
        )));
    }
    for order in &args.order_by {
        match order {
            GroupOrder::Field(order) => {
                if !args.by.contains(&order.field) {
                    return Err(ClientError::validation(format!(
                        "Cannot order groups by {}.{}: field is not in `by`",
                        meta.name, order.field
                    )));
                }
            }
            GroupOrder::Aggregate { func, field: Some(name), .. } => {
                aggregate_field(meta, *func, name)?;
            }
            GroupOrder::Aggregate { func, field: None, .. } => {
                if *func != AggregateFn::Count {
                    return Err(ClientError::validation(format!("{} needs a field", func.name())));
                }
            }
        }
    }

    let having = args.having.map(|h| having(meta, &args.by, h)).transpose()?;
    Ok(GroupByArgs {
        filter: filter(meta, args.filter)?,
        having,
        ..args
    })
}
