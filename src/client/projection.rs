//! select / omit / include / `_count` shaping of returned records.
//!
//! Includes are loaded with one query per relation and level (parent keys
//! batched into an `in` filter), then windowed per parent in process.

use crate::engine::Engine;
use crate::error::{ClientError, ClientResult};
use crate::query::aggregate::AggregateSelection;
use crate::query::{Filter, FindMany, GroupByArgs, Include, Projection, Record, Value, eval};
use crate::schema::{Cardinality, ModelMeta, RelationMeta};

/// Key holding relation counts on a projected record.
pub const COUNT_KEY: &str = "_count";

fn resolve(meta: &ModelMeta, name: &str) -> ClientResult<(&'static RelationMeta, &'static ModelMeta)> {
    meta.relation(name)
        .and_then(|r| r.target_meta().map(|t| (r, t)))
        .ok_or_else(|| ClientError::validation(format!("Unknown relation {}.{name}", meta.name)))
}

/// Distinct non-null values of `field`, in first-seen order.
fn parent_keys(records: &[Record], field: &str) -> Vec<Value> {
    let mut keys: Vec<Value> = Vec::new();
    for value in records.iter().map(|r| r.value(field)) {
        if !value.is_null() && !keys.contains(value) {
            keys.push(value.clone());
        }
    }
    keys
}

pub fn apply(
    engine: &dyn Engine,
    meta: &'static ModelMeta,
    mut records: Vec<Record>,
    projection: &Projection,
) -> ClientResult<Vec<Record>> {
    if projection.is_identity() || records.is_empty() {
        return Ok(records);
    }

    for include in &projection.include {
        attach_include(engine, meta, &mut records, include)?;
    }
    if !projection.count.is_empty() {
        attach_counts(engine, meta, &mut records, &projection.count)?;
    }

    let included: Vec<&str> = projection
        .include
        .iter()
        .map(|i| i.relation.as_str())
        .collect();
    for record in &mut records {
        record.retain(|key| key == COUNT_KEY || included.contains(&key) || projection.keeps(key));
    }
    Ok(records)
}

fn attach_include(
    engine: &dyn Engine,
    meta: &'static ModelMeta,
    records: &mut [Record],
    include: &Include,
) -> ClientResult<()> {
    let (relation, target) = resolve(meta, &include.relation)?;
    let keys = parent_keys(records, relation.local_field);

    let fetched = if keys.is_empty() {
        Vec::new()
    } else {
        let args = FindMany {
            filter: include
                .args
                .filter
                .clone()
                .and_also(Filter::field(relation.foreign_field).in_(keys)),
            order_by: include.args.order_by.clone(),
            ..FindMany::default()
        };
        engine.find_many(target, &args)?
    };

    // Window each parent's children, then project them all in one pass
    let reversed = include.args.take.is_some_and(|t| t < 0);
    let mut sizes = Vec::with_capacity(records.len());
    let mut children = Vec::new();
    for record in records.iter() {
        let key = record.value(relation.local_field);
        let mut own: Vec<Record> = if key.is_null() {
            Vec::new()
        } else {
            fetched
                .iter()
                .filter(|c| c.value(relation.foreign_field) == key)
                .cloned()
                .collect()
        };
        if reversed {
            own.reverse();
        }
        let own = eval::finish_window(own, &include.args);
        sizes.push(own.len());
        children.extend(own);
    }
    let mut projected = apply(engine, target, children, &include.projection)?.into_iter();

    for (record, size) in records.iter_mut().zip(sizes) {
        let own: Vec<Record> = projected.by_ref().take(size).collect();
        let value = match relation.cardinality {
            Cardinality::ToMany => Value::List(own.into_iter().map(Value::Record).collect()),
            Cardinality::ToOne => own.into_iter().next().map_or(Value::Null, Value::Record),
        };
        record.insert(relation.name, value);
    }
    Ok(())
}

fn attach_counts(
    engine: &dyn Engine,
    meta: &'static ModelMeta,
    records: &mut [Record],
    relations: &[String],
) -> ClientResult<()> {
    let mut counts = vec![Record::new(); records.len()];
    for name in relations {
        let (relation, target) = resolve(meta, name)?;
        let keys = parent_keys(records, relation.local_field);
        let groups = if keys.is_empty() {
            Vec::new()
        } else {
            let args = GroupByArgs::by([relation.foreign_field])
                .filter(Filter::field(relation.foreign_field).in_(keys))
                .select(AggregateSelection::new().count_all());
            engine.group_by(target, &args)?
        };

        for (record, count) in records.iter().zip(counts.iter_mut()) {
            let key = record.value(relation.local_field);
            let n = groups
                .iter()
                .find(|g| !key.is_null() && g.key(relation.foreign_field) == key)
                .and_then(|g| g.aggregates.count_all())
                .unwrap_or(0);
            count.insert(name.clone(), Value::Int(i64::try_from(n).unwrap_or(i64::MAX)));
        }
    }

    for (record, count) in records.iter_mut().zip(counts) {
        record.insert(COUNT_KEY, Value::Record(count));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parent_keys_skip_nulls_and_duplicates() {
        let records = vec![
            Record::new().with("user_id", "u1"),
            Record::new().with("user_id", Value::Null),
            Record::new().with("user_id", "u1"),
            Record::new().with("user_id", "u2"),
        ];

        let keys = parent_keys(&records, "user_id");

        assert_eq!(keys, vec![Value::from("u1"), Value::from("u2")]);
    }
}
