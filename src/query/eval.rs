//! In-process evaluation of filters, ordering and pagination windows.

use super::args::{FindMany, OrderBy};
use super::filter::{Condition, Filter, RelationCondition};
use super::value::{Record, Value};
use crate::schema::{ModelMeta, RelationMeta};
use bounty_store_api::{NullsOrder, QueryMode, SortOrder};
use std::cmp::Ordering;

/// Resolves the rows reached from `record` through `relation`.
pub trait RelationSource {
    fn related(&self, relation: &RelationMeta, record: &Record) -> Vec<Record>;
}

/// Does `record` (a row of `meta`) satisfy `filter`?
pub fn matches(
    meta: &ModelMeta,
    filter: &Filter,
    record: &Record,
    source: &dyn RelationSource,
) -> bool {
    match filter {
        Filter::And(parts) => parts.iter().all(|f| matches(meta, f, record, source)),
        Filter::Or(parts) => parts.iter().any(|f| matches(meta, f, record, source)),
        Filter::Not(inner) => !matches(meta, inner, record, source),
        Filter::Field {
            field,
            condition,
            mode,
        } => condition_matches(record.value(field), condition, *mode),
        Filter::Relation {
            relation,
            condition,
        } => {
            let (Some(relation), Some(target)) = (
                meta.relation(relation),
                meta.relation(relation).and_then(RelationMeta::target_meta),
            ) else {
                return false;
            };
            let related = source.related(relation, record);
            let hit = |f: &Filter| related.iter().any(|r| matches(target, f, r, source));
            match condition {
                RelationCondition::Some(f) | RelationCondition::Is(Some(f)) => hit(&**f),
                RelationCondition::Every(f) => related.iter().all(|r| matches(target, f, r, source)),
                RelationCondition::None(f) | RelationCondition::IsNot(Some(f)) => !hit(&**f),
                RelationCondition::Is(None) => related.is_empty(),
                RelationCondition::IsNot(None) => !related.is_empty(),
            }
        }
    }
}

fn fold_case(value: &Value, mode: QueryMode) -> Value {
    match (mode, value) {
        (QueryMode::Insensitive, Value::String(s)) => Value::String(s.to_ascii_lowercase()),
        _ => value.clone(),
    }
}

fn equal(column: &Value, operand: &Value, mode: QueryMode) -> bool {
    let (column, operand) = (fold_case(column, mode), fold_case(operand, mode));
    column.compare(&operand) == Some(Ordering::Equal) || column == operand
}

/// Applies one scalar condition to a column value.
pub fn condition_matches(column: &Value, condition: &Condition, mode: QueryMode) -> bool {
    match condition {
        Condition::Equals(Value::Null) => column.is_null(),
        Condition::Not(Value::Null) => !column.is_null(),
        Condition::Equals(v) => !column.is_null() && equal(column, v, mode),
        Condition::Not(v) => column.is_null() || !equal(column, v, mode),
        Condition::In(values) => {
            !column.is_null() && values.iter().any(|v| !v.is_null() && equal(column, v, mode))
        }
        Condition::NotIn(values) => {
            column.is_null() || !values.iter().any(|v| !v.is_null() && equal(column, v, mode))
        }
        Condition::Lt(v) | Condition::Lte(v) | Condition::Gt(v) | Condition::Gte(v) => {
            if column.is_null() || v.is_null() {
                return false;
            }
            let Some(ordering) = fold_case(column, mode).compare(&fold_case(v, mode)) else {
                return false;
            };
            match condition {
                Condition::Lt(_) => ordering == Ordering::Less,
                Condition::Lte(_) => ordering != Ordering::Greater,
                Condition::Gt(_) => ordering == Ordering::Greater,
                _ => ordering != Ordering::Less,
            }
        }
        Condition::Contains(needle) | Condition::StartsWith(needle) | Condition::EndsWith(needle) => {
            let Value::String(haystack) = column else {
                return false;
            };
            let (haystack, needle) = match mode {
                QueryMode::Insensitive => (haystack.to_ascii_lowercase(), needle.to_ascii_lowercase()),
                QueryMode::Default => (haystack.clone(), needle.clone()),
            };
            match condition {
                Condition::Contains(_) => haystack.contains(&needle),
                Condition::StartsWith(_) => haystack.starts_with(&needle),
                _ => haystack.ends_with(&needle),
            }
        }
    }
}

/// Compares two column values under one ordering key. Nulls are placed
/// first or last regardless of the direction.
pub fn compare_values(a: &Value, b: &Value, order: &OrderBy) -> Ordering {
    let nulls_first = order.effective_nulls() == NullsOrder::First;
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => {
            if nulls_first {
                Ordering::Less
            } else {
                Ordering::Greater
            }
        }
        (false, true) => {
            if nulls_first {
                Ordering::Greater
            } else {
                Ordering::Less
            }
        }
        (false, false) => {
            let ordering = a.compare(b).unwrap_or(Ordering::Equal);
            match order.order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        }
    }
}

pub fn compare_records(a: &Record, b: &Record, orders: &[OrderBy]) -> Ordering {
    orders
        .iter()
        .map(|o| compare_values(a.value(&o.field), b.value(&o.field), o))
        .find(|o| *o != Ordering::Equal)
        .unwrap_or(Ordering::Equal)
}

/// Ordering keys actually walked by a read: the requested keys plus a
/// primary-key tiebreak, reversed when `take` is negative.
pub fn effective_order(meta: &ModelMeta, args: &FindMany) -> Vec<OrderBy> {
    let pk = meta.primary_key().name;
    let mut orders = args.order_by.clone();
    if !orders.iter().any(|o| o.field == pk) {
        orders.push(OrderBy::asc(pk));
    }
    if args.take.is_some_and(|t| t < 0) {
        orders.iter().map(OrderBy::reversed).collect()
    } else {
        orders
    }
}

/// Keeps the rows at or after the cursor row in the walked order.
/// A missing cursor row yields no rows.
pub fn apply_cursor(rows: Vec<Record>, cursor_row: Option<&Record>, orders: &[OrderBy]) -> Vec<Record> {
    let Some(cursor_row) = cursor_row else {
        return Vec::new();
    };
    rows.into_iter()
        .filter(|r| compare_records(r, cursor_row, orders) != Ordering::Less)
        .collect()
}

/// Distinct / skip / take over rows already sorted in the walked order.
/// Restores the requested order when `take` is negative.
pub fn finish_window(rows: Vec<Record>, args: &FindMany) -> Vec<Record> {
    let rows: Vec<Record> = if args.distinct.is_empty() {
        rows
    } else {
        let mut seen: Vec<Vec<Value>> = Vec::new();
        rows.into_iter()
            .filter(|r| {
                let key: Vec<Value> = args.distinct.iter().map(|f| r.value(f).clone()).collect();
                if seen.contains(&key) {
                    false
                } else {
                    seen.push(key);
                    true
                }
            })
            .collect()
    };

    let skip = args.skip.and_then(|s| usize::try_from(s).ok()).unwrap_or(0);
    let take = args
        .take
        .and_then(|t| usize::try_from(t.unsigned_abs()).ok())
        .unwrap_or(usize::MAX);
    let mut window: Vec<Record> = rows.into_iter().skip(skip).take(take).collect();
    if args.take.is_some_and(|t| t < 0) {
        window.reverse();
    }
    window
}

/// Full read pipeline over an unordered candidate set: filter, sort,
/// cursor, distinct, skip, take.
pub fn read(
    meta: &ModelMeta,
    rows: &[Record],
    args: &FindMany,
    source: &dyn RelationSource,
) -> Vec<Record> {
    let orders = effective_order(meta, args);
    let mut selected: Vec<Record> = rows
        .iter()
        .filter(|r| matches(meta, &args.filter, r, source))
        .cloned()
        .collect();
    selected.sort_by(|a, b| compare_records(a, b, &orders));

    if let Some(cursor) = &args.cursor {
        let cursor_filter = cursor.to_filter();
        let cursor_row = rows.iter().find(|r| matches(meta, &cursor_filter, r, source));
        selected = apply_cursor(selected, cursor_row, &orders);
    }
    finish_window(selected, args)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::args::UniqueWhere;
    use crate::schema::{TASK, TASK_DEVELOPER};
    use rstest::rstest;

    struct NoRelations;

    impl RelationSource for NoRelations {
        fn related(&self, _: &RelationMeta, _: &Record) -> Vec<Record> {
            Vec::new()
        }
    }

    /// Toutes les tâches ont un développeur "dev-1" sauf t3.
    struct Developers;

    impl RelationSource for Developers {
        fn related(&self, relation: &RelationMeta, record: &Record) -> Vec<Record> {
            if relation.target != TASK_DEVELOPER.name || record.value("id") == &Value::from("t3") {
                return Vec::new();
            }
            vec![Record::new()
                .with("task_id", record.value("id").clone())
                .with("developer_id", "dev-1")]
        }
    }

    fn task(id: &str, title: &str, requirements: Option<&str>) -> Record {
        Record::new()
            .with("id", id)
            .with("title", title)
            .with("requirements", requirements)
    }

    fn ids(rows: &[Record]) -> Vec<String> {
        rows.iter()
            .filter_map(|r| r.value("id").as_str().map(str::to_string))
            .collect()
    }

    #[rstest]
    #[case(Condition::Equals(Value::Null), true)]
    #[case(Condition::Not(Value::Null), false)]
    #[case(Condition::Equals(Value::from("x")), false)]
    #[case(Condition::Not(Value::from("x")), true)]
    #[case(Condition::In(vec![Value::from("x")]), false)]
    #[case(Condition::NotIn(vec![Value::from("x")]), true)]
    #[case(Condition::Lt(Value::from("x")), false)]
    #[case(Condition::Contains("x".to_string()), false)]
    fn null_column_semantics(#[case] condition: Condition, #[case] expected: bool) {
        assert_eq!(
            condition_matches(&Value::Null, &condition, QueryMode::Default),
            expected
        );
    }

    #[rstest]
    #[case(Condition::In(vec![]), false)]
    #[case(Condition::NotIn(vec![]), true)]
    fn empty_lists(#[case] condition: Condition, #[case] expected: bool) {
        assert_eq!(
            condition_matches(&Value::from("a"), &condition, QueryMode::Default),
            expected
        );
    }

    #[test]
    fn empty_or_matches_nothing_and_empty_and_everything() {
        let row = task("t1", "Audit", None);
        assert!(!matches(&TASK, &Filter::Or(vec![]), &row, &NoRelations));
        assert!(matches(&TASK, &Filter::And(vec![]), &row, &NoRelations));
    }

    #[test]
    fn insensitive_pattern_matching() {
        let title = Value::from("Smart Contract Audit");
        let contains = Condition::Contains("contract".to_string());
        assert!(!condition_matches(&title, &contains, QueryMode::Default));
        assert!(condition_matches(&title, &contains, QueryMode::Insensitive));
        assert!(condition_matches(
            &title,
            &Condition::StartsWith("smart".to_string()),
            QueryMode::Insensitive
        ));
    }

    #[test]
    fn insensitive_mode_folds_ascii_only() {
        let name = Value::from("ÉLODIE Martin");
        let equals = |s: &str| Condition::Equals(Value::from(s));

        assert!(condition_matches(&name, &equals("Élodie martin"), QueryMode::Insensitive));
        assert!(!condition_matches(&name, &equals("élodie martin"), QueryMode::Insensitive));
    }

    #[test]
    fn relation_conditions_use_source() {
        let with_dev = task("t1", "A", None);
        let without_dev = task("t3", "B", None);
        let no_developer = Filter::relation("developer").is_none();
        let by_dev1 = Filter::relation("developer").is(Filter::field("developer_id").equals("dev-1"));

        assert!(!matches(&TASK, &no_developer, &with_dev, &Developers));
        assert!(matches(&TASK, &no_developer, &without_dev, &Developers));
        assert!(matches(&TASK, &by_dev1, &with_dev, &Developers));
        assert!(!matches(&TASK, &by_dev1, &without_dev, &Developers));
    }

    #[test]
    fn every_is_vacuously_true() {
        let row = task("t1", "A", None);
        let filter = Filter::relation("transactions").every(Filter::field("status").equals("FAILED"));
        assert!(matches(&TASK, &filter, &row, &NoRelations));
    }

    #[test]
    fn nulls_placement_follows_direction() {
        let rows = vec![
            task("t1", "A", Some("b")),
            task("t2", "B", None),
            task("t3", "C", Some("a")),
        ];
        let asc = FindMany::new().order_by(OrderBy::asc("requirements"));
        assert_eq!(ids(&read(&TASK, &rows, &asc, &NoRelations)), ["t3", "t1", "t2"]);

        let desc = FindMany::new().order_by(OrderBy::desc("requirements"));
        assert_eq!(ids(&read(&TASK, &rows, &desc, &NoRelations)), ["t2", "t1", "t3"]);

        let asc_first = FindMany::new().order_by(OrderBy::asc("requirements").nulls_first());
        assert_eq!(ids(&read(&TASK, &rows, &asc_first, &NoRelations)), ["t2", "t3", "t1"]);
    }

    #[test]
    fn cursor_with_positive_and_negative_take() {
        let rows: Vec<Record> = (1..=6).map(|i| task(&format!("t{i}"), "T", None)).collect();

        let forward = FindMany::new().cursor(UniqueWhere::id("t3")).skip(1).take(2);
        assert_eq!(ids(&read(&TASK, &rows, &forward, &NoRelations)), ["t4", "t5"]);

        let backward = FindMany::new().cursor(UniqueWhere::id("t3")).take(-2);
        assert_eq!(ids(&read(&TASK, &rows, &backward, &NoRelations)), ["t2", "t3"]);

        let missing = FindMany::new().cursor(UniqueWhere::id("t9")).take(2);
        assert!(read(&TASK, &rows, &missing, &NoRelations).is_empty());
    }

    #[test]
    fn negative_take_without_cursor_takes_the_tail() {
        let rows: Vec<Record> = (1..=5).map(|i| task(&format!("t{i}"), "T", None)).collect();
        let args = FindMany::new().take(-2);
        assert_eq!(ids(&read(&TASK, &rows, &args, &NoRelations)), ["t4", "t5"]);
    }

    #[test]
    fn distinct_keeps_first_in_order() {
        let rows = vec![
            task("t1", "Same", None),
            task("t2", "Other", None),
            task("t3", "Same", None),
        ];
        let args = FindMany::new().distinct(["title"]);
        assert_eq!(ids(&read(&TASK, &rows, &args, &NoRelations)), ["t1", "t2"]);
    }
}
