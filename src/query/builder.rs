//! PostgreSQL statement generation.
//!
//! Every statement yields a single text column `data` holding one JSON
//! object per row, so a single decoder handles reads, writes, counts,
//! aggregates and groups. Identifiers are always quoted and values are
//! always bound (`$n`), except the literal `NULL`.

use super::aggregate::{AggregateArgs, AggregateFn, GroupByArgs, GroupOrder, Having, result_key};
use super::args::{CountArgs, Data, FieldOp, FindMany, OrderBy};
use super::eval::effective_order;
use super::filter::{Condition, Filter, RelationCondition};
use super::value::{Record, Value};
use crate::schema::{ModelMeta, ScalarKind};
use bounty_store_api::{NullsOrder, QueryMode, SortOrder};

/// SQL text plus its positional parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Column holding the JSON-encoded row in every generated statement.
pub const DATA_COLUMN: &str = "data";

pub fn quote(ident: &str) -> String {
    format!("\"{}\"", ident.replace('"', "\"\""))
}

fn column(alias: &str, field: &str) -> String {
    format!("{}.{}", quote(alias), quote(field))
}

/// Byte-wise collation so text ordering matches the in-memory engine.
fn collated(expr: &str, kind: ScalarKind) -> String {
    if kind.is_textual() {
        format!("{expr} COLLATE \"C\"")
    } else {
        expr.to_string()
    }
}

/// Under the "C" collation `LOWER` folds ASCII letters only, whatever the
/// database locale.
fn ascii_lower(expr: &str) -> String {
    format!("LOWER({expr} COLLATE \"C\")")
}

fn escape_like(raw: &str) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

fn kind_of(meta: &ModelMeta, field: &str) -> ScalarKind {
    meta.field(field).map_or(ScalarKind::String, |f| f.kind)
}

#[derive(Default)]
struct Writer {
    params: Vec<Value>,
    aliases: usize,
}

impl Writer {
    fn bind(&mut self, value: Value) -> String {
        if value.is_null() {
            return "NULL".to_string();
        }
        self.params.push(value);
        format!("${}", self.params.len())
    }

    fn alias(&mut self) -> String {
        self.aliases += 1;
        format!("m{}", self.aliases)
    }

    fn finish(self, sql: String) -> Statement {
        Statement {
            sql,
            params: self.params,
        }
    }

    // ---------- WHERE ----------

    fn filter(&mut self, meta: &ModelMeta, alias: &str, filter: &Filter) -> String {
        match filter {
            Filter::And(parts) if parts.is_empty() => "TRUE".to_string(),
            Filter::Or(parts) if parts.is_empty() => "FALSE".to_string(),
            Filter::And(parts) => self.join(meta, alias, parts, " AND "),
            Filter::Or(parts) => self.join(meta, alias, parts, " OR "),
            Filter::Not(inner) => format!("(NOT {})", self.filter(meta, alias, inner)),
            Filter::Field {
                field,
                condition,
                mode,
            } => self.condition(&column(alias, field), kind_of(meta, field), condition, *mode),
            Filter::Relation {
                relation,
                condition,
            } => self.relation(meta, alias, relation, condition),
        }
    }

    fn join(&mut self, meta: &ModelMeta, alias: &str, parts: &[Filter], sep: &str) -> String {
        let rendered: Vec<String> = parts.iter().map(|f| self.filter(meta, alias, f)).collect();
        format!("({})", rendered.join(sep))
    }

    fn relation(
        &mut self,
        meta: &ModelMeta,
        alias: &str,
        name: &str,
        condition: &RelationCondition,
    ) -> String {
        let Some((relation, target)) = meta
            .relation(name)
            .and_then(|r| r.target_meta().map(|t| (r, t)))
        else {
            return "FALSE".to_string();
        };
        let inner = self.alias();
        let link = format!(
            "{} = {}",
            column(&inner, relation.foreign_field),
            column(alias, relation.local_field)
        );
        let exists = |writer: &mut Self, nested: Option<&Filter>, negate_nested: bool| {
            let extra = match nested {
                Some(f) => {
                    let rendered = writer.filter(target, &inner, f);
                    if negate_nested {
                        format!(" AND (NOT {rendered})")
                    } else {
                        format!(" AND {rendered}")
                    }
                }
                None => String::new(),
            };
            format!(
                "EXISTS (SELECT 1 FROM {} AS {} WHERE {link}{extra})",
                quote(target.table),
                quote(&inner)
            )
        };
        match condition {
            RelationCondition::Some(f) | RelationCondition::Is(Some(f)) => {
                exists(self, Some(&**f), false)
            }
            RelationCondition::None(f) | RelationCondition::IsNot(Some(f)) => {
                format!("(NOT {})", exists(self, Some(&**f), false))
            }
            RelationCondition::Every(f) => format!("(NOT {})", exists(self, Some(&**f), true)),
            RelationCondition::Is(None) => format!("(NOT {})", exists(self, None, false)),
            RelationCondition::IsNot(None) => exists(self, None, false),
        }
    }

    /// Renders one scalar condition on `expr`. The result is never NULL so
    /// that `NOT` behaves like the in-memory evaluator.
    fn condition(&mut self, expr: &str, kind: ScalarKind, condition: &Condition, mode: QueryMode) -> String {
        let insensitive = mode == QueryMode::Insensitive && kind.is_textual();
        let lhs = if insensitive {
            ascii_lower(expr)
        } else {
            expr.to_string()
        };
        let operand = |writer: &mut Self, value: &Value| {
            let placeholder = writer.bind(value.clone());
            if insensitive {
                ascii_lower(&placeholder)
            } else {
                placeholder
            }
        };

        match condition {
            Condition::Equals(Value::Null) => format!("({expr} IS NULL)"),
            Condition::Not(Value::Null) => format!("({expr} IS NOT NULL)"),
            Condition::Equals(v) => format!("COALESCE({lhs} = {}, FALSE)", operand(self, v)),
            Condition::Not(v) => format!("({expr} IS NULL OR {lhs} <> {})", operand(self, v)),
            Condition::In(values) | Condition::NotIn(values) => {
                let negated = matches!(condition, Condition::NotIn(_));
                let list: Vec<String> = values
                    .iter()
                    .filter(|v| !v.is_null())
                    .map(|v| operand(self, v))
                    .collect();
                match (list.is_empty(), negated) {
                    (true, false) => "FALSE".to_string(),
                    (true, true) => "TRUE".to_string(),
                    (false, false) => format!("COALESCE({lhs} IN ({}), FALSE)", list.join(", ")),
                    (false, true) => format!("({expr} IS NULL OR {lhs} NOT IN ({}))", list.join(", ")),
                }
            }
            Condition::Lt(v) | Condition::Lte(v) | Condition::Gt(v) | Condition::Gte(v) => {
                let op = match condition {
                    Condition::Lt(_) => "<",
                    Condition::Lte(_) => "<=",
                    Condition::Gt(_) => ">",
                    _ => ">=",
                };
                let rhs = operand(self, v);
                format!("COALESCE({} {op} {rhs}, FALSE)", collated(&lhs, kind))
            }
            Condition::Contains(s) | Condition::StartsWith(s) | Condition::EndsWith(s) => {
                let escaped = escape_like(s);
                let pattern = match condition {
                    Condition::Contains(_) => format!("%{escaped}%"),
                    Condition::StartsWith(_) => format!("{escaped}%"),
                    _ => format!("%{escaped}"),
                };
                let placeholder = self.bind(Value::String(pattern));
                let (lhs, pattern) = if insensitive {
                    (ascii_lower(expr), ascii_lower(&placeholder))
                } else {
                    (expr.to_string(), placeholder)
                };
                format!("COALESCE({lhs} LIKE {pattern} ESCAPE '\\', FALSE)")
            }
        }
    }

    // ---------- ORDER BY / CURSOR ----------

    fn order_clause(meta: &ModelMeta, alias: &str, orders: &[OrderBy]) -> String {
        let keys: Vec<String> = orders
            .iter()
            .map(|o| {
                let expr = collated(&column(alias, &o.field), kind_of(meta, &o.field));
                order_suffix(&expr, o.order, o.effective_nulls())
            })
            .collect();
        format!(" ORDER BY {}", keys.join(", "))
    }

    /// Rows at or after the cursor row `c` in the walked order.
    fn cursor_condition(meta: &ModelMeta, alias: &str, cursor: &str, orders: &[OrderBy]) -> String {
        let mut branches = Vec::with_capacity(orders.len() + 1);
        let mut equal_prefix: Vec<String> = Vec::new();
        for order in orders {
            let kind = kind_of(meta, &order.field);
            let row = column(alias, &order.field);
            let cur = column(cursor, &order.field);
            let op = match order.order {
                SortOrder::Asc => ">",
                SortOrder::Desc => "<",
            };
            let compared = format!("{} {op} {}", collated(&row, kind), collated(&cur, kind));
            let after = match order.effective_nulls() {
                NullsOrder::Last => format!("({cur} IS NOT NULL AND ({compared} OR {row} IS NULL))"),
                NullsOrder::First => format!("(({cur} IS NULL AND {row} IS NOT NULL) OR {compared})"),
            };
            let mut branch = equal_prefix.clone();
            branch.push(after);
            branches.push(format!("({})", branch.join(" AND ")));
            equal_prefix.push(format!("{row} IS NOT DISTINCT FROM {cur}"));
        }
        branches.push(format!("({})", equal_prefix.join(" AND ")));
        format!("({})", branches.join(" OR "))
    }

    /// `SELECT <columns> FROM table AS m ... WHERE ... ORDER BY ... LIMIT ... OFFSET ...`
    fn window(&mut self, meta: &ModelMeta, args: &FindMany, columns: &str, paginate: bool) -> String {
        let alias = "m";
        let orders = effective_order(meta, args);
        let mut sql = format!("SELECT {columns} FROM {} AS {}", quote(meta.table), quote(alias));

        let mut conditions = vec![self.filter(meta, alias, &args.filter)];
        if let Some(cursor) = &args.cursor {
            let cursor_filter = cursor.to_filter();
            let rendered = self.filter(meta, "c", &cursor_filter);
            sql.push_str(&format!(
                " CROSS JOIN (SELECT * FROM {} AS \"c\" WHERE {rendered} LIMIT 1) AS \"c\"",
                quote(meta.table)
            ));
            conditions.push(Self::cursor_condition(meta, alias, "c", &orders));
        }
        sql.push_str(&format!(" WHERE {}", conditions.join(" AND ")));
        sql.push_str(&Self::order_clause(meta, alias, &orders));

        if paginate {
            if let Some(take) = args.take {
                sql.push_str(&format!(" LIMIT {}", take.unsigned_abs()));
            }
            if let Some(skip) = args.skip.filter(|s| *s > 0) {
                sql.push_str(&format!(" OFFSET {skip}"));
            }
        }
        sql
    }

    fn aggregate_expr(meta: &ModelMeta, alias: &str, func: AggregateFn, field: Option<&str>) -> String {
        let Some(field) = field else {
            return "COUNT(*)".to_string();
        };
        let col = column(alias, field);
        match func {
            AggregateFn::Count => format!("COUNT({col})"),
            AggregateFn::Avg => format!("AVG({col})::double precision"),
            AggregateFn::Sum => format!("SUM({col})::bigint"),
            AggregateFn::Min => format!("MIN({})", collated(&col, kind_of(meta, field))),
            AggregateFn::Max => format!("MAX({})", collated(&col, kind_of(meta, field))),
        }
    }

    fn having(&mut self, meta: &ModelMeta, having: &Having) -> String {
        match having {
            Having::And(parts) if parts.is_empty() => "TRUE".to_string(),
            Having::Or(parts) if parts.is_empty() => "FALSE".to_string(),
            Having::And(parts) | Having::Or(parts) => {
                let sep = if matches!(having, Having::And(_)) { " AND " } else { " OR " };
                let rendered: Vec<String> = parts.iter().map(|h| self.having(meta, h)).collect();
                format!("({})", rendered.join(sep))
            }
            Having::Not(inner) => format!("(NOT {})", self.having(meta, inner)),
            Having::Field { field, condition } => {
                self.condition(&column("m", field), kind_of(meta, field), condition, QueryMode::Default)
            }
            Having::Aggregate {
                func,
                field,
                condition,
            } => {
                let expr = Self::aggregate_expr(meta, "m", *func, field.as_deref());
                let kind = match (func, field) {
                    (AggregateFn::Min | AggregateFn::Max, Some(f)) => kind_of(meta, f),
                    _ => ScalarKind::Int,
                };
                self.condition(&expr, kind, condition, QueryMode::Default)
            }
        }
    }
}

fn order_suffix(expr: &str, order: SortOrder, nulls: NullsOrder) -> String {
    let direction = match order {
        SortOrder::Asc => "ASC",
        SortOrder::Desc => "DESC",
    };
    let nulls = match nulls {
        NullsOrder::First => "NULLS FIRST",
        NullsOrder::Last => "NULLS LAST",
    };
    format!("{expr} {direction} {nulls}")
}

fn wrap_returning(inner: &str) -> String {
    format!("WITH \"w\" AS ({inner}) SELECT row_to_json(\"w\")::text AS {DATA_COLUMN} FROM \"w\"")
}

// ============================================
// PUBLIC BUILDERS
// ============================================

/// Rows of `meta` in walked order. Distinct reads are fetched without
/// LIMIT/OFFSET; the caller finishes the window in process.
pub fn find_many(meta: &ModelMeta, args: &FindMany) -> Statement {
    let mut writer = Writer::default();
    let columns = format!("row_to_json(\"m\")::text AS {DATA_COLUMN}");
    let sql = writer.window(meta, args, &columns, args.distinct.is_empty());
    writer.finish(sql)
}

/// Inserts fully resolved rows (every column present).
pub fn insert(meta: &ModelMeta, rows: &[Record], skip_duplicates: bool) -> Statement {
    let mut writer = Writer::default();
    let columns: Vec<String> = meta.fields.iter().map(|f| quote(f.name)).collect();
    let values: Vec<String> = rows
        .iter()
        .map(|row| {
            let bound: Vec<String> = meta
                .fields
                .iter()
                .map(|f| writer.bind(row.value(f.name).clone()))
                .collect();
            format!("({})", bound.join(", "))
        })
        .collect();
    let conflict = if skip_duplicates { " ON CONFLICT DO NOTHING" } else { "" };
    let inner = format!(
        "INSERT INTO {} ({}) VALUES {}{conflict} RETURNING *",
        quote(meta.table),
        columns.join(", "),
        values.join(", ")
    );
    writer.finish(wrap_returning(&inner))
}

pub fn update(meta: &ModelMeta, filter: &Filter, data: &Data) -> Statement {
    let mut writer = Writer::default();
    let mut assignments: Vec<String> = data
        .iter()
        .map(|(field, op)| {
            let target = quote(field);
            let current = column("m", field);
            match op {
                FieldOp::Set(value) => format!("{target} = {}", writer.bind(value.clone())),
                FieldOp::Increment(n) => format!("{target} = {current} + {}", writer.bind(Value::Int(*n))),
                FieldOp::Decrement(n) => format!("{target} = {current} - {}", writer.bind(Value::Int(*n))),
                FieldOp::Multiply(n) => format!("{target} = {current} * {}", writer.bind(Value::Int(*n))),
            }
        })
        .collect();
    if assignments.is_empty() {
        let pk = meta.primary_key().name;
        assignments.push(format!("{} = {}", quote(pk), column("m", pk)));
    }
    let condition = writer.filter(meta, "m", filter);
    let inner = format!(
        "UPDATE {} AS \"m\" SET {} WHERE {condition} RETURNING \"m\".*",
        quote(meta.table),
        assignments.join(", ")
    );
    writer.finish(wrap_returning(&inner))
}

pub fn delete(meta: &ModelMeta, filter: &Filter) -> Statement {
    let mut writer = Writer::default();
    let condition = writer.filter(meta, "m", filter);
    let inner = format!(
        "DELETE FROM {} AS \"m\" WHERE {condition} RETURNING \"m\".*",
        quote(meta.table)
    );
    writer.finish(wrap_returning(&inner))
}

/// `{"count": n}` over the count window.
pub fn count(meta: &ModelMeta, args: &CountArgs) -> Statement {
    let mut writer = Writer::default();
    let window = writer.window(meta, &args.to_find_many(), "\"m\".*", true);
    let sql = format!(
        "SELECT json_build_object('count', COUNT(*))::text AS {DATA_COLUMN} FROM ({window}) AS \"w\""
    );
    writer.finish(sql)
}

pub fn aggregate(meta: &ModelMeta, args: &AggregateArgs) -> Statement {
    let mut writer = Writer::default();
    let window = writer.window(meta, &args.to_find_many(), "\"m\".*", true);
    let pairs: Vec<String> = args
        .select
        .entries()
        .into_iter()
        .map(|(func, field)| {
            format!(
                "'{}', {}",
                result_key(func, field),
                Writer::aggregate_expr(meta, "w", func, field)
            )
        })
        .collect();
    let sql = format!(
        "SELECT json_build_object({})::text AS {DATA_COLUMN} FROM ({window}) AS \"w\"",
        pairs.join(", ")
    );
    writer.finish(sql)
}

pub fn group_by(meta: &ModelMeta, args: &GroupByArgs) -> Statement {
    let mut writer = Writer::default();
    let mut pairs: Vec<String> = args
        .by
        .iter()
        .map(|f| format!("'{f}', {}", column("m", f)))
        .collect();
    pairs.extend(args.select.entries().into_iter().map(|(func, field)| {
        format!(
            "'{}', {}",
            result_key(func, field),
            Writer::aggregate_expr(meta, "m", func, field)
        )
    }));
    let condition = writer.filter(meta, "m", &args.filter);
    let grouped: Vec<String> = args.by.iter().map(|f| column("m", f)).collect();

    let mut sql = format!(
        "SELECT json_build_object({})::text AS {DATA_COLUMN} FROM {} AS \"m\" WHERE {condition} GROUP BY {}",
        pairs.join(", "),
        quote(meta.table),
        grouped.join(", ")
    );
    if let Some(having) = &args.having {
        let rendered = writer.having(meta, having);
        sql.push_str(&format!(" HAVING {rendered}"));
    }

    let orders: Vec<String> = args
        .effective_order()
        .iter()
        .map(|order| match order {
            GroupOrder::Field(o) => order_suffix(
                &collated(&column("m", &o.field), kind_of(meta, &o.field)),
                o.order,
                o.effective_nulls(),
            ),
            GroupOrder::Aggregate { func, field, order: direction } => order_suffix(
                &Writer::aggregate_expr(meta, "m", *func, field.as_deref()),
                *direction,
                order.nulls(),
            ),
        })
        .collect();
    sql.push_str(&format!(" ORDER BY {}", orders.join(", ")));

    if let Some(take) = args.take {
        sql.push_str(&format!(" LIMIT {take}"));
    }
    if let Some(skip) = args.skip.filter(|s| *s > 0) {
        sql.push_str(&format!(" OFFSET {skip}"));
    }
    writer.finish(sql)
}

/// Wraps a caller-supplied query so its rows come back as JSON objects.
pub fn raw_query(sql: &str, params: Vec<Value>) -> Statement {
    let trimmed = sql.trim().trim_end_matches(';');
    Statement {
        sql: format!("SELECT row_to_json(\"r\")::text AS {DATA_COLUMN} FROM ({trimmed}) AS \"r\""),
        params,
    }
}
