//! PostgreSQL engine: statements from `query::builder`, executed with
//! diesel on an r2d2 pool.

use super::{Engine, TransactionBody};
use crate::db::DbPool;
use crate::db::error::RepositoryError;
use crate::error::{ClientError, ClientResult};
use crate::query::builder::{self, Statement};
use crate::query::{
    AggregateArgs, AggregateResult, CountArgs, Data, Filter, FindMany, GroupByArgs, GroupRow,
    Record, Value, eval,
};
use crate::schema::ModelMeta;
use bounty_store_api::TransactionIsolationLevel;
use diesel::pg::Pg;
use diesel::prelude::*;
use diesel::query_builder::{BoxedSqlQuery, SqlQuery};
use diesel::sql_types::{BigInt, Bool, Double, Jsonb, Nullable, Text, Timestamptz};
use serde_json::Value as Json;
use std::sync::Mutex;

/// Every generated statement returns its rows in this single column.
#[derive(QueryableByName)]
struct JsonRow {
    #[diesel(sql_type = Text)]
    data: String,
}

type BoundQuery = BoxedSqlQuery<'static, Pg, SqlQuery>;

fn bind(query: BoundQuery, value: Value) -> BoundQuery {
    match value {
        Value::Null => query.bind::<Nullable<Text>, _>(None::<String>),
        Value::Bool(b) => query.bind::<Bool, _>(b),
        Value::Int(i) => query.bind::<BigInt, _>(i),
        Value::Float(f) => query.bind::<Double, _>(f),
        Value::String(s) => query.bind::<Text, _>(s),
        Value::DateTime(dt) => query.bind::<Timestamptz, _>(dt),
        Value::Json(json) => query.bind::<Jsonb, _>(json),
        other @ (Value::List(_) | Value::Record(_)) => query.bind::<Jsonb, _>(other.to_json()),
    }
}

fn prepare(statement: Statement) -> BoundQuery {
    tracing::debug!(sql = %statement.sql, params = statement.params.len(), "executing statement");
    statement
        .params
        .into_iter()
        .fold(diesel::sql_query(statement.sql).into_boxed::<Pg>(), bind)
}

fn load_json(conn: &mut PgConnection, statement: Statement) -> Result<Vec<Json>, RepositoryError> {
    let rows: Vec<JsonRow> = prepare(statement).load(conn)?;
    rows.iter()
        .map(|row| serde_json::from_str(&row.data).map_err(RepositoryError::from))
        .collect()
}

fn load_records(
    conn: &mut PgConnection,
    meta: &ModelMeta,
    statement: Statement,
) -> ClientResult<Vec<Record>> {
    let rows = load_json(conn, statement)?;
    rows.iter()
        .map(|json| Record::from_json(meta, json).map_err(|e| RepositoryError::from(e).into()))
        .collect()
}

fn single_row(mut rows: Vec<Json>, what: &str) -> ClientResult<Json> {
    rows.pop()
        .ok_or_else(|| ClientError::database(format!("{what} returned no row")))
}

// ============================================
// OPERATIONS (shared by the pool and the transaction engines)
// ============================================

fn find_many(conn: &mut PgConnection, meta: &ModelMeta, args: &FindMany) -> ClientResult<Vec<Record>> {
    let rows = load_records(conn, meta, builder::find_many(meta, args))?;
    if args.distinct.is_empty() {
        // LIMIT/OFFSET ran in SQL, only the reversal of a negative take is left
        let mut rows = rows;
        if args.take.is_some_and(|t| t < 0) {
            rows.reverse();
        }
        Ok(rows)
    } else {
        Ok(eval::finish_window(rows, args))
    }
}

fn create_many(
    conn: &mut PgConnection,
    meta: &ModelMeta,
    rows: &[Record],
    skip_duplicates: bool,
) -> ClientResult<Vec<Record>> {
    if rows.is_empty() {
        return Ok(Vec::new());
    }
    load_records(conn, meta, builder::insert(meta, rows, skip_duplicates))
}

fn update_many(
    conn: &mut PgConnection,
    meta: &ModelMeta,
    filter: &Filter,
    data: &Data,
) -> ClientResult<Vec<Record>> {
    load_records(conn, meta, builder::update(meta, filter, data))
}

fn delete_many(conn: &mut PgConnection, meta: &ModelMeta, filter: &Filter) -> ClientResult<Vec<Record>> {
    load_records(conn, meta, builder::delete(meta, filter))
}

fn count(conn: &mut PgConnection, meta: &ModelMeta, args: &CountArgs) -> ClientResult<u64> {
    let row = single_row(load_json(conn, builder::count(meta, args))?, "count")?;
    row.get("count")
        .and_then(Json::as_u64)
        .ok_or_else(|| ClientError::database(format!("unexpected count row: {row}")))
}

fn aggregate(conn: &mut PgConnection, meta: &ModelMeta, args: &AggregateArgs) -> ClientResult<AggregateResult> {
    let row = single_row(load_json(conn, builder::aggregate(meta, args))?, "aggregate")?;
    AggregateResult::from_json(meta, &args.select, &row).map_err(|e| RepositoryError::from(e).into())
}

fn group_by(conn: &mut PgConnection, meta: &ModelMeta, args: &GroupByArgs) -> ClientResult<Vec<GroupRow>> {
    let rows = load_json(conn, builder::group_by(meta, args))?;
    rows.iter()
        .map(|row| GroupRow::from_json(meta, args, row).map_err(|e| RepositoryError::from(e).into()))
        .collect()
}

fn query_raw(conn: &mut PgConnection, sql: &str, params: Vec<Value>) -> ClientResult<Vec<Json>> {
    load_json(conn, builder::raw_query(sql, params)).map_err(raw_error)
}

fn execute_raw(conn: &mut PgConnection, sql: &str, params: Vec<Value>) -> ClientResult<usize> {
    let statement = Statement {
        sql: sql.to_string(),
        params,
    };
    prepare(statement)
        .execute(conn)
        .map_err(|e| raw_error(RepositoryError::from(e)))
}

/// Constraint violations keep their own codes, everything else is a raw
/// query failure.
fn raw_error(err: RepositoryError) -> ClientError {
    match err {
        RepositoryError::UniqueViolation(_)
        | RepositoryError::ForeignKeyViolation(_)
        | RepositoryError::PoolError(_) => err.into(),
        other => ClientError::raw_query(other.to_string()),
    }
}

macro_rules! connection_ops {
    () => {
        fn find_many(&self, meta: &'static ModelMeta, args: &FindMany) -> ClientResult<Vec<Record>> {
            self.with_conn(|conn| find_many(conn, meta, args))
        }

        fn create_many(
            &self,
            meta: &'static ModelMeta,
            rows: Vec<Record>,
            skip_duplicates: bool,
        ) -> ClientResult<Vec<Record>> {
            self.with_conn(|conn| create_many(conn, meta, &rows, skip_duplicates))
        }

        fn update_many(
            &self,
            meta: &'static ModelMeta,
            filter: &Filter,
            data: &Data,
        ) -> ClientResult<Vec<Record>> {
            self.with_conn(|conn| update_many(conn, meta, filter, data))
        }

        fn delete_many(&self, meta: &'static ModelMeta, filter: &Filter) -> ClientResult<Vec<Record>> {
            self.with_conn(|conn| delete_many(conn, meta, filter))
        }

        fn count(&self, meta: &'static ModelMeta, args: &CountArgs) -> ClientResult<u64> {
            self.with_conn(|conn| count(conn, meta, args))
        }

        fn aggregate(&self, meta: &'static ModelMeta, args: &AggregateArgs) -> ClientResult<AggregateResult> {
            self.with_conn(|conn| aggregate(conn, meta, args))
        }

        fn group_by(&self, meta: &'static ModelMeta, args: &GroupByArgs) -> ClientResult<Vec<GroupRow>> {
            self.with_conn(|conn| group_by(conn, meta, args))
        }

        fn query_raw(&self, sql: &str, params: Vec<Value>) -> ClientResult<Vec<Json>> {
            self.with_conn(|conn| query_raw(conn, sql, params))
        }

        fn execute_raw(&self, sql: &str, params: Vec<Value>) -> ClientResult<usize> {
            self.with_conn(|conn| execute_raw(conn, sql, params))
        }
    };
}

// ============================================
// POOL ENGINE
// ============================================

/// Checks a pooled connection out for every call.
#[derive(Clone)]
pub struct PgEngine {
    pool: DbPool,
}

impl PgEngine {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut PgConnection) -> ClientResult<T>) -> ClientResult<T> {
        let mut conn = self.pool.get().map_err(RepositoryError::from)?;
        f(&mut conn)
    }
}

impl Engine for PgEngine {
    connection_ops!();

    fn transaction(
        &self,
        isolation: Option<TransactionIsolationLevel>,
        body: &mut TransactionBody<'_>,
    ) -> ClientResult<()> {
        self.with_conn(|conn| {
            let mut builder = conn.build_transaction();
            builder = match isolation {
                Some(TransactionIsolationLevel::Serializable) => builder.serializable(),
                Some(TransactionIsolationLevel::RepeatableRead) => builder.repeatable_read(),
                // PostgreSQL runs READ UNCOMMITTED as READ COMMITTED
                Some(
                    TransactionIsolationLevel::ReadCommitted
                    | TransactionIsolationLevel::ReadUncommitted,
                ) => builder.read_committed(),
                None => builder,
            };
            tracing::debug!(?isolation, "BEGIN");
            let outcome = builder.run(|tx_conn| body(&TxEngine::new(tx_conn)));
            match &outcome {
                Ok(()) => tracing::debug!("COMMIT"),
                Err(e) => tracing::debug!(error = %e, "ROLLBACK"),
            }
            outcome
        })
    }
}

// ============================================
// TRANSACTION ENGINE
// ============================================

/// Engine bound to the connection of an open transaction.
struct TxEngine<'c> {
    conn: Mutex<&'c mut PgConnection>,
}

impl<'c> TxEngine<'c> {
    fn new(conn: &'c mut PgConnection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&mut PgConnection) -> ClientResult<T>) -> ClientResult<T> {
        let mut guard = self
            .conn
            .lock()
            .map_err(|_| ClientError::transaction("transaction connection lock poisoned"))?;
        f(&mut guard)
    }
}

impl Engine for TxEngine<'_> {
    connection_ops!();

    fn transaction(
        &self,
        _isolation: Option<TransactionIsolationLevel>,
        body: &mut TransactionBody<'_>,
    ) -> ClientResult<()> {
        body(self)
    }
}
