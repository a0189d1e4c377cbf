//! Storage engines executing validated queries.
//!
//! The client validates every argument before calling an engine, so
//! engines can assume known fields, coerced values and complete create
//! rows.

mod memory;
mod postgres;

pub use memory::MemoryEngine;
pub use postgres::PgEngine;

use crate::error::ClientResult;
use crate::query::{
    AggregateArgs, AggregateResult, CountArgs, Data, Filter, FindMany, GroupByArgs, GroupRow,
    Record, Value,
};
use crate::schema::ModelMeta;
use bounty_store_api::TransactionIsolationLevel;
use serde_json::Value as Json;

/// Body of an interactive transaction. It receives an engine bound to the
/// open transaction; returning an error rolls everything back.
pub type TransactionBody<'a> = dyn FnMut(&dyn Engine) -> ClientResult<()> + 'a;

pub trait Engine: Send + Sync {
    /// Rows in walked order, windowed by cursor / skip / take / distinct.
    fn find_many(&self, meta: &'static ModelMeta, args: &FindMany) -> ClientResult<Vec<Record>>;

    /// Inserts one complete row and returns it as stored.
    fn create(&self, meta: &'static ModelMeta, row: Record) -> ClientResult<Record> {
        self.create_many(meta, vec![row], false)?
            .pop()
            .ok_or_else(|| crate::error::ClientError::database("insert returned no row"))
    }

    /// Inserts complete rows. With `skip_duplicates`, rows hitting a
    /// unique constraint are left out of the result instead of failing.
    fn create_many(
        &self,
        meta: &'static ModelMeta,
        rows: Vec<Record>,
        skip_duplicates: bool,
    ) -> ClientResult<Vec<Record>>;

    /// Applies `data` to every matching row and returns the updated rows.
    fn update_many(
        &self,
        meta: &'static ModelMeta,
        filter: &Filter,
        data: &Data,
    ) -> ClientResult<Vec<Record>>;

    /// Deletes every matching row (following referential actions) and
    /// returns the deleted rows.
    fn delete_many(&self, meta: &'static ModelMeta, filter: &Filter) -> ClientResult<Vec<Record>>;

    fn count(&self, meta: &'static ModelMeta, args: &CountArgs) -> ClientResult<u64>;

    fn aggregate(&self, meta: &'static ModelMeta, args: &AggregateArgs) -> ClientResult<AggregateResult>;

    fn group_by(&self, meta: &'static ModelMeta, args: &GroupByArgs) -> ClientResult<Vec<GroupRow>>;

    /// Runs a caller-written query; each row comes back as a JSON object.
    fn query_raw(&self, sql: &str, params: Vec<Value>) -> ClientResult<Vec<Json>>;

    /// Runs a caller-written statement and returns the affected row count.
    fn execute_raw(&self, sql: &str, params: Vec<Value>) -> ClientResult<usize>;

    /// Runs `body` inside a transaction. Calling this on an engine that is
    /// already inside a transaction reuses it.
    fn transaction(
        &self,
        isolation: Option<TransactionIsolationLevel>,
        body: &mut TransactionBody<'_>,
    ) -> ClientResult<()>;
}
