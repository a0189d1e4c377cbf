//! In-process engine. Same query semantics as PostgreSQL, including
//! unique constraints, foreign keys and referential actions.

use super::{Engine, TransactionBody};
use crate::error::{ClientError, ClientResult};
use crate::query::aggregate;
use crate::query::eval::{self, RelationSource};
use crate::query::{
    AggregateArgs, AggregateResult, CountArgs, Data, Filter, FindMany, GroupByArgs, GroupRow,
    Record, Value,
};
use crate::schema::{self, ModelMeta, OnDelete, RelationMeta};
use bounty_store_api::TransactionIsolationLevel;
use serde_json::Value as Json;
use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError, RwLock};
use std::thread::{self, ThreadId};

fn poisoned<T>(_: PoisonError<T>) -> ClientError {
    ClientError::transaction("memory store lock poisoned")
}

fn unique_error(meta: &ModelMeta, field: &str) -> ClientError {
    ClientError::unique(format!(
        "Unique constraint failed on {} ({field})",
        meta.table
    ))
}

#[derive(Debug, Clone, Default)]
struct Store {
    tables: BTreeMap<&'static str, Vec<Record>>,
}

impl RelationSource for Store {
    fn related(&self, relation: &RelationMeta, record: &Record) -> Vec<Record> {
        let Some(target) = relation.target_meta() else {
            return Vec::new();
        };
        let key = record.value(relation.local_field);
        if key.is_null() {
            return Vec::new();
        }
        self.rows(target)
            .iter()
            .filter(|r| r.value(relation.foreign_field) == key)
            .cloned()
            .collect()
    }
}

impl Store {
    fn rows(&self, meta: &ModelMeta) -> &[Record] {
        self.tables.get(meta.table).map_or(&[], Vec::as_slice)
    }

    fn rows_mut(&mut self, meta: &'static ModelMeta) -> &mut Vec<Record> {
        self.tables.entry(meta.table).or_default()
    }

    fn matching(&self, meta: &ModelMeta, filter: &Filter) -> Vec<usize> {
        self.rows(meta)
            .iter()
            .enumerate()
            .filter(|(_, r)| eval::matches(meta, filter, r, self))
            .map(|(i, _)| i)
            .collect()
    }

    /// Removes rows by ascending index.
    fn remove(&mut self, meta: &'static ModelMeta, indices: &[usize]) -> Vec<Record> {
        let rows = self.rows_mut(meta);
        let mut removed: Vec<Record> = indices.iter().rev().map(|&i| rows.remove(i)).collect();
        removed.reverse();
        removed
    }

    // ---------- constraints ----------

    /// First unique field of `row` already used by another row.
    fn unique_conflict(&self, meta: &ModelMeta, row: &Record, skip: Option<usize>) -> Option<&'static str> {
        meta.unique_fields()
            .find(|field| {
                let value = row.value(field.name);
                !value.is_null()
                    && self
                        .rows(meta)
                        .iter()
                        .enumerate()
                        .any(|(i, other)| Some(i) != skip && other.value(field.name) == value)
            })
            .map(|field| field.name)
    }

    fn check_references(&self, meta: &ModelMeta, row: &Record) -> ClientResult<()> {
        for relation in meta.relations.iter().filter(|r| r.is_owning()) {
            let value = row.value(relation.local_field);
            let Some(target) = relation.target_meta() else {
                continue;
            };
            if value.is_null() {
                continue;
            }
            if !self
                .rows(target)
                .iter()
                .any(|r| r.value(relation.foreign_field) == value)
            {
                return Err(ClientError::foreign_key(format!(
                    "{}.{} = {value} references a missing {}",
                    meta.table, relation.local_field, target.name
                )));
            }
        }
        Ok(())
    }

    // ---------- writes ----------

    fn insert(&mut self, meta: &'static ModelMeta, rows: Vec<Record>, skip_duplicates: bool) -> ClientResult<Vec<Record>> {
        let mut inserted = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(field) = self.unique_conflict(meta, &row, None) {
                if skip_duplicates {
                    tracing::debug!(model = meta.name, field, "skipping duplicate row");
                    continue;
                }
                return Err(unique_error(meta, field));
            }
            self.check_references(meta, &row)?;
            self.rows_mut(meta).push(row.clone());
            inserted.push(row);
        }
        Ok(inserted)
    }

    fn update(&mut self, meta: &'static ModelMeta, filter: &Filter, data: &Data) -> ClientResult<Vec<Record>> {
        let targets = self.matching(meta, filter);
        let mut updated = Vec::with_capacity(targets.len());
        for index in targets {
            let before = self.rows(meta)[index].clone();
            let mut after = before.clone();
            for (name, op) in data.iter() {
                let field = meta
                    .field(name)
                    .ok_or_else(|| ClientError::validation(format!("Unknown field {}.{name}", meta.name)))?;
                let value = op
                    .apply(field, before.value(name))
                    .map_err(|e| ClientError::database(e.0))?;
                after.insert(name.clone(), value);
            }
            if let Some(field) = self.unique_conflict(meta, &after, Some(index)) {
                return Err(unique_error(meta, field));
            }
            self.check_references(meta, &after)?;
            self.rows_mut(meta)[index] = after.clone();
            self.cascade_key_change(meta, &before, &after);
            updated.push(after);
        }
        Ok(updated)
    }

    /// ON UPDATE CASCADE: referencing rows follow a changed key.
    fn cascade_key_change(&mut self, meta: &ModelMeta, before: &Record, after: &Record) {
        for (owner, relation) in schema::inverse_relations(meta.name) {
            let old = before.value(relation.foreign_field);
            let new = after.value(relation.foreign_field);
            if old == new || old.is_null() {
                continue;
            }
            for row in self.rows_mut(owner) {
                if row.value(relation.local_field) == old {
                    row.insert(relation.local_field, new.clone());
                }
            }
        }
    }

    fn delete(&mut self, meta: &'static ModelMeta, filter: &Filter) -> ClientResult<Vec<Record>> {
        let targets = self.matching(meta, filter);
        let deleted = self.remove(meta, &targets);

        let mut pending: Vec<(&'static ModelMeta, Record)> =
            deleted.iter().map(|r| (meta, r.clone())).collect();
        let mut removed = pending.clone();
        while let Some((model, row)) = pending.pop() {
            for (owner, relation) in schema::inverse_relations(model.name) {
                let key = row.value(relation.foreign_field);
                if key.is_null() {
                    continue;
                }
                match relation.on_delete {
                    Some(OnDelete::Cascade) => {
                        let children: Vec<usize> = self
                            .rows(owner)
                            .iter()
                            .enumerate()
                            .filter(|(_, r)| r.value(relation.local_field) == key)
                            .map(|(i, _)| i)
                            .collect();
                        for child in self.remove(owner, &children) {
                            pending.push((owner, child.clone()));
                            removed.push((owner, child));
                        }
                    }
                    Some(OnDelete::SetNull) => {
                        for r in self.rows_mut(owner) {
                            if r.value(relation.local_field) == key {
                                r.insert(relation.local_field, Value::Null);
                            }
                        }
                    }
                    Some(OnDelete::Restrict) | None => {}
                }
            }
        }

        // Restrict is checked once every cascade has run
        for (model, row) in &removed {
            for (owner, relation) in schema::inverse_relations(model.name) {
                if relation.on_delete != Some(OnDelete::Restrict) {
                    continue;
                }
                let key = row.value(relation.foreign_field);
                if !key.is_null()
                    && self
                        .rows(owner)
                        .iter()
                        .any(|r| r.value(relation.local_field) == key)
                {
                    return Err(ClientError::foreign_key(format!(
                        "{} {key} is still referenced by {}.{}",
                        model.name, owner.table, relation.local_field
                    )));
                }
            }
        }
        Ok(deleted)
    }

    // ---------- reads ----------

    fn find_many(&self, meta: &ModelMeta, args: &FindMany) -> Vec<Record> {
        eval::read(meta, self.rows(meta), args, self)
    }

    fn count(&self, meta: &ModelMeta, args: &CountArgs) -> u64 {
        let rows = self.find_many(meta, &args.to_find_many());
        u64::try_from(rows.len()).unwrap_or(u64::MAX)
    }

    fn aggregate(&self, meta: &ModelMeta, args: &AggregateArgs) -> ClientResult<AggregateResult> {
        let rows = self.find_many(meta, &args.to_find_many());
        let refs: Vec<&Record> = rows.iter().collect();
        aggregate::compute(&refs, &args.select).map_err(|e| ClientError::database(e.0))
    }

    fn group_by(&self, meta: &ModelMeta, args: &GroupByArgs) -> ClientResult<Vec<GroupRow>> {
        let filtered: Vec<&Record> = self
            .rows(meta)
            .iter()
            .filter(|r| eval::matches(meta, &args.filter, r, self))
            .collect();
        aggregate::group(&filtered, args).map_err(|e| ClientError::database(e.0))
    }
}

fn raw_unsupported() -> ClientError {
    ClientError::unsupported("raw SQL needs the PostgreSQL engine")
}

macro_rules! store_ops {
    () => {
        fn find_many(&self, meta: &'static ModelMeta, args: &FindMany) -> ClientResult<Vec<Record>> {
            self.read(|store| Ok(store.find_many(meta, args)))
        }

        fn create_many(
            &self,
            meta: &'static ModelMeta,
            rows: Vec<Record>,
            skip_duplicates: bool,
        ) -> ClientResult<Vec<Record>> {
            self.write(|store| store.insert(meta, rows, skip_duplicates))
        }

        fn update_many(
            &self,
            meta: &'static ModelMeta,
            filter: &Filter,
            data: &Data,
        ) -> ClientResult<Vec<Record>> {
            self.write(|store| store.update(meta, filter, data))
        }

        fn delete_many(&self, meta: &'static ModelMeta, filter: &Filter) -> ClientResult<Vec<Record>> {
            self.write(|store| store.delete(meta, filter))
        }

        fn count(&self, meta: &'static ModelMeta, args: &CountArgs) -> ClientResult<u64> {
            self.read(|store| Ok(store.count(meta, args)))
        }

        fn aggregate(&self, meta: &'static ModelMeta, args: &AggregateArgs) -> ClientResult<AggregateResult> {
            self.read(|store| store.aggregate(meta, args))
        }

        fn group_by(&self, meta: &'static ModelMeta, args: &GroupByArgs) -> ClientResult<Vec<GroupRow>> {
            self.read(|store| store.group_by(meta, args))
        }

        fn query_raw(&self, _sql: &str, _params: Vec<Value>) -> ClientResult<Vec<Json>> {
            Err(raw_unsupported())
        }

        fn execute_raw(&self, _sql: &str, _params: Vec<Value>) -> ClientResult<usize> {
            Err(raw_unsupported())
        }
    };
}

// ============================================
// ENGINE
// ============================================

/// Tables kept in process behind a single lock.
///
/// Every write works on a copy of the store and only replaces it when the
/// whole statement succeeded. A transaction holds the write lock until it
/// commits or rolls back, so transactions are serializable. Going through
/// the engine itself from inside a transaction body fails with a
/// transaction error instead of waiting on its own lock.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    store: RwLock<Store>,
    /// Thread running the open transaction, if any.
    tx_owner: Mutex<Option<ThreadId>>,
}

/// Marks the current thread as the transaction owner until dropped.
struct TxOwner<'a>(&'a Mutex<Option<ThreadId>>);

impl<'a> TxOwner<'a> {
    fn claim(slot: &'a Mutex<Option<ThreadId>>) -> ClientResult<Self> {
        *slot.lock().map_err(poisoned)? = Some(thread::current().id());
        Ok(Self(slot))
    }
}

impl Drop for TxOwner<'_> {
    fn drop(&mut self) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of rows currently stored for `meta`.
    pub fn row_count(&self, meta: &ModelMeta) -> usize {
        self.read(|store| Ok(store.rows(meta).len())).unwrap_or(0)
    }

    fn check_not_in_transaction(&self) -> ClientResult<()> {
        let owner = self.tx_owner.lock().map_err(poisoned)?;
        if *owner == Some(thread::current().id()) {
            return Err(ClientError::transaction(
                "query issued outside the open transaction; use the transaction client",
            ));
        }
        Ok(())
    }

    fn read<T>(&self, f: impl FnOnce(&Store) -> ClientResult<T>) -> ClientResult<T> {
        self.check_not_in_transaction()?;
        let store = self.store.read().map_err(poisoned)?;
        f(&store)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Store) -> ClientResult<T>) -> ClientResult<T> {
        self.check_not_in_transaction()?;
        let mut store = self.store.write().map_err(poisoned)?;
        let mut draft = store.clone();
        let out = f(&mut draft)?;
        *store = draft;
        Ok(out)
    }
}

impl Engine for MemoryEngine {
    store_ops!();

    fn transaction(
        &self,
        isolation: Option<TransactionIsolationLevel>,
        body: &mut TransactionBody<'_>,
    ) -> ClientResult<()> {
        self.check_not_in_transaction()?;
        let mut store = self.store.write().map_err(poisoned)?;
        // released before the store lock
        let _owner = TxOwner::claim(&self.tx_owner)?;
        tracing::debug!(?isolation, "BEGIN (memory)");
        let tx = MemoryTx {
            draft: Mutex::new(store.clone()),
        };
        match body(&tx) {
            Ok(()) => {
                *store = tx.draft.into_inner().map_err(poisoned)?;
                tracing::debug!("COMMIT (memory)");
                Ok(())
            }
            Err(e) => {
                tracing::debug!(error = %e, "ROLLBACK (memory)");
                Err(e)
            }
        }
    }
}

/// Engine handed to a transaction body: works on a private draft.
struct MemoryTx {
    draft: Mutex<Store>,
}

impl MemoryTx {
    fn read<T>(&self, f: impl FnOnce(&Store) -> ClientResult<T>) -> ClientResult<T> {
        let store = self.draft.lock().map_err(poisoned)?;
        f(&store)
    }

    fn write<T>(&self, f: impl FnOnce(&mut Store) -> ClientResult<T>) -> ClientResult<T> {
        let mut store = self.draft.lock().map_err(poisoned)?;
        let mut draft = store.clone();
        let out = f(&mut draft)?;
        *store = draft;
        Ok(out)
    }
}

impl Engine for MemoryTx {
    store_ops!();

    fn transaction(
        &self,
        _isolation: Option<TransactionIsolationLevel>,
        body: &mut TransactionBody<'_>,
    ) -> ClientResult<()> {
        body(self)
    }
}
