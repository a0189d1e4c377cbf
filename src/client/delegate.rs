use super::projection;
use crate::engine::Engine;
use crate::error::{ClientError, ClientResult};
use crate::query::{
    AggregateArgs, AggregateResult, CountArgs, Data, Filter, FindMany, GroupByArgs, GroupRow,
    Projection, Record, UniqueWhere, validate,
};
use crate::schema::{Model, ModelMeta};
use bounty_store_api::BatchPayload;
use chrono::{DateTime, SubsecRound, Utc};
use std::marker::PhantomData;

/// Timestamps are kept at the database's microsecond precision.
fn now() -> DateTime<Utc> {
    Utc::now().trunc_subsecs(6)
}

/// Per-model entry point of the client.
pub struct Delegate<'a, M: Model> {
    engine: &'a dyn Engine,
    _model: PhantomData<fn() -> M>,
}

impl<'a, M: Model> Delegate<'a, M> {
    pub(crate) fn new(engine: &'a dyn Engine) -> Self {
        Self {
            engine,
            _model: PhantomData,
        }
    }

    fn meta() -> &'static ModelMeta {
        M::meta()
    }

    fn decode(record: Record) -> ClientResult<M> {
        record.into_model().map_err(|e| {
            ClientError::database(format!("cannot decode a {} row: {e}", Self::meta().name))
        })
    }

    fn decode_all(records: Vec<Record>) -> ClientResult<Vec<M>> {
        records.into_iter().map(Self::decode).collect()
    }

    fn not_found(action: &str) -> ClientError {
        ClientError::not_found(format!("No {} found{action}", Self::meta().name))
    }

    // ============================================
    // READS
    // ============================================

    pub fn find_unique(&self, unique: UniqueWhere) -> ClientResult<Option<M>> {
        let meta = Self::meta();
        let unique = validate::unique_where(meta, unique)?;
        tracing::debug!(model = meta.name, field = %unique.field, "find_unique");

        let rows = self
            .engine
            .find_many(meta, &FindMany::filtered(unique.to_filter()).take(1))?;
        rows.into_iter().next().map(Self::decode).transpose()
    }

    pub fn find_unique_or_throw(&self, unique: UniqueWhere) -> ClientResult<M> {
        self.find_unique(unique)?
            .ok_or_else(|| Self::not_found(""))
    }

    /// First row of the window; a negative `take` picks the last one.
    pub fn find_first(&self, args: FindMany) -> ClientResult<Option<M>> {
        let take = if args.take.is_some_and(|t| t < 0) { -1 } else { 1 };
        let rows = self.read(args.take(take))?;
        rows.into_iter().next().map(Self::decode).transpose()
    }

    pub fn find_first_or_throw(&self, args: FindMany) -> ClientResult<M> {
        self.find_first(args)?.ok_or_else(|| Self::not_found(""))
    }

    pub fn find_many(&self, args: FindMany) -> ClientResult<Vec<M>> {
        Self::decode_all(self.read(args)?)
    }

    /// Like `find_many`, shaped by select / omit / include / `_count`.
    /// Results are records since the shape no longer matches the model.
    pub fn find_many_projected(&self, args: FindMany, projection: Projection) -> ClientResult<Vec<Record>> {
        let meta = Self::meta();
        let projection = validate::projection(meta, projection)?;
        let rows = self.read(args)?;
        projection::apply(self.engine, meta, rows, &projection)
    }

    fn read(&self, args: FindMany) -> ClientResult<Vec<Record>> {
        let meta = Self::meta();
        let args = validate::find_many(meta, args)?;
        tracing::debug!(model = meta.name, take = ?args.take, skip = ?args.skip, "find_many");
        self.engine.find_many(meta, &args)
    }

    // ============================================
    // CREATE
    // ============================================

    pub fn create(&self, data: M::Create) -> ClientResult<M> {
        self.create_with(Data::from_serializable(Self::meta(), &data)?)
    }

    /// Create from an untyped payload.
    pub fn create_with(&self, data: Data) -> ClientResult<M> {
        let meta = Self::meta();
        let row = validate::create_record(meta, data, now())?;
        tracing::debug!(model = meta.name, "create");
        Self::decode(self.engine.create(meta, row)?)
    }

    pub fn create_many(&self, data: Vec<M::Create>, skip_duplicates: bool) -> ClientResult<BatchPayload> {
        let inserted = self.insert_many(&data, skip_duplicates)?;
        Ok(BatchPayload::from(inserted.len()))
    }

    pub fn create_many_and_return(&self, data: Vec<M::Create>, skip_duplicates: bool) -> ClientResult<Vec<M>> {
        Self::decode_all(self.insert_many(&data, skip_duplicates)?)
    }

    fn insert_many(&self, data: &[M::Create], skip_duplicates: bool) -> ClientResult<Vec<Record>> {
        let meta = Self::meta();
        let now = now();
        let rows = data
            .iter()
            .map(|payload| {
                let data = Data::from_serializable(meta, payload)?;
                validate::create_record(meta, data, now)
            })
            .collect::<ClientResult<Vec<_>>>()?;
        tracing::debug!(model = meta.name, rows = rows.len(), skip_duplicates, "create_many");
        self.engine.create_many(meta, rows, skip_duplicates)
    }

    // ============================================
    // UPDATE
    // ============================================

    pub fn update(&self, unique: UniqueWhere, data: M::Update) -> ClientResult<M> {
        self.update_with(unique, Data::from_serializable(Self::meta(), &data)?)
    }

    /// Update from an untyped payload (supports increment / decrement / multiply).
    pub fn update_with(&self, unique: UniqueWhere, data: Data) -> ClientResult<M> {
        let meta = Self::meta();
        let unique = validate::unique_where(meta, unique)?;
        let data = validate::update_data(meta, data, now())?;
        tracing::debug!(model = meta.name, field = %unique.field, "update");

        let mut rows = self.engine.update_many(meta, &unique.to_filter(), &data)?;
        match rows.pop() {
            Some(row) => Self::decode(row),
            None => Err(Self::not_found(" to update")),
        }
    }

    pub fn update_many(&self, filter: Filter, data: M::Update) -> ClientResult<BatchPayload> {
        self.update_many_with(filter, Data::from_serializable(Self::meta(), &data)?)
    }

    pub fn update_many_with(&self, filter: Filter, data: Data) -> ClientResult<BatchPayload> {
        let meta = Self::meta();
        let filter = validate::filter(meta, filter)?;
        let data = validate::update_data(meta, data, now())?;
        let rows = self.engine.update_many(meta, &filter, &data)?;
        tracing::debug!(model = meta.name, count = rows.len(), "update_many");
        Ok(BatchPayload::from(rows.len()))
    }

    /// Updates the row matching `unique`, or creates it. Both steps run in
    /// one transaction.
    pub fn upsert(&self, unique: UniqueWhere, create: M::Create, update: M::Update) -> ClientResult<M> {
        let meta = Self::meta();
        let unique = validate::unique_where(meta, unique)?;
        let create = Data::from_serializable(meta, &create)?;
        let update = Data::from_serializable(meta, &update)?;

        let mut output = None;
        self.engine.transaction(None, &mut |tx: &dyn Engine| {
            let delegate = Delegate::<M>::new(tx);
            let row = match delegate.update_with(unique.clone(), update.clone()) {
                Ok(row) => row,
                Err(e) if e.is_not_found() => delegate.create_with(create.clone())?,
                Err(e) => return Err(e),
            };
            output = Some(row);
            Ok(())
        })?;
        output.ok_or_else(|| ClientError::transaction("upsert finished without a row"))
    }

    // ============================================
    // DELETE
    // ============================================

    pub fn delete(&self, unique: UniqueWhere) -> ClientResult<M> {
        let meta = Self::meta();
        let unique = validate::unique_where(meta, unique)?;
        tracing::debug!(model = meta.name, field = %unique.field, "delete");

        let mut rows = self.engine.delete_many(meta, &unique.to_filter())?;
        match rows.pop() {
            Some(row) => Self::decode(row),
            None => Err(Self::not_found(" to delete")),
        }
    }

    pub fn delete_many(&self, filter: Filter) -> ClientResult<BatchPayload> {
        let meta = Self::meta();
        let filter = validate::filter(meta, filter)?;
        let rows = self.engine.delete_many(meta, &filter)?;
        tracing::debug!(model = meta.name, count = rows.len(), "delete_many");
        Ok(BatchPayload::from(rows.len()))
    }

    // ============================================
    // AGGREGATES
    // ============================================

    pub fn count(&self, args: impl Into<CountArgs>) -> ClientResult<u64> {
        let meta = Self::meta();
        let args = validate::count(meta, args.into())?;
        self.engine.count(meta, &args)
    }

    pub fn aggregate(&self, args: AggregateArgs) -> ClientResult<AggregateResult> {
        let meta = Self::meta();
        let args = validate::aggregate(meta, args)?;
        self.engine.aggregate(meta, &args)
    }

    pub fn group_by(&self, args: GroupByArgs) -> ClientResult<Vec<GroupRow>> {
        let meta = Self::meta();
        let args = validate::group_by(meta, args)?;
        self.engine.group_by(meta, &args)
    }
}
