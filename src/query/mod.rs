//! Query arguments and the machinery shared by the engines: values,
//! filters, validation, SQL generation and in-memory evaluation.

pub mod aggregate;
pub mod args;
pub mod builder;
pub mod eval;
pub mod filter;
pub mod validate;
pub mod value;

pub use aggregate::{
    AggregateArgs, AggregateFn, AggregateResult, AggregateSelection, GroupByArgs, GroupOrder,
    GroupRow, Having,
};
pub use args::{CountArgs, Data, FieldOp, FindMany, Include, OrderBy, Projection, UniqueWhere};
pub use filter::{Condition, Filter, RelationCondition};
pub use value::{Record, Value, ValueError};
