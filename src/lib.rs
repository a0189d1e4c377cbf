//! # bounty-store
//!
//! Typed data-access client for the bounty platform: users and their auth
//! records, tasks with their developer / repository links, and blockchain
//! transactions.
//!
//! Two engines implement the same semantics: [`engine::PgEngine`] on a
//! diesel r2d2 pool and [`engine::MemoryEngine`] for tests and tooling.

pub mod client;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod logging;
pub mod maintenance;
pub mod query;
pub mod schema;

pub use client::{BountyClient, Delegate, TransactionClient};
pub use error::{ClientError, ClientResult};
