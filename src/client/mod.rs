//! Typed client: one delegate per model plus transaction and raw-query
//! entry points.
//!
//! ```
//! use bounty_store::client::BountyClient;
//! use bounty_store::query::{Filter, FindMany};
//! use bounty_store_api::NewUser;
//!
//! let client = BountyClient::in_memory();
//! let ada = client
//!     .user()
//!     .create(NewUser {
//!         id: None,
//!         name: "Ada".to_string(),
//!         email: "ada@example.com".to_string(),
//!         email_verified: None,
//!         image: None,
//!         role: None,
//!     })
//!     .unwrap();
//!
//! let found = client
//!     .user()
//!     .find_many(FindMany::filtered(Filter::field("email").ends_with("@example.com")))
//!     .unwrap();
//! assert_eq!(found, vec![ada]);
//! ```

mod delegate;
pub mod projection;
#[cfg(test)]
mod tests;

pub use delegate::Delegate;

use crate::config::Config;
use crate::db::connection::{create_pool, get_connection};
use crate::db::{DbPool, migrate};
use crate::engine::{Engine, MemoryEngine, PgEngine};
use crate::error::{ClientError, ClientResult};
use crate::query::Value;
use bounty_store_api::{
    Account, BlockchainTransaction, Session, Task, TaskDeveloper, TaskRepository,
    TransactionIsolationLevel, User, Verification,
};
use serde::de::DeserializeOwned;
use serde_json::Value as Json;
use std::sync::Arc;

/// Delegates and raw / transaction entry points, shared by the client and
/// the transaction-scoped client.
macro_rules! client_surface {
    () => {
        pub fn user(&self) -> Delegate<'_, User> {
            Delegate::new(self.engine())
        }

        pub fn session(&self) -> Delegate<'_, Session> {
            Delegate::new(self.engine())
        }

        pub fn account(&self) -> Delegate<'_, Account> {
            Delegate::new(self.engine())
        }

        pub fn verification(&self) -> Delegate<'_, Verification> {
            Delegate::new(self.engine())
        }

        pub fn task(&self) -> Delegate<'_, Task> {
            Delegate::new(self.engine())
        }

        pub fn task_developer(&self) -> Delegate<'_, TaskDeveloper> {
            Delegate::new(self.engine())
        }

        pub fn task_repository(&self) -> Delegate<'_, TaskRepository> {
            Delegate::new(self.engine())
        }

        pub fn blockchain_transaction(&self) -> Delegate<'_, BlockchainTransaction> {
            Delegate::new(self.engine())
        }

        /// Runs `f` in a transaction: committed when it returns `Ok`,
        /// rolled back otherwise.
        pub fn transaction<T>(
            &self,
            isolation: Option<TransactionIsolationLevel>,
            f: impl FnOnce(&TransactionClient<'_>) -> ClientResult<T>,
        ) -> ClientResult<T> {
            let mut f = Some(f);
            let mut output = None;
            self.engine().transaction(isolation, &mut |engine: &dyn Engine| {
                let f = f
                    .take()
                    .ok_or_else(|| ClientError::transaction("transaction body called twice"))?;
                output = Some(f(&TransactionClient { engine })?);
                Ok(())
            })?;
            output.ok_or_else(|| ClientError::transaction("transaction finished without a result"))
        }

        /// Runs a SQL query; `$1`, `$2`… are bound from `params`.
        pub fn query_raw(&self, sql: &str, params: Vec<Value>) -> ClientResult<Vec<Json>> {
            tracing::debug!(sql, "query_raw");
            self.engine().query_raw(sql, params)
        }

        pub fn query_raw_as<T: DeserializeOwned>(&self, sql: &str, params: Vec<Value>) -> ClientResult<Vec<T>> {
            self.query_raw(sql, params)?
                .into_iter()
                .map(|row| serde_json::from_value(row).map_err(|e| ClientError::raw_query(e.to_string())))
                .collect()
        }

        /// Runs a SQL statement and returns the number of affected rows.
        pub fn execute_raw(&self, sql: &str, params: Vec<Value>) -> ClientResult<usize> {
            tracing::debug!(sql, "execute_raw");
            self.engine().execute_raw(sql, params)
        }
    };
}

#[derive(Clone)]
pub struct BountyClient {
    engine: Arc<dyn Engine>,
}

impl BountyClient {
    pub fn new(engine: Arc<dyn Engine>) -> Self {
        Self { engine }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryEngine::new()))
    }

    pub fn postgres(pool: DbPool) -> Self {
        Self::new(Arc::new(PgEngine::new(pool)))
    }

    /// Builds the pool from the configuration and applies pending
    /// migrations when enabled.
    pub fn connect(config: &Config) -> anyhow::Result<Self> {
        let pool = create_pool(config)?;
        if config.run_migrations {
            let mut conn = get_connection(&pool)?;
            migrate::run_pending(&mut conn)?;
        }
        Ok(Self::postgres(pool))
    }

    pub fn engine(&self) -> &dyn Engine {
        self.engine.as_ref()
    }

    client_surface!();
}

/// Client bound to an open transaction.
pub struct TransactionClient<'a> {
    engine: &'a dyn Engine,
}

impl TransactionClient<'_> {
    pub fn engine(&self) -> &dyn Engine {
        self.engine
    }

    client_surface!();
}
