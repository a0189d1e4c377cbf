//! Same client against PostgreSQL. Runs only when TEST_DATABASE_URL is
//! set; every test works inside a transaction that is rolled back.

use super::*;
use crate::client::TransactionClient;
use crate::config::Config;
use crate::error::{ClientError, ClientResult};
use crate::query::{
    AggregateArgs, AggregateSelection, Data, Filter, FindMany, GroupByArgs, OrderBy, Projection,
    UniqueWhere, Value,
};
use bounty_store_api::TransactionType;
use std::sync::OnceLock;

const ROLLBACK: &str = "test rollback";

fn live_client() -> Option<BountyClient> {
    static CLIENT: OnceLock<Option<BountyClient>> = OnceLock::new();
    CLIENT
        .get_or_init(|| {
            let url = std::env::var("TEST_DATABASE_URL").ok()?;
            Some(BountyClient::connect(&Config::for_database(url)).expect("test database should be reachable"))
        })
        .clone()
}

/// Runs `body` in a rolled-back transaction; skipped without a database.
fn in_rollback(body: impl FnOnce(&TransactionClient<'_>) -> ClientResult<()>) {
    let Some(client) = live_client() else {
        eprintln!("TEST_DATABASE_URL not set, skipping");
        return;
    };
    let result: ClientResult<()> = client.transaction(None, |tx| {
        body(tx)?;
        Err(ClientError::validation(ROLLBACK))
    });
    match result {
        Err(ClientError::Validation(msg)) if msg == ROLLBACK => {}
        other => panic!("unexpected transaction outcome: {other:?}"),
    }
}

fn seed(tx: &TransactionClient<'_>) -> ClientResult<()> {
    for id in ["pg-alice", "pg-bob"] {
        tx.user().create(new_user(id))?;
    }
    tx.task().create(new_task("pg-t1", "pg-alice"))?;
    tx.task().create(new_task("pg-t2", "pg-alice"))?;
    tx.blockchain_transaction()
        .create(new_tx("pg-x1", "pg-t1", Some("pg-bob"), TransactionType::Deposit, Some(10)))?;
    tx.blockchain_transaction()
        .create(new_tx("pg-x2", "pg-t1", None, TransactionType::Release, Some(20)))?;
    Ok(())
}

#[test]
fn postgres_crud_round() {
    in_rollback(|tx| {
        seed(tx)?;

        let bob = tx
            .user()
            .find_unique_or_throw(UniqueWhere::new("email", "pg-bob@example.com"))?;
        assert_eq!(bob.id, "pg-bob");

        let x1 = tx
            .blockchain_transaction()
            .update_with(UniqueWhere::id("pg-x1"), Data::new().increment("block_number", 5))?;
        assert_eq!(x1.block_number, Some(15));

        let removed = tx.task().delete_many(Filter::field("id").equals("pg-t2"))?;
        assert_eq!(removed.count, 1);
        Ok(())
    });
}

#[test]
fn postgres_pagination_and_projection() {
    in_rollback(|tx| {
        seed(tx)?;
        let mine = Filter::field("id").starts_with("pg-");

        let last = tx
            .task()
            .find_many(FindMany::filtered(mine.clone()).order_by(OrderBy::asc("id")).take(-1))?;
        assert_eq!(ids(&last, |t| &t.id), vec!["pg-t2"]);

        let users = tx.user().find_many_projected(
            FindMany::filtered(mine).order_by(OrderBy::asc("id")),
            Projection::new().select(["id"]).count(["tasks"]).include("tasks"),
        )?;
        assert_eq!(users.len(), 2);
        let counts = users[0].value("_count");
        assert!(matches!(counts, Value::Record(r) if r.value("tasks") == &Value::Int(2)));
        Ok(())
    });
}

#[test]
fn postgres_aggregates() {
    in_rollback(|tx| {
        seed(tx)?;
        let mine = Filter::field("task_id").equals("pg-t1");

        let stats = tx.blockchain_transaction().aggregate(
            AggregateArgs::new(AggregateSelection::new().count_all().sum(["block_number"]).avg(["block_number"]))
                .filter(mine.clone()),
        )?;
        assert_eq!(stats.count_all(), Some(2));
        assert_eq!(stats.sum("block_number"), Some(30));
        assert_eq!(stats.avg("block_number"), Some(15.0));

        let groups = tx.blockchain_transaction().group_by(
            GroupByArgs::by(["type"])
                .filter(mine)
                .select(AggregateSelection::new().count_all()),
        )?;
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].key("type"), &Value::from("DEPOSIT"));
        Ok(())
    });
}

#[test]
fn postgres_raw_query() {
    in_rollback(|tx| {
        seed(tx)?;

        let rows = tx.query_raw(
            "SELECT id, email FROM users WHERE id = $1",
            vec![Value::from("pg-alice")],
        )?;
        assert_eq!(rows[0]["email"], serde_json::json!("pg-alice@example.com"));

        let touched = tx.execute_raw(
            "UPDATE tasks SET title = $1 WHERE creator_id = $2",
            vec![Value::from("renamed"), Value::from("pg-alice")],
        )?;
        assert_eq!(touched, 2);
        Ok(())
    });
}
