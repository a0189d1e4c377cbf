//! Client behaviour, exercised on the in-memory engine.

mod crud;
mod postgres;
mod transactions;

use super::BountyClient;
use bounty_store_api::{
    BlockchainTransaction, NewBlockchainTransaction, NewTask, NewTaskDeveloper, NewUser, Task,
    TaskDeveloper, TransactionType, User,
};
use chrono::{DateTime, TimeZone, Utc};
use rstest::fixture;

pub(super) fn day(d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2030, 1, d, 12, 0, 0).unwrap()
}

pub(super) fn new_user(id: &str) -> NewUser {
    NewUser {
        id: Some(id.to_string()),
        name: id.to_string(),
        email: format!("{id}@example.com"),
        ..NewUser::default()
    }
}

pub(super) fn new_task(id: &str, creator_id: &str) -> NewTask {
    NewTask {
        id: Some(id.to_string()),
        title: format!("Task {id}"),
        description: "Fix the thing".to_string(),
        value_in_wei: "1000000000000000000".to_string(),
        deadline: day(20),
        creator_id: creator_id.to_string(),
        ..NewTask::default()
    }
}

pub(super) fn new_tx(
    id: &str,
    task_id: &str,
    user_id: Option<&str>,
    tx_type: TransactionType,
    block_number: Option<i64>,
) -> NewBlockchainTransaction {
    NewBlockchainTransaction {
        id: Some(id.to_string()),
        task_id: task_id.to_string(),
        user_id: user_id.map(str::to_string),
        tx_type,
        status: None,
        tx_hash: None,
        block_number,
        gas_used: None,
        value_in_wei: "500".to_string(),
        network_id: 1,
        error_message: None,
        confirmed_at: None,
    }
}

pub(super) fn seed_user(client: &BountyClient, id: &str) -> User {
    client.user().create(new_user(id)).expect("user should be created")
}

pub(super) fn seed_task(client: &BountyClient, id: &str, creator_id: &str) -> Task {
    client
        .task()
        .create(new_task(id, creator_id))
        .expect("task should be created")
}

pub(super) fn seed_developer(client: &BountyClient, task_id: &str, developer_id: &str) -> TaskDeveloper {
    client
        .task_developer()
        .create(NewTaskDeveloper {
            id: Some(format!("dev-{task_id}")),
            task_id: task_id.to_string(),
            developer_id: developer_id.to_string(),
            wallet_address: "0xabc".to_string(),
            network_id: 1,
            accepted_at: None,
        })
        .expect("developer should be created")
}

pub(super) fn seed_tx(
    client: &BountyClient,
    id: &str,
    task_id: &str,
    user_id: Option<&str>,
    tx_type: TransactionType,
    block_number: Option<i64>,
) -> BlockchainTransaction {
    client
        .blockchain_transaction()
        .create(new_tx(id, task_id, user_id, tx_type, block_number))
        .expect("transaction should be created")
}

pub(super) fn ids<T>(rows: &[T], id: impl Fn(&T) -> &str) -> Vec<String> {
    rows.iter().map(|r| id(r).to_string()).collect()
}

#[fixture]
pub(super) fn client() -> BountyClient {
    BountyClient::in_memory()
}

/// alice creates t1 and t2, bob creates t3; carol has no task.
/// Transactions: x1 (t1, bob, block 10), x2 (t1, no user, block 20),
/// x3 (t3, alice, no block).
#[fixture]
pub(super) fn seeded() -> BountyClient {
    let client = BountyClient::in_memory();
    for id in ["alice", "bob", "carol"] {
        seed_user(&client, id);
    }
    seed_task(&client, "t1", "alice");
    seed_task(&client, "t2", "alice");
    seed_task(&client, "t3", "bob");
    seed_tx(&client, "x1", "t1", Some("bob"), TransactionType::Deposit, Some(10));
    seed_tx(&client, "x2", "t1", None, TransactionType::Release, Some(20));
    seed_tx(&client, "x3", "t3", Some("alice"), TransactionType::Deposit, None);
    client
}
