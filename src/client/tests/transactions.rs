use super::*;
use crate::error::ClientError;
use crate::query::{Filter, UniqueWhere, Value};
use bounty_store_api::{TaskStatus, TransactionIsolationLevel, UpdateTask};
use rstest::rstest;

// ============================================
// TRANSACTIONS
// ============================================

#[rstest]
fn committed_transaction_returns_its_value(seeded: BountyClient) {
    // Act
    let (task, developer) = seeded
        .transaction(None, |tx| {
            let developer = seed_developer_in(tx, "t2", "carol")?;
            let task = tx.task().update(
                UniqueWhere::id("t2"),
                UpdateTask {
                    status: Some(TaskStatus::InProgress),
                    ..UpdateTask::default()
                },
            )?;
            Ok((task, developer))
        })
        .unwrap();

    // Assert
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(developer.task_id, "t2");
    assert_eq!(seeded.task_developer().count(Filter::all()).unwrap(), 1);
}

fn seed_developer_in(
    tx: &crate::client::TransactionClient<'_>,
    task_id: &str,
    developer_id: &str,
) -> crate::error::ClientResult<bounty_store_api::TaskDeveloper> {
    tx.task_developer().create(bounty_store_api::NewTaskDeveloper {
        id: None,
        task_id: task_id.to_string(),
        developer_id: developer_id.to_string(),
        wallet_address: "0xabc".to_string(),
        network_id: 1,
        accepted_at: None,
    })
}

#[rstest]
fn failing_body_rolls_everything_back(seeded: BountyClient) {
    let result: Result<(), _> = seeded.transaction(None, |tx| {
        tx.user().create(new_user("dave"))?;
        tx.task().delete(UniqueWhere::id("t1"))?;
        Err(ClientError::validation("abort"))
    });

    assert!(matches!(result, Err(ClientError::Validation(_))));
    assert_eq!(seeded.user().count(Filter::all()).unwrap(), 3);
    assert_eq!(seeded.task().count(Filter::all()).unwrap(), 3);
    assert_eq!(seeded.blockchain_transaction().count(Filter::all()).unwrap(), 3);
}

#[rstest]
fn failing_statement_rolls_back_earlier_writes(seeded: BountyClient) {
    let result = seeded.transaction(None, |tx| {
        tx.user().create(new_user("dave"))?;
        // email déjà pris
        tx.user().create(new_user("alice"))
    });

    assert!(matches!(result, Err(ClientError::UniqueViolation(_))));
    assert!(seeded.user().find_unique(UniqueWhere::id("dave")).unwrap().is_none());
}

#[rstest]
fn reads_inside_see_own_writes(client: BountyClient) {
    let seen = client
        .transaction(None, |tx| {
            tx.user().create(new_user("alice"))?;
            tx.user().count(Filter::all())
        })
        .unwrap();

    assert_eq!(seen, 1);
}

#[rstest]
fn nested_transaction_joins_the_outer_one(client: BountyClient) {
    let result: Result<(), _> = client.transaction(None, |tx| {
        tx.transaction(None, |inner| inner.user().create(new_user("alice")).map(|_| ()))?;
        Err(ClientError::validation("outer failure"))
    });

    assert!(result.is_err());
    assert_eq!(client.user().count(Filter::all()).unwrap(), 0);
}

#[rstest]
#[case(TransactionIsolationLevel::ReadUncommitted)]
#[case(TransactionIsolationLevel::ReadCommitted)]
#[case(TransactionIsolationLevel::RepeatableRead)]
#[case(TransactionIsolationLevel::Serializable)]
fn every_isolation_level_is_accepted(client: BountyClient, #[case] level: TransactionIsolationLevel) {
    let user = client
        .transaction(Some(level), |tx| tx.user().create(new_user("alice")))
        .unwrap();

    assert_eq!(user.id, "alice");
}

#[rstest]
fn upsert_inside_a_transaction(client: BountyClient) {
    client
        .transaction(None, |tx| {
            tx.user().upsert(
                UniqueWhere::id("alice"),
                new_user("alice"),
                bounty_store_api::UpdateUser::default(),
            )
        })
        .unwrap();

    assert_eq!(client.user().count(Filter::all()).unwrap(), 1);
}

#[rstest]
fn outer_client_inside_a_transaction_is_rejected(seeded: BountyClient) {
    // Arrange
    let (tx_done, rx) = std::sync::mpsc::channel();
    let client = seeded.clone();

    // Act
    std::thread::spawn(move || {
        let result = client.transaction(None, |tx| {
            tx.user().create(new_user("dave"))?;
            client.user().count(Filter::all())
        });
        let _ = tx_done.send(result);
    });
    let result = rx
        .recv_timeout(std::time::Duration::from_secs(3))
        .expect("transaction should not block on its own lock");

    // Assert
    assert!(matches!(result, Err(ClientError::Transaction(_))));
    assert_eq!(seeded.user().count(Filter::all()).unwrap(), 3);
}

// ============================================
// RAW QUERIES
// ============================================

#[rstest]
fn raw_queries_need_postgres(client: BountyClient) {
    let query = client.query_raw("SELECT 1", Vec::new()).unwrap_err();
    let execute = client
        .execute_raw("DELETE FROM users WHERE id = $1", vec![Value::from("alice")])
        .unwrap_err();
    let typed = client
        .query_raw_as::<serde_json::Value>("SELECT 1", Vec::new())
        .unwrap_err();

    assert!(matches!(query, ClientError::Unsupported(_)));
    assert!(matches!(execute, ClientError::Unsupported(_)));
    assert!(matches!(typed, ClientError::Unsupported(_)));
}
