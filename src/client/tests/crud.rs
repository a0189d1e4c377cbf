use super::*;
use crate::error::ClientError;
use crate::query::{Data, Filter, FindMany, UniqueWhere, Value};
use bounty_store_api::{NewSession, NewUser, TaskStatus, TransactionStatus, UpdateBlockchainTransaction, UpdateTask, UpdateUser};
use rstest::rstest;

// ============================================
// CREATE
// ============================================

#[rstest]
fn create_fills_defaults(client: BountyClient) {
    // Arrange
    let payload = NewUser {
        name: "Ada".to_string(),
        email: "ada@example.com".to_string(),
        ..NewUser::default()
    };

    // Act
    let user = client.user().create(payload).unwrap();

    // Assert
    assert!(uuid::Uuid::parse_str(&user.id).is_ok());
    assert!(!user.email_verified);
    assert_eq!(user.image, None);
    assert_eq!(user.created_at, user.updated_at);
}

#[rstest]
fn create_task_defaults_to_open(client: BountyClient) {
    seed_user(&client, "alice");

    let task = seed_task(&client, "t1", "alice");

    assert_eq!(task.status, TaskStatus::Open);
    assert!(!task.allow_overdue);
    assert_eq!(task.deleted_at, None);
}

#[rstest]
fn create_rejects_duplicate_email(client: BountyClient) {
    seed_user(&client, "alice");
    let mut duplicate = new_user("alice2");
    duplicate.email = "alice@example.com".to_string();

    let err = client.user().create(duplicate).unwrap_err();

    assert!(matches!(err, ClientError::UniqueViolation(_)));
    assert_eq!(client.user().count(Filter::all()).unwrap(), 1);
}

#[rstest]
fn create_rejects_unknown_creator(client: BountyClient) {
    let err = client.task().create(new_task("t1", "ghost")).unwrap_err();

    assert!(matches!(err, ClientError::ForeignKeyViolation(_)));
}

#[rstest]
fn create_with_missing_required_field(client: BountyClient) {
    let data = Data::new().set("name", "Ada");

    let err = client.user().create_with(data).unwrap_err();

    assert!(matches!(err, ClientError::MissingField { ref field, .. } if field == "email"));
}

#[rstest]
fn create_rejects_unknown_enum_literal(seeded: BountyClient) {
    let data = Data::new()
        .set("title", "x")
        .set("description", "x")
        .set("value_in_wei", "1")
        .set("deadline", day(3))
        .set("creator_id", "alice")
        .set("status", "ARCHIVED");

    let err = seeded.task().create_with(data).unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
}

#[rstest]
fn create_rejects_atomic_operations(client: BountyClient) {
    let data = Data::new().set("name", "Ada").increment("email", 1);

    let err = client.user().create_with(data).unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
}

#[rstest]
fn create_many_skips_duplicates(client: BountyClient) {
    seed_user(&client, "alice");

    let payload = client
        .user()
        .create_many(vec![new_user("alice"), new_user("bob"), new_user("carol")], true)
        .unwrap();

    assert_eq!(payload.count, 2);
    assert_eq!(client.user().count(Filter::all()).unwrap(), 3);
}

#[rstest]
fn create_many_is_all_or_nothing(client: BountyClient) {
    seed_user(&client, "alice");

    let result = client
        .user()
        .create_many(vec![new_user("bob"), new_user("alice")], false);

    assert!(matches!(result, Err(ClientError::UniqueViolation(_))));
    assert_eq!(client.user().count(Filter::all()).unwrap(), 1);
}

#[rstest]
fn create_many_and_return_gives_rows(client: BountyClient) {
    let users = client
        .user()
        .create_many_and_return(vec![new_user("alice"), new_user("bob")], false)
        .unwrap();

    assert_eq!(ids(&users, |u| &u.id), vec!["alice", "bob"]);
}

#[rstest]
fn create_many_with_nothing_is_empty(client: BountyClient) {
    let payload = client.user().create_many(Vec::new(), false).unwrap();

    assert!(payload.is_empty());
}

// ============================================
// FIND UNIQUE
// ============================================

#[rstest]
fn find_unique_by_secondary_unique_field(seeded: BountyClient) {
    let user = seeded
        .user()
        .find_unique(UniqueWhere::new("email", "bob@example.com"))
        .unwrap();

    assert_eq!(user.map(|u| u.id), Some("bob".to_string()));
}

#[rstest]
fn find_unique_with_extra_filter(seeded: BountyClient) {
    let miss = seeded
        .user()
        .find_unique(UniqueWhere::id("bob").and(Filter::field("name").equals("someone else")))
        .unwrap();

    assert!(miss.is_none());
}

#[rstest]
fn find_unique_or_throw_reports_not_found(seeded: BountyClient) {
    let err = seeded
        .user()
        .find_unique_or_throw(UniqueWhere::id("nobody"))
        .unwrap_err();

    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "Record not found: No User found");
}

#[rstest]
#[case::not_unique(UniqueWhere::new("name", "alice"))]
#[case::null_value(UniqueWhere::new("email", Value::Null))]
#[case::unknown_field(UniqueWhere::new("nickname", "al"))]
fn find_unique_rejects_bad_selectors(seeded: BountyClient, #[case] unique: UniqueWhere) {
    let err = seeded.user().find_unique(unique).unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
}

// ============================================
// UPDATE
// ============================================

#[rstest]
fn update_changes_fields_and_stamps_updated_at(seeded: BountyClient) {
    let before = seeded.task().find_unique_or_throw(UniqueWhere::id("t1")).unwrap();

    let after = seeded
        .task()
        .update(
            UniqueWhere::id("t1"),
            UpdateTask {
                status: Some(TaskStatus::InProgress),
                requirements: Some(Some("tests".to_string())),
                ..UpdateTask::default()
            },
        )
        .unwrap();

    assert_eq!(after.status, TaskStatus::InProgress);
    assert_eq!(after.requirements.as_deref(), Some("tests"));
    assert_eq!(after.title, before.title);
    assert!(after.updated_at >= before.updated_at);
}

#[rstest]
fn update_with_explicit_null_clears_the_column(client: BountyClient) {
    client
        .user()
        .create(NewUser {
            image: Some("a.png".to_string()),
            ..new_user("alice")
        })
        .unwrap();

    let user = client
        .user()
        .update(
            UniqueWhere::id("alice"),
            UpdateUser {
                image: Some(None),
                ..UpdateUser::default()
            },
        )
        .unwrap();

    assert_eq!(user.image, None);
}

#[rstest]
fn update_missing_row_is_not_found(seeded: BountyClient) {
    let err = seeded
        .user()
        .update(UniqueWhere::id("nobody"), UpdateUser::default())
        .unwrap_err();

    assert!(err.is_not_found());
}

#[rstest]
fn update_rejects_null_on_required_column(seeded: BountyClient) {
    let err = seeded
        .user()
        .update_with(UniqueWhere::id("alice"), Data::new().set("name", Value::Null))
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
}

#[rstest]
fn atomic_operations_on_int_fields(seeded: BountyClient) {
    let tx = seeded
        .blockchain_transaction()
        .update_with(UniqueWhere::id("x1"), Data::new().increment("block_number", 5))
        .unwrap();
    assert_eq!(tx.block_number, Some(15));

    let tx = seeded
        .blockchain_transaction()
        .update_with(UniqueWhere::id("x1"), Data::new().multiply("block_number", 2))
        .unwrap();
    assert_eq!(tx.block_number, Some(30));

    // NULL reste NULL
    let tx = seeded
        .blockchain_transaction()
        .update_with(UniqueWhere::id("x3"), Data::new().decrement("block_number", 1))
        .unwrap();
    assert_eq!(tx.block_number, None);
}

#[rstest]
#[case::text_field("gas_used")]
#[case::primary_key("id")]
fn atomic_operations_need_a_plain_int_field(seeded: BountyClient, #[case] field: &str) {
    let err = seeded
        .blockchain_transaction()
        .update_with(UniqueWhere::id("x1"), Data::new().increment(field, 1))
        .unwrap_err();

    assert!(matches!(err, ClientError::Validation(_)));
}

#[rstest]
fn update_many_reports_count(seeded: BountyClient) {
    let payload = seeded
        .blockchain_transaction()
        .update_many(
            Filter::field("task_id").equals("t1"),
            UpdateBlockchainTransaction {
                status: Some(TransactionStatus::Confirmed),
                confirmed_at: Some(Some(day(5))),
                ..UpdateBlockchainTransaction::default()
            },
        )
        .unwrap();

    assert_eq!(payload.count, 2);
    let confirmed = seeded
        .blockchain_transaction()
        .count(Filter::field("status").equals(TransactionStatus::Confirmed))
        .unwrap();
    assert_eq!(confirmed, 2);
}

#[rstest]
fn int_column_width_is_enforced(seeded: BountyClient) {
    // Arrange
    seed_developer(&seeded, "t1", "carol");

    // Act
    let too_big = seeded
        .task_developer()
        .update_with(UniqueWhere::id("dev-t1"), Data::new().set("network_id", 5_000_000_000_i64))
        .unwrap_err();
    let overflow = seeded
        .task_developer()
        .update_with(UniqueWhere::id("dev-t1"), Data::new().increment("network_id", i64::from(i32::MAX)))
        .unwrap_err();

    // Assert
    assert!(matches!(too_big, ClientError::Validation(_)));
    assert!(matches!(overflow, ClientError::Database(_)));
    // la ligne stockée reste lisible et intacte
    let developers = seeded.task_developer().find_many(FindMany::new()).unwrap();
    assert_eq!(developers.len(), 1);
    assert_eq!(developers[0].network_id, 1);
}

#[rstest]
fn duplicate_session_token_is_rejected(seeded: BountyClient) {
    let session = |id: &str, user: &str| NewSession {
        id: Some(id.to_string()),
        expires_at: day(25),
        token: "tok-1".to_string(),
        user_id: user.to_string(),
        ..NewSession::default()
    };
    seeded.session().create(session("s1", "alice")).unwrap();

    let err = seeded.session().create(session("s2", "bob")).unwrap_err();

    assert!(matches!(err, ClientError::UniqueViolation(_)));
    assert_eq!(seeded.session().count(Filter::all()).unwrap(), 1);
}

#[rstest]
fn update_into_a_taken_email_fails(seeded: BountyClient) {
    let err = seeded
        .user()
        .update(
            UniqueWhere::id("bob"),
            UpdateUser {
                email: Some("alice@example.com".to_string()),
                ..UpdateUser::default()
            },
        )
        .unwrap_err();

    assert!(matches!(err, ClientError::UniqueViolation(_)));
}

// ============================================
// UPSERT
// ============================================

#[rstest]
fn upsert_creates_then_updates(client: BountyClient) {
    let update = UpdateUser {
        name: Some("Renamed".to_string()),
        ..UpdateUser::default()
    };

    let created = client
        .user()
        .upsert(UniqueWhere::new("email", "alice@example.com"), new_user("alice"), update.clone())
        .unwrap();
    let updated = client
        .user()
        .upsert(UniqueWhere::new("email", "alice@example.com"), new_user("alice"), update)
        .unwrap();

    assert_eq!(created.name, "alice");
    assert_eq!(updated.name, "Renamed");
    assert_eq!(updated.id, created.id);
    assert_eq!(client.user().count(Filter::all()).unwrap(), 1);
}

// ============================================
// DELETE
// ============================================

#[rstest]
fn delete_returns_the_removed_row(seeded: BountyClient) {
    let removed = seeded.user().delete(UniqueWhere::id("carol")).unwrap();

    assert_eq!(removed.id, "carol");
    assert!(seeded.user().find_unique(UniqueWhere::id("carol")).unwrap().is_none());
}

#[rstest]
fn delete_missing_row_is_not_found(seeded: BountyClient) {
    let err = seeded.user().delete(UniqueWhere::id("nobody")).unwrap_err();

    assert!(err.is_not_found());
}

#[rstest]
fn delete_many_reports_count(seeded: BountyClient) {
    let payload = seeded
        .blockchain_transaction()
        .delete_many(Filter::field("type").equals(TransactionType::Deposit))
        .unwrap();

    assert_eq!(payload.count, 2);
    assert_eq!(seeded.blockchain_transaction().count(Filter::all()).unwrap(), 1);
}
