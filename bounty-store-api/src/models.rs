//! Model records and their create / update payloads.
//!
//! Field names match the database columns. Create payloads leave out the
//! fields that have a default (`None` means "use the default"); update
//! payloads only touch the fields that are `Some`. For nullable columns the
//! update field is `Option<Option<T>>`: `Some(None)` clears the column.

use crate::enums::{TaskStatus, TransactionStatus, TransactionType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

// -------- USER --------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct User {
    pub id: String,
    pub name: String,
    pub email: String,
    pub email_verified: bool,
    pub image: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub name: String,
    pub email: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateUser {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email_verified: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<Option<String>>,
}

// -------- SESSION --------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Session {
    pub id: String,
    pub expires_at: DateTime<Utc>,
    pub token: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: Option<String>,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub expires_at: DateTime<Utc>,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<String>,
    pub user_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateSession {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip_address: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_agent: Option<Option<String>>,
}

// -------- ACCOUNT --------

/// A linked external identity (OAuth provider) or password credential.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Account {
    pub id: String,
    pub account_id: String,
    pub provider_id: String,
    pub user_id: String,
    pub access_token: Option<String>,
    pub refresh_token: Option<String>,
    pub id_token: Option<String>,
    pub access_token_expires_at: Option<DateTime<Utc>>,
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    pub scope: Option<String>,
    pub password: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub account_id: String,
    pub provider_id: String,
    pub user_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateAccount {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub access_token_expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token_expires_at: Option<Option<DateTime<Utc>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<Option<String>>,
}

// -------- VERIFICATION --------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Verification {
    pub id: String,
    pub identifier: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewVerification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub identifier: String,
    pub value: String,
    pub expires_at: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateVerification {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<DateTime<Utc>>,
}

// -------- TASK --------

/// A unit of work with an escrowed bounty (`value_in_wei`).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Task {
    pub id: String,
    pub title: String,
    pub description: String,
    pub requirements: Option<String>,
    pub links: Option<Json>,
    pub attachments: Option<Json>,
    pub value_in_wei: String,
    pub deadline: DateTime<Utc>,
    pub allow_overdue: bool,
    pub status: TaskStatus,
    pub contract_task_id: Option<String>,
    pub creator_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Json>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Json>,
    pub value_in_wei: String,
    pub deadline: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_overdue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_task_id: Option<String>,
    pub creator_id: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateTask {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requirements: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub links: Option<Option<Json>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachments: Option<Option<Json>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_in_wei: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deadline: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_overdue: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_task_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

// -------- TASK DEVELOPER --------

/// Assignment of a developer to a task (at most one per task).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskDeveloper {
    pub id: String,
    pub task_id: String,
    pub developer_id: String,
    pub wallet_address: String,
    pub network_id: i32,
    pub applied_at: DateTime<Utc>,
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewTaskDeveloper {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub task_id: String,
    pub developer_id: String,
    pub wallet_address: String,
    pub network_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateTaskDeveloper {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub wallet_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub network_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<Option<DateTime<Utc>>>,
}

// -------- TASK REPOSITORY --------

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TaskRepository {
    pub id: String,
    pub task_id: String,
    pub repository_name: String,
    pub repository_url: String,
    pub github_repo_id: Option<i32>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub deleted_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct NewTaskRepository {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub task_id: String,
    pub repository_name: String,
    pub repository_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo_id: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateTaskRepository {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub repository_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub github_repo_id: Option<Option<i32>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_active: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deleted_at: Option<Option<DateTime<Utc>>>,
}

// -------- BLOCKCHAIN TRANSACTION --------

/// Ledger entry for an on-chain operation tied to a task.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BlockchainTransaction {
    pub id: String,
    pub task_id: String,
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub status: TransactionStatus,
    pub tx_hash: Option<String>,
    pub block_number: Option<i64>,
    pub gas_used: Option<String>,
    pub value_in_wei: String,
    pub network_id: i32,
    pub error_message: Option<String>,
    pub created_at: DateTime<Utc>,
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct NewBlockchainTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub task_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<String>,
    pub value_in_wei: String,
    pub network_id: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, Default)]
pub struct UpdateBlockchainTransaction {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TransactionStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub block_number: Option<Option<i64>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gas_used: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<Option<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<Option<DateTime<Utc>>>,
}
