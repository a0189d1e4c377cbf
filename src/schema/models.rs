use super::{
    Cardinality, DefaultValue, FieldMeta, ModelMeta, OnDelete, RelationMeta, ScalarKind,
};
use bounty_store_api::{
    Account, BlockchainTransaction, NewAccount, NewBlockchainTransaction, NewSession, NewTask,
    NewTaskDeveloper, NewTaskRepository, NewUser, NewVerification, Session, Task, TaskDeveloper,
    TaskRepository, TaskStatus, TransactionStatus, TransactionType, UpdateAccount,
    UpdateBlockchainTransaction, UpdateSession, UpdateTask, UpdateTaskDeveloper,
    UpdateTaskRepository, UpdateUser, UpdateVerification, User, Verification,
};
use serde::Serialize;
use serde::de::DeserializeOwned;

use ScalarKind::{Boolean, DateTime, Int, Json, String as Text};

/// A typed model backed by a registry entry.
pub trait Model: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Create payload (fields with defaults are optional).
    type Create: Serialize;
    /// Update payload (only the `Some` fields are written).
    type Update: Serialize;

    fn meta() -> &'static ModelMeta;
}

const fn field(name: &'static str, kind: ScalarKind) -> FieldMeta {
    FieldMeta::new(name, kind)
}

const fn to_one(
    name: &'static str,
    target: &'static str,
    local_field: &'static str,
    on_delete: OnDelete,
) -> RelationMeta {
    RelationMeta {
        name,
        target,
        cardinality: Cardinality::ToOne,
        local_field,
        foreign_field: "id",
        on_delete: Some(on_delete),
    }
}

const fn back_one(name: &'static str, target: &'static str, foreign_field: &'static str) -> RelationMeta {
    RelationMeta {
        name,
        target,
        cardinality: Cardinality::ToOne,
        local_field: "id",
        foreign_field,
        on_delete: None,
    }
}

const fn back_many(
    name: &'static str,
    target: &'static str,
    foreign_field: &'static str,
) -> RelationMeta {
    RelationMeta {
        name,
        target,
        cardinality: Cardinality::ToMany,
        local_field: "id",
        foreign_field,
        on_delete: None,
    }
}

pub static USER: ModelMeta = ModelMeta {
    name: "User",
    table: "users",
    fields: &[
        field("id", Text).id(),
        field("name", Text),
        field("email", Text).unique(),
        field("email_verified", Boolean).default(DefaultValue::Bool(false)),
        field("image", Text).nullable(),
        field("created_at", DateTime).default(DefaultValue::Now),
        field("updated_at", DateTime).updated_at(),
        field("role", Text).nullable(),
    ],
    relations: &[
        back_many("sessions", "Session", "user_id"),
        back_many("accounts", "Account", "user_id"),
        back_many("tasks", "Task", "creator_id"),
        back_many("task_developers", "TaskDeveloper", "developer_id"),
        back_many("blockchain_transactions", "BlockchainTransaction", "user_id"),
    ],
};

pub static SESSION: ModelMeta = ModelMeta {
    name: "Session",
    table: "sessions",
    fields: &[
        field("id", Text).id(),
        field("expires_at", DateTime),
        field("token", Text).unique(),
        field("created_at", DateTime).default(DefaultValue::Now),
        field("updated_at", DateTime).updated_at(),
        field("ip_address", Text).nullable(),
        field("user_agent", Text).nullable(),
        field("user_id", Text),
    ],
    relations: &[to_one("user", "User", "user_id", OnDelete::Cascade)],
};

pub static ACCOUNT: ModelMeta = ModelMeta {
    name: "Account",
    table: "accounts",
    fields: &[
        field("id", Text).id(),
        field("account_id", Text),
        field("provider_id", Text),
        field("user_id", Text),
        field("access_token", Text).nullable(),
        field("refresh_token", Text).nullable(),
        field("id_token", Text).nullable(),
        field("access_token_expires_at", DateTime).nullable(),
        field("refresh_token_expires_at", DateTime).nullable(),
        field("scope", Text).nullable(),
        field("password", Text).nullable(),
        field("created_at", DateTime).default(DefaultValue::Now),
        field("updated_at", DateTime).updated_at(),
    ],
    relations: &[to_one("user", "User", "user_id", OnDelete::Cascade)],
};

pub static VERIFICATION: ModelMeta = ModelMeta {
    name: "Verification",
    table: "verifications",
    fields: &[
        field("id", Text).id(),
        field("identifier", Text),
        field("value", Text),
        field("expires_at", DateTime),
        field("created_at", DateTime)
            .nullable()
            .default(DefaultValue::Now),
        field("updated_at", DateTime).nullable().updated_at(),
    ],
    relations: &[],
};

pub static TASK: ModelMeta = ModelMeta {
    name: "Task",
    table: "tasks",
    fields: &[
        field("id", Text).id(),
        field("title", Text),
        field("description", Text),
        field("requirements", Text).nullable(),
        field("links", Json).nullable(),
        field("attachments", Json).nullable(),
        field("value_in_wei", Text),
        field("deadline", DateTime),
        field("allow_overdue", Boolean).default(DefaultValue::Bool(false)),
        field("status", ScalarKind::Enum(TaskStatus::LITERALS))
            .default(DefaultValue::Literal("OPEN")),
        field("contract_task_id", Text).nullable(),
        field("creator_id", Text),
        field("created_at", DateTime).default(DefaultValue::Now),
        field("updated_at", DateTime).updated_at(),
        field("deleted_at", DateTime).nullable(),
    ],
    relations: &[
        to_one("creator", "User", "creator_id", OnDelete::Restrict),
        back_one("developer", "TaskDeveloper", "task_id"),
        back_one("repository", "TaskRepository", "task_id"),
        back_many("transactions", "BlockchainTransaction", "task_id"),
    ],
};

pub static TASK_DEVELOPER: ModelMeta = ModelMeta {
    name: "TaskDeveloper",
    table: "task_developers",
    fields: &[
        field("id", Text).id(),
        field("task_id", Text).unique(),
        field("developer_id", Text),
        field("wallet_address", Text),
        field("network_id", Int).int4(),
        field("applied_at", DateTime).default(DefaultValue::Now),
        field("accepted_at", DateTime).nullable(),
    ],
    relations: &[
        to_one("task", "Task", "task_id", OnDelete::Cascade),
        to_one("developer", "User", "developer_id", OnDelete::Restrict),
    ],
};

pub static TASK_REPOSITORY: ModelMeta = ModelMeta {
    name: "TaskRepository",
    table: "task_repositories",
    fields: &[
        field("id", Text).id(),
        field("task_id", Text).unique(),
        field("repository_name", Text),
        field("repository_url", Text),
        field("github_repo_id", Int).int4().nullable(),
        field("is_active", Boolean).default(DefaultValue::Bool(true)),
        field("created_at", DateTime).default(DefaultValue::Now),
        field("deleted_at", DateTime).nullable(),
    ],
    relations: &[to_one("task", "Task", "task_id", OnDelete::Cascade)],
};

pub static BLOCKCHAIN_TRANSACTION: ModelMeta = ModelMeta {
    name: "BlockchainTransaction",
    table: "blockchain_transactions",
    fields: &[
        field("id", Text).id(),
        field("task_id", Text),
        field("user_id", Text).nullable(),
        field("type", ScalarKind::Enum(TransactionType::LITERALS)),
        field("status", ScalarKind::Enum(TransactionStatus::LITERALS))
            .default(DefaultValue::Literal("PENDING")),
        field("tx_hash", Text).nullable(),
        field("block_number", Int).nullable(),
        field("gas_used", Text).nullable(),
        field("value_in_wei", Text),
        field("network_id", Int).int4(),
        field("error_message", Text).nullable(),
        field("created_at", DateTime).default(DefaultValue::Now),
        field("confirmed_at", DateTime).nullable(),
    ],
    relations: &[
        to_one("task", "Task", "task_id", OnDelete::Cascade),
        to_one("user", "User", "user_id", OnDelete::SetNull),
    ],
};

macro_rules! impl_model {
    ($model:ty, $create:ty, $update:ty, $meta:ident) => {
        impl Model for $model {
            type Create = $create;
            type Update = $update;

            fn meta() -> &'static ModelMeta {
                &$meta
            }
        }
    };
}

impl_model!(User, NewUser, UpdateUser, USER);
impl_model!(Session, NewSession, UpdateSession, SESSION);
impl_model!(Account, NewAccount, UpdateAccount, ACCOUNT);
impl_model!(Verification, NewVerification, UpdateVerification, VERIFICATION);
impl_model!(Task, NewTask, UpdateTask, TASK);
impl_model!(TaskDeveloper, NewTaskDeveloper, UpdateTaskDeveloper, TASK_DEVELOPER);
impl_model!(TaskRepository, NewTaskRepository, UpdateTaskRepository, TASK_REPOSITORY);
impl_model!(
    BlockchainTransaction,
    NewBlockchainTransaction,
    UpdateBlockchainTransaction,
    BLOCKCHAIN_TRANSACTION
);
