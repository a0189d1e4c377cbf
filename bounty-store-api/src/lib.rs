//! # bounty-store-api
//!
//! Shared model types for the bounty-store data-access layer.
//! This crate only depends on serde and chrono so that it can be used in
//! both the backend and frontend (WASM) builds.
//!
//! ## Features
//!
//! - Schema enums (TaskStatus, TransactionType, TransactionStatus, ...)
//! - Model records (User, Session, Task, ...)
//! - Create / update payloads (NewTask, UpdateTask, ...)
//! - Error response format with known error codes (ErrorResponse)
//! - Batch operation result (BatchPayload)
//!
//! ## Example
//!
//! ```rust
//! use bounty_store_api::{NewUser, TaskStatus};
//!
//! let user = NewUser {
//!     id: None,
//!     name: "Ada".to_string(),
//!     email: "ada@example.com".to_string(),
//!     email_verified: None,
//!     image: None,
//!     role: None,
//! };
//! assert_eq!(TaskStatus::InProgress.as_str(), "IN_PROGRESS");
//! # let _ = user;
//! ```

pub mod enums;
pub mod error;
pub mod models;
pub mod result;

// Re-exports for convenient access
pub use enums::*;
pub use error::{ErrorResponse, KnownErrorCode};
pub use models::*;
pub use result::BatchPayload;
