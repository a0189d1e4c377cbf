// src/error.rs

use crate::db::error::RepositoryError;
use crate::query::ValueError;
use bounty_store_api::{ErrorResponse, KnownErrorCode};

#[derive(Debug, Clone, thiserror::Error)]
pub enum ClientError {
    // === Erreurs de requête ===
    #[error("Validation error: {0}")]
    Validation(String),
    #[error("Missing required field {model}.{field}")]
    MissingField { model: String, field: String },
    #[error("Record not found: {0}")]
    RecordNotFound(String),

    // === Contraintes ===
    #[error("Unique constraint failed: {0}")]
    UniqueViolation(String),
    #[error("Foreign key constraint failed: {0}")]
    ForeignKeyViolation(String),

    // === Erreurs du moteur ===
    #[error("Raw query failed: {0}")]
    RawQuery(String),
    #[error("Not supported: {0}")]
    Unsupported(String),
    #[error("Transaction error: {0}")]
    Transaction(String),

    // === Erreurs internes ===
    #[error("Connection unavailable: {0}")]
    Connection(String),
    #[error("Database error: {0}")]
    Database(String),
}

pub type ClientResult<T> = Result<T, ClientError>;

impl ClientError {
    /// Code, public message and internal detail (logged, never returned).
    fn get_error_info(&self) -> (KnownErrorCode, String, Option<String>) {
        match self {
            ClientError::Validation(msg) => (KnownErrorCode::QueryValidation, msg.clone(), None),
            ClientError::MissingField { .. } => {
                (KnownErrorCode::MissingRequiredValue, self.to_string(), None)
            }
            ClientError::RecordNotFound(msg) => (KnownErrorCode::RecordNotFound, msg.clone(), None),
            ClientError::UniqueViolation(msg) => {
                (KnownErrorCode::UniqueConstraint, msg.clone(), None)
            }
            ClientError::ForeignKeyViolation(msg) => {
                (KnownErrorCode::ForeignKeyConstraint, msg.clone(), None)
            }
            ClientError::Unsupported(msg) => (KnownErrorCode::Unsupported, msg.clone(), None),
            ClientError::RawQuery(msg) => (
                KnownErrorCode::RawQuery,
                "Raw query failed".to_string(),
                Some(msg.clone()),
            ),
            ClientError::Transaction(msg) => (
                KnownErrorCode::Transaction,
                "Transaction failed".to_string(),
                Some(msg.clone()),
            ),
            ClientError::Connection(msg) => (
                KnownErrorCode::ConnectionUnavailable,
                "The database is unavailable".to_string(),
                Some(msg.clone()),
            ),
            ClientError::Database(msg) => (
                KnownErrorCode::Database,
                "An error occurred with the database".to_string(),
                Some(msg.clone()),
            ),
        }
    }

    pub fn code(&self) -> KnownErrorCode {
        self.get_error_info().0
    }

    pub fn to_response(&self) -> ErrorResponse {
        let (code, message, internal_detail) = self.get_error_info();

        if let Some(ref detail) = internal_detail {
            tracing::error!(error_code = code.as_str(), detail, "Internal database error");
        }

        ErrorResponse {
            error: code,
            message,
            details: None,
        }
    }

    // === Constructeurs helpers ===
    pub fn validation(msg: impl Into<String>) -> Self {
        ClientError::Validation(msg.into())
    }

    pub fn missing_field(model: &str, field: &str) -> Self {
        ClientError::MissingField {
            model: model.to_string(),
            field: field.to_string(),
        }
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        ClientError::RecordNotFound(msg.into())
    }

    pub fn unique(msg: impl Into<String>) -> Self {
        ClientError::UniqueViolation(msg.into())
    }

    pub fn foreign_key(msg: impl Into<String>) -> Self {
        ClientError::ForeignKeyViolation(msg.into())
    }

    pub fn unsupported(msg: impl Into<String>) -> Self {
        ClientError::Unsupported(msg.into())
    }

    pub fn raw_query(msg: impl Into<String>) -> Self {
        ClientError::RawQuery(msg.into())
    }

    pub fn transaction(msg: impl Into<String>) -> Self {
        ClientError::Transaction(msg.into())
    }

    pub fn database(msg: impl Into<String>) -> Self {
        ClientError::Database(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, ClientError::RecordNotFound(_))
    }
}

// === Conversions automatiques depuis d'autres types d'erreurs ===

// Depuis RepositoryError
impl From<RepositoryError> for ClientError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => ClientError::not_found(msg),
            RepositoryError::UniqueViolation(msg) => ClientError::unique(msg),
            RepositoryError::ForeignKeyViolation(msg) => ClientError::foreign_key(msg),
            RepositoryError::PoolError(msg) => ClientError::Connection(msg),
            RepositoryError::DecodeError(msg) | RepositoryError::DatabaseError(msg) => {
                ClientError::database(msg)
            }
        }
    }
}

// Depuis diesel (via RepositoryError)
impl From<diesel::result::Error> for ClientError {
    fn from(err: diesel::result::Error) -> Self {
        RepositoryError::from(err).into()
    }
}

impl From<diesel::r2d2::PoolError> for ClientError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        RepositoryError::from(err).into()
    }
}

// Depuis serde_json::Error (décodage vers les types du modèle)
impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ClientError::database(format!("JSON error: {err}"))
    }
}

// Valeur mal typée dans un argument de requête
impl From<ValueError> for ClientError {
    fn from(err: ValueError) -> Self {
        ClientError::validation(err.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(ClientError::not_found("Task"), "P2025")]
    #[case(ClientError::unique("users.email"), "P2002")]
    #[case(ClientError::foreign_key("tasks.creator_id"), "P2003")]
    #[case(ClientError::validation("bad"), "P2009")]
    #[case(ClientError::missing_field("Task", "title"), "P2012")]
    #[case(ClientError::unsupported("raw"), "P2026")]
    #[case(ClientError::transaction("rolled back"), "P2028")]
    #[case(ClientError::database("boom"), "P1000")]
    fn codes(#[case] err: ClientError, #[case] code: &str) {
        assert_eq!(err.code().as_str(), code);
    }

    #[test]
    fn missing_field_display() {
        let err = ClientError::missing_field("Task", "title");
        assert_eq!(err.to_string(), "Missing required field Task.title");
    }

    #[test]
    fn internal_details_are_not_returned() {
        let response = ClientError::database("relation \"tasks\" does not exist").to_response();
        assert_eq!(response.error, KnownErrorCode::Database);
        assert_eq!(response.message, "An error occurred with the database");
        assert!(response.details.is_none());
    }

    #[test]
    fn repository_errors_convert() {
        let err: ClientError = RepositoryError::UniqueViolation("email".into()).into();
        assert!(matches!(err, ClientError::UniqueViolation(_)));

        let err: ClientError = RepositoryError::PoolError("timeout".into()).into();
        assert_eq!(err.code(), KnownErrorCode::ConnectionUnavailable);
    }
}
