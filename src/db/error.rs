use std::fmt;

/// Repository layer errors
#[derive(Debug)]
pub enum RepositoryError {
    PoolError(String),
    NotFound(String),
    UniqueViolation(String),
    ForeignKeyViolation(String),
    /// A row came back in a shape the registry cannot decode.
    DecodeError(String),
    DatabaseError(String),
}

impl fmt::Display for RepositoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RepositoryError::PoolError(msg) => write!(f, "Connection pool error: {msg}"),
            RepositoryError::NotFound(msg) => write!(f, "Not found: {msg}"),
            RepositoryError::UniqueViolation(msg) => {
                write!(f, "Unique constraint violation: {msg}")
            }
            RepositoryError::ForeignKeyViolation(msg) => {
                write!(f, "Foreign key constraint violation: {msg}")
            }
            RepositoryError::DecodeError(msg) => write!(f, "Row decode error: {msg}"),
            RepositoryError::DatabaseError(msg) => write!(f, "Database error: {msg}"),
        }
    }
}

impl std::error::Error for RepositoryError {}

impl From<diesel::result::Error> for RepositoryError {
    fn from(err: diesel::result::Error) -> Self {
        use diesel::result::{DatabaseErrorKind, Error};

        match err {
            Error::NotFound => RepositoryError::NotFound("Record not found".to_string()),
            Error::DatabaseError(kind, info) => {
                // La contrainte est plus utile que le message brut de Postgres
                let message = match info.constraint_name() {
                    Some(constraint) => format!("{} ({constraint})", info.message()),
                    None => info.message().to_string(),
                };
                match kind {
                    DatabaseErrorKind::UniqueViolation => RepositoryError::UniqueViolation(message),
                    DatabaseErrorKind::ForeignKeyViolation => {
                        RepositoryError::ForeignKeyViolation(message)
                    }
                    _ => RepositoryError::DatabaseError(message),
                }
            }
            Error::DeserializationError(e) => RepositoryError::DecodeError(e.to_string()),
            _ => RepositoryError::DatabaseError(err.to_string()),
        }
    }
}

impl From<diesel::r2d2::PoolError> for RepositoryError {
    fn from(err: diesel::r2d2::PoolError) -> Self {
        RepositoryError::PoolError(err.to_string())
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::DecodeError(err.to_string())
    }
}

impl From<crate::query::ValueError> for RepositoryError {
    fn from(err: crate::query::ValueError) -> Self {
        RepositoryError::DecodeError(err.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err = RepositoryError::from(diesel::result::Error::NotFound);
        assert!(matches!(err, RepositoryError::NotFound(_)));
        assert_eq!(err.to_string(), "Not found: Record not found");
    }

    #[test]
    fn rollback_maps_to_database_error() {
        let err = RepositoryError::from(diesel::result::Error::RollbackTransaction);
        assert!(matches!(err, RepositoryError::DatabaseError(_)));
    }

    #[test]
    fn json_errors_are_decode_errors() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = RepositoryError::from(json_err);
        assert!(err.to_string().starts_with("Row decode error"));
    }
}
