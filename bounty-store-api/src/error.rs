use serde::{Deserialize, Serialize};

/// Stable error codes surfaced by the client.
///
/// The numbering follows the usual ORM convention (P2xxx for query engine
/// errors) so callers can match on codes without parsing messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KnownErrorCode {
    /// Unique constraint failed
    #[serde(rename = "P2002")]
    UniqueConstraint,
    /// Foreign key constraint failed
    #[serde(rename = "P2003")]
    ForeignKeyConstraint,
    /// Query argument failed validation
    #[serde(rename = "P2009")]
    QueryValidation,
    /// Raw query failed
    #[serde(rename = "P2010")]
    RawQuery,
    /// Required value missing from a create payload
    #[serde(rename = "P2012")]
    MissingRequiredValue,
    /// Operation depends on a record that was not found
    #[serde(rename = "P2025")]
    RecordNotFound,
    /// Feature not supported by the active engine
    #[serde(rename = "P2026")]
    Unsupported,
    /// Transaction API error
    #[serde(rename = "P2028")]
    Transaction,
    /// Connection pool error
    #[serde(rename = "P1001")]
    ConnectionUnavailable,
    /// Anything else raised by the database
    #[serde(rename = "P1000")]
    Database,
}

impl KnownErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UniqueConstraint => "P2002",
            Self::ForeignKeyConstraint => "P2003",
            Self::QueryValidation => "P2009",
            Self::RawQuery => "P2010",
            Self::MissingRequiredValue => "P2012",
            Self::RecordNotFound => "P2025",
            Self::Unsupported => "P2026",
            Self::Transaction => "P2028",
            Self::ConnectionUnavailable => "P1001",
            Self::Database => "P1000",
        }
    }
}

/// Public error format
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct ErrorResponse {
    pub error: KnownErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn code_serializes_as_p_number() {
        let json = serde_json::to_string(&KnownErrorCode::RecordNotFound).unwrap();
        assert_eq!(json, "\"P2025\"");
        assert_eq!(KnownErrorCode::RecordNotFound.as_str(), "P2025");
    }

    #[test]
    fn details_are_skipped_when_absent() {
        let response = ErrorResponse {
            error: KnownErrorCode::UniqueConstraint,
            message: "Unique constraint failed on users.email".to_string(),
            details: None,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(!json.contains("details"));
        assert!(json.contains("\"error\":\"P2002\""));
    }
}
