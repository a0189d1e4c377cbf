use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Error returned when a string is not a literal of the target enum.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownVariant {
    pub enum_name: &'static str,
    pub value: String,
}

impl fmt::Display for UnknownVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not a valid {}", self.value, self.enum_name)
    }
}

impl std::error::Error for UnknownVariant {}

// Génère as_str / ALL / Display / FromStr pour chaque enum du schéma
macro_rules! literal_enum {
    ($name:ident, $label:literal, { $($variant:ident => $lit:literal),+ $(,)? }) => {
        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];
            pub const LITERALS: &'static [&'static str] = &[$($lit),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $lit),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = UnknownVariant;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($lit => Ok($name::$variant),)+
                    other => Err(UnknownVariant {
                        enum_name: $label,
                        value: other.to_string(),
                    }),
                }
            }
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    #[default]
    Open,
    Applied,
    InProgress,
    PendingApproval,
    Completed,
    Cancelled,
    Overdue,
    Refunded,
}

literal_enum!(TaskStatus, "TaskStatus", {
    Open => "OPEN",
    Applied => "APPLIED",
    InProgress => "IN_PROGRESS",
    PendingApproval => "PENDING_APPROVAL",
    Completed => "COMPLETED",
    Cancelled => "CANCELLED",
    Overdue => "OVERDUE",
    Refunded => "REFUNDED",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionType {
    Deposit,
    Release,
    Refund,
    PlatformFee,
}

literal_enum!(TransactionType, "TransactionType", {
    Deposit => "DEPOSIT",
    Release => "RELEASE",
    Refund => "REFUND",
    PlatformFee => "PLATFORM_FEE",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TransactionStatus {
    #[default]
    Pending,
    Confirmed,
    Failed,
    Cancelled,
}

literal_enum!(TransactionStatus, "TransactionStatus", {
    Pending => "PENDING",
    Confirmed => "CONFIRMED",
    Failed => "FAILED",
    Cancelled => "CANCELLED",
});

/// Isolation level requested for an interactive transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionIsolationLevel {
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

literal_enum!(TransactionIsolationLevel, "TransactionIsolationLevel", {
    ReadUncommitted => "ReadUncommitted",
    ReadCommitted => "ReadCommitted",
    RepeatableRead => "RepeatableRead",
    Serializable => "Serializable",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

literal_enum!(SortOrder, "SortOrder", {
    Asc => "asc",
    Desc => "desc",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NullsOrder {
    First,
    Last,
}

literal_enum!(NullsOrder, "NullsOrder", {
    First => "first",
    Last => "last",
});

/// String comparison mode for filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum QueryMode {
    #[default]
    Default,
    Insensitive,
}

literal_enum!(QueryMode, "QueryMode", {
    Default => "default",
    Insensitive => "insensitive",
});
