//! Error types for Chainrecord

use thiserror::Error;

/// Result type alias using Chainrecord's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Chainrecord error types
#[derive(Error, Debug)]
pub enum Error {
    // Input errors (E100-E199)
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    // Rule errors (E200-E299)
    #[error("Scoring rule '{0}' is already registered.")]
    DuplicateRuleName(String),

    #[error("Rule registry is sealed; cannot register '{0}' after the first evaluation.")]
    RegistrySealed(String),

    #[error("Scoring rule '{rule}' failed: {message}")]
    RuleFailed { rule: String, message: String },

    // Store errors (E300-E399)
    #[error("Relationship store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("Write rejected by store constraint: {0}")]
    ConstraintViolation(String),

    // Lookup errors (E400-E499)
    #[error("Entity {0} not found.")]
    EntityNotFound(i64),

    // Generic errors
    #[error("{0}")]
    Other(String),
}

impl From<sqlx::Error> for Error {
    fn from(err: sqlx::Error) -> Self {
        use sqlx::error::ErrorKind as DbErrorKind;

        match &err {
            sqlx::Error::Database(db) => match db.kind() {
                DbErrorKind::UniqueViolation
                | DbErrorKind::ForeignKeyViolation
                | DbErrorKind::NotNullViolation
                | DbErrorKind::CheckViolation => {
                    Self::ConstraintViolation(db.message().to_string())
                }
                _ => Self::StoreUnavailable(err.to_string()),
            },
            _ => Self::StoreUnavailable(err.to_string()),
        }
    }
}

/// Which side of a request an error should be blamed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The caller supplied something unusable
    Client,
    /// Something failed on our side (store, rule, environment)
    Server,
}

impl Error {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "E100",
            Self::DuplicateRuleName(_) => "E200",
            Self::RegistrySealed(_) => "E201",
            Self::RuleFailed { .. } => "E202",
            Self::StoreUnavailable(_) => "E300",
            Self::ConstraintViolation(_) => "E301",
            Self::EntityNotFound(_) => "E400",
            Self::Other(_) => "E9999",
        }
    }

    /// Classify the error for the layer translating it into a response
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument(_)
            | Self::DuplicateRuleName(_)
            | Self::RegistrySealed(_)
            | Self::ConstraintViolation(_)
            | Self::EntityNotFound(_) => ErrorKind::Client,
            Self::RuleFailed { .. } | Self::StoreUnavailable(_) | Self::Other(_) => {
                ErrorKind::Server
            }
        }
    }

    /// Get suggestion for how to fix this error
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::InvalidArgument(_) => Some("chainrecord --help".to_string()),
            Self::EntityNotFound(_) => {
                Some("Check the entity id against the entities table".to_string())
            }
            Self::StoreUnavailable(_) => Some("chainrecord doctor".to_string()),
            Self::ConstraintViolation(_) => {
                Some("Make sure referenced records exist before writing".to_string())
            }
            _ => None,
        }
    }
}
