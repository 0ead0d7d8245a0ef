//! Unified error types and result handling.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors are grouped into
//! an [`ErrorKind`] so the HTTP layer can turn them into structured responses without
//! inspecting individual variants.

use sea_orm::{DbErr, SqlErr};
use thiserror::Error;

/// Crate-wide error type.
#[derive(Debug, Error)]
pub enum Error {
    /// Missing or malformed input, or an unsupported enumerated value.
    #[error("{message}")]
    Validation {
        /// Human-readable explanation, safe to show to the caller
        message: String,
    },

    /// No record matches the given identity or serial.
    #[error("{entity} not found: {key}")]
    NotFound {
        /// Kind of record that was looked up (e.g. "unit", "return")
        entity: &'static str,
        /// Identity or serial that was searched for
        key: String,
    },

    /// A warranty was submitted for a unit that already carries one.
    #[error("Warranty already registered for serial {serial}")]
    AlreadyRegistered {
        /// Serial code of the unit
        serial: String,
    },

    /// Serial-code uniqueness violation.
    #[error("Serial number already exists: {serial}")]
    Conflict {
        /// Serial code that collided (may be the raw constraint message)
        serial: String,
    },

    /// Warranty status not permitted for the attempted transition.
    #[error("Invalid warranty status '{status}'")]
    InvalidStatus {
        /// The rejected status value
        status: String,
    },

    /// Warranty duration outside the accepted bounds.
    #[error("Warranty duration must be between 1 and {max} months, got {months}")]
    InvalidDuration {
        /// Rejected duration
        months: i64,
        /// Upper bound in effect
        max: u32,
    },

    /// Caller exceeded the fixed-window attempt budget.
    #[error("Too many attempts from this address, please try again after 15 minutes")]
    RateLimited {
        /// Seconds until the current window closes
        retry_after_secs: u64,
    },

    /// Invalid or unreadable configuration.
    #[error("Configuration error: {message}")]
    Config {
        /// What was wrong with the configuration
        message: String,
    },

    /// Bill artifact store failure.
    #[error("Storage error: {message}")]
    Storage {
        /// Underlying failure
        message: String,
    },

    /// Any other store-level fault, including timeouts.
    #[error("Database error: {0}")]
    Database(DbErr),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Classification of [`Error`] used at the workflow boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Client-fixable input problem
    Validation,
    /// Missing record
    NotFound,
    /// Warranty submitted twice
    AlreadyRegistered,
    /// Serial uniqueness violation
    Conflict,
    /// Rate limit exceeded
    RateLimited,
    /// Store, artifact store, or configuration fault
    Internal,
}

impl Error {
    /// Shorthand for a [`Error::Validation`] with the given message.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(entity: &'static str, key: impl ToString) -> Self {
        Self::NotFound {
            entity,
            key: key.to_string(),
        }
    }

    /// Returns the taxonomy bucket for this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation { .. } | Self::InvalidStatus { .. } | Self::InvalidDuration { .. } => {
                ErrorKind::Validation
            }
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyRegistered { .. } => ErrorKind::AlreadyRegistered,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::RateLimited { .. } => ErrorKind::RateLimited,
            Self::Config { .. } | Self::Storage { .. } | Self::Database(_) | Self::Io(_) => {
                ErrorKind::Internal
            }
        }
    }
}

/// Unique index whose violation means a duplicate serial code.
const SERIAL_CONSTRAINT: &str = "units.serial_number";

impl From<DbErr> for Error {
    fn from(err: DbErr) -> Self {
        match err.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(detail)) if detail.contains(SERIAL_CONSTRAINT) => {
                Self::Conflict { serial: detail }
            }
            _ => Self::Database(err),
        }
    }
}

impl From<std::num::TryFromIntError> for Error {
    fn from(err: std::num::TryFromIntError) -> Self {
        Self::validation(format!("Numeric value out of range: {err}"))
    }
}

/// Convenience `Result` type
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]
    use super::*;
    use crate::entities::rate_limit;
    use crate::test_utils::*;
    use sea_orm::{ActiveModelTrait, Set};

    #[test]
    fn test_kind_classification() {
        assert_eq!(Error::validation("x").kind(), ErrorKind::Validation);
        assert_eq!(
            Error::InvalidStatus {
                status: "pending".into()
            }
            .kind(),
            ErrorKind::Validation
        );
        assert_eq!(
            Error::InvalidDuration { months: 0, max: 60 }.kind(),
            ErrorKind::Validation
        );
        assert_eq!(Error::not_found("unit", "SN-1").kind(), ErrorKind::NotFound);
        assert_eq!(
            Error::Database(DbErr::Custom("boom".into())).kind(),
            ErrorKind::Internal
        );
    }

    #[test]
    fn test_non_unique_db_error_stays_internal() {
        let err: Error = DbErr::Custom("connection reset".into()).into();
        assert!(matches!(err, Error::Database(_)));
    }

    #[tokio::test]
    async fn test_only_serial_collisions_are_conflicts() -> Result<()> {
        let db = setup_test_db().await?;
        create_test_unit(&db, "SN-DUP").await?;
        let err = create_test_unit(&db, "SN-DUP").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Conflict);

        let counter = || rate_limit::ActiveModel {
            key: Set("warranty:198.51.100.4".into()),
            hits: Set(1),
            window_start: Set(fixed_now()),
            ..Default::default()
        };
        counter().insert(&db).await?;
        let err: Error = counter().insert(&db).await.unwrap_err().into();
        assert!(matches!(err, Error::Database(_)));
        assert_eq!(err.kind(), ErrorKind::Internal);
        Ok(())
    }

    #[test]
    fn test_not_found_message() {
        let err = Error::not_found("unit", "SN-404");
        assert_eq!(err.to_string(), "unit not found: SN-404");
    }
}
