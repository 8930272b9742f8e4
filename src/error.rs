// ⚠️ Error taxonomy for the tuition ledger
//
// Constraint violations abort a rebuild or journal write as a whole.
// Missing references (a lesson pointing at a vanished tuition) are NOT errors.

use thiserror::Error;
use uuid::Uuid;

/// Library-wide result alias
pub type Result<T> = std::result::Result<T, LedgerError>;

#[derive(Error, Debug)]
pub enum LedgerError {
    // ===================
    // Constraint violations (nothing partially applied)
    // ===================
    #[error("Constraint violated ({constraint}): {detail}")]
    ConstraintViolation { constraint: String, detail: String },

    #[error(
        "Co-attending students disagree on lessons per week for {subject}/{educational_system} \
         with teacher {teacher_id}: {values:?}"
    )]
    InconsistentLessonsPerWeek {
        subject: String,
        educational_system: String,
        teacher_id: Uuid,
        values: Vec<u32>,
    },

    #[error("Invalid correction of {entity} {id}: {reason}")]
    InvalidCorrection {
        entity: &'static str,
        id: Uuid,
        reason: String,
    },

    // ===================
    // Lookups
    // ===================
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: Uuid },

    // ===================
    // Storage
    // ===================
    #[error("Storage error: {0}")]
    Storage(#[source] rusqlite::Error),

    #[error("Corrupt value in column {column}: {value}")]
    Corrupt { column: &'static str, value: String },

    // ===================
    // Configuration
    // ===================
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl LedgerError {
    pub fn constraint(constraint: &str, detail: impl Into<String>) -> Self {
        LedgerError::ConstraintViolation {
            constraint: constraint.to_string(),
            detail: detail.into(),
        }
    }

    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            LedgerError::ConstraintViolation { .. } | LedgerError::InconsistentLessonsPerWeek { .. }
        )
    }
}

impl From<rusqlite::Error> for LedgerError {
    /// SQLite constraint failures (FK, UNIQUE, CHECK) become `ConstraintViolation`
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(code, message)
                if code.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                LedgerError::ConstraintViolation {
                    constraint: "storage".to_string(),
                    detail: message.clone().unwrap_or_else(|| code.to_string()),
                }
            }
            _ => LedgerError::Storage(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_unique_failure_maps_to_constraint_violation() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("CREATE TABLE t (k TEXT PRIMARY KEY); INSERT INTO t VALUES ('a');")
            .unwrap();

        let err: LedgerError = conn
            .execute("INSERT INTO t VALUES ('a')", [])
            .unwrap_err()
            .into();

        assert!(err.is_constraint_violation());
    }

    #[test]
    fn test_other_failures_stay_storage() {
        let conn = Connection::open_in_memory().unwrap();
        let err: LedgerError = conn
            .execute("SELECT * FROM missing_table", [])
            .unwrap_err()
            .into();

        assert!(matches!(err, LedgerError::Storage(_)));
        assert!(!err.is_constraint_violation());
    }
}
