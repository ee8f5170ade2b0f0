use thiserror::Error;
use uuid::Uuid;

/// Error taxonomy shared by the repository, coordinator, and control
/// surface. The control surface maps each variant to an HTTP status in
/// one place; the coordinator uses [`SimError::is_transient`] to decide
/// whether a write is worth retrying.
#[derive(Debug, Error)]
pub enum SimError {
    #[error("bad request: {0}")]
    Validation(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("simulation run {0} already exists")]
    Conflict(Uuid),

    #[error("dependency unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt data: {0}")]
    DataCorrupt(String),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type SimResult<T> = Result<T, SimError>;

impl SimError {
    /// Transient errors are worth a retry with backoff; the rest surface
    /// immediately.
    pub fn is_transient(&self) -> bool {
        matches!(self, SimError::Unavailable(_))
    }

    pub fn not_found(what: impl Into<String>) -> SimError {
        SimError::NotFound(what.into())
    }

    pub fn internal(err: impl std::fmt::Display) -> SimError {
        SimError::Internal(err.to_string())
    }
}

impl From<diesel::result::Error> for SimError {
    fn from(err: diesel::result::Error) -> SimError {
        use diesel::result::{DatabaseErrorKind, Error};
        match err {
            Error::NotFound => SimError::NotFound("record".to_string()),
            Error::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                // Callers that know the offending id replace this with a
                // proper Conflict; this keeps the message if they don't.
                SimError::Internal(format!("unique violation: {}", info.message()))
            }
            Error::DatabaseError(DatabaseErrorKind::ClosedConnection, info) => {
                SimError::Unavailable(info.message().to_string())
            }
            Error::DatabaseError(DatabaseErrorKind::UnableToSendCommand, info) => {
                SimError::Unavailable(info.message().to_string())
            }
            other => SimError::Internal(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for SimError {
    fn from(err: serde_json::Error) -> SimError {
        SimError::DataCorrupt(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(SimError::Unavailable("pool exhausted".into()).is_transient());
        assert!(!SimError::NotFound("game".into()).is_transient());
        assert!(!SimError::DataCorrupt("bad roster".into()).is_transient());
        // Internal failures (illegal transitions, compute bugs) don't
        // get better on retry.
        assert!(!SimError::Internal("illegal transition".into()).is_transient());
        assert!(!SimError::Conflict(Uuid::nil()).is_transient());
    }

    #[test]
    fn diesel_not_found_maps_to_not_found() {
        let err: SimError = diesel::result::Error::NotFound.into();
        assert!(matches!(err, SimError::NotFound(_)));
    }
}
