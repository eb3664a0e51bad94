use sea_orm::{DbErr, SqlErr};

use crate::auth_rs::AuthError;
use crate::services::session::local_store::LocalStoreError;

/// Failures surfaced to callers of the playlist and session services.
///
/// Every variant displays a human-readable message; store and API specifics stay
/// in the source chain and the logs.
#[derive(Debug, thiserror::Error)]
pub enum PlaylistError {
    #[error("You must be signed in to do that")]
    AuthenticationRequired,
    #[error(transparent)]
    AuthProvider(#[from] AuthError),
    #[error("Failed to generate playlist suggestions: {0}")]
    GenerationFailed(String),
    #[error("Failed to parse playlist: {0}")]
    MalformedResponse(String),
    #[error("{0}")]
    ConstraintViolation(String),
    #[error("{0} not found")]
    NotFound(String),
    #[error("{0}")]
    InvalidInput(String),
    #[error(transparent)]
    LocalStore(#[from] LocalStoreError),
    #[error("{context}")]
    Storage {
        context: String,
        #[source]
        source: DbErr,
    },
}

impl PlaylistError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            PlaylistError::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            PlaylistError::AuthProvider(_) => "AUTH_PROVIDER_ERROR",
            PlaylistError::GenerationFailed(_) => "GENERATION_FAILED",
            PlaylistError::MalformedResponse(_) => "MALFORMED_RESPONSE",
            PlaylistError::ConstraintViolation(_) => "CONSTRAINT_VIOLATION",
            PlaylistError::NotFound(_) => "NOT_FOUND",
            PlaylistError::InvalidInput(_) => "INVALID_INPUT",
            PlaylistError::LocalStore(_) => "LOCAL_STORE_ERROR",
            PlaylistError::Storage { .. } => "STORAGE_ERROR",
        }
    }
}

/// The only place that knows how the relational store reports its errors.
pub fn map_db_err(err: DbErr, context: &str) -> PlaylistError {
    log::error!("{context}: {err}");

    match err.sql_err() {
        Some(SqlErr::UniqueConstraintViolation(_)) => {
            return PlaylistError::ConstraintViolation(
                "A playlist with these details already exists".to_string(),
            );
        }
        Some(SqlErr::ForeignKeyConstraintViolation(_)) => {
            return PlaylistError::ConstraintViolation(
                "Invalid reference to another resource".to_string(),
            );
        }
        _ => {}
    }

    match err {
        DbErr::RecordNotFound(what) => PlaylistError::NotFound(what),
        err if is_unknown_column(&err) => {
            PlaylistError::ConstraintViolation("Invalid field in request".to_string())
        }
        err => PlaylistError::Storage {
            context: context.to_string(),
            source: err,
        },
    }
}

pub fn is_unique_violation(err: &DbErr) -> bool {
    matches!(err.sql_err(), Some(SqlErr::UniqueConstraintViolation(_)))
}

fn is_unknown_column(err: &DbErr) -> bool {
    let message = err.to_string();
    message.contains("no such column")
        || (message.contains("column") && message.contains("does not exist"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_not_found_maps_to_not_found() {
        let err = map_db_err(DbErr::RecordNotFound("Playlist".into()), "Failed to get playlist");
        assert!(matches!(err, PlaylistError::NotFound(ref what) if what == "Playlist"));
        assert_eq!(err.to_string(), "Playlist not found");
    }

    #[test]
    fn test_unknown_column_maps_to_constraint_violation() {
        let err = map_db_err(
            DbErr::Custom("no such column: colour".into()),
            "Failed to update playlist",
        );
        assert_eq!(err.to_string(), "Invalid field in request");
        assert_eq!(err.code(), "CONSTRAINT_VIOLATION");
    }

    #[test]
    fn test_other_errors_hide_backend_message() {
        let err = map_db_err(
            DbErr::Custom("SQLITE_BUSY: database is locked".into()),
            "Failed to create playlist",
        );
        assert_eq!(err.to_string(), "Failed to create playlist");
        assert_eq!(err.code(), "STORAGE_ERROR");
    }
}
